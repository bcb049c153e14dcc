use crate::collectors::host::collect_host;
use crate::config::{Config, ProbeConfig};
use crate::detect::detect_services;
use crate::model::ReportAggregator;
use crate::probe::{CommandRunner, ProbeResult};
use crate::registry::{
    builtin_probes, Precondition, Probe, RegistryError, Section, SectionRegistry,
};
use crate::render::render_all;
use crate::sampler::{builtin_collectors, SampledCollector};
use chrono::Local;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::{System, SystemExt};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("probe registration failed: {0}")]
    Registry(#[from] RegistryError),
    #[error("every report format failed to render")]
    NoReports,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report_dir: PathBuf,
    pub report_paths: Vec<PathBuf>,
}

/// Full snapshot run: builds the built-in probe table plus configured
/// extras, then drives collection and rendering. Returns the report
/// directory even when individual probes failed; only directory
/// creation and total render failure are fatal.
pub async fn run(cfg: &Config, shutdown: watch::Receiver<bool>) -> Result<RunOutcome, RunError> {
    let mut registry = SectionRegistry::new();
    for probe in builtin_probes(cfg.probe_timeout()) {
        registry.register(probe)?;
    }
    for extra in &cfg.probes {
        registry.register(probe_from_config(extra, cfg))?;
    }
    registry.retain_sections(&cfg.included_sections());

    let collectors = builtin_collectors(cfg.duration(), cfg.sample_interval());
    run_with(cfg, registry, collectors, shutdown).await
}

pub(crate) async fn run_with(
    cfg: &Config,
    registry: SectionRegistry,
    collectors: Vec<SampledCollector>,
    shutdown: watch::Receiver<bool>,
) -> Result<RunOutcome, RunError> {
    let report_dir = create_report_dir(&cfg.output_dir)?;
    info!(dir = %report_dir.display(), probes = registry.all().len(), "snapshot run started");

    let aggregator = ReportAggregator::new();

    let mut system = System::new();
    aggregator.set_host(collect_host(&mut system)).await;

    let services = detect_services(&cfg.detectors, &mut system).await;
    let running: HashSet<String> = services
        .iter()
        .filter(|s| s.running)
        .map(|s| s.name.clone())
        .collect();
    aggregator.set_services(services).await;

    // Samplers run alongside the single-shot sequence; the aggregator
    // is their only shared sink.
    let mut sampler_tasks = Vec::with_capacity(collectors.len());
    for collector in collectors {
        let agg = aggregator.clone();
        let rx = shutdown.clone();
        sampler_tasks.push(tokio::spawn(collector.run(agg, rx)));
    }

    let mut probe_shutdown = shutdown.clone();
    for probe in registry.all() {
        let result = execute_probe(probe, &running, &mut probe_shutdown).await;
        write_probe_file(&report_dir, &result);
        aggregator.record(probe.section, result).await;
    }

    for task in sampler_tasks {
        let _ = task.await;
    }

    let model = aggregator
        .snapshot(cfg.duration(), cfg.sample_interval())
        .await;
    let report_paths = render_all(&model, &report_dir);
    if report_paths.is_empty() {
        return Err(RunError::NoReports);
    }

    info!(dir = %report_dir.display(), formats = report_paths.len(), "snapshot run finished");
    Ok(RunOutcome {
        report_dir,
        report_paths,
    })
}

async fn execute_probe(
    probe: &Probe,
    running: &HashSet<String>,
    shutdown: &mut watch::Receiver<bool>,
) -> ProbeResult {
    let command_line = probe.command.display_line();

    if *shutdown.borrow_and_update() {
        return ProbeResult::skipped(&probe.name, command_line, "run cancelled");
    }
    if let Precondition::ServiceRunning(service) = &probe.precondition {
        if !running.contains(service) {
            info!(probe = %probe.name, service = %service, "precondition false, probe skipped");
            return ProbeResult::skipped(
                &probe.name,
                command_line,
                &format!("service '{service}' not running"),
            );
        }
    }

    // Dropping the execute future on cancellation kills the child via
    // kill_on_drop, so no probe process outlives the run.
    tokio::select! {
        result = CommandRunner::execute(&probe.name, &probe.command, probe.timeout) => result,
        _ = shutdown.changed() => {
            ProbeResult::skipped(&probe.name, probe.command.display_line(), "run cancelled")
        }
    }
}

fn create_report_dir(output_dir: &str) -> Result<PathBuf, RunError> {
    let dir_name = format!("opsnap-{}", Local::now().format("%Y%m%d-%H%M%S"));
    let report_dir = Path::new(output_dir).join(dir_name);
    fs::create_dir_all(&report_dir).map_err(|source| RunError::CreateDir {
        path: report_dir.display().to_string(),
        source,
    })?;
    Ok(report_dir)
}

fn write_probe_file(report_dir: &Path, result: &ProbeResult) {
    let path = report_dir.join(format!("{}.txt", result.probe_name));
    let contents = format!(
        "# probe: {}\n# command: {}\n# status: {}\n\n{}",
        result.probe_name,
        result.command_line,
        result.status.label(),
        result.output
    );
    if let Err(err) = fs::write(&path, contents) {
        warn!(probe = %result.probe_name, error = %err, "failed to write probe output file");
    }
}

fn probe_from_config(extra: &ProbeConfig, cfg: &Config) -> Probe {
    Probe {
        name: extra.name.clone(),
        // Section keys were validated with the config.
        section: Section::from_key(&extra.section).unwrap_or(Section::Summary),
        command: extra.command.clone(),
        timeout: extra
            .timeout_secs
            .map(std::time::Duration::from_secs)
            .unwrap_or_else(|| cfg.probe_timeout()),
        precondition: match &extra.requires {
            Some(service) => Precondition::ServiceRunning(service.clone()),
            None => Precondition::Always,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectorConfig, DetectorKind};
    use crate::probe::{CommandSpec, ProbeStatus};
    use crate::sampler::{MetricKind, MetricProbe};
    use std::time::{Duration, Instant};

    fn probe(name: &str, program: &str, args: &[&str], timeout: Duration) -> Probe {
        Probe {
            name: name.to_string(),
            section: Section::SystemInfo,
            command: CommandSpec::new(program, args),
            timeout,
            precondition: Precondition::Always,
        }
    }

    fn test_config(dir: &Path) -> Config {
        Config {
            output_dir: dir.display().to_string(),
            duration_secs: 1,
            sample_interval_secs: 1,
            detectors: Vec::new(),
            ..Config::default()
        }
    }

    fn echo_collector(metric: &str, ticks: u64, interval_ms: u64) -> SampledCollector {
        SampledCollector::new(
            "test",
            vec![MetricProbe {
                metric: metric.to_string(),
                kind: MetricKind::Command(CommandSpec::new("echo", &["7"])),
            }],
            Duration::from_millis(ticks * interval_ms),
            Duration::from_millis(interval_ms),
        )
    }

    #[tokio::test]
    async fn end_to_end_statuses_and_report_files() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_config(tmp.path());

        let mut registry = SectionRegistry::new();
        registry
            .register(probe("echo-ok", "echo", &["ok"], Duration::from_secs(5)))
            .unwrap();
        registry
            .register(probe("always-fails", "false", &[], Duration::from_secs(5)))
            .unwrap();
        registry
            .register(probe("too-slow", "sleep", &["100"], Duration::from_secs(1)))
            .unwrap();

        let (_tx, rx) = watch::channel(false);
        let outcome = run_with(&cfg, registry, vec![echo_collector("answer", 3, 100)], rx)
            .await
            .expect("run must complete despite probe failures");

        let summary = fs::read_to_string(outcome.report_dir.join("summary.txt")).unwrap();
        assert!(summary.contains("ok"));
        assert!(summary.contains("failure"));
        assert!(summary.contains("answer: 3 samples"));

        assert!(outcome.report_dir.join("report.html").is_file());
        assert!(outcome.report_dir.join("metrics/answer.csv").is_file());
        assert!(outcome.report_dir.join("echo-ok.txt").is_file());
        assert!(outcome.report_dir.join("always-fails.txt").is_file());
        assert!(outcome.report_dir.join("too-slow.txt").is_file());

        assert!(summary.contains("echo-ok: success"));
        assert!(summary.contains("always-fails: failure"));
        assert!(summary.contains("too-slow: timed out"));
    }

    #[tokio::test]
    async fn gated_probe_is_skipped_when_service_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = test_config(tmp.path());
        cfg.detectors = vec![DetectorConfig {
            name: "ghost".to_string(),
            kind: DetectorKind::Process {
                pattern: "no-such-process-name-51f3".to_string(),
            },
        }];

        let mut registry = SectionRegistry::new();
        registry
            .register(Probe {
                name: "ghost-probe".to_string(),
                section: Section::Application,
                command: CommandSpec::new("echo", &["should never run"]),
                timeout: Duration::from_secs(5),
                precondition: Precondition::ServiceRunning("ghost".to_string()),
            })
            .unwrap();

        let (_tx, rx) = watch::channel(false);
        let outcome = run_with(&cfg, registry, Vec::new(), rx).await.unwrap();

        let probe_file = fs::read_to_string(outcome.report_dir.join("ghost-probe.txt")).unwrap();
        assert!(probe_file.contains("status: skipped"));
        assert!(probe_file.contains("skipped: service 'ghost' not running"));

        let summary = fs::read_to_string(outcome.report_dir.join("summary.txt")).unwrap();
        assert!(summary.contains("ghost-probe: skipped"));
        assert!(summary.contains("ghost: stopped"));
    }

    #[tokio::test]
    async fn cancellation_still_renders_partial_report() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_config(tmp.path());

        let mut registry = SectionRegistry::new();
        registry
            .register(probe("quick", "echo", &["done"], Duration::from_secs(5)))
            .unwrap();
        registry
            .register(probe("stuck", "sleep", &["30"], Duration::from_secs(25)))
            .unwrap();

        let collector = SampledCollector::new(
            "slow",
            vec![MetricProbe {
                metric: "load1".to_string(),
                kind: MetricKind::LoadAvg1,
            }],
            Duration::from_secs(60),
            Duration::from_millis(100),
        );

        let (tx, rx) = watch::channel(false);
        let cancel = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = tx.send(true);
        });

        let start = Instant::now();
        let outcome = run_with(&cfg, registry, vec![collector], rx)
            .await
            .expect("cancelled run still produces a report");
        assert!(start.elapsed() < Duration::from_secs(10));
        cancel.await.unwrap();

        let summary = fs::read_to_string(outcome.report_dir.join("summary.txt")).unwrap();
        assert!(summary.contains("quick: success"));
        assert!(summary.contains("stuck: skipped"));
    }

    #[tokio::test]
    async fn every_registered_probe_has_exactly_one_result_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_config(tmp.path());

        let names = ["one", "two", "three"];
        let mut registry = SectionRegistry::new();
        for name in names {
            registry
                .register(probe(name, "echo", &[name], Duration::from_secs(5)))
                .unwrap();
        }

        let (_tx, rx) = watch::channel(false);
        let outcome = run_with(&cfg, registry, Vec::new(), rx).await.unwrap();
        for name in names {
            assert!(outcome.report_dir.join(format!("{name}.txt")).is_file());
        }
    }

    #[tokio::test]
    async fn unwritable_output_root_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let cfg = test_config(&blocker);
        let (_tx, rx) = watch::channel(false);
        let err = run_with(&cfg, SectionRegistry::new(), Vec::new(), rx)
            .await
            .expect_err("creating a dir under a file must fail");
        assert!(matches!(err, RunError::CreateDir { .. }));
    }

    #[tokio::test]
    async fn builtin_run_records_every_probe() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = test_config(tmp.path());
        // Keep the end-to-end default path cheap: one section, no samplers.
        cfg.sections = vec!["network".to_string()];

        let (_tx, rx) = watch::channel(false);
        let outcome = run(&cfg, rx).await.unwrap();
        let summary = fs::read_to_string(outcome.report_dir.join("summary.txt")).unwrap();
        assert!(summary.contains("[Network]"));
    }
}
