use crate::model::{ReportAggregator, Sample};
use crate::probe::{now_unix, CommandRunner, CommandSpec, ProbeStatus};
use std::collections::HashMap;
use std::time::Duration;
use sysinfo::{CpuExt, NetworkExt, NetworksExt, System, SystemExt};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// How one sampled metric obtains a value each tick.
#[derive(Debug, Clone)]
pub enum MetricKind {
    /// 1-minute load average.
    LoadAvg1,
    /// Mean CPU usage over all cores, percent.
    CpuPercent,
    /// Used memory in bytes.
    MemUsedBytes,
    /// Per-interface RX/TX byte rates from counter deltas. Expands to
    /// one `net-rx-<iface>` / `net-tx-<iface>` series per interface.
    NetRates,
    /// Run a command and parse its trimmed stdout as a float.
    Command(CommandSpec),
}

#[derive(Debug, Clone)]
pub struct MetricProbe {
    pub metric: String,
    pub kind: MetricKind,
}

/// Rate from a raw monotonic counter. The first tick has no previous
/// value and reports 0.0; that zero is part of the output contract.
fn counter_rate(prev: Option<u64>, current: u64, interval: Duration) -> f64 {
    match prev {
        None => 0.0,
        Some(p) => current.saturating_sub(p) as f64 / interval.as_secs_f64(),
    }
}

/// Runs its metric probes every `interval` for `floor(duration/interval)`
/// ticks, appending samples to the shared aggregator. Collectors own
/// their sysinfo handle and rate state; the aggregator is the only
/// shared sink. Not restartable once run.
pub struct SampledCollector {
    name: String,
    probes: Vec<MetricProbe>,
    duration: Duration,
    interval: Duration,
    system: System,
    prev_net: HashMap<String, (u64, u64)>,
}

impl SampledCollector {
    pub fn new(name: &str, probes: Vec<MetricProbe>, duration: Duration, interval: Duration) -> Self {
        Self {
            name: name.to_string(),
            probes,
            duration,
            interval,
            system: System::new(),
            prev_net: HashMap::new(),
        }
    }

    pub fn tick_count(&self) -> u64 {
        (self.duration.as_millis() / self.interval.as_millis().max(1)) as u64
    }

    pub async fn run(mut self, aggregator: ReportAggregator, mut shutdown: watch::Receiver<bool>) {
        let total_ticks = self.tick_count();
        if total_ticks == 0 || self.probes.is_empty() {
            return;
        }
        info!(
            collector = %self.name,
            ticks = total_ticks,
            interval_secs = self.interval.as_secs_f64(),
            "sampled collector started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        // Delay rather than skip: the tick count is a contract, an
        // overrunning tick must not swallow the next one.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for tick in 0..total_ticks {
            if *shutdown.borrow_and_update() {
                info!(collector = %self.name, tick, "sampled collector cancelled");
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(collector = %self.name, tick, "sampled collector cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    self.sample_once(&aggregator).await;
                }
            }
        }
        debug!(collector = %self.name, "sampled collector finished");
    }

    async fn sample_once(&mut self, aggregator: &ReportAggregator) {
        let tick_unix = now_unix();
        let probes = self.probes.clone();
        for probe in &probes {
            match &probe.kind {
                MetricKind::LoadAvg1 => {
                    let value = self.system.load_average().one;
                    record(aggregator, &probe.metric, tick_unix, value).await;
                }
                MetricKind::CpuPercent => {
                    self.system.refresh_cpu();
                    let cpus = self.system.cpus();
                    let value = if cpus.is_empty() {
                        0.0
                    } else {
                        let sum: f32 = cpus.iter().map(|c| c.cpu_usage()).sum();
                        (sum / cpus.len() as f32) as f64
                    };
                    record(aggregator, &probe.metric, tick_unix, value).await;
                }
                MetricKind::MemUsedBytes => {
                    self.system.refresh_memory();
                    let value = (self.system.used_memory() * 1024) as f64;
                    record(aggregator, &probe.metric, tick_unix, value).await;
                }
                MetricKind::NetRates => {
                    self.sample_net_rates(aggregator, tick_unix).await;
                }
                MetricKind::Command(spec) => {
                    self.sample_command(aggregator, &probe.metric, spec, tick_unix)
                        .await;
                }
            }
        }
    }

    async fn sample_net_rates(&mut self, aggregator: &ReportAggregator, tick_unix: i64) {
        self.system.refresh_networks_list();
        self.system.refresh_networks();
        let totals: Vec<(String, u64, u64)> = self
            .system
            .networks()
            .iter()
            .map(|(iface, data)| {
                (
                    iface.to_string(),
                    data.total_received(),
                    data.total_transmitted(),
                )
            })
            .collect();
        for (iface, rx_total, tx_total) in totals {
            let prev = self.prev_net.get(&iface).copied();
            let rx_rate = counter_rate(prev.map(|p| p.0), rx_total, self.interval);
            let tx_rate = counter_rate(prev.map(|p| p.1), tx_total, self.interval);
            self.prev_net.insert(iface.clone(), (rx_total, tx_total));
            record(aggregator, &format!("net-rx-{iface}"), tick_unix, rx_rate).await;
            record(aggregator, &format!("net-tx-{iface}"), tick_unix, tx_rate).await;
        }
    }

    async fn sample_command(
        &self,
        aggregator: &ReportAggregator,
        metric: &str,
        spec: &CommandSpec,
        tick_unix: i64,
    ) {
        let timeout = self.interval.max(Duration::from_secs(1));
        let result = CommandRunner::execute(metric, spec, timeout).await;
        if result.status != ProbeStatus::Success {
            warn!(collector = %self.name, metric, status = result.status.label(), "metric command failed, tick skipped");
            return;
        }
        match result.output.trim().parse::<f64>() {
            Ok(value) => record(aggregator, metric, tick_unix, value).await,
            Err(_) => {
                warn!(collector = %self.name, metric, "metric command output not numeric, tick skipped");
            }
        }
    }
}

async fn record(aggregator: &ReportAggregator, metric: &str, tick_unix: i64, value: f64) {
    aggregator
        .record_sample(metric, Sample { tick_unix, value })
        .await;
}

/// The two built-in collector groups, mirroring the performance and
/// network sampling the snapshot takes alongside single-shot probes.
pub fn builtin_collectors(duration: Duration, interval: Duration) -> Vec<SampledCollector> {
    vec![
        SampledCollector::new(
            "performance",
            vec![
                MetricProbe {
                    metric: "load1".to_string(),
                    kind: MetricKind::LoadAvg1,
                },
                MetricProbe {
                    metric: "cpu-percent".to_string(),
                    kind: MetricKind::CpuPercent,
                },
                MetricProbe {
                    metric: "mem-used-bytes".to_string(),
                    kind: MetricKind::MemUsedBytes,
                },
            ],
            duration,
            interval,
        ),
        SampledCollector::new(
            "network",
            vec![MetricProbe {
                metric: "net".to_string(),
                kind: MetricKind::NetRates,
            }],
            duration,
            interval,
        ),
    ]
}
