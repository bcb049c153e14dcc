use crate::model::{ReportModel, SeriesStats};
use crate::probe::ProbeStatus;
use crate::registry::LISTENING_SOCKETS_PROBE;
use crate::render::{fmt_bytes, fmt_unix, write_file, RenderError, Renderer};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const LISTENING_PORT_LINES: usize = 10;

pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn format_name(&self) -> &'static str {
        "text"
    }

    fn render(&self, model: &ReportModel, dir: &Path) -> Result<PathBuf, RenderError> {
        let path = dir.join("summary.txt");
        write_file(&path, &summary_text(model))?;
        Ok(path)
    }
}

/// The fixed-structure digest. Shared with the HTML renderer, which
/// embeds the same text at the top of the document.
pub fn summary_text(model: &ReportModel) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "opsnap diagnostic summary");
    let _ = writeln!(out, "generated: {}", fmt_unix(model.generated_at_unix));
    let _ = writeln!(
        out,
        "sampling: {} window, {} interval",
        humantime::format_duration(model.duration),
        humantime::format_duration(model.sample_interval)
    );

    let _ = writeln!(out, "\n== Host ==");
    match &model.host {
        Some(host) => {
            let unknown = || "unknown".to_string();
            let _ = writeln!(
                out,
                "hostname: {}",
                host.host_name.clone().unwrap_or_else(unknown)
            );
            let _ = writeln!(
                out,
                "os: {} {} (kernel {})",
                host.os_name.clone().unwrap_or_else(unknown),
                host.os_version.clone().unwrap_or_else(unknown),
                host.kernel_version.clone().unwrap_or_else(unknown)
            );
            let _ = writeln!(
                out,
                "cpu: {} ({} cores)",
                host.cpu_brand.clone().unwrap_or_else(unknown),
                host.cpu_core_count
            );
            let _ = writeln!(
                out,
                "memory: {} used / {} total",
                fmt_bytes(host.memory_used_bytes),
                fmt_bytes(host.memory_total_bytes)
            );
            let _ = writeln!(
                out,
                "load average: {:.2} {:.2} {:.2}",
                host.load_avg_one, host.load_avg_five, host.load_avg_fifteen
            );
            let _ = writeln!(
                out,
                "uptime: {}",
                humantime::format_duration(std::time::Duration::from_secs(host.uptime_seconds))
            );
            let _ = writeln!(out, "processes: {}", host.process_count);
        }
        None => {
            let _ = writeln!(out, "no data");
        }
    }

    let _ = writeln!(out, "\n== Services ==");
    if model.services.is_empty() {
        let _ = writeln!(out, "no services configured");
    }
    for service in &model.services {
        let state = if service.running { "running" } else { "stopped" };
        let _ = writeln!(out, "{}: {} ({})", service.name, state, service.detail);
    }

    if let Some(host) = &model.host {
        let _ = writeln!(out, "\n== Top processes by CPU ==");
        if host.top_by_cpu.is_empty() {
            let _ = writeln!(out, "no data");
        }
        for p in &host.top_by_cpu {
            let _ = writeln!(
                out,
                "{:>8}  {:>6.1}%  {:>10}  {}",
                p.pid,
                p.cpu_percent,
                fmt_bytes(p.memory_bytes),
                p.name
            );
        }

        let _ = writeln!(out, "\n== Top processes by memory ==");
        if host.top_by_memory.is_empty() {
            let _ = writeln!(out, "no data");
        }
        for p in &host.top_by_memory {
            let _ = writeln!(
                out,
                "{:>8}  {:>6.1}%  {:>10}  {}",
                p.pid,
                p.cpu_percent,
                fmt_bytes(p.memory_bytes),
                p.name
            );
        }

        let _ = writeln!(out, "\n== Disks ==");
        if host.disks.is_empty() {
            let _ = writeln!(out, "no data");
        }
        for d in &host.disks {
            let pct = if d.total_bytes > 0 {
                d.used_bytes as f64 / d.total_bytes as f64 * 100.0
            } else {
                0.0
            };
            let _ = writeln!(
                out,
                "{} on {} ({}): {} / {} ({pct:.1}%)",
                d.device,
                d.mount,
                d.file_system,
                fmt_bytes(d.used_bytes),
                fmt_bytes(d.total_bytes)
            );
        }
    }

    let _ = writeln!(out, "\n== Listening ports ==");
    let listening = model
        .result_for(LISTENING_SOCKETS_PROBE)
        .filter(|r| r.status == ProbeStatus::Success && !r.output.trim().is_empty());
    match listening {
        Some(result) => {
            for line in result.output.lines().take(LISTENING_PORT_LINES) {
                let _ = writeln!(out, "{line}");
            }
        }
        None => {
            let _ = writeln!(out, "no data");
        }
    }

    let _ = writeln!(out, "\n== Probes ==");
    if model.result_count() == 0 {
        let _ = writeln!(out, "no data");
    }
    for (section, results) in &model.sections {
        let _ = writeln!(out, "[{}]", section.title());
        for result in results {
            let first_line = result.output.lines().next().unwrap_or("").trim();
            let mut excerpt: String = first_line.chars().take(80).collect();
            if !excerpt.is_empty() {
                excerpt.insert_str(0, " | ");
            }
            let _ = writeln!(
                out,
                "{}: {}{excerpt}",
                result.probe_name,
                result.status.label()
            );
        }
    }

    let _ = writeln!(out, "\n== Sampled metrics ==");
    if model.series.is_empty() {
        let _ = writeln!(out, "no data");
    }
    for (metric, samples) in &model.series {
        match SeriesStats::compute(samples) {
            Some(stats) => {
                let _ = writeln!(
                    out,
                    "{metric}: {} samples, mean {:.2}, peak {:.2}",
                    stats.count, stats.mean, stats.peak
                );
            }
            None => {
                let _ = writeln!(out, "{metric}: no data");
            }
        }
    }

    out
}
