pub mod csv;
pub mod html;
pub mod text;

use crate::model::ReportModel;
use chrono::{Local, TimeZone};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// One output format. Renderers only read the frozen model; a failing
/// format never stops the others.
pub trait Renderer {
    fn format_name(&self) -> &'static str;
    fn render(&self, model: &ReportModel, dir: &Path) -> Result<PathBuf, RenderError>;
}

pub fn all_renderers() -> Vec<Box<dyn Renderer>> {
    vec![
        Box::new(text::TextRenderer),
        Box::new(html::HtmlRenderer),
        Box::new(csv::CsvRenderer),
    ]
}

/// Renders every format, returning the paths that succeeded.
pub fn render_all(model: &ReportModel, dir: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for renderer in all_renderers() {
        match renderer.render(model, dir) {
            Ok(path) => {
                info!(format = renderer.format_name(), path = %path.display(), "report rendered");
                paths.push(path);
            }
            Err(err) => {
                error!(format = renderer.format_name(), error = %err, "renderer failed");
            }
        }
    }
    paths
}

pub(crate) fn write_file(path: &Path, contents: &str) -> Result<(), RenderError> {
    std::fs::write(path, contents).map_err(|source| RenderError::Write {
        path: path.display().to_string(),
        source,
    })
}

pub(crate) fn fmt_unix(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

pub(crate) fn fmt_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// File-name-safe version of a metric name.
pub(crate) fn safe_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn empty_model() -> ReportModel {
        ReportModel {
            generated_at_unix: 0,
            duration: Duration::from_secs(10),
            sample_interval: Duration::from_secs(5),
            host: None,
            services: Vec::new(),
            sections: BTreeMap::new(),
            series: BTreeMap::new(),
        }
    }

    #[test]
    fn all_formats_render_into_the_report_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = render_all(&empty_model(), dir.path());
        assert_eq!(paths.len(), all_renderers().len());
        assert!(dir.path().join("summary.txt").is_file());
        assert!(dir.path().join("report.html").is_file());
        assert!(dir.path().join("metrics").is_dir());
    }

    #[test]
    fn renderer_failures_are_isolated_not_panics() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let paths = render_all(&empty_model(), &blocker.join("sub"));
        assert!(paths.is_empty());
    }

    #[test]
    fn bytes_formatting() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KiB");
        assert_eq!(fmt_bytes(3 * 1024 * 1024 * 1024 / 2), "1.5 GiB");
    }

    #[test]
    fn metric_names_become_safe_stems() {
        assert_eq!(safe_file_stem("net-rx-eth0"), "net-rx-eth0");
        assert_eq!(safe_file_stem("a/b c"), "a_b_c");
    }
}
