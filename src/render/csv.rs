use crate::model::ReportModel;
use crate::render::{safe_file_stem, write_file, RenderError, Renderer};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Writes one `metrics/<metric>.csv` time series per sampled metric.
/// With no sampled data the directory is still created so the layout
/// is the same on every run.
pub struct CsvRenderer;

impl Renderer for CsvRenderer {
    fn format_name(&self) -> &'static str {
        "csv"
    }

    fn render(&self, model: &ReportModel, dir: &Path) -> Result<PathBuf, RenderError> {
        let metrics_dir = dir.join("metrics");
        std::fs::create_dir_all(&metrics_dir).map_err(|source| RenderError::Write {
            path: metrics_dir.display().to_string(),
            source,
        })?;

        for (metric, samples) in &model.series {
            let mut contents = String::from("timestamp,metric,value\n");
            for sample in samples {
                let _ = writeln!(contents, "{},{metric},{}", sample.tick_unix, sample.value);
            }
            let path = metrics_dir.join(format!("{}.csv", safe_file_stem(metric)));
            write_file(&path, &contents)?;
        }

        Ok(metrics_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sample;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn model_with_series() -> ReportModel {
        let mut series = BTreeMap::new();
        series.insert(
            "load1".to_string(),
            vec![
                Sample {
                    tick_unix: 100,
                    value: 0.5,
                },
                Sample {
                    tick_unix: 105,
                    value: 0.75,
                },
            ],
        );
        ReportModel {
            generated_at_unix: 0,
            duration: Duration::from_secs(10),
            sample_interval: Duration::from_secs(5),
            host: None,
            services: Vec::new(),
            sections: BTreeMap::new(),
            series,
        }
    }

    #[test]
    fn writes_one_csv_per_metric() {
        let dir = tempfile::tempdir().unwrap();
        let metrics_dir = CsvRenderer.render(&model_with_series(), dir.path()).unwrap();
        let contents = std::fs::read_to_string(metrics_dir.join("load1.csv")).unwrap();
        assert!(contents.starts_with("timestamp,metric,value\n"));
        assert!(contents.contains("100,load1,0.5"));
        assert!(contents.contains("105,load1,0.75"));
    }

    #[test]
    fn empty_series_still_creates_metrics_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = model_with_series();
        model.series.clear();
        let metrics_dir = CsvRenderer.render(&model, dir.path()).unwrap();
        assert!(metrics_dir.is_dir());
    }
}
