use crate::model::{ReportModel, Sample, SeriesStats};
use crate::render::{fmt_unix, write_file, RenderError, Renderer};
use crate::render::text::summary_text;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const CHART_WIDTH: f64 = 640.0;
const CHART_HEIGHT: f64 = 160.0;
const CHART_PAD: f64 = 12.0;

pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn format_name(&self) -> &'static str {
        "html"
    }

    fn render(&self, model: &ReportModel, dir: &Path) -> Result<PathBuf, RenderError> {
        let path = dir.join("report.html");
        write_file(&path, &document(model))?;
        Ok(path)
    }
}

/// Neutralizes markup characters so captured probe output can never
/// inject elements into the report.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn document(model: &ReportModel) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<title>opsnap report</title>\n<style>\n");
    out.push_str(
        "body{font-family:sans-serif;margin:1.5em;max-width:70em}\
         pre{background:#f4f4f4;padding:0.8em;overflow-x:auto}\
         details{margin:0.4em 0;border:1px solid #ddd;padding:0.3em 0.6em}\
         summary{cursor:pointer;font-weight:bold}\
         .status-success{color:#1a7f37}.status-failure{color:#b42318}\
         .status-timed-out{color:#b45309}.status-skipped{color:#6b7280}\
         svg{border:1px solid #eee;background:#fcfcfc}\n",
    );
    out.push_str("</style>\n</head>\n<body>\n");
    let _ = writeln!(out, "<h1>opsnap report</h1>");
    let _ = writeln!(
        out,
        "<p>generated {}</p>",
        escape_html(&fmt_unix(model.generated_at_unix))
    );

    let _ = writeln!(out, "<h2>Summary</h2>");
    let _ = writeln!(out, "<pre>{}</pre>", escape_html(&summary_text(model)));

    let _ = writeln!(out, "<h2>Sampled metrics</h2>");
    if model.series.is_empty() {
        let _ = writeln!(out, "<p>no data</p>");
    }
    for (metric, samples) in &model.series {
        render_chart(&mut out, metric, samples);
    }

    let _ = writeln!(out, "<h2>Probes</h2>");
    if model.result_count() == 0 {
        let _ = writeln!(out, "<p>no data</p>");
    }
    for (section, results) in &model.sections {
        let _ = writeln!(out, "<h3>{}</h3>", escape_html(section.title()));
        for result in results {
            let status_class = result.status.label().replace(' ', "-");
            let body = if result.output.trim().is_empty() {
                match result.status {
                    crate::probe::ProbeStatus::Skipped => "not running".to_string(),
                    _ => "no data".to_string(),
                }
            } else {
                escape_html(&result.output)
            };
            let elapsed = result
                .finished_at_unix
                .saturating_sub(result.started_at_unix);
            let _ = writeln!(
                out,
                "<details><summary>{} <span class=\"status-{}\">[{}]</span></summary>\n\
                 <p><code>{}</code> ({elapsed}s, started {})</p>\n<pre>{}</pre>\n</details>",
                escape_html(&result.probe_name),
                status_class,
                escape_html(result.status.label()),
                escape_html(&result.command_line),
                escape_html(&fmt_unix(result.started_at_unix)),
                body
            );
        }
    }

    out.push_str("</body>\n</html>\n");
    out
}

fn render_chart(out: &mut String, metric: &str, samples: &[Sample]) {
    let Some(stats) = SeriesStats::compute(samples) else {
        let _ = writeln!(out, "<h3>{}</h3>\n<p>no data</p>", escape_html(metric));
        return;
    };

    let _ = writeln!(out, "<h3>{}</h3>", escape_html(metric));
    let _ = writeln!(
        out,
        "<p>{} samples, mean {:.2}, peak {:.2}, {} .. {}</p>",
        stats.count,
        stats.mean,
        stats.peak,
        escape_html(&fmt_unix(samples[0].tick_unix)),
        escape_html(&fmt_unix(samples[samples.len() - 1].tick_unix))
    );

    let min = samples
        .iter()
        .map(|s| s.value)
        .fold(f64::INFINITY, f64::min);
    let max = stats.peak;
    let span = (max - min).max(f64::EPSILON);
    let inner_w = CHART_WIDTH - 2.0 * CHART_PAD;
    let inner_h = CHART_HEIGHT - 2.0 * CHART_PAD;

    let mut points = String::new();
    for (i, sample) in samples.iter().enumerate() {
        let x = if samples.len() == 1 {
            CHART_WIDTH / 2.0
        } else {
            CHART_PAD + i as f64 * inner_w / (samples.len() - 1) as f64
        };
        let y = CHART_PAD + (1.0 - (sample.value - min) / span) * inner_h;
        let _ = write!(points, "{x:.1},{y:.1} ");
    }

    let _ = writeln!(
        out,
        "<svg width=\"{CHART_WIDTH}\" height=\"{CHART_HEIGHT}\" role=\"img\">\
         <polyline fill=\"none\" stroke=\"#2563eb\" stroke-width=\"1.5\" points=\"{}\"/></svg>",
        points.trim_end()
    );

    // Raw series travels as structured JSON, not as substituted markup.
    let payload = serde_json::json!({
        "metric": metric,
        "labels": samples.iter().map(|s| fmt_unix(s.tick_unix)).collect::<Vec<_>>(),
        "values": samples.iter().map(|s| s.value).collect::<Vec<_>>(),
    });
    let _ = writeln!(
        out,
        "<script type=\"application/json\" data-metric=\"{}\">{}</script>",
        escape_html(metric),
        payload
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeResult, ProbeStatus};
    use crate::registry::Section;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn empty_model() -> ReportModel {
        ReportModel {
            generated_at_unix: 1_700_000_000,
            duration: Duration::from_secs(60),
            sample_interval: Duration::from_secs(5),
            host: None,
            services: Vec::new(),
            sections: BTreeMap::new(),
            series: BTreeMap::new(),
        }
    }

    #[test]
    fn escaping_neutralizes_markup() {
        let escaped = escape_html("<script>alert(\"1\")</script> & more");
        assert!(!escaped.contains('<'));
        assert!(escaped.contains("&lt;script&gt;"));
        assert!(escaped.contains("&amp; more"));
    }

    #[test]
    fn zero_sample_model_renders_placeholder_document() {
        let html = document(&empty_model());
        assert!(html.contains("<h2>Sampled metrics</h2>"));
        assert!(html.contains("no data"));
        assert!(html.ends_with("</html>\n"));
    }

    #[test]
    fn probe_output_is_escaped_inside_details() {
        let mut model = empty_model();
        model.sections.insert(
            Section::Logs,
            vec![ProbeResult {
                probe_name: "journal".to_string(),
                command_line: "journalctl -n 10".to_string(),
                started_at_unix: 0,
                finished_at_unix: 0,
                status: ProbeStatus::Success,
                output: "<b>bold?</b>".to_string(),
            }],
        );
        let html = document(&model);
        assert!(html.contains("<details>"));
        assert!(html.contains("&lt;b&gt;bold?&lt;/b&gt;"));
        assert!(!html.contains("<b>bold?</b>"));
    }

    #[test]
    fn skipped_probe_gets_not_running_placeholder() {
        let mut model = empty_model();
        model.sections.insert(
            Section::Application,
            vec![ProbeResult {
                probe_name: "tomcat-journal".to_string(),
                command_line: "journalctl -u tomcat".to_string(),
                started_at_unix: 0,
                finished_at_unix: 0,
                status: ProbeStatus::Skipped,
                output: String::new(),
            }],
        );
        let html = document(&model);
        assert!(html.contains("not running"));
    }

    #[test]
    fn series_renders_svg_and_json_payload() {
        let mut model = empty_model();
        model.series.insert(
            "load1".to_string(),
            vec![
                Sample {
                    tick_unix: 100,
                    value: 0.5,
                },
                Sample {
                    tick_unix: 105,
                    value: 1.5,
                },
            ],
        );
        let html = document(&model);
        assert!(html.contains("<svg"));
        assert!(html.contains("<polyline"));
        assert!(html.contains("data-metric=\"load1\""));
        assert!(html.contains("\"values\":[0.5,1.5]"));
    }
}
