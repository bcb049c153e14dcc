use crate::collectors::HostSummary;
use crate::probe::ProbeResult;
use crate::registry::Section;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// One point in a metric time series.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Sample {
    pub tick_unix: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SeriesStats {
    pub count: usize,
    pub mean: f64,
    pub peak: f64,
}

impl SeriesStats {
    pub fn compute(samples: &[Sample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let sum: f64 = samples.iter().map(|s| s.value).sum();
        let peak = samples
            .iter()
            .map(|s| s.value)
            .fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            count: samples.len(),
            mean: sum / samples.len() as f64,
            peak,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub name: String,
    pub running: bool,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct ProcessStat {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct DiskStat {
    pub device: String,
    pub mount: String,
    pub file_system: String,
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// Frozen aggregate of one run, handed to the renderers. Probe results
/// keep per-section registration order; series keep tick order.
#[derive(Debug, Clone)]
pub struct ReportModel {
    pub generated_at_unix: i64,
    pub duration: Duration,
    pub sample_interval: Duration,
    pub host: Option<HostSummary>,
    pub services: Vec<ServiceStatus>,
    pub sections: BTreeMap<Section, Vec<ProbeResult>>,
    pub series: BTreeMap<String, Vec<Sample>>,
}

impl ReportModel {
    pub fn result_for(&self, probe_name: &str) -> Option<&ProbeResult> {
        self.sections
            .values()
            .flat_map(|results| results.iter())
            .find(|r| r.probe_name == probe_name)
    }

    pub fn result_count(&self) -> usize {
        self.sections.values().map(|r| r.len()).sum()
    }
}

#[derive(Debug, Default)]
struct AggregatorInner {
    host: Option<HostSummary>,
    services: Vec<ServiceStatus>,
    sections: BTreeMap<Section, Vec<ProbeResult>>,
    series: BTreeMap<String, Vec<Sample>>,
}

/// Append-only result store shared between the orchestration sequence and
/// the sampler tasks. `snapshot` is only called after every producer has
/// been joined, so it always sees a complete, settled view.
#[derive(Clone)]
pub struct ReportAggregator {
    inner: Arc<RwLock<AggregatorInner>>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(AggregatorInner::default())),
        }
    }

    pub async fn set_host(&self, host: HostSummary) {
        self.inner.write().await.host = Some(host);
    }

    pub async fn set_services(&self, services: Vec<ServiceStatus>) {
        self.inner.write().await.services = services;
    }

    pub async fn record(&self, section: Section, result: ProbeResult) {
        self.inner
            .write()
            .await
            .sections
            .entry(section)
            .or_default()
            .push(result);
    }

    pub async fn record_sample(&self, metric: &str, sample: Sample) {
        self.inner
            .write()
            .await
            .series
            .entry(metric.to_string())
            .or_default()
            .push(sample);
    }

    pub async fn snapshot(&self, duration: Duration, sample_interval: Duration) -> ReportModel {
        let inner = self.inner.read().await;
        ReportModel {
            generated_at_unix: crate::probe::now_unix(),
            duration,
            sample_interval,
            host: inner.host.clone(),
            services: inner.services.clone(),
            sections: inner.sections.clone(),
            series: inner.series.clone(),
        }
    }
}

impl Default for ReportAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeStatus;

    fn result(name: &str, status: ProbeStatus) -> ProbeResult {
        ProbeResult {
            probe_name: name.to_string(),
            command_line: "true".to_string(),
            started_at_unix: 0,
            finished_at_unix: 0,
            status,
            output: String::new(),
        }
    }

    #[tokio::test]
    async fn records_keep_per_section_order() {
        let agg = ReportAggregator::new();
        agg.record(Section::SystemInfo, result("a", ProbeStatus::Success))
            .await;
        agg.record(Section::SystemInfo, result("b", ProbeStatus::Failure))
            .await;
        agg.record(Section::Network, result("c", ProbeStatus::Skipped))
            .await;

        let model = agg
            .snapshot(Duration::from_secs(10), Duration::from_secs(5))
            .await;
        let sys = &model.sections[&Section::SystemInfo];
        assert_eq!(sys.len(), 2);
        assert_eq!(sys[0].probe_name, "a");
        assert_eq!(sys[1].probe_name, "b");
        assert_eq!(model.result_count(), 3);
        assert!(model.result_for("c").is_some());
    }

    #[tokio::test]
    async fn samples_are_append_only_in_tick_order() {
        let agg = ReportAggregator::new();
        for tick in [10, 20, 30] {
            agg.record_sample(
                "load1",
                Sample {
                    tick_unix: tick,
                    value: tick as f64,
                },
            )
            .await;
        }
        let model = agg
            .snapshot(Duration::from_secs(30), Duration::from_secs(10))
            .await;
        let series = &model.series["load1"];
        let ticks: Vec<i64> = series.iter().map(|s| s.tick_unix).collect();
        assert_eq!(ticks, vec![10, 20, 30]);
    }

    #[test]
    fn stats_mean_and_peak() {
        let samples = [
            Sample {
                tick_unix: 1,
                value: 1.0,
            },
            Sample {
                tick_unix: 2,
                value: 3.0,
            },
            Sample {
                tick_unix: 3,
                value: 2.0,
            },
        ];
        let stats = SeriesStats::compute(&samples).unwrap();
        assert_eq!(stats.count, 3);
        assert!((stats.mean - 2.0).abs() < f64::EPSILON);
        assert!((stats.peak - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stats_empty_series_is_none() {
        assert!(SeriesStats::compute(&[]).is_none());
    }
}
