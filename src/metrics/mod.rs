use lazy_static::lazy_static;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{Once, OnceLock};
use std::time::{Instant, SystemTime};

use crate::utils::error::{AppError, Result};

static SERVICE_START_TIME: OnceLock<SystemTime> = OnceLock::new();
static REGISTER: Once = Once::new();

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref REQUEST_COUNTER: IntCounter = IntCounter::with_opts(
        Opts::new("meme_requests_total", "Total number of meme generation requests")
    ).expect("valid metric opts");

    pub static ref FAILURE_COUNTER: IntCounterVec = IntCounterVec::new(
        Opts::new("meme_failures_total", "Rejected or failed meme generation requests"),
        &["reason"]
    ).expect("valid metric opts");

    pub static ref RESPONSE_TIME: Histogram = Histogram::with_opts(
        HistogramOpts::new("meme_response_duration_seconds", "Response time for meme requests")
    ).expect("valid metric opts");

    pub static ref IMAGE_PROCESSING_TIME: Histogram = Histogram::with_opts(
        HistogramOpts::new("meme_image_processing_duration_seconds", "Time spent compositing images")
    ).expect("valid metric opts");

    pub static ref SERVICE_UPTIME_SECONDS: Gauge = Gauge::with_opts(
        Opts::new("service_uptime_seconds", "Service uptime in seconds")
    ).expect("valid metric opts");
}

/// Registers every collector once; later calls are no-ops.
pub fn init_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(REQUEST_COUNTER.clone()),
            Box::new(FAILURE_COUNTER.clone()),
            Box::new(RESPONSE_TIME.clone()),
            Box::new(IMAGE_PROCESSING_TIME.clone()),
            Box::new(SERVICE_UPTIME_SECONDS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::error!("failed to register metric: {}", e);
            }
        }
    });
}

pub fn set_service_start_time(start_time: SystemTime) {
    SERVICE_START_TIME.set(start_time).ok();
}

pub fn get_metrics() -> Result<String> {
    if let Some(start_time) = SERVICE_START_TIME.get() {
        if let Ok(uptime) = start_time.elapsed() {
            SERVICE_UPTIME_SECONDS.set(uptime.as_secs() as f64);
        }
    }

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(format!("failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| AppError::Internal(format!("metrics not utf-8: {}", e)))
}

/// Observes the elapsed time into `histogram` when dropped.
pub struct Timer {
    start: Instant,
    histogram: &'static Histogram,
}

impl Timer {
    pub fn new(histogram: &'static Histogram) -> Self {
        Self {
            start: Instant::now(),
            histogram,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.histogram.observe(duration.as_secs_f64());
    }
}

#[macro_export]
macro_rules! time_operation {
    ($histogram:expr, $operation:expr) => {{
        let _timer = $crate::metrics::Timer::new($histogram);
        $operation
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_exports_text() {
        init_metrics();
        init_metrics();
        REQUEST_COUNTER.inc();
        FAILURE_COUNTER.with_label_values(&["missing_image"]).inc();

        let text = get_metrics().unwrap();
        assert!(text.contains("meme_requests_total"));
        assert!(text.contains("meme_failures_total{reason=\"missing_image\"}"));
    }

    #[test]
    fn timer_observes_on_drop() {
        let before = IMAGE_PROCESSING_TIME.get_sample_count();
        let value = time_operation!(&IMAGE_PROCESSING_TIME, 21 * 2);
        assert_eq!(value, 42);
        assert_eq!(IMAGE_PROCESSING_TIME.get_sample_count(), before + 1);
    }
}
