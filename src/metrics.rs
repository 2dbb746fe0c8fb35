// Prometheus metrics for the opswatch monitor
//
// Exposes metrics on /metrics HTTP endpoint:
// - Rate limiter decisions and tracked keys (counter, gauge)
// - Anti-forgery token validations (counter)
// - Snapshot refresh outcomes and durations per domain (counter, histogram)
// - Latest status severity per domain (gauge)
// - Change notifications and dispatched batches (counter)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Rate limiter metrics
    pub static ref RATE_LIMIT_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ratelimit_decisions_total", "Admission decisions by outcome"),
        &["outcome"]
    ).expect("Failed to create rate limit decisions metric");

    pub static ref RATE_LIMIT_TRACKED_KEYS: IntGauge = IntGauge::new(
        "ratelimit_tracked_keys",
        "Number of keys currently held by the limiter registry"
    ).expect("Failed to create tracked keys metric");

    pub static ref RATE_LIMIT_SWEPT_TOTAL: IntCounter = IntCounter::new(
        "ratelimit_swept_total",
        "Expired limiter entries removed by cleanup sweeps"
    ).expect("Failed to create swept entries metric");

    // Token metrics
    pub static ref CSRF_VALIDATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("csrf_validations_total", "Anti-forgery token validations by result"),
        &["result"]
    ).expect("Failed to create token validations metric");

    // Snapshot metrics
    pub static ref SNAPSHOT_REFRESH_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("snapshot_refresh_total", "Snapshot refreshes by domain and outcome"),
        &["domain", "outcome"]
    ).expect("Failed to create snapshot refresh metric");

    pub static ref SNAPSHOT_REFRESH_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("snapshot_refresh_duration_seconds", "Snapshot refresh duration in seconds"),
        &["domain"]
    ).expect("Failed to create snapshot refresh duration metric");

    pub static ref DOMAIN_STATUS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("domain_status", "Latest status severity per domain (0 ok, 1 warn, 2 bad)"),
        &["domain"]
    ).expect("Failed to create domain status metric");

    // Change notification metrics
    pub static ref CHANGE_NOTIFICATIONS_TOTAL: IntCounter = IntCounter::new(
        "change_notifications_total",
        "Change notifications received by multiplexers"
    ).expect("Failed to create change notifications metric");

    pub static ref CHANGE_BATCHES_TOTAL: IntCounter = IntCounter::new(
        "change_batches_total",
        "Coalesced change batches dispatched to callbacks"
    ).expect("Failed to create change batches metric");
}

/// Register every collector with [`REGISTRY`]
///
/// Safe to call more than once; collectors already registered are skipped.
pub fn init() -> prometheus::Result<()> {
    register(Box::new(RATE_LIMIT_DECISIONS_TOTAL.clone()))?;
    register(Box::new(RATE_LIMIT_TRACKED_KEYS.clone()))?;
    register(Box::new(RATE_LIMIT_SWEPT_TOTAL.clone()))?;
    register(Box::new(CSRF_VALIDATIONS_TOTAL.clone()))?;
    register(Box::new(SNAPSHOT_REFRESH_TOTAL.clone()))?;
    register(Box::new(SNAPSHOT_REFRESH_DURATION_SECONDS.clone()))?;
    register(Box::new(DOMAIN_STATUS.clone()))?;
    register(Box::new(CHANGE_NOTIFICATIONS_TOTAL.clone()))?;
    register(Box::new(CHANGE_BATCHES_TOTAL.clone()))?;
    Ok(())
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> prometheus::Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
