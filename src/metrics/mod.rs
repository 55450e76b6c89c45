use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::info;
use tracing::warn;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

lazy_static! {
    pub static ref WORKQUEUE_ADDS: IntCounterVec = IntCounterVec::new(
        Opts::new("workqueue_adds_total", "Total number of keys added to a work queue"),
        &["name"]
    )
    .expect("metric can not be created");

    pub static ref WORKQUEUE_DEPTH: IntGaugeVec = IntGaugeVec::new(
        Opts::new("workqueue_depth", "Number of keys waiting to be retrieved"),
        &["name"]
    )
    .expect("metric can not be created");

    pub static ref WORKQUEUE_RETRIES: IntCounterVec = IntCounterVec::new(
        Opts::new("workqueue_retries_total", "Total number of rate-limited requeues"),
        &["name"]
    )
    .expect("metric can not be created");

    pub static ref RECONCILE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("reconcile_total", "Reconciliation passes by outcome"),
        &["controller", "result"]
    )
    .expect("metric can not be created");

    pub static ref RECONCILE_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "reconcile_duration_seconds",
            "Histogram of reconciliation pass duration in seconds"
        )
        .buckets(exponential_buckets(0.001, 2.0, 15).expect("valid buckets")),
        &["controller"]
    )
    .expect("metric can not be created");

    pub static ref DYNAMIC_WATCHES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("dynamic_watches", "Number of active per-kind watches"),
        &["controller"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

/// Registers every collector of this crate with `registry`.
///
/// Registering twice is reported and otherwise ignored.
pub fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(WORKQUEUE_ADDS.clone()),
        Box::new(WORKQUEUE_DEPTH.clone()),
        Box::new(WORKQUEUE_RETRIES.clone()),
        Box::new(RECONCILE_TOTAL.clone()),
        Box::new(RECONCILE_DURATION.clone()),
        Box::new(DYNAMIC_WATCHES.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            warn!("collector can not be registered: {:?}", e);
        }
    }
}

pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    let (addr, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    info!(%addr, "metrics server listening");
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(gather_text(&REGISTRY))
}

/// Renders `registry` in the Prometheus text exposition format.
pub fn gather_text(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        warn!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            warn!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
