use std::net::SocketAddr;
use tracing::{info, warn};

/// Install the Prometheus exporter on `addr`. Without one the `metrics`
/// macros are no-ops.
pub fn init_metrics(addr: Option<SocketAddr>) {
    let Some(addr) = addr else {
        return;
    };
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
    }
}
