//! Metrics export for Gridlink.
//!
//! Path counters live in the engine as atomics; this module copies their
//! snapshots into the `metrics` facade on every stats interval and exports
//! them in Prometheus format.

use crate::supernode::{PathInfo, SuperNode};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Metric names.
pub mod names {
    pub const PATH_RECEIVED: &str = "gridlink_path_received_total";
    pub const PATH_EMITTED: &str = "gridlink_path_emitted_total";
    pub const PATH_SKIPPED: &str = "gridlink_path_skipped_total";
    pub const PATH_ERRORS: &str = "gridlink_path_errors_total";
    pub const PATH_RUNNING: &str = "gridlink_path_running";
    pub const DESTINATION_WRITTEN: &str = "gridlink_destination_written_total";
    pub const DESTINATION_DROPPED: &str = "gridlink_destination_dropped_total";
    pub const DESTINATION_QUEUED: &str = "gridlink_destination_queued";
    pub const DESTINATION_HEALTHY: &str = "gridlink_destination_healthy";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::PATH_RECEIVED, "Samples read from source nodes");
    metrics::describe_counter!(names::PATH_EMITTED, "Samples leaving the path pipeline");
    metrics::describe_counter!(
        names::PATH_SKIPPED,
        "Samples skipped by hooks, by stage"
    );
    metrics::describe_counter!(names::PATH_ERRORS, "Read and hook failures, by kind");
    metrics::describe_gauge!(names::PATH_RUNNING, "Whether the path is running");
    metrics::describe_counter!(names::DESTINATION_WRITTEN, "Samples accepted by the destination node");
    metrics::describe_counter!(
        names::DESTINATION_DROPPED,
        "Samples dropped on queue overflow or shutdown"
    );
    metrics::describe_gauge!(names::DESTINATION_QUEUED, "Samples waiting in the destination queue");
    metrics::describe_gauge!(names::DESTINATION_HEALTHY, "Whether writes to the destination succeed");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;

    PrometheusBuilder::new().with_http_listener(addr).install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Copy the counters of one path into the facade.
pub fn record_path(path: &PathInfo) {
    let name = path.name.clone();
    gauge!(names::PATH_RUNNING, "path" => name.clone()).set(f64::from(u8::from(matches!(
        path.state,
        "started" | "pausing" | "paused" | "resuming"
    ))));

    let Some(stats) = &path.stats else {
        return;
    };
    counter!(names::PATH_RECEIVED, "path" => name.clone()).absolute(stats.received);
    counter!(names::PATH_EMITTED, "path" => name.clone()).absolute(stats.emitted);
    counter!(names::PATH_SKIPPED, "path" => name.clone(), "stage" => "source").absolute(stats.source_skipped);
    counter!(names::PATH_SKIPPED, "path" => name.clone(), "stage" => "path").absolute(stats.hook_skipped);
    counter!(names::PATH_ERRORS, "path" => name.clone(), "kind" => "read").absolute(stats.read_errors);
    counter!(names::PATH_ERRORS, "path" => name.clone(), "kind" => "hook").absolute(stats.hook_errors);
    counter!(names::PATH_ERRORS, "path" => name.clone(), "kind" => "backpressure").absolute(stats.backpressure);

    for dest in &stats.destinations {
        let labels = [("path", name.clone()), ("node", dest.node.clone())];
        counter!(names::DESTINATION_WRITTEN, &labels).absolute(dest.written);
        counter!(names::DESTINATION_DROPPED, &labels).absolute(dest.dropped);
        gauge!(names::DESTINATION_QUEUED, &labels).set(dest.queued as f64);
        gauge!(names::DESTINATION_HEALTHY, &labels).set(f64::from(u8::from(dest.healthy)));
    }
}

/// Publish path counters every `interval` until `cancel` fires.
pub async fn publish(supernode: Arc<SuperNode>, interval: Duration, cancel: CancellationToken) {
    if interval.is_zero() {
        return;
    }
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for path in supernode.paths() {
                    record_path(&path);
                }
            }
        }
    }
}
