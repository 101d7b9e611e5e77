//! Prometheus metrics HTTP endpoint
//!
//! Exposes tracker metrics in Prometheus text format at /metrics and a
//! liveness check at /health. Uses hyper for the HTTP server.
//! Scrapes never reset counters, and the latency histogram is cumulative
//! since startup regardless of the periodic log report.

use crate::infra::metrics::{LatencyHistogram, Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    hist: &LatencyHistogram,
    bounds: &[u64; 10],
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += hist.buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += hist.buckets[hist.buckets.len() - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {}", hist.sum_us);
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.peek();
    let mut output = String::with_capacity(4096);

    write_frame_metrics(&mut output, site_id, &summary, &metrics.latency_histogram());
    write_detection_metrics(&mut output, site_id, &summary);
    write_track_metrics(&mut output, site_id, &summary);
    write_zone_metrics(&mut output, site_id, &summary, metrics);
    write_egress_metrics(&mut output, site_id, &summary);

    output
}

fn write_frame_metrics(
    output: &mut String,
    site: &str,
    summary: &MetricsSummary,
    latency: &LatencyHistogram,
) {
    write_metric(
        output,
        "zone_tracker_frames_total",
        "Total frames processed",
        MetricType::Counter,
        site,
        summary.frames_total,
    );
    write_histogram(
        output,
        "zone_tracker_frame_latency_us",
        "Frame processing latency in microseconds",
        site,
        latency,
        &METRICS_BUCKET_BOUNDS,
    );
    write_metric(
        output,
        "zone_tracker_frame_latency_p99_us",
        "99th percentile frame latency",
        MetricType::Gauge,
        site,
        summary.lat_p99_us,
    );
    write_metric(
        output,
        "zone_tracker_frames_malformed_total",
        "Input lines that failed to parse",
        MetricType::Counter,
        site,
        summary.frames_malformed,
    );
}

fn write_detection_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "zone_tracker_detections_total",
        "Detections received",
        MetricType::Counter,
        site,
        summary.detections_total,
    );
    write_metric(
        output,
        "zone_tracker_detections_degenerate_total",
        "Detections skipped for degenerate geometry",
        MetricType::Counter,
        site,
        summary.detections_degenerate,
    );
    write_metric(
        output,
        "zone_tracker_detections_low_confidence_total",
        "Detections below the confidence floor",
        MetricType::Counter,
        site,
        summary.detections_low_confidence,
    );
}

fn write_track_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "zone_tracker_active_tracks",
        "Live tracks across all sessions",
        MetricType::Gauge,
        site,
        summary.active_tracks,
    );
    write_metric(
        output,
        "zone_tracker_active_sessions",
        "Sessions currently running",
        MetricType::Gauge,
        site,
        summary.active_sessions,
    );
    write_metric(
        output,
        "zone_tracker_tracks_created_total",
        "Tracks created",
        MetricType::Counter,
        site,
        summary.tracks_created,
    );
    write_metric(
        output,
        "zone_tracker_tracks_removed_total",
        "Tracks retired",
        MetricType::Counter,
        site,
        summary.tracks_removed,
    );
}

fn write_zone_metrics(output: &mut String, site: &str, summary: &MetricsSummary, metrics: &Metrics) {
    write_metric(
        output,
        "zone_tracker_zone_enters_total",
        "Zone ENTER events",
        MetricType::Counter,
        site,
        summary.zone_enters,
    );
    write_metric(
        output,
        "zone_tracker_zone_exits_total",
        "Zone EXIT events, synthetic included",
        MetricType::Counter,
        site,
        summary.zone_exits,
    );
    write_metric(
        output,
        "zone_tracker_synthetic_exits_total",
        "Zone EXIT events synthesized on track retirement",
        MetricType::Counter,
        site,
        summary.synthetic_exits,
    );

    let _ = writeln!(output, "# HELP zone_tracker_zone_occupancy Tracks currently inside each zone");
    let _ = writeln!(output, "# TYPE zone_tracker_zone_occupancy gauge");
    for (zone_id, count) in metrics.zone_occupancy() {
        let _ = writeln!(
            output,
            "zone_tracker_zone_occupancy{{site=\"{site}\",zone_id=\"{zone_id}\"}} {count}"
        );
    }
}

fn write_egress_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "zone_tracker_egress_written_total",
        "Egress records written",
        MetricType::Counter,
        site,
        summary.egress_written,
    );
    write_metric(
        output,
        "zone_tracker_egress_dropped_total",
        "Egress messages dropped",
        MetricType::Counter,
        site,
        summary.egress_dropped,
    );
    write_metric(
        output,
        "zone_tracker_egress_errors_total",
        "Egress write failures",
        MetricType::Counter,
        site,
        summary.egress_errors,
    );
}

fn text_response(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => text_response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&metrics, &site_id),
        ),
        (&Method::GET, "/health") => {
            text_response(StatusCode::OK, "text/plain", "ok".to_string())
        }
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    };
    Ok(response)
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, metrics, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ZoneId;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.set_zones(&[ZoneId(1), ZoneId(2)]);

        metrics.record_frame_processed(150);
        metrics.record_frame_processed(250);
        metrics.record_tracks_created(3);
        metrics.record_zone_enter(ZoneId(2));

        let output = format_prometheus_metrics(&metrics, "store-1");

        assert!(output.contains("zone_tracker_frames_total{site=\"store-1\"} 2"));
        assert!(output.contains("zone_tracker_frame_latency_us_bucket{site=\"store-1\",le=\"200\"} 1"));
        assert!(output.contains("zone_tracker_frame_latency_us_bucket{site=\"store-1\",le=\"+Inf\"} 2"));
        assert!(output.contains("zone_tracker_active_tracks{site=\"store-1\"} 3"));
        assert!(output.contains("zone_tracker_zone_occupancy{site=\"store-1\",zone_id=\"2\"} 1"));
        assert!(output.contains("zone_tracker_zone_occupancy{site=\"store-1\",zone_id=\"1\"} 0"));
    }

    #[test]
    fn test_scrape_does_not_reset_periodic_counters() {
        let metrics = Metrics::new();
        metrics.record_frame_processed(150);

        let _ = format_prometheus_metrics(&metrics, "s");
        let output = format_prometheus_metrics(&metrics, "s");
        assert!(output.contains("zone_tracker_frame_latency_us_count{site=\"s\"} 1"));
    }

    #[test]
    fn test_latency_histogram_monotonic_across_reports() {
        let metrics = Metrics::new();
        metrics.record_frame_processed(150);
        metrics.record_frame_processed(250);
        let _ = metrics.report();
        metrics.record_frame_processed(150);

        let output = format_prometheus_metrics(&metrics, "s");
        assert!(output.contains("zone_tracker_frame_latency_us_bucket{site=\"s\",le=\"200\"} 2"));
        assert!(output.contains("zone_tracker_frame_latency_us_count{site=\"s\"} 3"));
        assert!(output.contains("zone_tracker_frame_latency_us_sum{site=\"s\"} 550"));
    }
}
