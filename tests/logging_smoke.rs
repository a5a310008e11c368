use std::io;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use hexwatch::{
    build_flush_report, dashboard_router, log_app_bind, log_app_start, log_config_loaded,
    log_sources_selected, parse_address_list, Chain, DashboardApp, DashboardConfig,
    DirCsvSource, FlushTargets, HttpTransport, LoggingConfig, RetryPolicy, SubgraphClient,
    TransactionKind, TransportError, FLUSH_ADDRESS,
};
use tower::util::ServiceExt;
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

#[test]
fn malformed_address_filter_logs_warning() {
    let logs = capture_logs(Level::INFO, || {
        let filter = parse_address_list("0x12, not-an-address");
        assert!(filter.as_filter().is_none());
    });

    assert!(logs.contains("\"event\":\"address.filter.rejected\""));
    assert!(logs.contains("\"level\":\"WARN\""));
}

#[test]
fn dropped_csv_rows_are_only_logged_at_debug() {
    let text = format!(
        "header\n2|short,row\n3|0xa,1,0,1709294400,{FLUSH_ADDRESS},0x1111111111111111111111111111111111111111,,5,,,,,,,\n"
    );

    let info_logs = capture_logs(Level::INFO, || {
        build_flush_report(TransactionKind::Send, &text, &FlushTargets::default());
    });
    assert!(info_logs.contains("\"event\":\"flush.report.built\""));
    assert!(!info_logs.contains("flush.parse.rows_dropped"));

    let debug_logs = capture_logs(Level::DEBUG, || {
        build_flush_report(TransactionKind::Send, &text, &FlushTargets::default());
    });
    assert!(debug_logs.contains("\"event\":\"flush.parse.rows_dropped\""));
}

#[test]
fn server_lifecycle_helpers_emit_baseline_events() {
    let logs = capture_logs(Level::INFO, || {
        let cfg = LoggingConfig::default();
        log_app_start(&cfg);
        log_config_loaded(&DashboardConfig::default());
        log_sources_selected(
            Chain::PulseChain.as_str(),
            Chain::PulseChain.default_subgraph_url(),
            "public",
        );
        log_app_bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"event\":\"config.loaded\""));
    assert!(logs.contains("\"event\":\"source.selected\""));
    assert!(logs.contains("\"event\":\"app.bind\""));
}

struct Unreachable;

impl HttpTransport for Unreachable {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Request {
            url: url.to_string(),
            message: "connection refused".to_string(),
        })
    }

    fn post_json(&self, url: &str, _body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        self.get_bytes(url)
    }
}

#[test]
fn flush_routes_emit_http_events() {
    let logs = capture_logs(Level::INFO, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("single-thread runtime should build");

        rt.block_on(async {
            let transport: Arc<dyn HttpTransport> = Arc::new(Unreachable);
            let client =
                SubgraphClient::new("http://graph.test", transport, RetryPolicy::default());
            let app = DashboardApp::new(
                Chain::PulseChain,
                client,
                Arc::new(DirCsvSource::new("missing-exports")),
                FlushTargets::default(),
            );
            let router = dashboard_router(Arc::new(app));

            let response = router
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/api/flush?kind=receive")
                        .body(Body::empty())
                        .expect("request should build"),
                )
                .await
                .expect("flush request should succeed");
            assert_eq!(response.status(), StatusCode::OK);

            let response = router
                .oneshot(
                    Request::builder()
                        .uri("/api/flush?kind=burn")
                        .body(Body::empty())
                        .expect("request should build"),
                )
                .await
                .expect("flush request should succeed");
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        });
    });

    assert!(logs.contains("\"event\":\"http.flush.request\""));
    assert!(logs.contains("\"event\":\"http.request.rejected\""));
}
