//! Dashboard HTTP routes over the lobby, stakes and flush live views.

use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::address::short_address;
use crate::csv_source::{load_flush_report, TransactionCsvSource};
use crate::flush::{
    default_flush_sort, parse_flush_sort_field, parse_transaction_kind, FlushReport,
    FlushSortField, FlushTargets, TransactionKind,
};
use crate::links::{address_link, analytics_link, transaction_link, Chain};
use crate::live::LiveView;
use crate::lobby::{fetch_lobby_page, LobbyPage, LobbyParams, LobbyQuery, QueryError};
use crate::stakes::{
    build_stakes_view, fetch_stake_page, StakeParams, StakeStart, StakesQuery, StakesView,
};
use crate::subgraph::SubgraphClient;
use crate::units::format_fixed;
use crate::view::{SortState, ViewSnapshot};

pub const FLUSH_HEADERS: [&str; 6] = ["Address", "Amount", "Count", "First", "Last", "Links"];

pub struct DashboardApp {
    chain: Chain,
    lobby: LiveView<LobbyQuery, LobbyPage>,
    stakes: LiveView<StakesQuery, Vec<StakeStart>>,
    flush: LiveView<TransactionKind, FlushReport>,
    flush_sort: Mutex<SortState<FlushSortField>>,
}

impl DashboardApp {
    pub fn new(
        chain: Chain,
        client: SubgraphClient,
        csv_source: Arc<dyn TransactionCsvSource>,
        targets: FlushTargets,
    ) -> Self {
        let lobby_client = client.clone();
        let lobby = LiveView::new("lobby", move |query: &LobbyQuery| {
            fetch_lobby_page(&lobby_client, query).map_err(|err| err.to_string())
        });

        let stakes = LiveView::new("stakes", move |query: &StakesQuery| {
            fetch_stake_page(&client, query).map_err(|err| err.to_string())
        });

        let flush = LiveView::new("flush", move |kind: &TransactionKind| {
            load_flush_report(csv_source.as_ref(), *kind, &targets).map_err(|err| err.to_string())
        });

        Self {
            chain,
            lobby,
            stakes,
            flush,
            flush_sort: Mutex::new(default_flush_sort()),
        }
    }

    /// Kicks off the first load of every view with default parameters.
    pub fn prime(&self) {
        self.lobby.request(LobbyQuery::default());
        self.stakes.request(StakesQuery::default());
        self.flush.request(TransactionKind::Send);
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn flush_sort(&self) -> SortState<FlushSortField> {
        *self
            .flush_sort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn toggle_flush_sort(&self, field: FlushSortField) -> SortState<FlushSortField> {
        let mut guard = self
            .flush_sort
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.toggle(field);
        *guard
    }

    pub fn flush_snapshot(&self) -> ViewSnapshot<FlushView> {
        let sort = self.flush_sort();
        self.flush.snapshot().map(|report| FlushView {
            sort,
            report: report.sorted(sort),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlushView {
    pub sort: SortState<FlushSortField>,
    pub report: FlushReport,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlushParams {
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlushSortParams {
    pub field: String,
}

pub fn dashboard_router(app: Arc<DashboardApp>) -> Router {
    Router::new()
        .route("/api/lobby", get(get_lobby))
        .route("/api/stakes", get(get_stakes))
        .route("/api/flush", get(get_flush))
        .route("/api/flush/sort", post(post_flush_sort))
        .route("/flush", get(get_flush_html))
        .with_state(app)
}

#[derive(Debug, Error)]
#[error(transparent)]
struct ApiError(#[from] QueryError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(
            component = "dashboard",
            event = "http.request.rejected",
            error = %self.0
        );
        let body = serde_json::json!({ "error": self.0.to_string() });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

async fn get_lobby(
    State(app): State<Arc<DashboardApp>>,
    Query(params): Query<LobbyParams>,
) -> Result<Json<ViewSnapshot<Arc<LobbyPage>>>, ApiError> {
    let query = params.into_query()?;
    let started = app.lobby.request(query);
    let snapshot = app.lobby.snapshot();

    info!(
        component = "dashboard",
        event = "http.lobby.request",
        started,
        status = ?snapshot.status
    );

    Ok(Json(snapshot))
}

async fn get_stakes(
    State(app): State<Arc<DashboardApp>>,
    Query(params): Query<StakeParams>,
) -> Result<Json<ViewSnapshot<StakesView>>, ApiError> {
    let (query, filter, sort) = params.into_parts()?;
    let started = app.stakes.request(query);
    let snapshot = app
        .stakes
        .snapshot()
        .map(|stakes| build_stakes_view(&stakes, &filter, sort));

    info!(
        component = "dashboard",
        event = "http.stakes.request",
        started,
        status = ?snapshot.status,
        sort = sort.field.as_str()
    );

    Ok(Json(snapshot))
}

async fn get_flush(
    State(app): State<Arc<DashboardApp>>,
    Query(params): Query<FlushParams>,
) -> Result<Json<ViewSnapshot<FlushView>>, ApiError> {
    let started = match params.kind.as_deref() {
        Some(raw) => app.flush.request(parse_transaction_kind(raw)?),
        None if app.flush.current_query().is_none() => app.flush.request(TransactionKind::Send),
        None => false,
    };
    let snapshot = app.flush_snapshot();

    info!(
        component = "dashboard",
        event = "http.flush.request",
        started,
        status = ?snapshot.status
    );

    Ok(Json(snapshot))
}

async fn post_flush_sort(
    State(app): State<Arc<DashboardApp>>,
    Query(params): Query<FlushSortParams>,
) -> Result<Json<ViewSnapshot<FlushView>>, ApiError> {
    let field = parse_flush_sort_field(&params.field)?;
    let sort = app.toggle_flush_sort(field);

    info!(
        component = "dashboard",
        event = "http.flush.sort",
        field = sort.field.as_str(),
        direction = sort.direction.as_str()
    );

    Ok(Json(app.flush_snapshot()))
}

async fn get_flush_html(State(app): State<Arc<DashboardApp>>) -> impl IntoResponse {
    if app.flush.current_query().is_none() {
        app.flush.request(TransactionKind::Send);
    }
    let snapshot = app.flush_snapshot();
    info!(
        component = "dashboard",
        event = "http.flush.html",
        status = ?snapshot.status
    );
    Html(render_flush_html(app.chain(), &snapshot))
}

pub fn render_flush_html(chain: Chain, snapshot: &ViewSnapshot<FlushView>) -> String {
    let now_utc = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    let mut out = String::new();
    out.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str("<title>HEX Flush</title>\n");
    out.push_str("<style>body{margin:0;font-family:\"Space Grotesk\",\"Segoe UI\",sans-serif;background:#f5f1e7;color:#182026}.shell{max-width:1200px;margin:0 auto;padding:24px 18px}.hero{background:linear-gradient(135deg,#102f3a 0%,#24576b 100%);color:#f7fbfc;border-radius:16px;padding:18px 20px}.hero h1{margin:0 0 8px;font-size:1.5rem}.hero-meta{display:flex;gap:16px;flex-wrap:wrap;font-size:.92rem;color:#dcebf0}.card{margin-top:16px;background:#fff;border:1px solid #cbd4db;border-radius:16px;overflow:auto}table{width:100%;border-collapse:collapse}thead th{background:#14343f;color:#f2f7f9;font-size:.8rem;text-transform:uppercase;padding:10px}tbody td{font-size:.84rem;padding:9px 10px;border-bottom:1px solid #d7dce1;white-space:nowrap}.skeleton td{background:#eef1f3;color:transparent}.error{color:#9b1c1c;padding:12px 14px}.mono{font-family:\"IBM Plex Mono\",monospace}</style>\n");
    out.push_str("</head><body><main class=\"shell\">\n");
    out.push_str("<section class=\"hero\"><h1>HEX Flush</h1><div class=\"hero-meta\">\n");

    let view = snapshot.data.as_ref();
    if let Some(view) = view {
        out.push_str(&format!(
            "<span>Kind: {}</span>",
            escape_html(view.report.kind.as_str())
        ));
        out.push_str(&format!(
            "<span>Total: {}</span>",
            format_fixed(view.report.total_amount, 2)
        ));
        out.push_str(&format!(
            "<span>Transactions: {}</span>",
            view.report.transaction_count
        ));
        out.push_str(&format!(
            "<span>Sort: {} {}</span>",
            view.sort.field.as_str(),
            view.sort.direction.as_str()
        ));
    }
    out.push_str(&format!(
        "<span>Status: {:?}</span><span>Generated: {}</span>",
        snapshot.status,
        escape_html(&now_utc)
    ));
    out.push_str("</div></section>\n");

    out.push_str("<section class=\"card\">");
    if let Some(error) = &snapshot.error {
        out.push_str("<div class=\"error\">");
        out.push_str(&escape_html(error));
        out.push_str("</div>");
    }
    out.push_str("<table id=\"flush-table\"><thead><tr>");
    for header in FLUSH_HEADERS {
        out.push_str("<th>");
        out.push_str(header);
        out.push_str("</th>");
    }
    out.push_str("</tr></thead><tbody>\n");

    if snapshot.skeleton {
        for _ in 0..5 {
            out.push_str("<tr class=\"skeleton\">");
            for _ in FLUSH_HEADERS {
                out.push_str("<td>&nbsp;</td>");
            }
            out.push_str("</tr>\n");
        }
    }

    if let Some(view) = view {
        let internal = view.report.kind == TransactionKind::Internal;
        for summary in &view.report.summaries {
            let key = escape_html(&summary.key);
            out.push_str("<tr>");
            out.push_str(&format!(
                "<td class=\"mono\" title=\"{key}\">{}</td>",
                escape_html(&short_address(&summary.key))
            ));
            out.push_str(&format!("<td>{}</td>", format_fixed(summary.amount, 2)));
            out.push_str(&format!("<td>{}</td>", summary.count));
            out.push_str(&format!(
                "<td>{}</td><td>{}</td>",
                date_cell(summary.first_date),
                date_cell(summary.last_date)
            ));
            out.push_str("<td>");
            if internal {
                push_link(&mut out, &transaction_link(chain, &summary.key), "Tx");
            } else {
                push_link(&mut out, &address_link(chain, &summary.key), "Explorer");
                out.push(' ');
                push_link(&mut out, &analytics_link(&summary.key), "Analytics");
            }
            out.push_str("</td></tr>\n");
        }
    }
    out.push_str("</tbody></table></section>\n");

    if let Some(view) = view {
        out.push_str("<section class=\"card\"><table id=\"flush-daily\"><thead><tr><th>Date</th><th>Amount</th><th>Cumulative</th></tr></thead><tbody>\n");
        for day in &view.report.daily {
            out.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                day.date.format("%Y-%m-%d"),
                format_fixed(day.amount, 2),
                format_fixed(day.cumulative, 2)
            ));
        }
        out.push_str("</tbody></table></section>\n");
    }

    out.push_str("</main></body></html>\n");
    out
}

fn date_cell(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_else(|| "-".to_string())
}

fn push_link(out: &mut String, url: &str, label: &str) {
    out.push_str("<a target=\"_blank\" rel=\"noopener noreferrer\" href=\"");
    out.push_str(&escape_html(url));
    out.push_str("\">");
    out.push_str(label);
    out.push_str("</a>");
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    use crate::csv_source::DirCsvSource;
    use crate::flush::{DailyTotal, TransactionSummary};
    use crate::http::{HttpTransport, RetryPolicy, TransportError};
    use crate::view::{LoadPhase, SortDirection};

    fn report(kind: TransactionKind) -> FlushReport {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        FlushReport {
            kind,
            summaries: vec![TransactionSummary {
                key: "0x1111111111111111111111111111111111111111".to_string(),
                amount: 12.5,
                count: 2,
                first_date: Some(ts),
                last_date: Some(ts),
            }],
            daily: vec![DailyTotal {
                date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                amount: 12.5,
                cumulative: 12.5,
            }],
            total_amount: 12.5,
            transaction_count: 2,
        }
    }

    fn success(kind: TransactionKind) -> ViewSnapshot<FlushView> {
        ViewSnapshot {
            status: LoadPhase::Success,
            skeleton: false,
            error: None,
            data: Some(FlushView {
                sort: default_flush_sort(),
                report: report(kind),
            }),
        }
    }

    #[test]
    fn rendered_html_links_open_in_new_tab() {
        let html = render_flush_html(Chain::PulseChain, &success(TransactionKind::Send));

        assert!(html.contains("flush-table"));
        assert!(html.contains(
            "href=\"https://scan.pulsechain.com/address/0x1111111111111111111111111111111111111111\""
        ));
        assert!(html.contains("target=\"_blank\" rel=\"noopener noreferrer\""));
        assert!(html.contains("<td>12.50</td>"));
        assert!(html.contains("<td>2024-03-01</td><td>12.50</td><td>12.50</td>"));
    }

    #[test]
    fn undated_summary_renders_placeholder_dates() {
        let mut view = success(TransactionKind::Send);
        if let Some(data) = view.data.as_mut() {
            data.report.summaries[0].first_date = None;
            data.report.summaries[0].last_date = None;
        }
        let html = render_flush_html(Chain::PulseChain, &view);
        assert!(html.contains("<td>2</td><td>-</td><td>-</td>"));
    }

    #[test]
    fn internal_rows_link_to_transactions() {
        let html = render_flush_html(Chain::Ethereum, &success(TransactionKind::Internal));
        assert!(html.contains("https://etherscan.io/tx/0x1111"));
        assert!(!html.contains("hexscout.com"));
    }

    #[test]
    fn skeleton_and_error_are_rendered() {
        let loading: ViewSnapshot<FlushView> = ViewSnapshot {
            status: LoadPhase::Loading,
            skeleton: true,
            error: None,
            data: None,
        };
        assert!(render_flush_html(Chain::PulseChain, &loading).contains("class=\"skeleton\""));

        let failed: ViewSnapshot<FlushView> = ViewSnapshot {
            status: LoadPhase::Error,
            skeleton: false,
            error: Some("HTTP request failed for <x>".to_string()),
            data: None,
        };
        let html = render_flush_html(Chain::PulseChain, &failed);
        assert!(html.contains("HTTP request failed for &lt;x&gt;"));
    }

    #[test]
    fn escape_html_covers_quotes() {
        assert_eq!(escape_html("a<b>&\"'"), "a&lt;b&gt;&amp;&quot;&#39;");
    }

    struct OfflineTransport;

    impl HttpTransport for OfflineTransport {
        fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            Err(TransportError::Request {
                url: url.to_string(),
                message: "offline".to_string(),
            })
        }

        fn post_json(&self, url: &str, _body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
            self.get_bytes(url)
        }
    }

    #[test]
    fn flush_sort_toggles_on_the_app() {
        let transport: Arc<dyn HttpTransport> = Arc::new(OfflineTransport);
        let client = SubgraphClient::new("http://graph.test", transport, RetryPolicy::default());
        let app = DashboardApp::new(
            Chain::PulseChain,
            client,
            Arc::new(DirCsvSource::new("does-not-exist")),
            FlushTargets::default(),
        );

        assert_eq!(app.flush_sort(), default_flush_sort());
        assert_eq!(
            app.toggle_flush_sort(FlushSortField::Amount).direction,
            SortDirection::Asc
        );
        let sort = app.toggle_flush_sort(FlushSortField::Count);
        assert_eq!(sort.field, FlushSortField::Count);
        assert_eq!(sort.direction, SortDirection::Desc);
        assert_eq!(app.flush_snapshot().status, LoadPhase::Idle);
    }
}
