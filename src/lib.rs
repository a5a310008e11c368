//! hexwatch core crate.
//!
//! Current implemented scope:
//! - lobby entry queries with pagination and exact wei totals
//! - stake queries with client-side filtering and sorting
//! - flush transaction aggregation from CSV exports
//! - background-refreshed views served over a small dashboard router

mod address;
mod config;
mod csv_source;
mod dashboard;
mod flush;
mod http;
mod links;
mod live;
mod lobby;
mod observability;
mod stakes;
mod subgraph;
mod units;
mod view;

pub use address::{
    is_valid_address, normalize_address, parse_address_list, short_address, AddressFilter,
    ADDRESS_LEN,
};
pub use config::{
    dashboard_config_from_env, ConfigError, DashboardConfig, DEFAULT_CSV_SOURCE,
    DEFAULT_DASHBOARD_ADDR, DEFAULT_HTTP_TIMEOUT_MS,
};
pub use csv_source::{
    csv_source_from_location, load_flush_report, DirCsvSource, FlushLoadError, HttpCsvSource,
    TransactionCsvSource,
};
pub use dashboard::{
    dashboard_router, render_flush_html, DashboardApp, FlushParams, FlushSortParams, FlushView,
    FLUSH_HEADERS,
};
pub use flush::{
    build_flush_report, daily_totals, default_flush_sort, parse_amount, parse_flush_sort_field,
    parse_timestamp, parse_transaction_kind, parse_transactions, sort_summaries,
    strip_line_prefix, summarize, DailyTotal, FlushReport, FlushSortField, FlushTargets,
    FlushTransaction, ParsedTransactions, TransactionKind, TransactionSummary,
    ALL_TRANSACTIONS_CSV, FLUSH_ADDRESS, INTERNAL_TRANSACTIONS_CSV,
};
pub use http::{retry, HttpTransport, ReqwestBlockingTransport, RetryPolicy, TransportError};
pub use links::{address_link, analytics_link, transaction_link, Chain};
pub use live::LiveView;
pub use lobby::{
    fetch_lobby_page, lobby_variables, parse_lobby_order_by, validate_limit, LobbyEntry,
    LobbyOrderBy, LobbyPage, LobbyParams, LobbyQuery, LobbyRow, Pagination, QueryError,
    MAX_PAGE_LIMIT, MIN_PAGE_LIMIT,
};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_config_loaded, log_sources_selected, LogFormat,
    LoggingConfig, LoggingInitError,
};
pub use stakes::{
    build_stakes_view, fetch_stake_page, filter_and_sort, parse_stake_sort_field,
    parse_stake_status, stakes_variables, StakeEnd, StakeFilter, StakeParams, StakeRow,
    StakeSortField, StakeStart, StakeStatus, StakesQuery, StakesView, TsRange,
    ALL_STAKE_SORT_FIELDS, HEX_LAUNCH_TS, SECONDS_PER_DAY,
};
pub use subgraph::{SubgraphClient, SubgraphError};
pub use units::{
    format_fixed, hearts_to_hex, parse_decimal_to_scaled, parse_integer_amount, scaled_to_f64,
    sum_integer_amounts, wei_to_eth, AmountError, HEARTS_DECIMALS, WEI_DECIMALS,
};
pub use view::{LoadPhase, RequestTicket, SortDirection, SortState, ViewSnapshot, ViewState};
