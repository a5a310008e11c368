//! Lobby entry queries: paginated `xfLobbyEnters` with amount and address filters.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::address::parse_address_list;
use crate::subgraph::{string_or_number, SubgraphClient, SubgraphError};
use crate::units::{
    format_fixed, parse_decimal_to_scaled, parse_integer_amount, sum_integer_amounts, wei_to_eth,
    AmountError, WEI_DECIMALS,
};
use crate::view::SortDirection;

pub const MIN_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 1_000;

const LOBBY_QUERY: &str = r#"
query LobbyEntries($first: Int!, $skip: Int!, $orderBy: XfLobbyEnter_orderBy!, $orderDirection: OrderDirection!, $where: XfLobbyEnter_filter!) {
  xfLobbyEnters(first: $first, skip: $skip, orderBy: $orderBy, orderDirection: $orderDirection, where: $where) {
    id
    enterDay
    entryId
    memberAddr
    rawAmount
    timestamp
    transactionHash
    referrerAddr
  }
}
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyEntry {
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub enter_day: String,
    #[serde(deserialize_with = "string_or_number")]
    pub entry_id: String,
    pub member_addr: String,
    #[serde(deserialize_with = "string_or_number")]
    pub raw_amount: String,
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
    pub transaction_hash: String,
    #[serde(default)]
    pub referrer_addr: Option<String>,
}

impl LobbyEntry {
    pub fn raw_amount_wei(&self) -> Option<u128> {
        parse_integer_amount(&self.raw_amount)
    }

    pub fn amount_eth(&self) -> f64 {
        self.raw_amount_wei().map(wei_to_eth).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LobbyOrderBy {
    RawAmount,
    Timestamp,
    EnterDay,
    EntryId,
}

impl LobbyOrderBy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RawAmount => "rawAmount",
            Self::Timestamp => "timestamp",
            Self::EnterDay => "enterDay",
            Self::EntryId => "entryId",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("limit {0} is outside [10, 1000]")]
    InvalidLimit(u32),
    #[error("unknown order field: {0}")]
    InvalidOrderBy(String),
    #[error("unknown order direction: {0}")]
    InvalidDirection(String),
    #[error("unknown filter value: {0}")]
    InvalidFilter(String),
    #[error("invalid minimum amount: {0}")]
    InvalidAmount(#[from] AmountError),
}

pub fn parse_lobby_order_by(input: &str) -> Result<LobbyOrderBy, QueryError> {
    match input {
        "rawAmount" => Ok(LobbyOrderBy::RawAmount),
        "timestamp" => Ok(LobbyOrderBy::Timestamp),
        "enterDay" => Ok(LobbyOrderBy::EnterDay),
        "entryId" => Ok(LobbyOrderBy::EntryId),
        other => Err(QueryError::InvalidOrderBy(other.to_string())),
    }
}

pub fn validate_limit(limit: u32) -> Result<u32, QueryError> {
    if (MIN_PAGE_LIMIT..=MAX_PAGE_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(QueryError::InvalidLimit(limit))
    }
}

/// Validated lobby query. Two queries compare equal exactly when they would fetch the same page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LobbyQuery {
    pub limit: u32,
    pub min_amount_wei: u128,
    pub order_by: LobbyOrderBy,
    pub order_direction: SortDirection,
    pub skip: u64,
    pub addresses: Option<Vec<String>>,
}

impl Default for LobbyQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            min_amount_wei: 0,
            order_by: LobbyOrderBy::RawAmount,
            order_direction: SortDirection::Desc,
            skip: 0,
            addresses: None,
        }
    }
}

/// Raw, user-entered lobby parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LobbyParams {
    pub limit: Option<u32>,
    pub min_amount: Option<String>,
    pub order_by: Option<String>,
    pub order_direction: Option<String>,
    pub skip: Option<u64>,
    pub addresses: Option<String>,
}

impl LobbyParams {
    pub fn into_query(self) -> Result<LobbyQuery, QueryError> {
        let defaults = LobbyQuery::default();

        let limit = validate_limit(self.limit.unwrap_or(defaults.limit))?;
        let min_amount_wei = match self.min_amount.as_deref() {
            Some(raw) => parse_decimal_to_scaled(raw, WEI_DECIMALS)?,
            None => defaults.min_amount_wei,
        };
        let order_by = match self.order_by.as_deref() {
            Some(raw) => parse_lobby_order_by(raw)?,
            None => defaults.order_by,
        };
        let order_direction = match self.order_direction.as_deref() {
            Some(raw) => SortDirection::parse(raw)
                .ok_or_else(|| QueryError::InvalidDirection(raw.to_string()))?,
            None => defaults.order_direction,
        };
        let addresses = self
            .addresses
            .as_deref()
            .map(parse_address_list)
            .and_then(|filter| filter.as_filter().map(<[String]>::to_vec));

        Ok(LobbyQuery {
            limit,
            min_amount_wei,
            order_by,
            order_direction,
            skip: self.skip.unwrap_or(0),
            addresses,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub skip: u64,
    pub limit: u32,
    pub last_page_len: usize,
}

impl Pagination {
    /// `None` when the last fetch came back empty.
    pub fn next_skip(&self) -> Option<u64> {
        if self.last_page_len == 0 {
            None
        } else {
            Some(self.skip.saturating_add(u64::from(self.limit)))
        }
    }

    pub fn previous_skip(&self) -> u64 {
        self.skip.saturating_sub(u64::from(self.limit))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LobbyRow {
    #[serde(flatten)]
    pub entry: LobbyEntry,
    pub amount_eth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LobbyPage {
    pub rows: Vec<LobbyRow>,
    pub total_wei: String,
    pub total_eth: f64,
    pub total_eth_display: String,
    pub next_skip: Option<u64>,
    pub previous_skip: u64,
}

impl LobbyPage {
    pub fn from_entries(query: &LobbyQuery, entries: Vec<LobbyEntry>) -> Self {
        let total_wei = sum_integer_amounts(entries.iter().map(|entry| entry.raw_amount.as_str()));
        let total_eth = wei_to_eth(total_wei);
        let pagination = Pagination {
            skip: query.skip,
            limit: query.limit,
            last_page_len: entries.len(),
        };

        let rows = entries
            .into_iter()
            .map(|entry| LobbyRow {
                amount_eth: entry.amount_eth(),
                entry,
            })
            .collect();

        Self {
            rows,
            total_wei: total_wei.to_string(),
            total_eth,
            total_eth_display: format_fixed(total_eth, 2),
            next_skip: pagination.next_skip(),
            previous_skip: pagination.previous_skip(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LobbyResponse {
    xf_lobby_enters: Vec<LobbyEntry>,
}

pub fn lobby_variables(query: &LobbyQuery) -> serde_json::Value {
    let mut filter = serde_json::json!({
        "rawAmount_gt": query.min_amount_wei.to_string(),
    });
    if let Some(addresses) = &query.addresses {
        filter["memberAddr_in"] = serde_json::json!(addresses);
    }

    serde_json::json!({
        "first": query.limit,
        "skip": query.skip,
        "orderBy": query.order_by.as_str(),
        "orderDirection": query.order_direction.as_str(),
        "where": filter,
    })
}

pub fn fetch_lobby_page(
    client: &SubgraphClient,
    query: &LobbyQuery,
) -> Result<LobbyPage, SubgraphError> {
    let response: LobbyResponse =
        client.query("xfLobbyEnters", LOBBY_QUERY, &lobby_variables(query))?;
    let page = LobbyPage::from_entries(query, response.xf_lobby_enters);

    info!(
        component = "lobby",
        event = "lobby.fetch.finish",
        rows = page.rows.len(),
        skip = query.skip,
        limit = query.limit,
        address_filter = query.addresses.is_some()
    );

    Ok(page)
}
