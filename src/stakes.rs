//! Stake queries: `stakeStarts` pages with their optional `stakeEnd`, filtered and
//! sorted over the fetched page.
//!
//! Derived values for stakes that have not ended (ROI, minted) are "not applicable"
//! and compare as zero. ROI is also not applicable when the staked amount is zero.

use std::cmp::Ordering;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::lobby::{validate_limit, QueryError};
use crate::subgraph::{string_or_number, SubgraphClient, SubgraphError};
use crate::units::{hearts_to_hex, parse_integer_amount};
use crate::view::{SortDirection, SortState};

/// HEX day 0 (2019-12-03T00:00:00Z).
pub const HEX_LAUNCH_TS: i64 = 1_575_331_200;
pub const SECONDS_PER_DAY: i64 = 86_400;

const STAKES_QUERY: &str = r#"
query StakeStarts($first: Int!, $skip: Int!, $orderBy: StakeStart_orderBy!, $orderDirection: OrderDirection!, $where: StakeStart_filter!) {
  stakeStarts(first: $first, skip: $skip, orderBy: $orderBy, orderDirection: $orderDirection, where: $where) {
    id
    stakerAddr
    stakeId
    stakedHearts
    stakeShares
    stakeTShares
    stakedDays
    startDay
    endDay
    timestamp
    isAutoStake
    transactionHash
    stakeEnd {
      id
      stakerAddr
      stakeId
      payout
      stakedHearts
      stakedShares
      timestamp
      penalty
      servedDays
      daysLate
      daysEarly
      transactionHash
    }
  }
}
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeEnd {
    pub id: String,
    pub staker_addr: String,
    #[serde(deserialize_with = "string_or_number")]
    pub stake_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub payout: String,
    #[serde(deserialize_with = "string_or_number")]
    pub staked_hearts: String,
    #[serde(deserialize_with = "string_or_number")]
    pub staked_shares: String,
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
    #[serde(deserialize_with = "string_or_number")]
    pub penalty: String,
    #[serde(deserialize_with = "string_or_number")]
    pub served_days: String,
    #[serde(deserialize_with = "string_or_number")]
    pub days_late: String,
    #[serde(deserialize_with = "string_or_number")]
    pub days_early: String,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeStart {
    pub id: String,
    pub staker_addr: String,
    #[serde(deserialize_with = "string_or_number")]
    pub stake_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub staked_hearts: String,
    #[serde(deserialize_with = "string_or_number")]
    pub stake_shares: String,
    #[serde(deserialize_with = "string_or_number")]
    pub stake_t_shares: String,
    #[serde(deserialize_with = "string_or_number")]
    pub staked_days: String,
    #[serde(deserialize_with = "string_or_number")]
    pub start_day: String,
    #[serde(deserialize_with = "string_or_number")]
    pub end_day: String,
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
    pub is_auto_stake: bool,
    pub transaction_hash: String,
    #[serde(default)]
    pub stake_end: Option<StakeEnd>,
}

fn int(raw: &str) -> u128 {
    parse_integer_amount(raw).unwrap_or(0)
}

fn int_i64(raw: &str) -> i64 {
    raw.trim().parse::<i64>().unwrap_or(0)
}

impl StakeStart {
    pub fn is_active(&self) -> bool {
        self.stake_end.is_none()
    }

    pub fn staked_hearts_value(&self) -> u128 {
        int(&self.staked_hearts)
    }

    pub fn start_ts(&self) -> i64 {
        int_i64(&self.timestamp)
    }

    pub fn t_shares(&self) -> f64 {
        self.stake_t_shares.trim().parse::<f64>().unwrap_or(0.0)
    }

    pub fn expected_end_ts(&self) -> i64 {
        HEX_LAUNCH_TS.saturating_add(int_i64(&self.end_day).saturating_mul(SECONDS_PER_DAY))
    }

    pub fn payout_hearts(&self) -> u128 {
        self.stake_end.as_ref().map(|end| int(&end.payout)).unwrap_or(0)
    }

    pub fn penalty_hearts(&self) -> u128 {
        self.stake_end.as_ref().map(|end| int(&end.penalty)).unwrap_or(0)
    }

    pub fn days_early(&self) -> i64 {
        self.stake_end.as_ref().map(|end| int_i64(&end.days_early)).unwrap_or(0)
    }

    pub fn days_late(&self) -> i64 {
        self.stake_end.as_ref().map(|end| int_i64(&end.days_late)).unwrap_or(0)
    }

    pub fn roi(&self) -> Option<f64> {
        let end = self.stake_end.as_ref()?;
        let staked = self.staked_hearts_value();
        if staked == 0 {
            return None;
        }
        Some(int(&end.payout) as f64 / staked as f64)
    }

    pub fn minted_hearts(&self) -> Option<u128> {
        let end = self.stake_end.as_ref()?;
        Some(int(&end.payout).saturating_add(self.staked_hearts_value()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StakeStatus {
    All,
    Active,
    Ended,
}

pub fn parse_stake_status(input: &str) -> Result<StakeStatus, QueryError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "all" => Ok(StakeStatus::All),
        "active" => Ok(StakeStatus::Active),
        "ended" => Ok(StakeStatus::Ended),
        other => Err(QueryError::InvalidFilter(other.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StakeSortField {
    Timestamp,
    StakedHearts,
    StakeTShares,
    StakedDays,
    StartDay,
    EndDay,
    Payout,
    Penalty,
    Roi,
    Minted,
    DaysEarly,
    DaysLate,
}

pub const ALL_STAKE_SORT_FIELDS: [StakeSortField; 12] = [
    StakeSortField::Timestamp,
    StakeSortField::StakedHearts,
    StakeSortField::StakeTShares,
    StakeSortField::StakedDays,
    StakeSortField::StartDay,
    StakeSortField::EndDay,
    StakeSortField::Payout,
    StakeSortField::Penalty,
    StakeSortField::Roi,
    StakeSortField::Minted,
    StakeSortField::DaysEarly,
    StakeSortField::DaysLate,
];

impl StakeSortField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::StakedHearts => "stakedHearts",
            Self::StakeTShares => "stakeTShares",
            Self::StakedDays => "stakedDays",
            Self::StartDay => "startDay",
            Self::EndDay => "endDay",
            Self::Payout => "payout",
            Self::Penalty => "penalty",
            Self::Roi => "roi",
            Self::Minted => "minted",
            Self::DaysEarly => "daysEarly",
            Self::DaysLate => "daysLate",
        }
    }

    /// Subgraph `orderBy` for the initial server-side ordering. Fields that only exist
    /// on `stakeEnd` or are derived fall back to `timestamp`.
    pub fn subgraph_order_by(self) -> &'static str {
        match self {
            Self::Timestamp
            | Self::StakedHearts
            | Self::StakeTShares
            | Self::StakedDays
            | Self::StartDay
            | Self::EndDay => self.as_str(),
            Self::Payout
            | Self::Penalty
            | Self::Roi
            | Self::Minted
            | Self::DaysEarly
            | Self::DaysLate => "timestamp",
        }
    }

    pub fn compare(self, a: &StakeStart, b: &StakeStart) -> Ordering {
        match self {
            Self::Timestamp => a.start_ts().cmp(&b.start_ts()),
            Self::StakedHearts => a.staked_hearts_value().cmp(&b.staked_hearts_value()),
            Self::StakeTShares => a.t_shares().total_cmp(&b.t_shares()),
            Self::StakedDays => int(&a.staked_days).cmp(&int(&b.staked_days)),
            Self::StartDay => int(&a.start_day).cmp(&int(&b.start_day)),
            Self::EndDay => int(&a.end_day).cmp(&int(&b.end_day)),
            Self::Payout => a.payout_hearts().cmp(&b.payout_hearts()),
            Self::Penalty => a.penalty_hearts().cmp(&b.penalty_hearts()),
            Self::Roi => a
                .roi()
                .unwrap_or(0.0)
                .total_cmp(&b.roi().unwrap_or(0.0)),
            Self::Minted => a
                .minted_hearts()
                .unwrap_or(0)
                .cmp(&b.minted_hearts().unwrap_or(0)),
            Self::DaysEarly => a.days_early().cmp(&b.days_early()),
            Self::DaysLate => a.days_late().cmp(&b.days_late()),
        }
    }
}

pub fn parse_stake_sort_field(input: &str) -> Result<StakeSortField, QueryError> {
    ALL_STAKE_SORT_FIELDS
        .into_iter()
        .find(|field| field.as_str() == input)
        .ok_or_else(|| QueryError::InvalidOrderBy(input.to_string()))
}

/// Parameters that change what the subgraph returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StakesQuery {
    pub limit: u32,
    pub skip: u64,
    pub order_by: StakeSortField,
    pub order_direction: SortDirection,
    pub start_from: Option<i64>,
}

impl Default for StakesQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            skip: 0,
            order_by: StakeSortField::Timestamp,
            order_direction: SortDirection::Desc,
            start_from: None,
        }
    }
}

pub fn stakes_variables(query: &StakesQuery) -> serde_json::Value {
    // `timestamp_gt` is exclusive; the page must still contain rows exactly at `start_from`.
    let lower_bound = query.start_from.map(|from| from.saturating_sub(1)).unwrap_or(0);

    serde_json::json!({
        "first": query.limit,
        "skip": query.skip,
        "orderBy": query.order_by.subgraph_order_by(),
        "orderDirection": query.order_direction.as_str(),
        "where": { "timestamp_gt": lower_bound.max(0).to_string() },
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StakesResponse {
    stake_starts: Vec<StakeStart>,
}

pub fn fetch_stake_page(
    client: &SubgraphClient,
    query: &StakesQuery,
) -> Result<Vec<StakeStart>, SubgraphError> {
    let response: StakesResponse =
        client.query("stakeStarts", STAKES_QUERY, &stakes_variables(query))?;

    info!(
        component = "stakes",
        event = "stakes.fetch.finish",
        rows = response.stake_starts.len(),
        skip = query.skip,
        limit = query.limit,
        order_by = query.order_by.subgraph_order_by()
    );

    Ok(response.stake_starts)
}

/// Inclusive range with optional bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl TsRange {
    pub fn contains(&self, ts: i64) -> bool {
        self.from.map_or(true, |from| ts >= from) && self.to.map_or(true, |to| ts <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeFilter {
    pub status: StakeStatus,
    pub address: Option<String>,
    pub start: TsRange,
    pub expected_end: TsRange,
}

impl Default for StakeFilter {
    fn default() -> Self {
        Self {
            status: StakeStatus::All,
            address: None,
            start: TsRange::default(),
            expected_end: TsRange::default(),
        }
    }
}

impl StakeFilter {
    pub fn matches(&self, stake: &StakeStart) -> bool {
        let status_ok = match self.status {
            StakeStatus::All => true,
            StakeStatus::Active => stake.is_active(),
            StakeStatus::Ended => !stake.is_active(),
        };
        if !status_ok {
            return false;
        }

        if let Some(needle) = self.address.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = needle.to_ascii_lowercase();
            if !stake.staker_addr.to_ascii_lowercase().contains(&needle) {
                return false;
            }
        }

        self.start.contains(stake.start_ts()) && self.expected_end.contains(stake.expected_end_ts())
    }
}

/// Raw, user-entered stake parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StakeParams {
    pub limit: Option<u32>,
    pub skip: Option<u64>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub status: Option<String>,
    pub address: Option<String>,
    pub start_from: Option<i64>,
    pub start_to: Option<i64>,
    pub end_from: Option<i64>,
    pub end_to: Option<i64>,
}

impl StakeParams {
    pub fn into_parts(
        self,
    ) -> Result<(StakesQuery, StakeFilter, SortState<StakeSortField>), QueryError> {
        let defaults = StakesQuery::default();
        let field = match self.sort.as_deref() {
            Some(raw) => parse_stake_sort_field(raw)?,
            None => defaults.order_by,
        };
        let direction = match self.direction.as_deref() {
            Some(raw) => SortDirection::parse(raw)
                .ok_or_else(|| QueryError::InvalidDirection(raw.to_string()))?,
            None => defaults.order_direction,
        };
        let status = match self.status.as_deref() {
            Some(raw) => parse_stake_status(raw)?,
            None => StakeStatus::All,
        };

        let query = StakesQuery {
            limit: validate_limit(self.limit.unwrap_or(defaults.limit))?,
            skip: self.skip.unwrap_or(0),
            order_by: field,
            order_direction: direction,
            start_from: self.start_from,
        };
        let filter = StakeFilter {
            status,
            address: self.address,
            start: TsRange {
                from: self.start_from,
                to: self.start_to,
            },
            expected_end: TsRange {
                from: self.end_from,
                to: self.end_to,
            },
        };

        Ok((query, filter, SortState { field, direction }))
    }
}

/// Filters then stably sorts a fetched page.
pub fn filter_and_sort<'a>(
    stakes: &'a [StakeStart],
    filter: &StakeFilter,
    sort: SortState<StakeSortField>,
) -> Vec<&'a StakeStart> {
    let mut rows: Vec<&StakeStart> = stakes.iter().filter(|stake| filter.matches(stake)).collect();
    rows.sort_by(|a, b| sort.direction.apply(sort.field.compare(a, b)));
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StakeRow {
    pub stake_id: String,
    pub staker_addr: String,
    pub status: StakeStatus,
    pub staked_hex: f64,
    pub t_shares: f64,
    pub staked_days: String,
    pub start_day: String,
    pub end_day: String,
    pub start_date: Option<String>,
    pub expected_end_date: Option<String>,
    pub payout_hex: Option<f64>,
    pub penalty_hex: Option<f64>,
    pub roi_pct: Option<f64>,
    pub minted_hex: Option<f64>,
    pub days_early: Option<i64>,
    pub days_late: Option<i64>,
    pub is_auto_stake: bool,
    pub transaction_hash: String,
}

impl StakeRow {
    pub fn from_stake(stake: &StakeStart) -> Self {
        let ended = stake.stake_end.is_some();
        Self {
            stake_id: stake.stake_id.clone(),
            staker_addr: stake.staker_addr.clone(),
            status: if ended {
                StakeStatus::Ended
            } else {
                StakeStatus::Active
            },
            staked_hex: hearts_to_hex(stake.staked_hearts_value()),
            t_shares: stake.t_shares(),
            staked_days: stake.staked_days.clone(),
            start_day: stake.start_day.clone(),
            end_day: stake.end_day.clone(),
            start_date: date_label(stake.start_ts()),
            expected_end_date: date_label(stake.expected_end_ts()),
            payout_hex: ended.then(|| hearts_to_hex(stake.payout_hearts())),
            penalty_hex: ended.then(|| hearts_to_hex(stake.penalty_hearts())),
            roi_pct: stake.roi().map(|roi| roi * 100.0),
            minted_hex: stake.minted_hearts().map(hearts_to_hex),
            days_early: ended.then(|| stake.days_early()),
            days_late: ended.then(|| stake.days_late()),
            is_auto_stake: stake.is_auto_stake,
            transaction_hash: stake.transaction_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StakesView {
    pub fetched: usize,
    pub sort: SortState<StakeSortField>,
    pub rows: Vec<StakeRow>,
}

pub fn build_stakes_view(
    stakes: &[StakeStart],
    filter: &StakeFilter,
    sort: SortState<StakeSortField>,
) -> StakesView {
    let rows = filter_and_sort(stakes, filter, sort)
        .into_iter()
        .map(StakeRow::from_stake)
        .collect();

    StakesView {
        fetched: stakes.len(),
        sort,
        rows,
    }
}

fn date_label(ts: i64) -> Option<String> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
}
