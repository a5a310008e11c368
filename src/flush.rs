//! Flush address audit: parse the static transaction exports, group by counterparty
//! and build the cumulative per-day series.
//!
//! Export layout (after the optional `<digits>|` line prefix, header line skipped):
//! - `all-trans.csv`: >= 15 columns; 3=timestamp, 4=from, 5=to, 7/8=amount candidates
//! - `internal-trans.csv`: >= 11 columns; 0=hash, 3=timestamp, 10=amount
//!
//! Each line is parsed on its own, so a bad line only costs itself. Only the column
//! count decides whether a row is malformed. A row whose timestamp is blank or
//! unreadable still counts toward its group and the total, but has no dates and
//! stays out of the day buckets.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::lobby::QueryError;
use crate::view::{SortDirection, SortState};

/// HEX contract `FLUSH_ADDR`.
pub const FLUSH_ADDRESS: &str = "0xdec9f2793e3c17cd26eefb21c4762fa5128e0399";
pub const ALL_TRANSACTIONS_CSV: &str = "all-trans.csv";
pub const INTERNAL_TRANSACTIONS_CSV: &str = "internal-trans.csv";

const EXTERNAL_MIN_COLUMNS: usize = 15;
const INTERNAL_MIN_COLUMNS: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Send,
    Receive,
    Internal,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Receive => "receive",
            Self::Internal => "internal",
        }
    }

    pub fn resource(self) -> &'static str {
        match self {
            Self::Send | Self::Receive => ALL_TRANSACTIONS_CSV,
            Self::Internal => INTERNAL_TRANSACTIONS_CSV,
        }
    }

    fn min_columns(self) -> usize {
        match self {
            Self::Send | Self::Receive => EXTERNAL_MIN_COLUMNS,
            Self::Internal => INTERNAL_MIN_COLUMNS,
        }
    }
}

pub fn parse_transaction_kind(input: &str) -> Result<TransactionKind, QueryError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "send" => Ok(TransactionKind::Send),
        "receive" => Ok(TransactionKind::Receive),
        "internal" => Ok(TransactionKind::Internal),
        other => Err(QueryError::InvalidFilter(other.to_string())),
    }
}

/// Addresses a row must match (lowercased) to count as a send or a receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushTargets {
    pub send: String,
    pub receive: String,
}

impl Default for FlushTargets {
    fn default() -> Self {
        Self {
            send: FLUSH_ADDRESS.to_string(),
            receive: FLUSH_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlushTransaction {
    pub key: String,
    pub amount: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedTransactions {
    pub rows: Vec<FlushTransaction>,
    pub dropped: usize,
    pub filtered: usize,
}

impl ParsedTransactions {
    pub fn undated(&self) -> usize {
        self.rows.iter().filter(|row| row.timestamp.is_none()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionSummary {
    pub key: String,
    pub amount: f64,
    pub count: u64,
    pub first_date: Option<DateTime<Utc>>,
    pub last_date: Option<DateTime<Utc>>,
}

impl TransactionSummary {
    fn start(tx: &FlushTransaction) -> Self {
        Self {
            key: tx.key.clone(),
            amount: tx.amount,
            count: 1,
            first_date: tx.timestamp,
            last_date: tx.timestamp,
        }
    }

    fn absorb(&mut self, tx: &FlushTransaction) {
        self.amount += tx.amount;
        self.count += 1;
        self.first_date = match (self.first_date, tx.timestamp) {
            (Some(current), Some(seen)) => Some(current.min(seen)),
            (current, seen) => current.or(seen),
        };
        self.last_date = self.last_date.max(tx.timestamp);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub amount: f64,
    pub cumulative: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushSortField {
    Amount,
    Count,
    LatestDate,
}

impl FlushSortField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amount => "amount",
            Self::Count => "count",
            Self::LatestDate => "latest_date",
        }
    }
}

pub fn parse_flush_sort_field(input: &str) -> Result<FlushSortField, QueryError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "amount" => Ok(FlushSortField::Amount),
        "count" => Ok(FlushSortField::Count),
        "latest_date" => Ok(FlushSortField::LatestDate),
        other => Err(QueryError::InvalidOrderBy(other.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlushReport {
    pub kind: TransactionKind,
    pub summaries: Vec<TransactionSummary>,
    pub daily: Vec<DailyTotal>,
    pub total_amount: f64,
    pub transaction_count: usize,
}

impl FlushReport {
    pub fn sorted(&self, sort: SortState<FlushSortField>) -> Self {
        let mut report = self.clone();
        sort_summaries(&mut report.summaries, sort);
        report
    }
}

/// Strips a leading `<digits>|` line-number prefix, if present.
pub fn strip_line_prefix(line: &str) -> &str {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 && line.as_bytes().get(digits) == Some(&b'|') {
        &line[digits + 1..]
    } else {
        line
    }
}

pub fn parse_transactions(
    kind: TransactionKind,
    text: &str,
    targets: &FlushTargets,
) -> ParsedTransactions {
    let mut parsed = ParsedTransactions::default();
    let send_target = targets.send.to_ascii_lowercase();
    let receive_target = targets.receive.to_ascii_lowercase();

    let lines = text
        .lines()
        .skip(1)
        .map(strip_line_prefix)
        .filter(|line| !line.trim().is_empty());

    for line in lines {
        let Some(record) = read_line(line).filter(|r| r.len() >= kind.min_columns()) else {
            parsed.dropped += 1;
            continue;
        };

        let timestamp = parse_timestamp(field(&record, 3));

        let row = match kind {
            TransactionKind::Internal => Some(FlushTransaction {
                key: field(&record, 0).to_string(),
                amount: parse_amount(field(&record, 10)).unwrap_or(0.0),
                timestamp,
            }),
            TransactionKind::Send | TransactionKind::Receive => {
                let from = field(&record, 4).to_ascii_lowercase();
                let to = field(&record, 5).to_ascii_lowercase();
                let amount =
                    parse_amount(field(&record, 7)).or_else(|| parse_amount(field(&record, 8)));

                let counterparty = match kind {
                    TransactionKind::Send if from == send_target => Some(to),
                    TransactionKind::Receive if to == receive_target => Some(from),
                    _ => None,
                };

                counterparty.zip(amount).map(|(key, amount)| FlushTransaction {
                    key,
                    amount,
                    timestamp,
                })
            }
        };

        match row {
            Some(row) => parsed.rows.push(row),
            None => parsed.filtered += 1,
        }
    }

    if parsed.dropped > 0 {
        debug!(
            component = "flush",
            event = "flush.parse.rows_dropped",
            kind = kind.as_str(),
            dropped = parsed.dropped
        );
    }

    parsed
}

/// One export line as a record; `None` when the line is not readable CSV.
fn read_line(line: &str) -> Option<StringRecord> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    let mut record = StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => Some(record),
        Ok(false) | Err(_) => None,
    }
}

fn field<'r>(record: &'r StringRecord, idx: usize) -> &'r str {
    record.get(idx).unwrap_or_default().trim()
}

/// A finite, strictly positive amount; thousands separators are ignored.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_matches('"')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value > 0.0)
}

/// Accepts unix seconds (or milliseconds), RFC 3339, and `YYYY-MM-DD[ HH:MM:SS[.f]]` in UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim().trim_matches('"').trim();
    if raw.is_empty() {
        return None;
    }

    if raw.bytes().all(|b| b.is_ascii_digit()) {
        let value = raw.parse::<i64>().ok()?;
        let secs = if value >= 100_000_000_000 { value / 1_000 } else { value };
        return Utc.timestamp_opt(secs, 0).single();
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = raw
        .trim_end_matches(" UTC")
        .trim_end_matches('Z')
        .trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Groups by counterparty for send/receive; internal rows stay one summary each.
pub fn summarize(kind: TransactionKind, rows: &[FlushTransaction]) -> Vec<TransactionSummary> {
    if kind == TransactionKind::Internal {
        return rows.iter().map(TransactionSummary::start).collect();
    }

    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut summaries: Vec<TransactionSummary> = Vec::new();

    for row in rows {
        match index.get(row.key.as_str()) {
            Some(&idx) => summaries[idx].absorb(row),
            None => {
                index.insert(row.key.as_str(), summaries.len());
                summaries.push(TransactionSummary::start(row));
            }
        }
    }

    summaries
}

/// Undated rows are left out of the series.
pub fn daily_totals(rows: &[FlushTransaction]) -> Vec<DailyTotal> {
    let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for row in rows {
        if let Some(timestamp) = row.timestamp {
            *buckets.entry(timestamp.date_naive()).or_insert(0.0) += row.amount;
        }
    }

    let mut cumulative = 0.0;
    buckets
        .into_iter()
        .map(|(date, amount)| {
            cumulative += amount;
            DailyTotal {
                date,
                amount,
                cumulative,
            }
        })
        .collect()
}

pub fn sort_summaries(summaries: &mut [TransactionSummary], sort: SortState<FlushSortField>) {
    summaries.sort_by(|a, b| {
        let ordering = match sort.field {
            FlushSortField::Amount => a.amount.total_cmp(&b.amount),
            FlushSortField::Count => a.count.cmp(&b.count),
            FlushSortField::LatestDate => a.last_date.cmp(&b.last_date),
        };
        sort.direction.apply(ordering)
    });
}

pub fn default_flush_sort() -> SortState<FlushSortField> {
    SortState {
        field: FlushSortField::Amount,
        direction: SortDirection::Desc,
    }
}

/// Full rebuild from one export; nothing carries over from a previous selection.
pub fn build_flush_report(
    kind: TransactionKind,
    text: &str,
    targets: &FlushTargets,
) -> FlushReport {
    let parsed = parse_transactions(kind, text, targets);
    let mut summaries = summarize(kind, &parsed.rows);
    sort_summaries(&mut summaries, default_flush_sort());
    let daily = daily_totals(&parsed.rows);
    let total_amount = parsed.rows.iter().map(|row| row.amount).sum();

    info!(
        component = "flush",
        event = "flush.report.built",
        kind = kind.as_str(),
        transactions = parsed.rows.len(),
        groups = summaries.len(),
        days = daily.len(),
        undated = parsed.undated(),
        filtered = parsed.filtered
    );

    FlushReport {
        kind,
        summaries,
        daily,
        total_amount,
        transaction_count: parsed.rows.len(),
    }
}
