//! Fixed-point token amounts carried as integer strings.

use thiserror::Error;

pub const WEI_DECIMALS: u32 = 18;
pub const HEARTS_DECIMALS: u32 = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("invalid decimal amount: {0}")]
    InvalidDecimal(String),
    #[error("amount {value} has more than {decimals} fractional digits")]
    TooPrecise { value: String, decimals: u32 },
    #[error("amount overflows: {0}")]
    Overflow(String),
}

pub fn parse_integer_amount(raw: &str) -> Option<u128> {
    raw.trim().parse::<u128>().ok()
}

/// Converts an integer amount into whole units without going through `raw as f64 / 10^d`,
/// which loses the fractional part for large values.
pub fn scaled_to_f64(raw: u128, decimals: u32) -> f64 {
    let scale = 10u128.pow(decimals);
    let whole = raw / scale;
    let frac = raw % scale;
    whole as f64 + frac as f64 / scale as f64
}

pub fn wei_to_eth(raw: u128) -> f64 {
    scaled_to_f64(raw, WEI_DECIMALS)
}

pub fn hearts_to_hex(raw: u128) -> f64 {
    scaled_to_f64(raw, HEARTS_DECIMALS)
}

/// Exact integer sum; an unparseable entry contributes nothing.
pub fn sum_integer_amounts<'a>(raws: impl IntoIterator<Item = &'a str>) -> u128 {
    raws.into_iter()
        .filter_map(parse_integer_amount)
        .fold(0u128, u128::saturating_add)
}

/// Parses a human decimal like `"1.5"` into its integer representation with `decimals` places.
/// Empty input is zero.
pub fn parse_decimal_to_scaled(input: &str, decimals: u32) -> Result<u128, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }

    let (whole, frac) = match trimmed.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (trimmed, ""),
    };

    let is_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !is_digits(whole) || !is_digits(frac) {
        return Err(AmountError::InvalidDecimal(trimmed.to_string()));
    }
    if frac.len() > decimals as usize {
        return Err(AmountError::TooPrecise {
            value: trimmed.to_string(),
            decimals,
        });
    }

    let scale = 10u128.pow(decimals);
    let whole_value = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .map_err(|_| AmountError::Overflow(trimmed.to_string()))?
    };
    let frac_value = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = decimals as usize);
        padded
            .parse::<u128>()
            .map_err(|_| AmountError::InvalidDecimal(trimmed.to_string()))?
    };

    whole_value
        .checked_mul(scale)
        .and_then(|value| value.checked_add(frac_value))
        .ok_or_else(|| AmountError::Overflow(trimmed.to_string()))
}

pub fn format_fixed(value: f64, places: usize) -> String {
    format!("{value:.places$}")
}
