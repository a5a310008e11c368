//! Address normalization for free-text address filters.
//!
//! Rules implemented:
//! - entries are comma separated, trimmed and lowercased
//! - a valid address is exactly 42 characters: `0x` followed by 40 hex digits
//! - invalid entries are dropped with a warning, never an error

use tracing::warn;

pub const ADDRESS_LEN: usize = 42;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddressFilter {
    pub addresses: Vec<String>,
    pub rejected: Vec<String>,
}

impl AddressFilter {
    /// `None` means "no address filter", which is also what malformed input degrades to.
    pub fn as_filter(&self) -> Option<&[String]> {
        if self.addresses.is_empty() {
            None
        } else {
            Some(&self.addresses)
        }
    }
}

pub fn normalize_address(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}

pub fn is_valid_address(input: &str) -> bool {
    input.len() == ADDRESS_LEN
        && input.starts_with("0x")
        && hex::decode(&input[2..]).is_ok()
}

pub fn parse_address_list(input: &str) -> AddressFilter {
    let mut filter = AddressFilter::default();

    for raw in input.split(',') {
        let normalized = normalize_address(raw);
        if normalized.is_empty() {
            continue;
        }
        if is_valid_address(&normalized) {
            if !filter.addresses.contains(&normalized) {
                filter.addresses.push(normalized);
            }
        } else {
            filter.rejected.push(normalized);
        }
    }

    if !filter.rejected.is_empty() {
        warn!(
            component = "address",
            event = "address.filter.rejected",
            rejected = filter.rejected.len(),
            accepted = filter.addresses.len(),
            fallback_to_unfiltered = filter.addresses.is_empty()
        );
    }

    filter
}

/// Shortened `0x1234…abcd` label for table cells.
pub fn short_address(address: &str) -> String {
    if address.len() <= 12 || !address.is_char_boundary(6) {
        return address.to_string();
    }
    let tail_start = address.len() - 4;
    if !address.is_char_boundary(tail_start) {
        return address.to_string();
    }
    format!("{}…{}", &address[..6], &address[tail_start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    const A: &str = "0x2b591e99afe9f32eaa6214f7b7629768c40eeb39";
    const B: &str = "0xdec9f2793e3c17cd26eefb21c4762fa5128e0399";

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(
            normalize_address("  0x2B591e99afE9f32eAA6214f7B7629768c40Eeb39 "),
            A
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "  0xABC ",
            "0x2B591e99afE9f32eAA6214f7B7629768c40Eeb39",
            "\tXYZ\n",
            "",
        ];
        for input in inputs {
            let once = normalize_address(input);
            assert_eq!(normalize_address(&once), once);
        }
    }

    #[test]
    fn parses_comma_separated_list_and_drops_invalid_entries() {
        let input = format!(" {}, 0xnothex, {} ,,0x123", A.to_uppercase().replace("0X", "0x"), B);
        let filter = parse_address_list(&input);

        assert_eq!(filter.addresses, vec![A.to_string(), B.to_string()]);
        assert_eq!(filter.rejected, vec!["0xnothex".to_string(), "0x123".to_string()]);
        assert!(filter.as_filter().is_some());
    }

    #[test]
    fn malformed_input_degrades_to_no_filter() {
        let filter = parse_address_list("hello, world");
        assert!(filter.addresses.is_empty());
        assert_eq!(filter.rejected.len(), 2);
        assert!(filter.as_filter().is_none());
    }

    #[test]
    fn duplicate_addresses_are_kept_once() {
        let filter = parse_address_list(&format!("{A},{A}"));
        assert_eq!(filter.addresses.len(), 1);
    }

    #[test]
    fn only_42_char_0x_strings_survive() {
        let re = Regex::new(r"^0x[0-9a-f]{40}$").unwrap();
        let input = format!("{A},0x{},{},1x{}", "a".repeat(41), &A[2..], &A[2..]);
        let filter = parse_address_list(&input);

        assert_eq!(filter.addresses.len(), 1);
        for address in &filter.addresses {
            assert_eq!(address.len(), ADDRESS_LEN);
            assert!(re.is_match(address));
        }
    }

    #[test]
    fn short_address_keeps_head_and_tail() {
        assert_eq!(short_address(A), "0x2b59…eb39");
        assert_eq!(short_address("0xabc"), "0xabc");
    }
}
