//! ---
//! probe_section: "01-core-functionality"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Shared primitives and utilities for the probe runtime."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use indexmap::IndexMap;
use tracing::{debug, warn};

/// Rejection raised when an integer query value cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgsError {
    #[error("missing value")]
    Empty,
    #[error("invalid integer '{0}'")]
    InvalidInteger(String),
}

/// Split `k1=v1,k2=v2` into an ordered map. Malformed pairs are logged and skipped.
pub fn parse_kv_args(raw: &str) -> IndexMap<String, String> {
    let mut args = IndexMap::new();
    if raw.is_empty() {
        return args;
    }
    for pair in raw.split(',') {
        let tokens: Vec<&str> = pair.split('=').collect();
        match tokens.as_slice() {
            [key, value] => {
                debug!(key = %key, value = %value, "parsed argument");
                args.insert((*key).to_owned(), (*value).to_owned());
            }
            _ => warn!(pair, "malformed argument pair"),
        }
    }
    args
}

/// Parse an unsigned integer accepting decimal or `0x`/`0o`/`0b` prefixed forms.
pub fn parse_u64(raw: &str) -> Result<u64, ArgsError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ArgsError::Empty);
    }
    let (digits, radix) = split_radix(raw);
    u64::from_str_radix(digits, radix).map_err(|_| ArgsError::InvalidInteger(raw.to_owned()))
}

/// Signed counterpart of [`parse_u64`]; a leading `-` or `+` is honoured.
pub fn parse_i64(raw: &str) -> Result<i64, ArgsError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ArgsError::Empty);
    }
    let (negative, unsigned) = match raw.as_bytes()[0] {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };
    let magnitude = parse_u64(unsigned).map_err(|_| ArgsError::InvalidInteger(raw.to_owned()))?;
    let value = if negative {
        0i64.checked_sub_unsigned(magnitude)
    } else {
        i64::try_from(magnitude).ok()
    };
    value.ok_or_else(|| ArgsError::InvalidInteger(raw.to_owned()))
}

fn split_radix(raw: &str) -> (&str, u32) {
    let lower = raw.get(..2).map(str::to_ascii_lowercase);
    match lower.as_deref() {
        Some("0x") => (&raw[2..], 16),
        Some("0o") => (&raw[2..], 8),
        Some("0b") => (&raw[2..], 2),
        _ => (raw, 10),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_args_keep_order_and_skip_malformed() {
        let args = parse_kv_args("bn=bucket,broken,on=obj,a=b=c,pl=hello");
        let keys: Vec<_> = args.keys().cloned().collect();
        assert_eq!(keys, vec!["bn", "on", "pl"]);
        assert_eq!(args["pl"], "hello");
        assert!(parse_kv_args("").is_empty());
    }

    #[test]
    fn integers_accept_prefixes() {
        assert_eq!(parse_u64("42").unwrap(), 42);
        assert_eq!(parse_u64("0x10").unwrap(), 16);
        assert_eq!(parse_u64("0b101").unwrap(), 5);
        assert_eq!(parse_i64("-1000").unwrap(), -1000);
        assert_eq!(parse_i64("1700000000000000000").unwrap(), 1_700_000_000_000_000_000);
        assert_eq!(parse_u64(""), Err(ArgsError::Empty));
        assert!(parse_i64("12ab").is_err());
        assert!(parse_u64("-1").is_err());
    }
}
