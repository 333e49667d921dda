//! Wire contract: header names and the `limit:seconds` pair grammar.
//!
//! Header values look like `20:1,100:120`, one `value:intervalSeconds` pair per window. A limit
//! header and its count header list the same windows in the same order. Parsing is lenient: a
//! field that is not an integer reads as 0, which makes the resulting bucket non-limiting.

use http::HeaderMap;
use std::time::Duration;

/// Present only on a 429; `application` or `method` (the server may also send `service`).
pub const RATE_LIMIT_TYPE_HEADER: &str = "X-Rate-Limit-Type";
/// Seconds to back off after a 429.
pub const RETRY_AFTER_HEADER: &str = "Retry-After";
pub const APP_RATE_LIMIT_HEADER: &str = "X-App-Rate-Limit";
pub const APP_RATE_LIMIT_COUNT_HEADER: &str = "X-App-Rate-Limit-Count";
pub const METHOD_RATE_LIMIT_HEADER: &str = "X-Method-Rate-Limit";
pub const METHOD_RATE_LIMIT_COUNT_HEADER: &str = "X-Method-Rate-Limit-Count";

/// `X-Rate-Limit-Type` value naming the application tier.
pub const APP_RATE_LIMIT_TYPE: &str = "application";
/// `X-Rate-Limit-Type` value naming the method tier.
pub const METHOD_RATE_LIMIT_TYPE: &str = "method";

/// Delay applied after a 429 whose `Retry-After` is missing or unparseable.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Read a header as a trimmed string; missing or non-ASCII values read as empty.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).unwrap_or("")
}

/// Split `value:seconds` into the value and the interval.
pub fn parse_pair(pair: &str) -> (u32, Duration) {
    let (value, seconds) = pair.split_once(':').unwrap_or((pair, ""));
    let value = value.trim().parse::<u32>().unwrap_or(0);
    let seconds = seconds.trim().parse::<u64>().unwrap_or(0);
    (value, Duration::from_secs(seconds))
}

/// Parse every pair of a header value, in order. An empty value yields no pairs.
pub fn parse_pairs(header: &str) -> Vec<(u32, Duration)> {
    if header.trim().is_empty() {
        return Vec::new();
    }
    header.split(',').map(parse_pair).collect()
}

/// Delay to honor before the next request, from `Retry-After`.
pub fn retry_after(headers: &HeaderMap) -> Duration {
    header_str(headers, RETRY_AFTER_HEADER)
        .parse::<u64>()
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// The tier named by `X-Rate-Limit-Type`, if the header is present.
pub fn rate_limit_type(headers: &HeaderMap) -> Option<&str> {
    Some(header_str(headers, RATE_LIMIT_TYPE_HEADER)).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            let name = HeaderName::from_bytes(name.as_bytes()).expect("valid header name");
            map.insert(name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn parses_pairs_in_order() {
        assert_eq!(
            parse_pairs("20:1,100:120"),
            vec![(20, Duration::from_secs(1)), (100, Duration::from_secs(120))]
        );
        assert_eq!(
            parse_pairs(" 5:10 , 7:600"),
            vec![(5, Duration::from_secs(10)), (7, Duration::from_secs(600))]
        );
        assert!(parse_pairs("").is_empty());
    }

    #[test]
    fn malformed_fields_read_as_zero() {
        assert_eq!(parse_pair("abc:10"), (0, Duration::from_secs(10)));
        assert_eq!(parse_pair("10:xyz"), (10, Duration::ZERO));
        assert_eq!(parse_pair("10"), (10, Duration::ZERO));
        assert_eq!(parse_pair("-4:1"), (0, Duration::from_secs(1)));
    }

    #[test]
    fn retry_after_defaults_when_missing_or_invalid() {
        assert_eq!(retry_after(&HeaderMap::new()), Duration::from_secs(1));
        assert_eq!(retry_after(&headers(&[(RETRY_AFTER_HEADER, "asdf")])), Duration::from_secs(1));
        assert_eq!(retry_after(&headers(&[(RETRY_AFTER_HEADER, "10")])), Duration::from_secs(10));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let map = headers(&[("x-rate-limit-type", "application")]);
        assert_eq!(rate_limit_type(&map), Some(APP_RATE_LIMIT_TYPE));
        assert_eq!(rate_limit_type(&HeaderMap::new()), None);
    }
}
