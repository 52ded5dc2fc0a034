//! Cache headers of squeezed responses.

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};

/// Format of HTTP dates (IMF-fixdate).
const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Parses an HTTP date.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// Formats an HTTP date.
pub fn format_http_date(date: DateTime<Utc>) -> String {
    date.format(HTTP_DATE).to_string()
}

/// Returns the `Expires` header as a timestamp.
pub fn expires(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    headers
        .get(header::EXPIRES)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_http_date)
}

/// Returns the `Content-Type` header.
pub fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
}

/// Returns the declared `Content-Length`.
pub fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Sets `Content-Length` to `len`.
pub fn set_content_length(headers: &mut HeaderMap, len: usize) {
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
}

/// Lowers `Expires` to `merged` when both are known.
///
/// Returns true if the header was changed.
pub fn lower_expires(headers: &mut HeaderMap, merged: Option<DateTime<Utc>>) -> bool {
    let (Some(current), Some(merged)) = (expires(headers), merged) else {
        return false;
    };
    if merged >= current {
        return false;
    }
    match HeaderValue::from_str(&format_http_date(merged)) {
        Ok(value) => {
            headers.insert(header::EXPIRES, value);
            true
        }
        Err(_) => false,
    }
}

/// Marks a document that was left unchanged as not cacheable without revalidation.
pub fn mark_unchanged(headers: &mut HeaderMap) {
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_http_date_round_trip() {
        let date = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
        let formatted = format_http_date(date);
        assert_eq!(formatted, "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_http_date(&formatted), Some(date));
    }

    #[test]
    fn test_invalid_date_is_absent() {
        assert_eq!(parse_http_date("0"), None);
        assert_eq!(parse_http_date("tomorrow"), None);
    }

    #[test]
    fn test_lower_expires_only_when_both_present() {
        let early = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();

        let mut headers = HeaderMap::new();
        assert!(!lower_expires(&mut headers, Some(early)));
        assert!(headers.get(header::EXPIRES).is_none());

        headers.insert(
            header::EXPIRES,
            HeaderValue::from_str(&format_http_date(late)).unwrap(),
        );
        assert!(!lower_expires(&mut headers, None));
        assert!(lower_expires(&mut headers, Some(early)));
        assert_eq!(expires(&headers), Some(early));

        assert!(!lower_expires(&mut headers, Some(late)));
        assert_eq!(expires(&headers), Some(early));
    }

    #[test]
    fn test_mark_unchanged() {
        let mut headers = HeaderMap::new();
        mark_unchanged(&mut headers);
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
    }

    #[test]
    fn test_content_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);
        set_content_length(&mut headers, 42);
        assert_eq!(content_length(&headers), Some(42));
    }
}
