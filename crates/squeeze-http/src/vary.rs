//! Vary axis classification of exchanges.

use axum::http::{header, HeaderMap};

/// Returns the Vary axis key of an exchange.
///
/// The request values of every header named in the response's `Vary`
/// header are joined with `,`, skipping empty ones. `*` and a missing `Vary`
/// header contribute nothing.
pub fn vary_key(request: &HeaderMap, response: &HeaderMap) -> String {
    let mut values = Vec::new();
    for vary in response.get_all(header::VARY) {
        let Ok(vary) = vary.to_str() else {
            continue;
        };
        for name in vary.split(',').map(str::trim) {
            if name.is_empty() || name == "*" {
                continue;
            }
            let value = request
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(",");
            if !value.is_empty() {
                values.push(value);
            }
        }
    }
    values.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_missing_vary_is_empty_key() {
        let request = headers(&[("accept-encoding", "gzip")]);
        assert_eq!(vary_key(&request, &HeaderMap::new()), "");
    }

    #[test]
    fn test_star_contributes_nothing() {
        let request = headers(&[("accept-encoding", "gzip")]);
        let response = headers(&[("vary", "*")]);
        assert_eq!(vary_key(&request, &response), "");
    }

    #[test]
    fn test_values_joined_in_vary_order() {
        let request = headers(&[
            ("accept-encoding", "gzip"),
            ("accept-language", "da"),
            ("user-agent", "curl"),
        ]);
        let response = headers(&[("vary", "Accept-Language, Accept-Encoding"), ("vary", "Cookie")]);
        assert_eq!(vary_key(&request, &response), "da,gzip");
    }

    #[test]
    fn test_empty_values_skipped() {
        let request = headers(&[("accept-encoding", "")]);
        let response = headers(&[("vary", "Accept-Encoding, User-Agent")]);
        assert_eq!(vary_key(&request, &response), "");
    }
}
