//! Rebasing of relative `url(...)` references inside stylesheets.
//!
//! A stylesheet merged into an artifact is served from a different location,
//! so relative references must be made absolute against the stylesheet's own
//! URL before its body is cached.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

/// Matches `url(...)` references.
static STYLESHEET_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"url\(([^)]+)\)").expect("Invalid regex"));

/// Matches references that already carry a scheme (`http:`, `data:`, ...).
static HAS_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:").expect("Invalid regex"));

/// Rewrites relative `url(...)` references in `body` against `stylesheet_url`.
///
/// References with a scheme and fragment-only references are left alone.
/// If `stylesheet_url` cannot be parsed the body is returned unchanged.
pub fn rebase_urls(body: &str, stylesheet_url: &str) -> String {
    let Ok(base) = Url::parse(stylesheet_url) else {
        return body.to_string();
    };

    STYLESHEET_URL
        .replace_all(body, |caps: &Captures<'_>| {
            let raw = &caps[1];
            let trimmed = raw.trim();
            let (quote, reference) = unquote(trimmed);

            if reference.is_empty() || reference.starts_with('#') || HAS_SCHEME.is_match(reference)
            {
                return caps[0].to_string();
            }

            match base.join(reference) {
                Ok(resolved) => format!("url({quote}{}{quote})", resolved.as_str()),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn unquote(value: &str) -> (&'static str, &str) {
    for quote in ["\"", "'"] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return (quote, inner.trim());
        }
    }
    ("", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "http://example.com/static/css/site.css";

    #[test]
    fn test_relative_reference_is_rooted_at_stylesheet_directory() {
        let body = "body { background: url(img/bg.png); }";
        assert_eq!(
            rebase_urls(body, SHEET),
            "body { background: url(http://example.com/static/css/img/bg.png); }"
        );
    }

    #[test]
    fn test_parent_and_absolute_path_references() {
        let body = "a{b:url(../font.woff)} c{d:url(/logo.svg)}";
        assert_eq!(
            rebase_urls(body, SHEET),
            "a{b:url(http://example.com/static/font.woff)} c{d:url(http://example.com/logo.svg)}"
        );
    }

    #[test]
    fn test_quotes_are_preserved() {
        let body = r#"a{b:url("x.png")} c{d:url('y.png')}"#;
        assert_eq!(
            rebase_urls(body, SHEET),
            r#"a{b:url("http://example.com/static/css/x.png")} c{d:url('http://example.com/static/css/y.png')}"#
        );
    }

    #[test]
    fn test_absolute_and_data_references_untouched() {
        let body = "a{b:url(http://cdn.com/x.png)} c{d:url(data:image/png;base64,AAAA)} e{f:url(#clip)}";
        assert_eq!(rebase_urls(body, SHEET), body);
    }

    #[test]
    fn test_invalid_base_leaves_body_alone() {
        let body = "a{b:url(x.png)}";
        assert_eq!(rebase_urls(body, "not a url"), body);
    }
}
