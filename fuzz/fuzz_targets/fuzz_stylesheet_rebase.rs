//! Fuzz target for stylesheet `url()` rebasing.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };
    let rebased = squeeze_core::rebase_urls(body, "http://example.com/css/site.css");
    if !body.contains("url(") {
        assert_eq!(rebased, body);
    }
});
