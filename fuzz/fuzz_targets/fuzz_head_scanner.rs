//! Fuzz target for the HTML head scanner.
//!
//! Scanning arbitrary markup must not panic, and serializing an untouched
//! document must reproduce the input exactly.

#![no_main]

use libfuzzer_sys::fuzz_target;
use squeeze_core::{ElementFamily, HtmlDocument, ManagedElement};

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };

    let mut document = HtmlDocument::parse(source);
    assert_eq!(document.serialize(), source);

    // Detaching every element must still produce valid UTF-8 slices.
    for family in ElementFamily::ALL {
        for element in document.elements_mut(family) {
            element.detach();
        }
    }
    let _ = document.serialize();
});
