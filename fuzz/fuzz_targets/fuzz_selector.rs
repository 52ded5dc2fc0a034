//! Fuzz target for candidate selection.
//!
//! Feeds arbitrary sequences of reference sequences through the selector and
//! checks that every selection is a contiguous run of its sequence.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use squeeze_core::{AppearanceTracker, CandidateSelector, GroupStats, ResourceId};

#[derive(Debug, Arbitrary)]
struct Input {
    threshold: u8,
    documents: Vec<Vec<u8>>,
}

fuzz_target!(|input: Input| {
    let threshold = (f64::from(input.threshold) + 1.0) / 256.0;
    let Ok(selector) = CandidateSelector::new(threshold) else {
        return;
    };

    let mut appearances = AppearanceTracker::new();
    let mut groups = GroupStats::new();

    // Bound work per input.
    for document in input.documents.iter().take(32) {
        let sequence: Vec<ResourceId> = document
            .iter()
            .take(12)
            .map(|n| ResourceId::new(format!("http://example.com/{}.js", n % 16)))
            .collect();

        let selections = selector.select(&sequence, &mut appearances, &mut groups);
        for selection in selections {
            let members = selection.members();
            assert!(!members.is_empty());
            assert!(sequence.windows(members.len()).any(|w| w == members));
        }
    }
});
