//! Property-based tests for the scroll plan of a full-page capture.

use glazyr::services::capture_orchestrator::{scroll_offsets, MAX_TILES};
use proptest::prelude::*;

proptest! {
    #[test]
    fn plan_covers_the_whole_document(full in 1.0f64..50_000.0, viewport in 100.0f64..4_000.0) {
        let offsets = scroll_offsets(full, viewport);
        let expected = ((full / viewport).ceil() as usize).max(1);
        prop_assert_eq!(offsets.len(), expected);

        prop_assert_eq!(offsets[0], 0.0);
        let max_offset = (full - viewport).max(0.0);
        for pair in offsets.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
            // Consecutive viewports leave no gap.
            prop_assert!(pair[1] - pair[0] <= viewport + 1e-9);
        }
        for y in &offsets {
            prop_assert!(*y >= 0.0 && *y <= max_offset + 1e-9);
        }
        let last = offsets[offsets.len() - 1];
        prop_assert!(last + viewport >= full - 1e-6 * full.max(1.0));
    }

    #[test]
    fn plan_never_exceeds_tile_limit(full in 1.0f64..1.0e12, viewport in 0.001f64..4_000.0) {
        let offsets = scroll_offsets(full, viewport);
        prop_assert!(offsets.len() <= MAX_TILES);
        if (full / viewport).ceil() <= MAX_TILES as f64 {
            prop_assert!(!offsets.is_empty());
        }
    }

    #[test]
    fn non_positive_dimensions_give_empty_plan(full in -1000.0f64..=0.0, viewport in 1.0f64..2000.0) {
        prop_assert!(scroll_offsets(full, viewport).is_empty());
        prop_assert!(scroll_offsets(viewport, full).is_empty());
    }
}
