//! Property tests for the derived base64 length.

use proptest::prelude::*;
use wsock::Config;
use wsock::payload::max_base64_len;

proptest! {
    /// The derived limit is the exact base64 expansion of the frame
    /// limit: ceil(4 * size / 3) rounded up to a multiple of 4.
    #[test]
    fn derived_base64_matches_expansion(size in 0usize..=u32::MAX as usize) {
        let derived = max_base64_len(size);
        prop_assert_eq!(derived, (size + 2) / 3 * 4);
        prop_assert_eq!(derived % 4, 0);
        // Never smaller than the unrounded expansion.
        prop_assert!(derived >= 4 * size / 3);
        prop_assert!(derived < 4 * size / 3 + 8);
    }

    /// The config derivation agrees with the helper.
    #[test]
    fn config_derivation_agrees(size in 0usize..=u32::MAX as usize) {
        let config = Config::new().with_max_frame(size);
        prop_assert_eq!(config.max_base64(), max_base64_len(size));
    }
}

#[test]
fn derived_base64_for_the_default_limit() {
    let config = Config::default();
    assert_eq!(config.max_frame, 4_000_024);
    assert_eq!(config.max_base64(), max_base64_len(4_000_024));
    assert_eq!(config.max_base64() % 4, 0);
}
