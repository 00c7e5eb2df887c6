//! Platform-agnostic types for BLE scent diffusers.
//!
//! This crate provides the shared data model used by the session layer
//! (aroma-core) and by any UI that consumes it.
//!
//! # Features
//!
//! - [`Peripheral`] records for discovered devices
//! - [`DeviceName`] validation for the rename command
//! - The static [`ModelInfo`] table of recognized models
//! - UUID constants for the diffuser service and characteristic
//!
//! # Example
//!
//! ```
//! use aroma_types::{ModelInfo, Peripheral};
//!
//! let p = Peripheral::new("AA:BB:CC:DD:EE:FF", None, Some(-61));
//! assert_eq!(p.display_name(), "Unknown Device");
//! assert_eq!(ModelInfo::lookup("EA313").unwrap().levels, 9);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{DeviceName, KNOWN_MODELS, MIN_NAME_LEN, ModelInfo, PLACEHOLDER_NAME, Peripheral};
pub use uuid as uuids;

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Any name that validates encodes to exactly one byte per character.
        #[test]
        fn valid_names_encode_one_byte_per_char(name in "[ -~\u{a0}-\u{ff}]{0,24}") {
            if let Ok(valid) = DeviceName::new(&name) {
                prop_assert_eq!(valid.bytes().count(), valid.as_str().chars().count());
                prop_assert!(valid.as_str().chars().count() >= MIN_NAME_LEN);
            }
        }

        /// Model lookup never panics on arbitrary input.
        #[test]
        fn model_lookup_never_panics(response in ".*") {
            let _ = ModelInfo::lookup(&response);
        }
    }
}
