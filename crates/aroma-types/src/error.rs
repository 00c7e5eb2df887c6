//! Error types for data validation in aroma-types.

use thiserror::Error;

/// Errors that can occur when validating diffuser data.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in aroma-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A device name was empty or only whitespace.
    #[error("Device name cannot be empty")]
    EmptyName,

    /// A device name was shorter than the firmware accepts.
    #[error("Device name must be at least {min} characters, got {actual}")]
    NameTooShort {
        /// Minimum accepted length in characters.
        min: usize,
        /// Length of the rejected name.
        actual: usize,
    },

    /// A character cannot be carried in a single protocol byte.
    #[error("Character {character:?} at position {position} cannot be encoded in one byte")]
    UnencodableCharacter {
        /// The offending character.
        character: char,
        /// Zero-based character position in the name.
        position: usize,
    },
}

/// Result type alias using aroma-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
