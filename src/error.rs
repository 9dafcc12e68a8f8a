//! Error types for voxhub

use std::io;
use thiserror::Error;

/// Closed set of failures a speech backend can report
///
/// Discriminants are part of the C ABI: `0` is success and every variant
/// keeps its code forever. `BackendError::COUNT` is one past the last code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum BackendError {
    #[error("Not initialized")]
    NotInitialized = 1,

    #[error("Invalid parameter")]
    InvalidParam = 2,

    #[error("Not implemented")]
    NotImplemented = 3,

    #[error("No voices available")]
    NoVoices = 4,

    #[error("Voice not found")]
    VoiceNotFound = 5,

    #[error("Speak failure")]
    SpeakFailure = 6,

    #[error("Memory failure")]
    MemoryFailure = 7,

    #[error("Range out of bounds")]
    RangeOutOfBounds = 8,

    #[error("Internal backend error")]
    InternalBackendError = 9,

    #[error("Not speaking")]
    NotSpeaking = 10,

    #[error("Not paused")]
    NotPaused = 11,

    #[error("Already paused")]
    AlreadyPaused = 12,

    #[error("Invalid UTF-8")]
    InvalidUtf8 = 13,

    #[error("Invalid operation")]
    InvalidOperation = 14,

    #[error("Already initialized")]
    AlreadyInitialized = 15,

    #[error("Backend not available")]
    BackendNotAvailable = 16,

    #[error("Unknown error")]
    Unknown = 17,
}

impl BackendError {
    /// Number of codes including success
    pub const COUNT: u32 = 18;

    /// Every variant in code order
    pub const ALL: [BackendError; 17] = [
        BackendError::NotInitialized,
        BackendError::InvalidParam,
        BackendError::NotImplemented,
        BackendError::NoVoices,
        BackendError::VoiceNotFound,
        BackendError::SpeakFailure,
        BackendError::MemoryFailure,
        BackendError::RangeOutOfBounds,
        BackendError::InternalBackendError,
        BackendError::NotSpeaking,
        BackendError::NotPaused,
        BackendError::AlreadyPaused,
        BackendError::InvalidUtf8,
        BackendError::InvalidOperation,
        BackendError::AlreadyInitialized,
        BackendError::BackendNotAvailable,
        BackendError::Unknown,
    ];

    /// Numeric code used at the C ABI
    pub fn code(self) -> u32 {
        self as u8 as u32
    }

    /// Inverse of [`BackendError::code`]; `None` for success and unknown codes
    pub fn from_code(code: u32) -> Option<Self> {
        code.checked_sub(1)
            .and_then(|i| Self::ALL.get(i as usize))
            .copied()
    }

    /// Soft errors mean "try a different backend", not a user-facing failure
    pub fn is_soft(self) -> bool {
        matches!(
            self,
            BackendError::NotImplemented | BackendError::BackendNotAvailable
        )
    }
}

/// Human readable text for an ABI status code
///
/// Total over `u32`: success maps to "Success" and anything outside the
/// taxonomy maps to "Unknown error".
pub fn error_string(code: u32) -> &'static str {
    match code {
        0 => "Success",
        _ => match BackendError::from_code(code) {
            Some(e) => e.message(),
            None => "Unknown error",
        },
    }
}

impl BackendError {
    fn message(self) -> &'static str {
        match self {
            BackendError::NotInitialized => "Not initialized",
            BackendError::InvalidParam => "Invalid parameter",
            BackendError::NotImplemented => "Not implemented",
            BackendError::NoVoices => "No voices available",
            BackendError::VoiceNotFound => "Voice not found",
            BackendError::SpeakFailure => "Speak failure",
            BackendError::MemoryFailure => "Memory failure",
            BackendError::RangeOutOfBounds => "Range out of bounds",
            BackendError::InternalBackendError => "Internal backend error",
            BackendError::NotSpeaking => "Not speaking",
            BackendError::NotPaused => "Not paused",
            BackendError::AlreadyPaused => "Already paused",
            BackendError::InvalidUtf8 => "Invalid UTF-8",
            BackendError::InvalidOperation => "Invalid operation",
            BackendError::AlreadyInitialized => "Already initialized",
            BackendError::BackendNotAvailable => "Backend not available",
            BackendError::Unknown => "Unknown error",
        }
    }
}

/// Result type alias for backend contract operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Application-level error for everything outside the backend contract
#[derive(Error, Debug)]
pub enum VoxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("Speech error: {0}")]
    Speech(#[from] BackendError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_round_trip() {
        for e in BackendError::ALL {
            assert_eq!(BackendError::from_code(e.code()), Some(e));
        }
        assert_eq!(BackendError::from_code(0), None);
        assert_eq!(BackendError::from_code(BackendError::COUNT), None);
        assert_eq!(BackendError::from_code(u32::MAX), None);
    }

    #[test]
    fn test_codes_are_dense() {
        let codes: Vec<u32> = BackendError::ALL.iter().map(|e| e.code()).collect();
        let expected: Vec<u32> = (1..BackendError::COUNT).collect();
        assert_eq!(codes, expected);
    }

    #[test]
    fn test_error_string_total_and_distinct() {
        let mut seen = HashSet::new();
        for code in 0..BackendError::COUNT {
            let s = error_string(code);
            assert!(!s.is_empty());
            assert!(seen.insert(s), "duplicate message for code {}", code);
        }
        assert_eq!(error_string(BackendError::COUNT), "Unknown error");
        assert_eq!(error_string(9999), "Unknown error");
    }

    #[test]
    fn test_display_matches_error_string() {
        for e in BackendError::ALL {
            assert_eq!(e.to_string(), error_string(e.code()));
        }
    }

    #[test]
    fn test_soft_errors() {
        assert!(BackendError::NotImplemented.is_soft());
        assert!(BackendError::BackendNotAvailable.is_soft());
        assert!(!BackendError::SpeakFailure.is_soft());
        assert!(!BackendError::Unknown.is_soft());
    }
}
