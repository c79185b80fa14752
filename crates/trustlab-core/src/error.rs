// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Trustlab.
//
// Tamper detection is NOT an error: a broken chain or an unsigned snapshot is
// reported through `VerificationResult` / `AttestationResult`.  The variants
// below cover only operations that could not be carried out.

use thiserror::Error;

/// Top-level error type for all Trustlab operations.
#[derive(Debug, Error)]
pub enum TrustlabError {
    // -- Validation --
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown setting: {0}")]
    UnknownSetting(String),

    #[error("invalid value for setting {setting}: expected {expected}")]
    InvalidSettingValue {
        setting: String,
        expected: &'static str,
    },

    // -- Crypto --
    #[error("malformed key: {0}")]
    Key(String),

    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    // -- Concurrency --
    #[error("concurrent update conflict persisted after {attempts} attempts")]
    ConcurrencyConflict { attempts: u32 },

    // -- State --
    #[error("store not initialised: {0}")]
    Uninitialized(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrustlabError {
    /// Whether the caller may reasonably retry the operation unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. } | Self::Database(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TrustlabError>;
