// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use serde::{Deserialize, Serialize};

use crate::types::SigningAlgorithm;

/// Process-level settings for the security core.
///
/// These are operator settings, loaded from `config.json`.  They are not the
/// signed application settings held by the config store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Algorithm used when a fresh signing key has to be generated.
    pub signing_algorithm: SigningAlgorithm,
    /// Keep the audit chain and config snapshots in an SQLite journal.
    pub persistence: bool,
    /// Journal file name, relative to the data directory.
    pub database_file: String,
    /// Sealed signing key file name, relative to the data directory.
    pub key_file: String,
    /// How many times a conflicting config update is retried before failing.
    pub max_update_retries: u32,
    /// Require the latest config snapshot to be committed to the audit chain.
    pub require_audit_completeness: bool,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            signing_algorithm: SigningAlgorithm::Ed25519,
            persistence: true,
            database_file: "trustlab.db".into(),
            key_file: "signing_key.age".into(),
            max_update_retries: 3,
            require_audit_completeness: true,
            log_filter: "info".into(),
        }
    }
}
