// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Attestation simulator — a software stand-in for a TPM quote over the audit
// chain and the config store.
//
// Nothing here is stored.  Every call to `attest` re-walks the chain,
// re-verifies the config signature and re-derives the measurement registers,
// so a verdict can never lag behind the state it describes.
//
// Measurement registers follow PCR extend semantics:
//   first extension:  R = SHA-256(data)
//   later extensions: R = SHA-256(hex(R) ‖ data)
//
//   audit_log — extended with each entry digest, oldest first
//   config    — extended once with the current snapshot's audit encoding

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use trustlab_core::types::{
    AttestationResult, AttestationStatus, ConfigSnapshot, LogEntry, TamperReason,
};

use crate::chain_log::{ChainedLog, verify_entries};
use crate::config_store::SignedConfigStore;
use crate::crypto::hash_bytes;

/// Chain action recorded when the baseline snapshot is created.
pub const ACTION_CONFIG_BASELINE: &str = "config_baseline";
/// Chain action recorded for a signed config update.
pub const ACTION_CONFIG_UPDATE: &str = "config_update";
/// Chain action recorded for an unsigned config update.
pub const ACTION_CONFIG_UPDATE_UNSAFE: &str = "config_update_unsafe";

pub const REGISTER_AUDIT_LOG: &str = "audit_log";
pub const REGISTER_CONFIG: &str = "config";

fn is_config_action(action: &str) -> bool {
    matches!(
        action,
        ACTION_CONFIG_BASELINE | ACTION_CONFIG_UPDATE | ACTION_CONFIG_UPDATE_UNSAFE
    )
}

/// Extend a measurement register with `data`.
pub fn extend_measurement(register: Option<&str>, data: &[u8]) -> String {
    match register {
        None => hash_bytes(data),
        Some(previous) => {
            let mut hasher = Sha256::new();
            hasher.update(previous.as_bytes());
            hasher.update(data);
            hex::encode(hasher.finalize())
        }
    }
}

/// Derives attestation verdicts from a chained log and a config store.
pub struct AttestationSimulator {
    log: Arc<ChainedLog>,
    config: Arc<SignedConfigStore>,
    require_audit_completeness: bool,
}

impl AttestationSimulator {
    pub fn new(log: Arc<ChainedLog>, config: Arc<SignedConfigStore>) -> Self {
        Self {
            log,
            config,
            require_audit_completeness: false,
        }
    }

    /// Also require the current snapshot to be committed to the chain by
    /// its most recent config entry.
    pub fn with_audit_completeness(mut self, required: bool) -> Self {
        self.require_audit_completeness = required;
        self
    }

    /// Current register values.
    pub fn measurements(&self) -> BTreeMap<String, String> {
        let current = self.config.current().ok();
        registers(&self.log.entries(), current.as_ref().map(|c| &c.snapshot))
    }

    /// Run every check and report the verdict.
    ///
    /// The chain and the config are each read once, and every check and
    /// register is derived from those copies.  Read-only: repeated calls over
    /// the same state return the same verdict.
    #[instrument(skip(self))]
    pub fn attest(&self) -> AttestationResult {
        let checked_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let current = match self.config.current() {
            Ok(current) => current,
            Err(e) => {
                debug!(error = %e, "attestation inconclusive");
                return AttestationResult {
                    status: AttestationStatus::Unknown,
                    checked_at,
                    reasons: vec![TamperReason::ConfigUninitialized],
                    measurements: registers(&self.log.entries(), None),
                };
            }
        };
        let entries = self.log.entries();

        let mut reasons = Vec::new();

        let chain = verify_entries(&entries);
        if let Some(index) = chain.first_break_index {
            reasons.push(TamperReason::ChainBroken { index });
        }

        let version = current.snapshot.version;
        if !current.authentic {
            if current.snapshot.is_unsigned() {
                reasons.push(TamperReason::ConfigUnsigned { version });
            } else {
                reasons.push(TamperReason::ConfigSignatureInvalid { version });
            }
        }

        if self.require_audit_completeness {
            let expected = current.snapshot.audit_bytes().map(|b| hash_bytes(&b)).ok();
            let recorded = entries.iter().rev().find(|e| is_config_action(&e.action));
            let audited = matches!(
                (&expected, recorded),
                (Some(expected), Some(entry)) if *expected == entry.payload_digest
            );
            if !audited {
                reasons.push(TamperReason::ConfigNotAudited { version });
            }
        }

        let status = if reasons.is_empty() {
            AttestationStatus::Trusted
        } else {
            AttestationStatus::Tampered
        };

        if status == AttestationStatus::Tampered {
            warn!(?reasons, "attestation failed");
        } else {
            debug!(entries = chain.entry_count, version, "attestation passed");
        }

        AttestationResult {
            status,
            checked_at,
            reasons,
            measurements: registers(&entries, Some(&current.snapshot)),
        }
    }
}

fn registers(entries: &[LogEntry], snapshot: Option<&ConfigSnapshot>) -> BTreeMap<String, String> {
    let mut registers = BTreeMap::new();

    let audit = entries.iter().fold(None, |register: Option<String>, entry| {
        Some(extend_measurement(register.as_deref(), entry.digest.as_bytes()))
    });
    if let Some(value) = audit {
        registers.insert(REGISTER_AUDIT_LOG.to_owned(), value);
    }

    if let Some(encoded) = snapshot.and_then(|s| s.audit_bytes().ok()) {
        registers.insert(REGISTER_CONFIG.to_owned(), extend_measurement(None, &encoded));
    }

    registers
}
