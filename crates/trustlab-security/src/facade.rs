// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Security facade — owns the chained log, the signed config store and the
// attestation simulator, and runs the two workflows callers need: record an
// event, and change configuration.
//
// Config changes go to the store first and are then appended to the chain.
// Both steps run under the write side of `config_gate` and attestation runs
// under its read side, so an attestation never observes a config version
// whose chain entry is still on its way.  Config writers are serialised by
// the same gate, so chain order always matches version order.  The stores are
// still not atomic with each other: if the chain append fails, the new
// version stays in place unaudited and attestation reports it.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::{Value, json};
use tracing::{error, info, instrument, warn};
use trustlab_core::LabConfig;
use trustlab_core::error::Result;
use trustlab_core::types::{
    AttestationResult, ConfigSnapshot, CurrentConfig, LogEntry, VerificationResult,
};

use crate::attestation::{
    ACTION_CONFIG_BASELINE, ACTION_CONFIG_UPDATE, ACTION_CONFIG_UPDATE_UNSAFE,
    AttestationSimulator,
};
use crate::chain_log::ChainedLog;
use crate::config_store::SignedConfigStore;
use crate::crypto::{PublicKey, SigningKeyPair, generate_keypair};
use crate::journal::Journal;
use crate::vault::KeyVault;

/// Actor recorded for entries the facade writes on its own behalf.
pub const SYSTEM_ACTOR: &str = "system";
/// Chain action recorded by [`SecurityFacade::simulate_auth_bypass`].
pub const ACTION_AUTH_BYPASS: &str = "auth_bypass";

/// Entry point for everything security-related.
///
/// Safe to share across threads behind an `Arc`; every store guards itself.
pub struct SecurityFacade {
    log: Arc<ChainedLog>,
    config: Arc<SignedConfigStore>,
    attestation: AttestationSimulator,
    signing_key: SigningKeyPair,
    config_gate: RwLock<()>,
}

impl SecurityFacade {
    /// Memory-only instance with a freshly generated signing key.
    pub fn in_memory(settings: &LabConfig) -> Result<Self> {
        let key = generate_keypair(settings.signing_algorithm)?;
        let config = SignedConfigStore::new(key.public_key().clone())
            .with_max_retries(settings.max_update_retries);
        Self::assemble(ChainedLog::new(), config, key, settings)
    }

    /// Persistent instance rooted at `data_dir`.
    ///
    /// The signing key is unsealed with `passphrase` (or generated and sealed
    /// on first run).  Chain entries and snapshots are reloaded from the
    /// journal and re-verified by the normal read paths.
    #[instrument(skip_all, fields(dir = %data_dir.as_ref().display()))]
    pub fn open(
        data_dir: impl AsRef<Path>,
        settings: &LabConfig,
        passphrase: &str,
    ) -> Result<Self> {
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let key = KeyVault::new(passphrase)
            .load_or_create(dir.join(&settings.key_file), settings.signing_algorithm)?;
        let journal = Arc::new(Mutex::new(Journal::open(dir.join(&settings.database_file))?));

        let log = ChainedLog::with_journal(Arc::clone(&journal))?;
        let config = SignedConfigStore::with_journal(key.public_key().clone(), journal)?
            .with_max_retries(settings.max_update_retries);

        Self::assemble(log, config, key, settings)
    }

    fn assemble(
        log: ChainedLog,
        config: SignedConfigStore,
        signing_key: SigningKeyPair,
        settings: &LabConfig,
    ) -> Result<Self> {
        let log = Arc::new(log);
        let config = Arc::new(config);

        if let Some(baseline) = config.initialize(&signing_key)? {
            log.append(SYSTEM_ACTOR, ACTION_CONFIG_BASELINE, &baseline.audit_bytes()?)?;
        }

        let attestation = AttestationSimulator::new(Arc::clone(&log), Arc::clone(&config))
            .with_audit_completeness(settings.require_audit_completeness);

        info!(
            entries = log.len(),
            algorithm = %signing_key.algorithm(),
            "security facade ready"
        );

        Ok(Self {
            log,
            config,
            attestation,
            signing_key,
            config_gate: RwLock::new(()),
        })
    }

    // -- Events --------------------------------------------------------------

    /// Append an event to the chain.
    pub fn record_event(&self, actor: &str, action: &str, payload: &[u8]) -> Result<LogEntry> {
        self.log.append(actor, action, payload)
    }

    /// Append an event, then re-verify the whole chain.
    pub fn record_and_verify(
        &self,
        actor: &str,
        action: &str,
        payload: &[u8],
    ) -> Result<(LogEntry, VerificationResult)> {
        let entry = self.record_event(actor, action, payload)?;
        Ok((entry, self.log.verify_chain()))
    }

    pub fn verify_log(&self) -> VerificationResult {
        self.log.verify_chain()
    }

    /// Newest first.
    pub fn recent_entries(&self, limit: usize) -> Vec<LogEntry> {
        self.log.recent_entries(limit)
    }

    pub fn entry_count(&self) -> usize {
        self.log.len()
    }

    // -- Configuration -------------------------------------------------------

    pub fn get_config(&self) -> Result<CurrentConfig> {
        self.config.current()
    }

    /// Apply `values` to the config store and record the change on the chain.
    ///
    /// With `verified == false` the snapshot is stored unsigned, the demo
    /// "skip verification" path.  Invalid payloads fail before either store
    /// changes.
    ///
    /// If the chain append fails after the store committed, the error is
    /// returned but the new version remains current, unaudited.
    #[instrument(skip(self, values))]
    pub fn set_config(&self, actor: &str, values: &Value, verified: bool) -> Result<ConfigSnapshot> {
        let _writer = self
            .config_gate
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let (snapshot, action) = if verified {
            (
                self.config.update(values, &self.signing_key)?,
                ACTION_CONFIG_UPDATE,
            )
        } else {
            (self.config.update_unsafe(values)?, ACTION_CONFIG_UPDATE_UNSAFE)
        };

        if let Err(e) = snapshot
            .audit_bytes()
            .and_then(|payload| self.log.append(actor, action, &payload))
        {
            error!(
                version = snapshot.version,
                error = %e,
                "config version committed but not recorded on the chain"
            );
            return Err(e);
        }
        Ok(snapshot)
    }

    /// Apply `values`, then read the config back with its authenticity.
    pub fn update_and_verify(
        &self,
        actor: &str,
        values: &Value,
        verified: bool,
    ) -> Result<CurrentConfig> {
        self.set_config(actor, values, verified)?;
        self.config.current()
    }

    // -- Attestation ---------------------------------------------------------

    /// Attest with no config change in flight.
    pub fn get_attestation(&self) -> AttestationResult {
        let _reader = self
            .config_gate
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        self.attestation.attest()
    }

    // -- Demo operations -----------------------------------------------------

    /// UNSAFE DEMO OPERATION: record that `username` was let in as admin
    /// without credentials.
    ///
    /// The chain stays intact; the point is that the bypass is on record.
    pub fn simulate_auth_bypass(&self, username: &str) -> Result<LogEntry> {
        warn!(username, "simulated authentication bypass");
        let payload = json!({ "user": username, "role": "admin" });
        self.log
            .append(username, ACTION_AUTH_BYPASS, payload.to_string().as_bytes())
    }

    // -- Accessors -----------------------------------------------------------

    /// Key that config signatures are checked against.
    pub fn public_key(&self) -> &PublicKey {
        self.signing_key.public_key()
    }

    pub fn log(&self) -> &Arc<ChainedLog> {
        &self.log
    }

    pub fn config_store(&self) -> &Arc<SignedConfigStore> {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::verify_snapshot;
    use std::sync::atomic::{AtomicBool, Ordering};
    use trustlab_core::error::TrustlabError;
    use trustlab_core::types::{AttestationStatus, Setting, SettingValue, TamperReason};

    fn facade() -> SecurityFacade {
        SecurityFacade::in_memory(&LabConfig::default()).unwrap()
    }

    #[test]
    fn fresh_facade_is_trusted_with_logged_baseline() {
        let facade = facade();
        assert_eq!(facade.entry_count(), 1);
        assert_eq!(facade.log().entry(0).unwrap().action, ACTION_CONFIG_BASELINE);

        let current = facade.get_config().unwrap();
        assert_eq!(current.snapshot.version, 0);
        assert!(current.authentic);
        assert!(facade.get_attestation().is_trusted());
    }

    #[test]
    fn record_and_verify_reports_intact_chain() {
        let facade = facade();
        let (entry, result) = facade
            .record_and_verify("alice", "login", b"session=42")
            .unwrap();
        assert_eq!(entry.sequence, 1);
        assert!(result.ok);
        assert_eq!(result.entry_count, 2);
    }

    #[test]
    fn verified_update_is_signed_logged_and_trusted() {
        let facade = facade();
        let snapshot = facade
            .set_config("admin", &serde_json::json!({ "maintenance_mode": true }), true)
            .unwrap();

        assert_eq!(snapshot.version, 1);
        assert!(verify_snapshot(facade.public_key(), &snapshot));
        assert_eq!(
            snapshot.get(Setting::MaintenanceMode),
            Some(&SettingValue::Bool(true))
        );

        let last = facade.recent_entries(1).remove(0);
        assert_eq!(last.action, ACTION_CONFIG_UPDATE);
        assert_eq!(last.actor, "admin");
        assert!(facade.get_attestation().is_trusted());
    }

    #[test]
    fn unverified_update_is_logged_but_flagged() {
        let facade = facade();
        let current = facade
            .update_and_verify("admin", &serde_json::json!({ "debug": true }), false)
            .unwrap();
        assert!(!current.authentic);
        assert_eq!(
            facade.recent_entries(1)[0].action,
            ACTION_CONFIG_UPDATE_UNSAFE
        );

        let result = facade.get_attestation();
        assert_eq!(result.status, AttestationStatus::Tampered);
        assert_eq!(result.reasons, vec![TamperReason::ConfigUnsigned { version: 1 }]);
    }

    #[test]
    fn invalid_update_changes_nothing() {
        let facade = facade();
        let err = facade
            .set_config("admin", &serde_json::json!({ "root_shell": true }), true)
            .unwrap_err();
        assert!(matches!(err, TrustlabError::UnknownSetting(_)));
        assert_eq!(facade.entry_count(), 1);
        assert_eq!(facade.get_config().unwrap().snapshot.version, 0);
    }

    #[test]
    fn auth_bypass_is_recorded() {
        let facade = facade();
        let entry = facade.simulate_auth_bypass("mallory").unwrap();
        assert_eq!(entry.action, ACTION_AUTH_BYPASS);
        assert_eq!(entry.actor, "mallory");
        assert!(facade.verify_log().ok);
    }

    #[test]
    fn tamper_walkthrough_reports_both_failures() {
        // Entry 0 is the logged baseline, so the session starts at entry 1.
        let facade = facade();

        for action in ["login", "view_dashboard", "update_config"] {
            facade.record_event("alice", action, b"").unwrap();
        }
        assert!(facade.verify_log().ok);
        assert_eq!(facade.entry_count(), 4);

        facade
            .log()
            .tamper_with_entry(2, |e| e.action = "delete_logs".into())
            .unwrap();
        assert_eq!(facade.verify_log().first_break_index, Some(2));

        let before = facade.get_config().unwrap().snapshot.version;
        let snapshot = facade
            .set_config("alice", &serde_json::json!({ "debug": true }), false)
            .unwrap();
        assert_eq!(snapshot.version, before + 1);
        assert!(!facade.get_config().unwrap().authentic);

        let result = facade.get_attestation();
        assert_eq!(result.status, AttestationStatus::Tampered);
        let reasons: Vec<String> = result.reasons.iter().map(ToString::to_string).collect();
        assert!(reasons.iter().any(|r| r.contains("chain broken")));
        assert!(reasons.iter().any(|r| r.contains("config unsigned")));
    }

    #[test]
    fn concurrent_callers_keep_everything_consistent() {
        let facade = Arc::new(facade());
        let handles: Vec<_> = (0..6)
            .map(|t| {
                let facade = Arc::clone(&facade);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        if i % 2 == 0 {
                            facade
                                .record_event(&format!("user{t}"), "ping", &[t as u8, i as u8])
                                .unwrap();
                        } else {
                            facade
                                .set_config(
                                    "admin",
                                    &serde_json::json!({ "session_timeout_secs": t * 100 + i }),
                                    true,
                                )
                                .unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(facade.entry_count(), 1 + 60);
        assert!(facade.verify_log().ok);
        assert_eq!(facade.get_config().unwrap().snapshot.version, 30);
        assert!(facade.get_attestation().is_trusted());
    }

    #[test]
    fn reopened_facade_resumes_trusted_state() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LabConfig::default();

        {
            let facade = SecurityFacade::open(dir.path(), &settings, "lab-pass").unwrap();
            facade.record_event("alice", "login", b"").unwrap();
            facade
                .set_config("alice", &serde_json::json!({ "allow_registration": false }), true)
                .unwrap();
        }

        let facade = SecurityFacade::open(dir.path(), &settings, "lab-pass").unwrap();
        assert_eq!(facade.entry_count(), 3);
        let current = facade.get_config().unwrap();
        assert_eq!(current.snapshot.version, 1);
        assert!(current.authentic);
        assert!(facade.get_attestation().is_trusted());
    }

    #[test]
    fn reopen_with_wrong_passphrase_fails() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LabConfig::default();
        drop(SecurityFacade::open(dir.path(), &settings, "right").unwrap());

        let err = SecurityFacade::open(dir.path(), &settings, "wrong")
            .err()
            .unwrap();
        assert!(matches!(err, TrustlabError::Decryption(_)));
    }

    #[test]
    fn attestation_never_sees_a_half_applied_update() {
        let facade = facade();
        let done = AtomicBool::new(false);

        let verdicts = std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..200 {
                    facade
                        .set_config(
                            "admin",
                            &serde_json::json!({ "session_timeout_secs": i }),
                            true,
                        )
                        .unwrap();
                }
                done.store(true, Ordering::SeqCst);
            });
            let attester = s.spawn(|| {
                let mut verdicts = Vec::new();
                while !done.load(Ordering::SeqCst) {
                    verdicts.push(facade.get_attestation());
                }
                verdicts.push(facade.get_attestation());
                verdicts
            });
            attester.join().unwrap()
        });

        let untrusted: Vec<_> = verdicts.iter().filter(|r| !r.is_trusted()).collect();
        assert!(untrusted.is_empty(), "untrusted verdicts: {untrusted:?}");
        assert_eq!(facade.get_config().unwrap().snapshot.version, 200);
    }

    #[test]
    fn failed_chain_append_leaves_version_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LabConfig::default();
        let facade = SecurityFacade::open(dir.path(), &settings, "lab-pass").unwrap();

        let conn = rusqlite::Connection::open(dir.path().join(&settings.database_file)).unwrap();
        conn.execute("DROP TABLE chain_log", []).unwrap();
        drop(conn);

        let err = facade
            .set_config("admin", &serde_json::json!({ "debug": true }), true)
            .unwrap_err();
        assert!(matches!(err, TrustlabError::Database(_)));
        assert_eq!(facade.get_config().unwrap().snapshot.version, 1);
        assert_eq!(
            facade.get_attestation().reasons,
            vec![TamperReason::ConfigNotAudited { version: 1 }]
        );
    }

    #[test]
    fn corrupted_settings_row_reopens_as_tampered() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LabConfig::default();
        {
            let facade = SecurityFacade::open(dir.path(), &settings, "lab-pass").unwrap();
            facade
                .set_config("admin", &serde_json::json!({ "debug": true }), true)
                .unwrap();
        }
        let conn = rusqlite::Connection::open(dir.path().join(&settings.database_file)).unwrap();
        conn.execute(
            "UPDATE config_snapshots SET settings = replace(settings, '\"debug\"', '\"debuq\"')",
            [],
        )
        .unwrap();
        drop(conn);

        let facade = SecurityFacade::open(dir.path(), &settings, "lab-pass").unwrap();
        assert!(!facade.get_config().unwrap().authentic);
        let result = facade.get_attestation();
        assert_eq!(result.status, AttestationStatus::Tampered);
        assert!(
            result
                .reasons
                .contains(&TamperReason::ConfigSignatureInvalid { version: 1 })
        );
    }

    #[test]
    fn corrupted_sequence_reopens_as_chain_break() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LabConfig::default();
        {
            let facade = SecurityFacade::open(dir.path(), &settings, "lab-pass").unwrap();
            facade.record_event("alice", "login", b"").unwrap();
            facade.record_event("alice", "logout", b"").unwrap();
        }
        let conn = rusqlite::Connection::open(dir.path().join(&settings.database_file)).unwrap();
        conn.execute("UPDATE chain_log SET sequence = 'x' WHERE action = 'login'", [])
            .unwrap();
        drop(conn);

        let facade = SecurityFacade::open(dir.path(), &settings, "lab-pass").unwrap();
        assert_eq!(facade.entry_count(), 3);
        assert_eq!(facade.verify_log().first_break_index, Some(1));
        assert!(
            facade
                .get_attestation()
                .reasons
                .contains(&TamperReason::ChainBroken { index: 1 })
        );
    }
}
