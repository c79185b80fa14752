// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Signed configuration store — versioned settings whose current snapshot
// carries a signature over its canonical encoding.
//
// Updates are optimistic: the new snapshot is built and signed outside the
// lock against a base version, then committed only if the base is still
// current.  A moved base is retried a bounded number of times before the
// update fails with `ConcurrencyConflict`.  Versions therefore never skip
// and never repeat.
//
// Authenticity is decided at read time against the trusted public key, never
// cached from write time.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use trustlab_core::error::{Result, TrustlabError};
use trustlab_core::types::{
    ConfigSnapshot, CurrentConfig, Settings, SnapshotSignature, baseline_settings, parse_settings,
};

use crate::crypto::{self, PublicKey, Signature, SigningKeyPair};
use crate::journal::Journal;

/// Default number of retries after a version conflict.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Whether `snapshot` is signed and its signature verifies under `trusted`.
pub fn verify_snapshot(trusted: &PublicKey, snapshot: &ConfigSnapshot) -> bool {
    let SnapshotSignature::Signed { algorithm, value } = &snapshot.signature else {
        return false;
    };
    if *algorithm != trusted.algorithm() {
        return false;
    }
    let Ok(signature) = Signature::from_hex(value) else {
        return false;
    };
    let Ok(canonical) = snapshot.canonical_bytes() else {
        return false;
    };
    crypto::verify(trusted, &canonical, &signature)
}

/// Build a signed snapshot of `settings` at `version`.
fn signed_snapshot(settings: Settings, version: u64, key: &SigningKeyPair) -> Result<ConfigSnapshot> {
    let canonical = ConfigSnapshot::canonical_bytes_for(&settings, version)?;
    let signature = crypto::sign(key, &canonical)?;
    Ok(ConfigSnapshot {
        version,
        settings,
        signature: SnapshotSignature::Signed {
            algorithm: key.algorithm(),
            value: signature.to_hex(),
        },
    })
}

/// Versioned configuration with a trusted verification key.
pub struct SignedConfigStore {
    current: RwLock<Option<ConfigSnapshot>>,
    trusted_key: PublicKey,
    journal: Option<Arc<Mutex<Journal>>>,
    max_retries: u32,
}

impl SignedConfigStore {
    /// An uninitialised, memory-only store.
    pub fn new(trusted_key: PublicKey) -> Self {
        Self {
            current: RwLock::new(None),
            trusted_key,
            journal: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// A store backed by `journal`, holding its latest snapshot verbatim.
    #[instrument(skip_all)]
    pub fn with_journal(trusted_key: PublicKey, journal: Arc<Mutex<Journal>>) -> Result<Self> {
        let latest = journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest_snapshot()?;

        info!(version = latest.as_ref().map(|s| s.version), "config store loaded");
        Ok(Self {
            current: RwLock::new(latest),
            trusted_key,
            journal: Some(journal),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn trusted_key(&self) -> &PublicKey {
        &self.trusted_key
    }

    pub fn is_initialized(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Write the signed baseline snapshot (version 0) if the store is empty.
    ///
    /// Returns the baseline when one was created, `None` if the store already
    /// held a snapshot.
    #[instrument(skip_all)]
    pub fn initialize(&self, key: &SigningKeyPair) -> Result<Option<ConfigSnapshot>> {
        self.ensure_trusted(key)?;
        let baseline = signed_snapshot(baseline_settings(), 0, key)?;

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current.is_some() {
            return Ok(None);
        }
        self.journal_snapshot(&baseline)?;
        *current = Some(baseline.clone());

        info!("baseline config snapshot signed");
        Ok(Some(baseline))
    }

    /// The latest snapshot and whether it verifies right now.
    pub fn current(&self) -> Result<CurrentConfig> {
        let snapshot = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| TrustlabError::Uninitialized("no config snapshot".into()))?;

        let authentic = verify_snapshot(&self.trusted_key, &snapshot);
        debug!(version = snapshot.version, authentic, "config snapshot read");
        Ok(CurrentConfig {
            snapshot,
            authentic,
        })
    }

    /// Merge `new_values` over the current settings, bump the version and sign.
    ///
    /// `new_values` is the loosely typed request payload; unknown names or
    /// wrongly typed values fail with a validation error before anything
    /// changes.
    #[instrument(skip_all)]
    pub fn update(&self, new_values: &Value, key: &SigningKeyPair) -> Result<ConfigSnapshot> {
        let changes = parse_settings(new_values)?;
        self.ensure_trusted(key)?;

        let snapshot = self.replace_with(|base| {
            let mut settings = base.settings.clone();
            settings.extend(changes.clone());
            signed_snapshot(settings, base.version + 1, key)
        })?;

        info!(version = snapshot.version, "config updated (signed)");
        Ok(snapshot)
    }

    /// UNSAFE DEMO OPERATION: apply `new_values` without signing.
    ///
    /// The stored snapshot carries `SnapshotSignature::Unsigned`, so it reads
    /// back as not authentic and attestation reports it.
    #[instrument(skip_all)]
    pub fn update_unsafe(&self, new_values: &Value) -> Result<ConfigSnapshot> {
        let changes = parse_settings(new_values)?;

        let snapshot = self.replace_with(|base| {
            let mut settings = base.settings.clone();
            settings.extend(changes.clone());
            Ok(ConfigSnapshot {
                version: base.version + 1,
                settings,
                signature: SnapshotSignature::Unsigned,
            })
        })?;

        warn!(version = snapshot.version, "config updated WITHOUT signature");
        Ok(snapshot)
    }

    /// UNSAFE DEMO OPERATION: edit the current snapshot in place.
    ///
    /// Simulates corruption of stored state; not journalled.
    pub fn tamper_with_snapshot(&self, edit: impl FnOnce(&mut ConfigSnapshot)) -> Result<()> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let snapshot = current
            .as_mut()
            .ok_or_else(|| TrustlabError::Uninitialized("no config snapshot".into()))?;
        edit(snapshot);
        warn!(version = snapshot.version, "config snapshot tampered with (simulation)");
        Ok(())
    }

    // -- Internals -----------------------------------------------------------

    fn ensure_trusted(&self, key: &SigningKeyPair) -> Result<()> {
        if key.public_key() != &self.trusted_key {
            return Err(TrustlabError::Key(
                "signing key does not match the trusted config key".into(),
            ));
        }
        Ok(())
    }

    fn journal_snapshot(&self, snapshot: &ConfigSnapshot) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .append_snapshot(snapshot)?;
        }
        Ok(())
    }

    /// Build a successor of the current snapshot with `build` (outside the
    /// lock) and commit it if the base version is still current.
    fn replace_with(
        &self,
        build: impl Fn(&ConfigSnapshot) -> Result<ConfigSnapshot>,
    ) -> Result<ConfigSnapshot> {
        let attempts = self.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let base = self
                .current
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
                .ok_or_else(|| TrustlabError::Uninitialized("no config snapshot".into()))?;

            let next = build(&base)?;

            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            match current.as_ref() {
                Some(live) if live.version == base.version => {
                    self.journal_snapshot(&next)?;
                    *current = Some(next.clone());
                    return Ok(next);
                }
                _ => debug!(attempt, base = base.version, "config version moved; retrying"),
            }
        }

        warn!(attempts, "config update abandoned after repeated conflicts");
        Err(TrustlabError::ConcurrencyConflict { attempts })
    }
}
