// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Chained audit log — append-only, hash-linked record of every privileged
// action.
//
// Entry digest (SHA-256, hex) covers, in order, each field length-prefixed
// with a big-endian u64:
//
//   sequence (8 bytes BE) ‖ timestamp ‖ actor ‖ action ‖ payload_digest ‖
//   previous_digest
//
// Entry 0 links to `GENESIS_DIGEST`; entry i links to entry i-1's digest.
//
// An entry is PENDING once its digest is computed and COMMITTED once it is
// journalled and published to readers.  Both steps happen under the write
// lock, so readers never see a pending entry and no two appends can claim
// the same predecessor.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use trustlab_core::error::{Result, TrustlabError};
use trustlab_core::types::{ChainBreak, GENESIS_DIGEST, LogEntry, VerificationResult};

use crate::crypto::hash_bytes;
use crate::journal::Journal;

// ---------------------------------------------------------------------------
// Digests
// ---------------------------------------------------------------------------

fn update_field(hasher: &mut Sha256, field: &[u8]) {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field);
}

/// Digest of an entry's content fields.
pub fn compute_entry_digest(
    sequence: u64,
    timestamp: &str,
    actor: &str,
    action: &str,
    payload_digest: &str,
    previous_digest: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sequence.to_be_bytes());
    update_field(&mut hasher, timestamp.as_bytes());
    update_field(&mut hasher, actor.as_bytes());
    update_field(&mut hasher, action.as_bytes());
    update_field(&mut hasher, payload_digest.as_bytes());
    update_field(&mut hasher, previous_digest.as_bytes());
    hex::encode(hasher.finalize())
}

/// Recompute `entry`'s digest from its stored fields.
pub fn recompute_digest(entry: &LogEntry) -> String {
    compute_entry_digest(
        entry.sequence,
        &entry.timestamp,
        &entry.actor,
        &entry.action,
        &entry.payload_digest,
        &entry.previous_digest,
    )
}

/// Walk `entries` from genesis and report the first inconsistency.
pub fn verify_entries(entries: &[LogEntry]) -> VerificationResult {
    let count = entries.len() as u64;
    let mut expected_previous: &str = GENESIS_DIGEST;

    for (index, entry) in (0u64..).zip(entries) {
        if entry.sequence != index {
            return VerificationResult::broken(
                count,
                index,
                ChainBreak::SequenceMismatch {
                    expected: index,
                    found: entry.sequence,
                },
            );
        }
        if entry.previous_digest != expected_previous {
            return VerificationResult::broken(count, index, ChainBreak::LinkMismatch);
        }
        if recompute_digest(entry) != entry.digest {
            return VerificationResult::broken(count, index, ChainBreak::DigestMismatch);
        }
        expected_previous = entry.digest.as_str();
    }

    VerificationResult::intact(count)
}

// ---------------------------------------------------------------------------
// Pending entries
// ---------------------------------------------------------------------------

/// An entry whose digest is computed but which is not yet part of the chain.
struct PendingEntry(LogEntry);

impl PendingEntry {
    fn seal(
        sequence: u64,
        previous_digest: String,
        actor: &str,
        action: &str,
        payload: &[u8],
    ) -> Self {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let payload_digest = hash_bytes(payload);
        let digest = compute_entry_digest(
            sequence,
            &timestamp,
            actor,
            action,
            &payload_digest,
            &previous_digest,
        );

        Self(LogEntry {
            sequence,
            timestamp,
            actor: actor.to_owned(),
            action: action.to_owned(),
            payload_digest,
            previous_digest,
            digest,
        })
    }

    /// Publish to readers.  Infallible; anything that can fail happens first.
    fn commit(self, entries: &mut Vec<LogEntry>) -> LogEntry {
        entries.push(self.0.clone());
        self.0
    }
}

// ---------------------------------------------------------------------------
// ChainedLog
// ---------------------------------------------------------------------------

/// Append-only hash chain, optionally mirrored to a [`Journal`].
///
/// Reads take a shared lock; `append` takes the exclusive lock for its whole
/// read-tail / compute / journal / publish sequence.
pub struct ChainedLog {
    entries: RwLock<Vec<LogEntry>>,
    journal: Option<Arc<Mutex<Journal>>>,
}

impl Default for ChainedLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainedLog {
    /// An empty, memory-only log.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            journal: None,
        }
    }

    /// A log backed by `journal`, loaded verbatim from its `chain_log` table.
    ///
    /// Loading does not verify: a corrupted journal opens fine and reports
    /// the break from [`ChainedLog::verify_chain`].
    #[instrument(skip_all)]
    pub fn with_journal(journal: Arc<Mutex<Journal>>) -> Result<Self> {
        let entries = journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .load_entries()?;

        info!(entries = entries.len(), "audit chain loaded");
        Ok(Self {
            entries: RwLock::new(entries),
            journal: Some(journal),
        })
    }

    /// Append an entry for `action` by `actor`.
    ///
    /// `payload` is the action-specific data; only its SHA-256 is kept.
    #[instrument(skip(self, payload), fields(%actor, %action, payload_len = payload.len()))]
    pub fn append(&self, actor: &str, action: &str, payload: &[u8]) -> Result<LogEntry> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let sequence = entries.len() as u64;
        let previous = entries
            .last()
            .map(|e| e.digest.clone())
            .unwrap_or_else(|| GENESIS_DIGEST.to_owned());

        let pending = PendingEntry::seal(sequence, previous, actor, action, payload);

        if let Some(journal) = &self.journal {
            journal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .append_entry(&pending.0)?;
        }

        let entry = pending.commit(&mut entries);
        debug!(sequence, digest = %entry.digest, "audit entry committed");
        Ok(entry)
    }

    /// Re-derive every digest and link from genesis.
    pub fn verify_chain(&self) -> VerificationResult {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let result = verify_entries(&entries);

        if let (Some(index), Some(failure)) = (result.first_break_index, result.failure) {
            warn!(index, ?failure, "audit chain broken");
        } else {
            debug!(entries = result.entry_count, "audit chain intact");
        }
        result
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every entry, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn entry(&self, index: usize) -> Option<LogEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent_entries(&self, limit: usize) -> Vec<LogEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().rev().take(limit).cloned().collect()
    }

    /// UNSAFE DEMO OPERATION: edit a committed entry in place.
    ///
    /// Simulates corruption of stored history so detection can be exercised.
    /// This is the only way to mutate a committed entry and it is never
    /// reflected in the journal.
    pub fn tamper_with_entry(&self, index: usize, edit: impl FnOnce(&mut LogEntry)) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get_mut(index)
            .ok_or_else(|| TrustlabError::Validation(format!("no audit entry at index {index}")))?;

        edit(entry);
        warn!(index, "audit entry tampered with (simulation)");
        Ok(())
    }
}
