// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types: audit chain entries, signed configuration snapshots and
// attestation verdicts.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TrustlabError};

/// `previous_digest` of the first entry in every chain: SHA-256("GENESIS").
pub const GENESIS_DIGEST: &str =
    "901131d838b17aac0f7885b81e03cbdc9f5157a00343d30ab22083685ed1416a";

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Signature scheme used for configuration snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningAlgorithm {
    /// Ed25519 (RFC 8032).  Deterministic.
    Ed25519,
    /// ECDSA over P-256 with SHA-256, ASN.1 DER signatures.
    EcdsaP256Sha256,
}

impl SigningAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::EcdsaP256Sha256 => "ecdsa_p256_sha256",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Audit chain
// ---------------------------------------------------------------------------

/// A committed entry in the audit chain.
///
/// `digest` is SHA-256 over every other field (length-prefixed, in
/// declaration order), so flipping any bit of a stored entry is detectable.
/// All digests are lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the chain, starting at 0.
    pub sequence: u64,
    /// RFC 3339 commit time.
    pub timestamp: String,
    /// Who performed the action.
    pub actor: String,
    /// Short verb describing the action, e.g. `"login"`, `"config_update"`.
    pub action: String,
    /// SHA-256 of the action-specific payload bytes.
    pub payload_digest: String,
    /// `digest` of the preceding entry, or [`GENESIS_DIGEST`].
    pub previous_digest: String,
    /// Digest of this entry.
    pub digest: String,
}

/// Which check failed first while walking the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainBreak {
    /// The stored sequence number does not match the entry's position.
    SequenceMismatch { expected: u64, found: u64 },
    /// The stored digest does not match the recomputed one.
    DigestMismatch,
    /// `previous_digest` does not point at the preceding entry.
    LinkMismatch,
}

/// Outcome of walking the audit chain from genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub ok: bool,
    /// Index of the first inconsistent entry, if any.
    pub first_break_index: Option<u64>,
    /// What was wrong with that entry.
    pub failure: Option<ChainBreak>,
    /// Number of entries in the chain that was walked.
    pub entry_count: u64,
}

impl VerificationResult {
    pub fn intact(entry_count: u64) -> Self {
        Self {
            ok: true,
            first_break_index: None,
            failure: None,
            entry_count,
        }
    }

    pub fn broken(entry_count: u64, index: u64, failure: ChainBreak) -> Self {
        Self {
            ok: false,
            first_break_index: Some(index),
            failure: Some(failure),
            entry_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration schema
// ---------------------------------------------------------------------------

/// Recognised configuration settings.
///
/// The external payload is loosely typed JSON; everything past the
/// [`parse_settings`] boundary uses this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Setting {
    Debug,
    MaintenanceMode,
    AllowRegistration,
    /// Idle session lifetime for the front end.
    SessionTimeoutSecs,
}

/// Value type a [`Setting`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Boolean,
    Integer,
}

impl SettingKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
        }
    }
}

impl Setting {
    pub const ALL: [Setting; 4] = [
        Setting::Debug,
        Setting::MaintenanceMode,
        Setting::AllowRegistration,
        Setting::SessionTimeoutSecs,
    ];

    /// Wire name, as used in JSON payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::MaintenanceMode => "maintenance_mode",
            Self::AllowRegistration => "allow_registration",
            Self::SessionTimeoutSecs => "session_timeout_secs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn kind(&self) -> SettingKind {
        match self {
            Self::SessionTimeoutSecs => SettingKind::Integer,
            _ => SettingKind::Boolean,
        }
    }

    /// Value in the baseline snapshot created at first start.
    pub fn default_value(&self) -> SettingValue {
        match self {
            Self::Debug => SettingValue::Bool(false),
            Self::MaintenanceMode => SettingValue::Bool(false),
            Self::AllowRegistration => SettingValue::Bool(true),
            Self::SessionTimeoutSecs => SettingValue::Int(1800),
        }
    }

    /// Convert a loosely typed JSON value into this setting's typed value.
    pub fn parse_value(&self, raw: &Value) -> Result<SettingValue> {
        let parsed = match self.kind() {
            SettingKind::Boolean => raw.as_bool().map(SettingValue::Bool),
            SettingKind::Integer => raw.as_i64().filter(|n| *n >= 0).map(SettingValue::Int),
        };
        parsed.ok_or_else(|| TrustlabError::InvalidSettingValue {
            setting: self.name().to_owned(),
            expected: self.kind().label(),
        })
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed setting value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
}

/// Complete or partial set of settings, ordered by name for canonical output.
pub type Settings = BTreeMap<Setting, SettingValue>;

/// Every setting at its default value.
pub fn baseline_settings() -> Settings {
    Setting::ALL
        .into_iter()
        .map(|s| (s, s.default_value()))
        .collect()
}

/// Validate a request payload such as `{"debug": true}`.
///
/// Rejects non-objects, empty objects, unknown setting names and values of
/// the wrong type.  Nothing is applied unless every entry is valid.
pub fn parse_settings(payload: &Value) -> Result<Settings> {
    let object = payload
        .as_object()
        .ok_or_else(|| TrustlabError::Validation("config payload must be a JSON object".into()))?;

    if object.is_empty() {
        return Err(TrustlabError::Validation("config payload is empty".into()));
    }

    let mut changes = Settings::new();
    for (name, raw) in object {
        let setting =
            Setting::from_name(name).ok_or_else(|| TrustlabError::UnknownSetting(name.clone()))?;
        changes.insert(setting, setting.parse_value(raw)?);
    }
    Ok(changes)
}

// ---------------------------------------------------------------------------
// Signed configuration snapshots
// ---------------------------------------------------------------------------

/// Signature carried by a snapshot.
///
/// `Unsigned` is written only by the unsafe update path and is part of the
/// stored object, so it survives persistence unchanged.  `Unreadable` is
/// never written: it marks a stored row that could not be decoded on load,
/// and never verifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotSignature {
    Signed {
        algorithm: SigningAlgorithm,
        /// Hex-encoded signature over [`ConfigSnapshot::canonical_bytes`].
        value: String,
    },
    Unsigned,
    Unreadable {
        detail: String,
    },
}

/// A versioned, optionally signed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub settings: Settings,
    pub signature: SnapshotSignature,
}

/// The exact fields covered by a snapshot signature.
#[derive(Serialize)]
struct CanonicalContent<'a> {
    settings: &'a Settings,
    version: u64,
}

impl ConfigSnapshot {
    /// Deterministic encoding of `(settings, version)`: JSON with keys in
    /// schema order.  This is the signing input.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Self::canonical_bytes_for(&self.settings, self.version)
    }

    pub fn canonical_bytes_for(settings: &Settings, version: u64) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&CanonicalContent { settings, version })?)
    }

    /// Encoding committed to the audit chain when this snapshot is stored.
    /// Covers the signature too, so an unsigned snapshot and a signed one
    /// with the same settings produce different audit payloads.
    pub fn audit_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn is_signed(&self) -> bool {
        matches!(self.signature, SnapshotSignature::Signed { .. })
    }

    /// Explicitly stored without a signature by the unsafe update path.
    pub fn is_unsigned(&self) -> bool {
        self.signature == SnapshotSignature::Unsigned
    }

    pub fn get(&self, setting: Setting) -> Option<&SettingValue> {
        self.settings.get(&setting)
    }
}

/// The current snapshot together with its read-time authenticity verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentConfig {
    pub snapshot: ConfigSnapshot,
    /// `true` only when the snapshot is signed and the signature verifies
    /// against the trusted public key right now.
    pub authentic: bool,
}

// ---------------------------------------------------------------------------
// Attestation
// ---------------------------------------------------------------------------

/// Overall attestation verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttestationStatus {
    Trusted,
    Tampered,
    /// The monitored stores are not initialised yet.
    Unknown,
}

/// Why an attestation was not `Trusted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TamperReason {
    ChainBroken { index: u64 },
    ConfigUnsigned { version: u64 },
    ConfigSignatureInvalid { version: u64 },
    /// The latest config snapshot has no matching entry in the audit chain.
    ConfigNotAudited { version: u64 },
    ConfigUninitialized,
}

impl fmt::Display for TamperReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChainBroken { index } => write!(f, "chain broken at entry {index}"),
            Self::ConfigUnsigned { version } => write!(f, "config unsigned (version {version})"),
            Self::ConfigSignatureInvalid { version } => {
                write!(f, "config signature invalid (version {version})")
            }
            Self::ConfigNotAudited { version } => {
                write!(f, "config version {version} not recorded in audit chain")
            }
            Self::ConfigUninitialized => f.write_str("config store uninitialised"),
        }
    }
}

/// A derived trust verdict.  Recomputed on every query and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationResult {
    pub status: AttestationStatus,
    /// RFC 3339 time the checks ran.
    pub checked_at: String,
    pub reasons: Vec<TamperReason>,
    /// Measurement register name -> hex value.
    pub measurements: BTreeMap<String, String>,
}

impl AttestationResult {
    pub fn is_trusted(&self) -> bool {
        self.status == AttestationStatus::Trusted
    }

    /// Equal in everything except `checked_at`.
    pub fn same_verdict(&self, other: &Self) -> bool {
        self.status == other.status
            && self.reasons == other.reasons
            && self.measurements == other.measurements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn baseline_covers_every_setting() {
        let baseline = baseline_settings();
        assert_eq!(baseline.len(), Setting::ALL.len());
        assert_eq!(baseline[&Setting::Debug], SettingValue::Bool(false));
        assert_eq!(baseline[&Setting::AllowRegistration], SettingValue::Bool(true));
    }

    #[test]
    fn parse_accepts_known_settings() {
        let changes = parse_settings(&json!({ "debug": true, "session_timeout_secs": 60 })).unwrap();
        assert_eq!(changes[&Setting::Debug], SettingValue::Bool(true));
        assert_eq!(changes[&Setting::SessionTimeoutSecs], SettingValue::Int(60));
    }

    #[test]
    fn parse_rejects_unknown_setting() {
        let err = parse_settings(&json!({ "debug": true, "root_shell": true })).unwrap_err();
        assert!(matches!(err, TrustlabError::UnknownSetting(name) if name == "root_shell"));
    }

    #[test]
    fn parse_rejects_wrong_type() {
        let err = parse_settings(&json!({ "maintenance_mode": "yes" })).unwrap_err();
        assert!(matches!(
            err,
            TrustlabError::InvalidSettingValue { expected: "boolean", .. }
        ));

        let err = parse_settings(&json!({ "session_timeout_secs": -5 })).unwrap_err();
        assert!(matches!(
            err,
            TrustlabError::InvalidSettingValue { expected: "integer", .. }
        ));
    }

    #[test]
    fn parse_rejects_non_object_and_empty() {
        assert!(matches!(
            parse_settings(&json!([1, 2])),
            Err(TrustlabError::Validation(_))
        ));
        assert!(matches!(
            parse_settings(&json!({})),
            Err(TrustlabError::Validation(_))
        ));
    }

    #[test]
    fn canonical_bytes_are_ordered_and_exclude_signature() {
        let snapshot = ConfigSnapshot {
            version: 2,
            settings: baseline_settings(),
            signature: SnapshotSignature::Unsigned,
        };
        let text = String::from_utf8(snapshot.canonical_bytes().unwrap()).unwrap();
        assert_eq!(
            text,
            r#"{"settings":{"debug":false,"maintenance_mode":false,"allow_registration":true,"session_timeout_secs":1800},"version":2}"#
        );

        let mut signed = snapshot.clone();
        signed.signature = SnapshotSignature::Signed {
            algorithm: SigningAlgorithm::Ed25519,
            value: "00".into(),
        };
        assert_eq!(
            signed.canonical_bytes().unwrap(),
            snapshot.canonical_bytes().unwrap()
        );
        assert_ne!(signed.audit_bytes().unwrap(), snapshot.audit_bytes().unwrap());
    }

    #[test]
    fn unreadable_signature_is_neither_signed_nor_unsigned() {
        let snapshot = ConfigSnapshot {
            version: 1,
            settings: baseline_settings(),
            signature: SnapshotSignature::Unreadable {
                detail: "signature column: not json".into(),
            },
        };
        assert!(!snapshot.is_signed());
        assert!(!snapshot.is_unsigned());
    }

    #[test]
    fn reasons_read_naturally() {
        assert_eq!(
            TamperReason::ChainBroken { index: 1 }.to_string(),
            "chain broken at entry 1"
        );
        assert_eq!(
            TamperReason::ConfigUnsigned { version: 3 }.to_string(),
            "config unsigned (version 3)"
        );
    }

    #[test]
    fn status_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&AttestationStatus::Tampered).unwrap(),
            "\"TAMPERED\""
        );
    }
}
