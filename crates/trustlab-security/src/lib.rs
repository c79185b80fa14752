// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! trustlab-security — tamper-evident state for the Trustlab teaching lab.
//!
//! A hash-chained activity log, a signed configuration store and a software
//! attestation simulator that reports whether either has been tampered with.
//! [`SecurityFacade`] ties the three together for callers.

pub mod attestation;
pub mod chain_log;
pub mod config_store;
pub mod crypto;
pub mod facade;
pub mod journal;
pub mod vault;

pub use attestation::AttestationSimulator;
pub use chain_log::ChainedLog;
pub use config_store::SignedConfigStore;
pub use crypto::{PublicKey, Signature, SigningKeyPair, generate_keypair, hash_bytes, sign, verify};
pub use facade::SecurityFacade;
pub use journal::Journal;
pub use vault::KeyVault;
