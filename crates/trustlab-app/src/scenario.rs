// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Demo scenarios.
//
// `activity` drives the facade from several concurrent callers and then
// attests.  `tamper` runs the classroom walkthrough on a throwaway in-memory
// facade: events, a corrupted entry, an unsigned config change and a fake
// admin login, then attests again.

use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinSet;
use tracing::{error, info};
use trustlab_core::LabConfig;
use trustlab_core::error::Result;
use trustlab_core::types::AttestationResult;
use trustlab_security::SecurityFacade;

const USERS: [&str; 3] = ["alice", "bob", "carol"];
const SESSION_ACTIONS: [&str; 3] = ["login", "view_dashboard", "logout"];

/// Concurrent sessions plus one signed config change.
pub async fn activity(facade: Arc<SecurityFacade>) -> Result<AttestationResult> {
    let mut sessions = JoinSet::new();
    for user in USERS {
        let facade = Arc::clone(&facade);
        sessions.spawn_blocking(move || -> Result<usize> {
            for action in SESSION_ACTIONS {
                facade.record_event(user, action, json!({ "user": user }).to_string().as_bytes())?;
            }
            Ok(SESSION_ACTIONS.len())
        });
    }

    let mut recorded = 0;
    while let Some(joined) = sessions.join_next().await {
        match joined {
            Ok(result) => recorded += result?,
            Err(e) => error!(error = %e, "session task failed"),
        }
    }
    info!(recorded, "session events recorded");

    let verification = facade.verify_log();
    info!(ok = verification.ok, entries = verification.entry_count, "chain verified");

    let current = facade.update_and_verify("alice", &json!({ "session_timeout_secs": 900 }), true)?;
    info!(
        version = current.snapshot.version,
        authentic = current.authentic,
        "config updated"
    );

    Ok(facade.get_attestation())
}

/// Tamper walkthrough on a fresh in-memory facade.
pub fn tamper(settings: &LabConfig) -> Result<AttestationResult> {
    let facade = SecurityFacade::in_memory(settings)?;

    for action in ["login", "view_dashboard", "update_config"] {
        facade.record_event("alice", action, b"")?;
    }
    info!(trusted = facade.get_attestation().is_trusted(), "before tampering");

    let target = facade
        .log()
        .entries()
        .iter()
        .position(|e| e.action == "view_dashboard")
        .unwrap_or(0);
    facade
        .log()
        .tamper_with_entry(target, |e| e.action = "export_all_users".into())?;
    info!(
        first_break = ?facade.verify_log().first_break_index,
        "entry rewritten in place"
    );

    facade.set_config("alice", &json!({ "debug": true }), false)?;
    facade.simulate_auth_bypass("guest")?;

    Ok(facade.get_attestation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustlab_core::types::{AttestationStatus, TamperReason};

    #[tokio::test]
    async fn activity_ends_trusted() {
        let facade = Arc::new(SecurityFacade::in_memory(&LabConfig::default()).unwrap());
        let result = activity(Arc::clone(&facade)).await.unwrap();

        assert!(result.is_trusted());
        assert_eq!(facade.entry_count(), 1 + USERS.len() * SESSION_ACTIONS.len() + 1);
    }

    #[test]
    fn tamper_walkthrough_reports_chain_and_config() {
        let result = tamper(&LabConfig::default()).unwrap();
        assert_eq!(result.status, AttestationStatus::Tampered);
        assert!(result.reasons.contains(&TamperReason::ChainBroken { index: 2 }));
        assert!(result.reasons.contains(&TamperReason::ConfigUnsigned { version: 1 }));
    }
}
