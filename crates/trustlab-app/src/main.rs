// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Trustlab — tamper-evident audit chain, signed configuration and simulated
// attestation.
//
// Entry point.  Initialises logging, opens the security facade and runs a
// demo scenario, printing the resulting attestation as JSON.
//
//   trustlab            concurrent session activity against the data directory
//   trustlab tamper     tamper walkthrough on an in-memory instance

mod data_dir;
mod scenario;
mod settings;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use trustlab_core::LabConfig;
use trustlab_core::error::Result;
use trustlab_core::types::AttestationResult;
use trustlab_security::SecurityFacade;

const PASSPHRASE_ENV: &str = "TRUSTLAB_PASSPHRASE";

#[tokio::main]
async fn main() -> ExitCode {
    let dir = data_dir::data_dir();
    let loaded = settings::load(&dir);

    let filter = match &loaded {
        Ok(Some(config)) => config.log_filter.clone(),
        _ => LabConfig::default().log_filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    info!(path = %dir.display(), "Trustlab starting");

    let config = match loaded {
        Ok(Some(config)) => config,
        Ok(None) => {
            let config = LabConfig::default();
            if let Err(e) = settings::persist(&dir, &config) {
                warn!(error = %e, "could not write default config.json");
            }
            config
        }
        Err(e) => {
            warn!(error = %e, "config.json unreadable, using defaults");
            LabConfig::default()
        }
    };

    let mode = std::env::args().nth(1).unwrap_or_default();
    let outcome = match mode.as_str() {
        "tamper" => scenario::tamper(&config),
        "" | "activity" => run_activity(&dir, &config).await,
        other => {
            error!(mode = other, "unknown mode (expected `activity` or `tamper`)");
            return ExitCode::from(2);
        }
    };

    match outcome.and_then(|result| print_attestation(&result)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, transient = e.is_transient(), "trustlab failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_activity(dir: &Path, config: &LabConfig) -> Result<AttestationResult> {
    let facade = Arc::new(open_facade(dir, config)?);
    scenario::activity(facade).await
}

/// Persistent facade when configured and a passphrase is available,
/// otherwise an in-memory one.
fn open_facade(dir: &Path, config: &LabConfig) -> Result<SecurityFacade> {
    open_facade_with(dir, config, std::env::var(PASSPHRASE_ENV).ok())
}

/// A persistent store that fails to open is an error, never a reason to
/// start over with fresh state.
fn open_facade_with(
    dir: &Path,
    config: &LabConfig,
    passphrase: Option<String>,
) -> Result<SecurityFacade> {
    if !config.persistence {
        return SecurityFacade::in_memory(config);
    }
    match passphrase {
        Some(passphrase) => SecurityFacade::open(dir, config, &passphrase),
        None => {
            warn!("{PASSPHRASE_ENV} unset, state will not be persisted");
            SecurityFacade::in_memory(config)
        }
    }
}

/// Print the verdict; returns whether it was trusted.
fn print_attestation(result: &AttestationResult) -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(result.is_trusted())
}
