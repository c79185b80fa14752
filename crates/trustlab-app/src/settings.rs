// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator settings file (`config.json` in the data directory).

use std::path::Path;

use trustlab_core::LabConfig;
use trustlab_core::error::Result;

const CONFIG_FILE: &str = "config.json";

/// Read `config.json`, if there is one.
pub fn load(data_dir: &Path) -> Result<Option<LabConfig>> {
    let path = data_dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(&path)?;
    Ok(Some(serde_json::from_str(&data)?))
}

/// Write `config` as pretty JSON.
pub fn persist(data_dir: &Path, config: &LabConfig) -> Result<()> {
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustlab_core::TrustlabError;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn persisted_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = LabConfig {
            persistence: false,
            max_update_retries: 9,
            ..LabConfig::default()
        };
        persist(dir.path(), &config).unwrap();

        let loaded = load(dir.path()).unwrap().unwrap();
        assert!(!loaded.persistence);
        assert_eq!(loaded.max_update_retries, 9);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();
        assert!(matches!(load(dir.path()), Err(TrustlabError::Serialization(_))));
    }
}
