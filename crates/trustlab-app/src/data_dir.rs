// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::path::PathBuf;

const APP_DIR: &str = "trustlab";

/// Return the application data directory, creating it if needed.
///
/// `TRUSTLAB_DATA_DIR` wins when set; otherwise the XDG data home is used.
pub fn data_dir() -> PathBuf {
    let dir = resolve(
        std::env::var("TRUSTLAB_DATA_DIR").ok(),
        std::env::var("XDG_DATA_HOME").ok(),
        std::env::var("HOME").ok(),
    );
    std::fs::create_dir_all(&dir).ok();
    dir
}

fn resolve(explicit: Option<String>, xdg: Option<String>, home: Option<String>) -> PathBuf {
    if let Some(dir) = explicit.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = xdg.filter(|d| !d.is_empty()) {
        return PathBuf::from(xdg).join(APP_DIR);
    }
    if let Some(home) = home {
        return PathBuf::from(home).join(".local").join("share").join(APP_DIR);
    }
    // Last resort
    PathBuf::from("/tmp").join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_is_used_verbatim() {
        let dir = resolve(Some("/srv/lab".into()), Some("/xdg".into()), Some("/home/a".into()));
        assert_eq!(dir, PathBuf::from("/srv/lab"));
    }

    #[test]
    fn falls_back_through_xdg_home_and_tmp() {
        assert_eq!(
            resolve(None, Some("/xdg".into()), Some("/home/a".into())),
            PathBuf::from("/xdg/trustlab")
        );
        assert_eq!(
            resolve(Some(String::new()), None, Some("/home/a".into())),
            PathBuf::from("/home/a/.local/share/trustlab")
        );
        assert_eq!(resolve(None, None, None), PathBuf::from("/tmp/trustlab"));
    }
}
