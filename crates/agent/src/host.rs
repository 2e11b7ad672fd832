// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host introspection for pack requirement checks.

use std::path::Path;

use sonde_packs::Host;

/// The real host: groups via `id -nG`, commands via PATH scan.
pub struct RealHost;

impl Host for RealHost {
    fn in_group(&self, group: &str) -> bool {
        let Ok(output) = std::process::Command::new("id").arg("-nG").output() else {
            return false;
        };
        String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .any(|g| g == group)
    }

    fn file_exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn command_on_path(&self, command: &str) -> bool {
        let Ok(path) = std::env::var("PATH") else { return false };
        path.split(':').any(|dir| {
            let candidate = Path::new(dir).join(command);
            candidate.is_file()
        })
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
