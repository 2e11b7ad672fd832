// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pack requirement checks against the local host.

use serde::Serialize;

use crate::manifest::Requires;

/// Host introspection seam so requirement checks are testable.
pub trait Host {
    fn in_group(&self, group: &str) -> bool;
    fn file_exists(&self, path: &str) -> bool;
    fn command_on_path(&self, command: &str) -> bool;
}

/// Structured detail for a permission-denied pack install.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct MissingRequirements {
    pub groups: Vec<String>,
    pub files: Vec<String>,
    pub commands: Vec<String>,
}

impl MissingRequirements {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.files.is_empty() && self.commands.is_empty()
    }
}

/// Check a pack's prerequisites, listing everything missing.
pub fn missing_requirements(requires: &Requires, host: &dyn Host) -> MissingRequirements {
    MissingRequirements {
        groups: requires.groups.iter().filter(|g| !host.in_group(g)).cloned().collect(),
        files: requires.files.iter().filter(|f| !host.file_exists(f)).cloned().collect(),
        commands: requires
            .commands
            .iter()
            .filter(|c| !host.command_on_path(c))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
#[path = "requirements_tests.rs"]
mod tests;
