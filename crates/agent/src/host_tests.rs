// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn file_exists_checks_the_filesystem() {
    let host = RealHost;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("present");
    std::fs::write(&file, "x").unwrap();
    assert!(host.file_exists(file.to_str().unwrap()));
    assert!(!host.file_exists("/definitely/not/here"));
}

#[test]
fn command_on_path_finds_common_binaries() {
    let host = RealHost;
    // `ls` exists on any test host; an invented name does not.
    assert!(host.command_on_path("ls"));
    assert!(!host.command_on_path("sonde-no-such-binary"));
}
