// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::effects::FakeExec;
use crate::registry::LocalCtx;

const DF_OUTPUT: &str = "\
Filesystem     1024-blocks      Used Available Capacity Mounted on
/dev/sda1         41152812  31792432   7247360      82% /
tmpfs              8156712         0   8156712       0% /dev/shm
";

const FREE_OUTPUT: &str = "\
               total        used        free      shared  buff/cache   available
Mem:     16384000000  8192000000  2048000000   512000000  6144000000  7168000000
Swap:     2147483648   104857600  2042626048
";

#[test]
fn parses_df_rows() {
    let v = parse_df(DF_OUTPUT);
    let rows = v["filesystems"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["filesystem"], "/dev/sda1");
    assert_eq!(rows[0]["usePercent"], 82);
    assert_eq!(rows[0]["mountedOn"], "/");
    assert_eq!(rows[1]["usedKb"], 0);
}

#[test]
fn parses_free_output() {
    let v = parse_free(FREE_OUTPUT);
    assert_eq!(v["memory"]["totalBytes"], 16_384_000_000u64);
    assert_eq!(v["memory"]["availableBytes"], 7_168_000_000u64);
    assert_eq!(v["swap"]["usedBytes"], 104_857_600u64);
}

#[test]
fn parses_loadavg() {
    let v = parse_loadavg("0.52 0.58 0.59 1/457 12345\n");
    assert_eq!(v["load1"], 0.52);
    assert_eq!(v["load15"], 0.59);
}

#[test]
fn malformed_lines_are_skipped() {
    let v = parse_df("Filesystem Used\ngarbage\n");
    assert!(v["filesystems"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn disk_usage_handler_runs_df_portably() {
    let pack = system_pack();
    let exec = std::sync::Arc::new(FakeExec::new());
    exec.push_stdout(DF_OUTPUT);

    let handler = match &pack.kind {
        PackKind::Local(handlers) => handlers["disk.usage"].clone(),
        _ => unreachable!("system is a local pack"),
    };
    let result = handler(LocalCtx {
        params: serde_json::json!({"path": "/var"}),
        exec: exec.clone(),
        timeout_ms: 10_000,
    })
    .await
    .unwrap();

    assert_eq!(result["filesystems"][0]["usePercent"], 82);
    let calls = exec.calls();
    assert_eq!(calls[0].0, "df");
    assert_eq!(calls[0].1, vec!["-P", "-k", "/var"]);
}

#[tokio::test]
async fn uptime_handler_reads_proc() {
    let pack = system_pack();
    let exec = std::sync::Arc::new(FakeExec::new());
    exec.push_stdout("12345.67 98765.43\n");

    let handler = match &pack.kind {
        PackKind::Local(handlers) => handlers["uptime"].clone(),
        _ => unreachable!("system is a local pack"),
    };
    let result =
        handler(LocalCtx { params: serde_json::json!({}), exec, timeout_ms: 5_000 })
            .await
            .unwrap();
    assert_eq!(result["uptimeSeconds"], 12345.67);
}
