// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local command execution for probe handlers.
//!
//! Runs a named binary with an argv list — never a shell — under the
//! probe's deadline and a 1 MiB stdout cap.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use sonde_packs::{ExecError, ExecFn, ExecOutput, MAX_EXEC_OUTPUT_BYTES};

/// Production exec seam backed by `tokio::process`.
pub struct TokioExec;

async fn read_capped<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
    cap: usize,
) -> std::io::Result<String> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let take = n.min(cap - buf.len());
        buf.extend_from_slice(&chunk[..take]);
        if buf.len() >= cap {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[async_trait]
impl ExecFn for TokioExec {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout_ms: u64,
    ) -> Result<ExecOutput, ExecError> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExecError::NotFound(program.to_string())
                } else {
                    ExecError::Io(e.to_string())
                }
            })?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let work = async {
            let (out, err) = tokio::join!(
                async {
                    match stdout.as_mut() {
                        Some(r) => read_capped(r, MAX_EXEC_OUTPUT_BYTES).await,
                        None => Ok(String::new()),
                    }
                },
                async {
                    match stderr.as_mut() {
                        Some(r) => read_capped(r, MAX_EXEC_OUTPUT_BYTES).await,
                        None => Ok(String::new()),
                    }
                },
            );
            // Close the pipes before waiting so a capped writer gets EPIPE
            // instead of blocking forever on a full pipe.
            drop(stdout.take());
            drop(stderr.take());
            let status = child.wait().await?;
            Ok::<_, std::io::Error>(ExecOutput {
                stdout: out?,
                stderr: err?,
                exit_code: status.code().unwrap_or(-1),
            })
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), work).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ExecError::Io(e.to_string())),
            // kill_on_drop reaps the straggler.
            Err(_) => Err(ExecError::Timeout(timeout_ms)),
        }
    }
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
