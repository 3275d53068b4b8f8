// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shell commands fed on stdin and bounded by a deadline.

use std::io::{Read, Write};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::errors::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs `command` under `sh -c`, writing `input` to its stdin.
///
/// A command still running after `timeout` is killed and reported as a
/// transient failure of `service`. The exit status is returned as-is.
pub(crate) fn run_with_timeout(
    service: &'static str,
    command: &str,
    input: Vec<u8>,
    timeout: Duration,
) -> Result<Output> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::transient(service, format!("failed to spawn '{}': {}", command, e)))?;

    // Pipes are serviced on their own threads; the wait loop never blocks on I/O.
    if let Some(mut stdin) = child.stdin.take() {
        thread::spawn(move || {
            if let Err(err) = stdin.write_all(&input) {
                debug!("Command closed stdin early: {}", err);
            }
        });
    }
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= timeout {
            if let Err(err) = child.kill() {
                debug!("Failed to kill '{}': {}", command, err);
            }
            child.wait()?;
            return Err(Error::transient(
                service,
                format!("'{}' timed out after {:.1}s", command, timeout.as_secs_f64()),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(err) = pipe.read_to_end(&mut buf) {
            debug!("Failed to read command output: {}", err);
        }
        buf
    })
}

fn collect(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
