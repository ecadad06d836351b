//! # Resource usage sampling.
//!
//! Reads `/proc/<pid>` at a fixed interval. Runtimes expose no richer telemetry, so
//! this is the only source; on hosts without procfs the sequence is simply empty.
//!
//! ## Rules
//! - the first sample is taken immediately
//! - the sequence ends when the process is gone, procfs is unavailable, or a token fires
//! - a dropped receiver stops the sampler

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One resource usage sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
    /// When the sample was taken.
    pub at: DateTime<Utc>,
    /// Resident set size in bytes.
    pub rss_bytes: u64,
    /// User CPU time in clock ticks.
    pub cpu_user_ticks: u64,
    /// System CPU time in clock ticks.
    pub cpu_system_ticks: u64,
}

/// Takes one sample of `pid`, or `None` when it cannot be read.
pub fn sample(pid: u32) -> Option<ResourceUsage> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    let (cpu_user_ticks, cpu_system_ticks) = parse_cpu_ticks(&stat)?;
    Some(ResourceUsage {
        at: Utc::now(),
        rss_bytes: parse_rss_bytes(&status).unwrap_or(0),
        cpu_user_ticks,
        cpu_system_ticks,
    })
}

/// Spawns a sampler for `pid` and returns its output.
pub(crate) fn spawn_sampler(
    pid: u32,
    interval: Duration,
    ctx: CancellationToken,
    shutdown: CancellationToken,
) -> mpsc::Receiver<ResourceUsage> {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        loop {
            let Some(usage) = sample(pid) else { break };

            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = shutdown.cancelled() => break,
                sent = tx.send(usage) => if sent.is_err() { break },
            }
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    });

    rx
}

// utime and stime are fields 14 and 15; the command name in field 2 may contain spaces.
fn parse_cpu_ticks(stat: &str) -> Option<(u64, u64)> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace().skip(11);
    let utime = fields.next()?.parse().ok()?;
    let stime = fields.next()?.parse().ok()?;
    Some((utime, stime))
}

fn parse_rss_bytes(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_ticks_with_spaces_in_name() {
        let stat = "42 (my task) S 1 42 42 0 -1 4194560 100 0 0 0 17 5 0 0 20 0 1 0 100 1000 50";
        assert_eq!(parse_cpu_ticks(stat), Some((17, 5)));
    }

    #[test]
    fn test_parse_rss() {
        let status = "Name:\tsh\nVmRSS:\t    1200 kB\nThreads:\t1\n";
        assert_eq!(parse_rss_bytes(status), Some(1200 * 1024));
    }

    #[tokio::test]
    async fn test_missing_process_ends_immediately() {
        let mut rx = spawn_sampler(
            u32::MAX - 1,
            Duration::from_millis(10),
            CancellationToken::new(),
            CancellationToken::new(),
        );
        assert!(rx.recv().await.is_none());
    }
}
