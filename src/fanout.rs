// ABOUTME: Connection request list and fan-out: --connect argv parsing plus one sub-task per peer
// ABOUTME: Each sub-task is an independent tokio task; a shutdown flag lets the parent cancel the rest

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::MAX_FRAME;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Upper bound on a single `--connect` parameter string, mirroring the
/// reference's `BUFSIZ`-sized argument buffer.
const PARAM_BUF_MAX: usize = MAX_FRAME;

/// One `--connect host [params...]` entry from the command line.
///
/// `host` and `port` are parsed lazily from `host_string`; `param` is kept
/// as the unparsed, space-joined argument text for the downstream record
/// command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReq {
    pub host_string: String,
    pub param: String,
}

impl RecordReq {
    pub fn host(&self) -> &str {
        self.host_string
            .split_once(':')
            .map(|(h, _)| h)
            .unwrap_or(&self.host_string)
    }

    pub fn port(&self) -> Option<u16> {
        self.host_string
            .split_once(':')
            .and_then(|(_, p)| p.parse().ok())
    }
}

/// Parse a `--connect host [params...] [--connect host [params...] ...]`
/// argv into an ordered list of [`RecordReq`]s.
///
/// Each `--connect` consumes the following token as `host`, then consumes
/// tokens up to the next `--connect` (or argv end) into a single
/// space-joined parameter string. A parameter string longer than
/// [`PARAM_BUF_MAX`] is a fatal overflow, not a silent truncation.
pub fn parse_connect_args(args: &[String]) -> ProtocolResult<Vec<RecordReq>> {
    let mut reqs = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] != "--connect" {
            return Err(ProtocolError::ParseError(format!(
                "expected --connect, found {:?}",
                args[i]
            )));
        }
        i += 1;
        let host_string = args
            .get(i)
            .ok_or_else(|| ProtocolError::ParseError("--connect missing host argument".into()))?
            .clone();
        i += 1;

        let mut params = Vec::new();
        while i < args.len() && args[i] != "--connect" {
            params.push(args[i].as_str());
            i += 1;
        }
        let param = params.join(" ");
        if param.len() > PARAM_BUF_MAX {
            return Err(ProtocolError::ResourceExhaustion(format!(
                "--connect parameter string of {} bytes exceeds buffer of {PARAM_BUF_MAX}",
                param.len()
            )));
        }

        reqs.push(RecordReq { host_string, param });
    }
    Ok(reqs)
}

/// Coarse-grained fan-out over an ordered [`RecordReq`] list: one
/// independent tokio task per entry, a signal-safe shutdown flag the
/// parent can raise to cancel the rest.
///
/// This is the task-based stand-in for the reference's fork-per-connection
/// model; each task owns its connection and shares no mutable state with
/// its siblings once spawned.
pub struct FanOut {
    shutdown: Arc<AtomicBool>,
}

impl FanOut {
    pub fn new() -> Self {
        FanOut {
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A clone of the shutdown flag, suitable for wiring into a signal
    /// handler (e.g. `tokio::signal::ctrl_c`).
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Spawn one task per request, each running `handler(req)` to
    /// completion independently. Returns the task handles in request
    /// order; the parent retains these identifiers, per §4.6.
    pub fn spawn_all<F, Fut>(&self, reqs: Vec<RecordReq>, handler: F) -> Vec<JoinHandle<()>>
    where
        F: Fn(RecordReq) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        reqs.into_iter()
            .map(|req| {
                let handler = handler.clone();
                tokio::spawn(async move { handler(req).await })
            })
            .collect()
    }

    /// Poll until every task exits or the shutdown flag is raised; on
    /// shutdown, abort whatever remains instead of waiting on it.
    pub async fn wait_all(&self, tasks: Vec<JoinHandle<()>>) {
        for task in tasks {
            if self.is_shutdown() {
                task.abort();
                continue;
            }
            let _ = task.await;
        }
    }
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_single_connect_with_params() {
        let reqs = parse_connect_args(&args(&[
            "--connect",
            "host1",
            "-e",
            "sched_switch",
        ]))
        .unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].host_string, "host1");
        assert_eq!(reqs[0].param, "-e sched_switch");
    }

    #[test]
    fn parses_multiple_connect_repetitions_in_order() {
        let reqs = parse_connect_args(&args(&[
            "--connect",
            "host1:1234",
            "-e",
            "sched_switch",
            "--connect",
            "host2",
            "-e",
            "irq_handler_entry",
        ]))
        .unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].host(), "host1");
        assert_eq!(reqs[0].port(), Some(1234));
        assert_eq!(reqs[1].host(), "host2");
        assert_eq!(reqs[1].port(), None);
    }

    #[test]
    fn connect_with_no_params_has_empty_param_string() {
        let reqs = parse_connect_args(&args(&["--connect", "host1"])).unwrap();
        assert_eq!(reqs[0].param, "");
    }

    #[test]
    fn rejects_argv_not_starting_with_connect() {
        assert!(parse_connect_args(&args(&["host1"])).is_err());
    }

    #[test]
    fn rejects_connect_missing_host() {
        assert!(parse_connect_args(&args(&["--connect"])).is_err());
    }

    #[test]
    fn rejects_param_overflow() {
        let long_param = "x".repeat(PARAM_BUF_MAX + 1);
        let err = parse_connect_args(&args(&["--connect", "host1", &long_param])).unwrap_err();
        assert!(matches!(err, ProtocolError::ResourceExhaustion(_)));
    }

    #[tokio::test]
    async fn fan_out_runs_independent_tasks_to_completion() {
        let fanout = FanOut::new();
        let reqs = parse_connect_args(&args(&[
            "--connect", "host1", "--connect", "host2", "--connect", "host3",
        ]))
        .unwrap();

        let completed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let completed_for_handler = completed.clone();
        let tasks = fanout.spawn_all(reqs, move |req| {
            let completed = completed_for_handler.clone();
            async move {
                completed.lock().unwrap().push(req.host_string);
            }
        });
        fanout.wait_all(tasks).await;

        let mut done = completed.lock().unwrap().clone();
        done.sort();
        assert_eq!(done, vec!["host1", "host2", "host3"]);
    }

    #[tokio::test]
    async fn shutdown_flag_aborts_remaining_tasks() {
        let fanout = FanOut::new();
        fanout.request_shutdown();
        let reqs = parse_connect_args(&args(&["--connect", "host1"])).unwrap();
        let tasks = fanout.spawn_all(reqs, |_req| async move {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        // Should return promptly rather than waiting out the sleep.
        tokio::time::timeout(std::time::Duration::from_millis(200), fanout.wait_all(tasks))
            .await
            .expect("wait_all should abort promptly under shutdown");
    }
}
