use super::ProbeError;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::trace;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const STDERR_EXCERPT: usize = 400;

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn wait_with_deadline(
    child: &mut Child,
    tool: &str,
    limit: Duration,
) -> Result<ExitStatus, ProbeError> {
    let started = Instant::now();
    loop {
        let polled = child.try_wait().map_err(|source| ProbeError::Spawn {
            tool: tool.to_string(),
            source,
        })?;
        if let Some(status) = polled {
            return Ok(status);
        }
        if started.elapsed() >= limit {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProbeError::Timeout {
                tool: tool.to_string(),
                secs: limit.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Runs a tool to completion and returns its stdout. With a deadline the
/// child is killed once it runs past it.
pub(crate) fn run_tool(
    mut command: Command,
    tool: &str,
    deadline: Option<Duration>,
) -> Result<Vec<u8>, ProbeError> {
    trace!("Running {:?}", command);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|source| ProbeError::Spawn {
        tool: tool.to_string(),
        source,
    })?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match deadline {
        Some(limit) => wait_with_deadline(&mut child, tool, limit)?,
        None => child.wait().map_err(|source| ProbeError::Spawn {
            tool: tool.to_string(),
            source,
        })?,
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    if !status.success() {
        let text = String::from_utf8_lossy(&stderr);
        let excerpt: String = text.trim().chars().take(STDERR_EXCERPT).collect();
        return Err(ProbeError::Failed {
            tool: tool.to_string(),
            status: status.to_string(),
            stderr: excerpt,
        });
    }
    Ok(stdout)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf hello"]);
        let out = run_tool(cmd, "sh", Some(Duration::from_secs(5))).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn non_zero_exit_reports_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo broken >&2; exit 3"]);
        match run_tool(cmd, "sh", None) {
            Err(ProbeError::Failed { stderr, .. }) => assert_eq!(stderr, "broken"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn deadline_kills_slow_child() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let started = Instant::now();
        let result = run_tool(cmd, "sh", Some(Duration::from_millis(100)));
        assert!(matches!(result, Err(ProbeError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_tool_is_spawn_error() {
        let cmd = Command::new("/nonexistent/tool-xyz");
        assert!(matches!(
            run_tool(cmd, "tool-xyz", None),
            Err(ProbeError::Spawn { .. })
        ));
    }
}
