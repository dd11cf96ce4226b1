// Helper functions shared by the extractor and the engine

use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

/// Longest diagnostic string handed past a component boundary
pub const MAX_DIAGNOSTIC_LEN: usize = 160;

lazy_static::lazy_static! {
    static ref URL_RE: Regex = Regex::new(r"^https?://(?:[-\w.]|%[\da-fA-F]{2})+").unwrap();
    static ref PATH_RE: Regex = Regex::new(r#"(?:[A-Za-z]:\\|/)(?:[^\s/\\:'"]+[/\\])+[^\s'"]*"#).unwrap();
}

/// Whether `text` looks like an http(s) URL with a host
pub fn is_valid_url(text: &str) -> bool {
    URL_RE.is_match(text.trim())
}

/// Make raw error text safe to show: absolute paths are redacted, whitespace
/// collapsed and the result truncated.
pub fn safe_diagnostic(raw: &str) -> String {
    let redacted = PATH_RE.replace_all(raw, "<path>");
    let collapsed = redacted.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= MAX_DIAGNOSTIC_LEN {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(MAX_DIAGNOSTIC_LEN - 1).collect();
    cut.push('…');
    cut
}

/// Last line of tool output that mentions an error, or the last non-empty line
pub fn last_error_line(stderr: &str) -> &str {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR"))
        .or_else(|| stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("")
}

/// Run command with timeout (shared utility). The child is killed when the
/// bound is hit.
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    limit: Duration,
) -> Result<std::process::Output, String> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("Failed to start {}: {}", program, e))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| format!("Failed to capture stdout from {}", program))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| format!("Failed to capture stderr from {}", program))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stdout: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stderr: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });

    match timeout(limit, child.wait()).await {
        Ok(status_res) => {
            let status = status_res.map_err(|e| format!("Failed to wait for {}: {}", program, e))?;
            let stdout = stdout_task
                .await
                .map_err(|e| format!("stdout task failed: {}", e))??;
            let stderr = stderr_task
                .await
                .map_err(|e| format!("stderr task failed: {}", e))??;
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(format!("Timed out after {}s", limit.as_secs()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation() {
        assert!(is_valid_url("https://video.example/x"));
        assert!(is_valid_url("  http://youtu.be/abc "));
        assert!(!is_valid_url("ftp://video.example/x"));
        assert!(!is_valid_url("hello there"));
        assert!(!is_valid_url("https://"));
    }

    #[test]
    fn diagnostics_hide_paths() {
        let raw = "ERROR: unable to open /tmp/videodown-abc123/My Video.mp4.part: denied";
        let safe = safe_diagnostic(raw);
        assert!(!safe.contains("/tmp/"), "{}", safe);
        assert!(safe.contains("<path>"));
    }

    #[test]
    fn diagnostics_are_truncated() {
        let raw = "x".repeat(500);
        let safe = safe_diagnostic(&raw);
        assert_eq!(safe.chars().count(), MAX_DIAGNOSTIC_LEN);
        assert!(safe.ends_with('…'));
    }

    #[test]
    fn picks_error_line() {
        let stderr = "WARNING: something\nERROR: HTTP Error 429\n[info] done\n";
        assert_eq!(last_error_line(stderr), "ERROR: HTTP Error 429");
        assert_eq!(last_error_line("only line\n"), "only line");
        assert_eq!(last_error_line(""), "");
    }

    #[tokio::test]
    async fn missing_program_reports_start_failure() {
        let err = run_output_with_timeout(
            "videodown-definitely-missing-binary",
            Vec::new(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(err.starts_with("Failed to start"));
    }
}
