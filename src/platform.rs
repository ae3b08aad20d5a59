//! # Platform utilities for external tools
//!
//! Questo modulo centralizza tutta la logica per l'esecuzione dei programmi
//! esterni (ffmpeg, collectiongain, simple-mtpfs, fusermount, rsync, notify-send).
//!
//! ## Responsabilità:
//! - Risoluzione dei tool nel `PATH` di sistema (o path esplicito da config)
//! - Verifica delle dipendenze prima di ogni fase, con istruzioni d'installazione
//! - Esecuzione con `tokio::process`, output catturato, `kill_on_drop`
//! - Exit code non zero → `SyncError::Tool` con stderr e stdout catturati
//!
//! Nessun timeout: un processo bloccato blocca la fase corrispondente.

use crate::error::SyncError;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// How a tool's stdout is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Capture stdout and return it
    Capture,
    /// Stream stdout to the terminal (progress of long-running tools)
    Inherit,
}

/// Find a tool in the system PATH; names containing a separator are checked as-is
pub fn find_in_path(tool_name: &str) -> Option<PathBuf> {
    let candidate = Path::new(tool_name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    env::split_paths(&env::var_os("PATH")?)
        .map(|dir| dir.join(tool_name))
        .find(|path| path.is_file())
}

/// Installation hint for the tools this crate drives
pub fn install_instructions(tool_name: &str) -> String {
    let base = Path::new(tool_name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| tool_name.to_string());
    match base.as_str() {
        "ffmpeg" => "sudo apt-get install ffmpeg".to_string(),
        "collectiongain" => "pip install rgain3  # provides collectiongain".to_string(),
        "simple-mtpfs" => "sudo apt-get install simple-mtpfs".to_string(),
        "fusermount" => "sudo apt-get install fuse".to_string(),
        "rsync" => "sudo apt-get install rsync".to_string(),
        "notify-send" => "sudo apt-get install libnotify-bin".to_string(),
        other => format!("sudo apt-get install {}", other),
    }
}

/// Fail on the first tool that cannot be found
pub fn check_dependencies(tools: &[&str]) -> Result<(), SyncError> {
    for tool in tools {
        match find_in_path(tool) {
            Some(path) => debug!("Using {} -> {}", tool, path.display()),
            None => {
                return Err(SyncError::MissingDependency(format!(
                    "'{}' not found in PATH. To install on Linux, run:\n  {}",
                    tool,
                    install_instructions(tool)
                )))
            }
        }
    }
    Ok(())
}

/// Run an external program to completion.
/// Returns stdout (empty in `Inherit` mode) on success.
pub async fn run_tool<I, S>(program: &str, args: I, mode: OutputMode) -> Result<String, SyncError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    debug!("Running {} {:?}", program, args);

    let stdout = match mode {
        OutputMode::Capture => Stdio::piped(),
        OutputMode::Inherit => Stdio::inherit(),
    };

    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            SyncError::MissingDependency(format!("failed to execute {}: {}", program, e))
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(SyncError::Tool {
        tool: program.to_string(),
        status: output.status.to_string(),
        output: format!("{}\n{}", stderr.trim_end(), stdout.trim_end())
            .trim()
            .to_string(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_find_in_path() {
        assert!(find_in_path("sh").is_some());
        assert!(find_in_path("definitely-not-a-real-tool-4242").is_none());
        assert_eq!(find_in_path("/bin/sh"), Some(PathBuf::from("/bin/sh")));
        assert!(find_in_path("/nope/ffmpeg").is_none());
    }

    #[test]
    fn test_check_dependencies() {
        assert_ok!(check_dependencies(&["sh"]));
        let err = check_dependencies(&["sh", "definitely-not-a-real-tool-4242"]).unwrap_err();
        assert!(matches!(err, SyncError::MissingDependency(ref m) if m.contains("4242")));
    }

    #[test]
    fn test_install_instructions_use_file_name() {
        assert_eq!(
            install_instructions("/usr/local/bin/rsync"),
            "sudo apt-get install rsync"
        );
        assert!(install_instructions("collectiongain").contains("rgain"));
    }

    #[tokio::test]
    async fn test_run_tool_captures_stdout() {
        let out = run_tool("sh", ["-c", "echo hello"], OutputMode::Capture).await;
        assert_eq!(assert_ok!(out).trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_tool_failure_keeps_output() {
        let err = assert_err!(
            run_tool("sh", ["-c", "echo partial; echo broken >&2; exit 3"], OutputMode::Capture)
                .await
        );
        match err {
            SyncError::Tool { tool, output, .. } => {
                assert_eq!(tool, "sh");
                assert!(output.contains("broken"));
                assert!(output.contains("partial"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_tool_missing_program() {
        let err = run_tool(
            "definitely-not-a-real-tool-4242",
            Vec::<String>::new(),
            OutputMode::Capture,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::MissingDependency(_)));
    }
}
