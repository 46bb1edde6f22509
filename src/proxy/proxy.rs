//! Proxy orchestration: spawning the language server and mirroring its exit
//! status.

use std::process::Stdio;

use tokio::process::{Child, Command};

use super::{endpoint::SessionIo, session};
use crate::{
    config::Config,
    error::{Error, Result},
};

/// Spawn the language server child process with fully piped stdio.
fn spawn_server(cfg: &Config) -> Result<Child> {
    let (program, args) = cfg
        .server
        .split_first()
        .ok_or_else(|| Error::Protocol("empty language server command".into()))?;
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    tracing::info!("Spawned language server: {}", cfg.server.join(" "));
    Ok(child)
}

/// Runs the proxy over the editor's stdio. Returns the exit code to report,
/// mirroring the child's own status.
pub async fn run(cfg: Config) -> Result<i32> {
    let mut child = spawn_server(&cfg)?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Protocol("failed to capture language server stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Protocol("failed to capture language server stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Protocol("failed to capture language server stderr".into()))?;

    let io = SessionIo {
        editor_in: Box::new(tokio::io::stdin()),
        editor_out: Box::new(tokio::io::stdout()),
        server_in: Box::new(stdin),
        server_out: Box::new(stdout),
        server_err: Box::new(stderr),
        stderr_out: Box::new(tokio::io::stderr()),
    };

    let session_result = session::run_session(&cfg, io).await;
    let _ = std::fs::remove_file(&cfg.inject_socket);

    match session_result {
        Ok(()) => {
            let status = child.wait().await?;
            tracing::info!("Language server exited with {status}");
            Ok(status.code().unwrap_or(0))
        }
        Err(e) => {
            tracing::error!("Session failed: {e}");
            // Reap the child before surfacing the session error.
            let _ = child.start_kill();
            let _ = child.wait().await;
            Err(e)
        }
    }
}
