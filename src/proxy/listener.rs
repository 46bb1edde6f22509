//! Listen socket accepting one-shot injected requests.

use std::{fs, path::Path};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use super::{endpoint::READ_CHUNK, session::Event};
use crate::frame::{Frame, FrameDecoder};

/// Binds the inject socket and serves it until aborted. A bind failure is
/// logged and returns `None`; the proxy runs on without this surface.
pub fn spawn(path: &Path, events: mpsc::UnboundedSender<Event>) -> Option<JoinHandle<()>> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    // Remove existing socket file
    if path.exists() {
        let _ = fs::remove_file(path);
    }

    let listener = match UnixListener::bind(path) {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind inject socket at {}: {e}", path.display());
            return None;
        }
    };

    tracing::info!("Inject socket listening on {}", path.display());

    Some(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    tokio::spawn(handle_conn(stream, events.clone()));
                }
                Err(e) => {
                    tracing::error!("Accept error on inject socket: {e}");
                }
            }
        }
    }))
}

/// One connection carries one framed request. The session's reply is written
/// back and the connection closed; a rejected request closes it with nothing.
async fn handle_conn(mut stream: UnixStream, events: mpsc::UnboundedSender<Event>) {
    let Some(frame) = read_one_frame(&mut stream).await else {
        return;
    };
    let (reply_tx, reply_rx) = oneshot::channel();
    if events.send(Event::Inject { frame, reply: reply_tx }).is_err() {
        return;
    }
    if let Ok(bytes) = reply_rx.await {
        let _ = stream.write_all(&bytes).await;
        let _ = stream.flush().await;
    }
}

async fn read_one_frame(stream: &mut UnixStream) -> Option<Frame> {
    let mut decoder = FrameDecoder::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        decoder.feed(&chunk[..n]);
        match decoder.next_frame() {
            Ok(frame @ Some(_)) => return frame,
            Ok(None) => {}
            Err(e) => {
                tracing::debug!("Dropping inject connection with bad framing: {e}");
                return None;
            }
        }
    }
}
