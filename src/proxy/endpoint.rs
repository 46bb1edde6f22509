//! Stream pumps joining the byte streams to the session's event queue.
//!
//! Readers decode frames and hand them over as events; writers own an
//! unbounded queue so the session never blocks on a slow peer.

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
};

use super::session::{Event, Peer, StreamId};
use crate::{error::Result, frame::FrameDecoder};

/// Bytes pulled per wake. Bounds how long any one endpoint can keep the
/// session busy before others get a turn.
pub const READ_CHUNK: usize = 4096;

/// The byte streams one session is wired to. `stderr_out` receives the
/// child's stderr verbatim.
pub struct SessionIo {
    pub editor_in: Box<dyn AsyncRead + Send + Unpin>,
    pub editor_out: Box<dyn AsyncWrite + Send + Unpin>,
    pub server_in: Box<dyn AsyncWrite + Send + Unpin>,
    pub server_out: Box<dyn AsyncRead + Send + Unpin>,
    pub server_err: Box<dyn AsyncRead + Send + Unpin>,
    pub stderr_out: Box<dyn AsyncWrite + Send + Unpin>,
}

/// Reads a framed stream to completion, reporting frames, end of stream and
/// framing faults as events.
pub fn spawn_frame_reader(
    stream: StreamId,
    peer: Peer,
    input: Box<dyn AsyncRead + Send + Unpin>,
    events: mpsc::UnboundedSender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match read_frames(input, peer, &events).await {
            Ok(()) => {
                let _ = events.send(Event::Eos(stream));
            }
            Err(error) => {
                let _ = events.send(Event::Fault { stream, error });
            }
        }
    })
}

async fn read_frames(
    mut input: Box<dyn AsyncRead + Send + Unpin>,
    peer: Peer,
    events: &mpsc::UnboundedSender<Event>,
) -> Result<()> {
    let mut decoder = FrameDecoder::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = input.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        decoder.feed(&chunk[..n]);
        while let Some(frame) = decoder.next_frame()? {
            if events.send(Event::Frame { from: peer, frame }).is_err() {
                // Session is gone; nothing left to report to.
                return Ok(());
            }
        }
    }
}

/// Copies the child's stderr to ours verbatim, then reports end of stream.
pub fn spawn_stderr_pump(
    mut input: Box<dyn AsyncRead + Send + Unpin>,
    mut output: Box<dyn AsyncWrite + Send + Unpin>,
    events: mpsc::UnboundedSender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match input.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if output.write_all(&chunk[..n]).await.is_err() {
                        break;
                    }
                    let _ = output.flush().await;
                }
            }
        }
        let _ = events.send(Event::Eos(StreamId::ServerErr));
    })
}

/// Owns all writes to one stream. Each queued message is written whole and
/// flushed; closing the queue flushes and shuts the stream down.
pub fn spawn_writer(
    mut output: Box<dyn AsyncWrite + Send + Unpin>,
    mut queue: mpsc::UnboundedReceiver<Vec<u8>>,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        while let Some(bytes) = queue.recv().await {
            output.write_all(&bytes).await?;
            output.flush().await?;
        }
        output.shutdown().await?;
        Ok(())
    })
}
