//! Push channel toward the observer process.
//!
//! The proxy dials the observer, not the other way round: while no
//! connection is up, every session tick retries, and the latest symbol
//! snapshot is replayed as soon as a connection lands.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixStream,
    sync::mpsc,
};

use super::session::Event;
use crate::frame;

pub const HEADER_TYPE: &str = "Type";
pub const HEADER_URI: &str = "Uri";
pub const HEADER_PRETEXT: &str = "Pretext";
pub const TYPE_SYMBOLS: &str = "documentSymbol";
pub const TYPE_COMPLETION: &str = "completion";

/// A live observer connection. Pushes go through a queue owned by a writer
/// task; the read half is watched only to notice the peer going away.
pub struct Observer {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    pub generation: u64,
}

impl Observer {
    /// Takes ownership of a freshly dialed stream. `generation` comes back
    /// in the close event, so a stale close can never clear a newer
    /// connection.
    pub fn start(
        stream: UnixStream,
        events: mpsc::UnboundedSender<Event>,
        generation: u64,
    ) -> Self {
        let (mut read_half, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

        tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
                let _ = write_half.flush().await;
            }
        });

        tokio::spawn(async move {
            // The observer never speaks; drain and ignore until it hangs up.
            let mut sink = [0u8; 256];
            loop {
                match read_half.read(&mut sink).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            let _ = events.send(Event::ObserverGone { generation });
        });

        Self { tx, generation }
    }

    /// Queues one framed push. Returns false once the connection is gone.
    pub fn push(&self, bytes: Vec<u8>) -> bool {
        self.tx.send(bytes).is_ok()
    }
}

/// Frames a symbol-listing push: the server's raw response body with
/// routing headers attached.
pub fn symbol_push(uri: &str, body: &[u8]) -> Vec<u8> {
    frame::encode(body, &[(HEADER_TYPE, TYPE_SYMBOLS), (HEADER_URI, uri)])
}

/// Frames a completion push. Pretext can contain header-breaking bytes, so
/// it travels base64-encoded.
pub fn completion_push(uri: &str, pretext: &str, body: &[u8]) -> Vec<u8> {
    let encoded = BASE64.encode(pretext.as_bytes());
    frame::encode(
        body,
        &[
            (HEADER_TYPE, TYPE_COMPLETION),
            (HEADER_URI, uri),
            (HEADER_PRETEXT, &encoded),
        ],
    )
}
