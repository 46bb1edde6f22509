//! One-shot client for a running proxy's inject socket.

use std::path::PathBuf;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixStream,
};

use crate::{
    error::{Error, Result},
    frame::{self, FrameDecoder},
    rpc::{self, RequestId},
};

/// Sends one request to the proxy and prints the response body to stdout.
/// The proxy renumbers the id on the way to the server and restores it in
/// the reply, so a fixed id here is fine.
pub async fn run(socket: PathBuf, method: String, params: Option<String>) -> Result<()> {
    let params = match params {
        Some(text) => serde_json::from_str(&text)?,
        None => serde_json::Value::Null,
    };
    let body = rpc::build_request(&RequestId::Number(0), &method, params);

    let mut stream = UnixStream::connect(&socket).await?;
    stream
        .write_all(&frame::encode(&serde_json::to_vec(&body)?, &[]))
        .await?;
    stream.flush().await?;

    let mut decoder = FrameDecoder::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::UnexpectedEof("inject socket"));
        }
        decoder.feed(&chunk[..n]);
        if let Some(frame) = decoder.next_frame()? {
            println!("{}", String::from_utf8_lossy(&frame.body));
            return Ok(());
        }
    }
}
