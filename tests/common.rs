#![allow(dead_code)]

use std::time::Duration;

use lsp_tap::{
    config::Config,
    error::Result,
    frame::{encode, Frame, FrameDecoder},
    proxy::{run_session, SessionIo},
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::{
    io::{duplex, AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream},
    net::{UnixListener, UnixStream},
    task::JoinHandle,
    time::timeout,
};

pub const WAIT: Duration = Duration::from_secs(5);
pub const TICK: Duration = Duration::from_millis(25);

/// A whole proxy session over in-memory pipes. The test plays both the
/// editor and the language server; the proxy cannot tell the difference.
pub struct TestProxy {
    /// Editor's end: writes are editor→proxy, reads are proxy→editor.
    pub editor: DuplexStream,
    /// Server's end: reads are the child's stdin, writes its stdout.
    pub server: DuplexStream,
    /// The child's stderr (write side held by the test).
    pub server_err: DuplexStream,
    /// Where the proxy's own stderr passthrough lands.
    pub diagnostics: DuplexStream,
    pub handle: JoinHandle<Result<()>>,
    pub cfg: Config,
    pub dir: TempDir,
    editor_frames: FrameDecoder,
    server_frames: FrameDecoder,
}

impl TestProxy {
    pub fn start() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let mut cfg = Config::new(vec!["test-server".to_string()]);
        cfg.inject_socket = dir.path().join("inject.sock");
        cfg.observer_socket = dir.path().join("observer.sock");
        cfg.probe_interval = TICK;

        let (editor, proxy_editor) = duplex(1 << 16);
        let (server, proxy_server) = duplex(1 << 16);
        let (server_err, proxy_server_err) = duplex(1 << 16);
        let (diagnostics, proxy_diagnostics) = duplex(1 << 16);

        let (editor_in, editor_out) = tokio::io::split(proxy_editor);
        let (server_out, server_in) = tokio::io::split(proxy_server);

        let io = SessionIo {
            editor_in: Box::new(editor_in),
            editor_out: Box::new(editor_out),
            server_in: Box::new(server_in),
            server_out: Box::new(server_out),
            server_err: Box::new(proxy_server_err),
            stderr_out: Box::new(proxy_diagnostics),
        };
        let session_cfg = cfg.clone();
        let handle = tokio::spawn(async move { run_session(&session_cfg, io).await });

        Self {
            editor,
            server,
            server_err,
            diagnostics,
            handle,
            cfg,
            dir,
            editor_frames: FrameDecoder::new(),
            server_frames: FrameDecoder::new(),
        }
    }

    /// Frames and sends one message as the editor.
    pub async fn editor_sends(&mut self, body: &Value) {
        let bytes = encode(body.to_string().as_bytes(), &[]);
        self.editor.write_all(&bytes).await.expect("editor write");
    }

    pub async fn editor_sends_raw(&mut self, bytes: &[u8]) {
        self.editor.write_all(bytes).await.expect("editor write");
    }

    /// One framed message as the server would put on stdout.
    pub async fn server_sends(&mut self, body: &Value) {
        let bytes = encode(body.to_string().as_bytes(), &[]);
        self.server.write_all(&bytes).await.expect("server write");
    }

    pub async fn server_sends_raw(&mut self, bytes: &[u8]) {
        self.server.write_all(bytes).await.expect("server write");
    }

    /// Next frame the server's stdin sees.
    pub async fn server_reads(&mut self) -> Frame {
        read_frame(&mut self.server, &mut self.server_frames).await
    }

    /// Next frame the editor's stdout sees.
    pub async fn editor_reads(&mut self) -> Frame {
        read_frame(&mut self.editor, &mut self.editor_frames).await
    }

    /// Reads the next server-bound frame, asserts it is a symbol request
    /// for `uri`, and returns its id for the reply.
    pub async fn expect_symbol_request(&mut self, uri: &str) -> Value {
        let frame = self.server_reads().await;
        let body = body_json(&frame);
        assert_eq!(body["method"], "textDocument/documentSymbol");
        assert_eq!(body["params"]["textDocument"]["uri"], uri);
        body["id"].clone()
    }

    /// Connects to the inject socket, retrying while the listener binds.
    pub async fn connect_inject(&self) -> UnixStream {
        for _ in 0..200 {
            if let Ok(stream) = UnixStream::connect(&self.cfg.inject_socket).await {
                return stream;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("inject socket never came up");
    }

    /// Closes the editor's write side, as an editor crash would.
    pub async fn editor_hangs_up(&mut self) {
        self.editor.shutdown().await.expect("editor shutdown");
    }

    /// Closes the server's stdout and stderr, as an exiting server does,
    /// then waits for the session to finish.
    pub async fn server_exits(mut self) -> Result<()> {
        self.server.shutdown().await.expect("server shutdown");
        self.server_err.shutdown().await.expect("stderr shutdown");
        timeout(WAIT, self.handle)
            .await
            .expect("session did not finish")
            .expect("session task panicked")
    }

    /// Waits for the session to end, however it ends.
    pub async fn session_result(self) -> Result<()> {
        timeout(WAIT, self.handle)
            .await
            .expect("session did not finish")
            .expect("session task panicked")
    }
}

/// Reads one frame, waiting up to [`WAIT`].
pub async fn read_frame<S: AsyncRead + Unpin>(stream: &mut S, decoder: &mut FrameDecoder) -> Frame {
    loop {
        if let Some(frame) = decoder.next_frame().expect("bad frame on stream") {
            return frame;
        }
        let mut chunk = [0u8; 4096];
        let n = timeout(WAIT, stream.read(&mut chunk))
            .await
            .expect("timed out waiting for a frame")
            .expect("read failed");
        assert!(n > 0, "stream closed while waiting for a frame");
        decoder.feed(&chunk[..n]);
    }
}

pub fn body_json(frame: &Frame) -> Value {
    serde_json::from_slice(&frame.body).expect("frame body is not JSON")
}

/// Binds the observer socket the proxy probes for.
pub fn bind_observer(proxy: &TestProxy) -> UnixListener {
    UnixListener::bind(&proxy.cfg.observer_socket).expect("bind observer socket")
}

/// Accepts the proxy's next dial of the observer socket.
pub async fn accept_observer(listener: &UnixListener) -> UnixStream {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("proxy never dialed the observer socket")
        .expect("accept failed");
    stream
}

pub fn initialize(id: i64) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": "initialize",
           "params": {"capabilities": {}, "rootUri": null, "processId": 4242}})
}

pub fn initialize_result(id: i64) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": {"capabilities": {}}})
}

pub fn did_open(uri: &str, text: &str) -> Value {
    json!({"jsonrpc": "2.0", "method": "textDocument/didOpen",
           "params": {"textDocument": {
               "uri": uri, "languageId": "plaintext", "version": 1, "text": text}}})
}

pub fn did_change(uri: &str, changes: Value) -> Value {
    json!({"jsonrpc": "2.0", "method": "textDocument/didChange",
           "params": {"textDocument": {"uri": uri, "version": 2},
                      "contentChanges": changes}})
}

pub fn did_close(uri: &str) -> Value {
    json!({"jsonrpc": "2.0", "method": "textDocument/didClose",
           "params": {"textDocument": {"uri": uri}}})
}

pub fn completion(id: i64, uri: &str, line: u32, character: u32) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": "textDocument/completion",
           "params": {"textDocument": {"uri": uri},
                      "position": {"line": line, "character": character}}})
}

pub fn exit() -> Value {
    json!({"jsonrpc": "2.0", "method": "exit", "params": null})
}

pub fn symbol_response(id: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

/// Any server-to-editor notification; handy as an ordering marker.
pub fn log_message(text: &str) -> Value {
    json!({"jsonrpc": "2.0", "method": "window/logMessage",
           "params": {"type": 3, "message": text}})
}
