//! The session: one task owning every piece of routing state.
//!
//! Frames, stream ends and injected requests all arrive as events on a
//! single queue, so handlers run one at a time and never race. A message is
//! always forwarded before any side effect it triggers.

use std::{collections::HashMap, path::Path};

use serde_json::Value;
use tokio::{
    net::UnixStream,
    sync::{mpsc, oneshot},
    time::MissedTickBehavior,
};

use super::{
    classify::{self, EditorMessage},
    endpoint::{self, SessionIo},
    listener,
    observer::{self, Observer},
};
use crate::{
    config::Config,
    document::{ContentChange, DocumentStore, Position},
    error::{Error, Result},
    frame::{self, Frame},
    rpc::{self, IdGen, RequestId},
};

/// Namespace for ids the proxy mints.
pub const ID_PREFIX: &str = "lsp-tap";

/// Everything the pump tasks can tell the session.
#[derive(Debug)]
pub enum Event {
    /// A decoded frame from one of the framed streams.
    Frame { from: Peer, frame: Frame },
    /// End of stream.
    Eos(StreamId),
    /// Read or framing failure on a framed stream.
    Fault { stream: StreamId, error: Error },
    /// An ad-hoc request accepted on the inject socket.
    Inject {
        frame: Frame,
        reply: oneshot::Sender<Vec<u8>>,
    },
    /// The observer connection of this generation went away.
    ObserverGone { generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    Editor,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamId {
    EditorIn,
    ServerOut,
    ServerErr,
}

/// A request the proxy sent on its own behalf. Its response is consumed
/// here and never reaches the editor.
enum Injected {
    /// Symbol refresh for an open document.
    Symbols { uri: String },
    /// Relayed from an inject-socket connection. `id` is the caller's
    /// original id, restored in the reply.
    Relay {
        id: RequestId,
        reply: oneshot::Sender<Vec<u8>>,
    },
}

/// A real editor request whose response is also pushed to the observer.
struct Watched {
    uri: String,
    pretext: String,
}

struct Session {
    documents: DocumentStore,
    injected: HashMap<RequestId, Injected>,
    watched: HashMap<RequestId, Watched>,
    ids: IdGen,
    editor_tx: mpsc::UnboundedSender<Vec<u8>>,
    server_tx: mpsc::UnboundedSender<Vec<u8>>,
    observer: Option<Observer>,
    observer_generation: u64,
    /// Latest symbol push, replayed whenever an observer connects.
    snapshot: Option<Vec<u8>>,
    exit_expected: bool,
    server_out_eos: bool,
    server_err_eos: bool,
}

/// Runs one proxy session over the given streams. Returns once the editor
/// has requested exit and the server's streams have drained, or with the
/// error that ended the session.
pub async fn run_session(cfg: &Config, io: SessionIo) -> Result<()> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (editor_tx, editor_rx) = mpsc::unbounded_channel();
    let (server_tx, server_rx) = mpsc::unbounded_channel();

    let editor_writer = endpoint::spawn_writer(io.editor_out, editor_rx);
    let server_writer = endpoint::spawn_writer(io.server_in, server_rx);
    endpoint::spawn_frame_reader(
        StreamId::EditorIn,
        Peer::Editor,
        io.editor_in,
        events_tx.clone(),
    );
    endpoint::spawn_frame_reader(
        StreamId::ServerOut,
        Peer::Server,
        io.server_out,
        events_tx.clone(),
    );
    endpoint::spawn_stderr_pump(io.server_err, io.stderr_out, events_tx.clone());
    let listener = listener::spawn(&cfg.inject_socket, events_tx.clone());

    let mut session = Session::new(editor_tx, server_tx);
    let mut tick = tokio::time::interval(cfg.probe_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut result = Ok(());
    loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else {
                    result = Err(Error::UnexpectedEof("event queue"));
                    break;
                };
                if let Err(e) = session.handle(event) {
                    result = Err(e);
                    break;
                }
                if session.shutdown_ready() {
                    tracing::info!("Exit requested and server streams drained");
                    break;
                }
            }
            _ = tick.tick() => {
                session.probe_observer(&cfg.observer_socket, &events_tx).await;
            }
        }
    }

    if let Some(task) = listener {
        task.abort();
    }
    // Closing the session's queues lets the writers flush and finish.
    drop(session);
    if let Err(e) = result {
        editor_writer.abort();
        server_writer.abort();
        return Err(e);
    }
    editor_writer.await.map_err(|e| Error::Protocol(e.to_string()))??;
    server_writer.await.map_err(|e| Error::Protocol(e.to_string()))??;
    Ok(())
}

impl Session {
    fn new(editor_tx: mpsc::UnboundedSender<Vec<u8>>, server_tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            documents: DocumentStore::new(),
            injected: HashMap::new(),
            watched: HashMap::new(),
            ids: IdGen::new(ID_PREFIX),
            editor_tx,
            server_tx,
            observer: None,
            observer_generation: 0,
            snapshot: None,
            exit_expected: false,
            server_out_eos: false,
            server_err_eos: false,
        }
    }

    fn handle(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Frame { from: Peer::Editor, frame } => self.on_editor_frame(frame),
            Event::Frame { from: Peer::Server, frame } => self.on_server_frame(frame),
            Event::Eos(stream) => self.on_eos(stream),
            Event::Fault { stream, error } => {
                tracing::error!("Stream fault on {stream:?}: {error}");
                Err(error)
            }
            Event::Inject { frame, reply } => self.on_inject(frame, reply),
            Event::ObserverGone { generation } => {
                self.on_observer_gone(generation);
                Ok(())
            }
        }
    }

    /// Editor bytes go to the server before anything else looks at them.
    fn on_editor_frame(&mut self, frame: Frame) -> Result<()> {
        let Frame { raw, body, .. } = frame;
        self.send_server(raw)?;

        let body: Value = match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Forwarded an editor message whose body is not JSON: {e}");
                return Ok(());
            }
        };
        match classify::classify(&body) {
            EditorMessage::Open { uri, text } => {
                tracing::debug!("Opened {uri}");
                self.documents.open(uri.clone(), text);
                self.request_symbols(&uri)?;
            }
            EditorMessage::Change { uri, changes } => {
                self.apply_changes(&uri, &changes);
                self.request_symbols(&uri)?;
            }
            EditorMessage::Close { uri } => {
                tracing::debug!("Closed {uri}");
                self.documents.close(&uri);
            }
            EditorMessage::Completion { id, uri, position } => {
                self.watch_completion(id, uri, position);
            }
            EditorMessage::Exit => {
                tracing::info!("Editor requested exit");
                self.exit_expected = true;
            }
            EditorMessage::Other => {}
        }
        Ok(())
    }

    /// Server messages either answer one of our injected requests or are
    /// forwarded; watched responses are forwarded first, observed after.
    fn on_server_frame(&mut self, frame: Frame) -> Result<()> {
        let Frame { raw, body, .. } = frame;
        let parsed: Option<Value> = serde_json::from_slice(&body).ok();
        let id = parsed.as_ref().and_then(rpc::request_id);

        if let (Some(id), Some(parsed)) = (&id, parsed) {
            if let Some(entry) = self.injected.remove(id) {
                return self.resolve_injected(entry, parsed, &body);
            }
        }

        self.send_editor(raw)?;

        if let Some(id) = &id {
            if let Some(watch) = self.watched.remove(id) {
                self.push_completion(&watch, &body);
            }
        }
        Ok(())
    }

    fn resolve_injected(&mut self, entry: Injected, mut body: Value, body_bytes: &[u8]) -> Result<()> {
        match entry {
            Injected::Symbols { uri } => {
                tracing::debug!("Symbol update for {uri}");
                let push = observer::symbol_push(&uri, body_bytes);
                self.snapshot = Some(push.clone());
                self.push_observer(push);
            }
            Injected::Relay { id, reply } => {
                rpc::set_request_id(&mut body, &id)?;
                let bytes = frame::encode(&serde_json::to_vec(&body)?, &[]);
                if reply.send(bytes).is_err() {
                    tracing::debug!("Inject connection left before its response arrived");
                }
            }
        }
        Ok(())
    }

    /// Applies a didChange batch in array order. A change that does not fit
    /// the tracked text means the mirror is desynchronized; the document is
    /// dropped rather than trusted, and traffic continues untouched.
    fn apply_changes(&mut self, uri: &str, changes: &[ContentChange]) {
        for change in changes {
            if let Err(e) = self.documents.apply(uri, change) {
                tracing::warn!("Dropping desynchronized document {uri}: {e}");
                self.documents.close(uri);
                return;
            }
        }
    }

    /// Queues a documentSymbol request of our own for `uri`.
    fn request_symbols(&mut self, uri: &str) -> Result<()> {
        let id = self.ids.next_id();
        let body = rpc::build_request(
            &id,
            rpc::DOCUMENT_SYMBOL,
            serde_json::json!({ "textDocument": { "uri": uri } }),
        );
        self.injected.insert(id, Injected::Symbols { uri: uri.to_string() });
        self.send_server(frame::encode(&serde_json::to_vec(&body)?, &[]))
    }

    fn watch_completion(&mut self, id: RequestId, uri: String, position: Position) {
        let Some(pretext) = self.documents.pretext(&uri, position) else {
            tracing::debug!("Completion in unknown document {uri}; not watching");
            return;
        };
        tracing::debug!("Watching completion {id} in {uri}");
        self.watched.insert(id, Watched { uri, pretext });
    }

    /// An accepted request is renumbered into our id namespace, so it can
    /// never collide with an id the editor chose, and relayed to the server.
    fn on_inject(&mut self, frame: Frame, reply: oneshot::Sender<Vec<u8>>) -> Result<()> {
        let mut body: Value = match serde_json::from_slice(&frame.body) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Rejecting injected request with unreadable body: {e}");
                return Ok(());
            }
        };
        let Some(original) = rpc::request_id(&body) else {
            tracing::warn!("Rejecting injected request without an id");
            return Ok(());
        };
        let relay_id = self.ids.next_id();
        rpc::set_request_id(&mut body, &relay_id)?;
        let bytes = frame::encode(&serde_json::to_vec(&body)?, &[]);
        tracing::debug!("Relaying injected request {original} as {relay_id}");
        self.injected.insert(relay_id, Injected::Relay { id: original, reply });
        self.send_server(bytes)
    }

    fn on_eos(&mut self, stream: StreamId) -> Result<()> {
        tracing::debug!("End of stream on {stream:?}");
        match stream {
            StreamId::EditorIn => {
                if !self.exit_expected {
                    return Err(Error::UnexpectedEof("editor stream"));
                }
            }
            StreamId::ServerOut => {
                self.server_out_eos = true;
                if !self.exit_expected {
                    return Err(Error::UnexpectedEof("language server stdout"));
                }
            }
            StreamId::ServerErr => self.server_err_eos = true,
        }
        Ok(())
    }

    fn on_observer_gone(&mut self, generation: u64) {
        if self.observer.as_ref().is_some_and(|o| o.generation == generation) {
            tracing::info!("Observer disconnected");
            self.observer = None;
        }
    }

    /// Dials the observer when absent. Nobody listening is the normal case;
    /// the next tick tries again.
    async fn probe_observer(&mut self, path: &Path, events: &mpsc::UnboundedSender<Event>) {
        if self.observer.is_some() {
            return;
        }
        let Ok(stream) = UnixStream::connect(path).await else {
            return;
        };
        tracing::info!("Observer connected at {}", path.display());
        self.observer_generation += 1;
        let observer = Observer::start(stream, events.clone(), self.observer_generation);
        if let Some(snapshot) = &self.snapshot {
            observer.push(snapshot.clone());
        }
        self.observer = Some(observer);
    }

    fn push_completion(&mut self, watch: &Watched, body: &[u8]) {
        tracing::debug!("Completion observed in {}", watch.uri);
        let push = observer::completion_push(&watch.uri, &watch.pretext, body);
        self.push_observer(push);
    }

    fn push_observer(&mut self, bytes: Vec<u8>) {
        let Some(observer) = &self.observer else { return };
        if !observer.push(bytes) {
            tracing::info!("Observer disconnected");
            self.observer = None;
        }
    }

    fn send_server(&self, bytes: Vec<u8>) -> Result<()> {
        if self.server_tx.send(bytes).is_err() && !self.exit_expected {
            return Err(Error::UnexpectedEof("language server stdin"));
        }
        Ok(())
    }

    fn send_editor(&self, bytes: Vec<u8>) -> Result<()> {
        if self.editor_tx.send(bytes).is_err() && !self.exit_expected {
            return Err(Error::UnexpectedEof("editor stream"));
        }
        Ok(())
    }

    /// The session may end only after exit was requested and the server's
    /// streams have both drained.
    fn shutdown_ready(&self) -> bool {
        self.exit_expected && self.server_out_eos && self.server_err_eos
    }
}
