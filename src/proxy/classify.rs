//! Editor-message classification for single-parse dispatch.

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::{
    document::{ContentChange, Position},
    rpc::{self, RequestId},
};

/// What an editor message means to the proxy, parsed once. Classification
/// never affects forwarding; every message goes to the server verbatim
/// regardless of its variant.
#[derive(Debug)]
pub enum EditorMessage {
    Open {
        uri: String,
        text: String,
    },
    Change {
        uri: String,
        changes: Vec<ContentChange>,
    },
    Close {
        uri: String,
    },
    Completion {
        id: RequestId,
        uri: String,
        position: Position,
    },
    Exit,
    Other,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidOpenParams {
    text_document: TextDocumentItem,
}

#[derive(Deserialize)]
struct TextDocumentItem {
    uri: String,
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidChangeParams {
    text_document: DocumentId,
    content_changes: Vec<ContentChange>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidCloseParams {
    text_document: DocumentId,
}

#[derive(Deserialize)]
struct DocumentId {
    uri: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentPositionParams {
    text_document: DocumentId,
    position: Position,
}

pub fn classify(body: &Value) -> EditorMessage {
    match rpc::method(body) {
        Some(rpc::DID_OPEN) => did_open(body),
        Some(rpc::DID_CHANGE) => did_change(body),
        Some(rpc::DID_CLOSE) => did_close(body),
        Some(rpc::COMPLETION) => completion(body),
        Some(rpc::EXIT) => EditorMessage::Exit,
        _ => EditorMessage::Other,
    }
}

fn params<T: DeserializeOwned>(body: &Value) -> Option<T> {
    serde_json::from_value(body.get("params")?.clone()).ok()
}

fn did_open(body: &Value) -> EditorMessage {
    params::<DidOpenParams>(body).map_or(EditorMessage::Other, |p| EditorMessage::Open {
        uri: p.text_document.uri,
        text: p.text_document.text,
    })
}

fn did_change(body: &Value) -> EditorMessage {
    params::<DidChangeParams>(body).map_or(EditorMessage::Other, |p| EditorMessage::Change {
        uri: p.text_document.uri,
        changes: p.content_changes,
    })
}

fn did_close(body: &Value) -> EditorMessage {
    params::<DidCloseParams>(body).map_or(EditorMessage::Other, |p| EditorMessage::Close {
        uri: p.text_document.uri,
    })
}

/// A completion is only watchable when it carries an id to match the
/// response by.
fn completion(body: &Value) -> EditorMessage {
    let Some(id) = rpc::request_id(body) else {
        return EditorMessage::Other;
    };
    params::<DocumentPositionParams>(body).map_or(EditorMessage::Other, |p| {
        EditorMessage::Completion {
            id,
            uri: p.text_document.uri,
            position: p.position,
        }
    })
}
