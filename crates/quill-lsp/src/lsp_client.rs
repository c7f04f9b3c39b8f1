//! Sans-IO JSON-RPC/LSP client.
//!
//! [`Client`] never touches a pipe or socket. Outgoing messages accumulate in a byte buffer that
//! the caller drains with [`Client::send`] and writes to whatever transport it has; bytes read
//! from the server are handed to [`Client::recv`], which returns typed [`ClientEvent`]s.
//!
//! ```text
//! Uninitialized --initialize response--> Normal --shutdown()--> ShuttingDown --exit()--> Exited
//! ```

use crate::error::{LspError, Result};
use crate::lsp_coords::{LspPosition, LspRange, PositionEncoding};
use crate::lsp_events::{ClientEvent, CompletionItem};
use crate::lsp_transport::{FrameDecoder, encode_lsp_message};
use crate::lsp_uri::path_to_file_uri;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, error, warn};

/// JSON-RPC "method not found".
const METHOD_NOT_FOUND: i64 = -32601;

/// Where the client is in the LSP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// `initialize` was sent, waiting for the response.
    Uninitialized,
    /// Initialized; documents may be opened, changed and queried.
    Normal,
    /// `shutdown` was sent.
    ShuttingDown,
    /// `exit` was sent. Nothing more may be sent.
    Exited,
}

/// One `contentChanges` entry of `textDocument/didChange`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LspContentChange {
    /// Replaced range, in coordinates before this change.
    pub range: LspRange,
    /// Replacement text.
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Initialize,
    Completion,
    Shutdown,
}

/// LSP client state machine.
#[derive(Debug)]
pub struct Client {
    state: ClientState,
    next_id: u64,
    pending: HashMap<u64, RequestKind>,
    outgoing: Vec<u8>,
    decoder: FrameDecoder,
    workspace_folders: Vec<Value>,
    position_encoding: PositionEncoding,
}

impl Client {
    /// Create a client for the project at `root` and queue the `initialize` request.
    pub fn new(root: &Path, process_id: Option<u32>) -> Result<Self> {
        let root_uri = path_to_file_uri(root);
        let name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root_uri.clone());
        let workspace_folders = vec![json!({ "uri": root_uri, "name": name })];

        let mut client = Self {
            state: ClientState::Uninitialized,
            next_id: 0,
            pending: HashMap::new(),
            outgoing: Vec::new(),
            decoder: FrameDecoder::new(),
            workspace_folders: workspace_folders.clone(),
            position_encoding: PositionEncoding::default(),
        };

        let params = json!({
            "processId": process_id,
            "rootUri": root_uri,
            "workspaceFolders": workspace_folders,
            "trace": "verbose",
            "capabilities": {
                "general": { "positionEncodings": ["utf-32"] },
                "textDocument": {
                    "synchronization": { "dynamicRegistration": false, "didSave": false },
                    "completion": {
                        "completionItem": {
                            "snippetSupport": false,
                            "documentationFormat": ["plaintext", "markdown"],
                        },
                    },
                    "publishDiagnostics": { "relatedInformation": false },
                },
                "workspace": { "workspaceFolders": true, "configuration": true },
            },
        });
        client.request(RequestKind::Initialize, "initialize", params)?;
        Ok(client)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Column encoding the server agreed to in its `initialize` response.
    ///
    /// [`PositionEncoding::Utf16`] until that response arrives.
    pub fn position_encoding(&self) -> PositionEncoding {
        self.position_encoding
    }

    /// Whether a request with this id is still waiting for its response.
    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    /// Take the bytes queued for the server.
    pub fn send(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outgoing)
    }

    /// Feed bytes received from the server.
    ///
    /// A message that cannot be decoded or handled is logged and skipped; the rest of the input
    /// is still processed.
    pub fn recv(&mut self, bytes: &[u8]) -> Vec<ClientEvent> {
        self.decoder.push(bytes);

        let mut events = Vec::new();
        loop {
            match self.decoder.next_message() {
                Ok(Some(message)) => {
                    if let Err(err) = self.handle_message(&message, &mut events) {
                        error!("error while handling langserver message: {err}");
                    }
                }
                Ok(None) => break,
                Err(err) => warn!("dropping undecodable langserver message: {err}"),
            }
        }
        events
    }

    /// `textDocument/didOpen`
    pub fn did_open(&mut self, uri: &str, language_id: &str, version: i64, text: &str) -> Result<()> {
        self.require(ClientState::Normal, "open a document")?;
        self.notify(
            "textDocument/didOpen",
            json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": language_id,
                    "version": version,
                    "text": text,
                },
            }),
        )
    }

    /// `textDocument/didChange` with incremental changes, applied by the server in order.
    pub fn did_change(
        &mut self,
        uri: &str,
        version: i64,
        changes: &[LspContentChange],
    ) -> Result<()> {
        self.require(ClientState::Normal, "send changes")?;
        let content_changes: Vec<Value> = changes
            .iter()
            .map(|change| json!({ "range": change.range.to_value(), "text": change.text }))
            .collect();
        self.notify(
            "textDocument/didChange",
            json!({
                "textDocument": { "uri": uri, "version": version },
                "contentChanges": content_changes,
            }),
        )
    }

    /// `textDocument/completion`. Returns the request id the response will carry.
    pub fn completions(&mut self, uri: &str, position: LspPosition) -> Result<u64> {
        self.require(ClientState::Normal, "request completions")?;
        self.request(
            RequestKind::Completion,
            "textDocument/completion",
            json!({
                "textDocument": { "uri": uri },
                "position": position.to_value(),
                // Invoked
                "context": { "triggerKind": 1 },
            }),
        )
    }

    /// Send `shutdown`.
    pub fn shutdown(&mut self) -> Result<()> {
        self.require(ClientState::Normal, "shut down")?;
        self.request(RequestKind::Shutdown, "shutdown", Value::Null)?;
        self.state = ClientState::ShuttingDown;
        Ok(())
    }

    /// Send `exit` after the shutdown response.
    pub fn exit(&mut self) -> Result<()> {
        self.require(ClientState::ShuttingDown, "exit")?;
        self.notify("exit", Value::Null)?;
        self.state = ClientState::Exited;
        Ok(())
    }

    fn require(&self, state: ClientState, operation: &'static str) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(LspError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn queue(&mut self, message: &Value) -> Result<()> {
        let bytes = encode_lsp_message(message)?;
        self.outgoing.extend_from_slice(&bytes);
        Ok(())
    }

    fn notify(&mut self, method: &str, params: Value) -> Result<()> {
        self.queue(&json_rpc_notification(method, params))
    }

    fn request(&mut self, kind: RequestKind, method: &str, params: Value) -> Result<u64> {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.queue(&json_rpc_request(id, method, params))?;
        self.pending.insert(id, kind);
        Ok(id)
    }

    fn handle_message(&mut self, msg: &Value, events: &mut Vec<ClientEvent>) -> Result<()> {
        let null = Value::Null;
        if let Some(method) = msg.get("method").and_then(Value::as_str) {
            let params = msg.get("params").unwrap_or(&null);
            match msg.get("id") {
                Some(id) => self.handle_server_request(id, method, params)?,
                None => match ClientEvent::from_notification(method, params) {
                    Some(event) => events.push(event),
                    None => debug!(method, "ignoring notification"),
                },
            }
            return Ok(());
        }

        let Some(id) = msg.get("id").and_then(Value::as_u64) else {
            warn!("langserver sent a message that is neither request nor response: {msg}");
            return Ok(());
        };
        let Some(kind) = self.pending.remove(&id) else {
            warn!(request_id = id, "ignoring response to unknown request");
            return Ok(());
        };

        if let Some(err) = msg.get("error") {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or_default();
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            error!(request_id = id, code, "langserver request failed: {message}");
            events.push(ClientEvent::ResponseError { id, code, message });
            return Ok(());
        }

        let result = msg.get("result").unwrap_or(&null);
        match kind {
            RequestKind::Initialize => {
                self.state = ClientState::Normal;
                self.notify("initialized", json!({}))?;
                let capabilities = result.get("capabilities").cloned().unwrap_or(Value::Null);
                self.position_encoding = PositionEncoding::from_capabilities(&capabilities);
                if self.position_encoding != PositionEncoding::Utf32 {
                    warn!(
                        "langserver did not confirm utf-32 positions, columns after non-ASCII \
                         text may be off"
                    );
                }
                events.push(ClientEvent::Initialized { capabilities });
            }
            RequestKind::Completion => events.push(ClientEvent::Completion {
                id,
                items: CompletionItem::list_from_result(result),
            }),
            RequestKind::Shutdown => events.push(ClientEvent::Shutdown),
        }
        Ok(())
    }

    /// Respond to server->client requests with safe defaults.
    fn handle_server_request(&mut self, id: &Value, method: &str, params: &Value) -> Result<()> {
        debug!(method, "answering langserver request");
        let result = match method {
            "workspace/configuration" => {
                let item_count = params
                    .get("items")
                    .and_then(Value::as_array)
                    .map(Vec::len)
                    .unwrap_or(0);
                Value::Array(std::iter::repeat_n(Value::Null, item_count).collect())
            }
            "workspace/workspaceFolders" => Value::Array(self.workspace_folders.clone()),
            "client/registerCapability"
            | "client/unregisterCapability"
            | "window/workDoneProgress/create"
            | "window/showMessageRequest"
            | "workspace/semanticTokens/refresh"
            | "workspace/inlayHint/refresh"
            | "workspace/codeLens/refresh"
            | "workspace/diagnostic/refresh" => Value::Null,
            "workspace/applyEdit" => json!({
                "applied": false,
                "failureReason": "workspace edits are not supported",
            }),
            _ => {
                let message = format!("unsupported method {method}");
                return self.queue(&json_rpc_error_response(id, METHOD_NOT_FOUND, message));
            }
        };
        self.queue(&json_rpc_response(id, result))
    }
}

fn json_rpc_notification(method: &str, params: Value) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("jsonrpc".to_string(), Value::String("2.0".to_string()));
    obj.insert("method".to_string(), Value::String(method.to_string()));
    if !params.is_null() {
        obj.insert("params".to_string(), params);
    }
    Value::Object(obj)
}

fn json_rpc_request(id: u64, method: &str, params: Value) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("jsonrpc".to_string(), Value::String("2.0".to_string()));
    obj.insert("id".to_string(), Value::Number(id.into()));
    obj.insert("method".to_string(), Value::String(method.to_string()));
    if !params.is_null() {
        obj.insert("params".to_string(), params);
    }
    Value::Object(obj)
}

fn json_rpc_response(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn json_rpc_error_response(id: &Value, code: i64, message: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent_messages(client: &mut Client) -> Vec<Value> {
        let mut decoder = FrameDecoder::new();
        decoder.push(&client.send());
        std::iter::from_fn(|| decoder.next_message().unwrap()).collect()
    }

    fn frame(value: Value) -> Vec<u8> {
        encode_lsp_message(&value).unwrap()
    }

    #[test]
    fn test_new_queues_initialize() {
        let mut client = Client::new(Path::new("/tmp/proj"), Some(42)).unwrap();
        let sent = sent_messages(&mut client);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["method"], "initialize");
        assert_eq!(sent[0]["params"]["processId"], 42);
        assert_eq!(sent[0]["params"]["workspaceFolders"][0]["name"], "proj");
        assert_eq!(client.state(), ClientState::Uninitialized);
        assert!(client.send().is_empty());
    }

    #[test]
    fn test_server_requests_get_default_answers() {
        let mut client = Client::new(Path::new("/tmp/proj"), None).unwrap();
        client.send();

        let mut bytes = frame(json!({
            "jsonrpc": "2.0", "id": 7, "method": "workspace/configuration",
            "params": {"items": [{}, {}]},
        }));
        bytes.extend(frame(json!({"jsonrpc": "2.0", "id": "x", "method": "made/up"})));
        assert!(client.recv(&bytes).is_empty());

        let sent = sent_messages(&mut client);
        assert_eq!(sent[0]["id"], 7);
        assert_eq!(sent[0]["result"], json!([null, null]));
        assert_eq!(sent[1]["id"], "x");
        assert_eq!(sent[1]["error"]["code"], METHOD_NOT_FOUND);
    }

    #[test]
    fn test_response_error_is_reported() {
        let mut client = Client::new(Path::new("/tmp/proj"), None).unwrap();
        let events = client.recv(&frame(json!({
            "jsonrpc": "2.0", "id": 0, "error": {"code": -32603, "message": "boom"},
        })));
        assert_eq!(
            events,
            vec![ClientEvent::ResponseError {
                id: 0,
                code: -32603,
                message: "boom".to_string()
            }]
        );
        assert_eq!(client.state(), ClientState::Uninitialized);
    }

    #[test]
    fn test_exit_requires_shutdown() {
        let mut client = Client::new(Path::new("/tmp/proj"), None).unwrap();
        assert!(matches!(
            client.exit(),
            Err(LspError::InvalidState {
                state: ClientState::Uninitialized,
                ..
            })
        ));
    }
}
