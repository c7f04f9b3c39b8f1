use pretty_assertions::assert_eq;
use quill_lsp::{
    Client, ClientEvent, ClientState, FrameDecoder, LspContentChange, LspError, LspPosition,
    LspRange, PositionEncoding, encode_lsp_message,
};
use serde_json::{Value, json};
use std::path::Path;

fn frame(value: Value) -> Vec<u8> {
    encode_lsp_message(&value).unwrap()
}

fn drain_sent(client: &mut Client) -> Vec<Value> {
    let mut decoder = FrameDecoder::new();
    decoder.push(&client.send());
    let mut out = Vec::new();
    while let Some(value) = decoder.next_message().unwrap() {
        out.push(value);
    }
    out
}

fn initialized_client() -> Client {
    let mut client = Client::new(Path::new("/tmp/project"), Some(1)).unwrap();
    client.send();
    let events = client.recv(&frame(json!({
        "jsonrpc": "2.0",
        "id": 0,
        "result": {"capabilities": {"completionProvider": {}}},
    })));
    assert_eq!(
        events,
        vec![ClientEvent::Initialized {
            capabilities: json!({"completionProvider": {}})
        }]
    );
    client
}

#[test]
fn test_frame_decoder_handles_split_and_batched_messages() {
    let first = frame(json!({"jsonrpc": "2.0", "method": "a"}));
    let second = frame(json!({"jsonrpc": "2.0", "method": "b"}));

    let mut decoder = FrameDecoder::new();
    for chunk in first.chunks(3) {
        assert_eq!(decoder.next_message().unwrap(), None);
        decoder.push(chunk);
    }
    assert_eq!(decoder.next_message().unwrap().unwrap()["method"], "a");

    let mut batch = second.clone();
    batch.extend_from_slice(&second);
    decoder.push(&batch);
    assert_eq!(decoder.next_message().unwrap().unwrap()["method"], "b");
    assert_eq!(decoder.next_message().unwrap().unwrap()["method"], "b");
    assert_eq!(decoder.next_message().unwrap(), None);
}

#[test]
fn test_initialize_response_sends_initialized() {
    let mut client = initialized_client();
    assert_eq!(client.state(), ClientState::Normal);

    let sent = drain_sent(&mut client);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["method"], "initialized");
}

#[test]
fn test_position_encoding_follows_initialize_result() {
    // A server that stays silent about encodings means UTF-16.
    let client = initialized_client();
    assert_eq!(client.position_encoding(), PositionEncoding::Utf16);

    let mut client = Client::new(Path::new("/tmp/project"), None).unwrap();
    assert_eq!(client.position_encoding(), PositionEncoding::Utf16);
    client.recv(&frame(json!({
        "jsonrpc": "2.0",
        "id": 0,
        "result": {"capabilities": {"positionEncoding": "utf-32"}},
    })));
    assert_eq!(client.position_encoding(), PositionEncoding::Utf32);

    let mut client = Client::new(Path::new("/tmp/project"), None).unwrap();
    client.recv(&frame(json!({
        "jsonrpc": "2.0",
        "id": 0,
        "result": {"capabilities": {"positionEncoding": "utf-8"}},
    })));
    assert_eq!(client.state(), ClientState::Normal);
    assert_eq!(client.position_encoding(), PositionEncoding::Utf16);
}

#[test]
fn test_operations_before_initialize_are_rejected() {
    let mut client = Client::new(Path::new("/tmp/project"), None).unwrap();

    assert!(matches!(
        client.completions("file:///tmp/project/a.py", LspPosition::new(0, 0)),
        Err(LspError::InvalidState {
            state: ClientState::Uninitialized,
            ..
        })
    ));
    assert!(client.did_open("file:///a", "python", 0, "").is_err());
    assert!(client.shutdown().is_err());
}

#[test]
fn test_completion_response_matches_request_id() {
    let mut client = initialized_client();
    let id = client
        .completions("file:///tmp/project/a.py", LspPosition::new(3, 4))
        .unwrap();
    assert!(client.is_pending(id));

    // A response for an id we never used is dropped.
    let events = client.recv(&frame(json!({
        "jsonrpc": "2.0", "id": id + 100, "result": [{"label": "nope"}],
    })));
    assert!(events.is_empty());
    assert!(client.is_pending(id));

    let events = client.recv(&frame(json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {"isIncomplete": false, "items": [{"label": "path"}]},
    })));
    assert_eq!(events.len(), 1);
    let ClientEvent::Completion { id: got, items } = &events[0] else {
        panic!("expected completion, got {:?}", events[0]);
    };
    assert_eq!(*got, id);
    assert_eq!(items[0].label, "path");
    assert!(!client.is_pending(id));

    // The same id again is now unknown.
    let again = client.recv(&frame(json!({"jsonrpc": "2.0", "id": id, "result": []})));
    assert!(again.is_empty());
}

#[test]
fn test_did_change_carries_ranges_and_version() {
    let mut client = initialized_client();
    client.send();

    client
        .did_change(
            "file:///tmp/project/a.py",
            7,
            &[LspContentChange {
                range: LspRange::new(LspPosition::new(0, 4), LspPosition::new(1, 0)),
                text: "x".to_string(),
            }],
        )
        .unwrap();

    let sent = drain_sent(&mut client);
    assert_eq!(sent[0]["method"], "textDocument/didChange");
    assert_eq!(sent[0]["params"]["textDocument"]["version"], 7);
    assert_eq!(
        sent[0]["params"]["contentChanges"][0],
        json!({
            "range": {"start": {"line": 0, "character": 4}, "end": {"line": 1, "character": 0}},
            "text": "x",
        })
    );
}

#[test]
fn test_shutdown_then_exit() {
    let mut client = initialized_client();
    client.send();

    client.shutdown().unwrap();
    assert_eq!(client.state(), ClientState::ShuttingDown);
    let shutdown_id = drain_sent(&mut client)[0]["id"].as_u64().unwrap();

    let events = client.recv(&frame(json!({"jsonrpc": "2.0", "id": shutdown_id, "result": null})));
    assert_eq!(events, vec![ClientEvent::Shutdown]);

    client.exit().unwrap();
    assert_eq!(client.state(), ClientState::Exited);
    assert_eq!(drain_sent(&mut client)[0]["method"], "exit");
    assert!(client.exit().is_err());
}

#[test]
fn test_garbage_between_messages_does_not_stop_processing() {
    let mut client = initialized_client();

    let mut bytes = b"Content-Length: 5\r\n\r\n{oops".to_vec();
    bytes.extend(frame(json!({
        "jsonrpc": "2.0",
        "method": "window/showMessage",
        "params": {"type": 2, "message": "careful"},
    })));

    let events = client.recv(&bytes);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], ClientEvent::ShowMessage { message, .. } if message == "careful"));
}
