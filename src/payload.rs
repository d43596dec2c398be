//! JSON payload construction for the bidirectional TTS control plane.
//!
//! Field order is not load-bearing for the server.

use serde_json::json;

/// Empty `{}` payload used for `StartConnection`, `FinishConnection`, and
/// `FinishSession`.
pub fn empty() -> Vec<u8> {
    b"{}".to_vec()
}

/// Payload for `StartSession` / `TaskRequest`: `speaker`/`text` are omitted
/// when empty rather than serialized as empty strings.
pub fn req_params_payload(event: i32, speaker: &str, text: &str, sample_rate: u32) -> Vec<u8> {
    let mut req_params = serde_json::Map::new();
    if !speaker.is_empty() {
        req_params.insert("speaker".to_string(), json!(speaker));
    }
    if !text.is_empty() {
        req_params.insert("text".to_string(), json!(text));
    }
    req_params.insert(
        "audio_params".to_string(),
        json!({ "format": "pcm", "sample_rate": sample_rate }),
    );

    let payload = json!({
        "event": event,
        "namespace": "BidirectionalTTS",
        "req_params": req_params,
    });

    serde_json::to_vec(&payload).expect("payload serialization cannot fail")
}
