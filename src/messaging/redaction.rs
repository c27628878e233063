use serde_json::Value;

pub const REDACTED: &str = "[redacted]";

/// Keys whose values may carry free text typed by a counterparty user, or raw document
/// content. The whole value is replaced, whatever its shape.
const SENSITIVE_KEYS: &[&str] = &["note", "content"];

/// Returns a copy of the payload that is safe to log.
pub fn redact_payload(payload: &Value) -> Value {
    let mut copy = payload.clone();
    redact_in_place(&mut copy);
    copy
}

/// Redacted rendering of raw message content, or a size marker when it is not JSON.
pub fn redacted_preview(content: &[u8]) -> String {
    match serde_json::from_slice::<Value>(content) {
        Ok(payload) => redact_payload(&payload).to_string(),
        Err(_) => format!("<{} bytes, not JSON>", content.len()),
    }
}

fn redact_in_place(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if SENSITIVE_KEYS.contains(&key.as_str()) {
                    redact_sensitive(child);
                } else {
                    redact_in_place(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_in_place),
        _ => {}
    }
}

fn redact_sensitive(value: &mut Value) {
    if !value.is_null() {
        *value = Value::String(REDACTED.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_feedback_notes() {
        let payload = json!({
            "messageType": "SEND_DOCUMENT_FEEDBACK",
            "data": {
                "documents": [
                    { "documentId": "doc-1", "status": "rejected", "note": "wrong passport scan" }
                ]
            }
        });

        let redacted = redact_payload(&payload);

        assert_eq!(redacted["data"]["documents"][0]["note"], REDACTED);
        assert_eq!(redacted["data"]["documents"][0]["documentId"], "doc-1");
    }

    #[test]
    fn redacts_whole_note_object() {
        let payload = json!({
            "data": { "note": { "date": "2019-01-01", "sender": "bank", "content": "secret" } }
        });

        let redacted = redact_payload(&payload);

        assert_eq!(redacted["data"]["note"], REDACTED);
    }

    #[test]
    fn redacts_content_of_each_request_note() {
        let payload = json!({
            "data": {
                "requestId": "r-1",
                "notes": [{ "date": "2019-01-01", "sender": "bank", "content": "secret" }]
            }
        });

        let redacted = redact_payload(&payload);

        assert_eq!(redacted["data"]["notes"][0]["content"], REDACTED);
        assert_eq!(redacted["data"]["notes"][0]["sender"], "bank");
    }

    #[test]
    fn redacts_structured_document_content() {
        let payload = json!({
            "data": {
                "documents": [{
                    "id": "doc-1",
                    "content": { "base64": "JVBERi0xLjQK", "mime": "application/pdf" },
                    "metadata": null
                }]
            }
        });

        let redacted = redact_payload(&payload);
        let rendered = redacted.to_string();

        assert_eq!(redacted["data"]["documents"][0]["content"], REDACTED);
        assert_eq!(redacted["data"]["documents"][0]["id"], "doc-1");
        assert!(!rendered.contains("JVBERi0xLjQK"));
    }

    #[test]
    fn null_sensitive_values_stay_null() {
        let redacted = redact_payload(&json!({ "content": null }));
        assert!(redacted["content"].is_null());
    }

    #[test]
    fn non_json_preview_only_reports_size() {
        assert_eq!(redacted_preview(b"\x00\x01"), "<2 bytes, not JSON>");
    }
}
