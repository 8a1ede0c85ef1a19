//! Replay and copy helpers for stored traces.
//!
//! Everything here is a pure function of a [`StoredTrace`]; the display layer
//! asks the aggregator for these strings instead of formatting records itself.

use serde_json::Value;
use url::Url;

use crate::trace_log::StoredTrace;

pub const NO_PAYLOAD: &str = "no payload";
pub const NO_RESPONSE: &str = "no response";

/// Build a cURL command line reproducing the call.
///
/// Shape: `curl -X METHOD "absolute-url" -H "Name: value" ... -d 'body'`.
/// Single quotes inside the body are closed, escaped and reopened.
pub fn curl_command(trace: &StoredTrace) -> String {
    let record = &trace.record;
    let mut cmd = format!("curl -X {} \"{}\"", record.method, trace.absolute_url);

    for header in &record.request_headers {
        cmd.push_str(&format!(" -H \"{}: {}\"", header.name, header.value));
    }

    if let Some(body) = record.payload.as_ref().and_then(body_text) {
        cmd.push_str(&format!(" -d '{}'", body.replace('\'', "'\\''")));
    }

    cmd
}

/// Body as sent on the wire: strings verbatim, structured values stringified.
fn body_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Pretty-print a body. String bodies holding JSON are parsed and re-indented;
/// anything that does not parse is returned raw.
pub fn pretty_body(value: &Value) -> String {
    match value {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed) if parsed.is_object() || parsed.is_array() => {
                serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| raw.clone())
            }
            _ => raw.clone(),
        },
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Copyable request payload. Without a body, the query parameters of the URL
/// stand in for it.
pub fn copy_payload(trace: &StoredTrace) -> String {
    if let Some(body) = trace
        .record
        .payload
        .as_ref()
        .filter(|v| body_text(v).is_some())
    {
        return pretty_body(body);
    }

    match query_params(&trace.absolute_url) {
        Some(params) => pretty_body(&params),
        None => NO_PAYLOAD.to_string(),
    }
}

pub fn copy_response(trace: &StoredTrace) -> String {
    match trace.record.response.as_ref().filter(|v| body_text(v).is_some()) {
        Some(body) => pretty_body(body),
        None => NO_RESPONSE.to_string(),
    }
}

fn query_params(url: &str) -> Option<Value> {
    let parsed = Url::parse(url).ok()?;
    let params: serde_json::Map<String, Value> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect();
    if params.is_empty() {
        None
    } else {
        Some(Value::Object(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_types::{FrameId, Header, TraceKind, TraceRecord};

    fn trace(
        method: &str,
        url: &str,
        payload: Option<Value>,
        response: Option<Value>,
    ) -> StoredTrace {
        StoredTrace {
            record: TraceRecord {
                id: "01HZX".to_string(),
                kind: TraceKind::Xhr,
                method: method.to_string(),
                url: url.to_string(),
                status: 200,
                request_headers: vec![
                    Header::new("Content-Type", "application/json"),
                    Header::new("X-Trace", "1"),
                ],
                payload,
                response,
                started_at: 0,
                duration_ms: 5,
                origin_frame_id: FrameId::HOST,
            },
            absolute_url: url.to_string(),
            display_time: "00:00:00".to_string(),
            repeat_count: 1,
            duplicate: false,
        }
    }

    #[test]
    fn test_curl_includes_headers_and_escaped_body() {
        let t = trace(
            "POST",
            "https://api.example.com/notes",
            Some(json!("{\"text\":\"it's\"}")),
            None,
        );
        assert_eq!(
            curl_command(&t),
            "curl -X POST \"https://api.example.com/notes\" \
             -H \"Content-Type: application/json\" -H \"X-Trace: 1\" \
             -d '{\"text\":\"it'\\''s\"}'"
        );
    }

    #[test]
    fn test_curl_stringifies_structured_body() {
        let t = trace("PUT", "https://api.example.com/a", Some(json!({"a": 1})), None);
        assert!(curl_command(&t).ends_with(" -d '{\"a\":1}'"));
    }

    #[test]
    fn test_curl_without_body_has_no_data_flag() {
        let t = trace("GET", "https://api.example.com/a", None, None);
        assert!(!curl_command(&t).contains(" -d "));
    }

    #[test]
    fn test_pretty_body_falls_back_to_raw() {
        assert_eq!(pretty_body(&json!("not json {")), "not json {");
        assert_eq!(pretty_body(&json!("{\"a\":1}")), "{\n  \"a\": 1\n}");
        assert_eq!(pretty_body(&json!("plain")), "plain");
    }

    #[test]
    fn test_copy_payload_uses_query_params_without_body() {
        let t = trace("GET", "https://api.example.com/users?page=2&q=x", None, None);
        let copied: Value = serde_json::from_str(&copy_payload(&t)).unwrap();
        assert_eq!(copied, json!({"page": "2", "q": "x"}));
    }

    #[test]
    fn test_placeholders_when_nothing_to_copy() {
        let t = trace("GET", "https://api.example.com/users", None, None);
        assert_eq!(copy_payload(&t), NO_PAYLOAD);
        assert_eq!(copy_response(&t), NO_RESPONSE);
    }

    #[test]
    fn test_copy_response_keeps_sentinel() {
        let t = trace(
            "GET",
            "https://api.example.com/users",
            None,
            Some(json!(shared_types::SENTINEL_NETWORK_ERROR)),
        );
        assert_eq!(copy_response(&t), "network-error");
    }
}
