//! JSON response envelope and HTTP-style framing.
//!
//! Every handler result is wrapped in `{"status":...,"data":...}`. The
//! envelope sniffs its payload: a string starting with `{` or `[` is taken
//! as pre-serialized JSON and embedded verbatim, anything else becomes a
//! quoted JSON string. Handlers that build their payloads with serde_json
//! rely on the verbatim path to avoid double escaping.

use serde_json::Value;

/// Build the JSON envelope body for a response.
///
/// Field order is fixed (`status` first), so the envelope is assembled by
/// hand; string payloads go through serde_json for correct escaping.
pub fn envelope(status: &str, data: &str) -> String {
    let payload = if data.is_empty() {
        "\"\"".to_string()
    } else if matches!(data.as_bytes()[0], b'{' | b'[') {
        data.to_string()
    } else {
        Value::String(data.to_string()).to_string()
    };

    format!("{{\"status\":\"{}\",\"data\":{}}}", status, payload)
}

/// Success envelope.
pub fn success(data: &str) -> String {
    envelope("success", data)
}

/// Error envelope.
pub fn error(message: &str) -> String {
    envelope("error", message)
}

/// Frame an envelope body as a complete 200 response.
///
/// Business-level failures still ride a 200 status line; only structural
/// protocol errors get a non-200 line (see [`bad_request`]).
pub fn ok(body: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(128 + body.len());
    out.extend_from_slice(b"HTTP/1.1 200 OK\r\n");
    out.extend_from_slice(b"Content-Type: application/json\r\n");
    out.extend_from_slice(b"Access-Control-Allow-Origin: *\r\n");
    out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body.as_bytes());
    out
}

/// Literal response for a structurally unparseable request.
pub fn bad_request() -> &'static [u8] {
    b"HTTP/1.1 400 Bad Request\r\n\r\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload() {
        assert_eq!(envelope("success", ""), r#"{"status":"success","data":""}"#);
    }

    #[test]
    fn test_json_array_embedded_verbatim() {
        assert_eq!(
            envelope("success", "[1,2]"),
            r#"{"status":"success","data":[1,2]}"#
        );
    }

    #[test]
    fn test_json_object_embedded_verbatim() {
        assert_eq!(
            envelope("success", r#"{"user_id":1}"#),
            r#"{"status":"success","data":{"user_id":1}}"#
        );
    }

    #[test]
    fn test_plain_string_quoted() {
        assert_eq!(envelope("error", "bad"), r#"{"status":"error","data":"bad"}"#);
    }

    #[test]
    fn test_string_with_quotes_escaped() {
        assert_eq!(
            envelope("error", r#"say "hi""#),
            r#"{"status":"error","data":"say \"hi\""}"#
        );
    }

    #[test]
    fn test_framed_response() {
        let body = success("done");
        let framed = ok(&body);
        let text = String::from_utf8(framed).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(text.contains(&format!("Content-Length: {}\r\n", body.len())));
        assert!(text.ends_with(&body));
    }
}
