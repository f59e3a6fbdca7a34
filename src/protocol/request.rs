//! Incremental request parser.
//!
//! Parses the line-oriented HTTP-style request format:
//! request line, header lines, blank line, optional body. The parser is
//! fed the connection's read buffer and reports how many bytes a complete
//! request consumed, so the connection loop can `advance` past it.
//!
//! Body framing honors a `Content-Length` header when one is present;
//! without one, the body is whatever bytes already follow the blank line
//! in the buffer (many existing clients do not send a length).

use std::collections::HashMap;
use std::fmt;

/// Case-sensitive literal prefix for the bearer token header.
const BEARER_PREFIX: &str = "Authorization: Bearer ";

/// A parsed request. Immutable once produced.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    /// Query parameters; a duplicated key keeps its last occurrence.
    pub query: HashMap<String, String>,
    /// Token from an `Authorization: Bearer ` header line, if any.
    pub bearer_token: Option<String>,
    pub body: String,
}

impl Request {
    /// Look up a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}

/// Structural parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Request line is missing a method or path delimiter.
    BadRequestLine,
    /// Request head is not valid UTF-8.
    InvalidEncoding,
    /// Declared `Content-Length` cannot frame a body in this buffer.
    UnrepresentableLength,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::BadRequestLine => write!(f, "malformed request line"),
            ParseError::InvalidEncoding => write!(f, "request head is not valid UTF-8"),
            ParseError::UnrepresentableLength => write!(f, "unrepresentable content length"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse result over the connection's read buffer.
#[derive(Debug)]
pub enum ParseResult {
    /// Successfully parsed a request spanning this many buffer bytes.
    Complete(Request, usize),
    /// Need more data.
    Incomplete,
    /// Structural error; the request can never become valid.
    Error(ParseError),
}

/// Try to parse one request from the front of `input`.
pub fn parse(input: &[u8]) -> ParseResult {
    // The head is complete once the blank-line separator has arrived.
    let head_end = match find_head_end(input) {
        Some(pos) => pos,
        None => return ParseResult::Incomplete,
    };

    let head = match std::str::from_utf8(&input[..head_end]) {
        Ok(head) => head,
        Err(_) => return ParseResult::Error(ParseError::InvalidEncoding),
    };

    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or("");

    let (method, target) = match split_request_line(request_line) {
        Some(parts) => parts,
        None => return ParseResult::Error(ParseError::BadRequestLine),
    };

    // Split the target into path and query string.
    let (path, query) = match target.split_once('?') {
        Some((path, query_string)) => (path, parse_query(query_string)),
        None => (target, HashMap::new()),
    };

    // Scan header lines for the bearer token and an optional body length.
    let mut bearer_token = None;
    let mut content_length = None;
    for line in lines {
        if let Some(token) = line.strip_prefix(BEARER_PREFIX) {
            bearer_token = Some(token.to_string());
        } else if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse::<usize>().ok();
            }
        }
    }

    let body_start = head_end + 4;
    let (body_end, consumed) = match content_length {
        Some(len) => {
            // A length the buffer arithmetic cannot represent is hostile,
            // not merely incomplete.
            let end = match body_start.checked_add(len) {
                Some(end) => end,
                None => return ParseResult::Error(ParseError::UnrepresentableLength),
            };
            if input.len() < end {
                return ParseResult::Incomplete;
            }
            (end, end)
        }
        // No declared length: take what has already arrived.
        None => (input.len(), input.len()),
    };

    let body = String::from_utf8_lossy(&input[body_start..body_end]).into_owned();

    let request = Request {
        method: method.to_string(),
        path: path.to_string(),
        query,
        bearer_token,
        body,
    };

    ParseResult::Complete(request, consumed)
}

/// Split `METHOD SP TARGET SP VERSION`; both delimiters must be present.
fn split_request_line(line: &str) -> Option<(&str, &str)> {
    let (method, rest) = line.split_once(' ')?;
    let (target, _version) = rest.split_once(' ')?;
    if method.is_empty() || target.is_empty() {
        return None;
    }
    Some((method, target))
}

/// Parse `a=1&b=2` into a map. The last occurrence of a key wins.
fn parse_query(query_string: &str) -> HashMap<String, String> {
    let mut query = HashMap::new();
    for pair in query_string.split('&') {
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((key, value)) => query.insert(key.to_string(), value.to_string()),
            None => query.insert(pair.to_string(), String::new()),
        };
    }
    query
}

/// Find the `\r\n\r\n` head/body separator, returning the head length.
fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}
