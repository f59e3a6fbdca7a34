//! Wire protocol: request parsing and response framing.
//!
//! The protocol is a line-oriented HTTP subset over a plain TCP stream:
//! a request line, header lines, a blank line, and an optional JSON body.
//! Responses carry a fixed `{"status":...,"data":...}` JSON envelope.

pub mod request;
pub mod response;
