//! Transport failure classification.
//!
//! Classification happens once, at the transport boundary. In priority
//! order:
//!
//! 1. No response at all: transient, no message. The run session's retry
//!    budget decides when this becomes fatal.
//! 2. A response with a recognised error body: fatal, the server's message
//!    followed by any per-offspring rejection reasons.
//! 3. Any other response, or a success body that cannot be decoded: fatal,
//!    with a generic message naming the status code.

use evo_core::error::ClassifiedError;
use reqwest::StatusCode;

use crate::messages::parse_error_body;
use crate::transport::TransportError;

/// Shown when a success response could not be decoded.
pub const MALFORMED_RESPONSE_MESSAGE: &str =
    "An error has occurred: the server sent a response that could not be read";

/// Map a transport failure to a transient or fatal error with a message.
pub fn classify(failure: &TransportError) -> ClassifiedError {
    match failure {
        TransportError::Connection(_) => ClassifiedError::transient(),
        TransportError::Status {
            status,
            content_type,
            body,
        } => {
            let structured = accepts_json(content_type.as_deref())
                .then(|| parse_error_body(body))
                .flatten();
            match structured {
                Some(error_body) => ClassifiedError::fatal(error_body.describe()),
                None => ClassifiedError::fatal(generic_message(*status)),
            }
        }
        TransportError::Malformed(_) => ClassifiedError::fatal(MALFORMED_RESPONSE_MESSAGE),
    }
}

/// Error bodies are only parsed when they claim to be JSON, or when the
/// server did not say what they are.
fn accepts_json(content_type: Option<&str>) -> bool {
    content_type.map_or(true, |ct| ct.contains("json"))
}

fn generic_message(status: u16) -> String {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown status");
    format!("An error has occurred: request failed with {reason} ({status})")
}
