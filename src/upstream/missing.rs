//! Recognition of "no block at this slot" answers.
//!
//! Standard beacon nodes answer 404. Some Prysm releases instead fail with one of
//! the messages below, so error bodies are matched against them. Matching stays
//! in this module; everything else sees [`BlockOutcome`](super::BlockOutcome).

/// Error messages that mean the slot has no block.
pub const MISSING_BLOCK_INDICATORS: &[&str] = &[
    "Could not get block from block ID: rpc error: code = NotFound",
    "rpc error: code = NotFound desc = Could not find requested block: signed beacon block can't be nil",
    "Could not reconstruct full execution payload to create signed beacon block: block hash field in execution header",
];

const HTTP_NOT_FOUND: u16 = 404;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// The slot has no block; record it as empty.
    Missing,
    /// Any other failure; aborts the ingestion cycle.
    Fatal,
}

pub fn is_missing_block_message(message: &str) -> bool {
    MISSING_BLOCK_INDICATORS
        .iter()
        .any(|indicator| message.contains(indicator))
}

/// Classifies a non-success upstream response.
pub fn classify_error_response(status: u16, body: &str) -> ResponseClass {
    if status == HTTP_NOT_FOUND || is_missing_block_message(body) {
        ResponseClass::Missing
    } else {
        ResponseClass::Fatal
    }
}
