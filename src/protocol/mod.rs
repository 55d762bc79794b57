//! TLV wire protocol spoken between agencies and the intake server.
//!
//! Every field on the wire is `TAG (1 byte) | LENGTH (u32 BE) | VALUE`.
//! A bet record is a container whose value is a concatenation of nested
//! fields. Requests and responses are introduced by a single tag byte:
//!
//! ```text
//! B <len> <fields>            upload a single bet
//! Z <count> (B <len> <fields>)*  upload a batch of bets
//! F                           agency finished uploading
//! P <agency u32>              poll winners for an agency
//!
//! O                           upload acknowledged
//! Y                           draw not performed yet, retry later
//! W <count> (D <len> <doc>)*  winning documents
//! ```
//!
//! All bet sub-fields, including agency and number, travel as UTF-8 text.

pub mod bet;
pub mod request;
pub mod response;
pub mod tlv;

pub use bet::{Bet, BetBuilder, BetField};
pub use request::Request;
pub use response::Response;

use std::io;

/// Coarse classification of a codec failure.
///
/// Every kind is fatal to the connection it happened on, but callers log and
/// count them differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The byte stream does not follow the TLV layout.
    Framing,
    /// The layout is fine but a record is incomplete or not valid text.
    Validation,
    /// The underlying socket failed or closed mid-message.
    Transport,
}

/// Errors produced while decoding or encoding protocol messages
#[derive(Debug)]
pub enum CodecError {
    /// Socket read/write failure, including EOF in the middle of a message
    Transport(io::Error),
    /// First byte of a request is not a known request tag
    UnknownRequest(u8),
    /// First byte of a response is not a known response tag
    UnknownResponse(u8),
    /// A specific tag was required at this position
    UnexpectedTag { expected: u8, found: u8 },
    /// Tag inside a bet container is not one of the bet sub-field tags
    UnknownField(u8),
    /// A sub-field header or value runs past its container's declared length
    Truncated { tag: Option<u8> },
    /// Declared length exceeds what the server is willing to buffer
    TooLong { length: u32, max: usize },
    /// A mandatory bet sub-field was never set (or set to an empty value)
    MissingField(BetField),
    /// A bet sub-field is not valid UTF-8
    InvalidText(BetField),
    /// Value too large to be described by a u32 length prefix
    ValueTooLarge(usize),
}

impl CodecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::Transport(_) => ErrorKind::Transport,
            CodecError::MissingField(_) | CodecError::InvalidText(_) => ErrorKind::Validation,
            CodecError::UnknownRequest(_)
            | CodecError::UnknownResponse(_)
            | CodecError::UnexpectedTag { .. }
            | CodecError::UnknownField(_)
            | CodecError::Truncated { .. }
            | CodecError::TooLong { .. }
            | CodecError::ValueTooLarge(_) => ErrorKind::Framing,
        }
    }
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Transport(e) => write!(f, "Transport error: {}", e),
            CodecError::UnknownRequest(tag) => {
                write!(f, "Unknown request tag: {}", printable(*tag))
            }
            CodecError::UnknownResponse(tag) => {
                write!(f, "Unknown response tag: {}", printable(*tag))
            }
            CodecError::UnexpectedTag { expected, found } => write!(
                f,
                "Unexpected tag: expected {}, found {}",
                printable(*expected),
                printable(*found)
            ),
            CodecError::UnknownField(tag) => write!(f, "Unknown bet field tag: {}", printable(*tag)),
            CodecError::Truncated { tag: Some(tag) } => {
                write!(f, "Field {} overruns its bet record", printable(*tag))
            }
            CodecError::Truncated { tag: None } => {
                write!(f, "Bet record ends in the middle of a field header")
            }
            CodecError::TooLong { length, max } => {
                write!(f, "Declared length {} exceeds maximum of {}", length, max)
            }
            CodecError::MissingField(field) => write!(f, "Invalid bet: no {} provided", field),
            CodecError::InvalidText(field) => write!(f, "Invalid bet: {} is not valid UTF-8", field),
            CodecError::ValueTooLarge(len) => {
                write!(f, "Value of {} bytes does not fit a length prefix", len)
            }
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        CodecError::Transport(e)
    }
}

/// Render a tag byte for error messages: ASCII letters as-is, others in hex.
fn printable(tag: u8) -> String {
    if tag.is_ascii_graphic() {
        format!("'{}'", tag as char)
    } else {
        format!("0x{:02x}", tag)
    }
}
