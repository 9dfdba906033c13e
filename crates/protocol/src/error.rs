//! Error types for the protocol crate.

/// Errors produced while building frames.
///
/// Framing and checksum failures on the receive path are not errors at
/// this level; the stream decoder reports them through
/// [`DecodeResult::Corrupt`](crate::frame::DecodeResult) so the transport
/// can resynchronize without failing the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
