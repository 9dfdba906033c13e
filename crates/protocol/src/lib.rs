//! Wire protocol for the LCS lighting-control bus.
//!
//! Pure byte-level code: no I/O, no tasks. The crate covers three layers:
//!
//! - [`frame`]: the binary frame codec (STX/length/addresses/opcode/data/
//!   BCC/ETX) and the incremental stream decoder.
//! - [`command`]: validated builders that turn lighting intents into
//!   request frames.
//! - [`response`]: the interpreter mapping response frames to typed
//!   values.
//!
//! Transports feed received bytes into [`frame::try_decode`] and write
//! [`Frame::encode`](frame::Frame::encode) output; everything else in the
//! gateway works with [`Frame`](frame::Frame) and
//! [`TypedResponse`](response::TypedResponse).

pub mod command;
pub mod constants;
pub mod error;
pub mod frame;
pub mod response;
pub mod types;

pub use error::ProtocolError;
pub use frame::{DecodeResult, Frame};
pub use response::{ResponseKind, TypedResponse};
pub use types::{DeviceType, SourceDevice};
