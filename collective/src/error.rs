//! Error kinds surfaced by the collective engine.
//!
//! The workspace does not reach for `thiserror` or `anyhow` anywhere, so
//! this follows the same economy: a plain enum with a hand-written
//! `Display` impl.

use std::fmt;

/// An error the transport collaborator reports back to the engine.
///
/// This is opaque on purpose — the engine only needs to know that a
/// transfer failed, not why; the transport is free to carry richer
/// diagnostics in its own types and log them itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// Errors the core can surface to a caller.
///
/// Scheduling-time errors (`NoMemory`, `Unsupported`, `InvalidArg`) are
/// returned synchronously from the call that tried to schedule work.
/// `Transport` is only ever seen inside a completion event; the engine
/// does not retry or unwind on it (see the open gap noted in
/// [`crate::op::Operation`]'s module docs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollError {
    /// Allocation failure while scheduling work for an operation.
    NoMemory,
    /// The requested collective, reduction operator, or datatype is not
    /// supported, or `FI_COLLECTIVE`-equivalent join flags were absent.
    Unsupported(&'static str),
    /// A null or malformed attribute was passed to `query` or a
    /// collective entry point.
    InvalidArg(&'static str),
    /// The transport reported a failure while draining the ready queue.
    Transport(TransportError),
}

impl fmt::Display for CollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollError::NoMemory => write!(f, "allocation failure while scheduling collective work"),
            CollError::Unsupported(what) => write!(f, "unsupported: {what}"),
            CollError::InvalidArg(what) => write!(f, "invalid argument: {what}"),
            CollError::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CollError {}

impl From<TransportError> for CollError {
    fn from(e: TransportError) -> Self {
        CollError::Transport(e)
    }
}
