//! A software collective-communication engine: group operations
//! (barrier, all-reduce, all-gather, scatter, broadcast, group join)
//! scheduled and driven to completion over an externally supplied
//! tagged point-to-point transport.
//!
//! This crate does not open a socket or move a byte on its own — see
//! [`transport::Transport`], [`reduce::ReduceKernel`], and
//! [`transport::CompletionSink`] for the seams a caller plugs in. What it
//! does own is the hard part: per-collective work queues with fencing
//! between items, a ready queue driven by an external progress tick, and
//! the two communication algorithms (recursive-halving/doubling
//! all-reduce, binomial-tree scatter) the rest of the collectives are
//! expressed in terms of.
//!
//! [`endpoint::Endpoint`] is the entry point: it owns in-flight
//! operations and exposes one method per collective
//! ([`endpoint::Endpoint::join`], [`endpoint::Endpoint::barrier`],
//! [`endpoint::Endpoint::allreduce`], [`endpoint::Endpoint::allgather`],
//! [`endpoint::Endpoint::scatter`], [`endpoint::Endpoint::broadcast`]).

pub mod buf;
pub mod datatype;
pub mod endpoint;
pub mod error;
pub mod group;
pub mod item;
pub mod log_events;
pub mod op;
pub mod planner;
pub mod progress;
pub mod reduce;
pub mod transport;
mod util;

pub use buf::{BufHandle, SharedBuffer};
pub use datatype::{Datatype, ReduceOp};
pub use endpoint::{CollAttr, Endpoint};
pub use error::{CollError, TransportError};
pub use group::{Group, MAX_MEMBERS};
pub use item::{ItemHeader, State, WorkItem};
pub use log_events::CollEvent;
pub use op::{OpId, OpKind, Operation};
pub use reduce::{ReduceKernel, StandardReduceKernel};
pub use transport::{CollectiveEvent, CompletionSink, PostResult, Transport, WorkToken};

/// Join flag requesting a collective-capable group (`FI_COLLECTIVE` in
/// the original). Its absence is an `Unsupported` trigger for
/// [`Endpoint::join`].
pub const FI_COLLECTIVE: u64 = 1 << 0;
