//! The collaborator seams the engine drives.
//!
//! The engine schedules and orders work; it never moves a byte or
//! opens a socket itself. Everything that would actually touch the
//! network, a reduction ALU, or a user-facing completion queue is a
//! trait here, implemented by whatever transport/CQ a caller brings —
//! `collective` itself ships no transport.

use crate::buf::BufHandle;
use crate::error::{CollError, TransportError};
use crate::group::Group;
use crate::op::OpKind;
use std::rc::Rc;

/// Opaque handle the engine hands to a transport when posting a
/// transfer, and the transport hands back through
/// [`Transport::poll_completions`] once that transfer finishes.
///
/// Stands in for the original's `cqe->op_context = item` — a raw
/// pointer to the work item, used only for identity.
pub type WorkToken = u64;

/// Outcome of attempting to post one send or receive.
pub enum PostResult {
    /// Accepted; a completion (or error) for this token will arrive
    /// through [`Transport::poll_completions`].
    Posted,
    /// Transient back-pressure; the engine will re-enqueue this item
    /// and retry on the next drive.
    Retry,
    /// Hard failure posting the transfer.
    Err(TransportError),
}

/// The tagged point-to-point transport the engine schedules onto.
///
/// `send_tagged`/`recv_tagged` return immediately with a [`PostResult`]
/// (the original's `fi_tsendmsg`/`fi_trecvmsg`); actual completion is
/// reported later, polled via [`Transport::poll_completions`] from the
/// endpoint's external progress tick rather than pushed through a
/// callback, so that the engine and the transport never need a cyclic
/// `Rc` back-reference to each other. See DESIGN.md for why this
/// realizes the original's `xfer_complete`/`xfer_error` callbacks as a
/// poll instead.
///
/// Both methods take an owned [`BufHandle`] rather than a borrowed
/// slice: a real async transport (DMA, RDMA) must keep the buffer
/// reachable until the transfer completes, which can be long after the
/// posting call returns. A borrowed slice cannot outlive that call in
/// safe Rust; `BufHandle`'s `Rc`-shared storage can.
pub trait Transport {
    /// The address type the address vector collaborator resolves ranks
    /// to; opaque to the engine beyond handing it back here.
    type Addr: Clone;

    /// Posts a send of `buf` to `addr`, tagged `tag`.
    fn send_tagged(&mut self, addr: &Self::Addr, tag: u64, token: WorkToken, buf: BufHandle) -> PostResult;

    /// Posts a receive into `buf` from `addr`, tagged `tag`.
    fn recv_tagged(&mut self, addr: &Self::Addr, tag: u64, token: WorkToken, buf: BufHandle) -> PostResult;

    /// Drains whatever transfer completions (or errors) have arrived
    /// since the last call. Called once per external progress tick,
    /// before the ready queue is drained.
    fn poll_completions(&mut self) -> Vec<(WorkToken, Result<(), TransportError>)>;
}

/// An event the core publishes once a collective (or join) completes.
///
/// The Rust shape of writing to the peer CQ/EQ in the original's
/// `coll_collective_comp` / `coll_join_comp`; the CQ/EQ themselves stay
/// an external collaborator this crate never implements.
pub enum CollectiveEvent<Addr> {
    /// A barrier/all-reduce/all-gather/scatter/broadcast finished.
    Completed { context: u64, kind: OpKind },
    /// A join finished; `group` is the newly formed group.
    JoinCompleted { context: u64, group: Rc<Group<Addr>> },
    /// A join's all-reduce completed but left no free group id in the
    /// reduced mask (the original's `coll_join_comp` calls
    /// `ofi_bitmask_get_lsbset` with no check for an empty mask). This
    /// surfaces as [`CollError::Unsupported`] here rather than a
    /// `join()` return value, since the failure is only known once the
    /// all-reduce across the group completes.
    JoinFailed { context: u64, error: CollError },
}

/// Receives [`CollectiveEvent`]s as operations complete.
pub trait CompletionSink<Addr> {
    fn notify(&mut self, event: CollectiveEvent<Addr>);
}
