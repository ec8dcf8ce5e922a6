//! Work item model.
//!
//! [`WorkItem`] is a tagged union (a Rust `enum`) of the five scheduled
//! action kinds; every variant carries a shared [`ItemHeader`]. This
//! replaces the original's inheritance-by-pointer-cast (a shared struct
//! prefix cast to whichever concrete item type a tag names) with a sum
//! type the progress engine dispatches on directly.

use crate::buf::BufHandle;
use crate::datatype::{Datatype, ReduceOp};
use crate::op::OpId;

/// A work item's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Waiting,
    Processing,
    Complete,
}

/// Fields common to every work item variant.
#[derive(Debug, Clone, Copy)]
pub struct ItemHeader {
    pub state: State,
    pub fence: bool,
    pub op: OpId,
}

impl ItemHeader {
    pub(crate) fn new(op: OpId, fence: bool) -> Self {
        ItemHeader { state: State::Waiting, fence, op }
    }
}

/// A single scheduled action belonging to an [`crate::op::Operation`].
///
/// Constructed only through `Operation::schedule_*`, which sets
/// `state = WAITING`, wires the header to the owning operation, and
/// appends to the queue tail; nothing ever reorders an existing item.
///
/// `Clone`: the progress engine dispatches from a clone taken out of the
/// operation's queue (so its dispatch logic never holds a borrow of the
/// owning operation while it talks to the transport or reduction
/// kernel); clones share the same underlying [`BufHandle`] storage, so
/// cloning is cheap and does not copy buffer contents.
#[derive(Clone)]
pub enum WorkItem<Addr> {
    /// Send `count` values of `datatype` to `remote_rank`.
    Send { header: ItemHeader, remote_rank: usize, remote_addr: Addr, tag: u64, buf: BufHandle, count: usize, datatype: Datatype },
    /// Receive `count` values of `datatype` from `remote_rank`.
    Recv { header: ItemHeader, remote_rank: usize, remote_addr: Addr, tag: u64, buf: BufHandle, count: usize, datatype: Datatype },
    /// `inout := op(inout, in)`, elementwise.
    Reduce { header: ItemHeader, in_buf: BufHandle, inout_buf: BufHandle, count: usize, datatype: Datatype, op: ReduceOp },
    /// `out := in`, byte-for-byte.
    Copy { header: ItemHeader, in_buf: BufHandle, out_buf: BufHandle, count: usize, datatype: Datatype },
    /// No payload; always fenced; triggers the operation's completion.
    Completion { header: ItemHeader },
}

impl<Addr> WorkItem<Addr> {
    pub fn header(&self) -> &ItemHeader {
        match self {
            WorkItem::Send { header, .. }
            | WorkItem::Recv { header, .. }
            | WorkItem::Reduce { header, .. }
            | WorkItem::Copy { header, .. }
            | WorkItem::Completion { header } => header,
        }
    }

    pub fn header_mut(&mut self) -> &mut ItemHeader {
        match self {
            WorkItem::Send { header, .. }
            | WorkItem::Recv { header, .. }
            | WorkItem::Reduce { header, .. }
            | WorkItem::Copy { header, .. }
            | WorkItem::Completion { header } => header,
        }
    }

    /// Short tag for logging, matching `log_util_coll_state`'s sibling
    /// per-type debug logging in the original.
    pub fn kind_name(&self) -> &'static str {
        match self {
            WorkItem::Send { .. } => "send",
            WorkItem::Recv { .. } => "recv",
            WorkItem::Reduce { .. } => "reduce",
            WorkItem::Copy { .. } => "copy",
            WorkItem::Completion { .. } => "completion",
        }
    }
}
