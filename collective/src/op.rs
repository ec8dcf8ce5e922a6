//! The operation object.
//!
//! One `Operation` tracks a single in-flight collective: its work
//! queue, the group it runs over, and whatever kind-specific scratch
//! buffers its planner allocated. `queue` is a slab (`Vec<Option<_>>`)
//! rather than an intrusive linked list — an index-based arena gives
//! the same FIFO-with-holes behavior as the original's linked list
//! without exposing raw pointer surgery. A `None` entry is a reaped
//! item; an operation is fully drained once every entry is `None`.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::buf::BufHandle;
use crate::error::CollError;
use crate::group::Group;
use crate::item::{ItemHeader, WorkItem};
use crate::{Datatype, ReduceOp};

/// Identifies an in-flight operation within an endpoint.
pub type OpId = u64;

/// Which collective an operation realizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Join,
    Barrier,
    AllReduce,
    AllGather,
    Scatter,
    Broadcast,
}

/// Kind-specific scratch payload.
///
/// The union of all the planners' private buffers; the original's
/// `union util_coll_op_data` freed by kind in `coll_collective_comp`.
/// Here the scratch is simply dropped along with the `Operation` when
/// its queue drains — `Rc<RefCell<_>>` buffers free themselves once the
/// last work item referencing them is also gone.
pub enum OpScratch<Addr> {
    None,
    AllReduce { tmp: BufHandle },
    Barrier { result: BufHandle, tmp: BufHandle },
    Scatter { temp: Option<BufHandle> },
    Broadcast { chunk: BufHandle, padded: BufHandle },
    Join { result: BufHandle, tmp: BufHandle, new_group: Rc<Group<Addr>> },
}

/// One in-flight collective.
pub struct Operation<Addr> {
    pub id: OpId,
    pub cid: u32,
    pub kind: OpKind,
    pub flags: u64,
    pub context: u64,
    pub(crate) group: Rc<Group<Addr>>,
    pub(crate) queue: Vec<Option<WorkItem<Addr>>>,
    pub(crate) scratch: OpScratch<Addr>,
}

impl<Addr: Clone> Operation<Addr> {
    pub(crate) fn create(id: OpId, group: Rc<Group<Addr>>, kind: OpKind, flags: u64, context: u64) -> Self {
        let cid = group.next_cid();
        Operation { id, cid, kind, flags, context, group, queue: Vec::new(), scratch: OpScratch::None }
    }

    fn local_rank(&self) -> Result<usize, CollError> {
        self.group.local_rank().ok_or(CollError::InvalidArg("local rank absent from group"))
    }

    /// Appends a `Send` item to the queue's tail.
    pub(crate) fn schedule_send(&mut self, dest_rank: usize, buf: BufHandle, count: usize, datatype: Datatype, fence: bool) -> Result<(), CollError> {
        debug_assert_eq!(buf.len(), count * datatype.size());
        let local_rank = self.local_rank()?;
        let tag = (self.cid as u64) | ((local_rank as u64) << 32);
        let remote_addr = self.group.lookup(dest_rank);
        self.queue.push(Some(WorkItem::Send {
            header: ItemHeader::new(self.id, fence),
            remote_rank: dest_rank,
            remote_addr,
            tag,
            buf,
            count,
            datatype,
        }));
        Ok(())
    }

    /// Appends a `Recv` item to the queue's tail.
    pub(crate) fn schedule_recv(&mut self, src_rank: usize, buf: BufHandle, count: usize, datatype: Datatype, fence: bool) -> Result<(), CollError> {
        debug_assert_eq!(buf.len(), count * datatype.size());
        // local_rank is not needed for the tag itself, but a recv against
        // a group we are not a member of cannot be meaningfully scheduled.
        self.local_rank()?;
        let tag = (self.cid as u64) | ((src_rank as u64) << 32);
        let remote_addr = self.group.lookup(src_rank);
        self.queue.push(Some(WorkItem::Recv {
            header: ItemHeader::new(self.id, fence),
            remote_rank: src_rank,
            remote_addr,
            tag,
            buf,
            count,
            datatype,
        }));
        Ok(())
    }

    /// Appends a `Reduce` item to the queue's tail.
    pub(crate) fn schedule_reduce(&mut self, in_buf: BufHandle, inout_buf: BufHandle, count: usize, datatype: Datatype, op: ReduceOp, fence: bool) -> Result<(), CollError> {
        self.queue.push(Some(WorkItem::Reduce { header: ItemHeader::new(self.id, fence), in_buf, inout_buf, count, datatype, op }));
        Ok(())
    }

    /// Appends a `Copy` item to the queue's tail.
    pub(crate) fn schedule_copy(&mut self, in_buf: BufHandle, out_buf: BufHandle, count: usize, datatype: Datatype, fence: bool) -> Result<(), CollError> {
        self.queue.push(Some(WorkItem::Copy { header: ItemHeader::new(self.id, fence), in_buf, out_buf, count, datatype }));
        Ok(())
    }

    /// Appends the terminal `Completion` item, always fenced.
    pub(crate) fn schedule_completion(&mut self) {
        self.queue.push(Some(WorkItem::Completion { header: ItemHeader::new(self.id, true) }));
    }
}
