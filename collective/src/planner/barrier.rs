//! Barrier as all-reduce of a rank mask.
//!
//! Grounded on `coll_ep_barrier`/`coll_ep_barrier2` in
//! `prov/coll/src/coll_coll.c`: every rank
//! sends `~local_rank` into a bitwise-AND all-reduce; no rank's
//! completion item runs until every rank's fold-in/butterfly/fold-out
//! exchange has, which is what makes this a barrier rather than a
//! pointless reduction.

use crate::buf::BufHandle;
use crate::datatype::{Datatype, ReduceOp};
use crate::error::CollError;
use crate::op::Operation;
use crate::planner::allreduce;

/// Scratch kept alive for the life of a barrier operation.
pub struct Scratch {
    pub result: BufHandle,
    pub tmp: BufHandle,
}

/// Schedules a barrier: an all-reduce of `!local_rank` under `BAND`.
pub fn plan<Addr: Clone>(op: &mut Operation<Addr>) -> Result<Scratch, CollError> {
    let local = op.group.local_rank().ok_or(CollError::InvalidArg("local rank absent from group"))? as u64;
    let send = BufHandle::zeroed(8);
    send.with_slice_mut(|s| s.copy_from_slice(&(!local).to_ne_bytes()));
    let result = BufHandle::zeroed(8);
    let tmp = BufHandle::zeroed(8);

    allreduce::plan(op, send, result.clone(), tmp.clone(), 1, Datatype::Uint64, ReduceOp::Band)?;

    Ok(Scratch { result, tmp })
}
