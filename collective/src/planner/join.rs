//! Join as all-reduce of a group-id bitmask.
//!
//! Grounded on `coll_join_collective`/`coll_join_comp` in
//! `prov/coll/src/coll_coll.c`: every rank
//! all-reduces its endpoint's live group-id bitmask under `BAND`; the
//! lowest set bit left in the reduced mask becomes the new group's
//! `group_id`, and each endpoint clears that bit from its own mask to
//! claim the id (`coll_join_comp`'s `ofi_bitmask_unset`).
//!
//! The original carries an arbitrary-width bitmask
//! (`OFI_MAX_GROUP_ID` bits via `ofi_bitmask`); this core narrows that
//! to a 64-bit mask (`u64`), which still leaves 64 concurrently
//! joinable group ids per endpoint and keeps the reduction inside the
//! fixed `Uint64`/`Band` combination every `ReduceKernel` must support.

use crate::buf::BufHandle;
use crate::datatype::{Datatype, ReduceOp};
use crate::error::CollError;
use crate::op::Operation;
use crate::planner::allreduce;

/// Scratch kept alive for the life of a join operation.
pub struct Scratch {
    pub result: BufHandle,
    pub tmp: BufHandle,
}

/// Schedules a join: an all-reduce of `cid_mask` under `BAND`, over the
/// parent group the join is issued against.
pub fn plan<Addr: Clone>(op: &mut Operation<Addr>, cid_mask: u64) -> Result<Scratch, CollError> {
    let send = BufHandle::zeroed(8);
    send.with_slice_mut(|s| s.copy_from_slice(&cid_mask.to_ne_bytes()));
    let result = BufHandle::zeroed(8);
    let tmp = BufHandle::zeroed(8);

    allreduce::plan(op, send, result.clone(), tmp.clone(), 1, Datatype::Uint64, ReduceOp::Band)?;

    Ok(Scratch { result, tmp })
}

/// Reads the lowest set bit out of a completed join's reduced mask, as
/// a 0-based group id.
///
/// Returns `None` if every candidate id was already claimed (the mask
/// reduced to zero) — `coll_join_comp` has no analogous check and would
/// call `ofi_bitmask_get_lsbset` on an empty mask; here that is surfaced
/// as [`CollError::Unsupported`] by the caller instead.
pub fn lowest_free_group_id(result: &BufHandle) -> Option<u16> {
    let mask = result.with_slice(|s| u64::from_ne_bytes(s.try_into().unwrap()));
    if mask == 0 {
        None
    } else {
        Some(mask.trailing_zeros() as u16)
    }
}
