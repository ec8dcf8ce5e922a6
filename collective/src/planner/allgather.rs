//! Ring all-gather.
//!
//! Grounded on `coll_do_allgather` in
//! `prov/coll/src/coll_coll.c`: each rank
//! deposits its own slice into `result` then, for `N - 1` rounds, sends
//! the slice it most recently received on to its right neighbor while
//! receiving the next slice from its left neighbor.

use crate::buf::BufHandle;
use crate::datatype::Datatype;
use crate::error::CollError;
use crate::op::Operation;

/// Schedules a ring all-gather of `send` into `result`, where `result`
/// holds `N` contiguous `count`-element slices, one per rank.
pub fn plan<Addr: Clone>(op: &mut Operation<Addr>, send: BufHandle, result: BufHandle, count: usize, datatype: Datatype) -> Result<(), CollError> {
    let n = op.group.len();
    let local = op.group.local_rank().ok_or(CollError::InvalidArg("local rank absent from group"))?;
    let stride = count * datatype.size();

    op.schedule_copy(send, result.sub(local * stride, stride), count, datatype, true)?;

    if n == 1 {
        return Ok(());
    }

    let left = (n + local - 1) % n;
    let right = (local + 1) % n;

    let mut cur = local;
    let mut next = left;
    for _ in 1..n {
        op.schedule_send(right, result.sub(cur * stride, stride), count, datatype, false)?;
        op.schedule_recv(left, result.sub(next * stride, stride), count, datatype, true)?;
        cur = next;
        next = (n + next - 1) % n;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Group;
    use crate::op::OpKind;
    use std::rc::Rc;

    #[test]
    fn single_rank_just_copies_locally() {
        let group = Rc::new(Group::new(vec![0usize], Some(0), 0).unwrap());
        let mut op = Operation::create(1, group, OpKind::AllGather, 0, 0);
        let send = BufHandle::zeroed(4);
        let result = BufHandle::zeroed(4);
        plan(&mut op, send, result, 1, Datatype::Uint32).unwrap();
        assert_eq!(op.queue.len(), 1);
    }
}
