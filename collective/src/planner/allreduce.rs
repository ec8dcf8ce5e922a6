//! Recursive-halving/doubling all-reduce.
//!
//! Grounded on `coll_do_allreduce` in
//! `prov/coll/src/coll_coll.c`: the fold-in
//! phase collapses a non-power-of-two rank count down to the next power
//! of two, the butterfly phase exchanges with `new_id XOR mask` at each
//! step, and the fold-out phase mirrors the fold-in to hand the result
//! back to the ranks that were folded out of the butterfly.

use crate::buf::{copy_bytes, BufHandle};
use crate::datatype::{Datatype, ReduceOp};
use crate::error::CollError;
use crate::op::Operation;
use crate::util::round_down_pow2;

/// Schedules a recursive-halving/doubling all-reduce of `send` into
/// `result`, using `tmp` as scratch for incoming partial reductions.
///
/// `send -> result` is copied immediately (unscheduled), so every work
/// item that follows operates on `result`/`tmp` rather than the
/// caller's original send buffer.
pub fn plan<Addr: Clone>(
    op: &mut Operation<Addr>,
    send: BufHandle,
    result: BufHandle,
    tmp: BufHandle,
    count: usize,
    datatype: Datatype,
    reduction: ReduceOp,
) -> Result<(), CollError> {
    let n = op.group.len() as u64;
    let local = op.group.local_rank().ok_or(CollError::InvalidArg("local rank absent from group"))? as u64;
    let nbytes = count * datatype.size();

    copy_bytes(&send, &result, nbytes);

    let pof2 = round_down_pow2(n);
    let rem = n - pof2;

    let mut new_id: Option<u64> = None;
    if local < 2 * rem {
        if local % 2 == 0 {
            op.schedule_send((local + 1) as usize, result.clone(), count, datatype, true)?;
        } else {
            op.schedule_recv((local - 1) as usize, tmp.clone(), count, datatype, true)?;
            op.schedule_reduce(tmp.clone(), result.clone(), count, datatype, reduction, true)?;
            new_id = Some(local / 2);
        }
    } else {
        new_id = Some(local - rem);
    }

    if let Some(new_id) = new_id {
        let mut mask = 1u64;
        while mask < pof2 {
            let partner_new = new_id ^ mask;
            let partner = if partner_new < rem { partner_new * 2 + 1 } else { partner_new + rem };

            op.schedule_recv(partner as usize, tmp.clone(), count, datatype, false)?;
            op.schedule_send(partner as usize, result.clone(), count, datatype, true)?;

            if partner < local {
                op.schedule_reduce(tmp.clone(), result.clone(), count, datatype, reduction, true)?;
            } else {
                op.schedule_reduce(result.clone(), tmp.clone(), count, datatype, reduction, true)?;
                op.schedule_copy(tmp.clone(), result.clone(), count, datatype, true)?;
            }
            mask <<= 1;
        }
    }

    if local < 2 * rem {
        if local % 2 == 1 {
            op.schedule_send((local - 1) as usize, result.clone(), count, datatype, true)?;
        } else {
            op.schedule_recv((local + 1) as usize, result.clone(), count, datatype, true)?;
        }
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
    fn single_rank_schedules_no_transfers() {
        let group = Rc::new(Group::new(vec![0usize], Some(0), 0).unwrap());
        let mut op = Operation::create(1, group, OpKind::AllReduce, 0, 0);
        let send = BufHandle::zeroed(4);
        let result = BufHandle::zeroed(4);
        let tmp = BufHandle::zeroed(4);
        plan(&mut op, send, result, tmp, 1, Datatype::Uint32, ReduceOp::Sum).unwrap();
        assert!(op.queue.is_empty());
    }
}
