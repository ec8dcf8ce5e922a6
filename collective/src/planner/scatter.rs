//! Binomial-tree scatter.
//!
//! Grounded on `coll_do_scatter` in
//! `prov/coll/src/coll_coll.c`: ranks are
//! addressed root-relative (`relative_rank = (rank - root) mod N`), a
//! non-root even-relative-rank node allocates scratch sized to however
//! many values it is due to forward, the root rotates its send buffer
//! into root-relative order when `root != 0`, and each node receives
//! once (at the lowest set bit of its relative rank) before forwarding
//! whatever it owes to its children on the way down.

use crate::buf::BufHandle;
use crate::datatype::Datatype;
use crate::error::CollError;
use crate::op::Operation;
use crate::util::lsb;

/// Scratch a scatter planner may need to keep alive for the lifetime of
/// the operation: the receive/forward buffer for non-root branch nodes,
/// or the root's root-relative reorder buffer.
pub struct Scratch {
    pub temp: Option<BufHandle>,
}

fn values_to_recv(relative_rank: usize, n: usize) -> usize {
    let mut nvalues = 1usize << (lsb(relative_rank as u64) - 1);
    if n < relative_rank + nvalues {
        nvalues = n - relative_rank;
    }
    nvalues
}

/// Schedules a binomial-tree scatter of `data` (meaningful only at
/// `root`) into `result`, `count` values of `datatype` per rank.
pub fn plan<Addr: Clone>(op: &mut Operation<Addr>, data: BufHandle, result: BufHandle, count: usize, root: usize, datatype: Datatype) -> Result<Scratch, CollError> {
    if count == 0 {
        return Ok(Scratch { temp: None });
    }

    let n = op.group.len();
    let local = op.group.local_rank().ok_or(CollError::InvalidArg("local rank absent from group"))?;
    let relative_rank = (local + n - root) % n;
    let nbytes = count * datatype.size();

    let mut cur_cnt = 0usize;
    let mut temp: Option<BufHandle> = None;

    if relative_rank != 0 && relative_rank % 2 == 0 {
        cur_cnt = count * values_to_recv(relative_rank, n);
        temp = Some(BufHandle::zeroed(cur_cnt * datatype.size()));
    }

    if local == root {
        cur_cnt = count * n;
        if root != 0 {
            let reorder = BufHandle::zeroed(cur_cnt * datatype.size());
            op.schedule_copy(data.sub(local * nbytes, (n - local) * nbytes), reorder.sub(0, (n - local) * nbytes), (n - local) * count, datatype, true)?;
            op.schedule_copy(data.sub(0, local * nbytes), reorder.sub((n - local) * nbytes, local * nbytes), local * count, datatype, true)?;
            temp = Some(reorder);
        }
    }

    let mut mask = 1usize;
    while mask < n {
        if relative_rank & mask != 0 {
            let remote = (local + n - mask) % n;
            if relative_rank % 2 == 1 {
                op.schedule_recv(remote, result.sub(0, nbytes), count, datatype, true)?;
            } else {
                let scratch = temp.as_ref().expect("branch node must have a receive scratch buffer");
                op.schedule_recv(remote, scratch.sub(0, cur_cnt * datatype.size()), cur_cnt, datatype, true)?;
            }
            break;
        }
        mask <<= 1;
    }

    // A leaf (odd relative_rank, non-root) never enters the send loop below
    // nor the even-relative-rank deposit, so `send_data` is never read for
    // it, mirroring the original where `send_data` is a harmless NULL for
    // leaves. Only the sites that actually dereference it may unwrap.
    let send_data: Option<BufHandle> = if local == root && root == 0 { Some(data.clone()) } else { temp.clone() };

    mask >>= 1;
    while mask > 0 {
        if relative_rank + mask < n {
            let send_cnt = cur_cnt - count * mask;
            debug_assert!(send_cnt > 0, "scatter planner invariant: send_cnt must be positive whenever relative_rank + mask < n");
            let remote = (local + mask) % n;
            let send_data = send_data.as_ref().expect("send data buffer must exist for a node with a child to forward to");
            op.schedule_send(remote, send_data.sub(mask * nbytes, send_cnt * datatype.size()), send_cnt, datatype, true)?;
            cur_cnt -= send_cnt;
        }
        mask >>= 1;
    }

    if relative_rank % 2 == 0 {
        let send_data = send_data.as_ref().expect("even relative_rank node must have a send data buffer to deposit from");
        op.schedule_copy(send_data.sub(0, nbytes), result.sub(0, nbytes), count, datatype, true)?;
    }

    Ok(Scratch { temp })
}
