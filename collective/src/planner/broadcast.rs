//! Broadcast as scatter-then-all-gather.
//!
//! Grounded on `coll_ep_broadcast` in
//! `prov/coll/src/coll_coll.c`: split `buf`
//! into `chunk_cnt = ceil(count / N)`-sized chunks, scatter one chunk
//! per rank from `root`, then all-gather the chunks back into every
//! rank's full buffer.
//!
//! One deviation from the original, recorded in DESIGN.md: the source
//! scatters and all-gathers directly against the caller's `count`-sized
//! buffer, which it reads and writes past the end of whenever `count`
//! isn't a multiple of `N` (`chunk_cnt * N > count`) and `root != 0` —
//! undefined behavior in C, an out-of-bounds panic in safe Rust. This
//! planner instead runs the scatter/all-gather pair against a `chunk_cnt
//! * N`-sized padded scratch buffer and copies the caller's real
//! `count` bytes in (at the root) and back out (at every rank) as the
//! first and last scheduled items, which keeps every intermediate
//! offset in bounds without changing the result for any of the real
//! `count` elements.

use crate::buf::BufHandle;
use crate::datatype::Datatype;
use crate::error::CollError;
use crate::op::Operation;
use crate::planner::{allgather, scatter};

/// Scratch kept alive for the life of a broadcast operation.
pub struct Scratch {
    pub chunk: BufHandle,
    pub padded: BufHandle,
    pub scatter_temp: Option<BufHandle>,
}

/// Schedules a broadcast of `buf` (`count` values of `datatype`,
/// meaningful only at `root` on entry) to every rank in the group.
pub fn plan<Addr: Clone>(op: &mut Operation<Addr>, buf: BufHandle, count: usize, root: usize, datatype: Datatype) -> Result<Scratch, CollError> {
    let n = op.group.len();
    let local = op.group.local_rank().ok_or(CollError::InvalidArg("local rank absent from group"))?;

    let mut chunk_cnt = count.div_ceil(n);
    // Tail-rank adjustment from the original: a rank whose chunk would
    // start entirely past `count` participates with an empty chunk.
    if chunk_cnt * local > count && chunk_cnt * local - count > chunk_cnt {
        chunk_cnt = 0;
    }

    let padded_elems = (chunk_cnt * n).max(count);
    let nbytes = count * datatype.size();
    let chunk = BufHandle::zeroed(chunk_cnt * datatype.size());
    let padded = BufHandle::zeroed(padded_elems * datatype.size());

    if local == root && count > 0 {
        op.schedule_copy(buf.sub(0, nbytes), padded.sub(0, nbytes), count, datatype, true)?;
    }

    let scatter_scratch = scatter::plan(op, padded.clone(), chunk.clone(), chunk_cnt, root, datatype)?;
    allgather::plan(op, chunk.clone(), padded.clone(), chunk_cnt, datatype)?;

    if count > 0 {
        op.schedule_copy(padded.sub(0, nbytes), buf.sub(0, nbytes), count, datatype, true)?;
    }

    Ok(Scratch { chunk, padded, scatter_temp: scatter_scratch.temp })
}
