//! The progress engine's queue scan.
//!
//! `scan` walks an operation's work queue head-to-tail exactly as
//! `coll_progress_work` does: reaping removable `Complete` items,
//! stopping if a not-yet-complete item's predecessor is fenced, and
//! otherwise promoting the first `Waiting` item it finds to
//! `Processing` and handing it to the caller to push onto the
//! endpoint's ready queue. It never inspects more than one operation at
//! a time — the endpoint decides which operations to scan and when.

use crate::item::State;
use crate::op::Operation;

/// Outcome of one `scan` call over an operation's queue.
pub(crate) enum ScanOutcome {
    /// A `Waiting` item at `index` was promoted to `Processing`.
    Ready { index: usize },
    /// Nothing is ready to run right now (either the queue is exhausted
    /// of live items, or scanning stopped at a fence).
    Idle,
}

/// Scans `op`'s queue, reaping completed items and looking for the
/// next item ready to dispatch.
///
/// Returns the ready item's index, if any. The queue is left with any
/// reapable `Complete` items removed (set to `None`) regardless of
/// whether a ready item was found.
pub(crate) fn scan<Addr>(op: &mut Operation<Addr>) -> ScanOutcome {
    let mut i = 0;
    while i < op.queue.len() {
        if op.queue[i].is_none() {
            i += 1;
            continue;
        }

        let is_head = op.queue[..i].iter().all(Option::is_none);
        let (state, fence) = {
            let item = op.queue[i].as_ref().unwrap();
            (item.header().state, item.header().fence)
        };

        if state == State::Complete {
            // A fenced Complete item can only be reaped once it is the
            // head: everything before it must already be gone.
            if !fence || is_head {
                op.queue[i] = None;
            }
            i += 1;
            continue;
        }

        // Not complete: a fenced predecessor blocks all further progress,
        // whether or not that predecessor has itself finished running.
        let predecessor_fenced = op.queue[..i].iter().rev().find_map(|x| x.as_ref()).map(|p| p.header().fence).unwrap_or(false);
        if predecessor_fenced {
            return ScanOutcome::Idle;
        }

        if state != State::Waiting {
            // Already Processing; not ready, but doesn't block anything
            // behind it (it is, by construction, unfenced - see below).
            i += 1;
            continue;
        }

        op.queue[i].as_mut().unwrap().header_mut().state = State::Processing;
        return ScanOutcome::Ready { index: i };
    }
    ScanOutcome::Idle
}

/// Whether every item in the queue has been reaped.
pub(crate) fn is_drained<Addr>(op: &Operation<Addr>) -> bool {
    op.queue.iter().all(Option::is_none)
}
