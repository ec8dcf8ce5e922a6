//! Algorithm planners: the wire algorithms behind each collective.
//!
//! Each planner is a pure function: given an operation that already
//! knows its group, it appends work items describing the exchange.
//! Nothing here runs a transfer or a reduction — that is the progress
//! engine's job once the items it schedules reach the front of the
//! queue. [`allreduce::plan`] and [`scatter::plan`] are load-bearing
//! (recursive-halving/doubling and binomial-tree, respectively); the
//! rest are composites built from those two plus [`allgather::plan`].

pub mod allgather;
pub mod allreduce;
pub mod barrier;
pub mod broadcast;
pub mod join;
pub mod scatter;
