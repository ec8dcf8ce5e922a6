//! The endpoint: the single-threaded driver that owns in-flight
//! operations, the ready queue, and the collaborator seams.
//!
//! `Endpoint` is the crate's one stateful, mutable object; everything
//! else (work items, operations, planners, the progress scan) is either
//! owned by it or a pure function over its operations. Grounded on
//! `communication::allocator::thread::Thread` /
//! `communication::allocator::generic::Generic`: a single-threaded,
//! `Rc`-based owner of the channels/queues that user-facing calls
//! allocate into and a progress loop drains.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use collective_logging::Logger;

use crate::buf::{BufHandle, SharedBuffer};
use crate::datatype::{Datatype, ReduceOp};
use crate::error::CollError;
use crate::group::Group;
use crate::item::{State, WorkItem};
use crate::log_events::CollEvent;
use crate::op::{OpId, OpKind, OpScratch, Operation};
use crate::planner;
use crate::progress::{self, ScanOutcome};
use crate::reduce::ReduceKernel;
use crate::transport::{CollectiveEvent, CompletionSink, PostResult, Transport, WorkToken};
use crate::FI_COLLECTIVE;

/// What [`Endpoint::query`] reports about a collective kind.
///
/// `max_members` is the only attribute the core itself bounds: the
/// rank-field width in the wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollAttr {
    pub max_members: usize,
}

/// The single-threaded collective engine driving one transport endpoint.
///
/// `T` is the tagged transport, `K` the reduction kernel, `S` the
/// completion sink. Address resolution is folded into [`Group`]'s
/// resolved rank table rather than kept as a fourth, separate seam —
/// see DESIGN.md.
pub struct Endpoint<T: Transport, K: ReduceKernel, S: CompletionSink<T::Addr>> {
    transport: T,
    kernel: K,
    sink: S,
    ops: HashMap<OpId, Operation<T::Addr>>,
    ready: VecDeque<(OpId, usize)>,
    tokens: HashMap<WorkToken, (OpId, usize)>,
    next_op_id: OpId,
    next_token: WorkToken,
    /// Bitmask of group ids this endpoint has not yet claimed through a
    /// join; mutated only at join completion. Bit 0 starts clear — the
    /// bootstrap world group already holds id 0.
    group_id_mask: u64,
    logger: Option<Logger<CollEvent>>,
}

impl<T: Transport, K: ReduceKernel, S: CompletionSink<T::Addr>> Endpoint<T, K, S> {
    /// Builds an endpoint around its collaborators. `world` is the
    /// pre-join, all-member group every later join is a subset of
    /// (`Group::bootstrap`).
    pub fn new(transport: T, kernel: K, sink: S) -> Self {
        Endpoint {
            transport,
            kernel,
            sink,
            ops: HashMap::new(),
            ready: VecDeque::new(),
            tokens: HashMap::new(),
            next_op_id: 0,
            next_token: 0,
            group_id_mask: !0u64 & !1,
            logger: None,
        }
    }

    /// Attaches a structured-event logger; events flow from operation
    /// creation through item dispatch to operation completion.
    pub fn with_logger(mut self, logger: Logger<CollEvent>) -> Self {
        self.logger = Some(logger);
        self
    }

    fn log(&self, event: CollEvent) {
        if let Some(logger) = &self.logger {
            logger.log(event);
        }
    }

    fn alloc_token(&mut self) -> WorkToken {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    fn alloc_op(&mut self, group: &Rc<Group<T::Addr>>, kind: OpKind, flags: u64, context: u64) -> OpId {
        let id = self.next_op_id;
        self.next_op_id += 1;
        self.log(CollEvent::OperationCreated { op_id: id, kind });
        self.ops.insert(id, Operation::create(id, Rc::clone(group), kind, flags, context));
        id
    }

    /// Runs `f` over the just-allocated operation; on error, discards
    /// the whole operation rather than unwinding it item by item.
    ///
    /// The original leaves this path as a documented TODO ("the caller
    /// is responsible for freeing any already-scheduled items"); in
    /// Rust, dropping the owning `Operation` frees every item and
    /// scratch buffer it holds in one safe step, which is the natural
    /// realization of that responsibility (see DESIGN.md).
    fn schedule_or_discard(&mut self, op_id: OpId, f: impl FnOnce(&mut Operation<T::Addr>) -> Result<(), CollError>) -> Result<(), CollError> {
        let result = f(self.ops.get_mut(&op_id).expect("operation was just allocated"));
        if result.is_err() {
            self.ops.remove(&op_id);
        }
        result
    }

    /// Scans one operation's queue, pushing any newly ready item onto
    /// the ready queue and destroying the operation once its queue is
    /// fully drained.
    fn progress(&mut self, op_id: OpId) {
        let mut drained = false;
        if let Some(op) = self.ops.get_mut(&op_id) {
            if let ScanOutcome::Ready { index } = progress::scan(op) {
                self.ready.push_back((op_id, index));
            }
            drained = progress::is_drained(op);
        }
        if drained {
            self.ops.remove(&op_id);
        }
    }

    fn complete_item(&mut self, op_id: OpId, index: usize) {
        if let Some(op) = self.ops.get_mut(&op_id) {
            if let Some(item) = op.queue[index].as_mut() {
                item.header_mut().state = State::Complete;
            }
        }
    }

    /// Invokes the completion sink for a `Completion` item: settles a
    /// join's group id (or reports its exhaustion), or simply notifies
    /// that a non-join collective finished.
    fn finish_operation(&mut self, op_id: OpId) {
        let (event, claimed_id, kind) = {
            let op = self.ops.get(&op_id).expect("operation must exist to finish");
            let context = op.context;
            let kind = op.kind;
            match &op.scratch {
                OpScratch::Join { result, new_group, .. } => match planner::join::lowest_free_group_id(result) {
                    Some(id) => (CollectiveEvent::JoinCompleted { context, group: Rc::clone(new_group) }, Some(id), kind),
                    None => (
                        CollectiveEvent::JoinFailed { context, error: CollError::Unsupported("no free group id available") },
                        None,
                        kind,
                    ),
                },
                _ => (CollectiveEvent::Completed { context, kind }, None, kind),
            }
        };

        if let Some(id) = claimed_id {
            self.group_id_mask &= !(1u64 << id);
            if let OpScratch::Join { new_group, .. } = &self.ops.get(&op_id).expect("operation must exist to finish").scratch {
                new_group.assign_group_id(id);
            }
            self.log(CollEvent::JoinSettled { op_id, group_id: id });
        }
        self.log(CollEvent::OperationCompleted { op_id, kind });
        self.sink.notify(event);
    }

    /// Dispatches one ready item: hands `Send`/`Recv` to the transport,
    /// runs `Reduce`/`Copy`/`Completion` locally. Returns `false` only on
    /// transient back-pressure, telling `drive` to stop draining.
    fn dispatch(&mut self, op_id: OpId, index: usize) -> bool {
        let item = match self.ops.get(&op_id).and_then(|op| op.queue[index].as_ref()) {
            Some(item) => item.clone(),
            None => return true,
        };

        match item {
            WorkItem::Send { remote_addr, tag, buf, .. } => {
                let token = self.alloc_token();
                match self.transport.send_tagged(&remote_addr, tag, token, buf) {
                    PostResult::Posted => {
                        self.tokens.insert(token, (op_id, index));
                        self.log(CollEvent::ItemDispatched { op_id, index, item_kind: "send" });
                        self.progress(op_id);
                        true
                    }
                    PostResult::Retry => {
                        self.ready.push_back((op_id, index));
                        false
                    }
                    PostResult::Err(e) => {
                        self.log(CollEvent::TransportError { op_id, index, message: e.0.clone() });
                        self.complete_item(op_id, index);
                        self.progress(op_id);
                        true
                    }
                }
            }
            WorkItem::Recv { remote_addr, tag, buf, .. } => {
                let token = self.alloc_token();
                match self.transport.recv_tagged(&remote_addr, tag, token, buf) {
                    PostResult::Posted => {
                        self.tokens.insert(token, (op_id, index));
                        self.log(CollEvent::ItemDispatched { op_id, index, item_kind: "recv" });
                        self.progress(op_id);
                        true
                    }
                    PostResult::Retry => {
                        self.ready.push_back((op_id, index));
                        false
                    }
                    PostResult::Err(e) => {
                        self.log(CollEvent::TransportError { op_id, index, message: e.0.clone() });
                        self.complete_item(op_id, index);
                        self.progress(op_id);
                        true
                    }
                }
            }
            WorkItem::Reduce { in_buf, inout_buf, count, datatype, op, .. } => {
                if let Err(e) = in_buf.with_slice(|in_bytes| inout_buf.with_slice_mut(|inout_bytes| self.kernel.reduce(op, datatype, inout_bytes, in_bytes, count))) {
                    self.log(CollEvent::TransportError { op_id, index, message: e.to_string() });
                }
                self.log(CollEvent::ItemDispatched { op_id, index, item_kind: "reduce" });
                self.complete_item(op_id, index);
                self.progress(op_id);
                true
            }
            WorkItem::Copy { in_buf, out_buf, count, datatype } => {
                crate::buf::copy_bytes(&in_buf, &out_buf, count * datatype.size());
                self.log(CollEvent::ItemDispatched { op_id, index, item_kind: "copy" });
                self.complete_item(op_id, index);
                self.progress(op_id);
                true
            }
            WorkItem::Completion { .. } => {
                self.finish_operation(op_id);
                self.complete_item(op_id, index);
                self.progress(op_id);
                true
            }
        }
    }

    /// Drains the ready queue until it empties or a send/recv hits
    /// transient back-pressure.
    fn drive(&mut self) {
        while let Some((op_id, index)) = self.ready.pop_front() {
            if !self.dispatch(op_id, index) {
                break;
            }
        }
    }

    /// Polls the transport for completed/errored transfers, reaps and
    /// advances their operations, then drains whatever became ready.
    pub fn progress_tick(&mut self) {
        for (token, result) in self.transport.poll_completions() {
            if let Some((op_id, index)) = self.tokens.remove(&token) {
                if let Err(e) = result {
                    self.log(CollEvent::TransportError { op_id, index, message: e.0 });
                }
                self.complete_item(op_id, index);
                self.progress(op_id);
            }
        }
        self.drive();
    }

    /// Whether every scheduled operation has fully drained.
    pub fn is_idle(&self) -> bool {
        self.ops.is_empty()
    }

    /// Joins a subset of `group` into a new group, all-reducing the
    /// endpoint's live group-id bitmask under `BAND` to settle the new
    /// group's id.
    pub fn join(&mut self, group: &Rc<Group<T::Addr>>, member_addrs: Vec<T::Addr>, local_rank: Option<usize>, flags: u64, context: u64) -> Result<OpId, CollError> {
        if flags & FI_COLLECTIVE == 0 {
            return Err(CollError::Unsupported("join requires the FI_COLLECTIVE flag"));
        }
        let new_group = Rc::new(Group::pending(member_addrs, local_rank)?);
        let op_id = self.alloc_op(group, OpKind::Join, flags, context);
        let cid_mask = self.group_id_mask;
        self.schedule_or_discard(op_id, move |operation| {
            let scratch = planner::join::plan(operation, cid_mask)?;
            operation.scratch = OpScratch::Join { result: scratch.result, tmp: scratch.tmp, new_group };
            operation.schedule_completion();
            Ok(())
        })?;
        self.progress(op_id);
        self.drive();
        Ok(op_id)
    }

    /// Schedules a barrier: all-reduce of `!local_rank` under `BAND`.
    pub fn barrier(&mut self, group: &Rc<Group<T::Addr>>, flags: u64, context: u64) -> Result<OpId, CollError> {
        let op_id = self.alloc_op(group, OpKind::Barrier, flags, context);
        self.schedule_or_discard(op_id, |operation| {
            let scratch = planner::barrier::plan(operation)?;
            operation.scratch = OpScratch::Barrier { result: scratch.result, tmp: scratch.tmp };
            operation.schedule_completion();
            Ok(())
        })?;
        self.progress(op_id);
        self.drive();
        Ok(op_id)
    }

    /// Schedules a recursive-halving/doubling all-reduce. `op` must be
    /// one the reduction kernel supports for `datatype`.
    #[allow(clippy::too_many_arguments)]
    pub fn allreduce(
        &mut self,
        group: &Rc<Group<T::Addr>>,
        send: &SharedBuffer,
        result: &SharedBuffer,
        count: usize,
        datatype: Datatype,
        op: ReduceOp,
        flags: u64,
        context: u64,
    ) -> Result<OpId, CollError> {
        if !self.kernel.supports(datatype, op) {
            return Err(CollError::Unsupported("datatype/op combination not supported by reduction kernel"));
        }
        let op_id = self.alloc_op(group, OpKind::AllReduce, flags, context);
        let (send, result) = (send.handle(), result.handle());
        self.schedule_or_discard(op_id, move |operation| {
            let nbytes = count * datatype.size();
            let tmp = BufHandle::zeroed(nbytes);
            planner::allreduce::plan(operation, send, result, tmp.clone(), count, datatype, op)?;
            operation.scratch = OpScratch::AllReduce { tmp };
            operation.schedule_completion();
            Ok(())
        })?;
        self.progress(op_id);
        self.drive();
        Ok(op_id)
    }

    /// Schedules a ring all-gather.
    pub fn allgather(&mut self, group: &Rc<Group<T::Addr>>, send: &SharedBuffer, result: &SharedBuffer, count: usize, datatype: Datatype, flags: u64, context: u64) -> Result<OpId, CollError> {
        let op_id = self.alloc_op(group, OpKind::AllGather, flags, context);
        let (send, result) = (send.handle(), result.handle());
        self.schedule_or_discard(op_id, move |operation| {
            planner::allgather::plan(operation, send, result, count, datatype)?;
            operation.schedule_completion();
            Ok(())
        })?;
        self.progress(op_id);
        self.drive();
        Ok(op_id)
    }

    /// Schedules a binomial-tree scatter rooted at `root`.
    #[allow(clippy::too_many_arguments)]
    pub fn scatter(&mut self, group: &Rc<Group<T::Addr>>, data: &SharedBuffer, result: &SharedBuffer, count: usize, root: usize, datatype: Datatype, flags: u64, context: u64) -> Result<OpId, CollError> {
        let op_id = self.alloc_op(group, OpKind::Scatter, flags, context);
        let (data, result) = (data.handle(), result.handle());
        self.schedule_or_discard(op_id, move |operation| {
            let scratch = planner::scatter::plan(operation, data, result, count, root, datatype)?;
            operation.scratch = OpScratch::Scatter { temp: scratch.temp };
            operation.schedule_completion();
            Ok(())
        })?;
        self.progress(op_id);
        self.drive();
        Ok(op_id)
    }

    /// Schedules a broadcast as scatter-then-all-gather, rooted at
    /// `root`.
    pub fn broadcast(&mut self, group: &Rc<Group<T::Addr>>, buf: &SharedBuffer, count: usize, root: usize, datatype: Datatype, flags: u64, context: u64) -> Result<OpId, CollError> {
        let op_id = self.alloc_op(group, OpKind::Broadcast, flags, context);
        let buf = buf.handle();
        self.schedule_or_discard(op_id, move |operation| {
            let scratch = planner::broadcast::plan(operation, buf, count, root, datatype)?;
            operation.scratch = OpScratch::Broadcast { chunk: scratch.chunk, padded: scratch.padded };
            operation.schedule_completion();
            Ok(())
        })?;
        self.progress(op_id);
        self.drive();
        Ok(op_id)
    }

    /// Reports what this endpoint supports for a collective kind.
    /// `ALLREDUCE` additionally needs the `(datatype, op)` pair the
    /// reduction kernel would be asked for. `JOIN` is not a queryable
    /// collective kind (the original's `coll_query_collective` has no
    /// arm for it and falls through to unsupported).
    pub fn query(&self, kind: OpKind, datatype_op: Option<(Datatype, ReduceOp)>) -> Result<CollAttr, CollError> {
        match kind {
            OpKind::Barrier | OpKind::AllGather | OpKind::Scatter | OpKind::Broadcast => Ok(CollAttr { max_members: crate::group::MAX_MEMBERS }),
            OpKind::AllReduce => {
                let (datatype, op) = datatype_op.ok_or(CollError::InvalidArg("allreduce query requires a (datatype, op) pair"))?;
                if self.kernel.supports(datatype, op) {
                    Ok(CollAttr { max_members: crate::group::MAX_MEMBERS })
                } else {
                    Err(CollError::Unsupported("datatype/op combination not supported by reduction kernel"))
                }
            }
            OpKind::Join => Err(CollError::Unsupported("JOIN is not a queryable collective kind")),
        }
    }
}
