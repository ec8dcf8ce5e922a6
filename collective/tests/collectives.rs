//! End-to-end collective scenarios, driven over an in-process loopback
//! transport.
//!
//! `LoopbackCluster` wires N `Endpoint`s together through a shared
//! `Network`: posting a send or recv records it keyed by `(src, dst,
//! tag)`, and matches the moment both sides of a pair have been posted,
//! copying bytes directly between the two `BufHandle`s. This is test-only
//! scaffolding standing in for a real tagged transport, in the spirit of
//! `communication::allocator::thread::Thread`'s in-process channel.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use collective::{
    BufHandle, CollError, CollectiveEvent, CompletionSink, Datatype, Endpoint, Group, PostResult, ReduceOp, SharedBuffer, StandardReduceKernel, Transport, TransportError, WorkToken, FI_COLLECTIVE,
};

#[derive(Default)]
struct Network {
    waiting_sends: HashMap<(usize, usize, u64), VecDeque<(WorkToken, BufHandle)>>,
    waiting_recvs: HashMap<(usize, usize, u64), VecDeque<(WorkToken, BufHandle)>>,
    completions: HashMap<usize, VecDeque<(WorkToken, Result<(), TransportError>)>>,
}

fn copy_into(src: &BufHandle, dst: &BufHandle) {
    let bytes = src.with_slice(|s| s.to_vec());
    dst.with_slice_mut(|d| d.copy_from_slice(&bytes));
}

impl Network {
    fn post_send(&mut self, src: usize, dst: usize, tag: u64, token: WorkToken, buf: BufHandle) {
        let key = (src, dst, tag);
        if let Some(mut q) = self.waiting_recvs.remove(&key) {
            let (recv_token, recv_buf) = q.pop_front().expect("non-empty queue stored under key");
            copy_into(&buf, &recv_buf);
            if !q.is_empty() {
                self.waiting_recvs.insert(key, q);
            }
            self.completions.entry(src).or_default().push_back((token, Ok(())));
            self.completions.entry(dst).or_default().push_back((recv_token, Ok(())));
        } else {
            self.waiting_sends.entry(key).or_default().push_back((token, buf));
        }
    }

    fn post_recv(&mut self, src: usize, dst: usize, tag: u64, token: WorkToken, buf: BufHandle) {
        let key = (src, dst, tag);
        if let Some(mut q) = self.waiting_sends.remove(&key) {
            let (send_token, send_buf) = q.pop_front().expect("non-empty queue stored under key");
            copy_into(&send_buf, &buf);
            if !q.is_empty() {
                self.waiting_sends.insert(key, q);
            }
            self.completions.entry(dst).or_default().push_back((token, Ok(())));
            self.completions.entry(src).or_default().push_back((send_token, Ok(())));
        } else {
            self.waiting_recvs.entry(key).or_default().push_back((token, buf));
        }
    }
}

struct LoopbackTransport {
    rank: usize,
    network: Rc<RefCell<Network>>,
}

impl Transport for LoopbackTransport {
    type Addr = usize;

    fn send_tagged(&mut self, addr: &usize, tag: u64, token: WorkToken, buf: BufHandle) -> PostResult {
        self.network.borrow_mut().post_send(self.rank, *addr, tag, token, buf);
        PostResult::Posted
    }

    fn recv_tagged(&mut self, addr: &usize, tag: u64, token: WorkToken, buf: BufHandle) -> PostResult {
        self.network.borrow_mut().post_recv(*addr, self.rank, tag, token, buf);
        PostResult::Posted
    }

    fn poll_completions(&mut self) -> Vec<(WorkToken, Result<(), TransportError>)> {
        self.network.borrow_mut().completions.get_mut(&self.rank).map(|q| q.drain(..).collect()).unwrap_or_default()
    }
}

/// Records every [`CollectiveEvent`] an endpoint's operations raise, by
/// `context` (the caller-supplied opaque id every collective call takes).
#[derive(Clone, Default)]
struct RecordingSink {
    completed: Rc<RefCell<Vec<u64>>>,
    joined: Rc<RefCell<Vec<(u64, Rc<Group<usize>>)>>>,
    failed: Rc<RefCell<Vec<(u64, CollError)>>>,
}

impl CompletionSink<usize> for RecordingSink {
    fn notify(&mut self, event: CollectiveEvent<usize>) {
        match event {
            CollectiveEvent::Completed { context, .. } => self.completed.borrow_mut().push(context),
            CollectiveEvent::JoinCompleted { context, group } => self.joined.borrow_mut().push((context, group)),
            CollectiveEvent::JoinFailed { context, error } => self.failed.borrow_mut().push((context, error)),
        }
    }
}

type Ep = Endpoint<LoopbackTransport, StandardReduceKernel, RecordingSink>;

/// `N` endpoints, each wired to a shared in-process `Network`, each
/// already a member of a bootstrap world group of size `N`.
struct LoopbackCluster {
    endpoints: Vec<Ep>,
    sinks: Vec<RecordingSink>,
    world: Vec<Rc<Group<usize>>>,
}

impl LoopbackCluster {
    fn new(n: usize) -> Self {
        let network = Rc::new(RefCell::new(Network::default()));
        let mut endpoints = Vec::with_capacity(n);
        let mut sinks = Vec::with_capacity(n);
        let mut world = Vec::with_capacity(n);
        for rank in 0..n {
            let sink = RecordingSink::default();
            sinks.push(sink.clone());
            let transport = LoopbackTransport { rank, network: Rc::clone(&network) };
            endpoints.push(Endpoint::new(transport, StandardReduceKernel, sink));
            world.push(Rc::new(Group::bootstrap((0..n).collect(), Some(rank)).unwrap()));
        }
        LoopbackCluster { endpoints, sinks, world }
    }

    /// Runs `progress_tick` round-robin across every endpoint until all
    /// have drained (`is_idle`) or `max_ticks` is exceeded.
    fn run_to_completion(&mut self, max_ticks: usize) {
        for _ in 0..max_ticks {
            let mut all_idle = true;
            for ep in &mut self.endpoints {
                ep.progress_tick();
                if !ep.is_idle() {
                    all_idle = false;
                }
            }
            if all_idle {
                return;
            }
        }
        panic!("cluster did not converge within {max_ticks} ticks");
    }
}

fn u32_buf(values: &[u32]) -> SharedBuffer {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_ne_bytes());
    }
    SharedBuffer::new(bytes)
}

fn read_u32s(buf: &SharedBuffer, count: usize) -> Vec<u32> {
    let bytes = buf.snapshot();
    (0..count).map(|i| u32::from_ne_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap())).collect()
}

fn read_u8s(buf: &SharedBuffer, count: usize) -> Vec<u8> {
    buf.snapshot()[..count].to_vec()
}

#[test]
fn allreduce_sum_uint32_four_ranks() {
    let n = 4;
    let mut cluster = LoopbackCluster::new(n);
    let mut results = Vec::with_capacity(n);
    for rank in 0..n {
        let send = u32_buf(&[(rank + 1) as u32]);
        let result = SharedBuffer::zeroed(4);
        cluster.endpoints[rank].allreduce(&cluster.world[rank], &send, &result, 1, Datatype::Uint32, ReduceOp::Sum, 0, rank as u64).unwrap();
        results.push(result);
    }
    cluster.run_to_completion(64);
    for (rank, result) in results.iter().enumerate() {
        assert_eq!(read_u32s(result, 1), vec![10], "rank {rank} did not see the full sum");
        assert_eq!(cluster.sinks[rank].completed.borrow().as_slice(), &[rank as u64]);
    }
}

#[test]
fn allreduce_band_uint8_non_power_of_two_ranks_is_zero() {
    let n = 5;
    let mut cluster = LoopbackCluster::new(n);
    let mut results = Vec::with_capacity(n);
    for rank in 0..n {
        let send = SharedBuffer::new(vec![rank as u8]);
        let result = SharedBuffer::zeroed(1);
        cluster.endpoints[rank].allreduce(&cluster.world[rank], &send, &result, 1, Datatype::Uint8, ReduceOp::Band, 0, rank as u64).unwrap();
        results.push(result);
    }
    cluster.run_to_completion(64);
    for (rank, result) in results.iter().enumerate() {
        assert_eq!(read_u8s(result, 1), vec![0], "rank {rank}: 0 & 1 & 2 & 3 & 4 == 0");
    }
}

#[test]
fn allgather_ring_eight_ranks_lays_out_ranks_in_order() {
    let n = 8;
    let mut cluster = LoopbackCluster::new(n);
    let mut results = Vec::with_capacity(n);
    for rank in 0..n {
        let send = u32_buf(&[rank as u32]);
        let result = SharedBuffer::zeroed(n * 4);
        cluster.endpoints[rank].allgather(&cluster.world[rank], &send, &result, 1, Datatype::Uint32, 0, rank as u64).unwrap();
        results.push(result);
    }
    cluster.run_to_completion(128);
    let expected: Vec<u32> = (0..n as u32).collect();
    for (rank, result) in results.iter().enumerate() {
        assert_eq!(read_u32s(result, n), expected, "rank {rank} gathered the wrong layout");
    }
}

#[test]
fn scatter_root_three_six_ranks_two_per_rank() {
    let n = 6;
    let root = 3;
    let mut cluster = LoopbackCluster::new(n);
    let root_data: Vec<u8> = (0..(n as u8 * 2)).collect();
    let mut results = Vec::with_capacity(n);
    for rank in 0..n {
        let data = SharedBuffer::new(if rank == root { root_data.clone() } else { Vec::new() });
        let result = SharedBuffer::zeroed(2);
        cluster.endpoints[rank].scatter(&cluster.world[rank], &data, &result, 2, root, Datatype::Uint8, 0, rank as u64).unwrap();
        results.push(result);
    }
    cluster.run_to_completion(64);
    for (rank, result) in results.iter().enumerate() {
        let expected = vec![(rank * 2) as u8, (rank * 2 + 1) as u8];
        assert_eq!(read_u8s(result, 2), expected, "rank {rank} got the wrong scatter slice");
    }
}

#[test]
fn broadcast_root_two_four_ranks() {
    let n = 4;
    let root = 2;
    let count = 7;
    let mut cluster = LoopbackCluster::new(n);
    let expected: Vec<u32> = (100..100 + count as u32).collect();
    let mut bufs = Vec::with_capacity(n);
    for rank in 0..n {
        let buf = if rank == root { u32_buf(&expected) } else { SharedBuffer::zeroed(count * 4) };
        cluster.endpoints[rank].broadcast(&cluster.world[rank], &buf, count, root, Datatype::Uint32, 0, rank as u64).unwrap();
        bufs.push(buf);
    }
    cluster.run_to_completion(64);
    for (rank, buf) in bufs.iter().enumerate() {
        assert_eq!(read_u32s(buf, count), expected, "rank {rank} did not receive the broadcast value");
    }
}

#[test]
fn barrier_and_allreduce_run_concurrently_without_tag_collision() {
    let n = 3;
    let mut cluster = LoopbackCluster::new(n);
    let mut allreduce_results = Vec::with_capacity(n);
    for rank in 0..n {
        cluster.endpoints[rank].barrier(&cluster.world[rank], 0, 1000 + rank as u64).unwrap();
        let send = u32_buf(&[(rank + 1) as u32]);
        let result = SharedBuffer::zeroed(4);
        cluster.endpoints[rank].allreduce(&cluster.world[rank], &send, &result, 1, Datatype::Uint32, ReduceOp::Sum, 0, 2000 + rank as u64).unwrap();
        allreduce_results.push(result);
    }
    cluster.run_to_completion(64);
    for rank in 0..n {
        let completed = cluster.sinks[rank].completed.borrow();
        assert!(completed.contains(&(1000 + rank as u64)), "rank {rank} barrier never completed");
        assert!(completed.contains(&(2000 + rank as u64)), "rank {rank} all-reduce never completed");
    }
    for (rank, result) in allreduce_results.iter().enumerate() {
        assert_eq!(read_u32s(result, 1), vec![6], "rank {rank} all-reduce result corrupted by the concurrent barrier");
    }
}

#[test]
fn join_forms_a_subgroup_with_a_fresh_group_id() {
    let n = 4;
    let mut cluster = LoopbackCluster::new(n);
    // The join's all-reduce runs over the whole parent (world) group, so
    // every world rank calls join with the same member list — ranks 0
    // and 2 end up members of the new subgroup, ranks 1 and 3 do not.
    let members = vec![0usize, 2usize];
    for world_rank in 0..n {
        let new_local_rank = members.iter().position(|&m| m == world_rank);
        cluster.endpoints[world_rank].join(&cluster.world[world_rank], members.clone(), new_local_rank, FI_COLLECTIVE, 42).unwrap();
    }
    cluster.run_to_completion(64);
    for world_rank in 0..n {
        let joined = cluster.sinks[world_rank].joined.borrow();
        assert_eq!(joined.len(), 1, "rank {world_rank} did not see exactly one join completion");
        let (context, group) = &joined[0];
        assert_eq!(*context, 42);
        assert_eq!(group.len(), 2);
        assert_ne!(group.group_id(), 0, "new group must not reuse the bootstrap world's id");
    }
    let ids: Vec<u16> = (0..n).map(|r| cluster.sinks[r].joined.borrow()[0].1.group_id()).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]), "every rank must agree on the new group's id");
}

#[test]
fn join_without_the_collective_flag_is_rejected() {
    let mut cluster = LoopbackCluster::new(2);
    let err = cluster.endpoints[0].join(&cluster.world[0], vec![0, 1], Some(0), 0, 7).unwrap_err();
    assert!(matches!(err, CollError::Unsupported(_)));
}

/// All-reduce SUM/UINT32 over random, non-power-of-two group sizes and
/// random per-rank values: every rank must land on the plain sum,
/// regardless of how the fold-in/butterfly/fold-out phases split the
/// group.
#[test]
fn allreduce_sum_matches_plain_sum_across_random_group_sizes() {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let n = rng.gen_range(1..=11);
        let values: Vec<u32> = (0..n).map(|_| rng.gen_range(0..1_000)).collect();
        let expected = values.iter().copied().fold(0u32, u32::wrapping_add);

        let mut cluster = LoopbackCluster::new(n);
        let mut results = Vec::with_capacity(n);
        for rank in 0..n {
            let send = u32_buf(&[values[rank]]);
            let result = SharedBuffer::zeroed(4);
            cluster.endpoints[rank].allreduce(&cluster.world[rank], &send, &result, 1, Datatype::Uint32, ReduceOp::Sum, 0, rank as u64).unwrap();
            results.push(result);
        }
        cluster.run_to_completion(128);
        for (rank, result) in results.iter().enumerate() {
            assert_eq!(read_u32s(result, 1), vec![expected], "n={n} rank {rank} values={values:?}");
        }
    }
}
