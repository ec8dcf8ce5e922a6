//! Group handles (`util_coll_mc` in the original).
//!
//! A group is an immutable, ordered rank-to-address table plus the
//! identifiers a collective needs to tag its messages. Groups are
//! created by [`crate::endpoint::Endpoint::join`] (or
//! [`Group::bootstrap`] for the initial, pre-join membership) and stay
//! alive for as long as any `Rc` to them — single-threaded,
//! reference-counted ownership gives "destroyed when no operation or
//! caller still needs it" for free, without an explicit close call.

use std::cell::Cell;

use crate::error::CollError;

/// The largest number of ranks a group may have.
///
/// Imposed by the 32-bit rank field in the wire tag: a rank must fit
/// in the tag's upper 32 bits alongside the 32-bit `cid`, so
/// `max_members <= 2^31 - 1`.
pub const MAX_MEMBERS: usize = (1u32 << 31) as usize - 1;

/// An immutable collective group: an ordered rank table plus the
/// identifiers used to tag its collectives' messages.
///
/// `Addr` is whatever the address vector collaborator resolves ranks
/// to; the core never interprets it beyond handing it back to the
/// transport.
/// Sentinel `group_id` for a group whose id has not been assigned yet: a
/// join's new group exists (its rank table is known) before the
/// all-reduce that settles which id it gets has completed.
const GROUP_ID_PENDING: u16 = u16::MAX;

#[derive(Debug)]
pub struct Group<Addr> {
    ranks: Vec<Addr>,
    local_rank: Option<usize>,
    group_id: Cell<u16>,
    seq: Cell<u16>,
}

impl<Addr: Clone> Group<Addr> {
    /// Builds a group from an already-resolved rank table.
    ///
    /// `local_rank` is `None` if this endpoint is not a member of the
    /// group; collectives called against such a group fail with
    /// [`CollError::InvalidArg`].
    pub fn new(ranks: Vec<Addr>, local_rank: Option<usize>, group_id: u16) -> Result<Self, CollError> {
        if ranks.len() > MAX_MEMBERS {
            return Err(CollError::InvalidArg("group exceeds max_members"));
        }
        Ok(Group { ranks, local_rank, group_id: Cell::new(group_id), seq: Cell::new(0) })
    }

    /// Builds the root, pre-join group for an endpoint directly from its
    /// address vector, with `group_id = 0` and no collective run to
    /// establish it.
    ///
    /// Grounded on the original's `av_set->coll_mc`, a world group
    /// created alongside the address-vector set rather than through
    /// `coll_join_collective` — every other group on an endpoint is
    /// reached by joining a subset of this one.
    pub fn bootstrap(ranks: Vec<Addr>, local_rank: Option<usize>) -> Result<Self, CollError> {
        Group::new(ranks, local_rank, 0)
    }

    /// Builds a join's new group before its `group_id` is known: the
    /// rank table (the membership set the join was called with) is
    /// settled synchronously, but the id is only settled once the
    /// join's all-reduce over the parent group completes
    /// (`coll_join_comp` in `prov/coll/src/coll_coll.c`).
    pub fn pending(ranks: Vec<Addr>, local_rank: Option<usize>) -> Result<Self, CollError> {
        Group::new(ranks, local_rank, GROUP_ID_PENDING)
    }

    /// Settles a [`Group::pending`] group's id once its join completes.
    ///
    /// Panics if called twice on the same group — `seq` is the only
    /// field a group's owner mutates after construction besides this
    /// one-time assignment.
    pub(crate) fn assign_group_id(&self, id: u16) {
        debug_assert_eq!(self.group_id.get(), GROUP_ID_PENDING, "group id already assigned");
        self.group_id.set(id);
    }

    /// Number of ranks in the group.
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    /// Whether the group has no members (never true for a group this
    /// endpoint could have joined, but kept for API symmetry).
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// This endpoint's rank within the group, if it is a member.
    pub fn local_rank(&self) -> Option<usize> {
        self.local_rank
    }

    /// Resolves a rank to its transport address.
    pub fn lookup(&self, rank: usize) -> Addr {
        self.ranks[rank].clone()
    }

    /// The group's 16-bit identifier, assigned at join.
    pub fn group_id(&self) -> u16 {
        self.group_id.get()
    }

    /// Allocates the next `cid` for an operation on this group:
    /// `(group_id << 16) | seq`, with `seq` incremented afterward.
    pub(crate) fn next_cid(&self) -> u32 {
        let seq = self.seq.get();
        self.seq.set(seq.wrapping_add(1));
        ((self.group_id.get() as u32) << 16) | seq as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cid_increments_seq_per_group() {
        let group = Group::new(vec!["a", "b"], Some(0), 3).unwrap();
        assert_eq!(group.next_cid(), 3 << 16);
        assert_eq!(group.next_cid(), (3 << 16) | 1);
    }

    #[test]
    fn oversized_group_rejected() {
        let ranks = vec![(); MAX_MEMBERS + 1];
        assert!(Group::new(ranks, Some(0), 0).is_err());
    }

    #[test]
    fn pending_group_takes_its_assigned_id() {
        let group = Group::pending(vec!["a", "b"], Some(1)).unwrap();
        assert_eq!(group.group_id(), GROUP_ID_PENDING);
        group.assign_group_id(5);
        assert_eq!(group.group_id(), 5);
    }
}
