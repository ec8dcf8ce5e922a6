//! Typed events the engine logs through [`collective_logging`].
//!
//! Grounded on `communication::logging::CommunicationEvent`: a flat
//! `enum` of plain, `Serialize`-able structs/variants, one per kind of
//! thing worth observing about the scheduler's behavior. Nothing here
//! drives engine logic — these are purely observational, emitted from
//! [`crate::endpoint::Endpoint`] at operation and item state
//! transitions.

use serde::{Deserialize, Serialize};

use crate::op::{OpId, OpKind};

/// One observable event in the life of an operation or its work items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CollEvent {
    /// An operation was created and linked to its group.
    OperationCreated { op_id: OpId, kind: OpKind },
    /// A work item was handed to the transport or run locally.
    ItemDispatched { op_id: OpId, index: usize, item_kind: &'static str },
    /// A work item's transfer failed; it is marked complete regardless
    /// (a documented open gap — see DESIGN.md).
    TransportError { op_id: OpId, index: usize, message: String },
    /// An operation's queue fully drained and it was destroyed.
    OperationCompleted { op_id: OpId, kind: OpKind },
    /// A join settled on a new group id.
    JoinSettled { op_id: OpId, group_id: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_compare_by_value() {
        let a = CollEvent::OperationCreated { op_id: 7, kind: OpKind::Barrier };
        let b = CollEvent::OperationCreated { op_id: 7, kind: OpKind::Barrier };
        let c = CollEvent::OperationCreated { op_id: 8, kind: OpKind::Barrier };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
