//! Planner error types.

use voltgrid_core::{HostId, PartitionId};

/// Result type alias for planner operations.
pub type PlannerResult<T> = Result<T, PlannerError>;

/// Errors surfaced by the topology planner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlannerError {
    /// A cluster configuration predicate failed. Carries the exact diagnostic.
    #[error("invalid cluster configuration: {0}")]
    InvalidConfig(String),

    /// A dotted group label contained an empty component.
    #[error("malformed group label {label:?}: empty component")]
    MalformedGroupLabel { label: String },

    /// The buddy strategy cannot make each buddy group k-safe on its own.
    #[error(
        "buddy group placement needs at least {required} hosts per group, \
         but {host_count} hosts across {group_count} groups leave only {per_group}"
    )]
    InsufficientBuddyGroup {
        group_count: usize,
        host_count: u32,
        per_group: u32,
        required: u32,
    },

    /// The group-aware search exhausted every candidate permutation.
    #[error("no feasible replica placement for partition {partition_id}")]
    PlacementInfeasible { partition_id: PartitionId },

    /// A replica was assigned to a partition that needed none. Internal
    /// invariant violation; must never fire.
    #[error("partition {partition_id} was assigned a replica beyond kfactor+1")]
    OverReplication { partition_id: PartitionId },

    /// A pre-assignment placed the same host on a partition twice.
    #[error("host {host_id} already holds partition {partition_id}")]
    DuplicateAssignment { partition_id: PartitionId, host_id: HostId },

    /// An assignment would push a host past its `sites_per_host` budget.
    #[error("host {host_id} has no free partition slots")]
    OverCapacity { host_id: HostId },

    /// A sanity check failed after the search reported success. Programmer
    /// error; fatal.
    #[error("internal planner invariant violated: {0}")]
    Internal(String),

    /// A pre-assignment or group tag referenced a host the request does not declare.
    #[error("unknown host {host_id}")]
    UnknownHost { host_id: HostId },

    /// A pre-assignment referenced a partition outside `[0, partition_count)`.
    #[error("unknown partition {partition_id}")]
    UnknownPartition { partition_id: PartitionId },

    /// The host-group mapping does not cover exactly the declared host count.
    #[error("host group mapping covers {actual} hosts, expected {expected}")]
    HostGroupCountMismatch { expected: u32, actual: usize },
}
