//! Placement strategies.
//!
//! Three strategies drive the shared [`PlanningModel`](super::model::PlanningModel):
//!
//! - [`fallback`]: deterministic round-robin, blind to groups
//! - [`group_aware`]: backtracking search over the rack group tree
//! - [`buddy`]: partition-space split across disjoint buddy groups, each
//!   solved by [`group_aware`]
//!
//! Strategy selection lives in [`super::plan_topology`].

pub mod buddy;
pub mod fallback;
pub mod group_aware;
