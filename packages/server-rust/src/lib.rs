//! `VoltGrid` Server -- cluster topology planner and placement strategies.

pub mod cluster;

pub use cluster::{
    plan_topology, ClusterConfig, GroupTree, HostTag, PlannerError, PlannerResult,
    PlanningModel, TopologyRequest,
};
