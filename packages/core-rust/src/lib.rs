//! `VoltGrid` Core -- SQL TIMESTAMP value and cluster topology document.
//!
//! This crate provides the value types shared between the planner and its
//! consumers:
//!
//! - **Timestamp** ([`timestamp`]): validated microsecond-resolution SQL
//!   TIMESTAMP with a distinguished NULL sentinel
//! - **Topology** ([`topology`]): the canonical topology document with its
//!   codec, lookup, and in-place mutation helpers

pub mod timestamp;
pub mod topology;

// Timestamp
pub use timestamp::{
    SqlTimestamp, TimestampError, MAX_VALID_MICROS, MIN_VALID_MICROS, NULL_MICROS,
};

// Topology
pub use topology::{HostId, PartitionId, Topology, TopologyError, TopologyPartition};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }

    #[test]
    fn timestamp_json_round_trip() {
        let ts = SqlTimestamp::from_micros(1_700_000_000_000_000).unwrap();
        let json = serde_json::to_string(&ts).expect("serialize SqlTimestamp");
        let decoded: SqlTimestamp = serde_json::from_str(&json).expect("deserialize SqlTimestamp");
        assert_eq!(ts, decoded);
    }

    #[test]
    fn topology_json_round_trip() {
        let topo = Topology {
            hostcount: 1,
            kfactor: 0,
            sites_per_host: 1,
            partitions: vec![TopologyPartition { partition_id: 0, master: 0, replicas: vec![0] }],
        };
        let json = topo.to_canonical_json();
        let decoded: Topology = serde_json::from_str(&json).expect("deserialize Topology");
        assert_eq!(topo, decoded);
    }
}
