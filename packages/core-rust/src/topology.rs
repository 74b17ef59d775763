//! Cluster topology document: the canonical partition-to-host mapping.
//!
//! The topology document is the externally visible product of the planner
//! and the shared contract between the planner, the request dispatcher, and
//! clients. Field names and layout are part of the wire format:
//!
//! - `replicas` lists the non-master replica hosts in ascending host-id
//!   order with the master id appended **last**; its length is always
//!   `kfactor + 1`.
//! - Partitions appear in ascending `partition_id` order.
//!
//! Consumers that assume `replicas[0]` is the master will misread the
//! document; the `master` field is authoritative.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Identifier of a host in the cluster.
pub type HostId = u32;

/// Identifier of a logical partition.
pub type PartitionId = u32;

/// Errors from topology document mutation and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// `add_hosts` called with a delta that breaks the k-safety expansion rule.
    #[error("cannot add {added} hosts to a kfactor={kfactor} topology: the delta must be a positive multiple of {} no larger than {}", kfactor + 1, kfactor + 1)]
    InvalidHostDelta { added: u32, kfactor: u32 },
    /// `add_partitions` would introduce a partition id that already exists.
    #[error("partition {partition_id} already exists in the topology")]
    DuplicatePartition { partition_id: PartitionId },
    /// `add_partitions` given an empty replica list.
    #[error("partition {partition_id} was given no hosts")]
    EmptyReplicaList { partition_id: PartitionId },
    /// A partition's replica list does not hold exactly `kfactor + 1` hosts.
    #[error("partition {partition_id} has {actual} replicas, expected {expected}")]
    ReplicaCount { partition_id: PartitionId, expected: usize, actual: usize },
    /// A partition's replica list repeats a host id.
    #[error("partition {partition_id} lists host {host_id} more than once")]
    RepeatedReplica { partition_id: PartitionId, host_id: HostId },
    /// A partition's master does not appear in its replica list.
    #[error("partition {partition_id}: master {master} is not among its replicas")]
    MasterNotInReplicas { partition_id: PartitionId, master: HostId },
    /// A host does not hold exactly `sites_per_host` partitions.
    #[error("host {host_id} holds {actual} partitions, expected {expected}")]
    SiteCountMismatch { host_id: HostId, expected: usize, actual: usize },
}

/// One partition's entry in the topology document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyPartition {
    pub partition_id: PartitionId,
    pub master: HostId,
    /// Non-master replicas in ascending host-id order, then the master.
    pub replicas: Vec<HostId>,
}

/// The complete topology document.
///
/// Serialization uses `serde_json` with struct-declaration field order, so
/// equal documents produce byte-identical canonical JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub hostcount: u32,
    pub kfactor: u32,
    pub sites_per_host: u32,
    pub partitions: Vec<TopologyPartition>,
}

impl Topology {
    /// Returns the partition ids the given host is responsible for.
    ///
    /// With `only_masters`, restricts to partitions the host masters;
    /// otherwise any partition whose replica list contains the host counts.
    /// Results are in ascending partition-id order.
    #[must_use]
    pub fn partitions_for_host(&self, host_id: HostId, only_masters: bool) -> Vec<PartitionId> {
        self.partitions
            .iter()
            .filter(|p| {
                if only_masters {
                    p.master == host_id
                } else {
                    p.replicas.contains(&host_id)
                }
            })
            .map(|p| p.partition_id)
            .collect()
    }

    /// Registers `added` new hosts in place, incrementing `hostcount`.
    ///
    /// The delta must be a positive multiple of `kfactor + 1` no larger than
    /// `kfactor + 1` (i.e. exactly one k-safe host group); callers growing by
    /// more than one group call this repeatedly. The new hosts hold no
    /// partitions until a subsequent `add_partitions`.
    ///
    /// # Errors
    ///
    /// [`TopologyError::InvalidHostDelta`] if the delta breaks the rule.
    pub fn add_hosts(&mut self, added: u32) -> Result<(), TopologyError> {
        let group = self.kfactor + 1;
        if added == 0 || added > group || added % group != 0 {
            return Err(TopologyError::InvalidHostDelta { added, kfactor: self.kfactor });
        }
        self.hostcount += added;
        Ok(())
    }

    /// Appends new partitions in place.
    ///
    /// Each entry's host list becomes the new partition's `replicas` as
    /// given; the last host of the list is recorded as the master, matching
    /// the canonical master-last layout. Partitions are re-sorted by id.
    ///
    /// # Errors
    ///
    /// [`TopologyError::DuplicatePartition`] if an id already exists;
    /// [`TopologyError::EmptyReplicaList`] if an entry has no hosts.
    pub fn add_partitions(
        &mut self,
        additions: BTreeMap<PartitionId, Vec<HostId>>,
    ) -> Result<(), TopologyError> {
        let existing: BTreeSet<PartitionId> =
            self.partitions.iter().map(|p| p.partition_id).collect();

        for (partition_id, hosts) in additions {
            if existing.contains(&partition_id) {
                return Err(TopologyError::DuplicatePartition { partition_id });
            }
            let Some(&master) = hosts.last() else {
                return Err(TopologyError::EmptyReplicaList { partition_id });
            };
            self.partitions.push(TopologyPartition { partition_id, master, replicas: hosts });
        }
        self.partitions.sort_by_key(|p| p.partition_id);
        Ok(())
    }

    /// Rechecks the universal topology invariants on a complete document:
    /// replica-list length, replica distinctness, master membership, and
    /// exact per-host site totals.
    ///
    /// # Errors
    ///
    /// The first violated invariant, in partition order then host order.
    pub fn validate(&self) -> Result<(), TopologyError> {
        let expected = self.kfactor as usize + 1;
        let mut site_counts: BTreeMap<HostId, usize> = BTreeMap::new();

        for p in &self.partitions {
            if p.replicas.len() != expected {
                return Err(TopologyError::ReplicaCount {
                    partition_id: p.partition_id,
                    expected,
                    actual: p.replicas.len(),
                });
            }
            let mut seen = BTreeSet::new();
            for &host_id in &p.replicas {
                if !seen.insert(host_id) {
                    return Err(TopologyError::RepeatedReplica {
                        partition_id: p.partition_id,
                        host_id,
                    });
                }
                *site_counts.entry(host_id).or_insert(0) += 1;
            }
            if !seen.contains(&p.master) {
                return Err(TopologyError::MasterNotInReplicas {
                    partition_id: p.partition_id,
                    master: p.master,
                });
            }
        }

        let sites = self.sites_per_host as usize;
        for (host_id, actual) in site_counts {
            if actual != sites {
                return Err(TopologyError::SiteCountMismatch {
                    host_id,
                    expected: sites,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Serializes to canonical JSON. Byte-identical for equal documents.
    ///
    /// # Panics
    ///
    /// Never: the document contains no non-serializable values.
    #[must_use]
    pub fn to_canonical_json(&self) -> String {
        serde_json::to_string(self).expect("topology document serializes")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Two partitions over two hosts, kfactor 1, two sites per host: the
    /// smallest document exercising the master-last layout.
    fn sample() -> Topology {
        Topology {
            hostcount: 2,
            kfactor: 1,
            sites_per_host: 2,
            partitions: vec![
                TopologyPartition { partition_id: 0, master: 0, replicas: vec![1, 0] },
                TopologyPartition { partition_id: 1, master: 1, replicas: vec![0, 1] },
            ],
        }
    }

    // -- partitions_for_host --

    #[test]
    fn partitions_for_host_any_role() {
        let topo = sample();
        assert_eq!(topo.partitions_for_host(0, false), vec![0, 1]);
        assert_eq!(topo.partitions_for_host(1, false), vec![0, 1]);
        assert_eq!(topo.partitions_for_host(9, false), Vec::<PartitionId>::new());
    }

    #[test]
    fn partitions_for_host_only_masters() {
        let topo = sample();
        assert_eq!(topo.partitions_for_host(0, true), vec![0]);
        assert_eq!(topo.partitions_for_host(1, true), vec![1]);
    }

    #[test]
    fn partitions_for_host_round_trips_replica_sets() {
        let topo = sample();
        for host_id in [0, 1] {
            let expected: Vec<PartitionId> = topo
                .partitions
                .iter()
                .filter(|p| p.replicas.contains(&host_id))
                .map(|p| p.partition_id)
                .collect();
            assert_eq!(topo.partitions_for_host(host_id, false), expected);
        }
    }

    // -- add_hosts --

    #[test]
    fn add_hosts_increments_hostcount() {
        let mut topo = sample();
        topo.add_hosts(2).unwrap();
        assert_eq!(topo.hostcount, 4);
    }

    #[test]
    fn add_hosts_rejects_bad_deltas() {
        let mut topo = sample();
        for added in [0, 1, 3, 4] {
            assert_eq!(
                topo.add_hosts(added),
                Err(TopologyError::InvalidHostDelta { added, kfactor: 1 }),
                "delta {added} should be rejected for kfactor 1"
            );
        }
        assert_eq!(topo.hostcount, 2);
    }

    // -- add_partitions --

    #[test]
    fn add_partitions_appends_with_master_last() {
        let mut topo = sample();
        let mut additions = BTreeMap::new();
        additions.insert(3, vec![0, 1]);
        additions.insert(2, vec![1, 0]);
        topo.add_partitions(additions).unwrap();

        assert_eq!(topo.partitions.len(), 4);
        // Re-sorted by id.
        let ids: Vec<PartitionId> = topo.partitions.iter().map(|p| p.partition_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        // Master is the last supplied host.
        assert_eq!(topo.partitions[2].master, 0);
        assert_eq!(topo.partitions[3].master, 1);
    }

    #[test]
    fn add_partitions_rejects_duplicates_and_empties() {
        let mut topo = sample();
        let dup = BTreeMap::from([(0, vec![0, 1])]);
        assert_eq!(
            topo.add_partitions(dup),
            Err(TopologyError::DuplicatePartition { partition_id: 0 })
        );
        let empty = BTreeMap::from([(5, Vec::new())]);
        assert_eq!(
            topo.add_partitions(empty),
            Err(TopologyError::EmptyReplicaList { partition_id: 5 })
        );
    }

    // -- validate --

    #[test]
    fn validate_accepts_sample() {
        sample().validate().unwrap();
    }

    #[test]
    fn validate_rejects_short_replica_list() {
        let mut topo = sample();
        topo.partitions[0].replicas.pop();
        assert!(matches!(topo.validate(), Err(TopologyError::ReplicaCount { .. })));
    }

    #[test]
    fn validate_rejects_repeated_replica() {
        let mut topo = sample();
        topo.partitions[0].replicas = vec![0, 0];
        assert_eq!(
            topo.validate(),
            Err(TopologyError::RepeatedReplica { partition_id: 0, host_id: 0 })
        );
    }

    #[test]
    fn validate_rejects_master_outside_replicas() {
        let mut topo = sample();
        topo.partitions[0].master = 7;
        assert_eq!(
            topo.validate(),
            Err(TopologyError::MasterNotInReplicas { partition_id: 0, master: 7 })
        );
    }

    #[test]
    fn validate_rejects_uneven_site_counts() {
        let mut topo = sample();
        topo.sites_per_host = 3;
        assert!(matches!(topo.validate(), Err(TopologyError::SiteCountMismatch { .. })));
    }

    // -- codec --

    #[test]
    fn canonical_json_field_order_is_stable() {
        let json = sample().to_canonical_json();
        assert!(json.starts_with(r#"{"hostcount":2,"kfactor":1,"sites_per_host":2,"partitions":["#));
        assert!(json.contains(r#"{"partition_id":0,"master":0,"replicas":[1,0]}"#));
    }

    #[test]
    fn canonical_json_round_trips() {
        let topo = sample();
        let back: Topology = serde_json::from_str(&topo.to_canonical_json()).unwrap();
        assert_eq!(back, topo);
        assert_eq!(back.to_canonical_json(), topo.to_canonical_json());
    }
}
