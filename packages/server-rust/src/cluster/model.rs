//! Mutable planning records: host and partition side tables plus the
//! replication peer multigraph.
//!
//! The model owns everything by id. Hosts and partitions live in `BTreeMap`
//! side tables keyed by `HostId` / `PartitionId`, and the multigraph of
//! replication peerings is a nested map `host -> peer -> {partition}`, so
//! there is no cyclic ownership and every iteration order is sorted and
//! deterministic. Strategies mutate the model only through
//! [`PlanningModel::assign_master`], [`PlanningModel::assign_replica`], and
//! [`PlanningModel::unassign_replica`].

use std::collections::{BTreeMap, BTreeSet};

use voltgrid_core::{HostId, PartitionId, TopologyPartition};

use super::error::{PlannerError, PlannerResult};

/// Planning record for one host.
#[derive(Debug, Clone)]
pub struct HostSlot {
    pub host_id: HostId,
    /// Rack label components, root first.
    pub rack: Vec<String>,
    /// Partitions this host masters.
    pub masters: BTreeSet<PartitionId>,
    /// Partitions this host replicates without mastering.
    pub replicas: BTreeSet<PartitionId>,
}

impl HostSlot {
    /// Total partition slots in use: masters plus non-master replicas.
    #[must_use]
    pub fn site_count(&self) -> usize {
        self.masters.len() + self.replicas.len()
    }

    /// Whether this host holds the partition in either role.
    #[must_use]
    pub fn holds(&self, partition_id: PartitionId) -> bool {
        self.masters.contains(&partition_id) || self.replicas.contains(&partition_id)
    }
}

/// Planning record for one partition.
#[derive(Debug, Clone)]
pub struct PartitionSlot {
    pub partition_id: PartitionId,
    pub master: Option<HostId>,
    /// Non-master replica hosts.
    pub replicas: BTreeSet<HostId>,
    /// Remaining assignments, counting the master. Starts at `kfactor + 1`.
    pub needed_replicas: u32,
}

impl PartitionSlot {
    /// Current holders in sorted order: the master (if any) and all replicas.
    #[must_use]
    pub fn holders(&self) -> BTreeSet<HostId> {
        let mut holders = self.replicas.clone();
        if let Some(master) = self.master {
            holders.insert(master);
        }
        holders
    }
}

/// The shared mutable context all three placement strategies drive.
#[derive(Debug)]
pub struct PlanningModel {
    sites_per_host: u32,
    hosts: BTreeMap<HostId, HostSlot>,
    partitions: BTreeMap<PartitionId, PartitionSlot>,
    /// Replication multigraph: `host -> peer -> partitions they share`.
    peers: BTreeMap<HostId, BTreeMap<HostId, BTreeSet<PartitionId>>>,
}

impl PlanningModel {
    /// Creates a model covering the given hosts and partition ids, with
    /// every partition needing `kfactor + 1` assignments.
    #[must_use]
    pub fn new(
        sites_per_host: u32,
        kfactor: u32,
        hosts: BTreeMap<HostId, Vec<String>>,
        partition_ids: impl IntoIterator<Item = PartitionId>,
    ) -> Self {
        let hosts = hosts
            .into_iter()
            .map(|(host_id, rack)| {
                (
                    host_id,
                    HostSlot {
                        host_id,
                        rack,
                        masters: BTreeSet::new(),
                        replicas: BTreeSet::new(),
                    },
                )
            })
            .collect();
        let partitions = partition_ids
            .into_iter()
            .map(|partition_id| {
                (
                    partition_id,
                    PartitionSlot {
                        partition_id,
                        master: None,
                        replicas: BTreeSet::new(),
                        needed_replicas: kfactor + 1,
                    },
                )
            })
            .collect();
        Self { sites_per_host, hosts, partitions, peers: BTreeMap::new() }
    }

    #[must_use]
    pub fn sites_per_host(&self) -> u32 {
        self.sites_per_host
    }

    /// Sorted partition ids covered by this model.
    #[must_use]
    pub fn partition_ids(&self) -> Vec<PartitionId> {
        self.partitions.keys().copied().collect()
    }

    /// Sorted host ids covered by this model.
    #[must_use]
    pub fn host_ids(&self) -> Vec<HostId> {
        self.hosts.keys().copied().collect()
    }

    /// Whether the host holds the partition in either role. False for
    /// unknown hosts.
    #[must_use]
    pub fn host_holds(&self, host_id: HostId, partition_id: PartitionId) -> bool {
        self.hosts.get(&host_id).is_some_and(|h| h.holds(partition_id))
    }

    pub fn host(&self, host_id: HostId) -> PlannerResult<&HostSlot> {
        self.hosts.get(&host_id).ok_or(PlannerError::UnknownHost { host_id })
    }

    pub fn partition(&self, partition_id: PartitionId) -> PlannerResult<&PartitionSlot> {
        self.partitions
            .get(&partition_id)
            .ok_or(PlannerError::UnknownPartition { partition_id })
    }

    /// Slots in use on a host. Zero for unknown hosts.
    #[must_use]
    pub fn host_site_count(&self, host_id: HostId) -> usize {
        self.hosts.get(&host_id).map_or(0, HostSlot::site_count)
    }

    /// Number of replication edges between two hosts (distinct partitions
    /// they share).
    #[must_use]
    pub fn connections_between(&self, a: HostId, b: HostId) -> usize {
        self.peers
            .get(&a)
            .and_then(|peers| peers.get(&b))
            .map_or(0, BTreeSet::len)
    }

    /// Sum, over every partition the host holds, of that partition's current
    /// holder count. The load measure for candidate ordering.
    #[must_use]
    pub fn replication_factor(&self, host_id: HostId) -> usize {
        let Some(host) = self.hosts.get(&host_id) else { return 0 };
        host.masters
            .iter()
            .chain(host.replicas.iter())
            .filter_map(|pid| self.partitions.get(pid))
            .map(|p| p.holders().len())
            .sum()
    }

    /// Number of partitions the host masters.
    #[must_use]
    pub fn master_count(&self, host_id: HostId) -> usize {
        self.hosts.get(&host_id).map_or(0, |h| h.masters.len())
    }

    /// Lowest-id partition still needing assignments, ignoring `parked` ids.
    #[must_use]
    pub fn next_unfilled_partition(
        &self,
        parked: &BTreeSet<PartitionId>,
    ) -> Option<PartitionId> {
        self.partitions
            .values()
            .find(|p| p.needed_replicas > 0 && !parked.contains(&p.partition_id))
            .map(|p| p.partition_id)
    }

    /// Assigns the master of a partition.
    ///
    /// # Errors
    ///
    /// Unknown ids, a second master, a repeated holder, an exhausted
    /// partition, or a full host.
    pub fn assign_master(
        &mut self,
        partition_id: PartitionId,
        host_id: HostId,
    ) -> PlannerResult<()> {
        self.check_assignable(partition_id, host_id)?;
        let partition = self.partitions.get_mut(&partition_id).expect("checked");
        if partition.master.is_some() {
            return Err(PlannerError::DuplicateAssignment { partition_id, host_id });
        }
        partition.master = Some(host_id);
        partition.needed_replicas -= 1;
        self.hosts
            .get_mut(&host_id)
            .expect("checked")
            .masters
            .insert(partition_id);
        Ok(())
    }

    /// Assigns a replica, recording a replication edge between the new
    /// holder and every existing holder of the partition.
    ///
    /// # Errors
    ///
    /// Unknown ids, a repeated holder, an exhausted partition
    /// ([`PlannerError::OverReplication`]), or a full host.
    pub fn assign_replica(
        &mut self,
        partition_id: PartitionId,
        host_id: HostId,
    ) -> PlannerResult<()> {
        self.check_assignable(partition_id, host_id)?;
        let holders = self.partitions.get(&partition_id).expect("checked").holders();
        for peer in holders {
            self.peers
                .entry(host_id)
                .or_default()
                .entry(peer)
                .or_default()
                .insert(partition_id);
            self.peers
                .entry(peer)
                .or_default()
                .entry(host_id)
                .or_default()
                .insert(partition_id);
        }
        let partition = self.partitions.get_mut(&partition_id).expect("checked");
        partition.replicas.insert(host_id);
        partition.needed_replicas -= 1;
        self.hosts
            .get_mut(&host_id)
            .expect("checked")
            .replicas
            .insert(partition_id);
        Ok(())
    }

    /// Exact undo of [`Self::assign_replica`], for backtracking.
    ///
    /// # Errors
    ///
    /// Unknown ids or a host that is not a replica of the partition.
    pub fn unassign_replica(
        &mut self,
        partition_id: PartitionId,
        host_id: HostId,
    ) -> PlannerResult<()> {
        let partition = self
            .partitions
            .get_mut(&partition_id)
            .ok_or(PlannerError::UnknownPartition { partition_id })?;
        if !partition.replicas.remove(&host_id) {
            return Err(PlannerError::Internal(format!(
                "host {host_id} is not a replica of partition {partition_id}"
            )));
        }
        partition.needed_replicas += 1;
        let holders = partition.holders();
        self.hosts
            .get_mut(&host_id)
            .ok_or(PlannerError::UnknownHost { host_id })?
            .replicas
            .remove(&partition_id);
        for peer in holders {
            if let Some(edges) = self.peers.get_mut(&host_id).and_then(|m| m.get_mut(&peer)) {
                edges.remove(&partition_id);
            }
            if let Some(edges) = self.peers.get_mut(&peer).and_then(|m| m.get_mut(&host_id)) {
                edges.remove(&partition_id);
            }
        }
        Ok(())
    }

    /// Verifies the completed assignment: every partition fully replicated
    /// and every host holding exactly `sites_per_host` partitions. Parked
    /// partitions (rejoin shortfalls) are exempt, as are their hosts'
    /// totals when any partition is parked.
    ///
    /// # Errors
    ///
    /// [`PlannerError::PlacementInfeasible`] for an unexpectedly unfilled
    /// partition; [`PlannerError::Internal`] for a host total mismatch.
    pub fn verify_complete(&self, parked: &BTreeSet<PartitionId>) -> PlannerResult<()> {
        for partition in self.partitions.values() {
            if partition.needed_replicas > 0 && !parked.contains(&partition.partition_id) {
                return Err(PlannerError::PlacementInfeasible {
                    partition_id: partition.partition_id,
                });
            }
        }
        if parked.is_empty() {
            let expected = self.sites_per_host as usize;
            for host in self.hosts.values() {
                if host.site_count() != expected {
                    return Err(PlannerError::Internal(format!(
                        "host {} holds {} partitions, expected {expected}",
                        host.host_id,
                        host.site_count()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Emits the canonical per-partition document entries: non-master
    /// replicas in ascending host order, master appended last.
    ///
    /// # Errors
    ///
    /// [`PlannerError::Internal`] if any partition lacks a master.
    pub fn into_partitions(self) -> PlannerResult<Vec<TopologyPartition>> {
        self.partitions
            .into_values()
            .map(|p| {
                let master = p.master.ok_or_else(|| {
                    PlannerError::Internal(format!("partition {} has no master", p.partition_id))
                })?;
                let mut replicas: Vec<HostId> =
                    p.replicas.iter().copied().filter(|&h| h != master).collect();
                replicas.push(master);
                Ok(TopologyPartition { partition_id: p.partition_id, master, replicas })
            })
            .collect()
    }

    fn check_assignable(
        &self,
        partition_id: PartitionId,
        host_id: HostId,
    ) -> PlannerResult<()> {
        let partition = self.partition(partition_id)?;
        let host = self.host(host_id)?;
        if partition.needed_replicas == 0 {
            return Err(PlannerError::OverReplication { partition_id });
        }
        if host.holds(partition_id) {
            return Err(PlannerError::DuplicateAssignment { partition_id, host_id });
        }
        if host.site_count() >= self.sites_per_host as usize {
            return Err(PlannerError::OverCapacity { host_id });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn model(host_count: u32, sites_per_host: u32, kfactor: u32, partitions: u32) -> PlanningModel {
        let hosts = (0..host_count).map(|h| (h, vec![h.to_string()])).collect();
        PlanningModel::new(sites_per_host, kfactor, hosts, 0..partitions)
    }

    // -- assignment bookkeeping --

    #[test]
    fn assign_master_updates_both_sides() {
        let mut m = model(2, 2, 1, 2);
        m.assign_master(0, 1).unwrap();

        let p = m.partition(0).unwrap();
        assert_eq!(p.master, Some(1));
        assert_eq!(p.needed_replicas, 1);
        assert!(m.host(1).unwrap().masters.contains(&0));
        assert_eq!(m.master_count(1), 1);
        assert_eq!(m.host_site_count(1), 1);
    }

    #[test]
    fn assign_replica_records_peer_edges() {
        let mut m = model(3, 2, 2, 2);
        m.assign_master(0, 0).unwrap();
        m.assign_replica(0, 1).unwrap();
        m.assign_replica(0, 2).unwrap();

        // Host 2 joined a partition already held by 0 and 1.
        assert_eq!(m.connections_between(2, 0), 1);
        assert_eq!(m.connections_between(2, 1), 1);
        assert_eq!(m.connections_between(0, 1), 1);
        assert_eq!(m.connections_between(0, 0), 0);
    }

    #[test]
    fn unassign_replica_is_exact_undo() {
        let mut m = model(3, 2, 2, 2);
        m.assign_master(0, 0).unwrap();
        m.assign_replica(0, 1).unwrap();
        m.assign_replica(0, 2).unwrap();

        m.unassign_replica(0, 2).unwrap();
        assert_eq!(m.connections_between(2, 0), 0);
        assert_eq!(m.connections_between(2, 1), 0);
        assert_eq!(m.connections_between(0, 1), 1);
        assert_eq!(m.partition(0).unwrap().needed_replicas, 1);
        assert_eq!(m.host_site_count(2), 0);
    }

    #[test]
    fn replication_factor_sums_holder_counts() {
        let mut m = model(3, 4, 2, 3);
        m.assign_master(0, 0).unwrap();
        m.assign_replica(0, 1).unwrap();
        m.assign_master(1, 1).unwrap();

        // Host 1 holds partition 0 (2 holders) and partition 1 (1 holder).
        assert_eq!(m.replication_factor(1), 3);
        assert_eq!(m.replication_factor(0), 2);
        assert_eq!(m.replication_factor(2), 0);
    }

    // -- invariant enforcement --

    #[test]
    fn over_replication_is_detected() {
        let mut m = model(3, 2, 0, 2);
        m.assign_master(0, 0).unwrap();
        assert_eq!(
            m.assign_replica(0, 1),
            Err(PlannerError::OverReplication { partition_id: 0 })
        );
    }

    #[test]
    fn duplicate_holder_is_rejected() {
        let mut m = model(2, 4, 1, 2);
        m.assign_master(0, 0).unwrap();
        assert_eq!(
            m.assign_replica(0, 0),
            Err(PlannerError::DuplicateAssignment { partition_id: 0, host_id: 0 })
        );
    }

    #[test]
    fn capacity_is_enforced() {
        let mut m = model(2, 1, 1, 2);
        m.assign_master(0, 0).unwrap();
        assert_eq!(m.assign_replica(1, 0), Err(PlannerError::OverCapacity { host_id: 0 }));
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let mut m = model(1, 1, 0, 1);
        assert_eq!(m.assign_master(5, 0), Err(PlannerError::UnknownPartition { partition_id: 5 }));
        assert_eq!(m.assign_master(0, 5), Err(PlannerError::UnknownHost { host_id: 5 }));
    }

    // -- completion checks --

    #[test]
    fn verify_complete_flags_unfilled_partitions() {
        let mut m = model(1, 1, 0, 1);
        assert_eq!(
            m.verify_complete(&BTreeSet::new()),
            Err(PlannerError::PlacementInfeasible { partition_id: 0 })
        );
        m.assign_master(0, 0).unwrap();
        m.verify_complete(&BTreeSet::new()).unwrap();
    }

    #[test]
    fn verify_complete_exempts_parked_partitions() {
        let m = model(1, 1, 0, 1);
        let parked = BTreeSet::from([0]);
        m.verify_complete(&parked).unwrap();
    }

    #[test]
    fn into_partitions_emits_master_last() {
        let mut m = model(3, 1, 2, 1);
        m.assign_master(0, 1).unwrap();
        m.assign_replica(0, 0).unwrap();
        m.assign_replica(0, 2).unwrap();

        let parts = m.into_partitions().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].master, 1);
        assert_eq!(parts[0].replicas, vec![0, 2, 1]);
    }

    #[test]
    fn next_unfilled_partition_skips_parked() {
        let mut m = model(2, 4, 1, 3);
        m.assign_master(0, 0).unwrap();
        m.assign_replica(0, 1).unwrap();
        assert_eq!(m.next_unfilled_partition(&BTreeSet::new()), Some(1));
        let parked = BTreeSet::from([1]);
        assert_eq!(m.next_unfilled_partition(&parked), Some(2));
    }
}
