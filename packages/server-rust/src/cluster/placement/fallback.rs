//! Fallback placement: deterministic round-robin, blind to groups.
//!
//! Walks the `host_count * sites_per_host` site slots in order, assigning
//! slot `i` to partition `i mod partition_count` on host `hosts[i /
//! sites_per_host]`. Always succeeds for a valid configuration; used when
//! the group-aware search is infeasible or explicitly forced.

use voltgrid_core::{HostId, PartitionId, Topology, TopologyPartition};

use super::super::config::ClusterConfig;

/// Computes the round-robin topology for the given hosts (ascending order).
#[must_use]
pub fn place(config: &ClusterConfig, hosts: &[HostId]) -> Topology {
    let partition_count = config.partition_count();
    let sites = config.sites_per_host as usize;
    let replicas_per_partition = config.kfactor + 1;

    let mut replica_sets: Vec<Vec<HostId>> = vec![Vec::new(); partition_count as usize];
    for slot in 0..config.total_sites() as usize {
        let partition = slot % partition_count as usize;
        replica_sets[partition].push(hosts[slot / sites]);
    }

    let partitions = replica_sets
        .into_iter()
        .enumerate()
        .map(|(pid, mut replicas)| {
            let partition_id = PartitionId::try_from(pid).expect("partition count fits u32");
            replicas.sort_unstable();
            let master = replicas[(partition_id % replicas_per_partition) as usize];
            // Canonical layout: non-master replicas ascending, master last.
            replicas.retain(|&h| h != master);
            replicas.push(master);
            TopologyPartition { partition_id, master, replicas }
        })
        .collect();

    Topology {
        hostcount: config.host_count,
        kfactor: config.kfactor,
        sites_per_host: config.sites_per_host,
        partitions,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
