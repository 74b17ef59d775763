//! Buddy placement: disjoint k-safe host subsets, each planned on its own.
//!
//! Hosts sharing a buddy tag form an independent placement universe that
//! owns a contiguous range of the partition id space, sized proportionally
//! to the group's host share. Each universe is solved by the group-aware
//! strategy over just its own hosts and partitions, so replicas never cross
//! buddy boundaries and a failure stays contained to one universe.

use std::collections::{BTreeMap, BTreeSet};

use voltgrid_core::{HostId, PartitionId, TopologyPartition};

use super::super::config::ClusterConfig;
use super::super::error::{PlannerError, PlannerResult};
use super::super::group::{GroupTree, HostTag};
use super::super::model::PlanningModel;
use super::group_aware;

/// Runs the buddy strategy.
///
/// Returns `Ok(None)` when fewer than two buddy groups exist; the caller
/// falls through to the group-aware strategy without treating this as an
/// error.
///
/// # Errors
///
/// [`PlannerError::InsufficientBuddyGroup`] when the smallest possible
/// group cannot be k-safe on its own; [`PlannerError::PlacementInfeasible`]
/// when a group's partition range cannot fill its hosts' sites exactly or
/// its group-aware sub-run fails.
pub fn place(
    config: &ClusterConfig,
    tags: &BTreeMap<HostId, HostTag>,
    partition_masters: &BTreeMap<PartitionId, HostId>,
    partition_replicas: &BTreeMap<PartitionId, BTreeSet<HostId>>,
) -> PlannerResult<Option<Vec<TopologyPartition>>> {
    let mut groups: BTreeMap<&str, Vec<HostId>> = BTreeMap::new();
    for (&host_id, tag) in tags {
        groups.entry(tag.buddy.as_str()).or_default().push(host_id);
    }
    if groups.len() < 2 {
        return Ok(None);
    }

    let group_count = groups.len();
    let per_group = config.host_count / u32::try_from(group_count).expect("group count fits u32");
    let required = config.kfactor + 1;
    if per_group < required {
        return Err(PlannerError::InsufficientBuddyGroup {
            group_count,
            host_count: config.host_count,
            per_group,
            required,
        });
    }

    let partition_count = u64::from(config.partition_count());
    let total_hosts = u64::from(config.host_count);
    let replicas_per_partition = u64::from(required);

    let mut partitions = Vec::with_capacity(config.partition_count() as usize);
    let mut cumulative_hosts = 0u64;
    let mut range_start = 0u64;
    for (buddy, host_ids) in &groups {
        cumulative_hosts += host_ids.len() as u64;
        // Cumulative proportional boundary; the last group ends at the full
        // partition count, absorbing any rounding remainder.
        let range_end = partition_count * cumulative_hosts / total_hosts;
        let range: Vec<PartitionId> = (range_start..range_end)
            .map(|p| PartitionId::try_from(p).expect("partition id fits u32"))
            .collect();

        let slots = (range_end - range_start) * replicas_per_partition;
        let capacity = host_ids.len() as u64 * u64::from(config.sites_per_host);
        if slots != capacity {
            tracing::debug!(
                buddy,
                slots,
                capacity,
                "buddy group partition range does not fill its hosts"
            );
            return Err(PlannerError::PlacementInfeasible {
                partition_id: PartitionId::try_from(range_start).expect("partition id fits u32"),
            });
        }

        let labels: BTreeMap<HostId, Vec<String>> = host_ids
            .iter()
            .map(|&h| (h, tags[&h].rack.clone()))
            .collect();
        let mut model = PlanningModel::new(
            config.sites_per_host,
            config.kfactor,
            labels.clone(),
            range.iter().copied(),
        );
        let mut tree = GroupTree::new(labels);

        let masters: BTreeMap<PartitionId, HostId> = partition_masters
            .iter()
            .filter(|(pid, _)| range.contains(*pid))
            .map(|(&pid, &h)| (pid, h))
            .collect();
        let replicas: BTreeMap<PartitionId, BTreeSet<HostId>> = partition_replicas
            .iter()
            .filter(|(pid, _)| range.contains(*pid))
            .map(|(&pid, hosts)| (pid, hosts.clone()))
            .collect();

        group_aware::place(&mut model, &mut tree, &masters, &replicas)?;
        partitions.extend(model.into_partitions()?);
        range_start = range_end;
    }

    Ok(Some(partitions))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
