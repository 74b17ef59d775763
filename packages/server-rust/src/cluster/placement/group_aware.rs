//! Group-aware placement: backtracking search over the rack group tree.
//!
//! Masters are spread round-robin over the canonical host order, then the
//! remaining replica slots are filled by a recursive search that prefers
//! candidates in other rack groups and with the fewest existing peerings to
//! the partition's master, undoing and retrying on dead ends. Hosts vanish
//! from the tree as they saturate and reappear on backtrack.
//!
//! With pre-assigned masters or replicas (a rejoin run) the search honors
//! every seed and parks partitions it cannot complete instead of failing;
//! a fresh run that cannot be completed is an error the caller may answer
//! by falling back to round-robin placement.

use std::collections::{BTreeMap, BTreeSet};

use voltgrid_core::{HostId, PartitionId};

use super::super::error::{PlannerError, PlannerResult};
use super::super::group::GroupTree;
use super::super::model::PlanningModel;

/// Runs the group-aware strategy over the model, mutating it to a complete
/// (or, for rejoin runs, maximal) assignment.
///
/// # Errors
///
/// [`PlannerError::PlacementInfeasible`] when a fresh run exhausts every
/// candidate permutation; seed-shape errors and internal invariant
/// violations from the model are propagated unchanged.
pub fn place(
    model: &mut PlanningModel,
    tree: &mut GroupTree,
    partition_masters: &BTreeMap<PartitionId, HostId>,
    partition_replicas: &BTreeMap<PartitionId, BTreeSet<HostId>>,
) -> PlannerResult<()> {
    let rejoin = !partition_masters.is_empty() || !partition_replicas.is_empty();

    // Master distribution: canonical order, restarting when exhausted.
    // Pre-assigned masters consume their slot without advancing the cursor;
    // hosts already filled by seeded masters are skipped.
    let canonical: Vec<HostId> =
        tree.sort_hosts_by_distance(None).into_iter().flatten().collect();
    let sites = model.sites_per_host() as usize;
    let mut cursor = canonical.iter().copied().cycle();
    for partition_id in model.partition_ids() {
        let master = match partition_masters.get(&partition_id) {
            Some(&host_id) => host_id,
            None => {
                let mut next = || {
                    cursor.next().ok_or_else(|| {
                        PlannerError::Internal("no hosts to master".to_string())
                    })
                };
                let mut host_id = next()?;
                let mut skipped = 0;
                while model.host_site_count(host_id) >= sites {
                    skipped += 1;
                    if skipped > canonical.len() {
                        return Err(PlannerError::Internal(
                            "every host is full before master distribution finished".to_string(),
                        ));
                    }
                    host_id = next()?;
                }
                host_id
            }
        };
        model.assign_master(partition_id, master)?;
    }

    // Pre-existing replicas are honored before any new selection.
    for (&partition_id, hosts) in partition_replicas {
        for &host_id in hosts {
            model.assign_replica(partition_id, host_id)?;
        }
    }

    // Hosts already saturated by masters and seeds are hidden up front.
    for host_id in model.host_ids() {
        if model.host_site_count(host_id) >= sites {
            tree.remove_host(host_id);
        }
    }

    let mut parked = BTreeSet::new();
    if !fill_next(model, tree, rejoin, &mut parked)? {
        let partition_id = model.next_unfilled_partition(&parked).unwrap_or_default();
        return Err(PlannerError::PlacementInfeasible { partition_id });
    }

    if !parked.is_empty() {
        tracing::debug!(
            parked = parked.len(),
            "rejoin placement left partitions under-replicated"
        );
    }
    model.verify_complete(&parked)
}

/// Fills one replica slot of the lowest unfilled partition and recurses.
///
/// Returns `Ok(false)` when no candidate leads to a complete assignment,
/// leaving the model exactly as found.
fn fill_next(
    model: &mut PlanningModel,
    tree: &mut GroupTree,
    rejoin: bool,
    parked: &mut BTreeSet<PartitionId>,
) -> PlannerResult<bool> {
    let Some(partition_id) = model.next_unfilled_partition(parked) else {
        return Ok(true);
    };
    let partition = model.partition(partition_id)?;
    let current_replicas = partition.replicas.clone();
    let master = partition.master.ok_or_else(|| {
        PlannerError::Internal(format!("partition {partition_id} has no master"))
    })?;
    let master_group = tree
        .group_of(master)
        .ok_or(PlannerError::UnknownHost { host_id: master })?
        .to_vec();

    // Candidate order: distance deques from the master's group, each
    // stably sorted by existing peerings to the master, then overall
    // replication load, then mastered partitions.
    let mut candidates: Vec<HostId> = Vec::new();
    for deque in tree.sort_hosts_by_distance(Some(&master_group)) {
        let mut bucket: Vec<HostId> = deque.into_iter().collect();
        bucket.sort_by_key(|&h| {
            (
                model.connections_between(h, master),
                model.replication_factor(h),
                model.master_count(h),
            )
        });
        candidates.extend(bucket);
    }

    let sites = model.sites_per_host() as usize;
    let multi_group = tree.leaf_group_count() > 1;
    let qualified: Vec<HostId> = candidates
        .into_iter()
        .filter(|&h| {
            model.host_site_count(h) < sites
                && !model.host_holds(h, partition_id)
                && (!multi_group
                    || !current_replicas.is_empty()
                    || tree.group_of(h) != Some(master_group.as_slice()))
        })
        .collect();

    let replica_groups: BTreeSet<Vec<String>> = current_replicas
        .iter()
        .filter_map(|&r| tree.group_of(r).map(<[String]>::to_vec))
        .collect();
    let preferred: Vec<HostId> = qualified
        .iter()
        .copied()
        .filter(|&h| {
            tree.group_of(h).is_some_and(|g| {
                g != master_group.as_slice() && !replica_groups.contains(g)
            })
        })
        .collect();

    let tries = if preferred.is_empty() { qualified } else { preferred };
    for host_id in tries {
        model.assign_replica(partition_id, host_id)?;
        let saturated = model.host_site_count(host_id) >= sites;
        if saturated {
            tree.remove_host(host_id);
        }
        if fill_next(model, tree, rejoin, parked)? {
            return Ok(true);
        }
        if saturated {
            tree.add_host(host_id);
        }
        model.unassign_replica(partition_id, host_id)?;
    }

    // A rejoin run parks what it cannot complete: the missing peers are
    // expected to rejoin later.
    if rejoin {
        parked.insert(partition_id);
        return fill_next(model, tree, rejoin, parked);
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
