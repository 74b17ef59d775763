//! Cluster topology planner.
//!
//! Provides the configuration validator, the rack group tree, the mutable
//! planning model, the three placement strategies, and the planner entry
//! point that turns a [`TopologyRequest`] into a canonical
//! [`Topology`] document.
//!
//! The planner is a single-threaded, synchronous function: its inputs are
//! snapshots, nothing suspends or blocks, and identical requests produce
//! byte-identical documents. Every choice point iterates sorted views.

pub mod config;
pub mod error;
pub mod group;
pub mod model;
pub mod placement;

use std::collections::{BTreeMap, BTreeSet};

use voltgrid_core::{HostId, PartitionId, Topology, TopologyPartition};

// ---------------------------------------------------------------------------
// Re-exports -- flat public API
// ---------------------------------------------------------------------------

pub use config::ClusterConfig;
pub use error::{PlannerError, PlannerResult};
pub use group::{parse_group_label, GroupTree, HostTag};
pub use model::{HostSlot, PartitionSlot, PlanningModel};

// ---------------------------------------------------------------------------
// TopologyRequest
// ---------------------------------------------------------------------------

/// A complete planning request: sizing, per-host group tags, optional
/// pre-assignments from a rejoin, and the explicit fallback override.
///
/// The `force_fallback` flag is the in-process form of the
/// `VOLT_REPLICA_FALLBACK` environment knob; the environment lookup itself
/// stays at the CLI boundary.
#[derive(Debug, Clone)]
pub struct TopologyRequest {
    pub config: ClusterConfig,
    /// Rack and buddy tags per host id.
    pub host_tags: BTreeMap<HostId, HostTag>,
    /// Pre-assigned masters to preserve (rejoin).
    pub partition_masters: BTreeMap<PartitionId, HostId>,
    /// Pre-assigned replicas to preserve (rejoin).
    pub partition_replicas: BTreeMap<PartitionId, BTreeSet<HostId>>,
    /// Forces the round-robin strategy regardless of group tags.
    pub force_fallback: bool,
}

impl TopologyRequest {
    /// A fresh request for hosts `0..host_count`, all in one rack and buddy
    /// group.
    #[must_use]
    pub fn with_uniform_groups(config: ClusterConfig) -> Self {
        let host_tags = (0..config.host_count)
            .map(|h| (h, HostTag { rack: vec!["0".to_string()], buddy: "0".to_string() }))
            .collect();
        Self {
            config,
            host_tags,
            partition_masters: BTreeMap::new(),
            partition_replicas: BTreeMap::new(),
            force_fallback: false,
        }
    }

    /// Host ids in ascending order.
    #[must_use]
    pub fn host_ids(&self) -> Vec<HostId> {
        self.host_tags.keys().copied().collect()
    }

    /// Whether pre-assignments constrain this request.
    #[must_use]
    pub fn is_rejoin(&self) -> bool {
        !self.partition_masters.is_empty() || !self.partition_replicas.is_empty()
    }

    /// Gates the request: configuration predicates, host tag coverage, and
    /// pre-assignment references.
    ///
    /// # Errors
    ///
    /// The first failed check, in the order above.
    pub fn validate(&self) -> PlannerResult<()> {
        self.config.validate()?;
        if self.host_tags.len() != self.config.host_count as usize {
            return Err(PlannerError::HostGroupCountMismatch {
                expected: self.config.host_count,
                actual: self.host_tags.len(),
            });
        }
        let partition_count = self.config.partition_count();
        for (&partition_id, &host_id) in &self.partition_masters {
            if partition_id >= partition_count {
                return Err(PlannerError::UnknownPartition { partition_id });
            }
            if !self.host_tags.contains_key(&host_id) {
                return Err(PlannerError::UnknownHost { host_id });
            }
        }
        for (&partition_id, hosts) in &self.partition_replicas {
            if partition_id >= partition_count {
                return Err(PlannerError::UnknownPartition { partition_id });
            }
            if let Some(&host_id) = hosts.iter().find(|h| !self.host_tags.contains_key(h)) {
                return Err(PlannerError::UnknownHost { host_id });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Planner entry
// ---------------------------------------------------------------------------

/// Plans a complete topology for the request.
///
/// Strategy selection: the explicit fallback override wins; otherwise the
/// buddy strategy runs when more than one buddy group is tagged; otherwise
/// the group-aware search. A fresh request whose search is infeasible
/// degrades to round-robin placement with a warning; that path always
/// succeeds for a valid configuration.
///
/// # Errors
///
/// Request-shape errors from [`TopologyRequest::validate`], buddy sizing
/// errors, and internal invariant violations. Placement infeasibility is
/// only surfaced for rejoin requests.
pub fn plan_topology(request: &TopologyRequest) -> PlannerResult<Topology> {
    request.validate()?;
    let config = &request.config;
    let rejoin = request.is_rejoin();

    if request.force_fallback {
        tracing::debug!("replica fallback forced; using round-robin placement");
        return Ok(placement::fallback::place(config, &request.host_ids()));
    }

    let attempt = match placement::buddy::place(
        config,
        &request.host_tags,
        &request.partition_masters,
        &request.partition_replicas,
    ) {
        Ok(Some(partitions)) => {
            tracing::debug!("buddy placement succeeded");
            Ok(partitions)
        }
        Ok(None) => run_group_aware(request),
        Err(err) => Err(err),
    };

    let topology = match attempt {
        Ok(partitions) => assemble(config, partitions),
        Err(PlannerError::PlacementInfeasible { partition_id }) if !rejoin => {
            tracing::warn!(
                partition_id,
                "group-aware placement infeasible; falling back to round-robin"
            );
            placement::fallback::place(config, &request.host_ids())
        }
        Err(err) => return Err(err),
    };

    if !rejoin {
        topology
            .validate()
            .map_err(|defect| PlannerError::Internal(defect.to_string()))?;
    }
    Ok(topology)
}

fn run_group_aware(request: &TopologyRequest) -> PlannerResult<Vec<TopologyPartition>> {
    let labels: BTreeMap<HostId, Vec<String>> = request
        .host_tags
        .iter()
        .map(|(&h, tag)| (h, tag.rack.clone()))
        .collect();
    let mut model = PlanningModel::new(
        request.config.sites_per_host,
        request.config.kfactor,
        labels.clone(),
        0..request.config.partition_count(),
    );
    let mut tree = GroupTree::new(labels);
    placement::group_aware::place(
        &mut model,
        &mut tree,
        &request.partition_masters,
        &request.partition_replicas,
    )?;
    model.into_partitions()
}

fn assemble(config: &ClusterConfig, partitions: Vec<TopologyPartition>) -> Topology {
    Topology {
        hostcount: config.host_count,
        kfactor: config.kfactor,
        sites_per_host: config.sites_per_host,
        partitions,
    }
}

// ---------------------------------------------------------------------------
// Integration tests
// ---------------------------------------------------------------------------


/// Property-based tests covering the universal topology invariants across
/// randomized valid configurations.
#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    /// Valid sizing triples within test-friendly bounds.
    fn arb_valid_config() -> impl Strategy<Value = ClusterConfig> {
        (1u32..=8, 1u32..=6, 0u32..=3).prop_filter_map(
            "sizing fails the configuration validator",
            |(host_count, sites_per_host, kfactor)| {
                let config = ClusterConfig { host_count, sites_per_host, kfactor };
                config.validate().ok().map(|()| config)
            },
        )
    }

    fn tagged_request(config: ClusterConfig, tags: Vec<(&str, &str)>) -> TopologyRequest {
        let host_tags = tags
            .into_iter()
            .enumerate()
            .map(|(h, (rack, buddy))| {
                (HostId::try_from(h).unwrap(), HostTag::parse(rack, buddy).unwrap())
            })
            .collect();
        TopologyRequest {
            config,
            host_tags,
            partition_masters: BTreeMap::new(),
            partition_replicas: BTreeMap::new(),
            force_fallback: false,
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Every emitted topology satisfies the document invariants, spreads
        /// masters within one of each other, answers host lookups
        /// consistently, and is byte-stable across replanning.
        #[test]
        fn uniform_cluster_invariants(config in arb_valid_config()) {
            let req = TopologyRequest::with_uniform_groups(config);
            let topo = plan_topology(&req).unwrap();
            topo.validate().unwrap();
            prop_assert_eq!(topo.partitions.len(), config.partition_count() as usize);

            let mut master_counts: BTreeMap<HostId, u32> =
                req.host_ids().into_iter().map(|h| (h, 0)).collect();
            for p in &topo.partitions {
                *master_counts.get_mut(&p.master).unwrap() += 1;
            }
            let min = master_counts.values().min().unwrap();
            let max = master_counts.values().max().unwrap();
            prop_assert!(max - min <= 1, "master counts {:?}", master_counts);

            for host_id in req.host_ids() {
                let expected: Vec<PartitionId> = topo
                    .partitions
                    .iter()
                    .filter(|p| p.replicas.contains(&host_id))
                    .map(|p| p.partition_id)
                    .collect();
                prop_assert_eq!(topo.partitions_for_host(host_id, false), expected);
            }

            let replanned = plan_topology(&req).unwrap();
            prop_assert_eq!(replanned.to_canonical_json(), topo.to_canonical_json());
        }

        /// With two equally sized racks and k-safety on, every partition
        /// spans both racks.
        #[test]
        fn balanced_racks_spread_every_partition(
            (half, sites_per_host, kfactor) in (1u32..=3, 1u32..=4, 1u32..=2)
                .prop_filter("sizing fails the configuration validator", |&(half, s, k)| {
                    ClusterConfig { host_count: half * 2, sites_per_host: s, kfactor: k }
                        .validate()
                        .is_ok()
                })
        ) {
            let config =
                ClusterConfig { host_count: half * 2, sites_per_host, kfactor };
            let tags = (0..config.host_count)
                .map(|h| (if h < half { "0" } else { "1" }, "0"))
                .collect();
            let topo = plan_topology(&tagged_request(config, tags)).unwrap();

            topo.validate().unwrap();
            for p in &topo.partitions {
                let racks: BTreeSet<bool> = p.replicas.iter().map(|&h| h >= half).collect();
                prop_assert_eq!(racks.len(), 2, "partition {} is rack-local", p.partition_id);
            }
        }

        /// With two buddy groups, no partition's replicas cross the buddy
        /// boundary.
        #[test]
        fn buddy_boundaries_are_never_crossed(
            (half, sites_per_host) in (2u32..=4, 1u32..=4)
                .prop_filter("per-buddy partition range must be whole", |&(half, s)| {
                    (half * s) % 2 == 0
                })
        ) {
            let config = ClusterConfig { host_count: half * 2, sites_per_host, kfactor: 1 };
            let tags = (0..config.host_count)
                .map(|h| (if h < half { "0" } else { "1" }, if h < half { "a" } else { "b" }))
                .collect();
            let topo = plan_topology(&tagged_request(config, tags)).unwrap();

            topo.validate().unwrap();
            let boundary = config.partition_count() / 2;
            for p in &topo.partitions {
                let in_first = p.partition_id < boundary;
                prop_assert!(
                    p.replicas.iter().all(|&h| (h < half) == in_first),
                    "partition {} crossed its buddy boundary: {:?}",
                    p.partition_id,
                    p.replicas
                );
            }
        }

        /// Seeding every master from a prior plan preserves them all.
        #[test]
        fn reseeded_masters_survive_replanning(config in arb_valid_config()) {
            let req = TopologyRequest::with_uniform_groups(config);
            let first = plan_topology(&req).unwrap();

            let mut rejoin = req.clone();
            rejoin.partition_masters =
                first.partitions.iter().map(|p| (p.partition_id, p.master)).collect();
            let second = plan_topology(&rejoin).unwrap();

            for (a, b) in first.partitions.iter().zip(&second.partitions) {
                prop_assert_eq!(a.master, b.master);
            }
        }
    }
}
