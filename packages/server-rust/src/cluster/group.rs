//! Host group labels and the rack group tree.
//!
//! Hosts carry a dotted rack label (`"dc1.rack7"`) describing their position
//! in the physical fault-domain hierarchy, plus a flat buddy tag. The
//! [`GroupTree`] is the owning tree the placement search walks: interior
//! nodes own their children in a `BTreeMap` keyed by label component (so
//! every iteration is lexicographic and deterministic), leaf groups own the
//! ids of the hosts currently visible to the search.
//!
//! Hosts are hidden from the tree once saturated and restored on backtrack;
//! the set of registered labels (and therefore the leaf group count) never
//! changes after construction.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use voltgrid_core::HostId;

use super::error::{PlannerError, PlannerResult};

/// Parses a dotted group label into its components.
///
/// Components are trimmed; an empty component (including a leading,
/// trailing, or doubled dot) is an error.
///
/// # Errors
///
/// [`PlannerError::MalformedGroupLabel`].
pub fn parse_group_label(label: &str) -> PlannerResult<Vec<String>> {
    let components: Vec<String> = label.split('.').map(|c| c.trim().to_string()).collect();
    if components.iter().any(String::is_empty) {
        return Err(PlannerError::MalformedGroupLabel { label: label.to_string() });
    }
    Ok(components)
}

/// Per-host extensible group tag: rack hierarchy plus buddy affinity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostTag {
    /// Parsed rack label components, root first.
    pub rack: Vec<String>,
    /// Flat buddy group tag.
    pub buddy: String,
}

impl HostTag {
    /// Parses the raw `(rackGroup, buddyGroup)` label pair.
    ///
    /// # Errors
    ///
    /// [`PlannerError::MalformedGroupLabel`] for an empty rack component or
    /// an empty buddy tag.
    pub fn parse(rack: &str, buddy: &str) -> PlannerResult<Self> {
        let buddy = buddy.trim();
        if buddy.is_empty() {
            return Err(PlannerError::MalformedGroupLabel { label: buddy.to_string() });
        }
        Ok(Self { rack: parse_group_label(rack)?, buddy: buddy.to_string() })
    }
}

#[derive(Debug, Default)]
struct GroupNode {
    children: BTreeMap<String, GroupNode>,
    hosts: BTreeSet<HostId>,
}

impl GroupNode {
    /// Walks to the node at `path`, creating missing interior nodes.
    fn walk_mut(&mut self, path: &[String]) -> &mut GroupNode {
        let mut node = self;
        for component in path {
            node = node.children.entry(component.clone()).or_default();
        }
        node
    }

    /// Walks to the node at `path` without creating anything.
    fn walk(&self, path: &[String]) -> Option<&GroupNode> {
        let mut node = self;
        for component in path {
            node = node.children.get(component)?;
        }
        Some(node)
    }

    fn walk_to_mut(&mut self, path: &[String]) -> Option<&mut GroupNode> {
        let mut node = self;
        for component in path {
            node = node.children.get_mut(component)?;
        }
        Some(node)
    }

    /// Pre-order flatten: own hosts, then children lexicographically.
    fn flatten_into(&self, out: &mut Vec<VecDeque<HostId>>) {
        if !self.hosts.is_empty() {
            out.push(self.hosts.iter().copied().collect());
        }
        for child in self.children.values() {
            child.flatten_into(out);
        }
    }

    /// Flatten ordered by decreasing distance from `target`: subtrees that
    /// diverge at the shallowest component first, the target's own leaf
    /// group last.
    fn flatten_by_distance(&self, target: &[String], out: &mut Vec<VecDeque<HostId>>) {
        let Some(head) = target.first() else {
            // Target path exhausted: deeper subgroups diverge below the
            // target and come before the target leaf itself.
            for child in self.children.values() {
                child.flatten_into(out);
            }
            if !self.hosts.is_empty() {
                out.push(self.hosts.iter().copied().collect());
            }
            return;
        };

        for (component, child) in &self.children {
            if component != head {
                child.flatten_into(out);
            }
        }
        // Hosts registered at this prefix diverge here: nearer than the
        // siblings above, farther than everything under the match.
        if !self.hosts.is_empty() {
            out.push(self.hosts.iter().copied().collect());
        }
        if let Some(child) = self.children.get(head) {
            child.flatten_by_distance(&target[1..], out);
        }
    }
}

/// The rack group tree driving fault-domain-aware placement.
#[derive(Debug)]
pub struct GroupTree {
    root: GroupNode,
    /// Registered label path per host; survives saturation removal.
    labels: BTreeMap<HostId, Vec<String>>,
}

impl GroupTree {
    /// Builds the tree, inserting every host at its label's leaf path.
    #[must_use]
    pub fn new(host_labels: BTreeMap<HostId, Vec<String>>) -> Self {
        let mut root = GroupNode::default();
        for (&host_id, path) in &host_labels {
            root.walk_mut(path).hosts.insert(host_id);
        }
        Self { root, labels: host_labels }
    }

    /// The registered label path of a host.
    #[must_use]
    pub fn group_of(&self, host_id: HostId) -> Option<&[String]> {
        self.labels.get(&host_id).map(Vec::as_slice)
    }

    /// Hides a host from the search (saturated). Idempotent.
    pub fn remove_host(&mut self, host_id: HostId) {
        if let Some(path) = self.labels.get(&host_id) {
            if let Some(node) = self.root.walk_to_mut(path) {
                node.hosts.remove(&host_id);
            }
        }
    }

    /// Restores a previously hidden host at its registered leaf. Idempotent.
    pub fn add_host(&mut self, host_id: HostId) {
        if let Some(path) = self.labels.get(&host_id) {
            if let Some(node) = self.root.walk_to_mut(path) {
                node.hosts.insert(host_id);
            }
        }
    }

    /// Whether the host is currently visible to the search.
    #[must_use]
    pub fn contains(&self, host_id: HostId) -> bool {
        self.labels
            .get(&host_id)
            .and_then(|path| self.root.walk(path))
            .is_some_and(|node| node.hosts.contains(&host_id))
    }

    /// Number of leaf groups (distinct registered labels). Stable across
    /// saturation removal.
    #[must_use]
    pub fn leaf_group_count(&self) -> usize {
        self.labels.values().collect::<BTreeSet<_>>().len()
    }

    /// Flattens the visible hosts into one deque per leaf group.
    ///
    /// With a target label, deques are ordered by decreasing distance from
    /// it: sibling subtrees at the shallowest differing component first,
    /// the target's own leaf group last. Without a target, the canonical
    /// lexicographic pre-order is returned. Empty leaf groups are skipped.
    #[must_use]
    pub fn sort_hosts_by_distance(&self, target: Option<&[String]>) -> Vec<VecDeque<HostId>> {
        let mut out = Vec::new();
        match target {
            Some(path) => self.root.flatten_by_distance(path, &mut out),
            None => self.root.flatten_into(&mut out),
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(entries: &[(HostId, &str)]) -> GroupTree {
        let labels = entries
            .iter()
            .map(|&(h, label)| (h, parse_group_label(label).unwrap()))
            .collect();
        GroupTree::new(labels)
    }

    fn deques(groups: &[&[HostId]]) -> Vec<VecDeque<HostId>> {
        groups.iter().map(|g| g.iter().copied().collect()).collect()
    }

    // -- label parsing --

    #[test]
    fn parse_splits_and_trims_components() {
        assert_eq!(parse_group_label("dc1.rack7").unwrap(), vec!["dc1", "rack7"]);
        assert_eq!(parse_group_label(" dc1 . rack7 ").unwrap(), vec!["dc1", "rack7"]);
        assert_eq!(parse_group_label("0").unwrap(), vec!["0"]);
    }

    #[test]
    fn parse_rejects_empty_components() {
        for label in ["", ".", "dc1.", ".rack7", "dc1..rack7", "dc1. .rack7"] {
            assert_eq!(
                parse_group_label(label),
                Err(PlannerError::MalformedGroupLabel { label: label.to_string() }),
                "label {label:?} should be rejected"
            );
        }
    }

    #[test]
    fn host_tag_rejects_empty_buddy() {
        assert!(HostTag::parse("dc1", "").is_err());
        assert_eq!(
            HostTag::parse("dc1.rack7", "b0").unwrap(),
            HostTag { rack: vec!["dc1".to_string(), "rack7".to_string()], buddy: "b0".to_string() }
        );
    }

    // -- tree structure --

    #[test]
    fn leaf_group_count_counts_distinct_labels() {
        let t = tree(&[(0, "0.0"), (1, "0.0"), (2, "0.1"), (3, "1.0")]);
        assert_eq!(t.leaf_group_count(), 3);
    }

    #[test]
    fn canonical_flatten_is_lexicographic() {
        let t = tree(&[(3, "1.0"), (0, "0.0"), (2, "0.1"), (1, "0.0")]);
        assert_eq!(t.sort_hosts_by_distance(None), deques(&[&[0, 1], &[2], &[3]]));
    }

    #[test]
    fn distance_order_puts_shallowest_divergence_first() {
        let t = tree(&[(0, "0.0"), (1, "0.0"), (2, "0.1"), (3, "1.0"), (4, "1.1")]);
        let target = parse_group_label("0.0").unwrap();
        // Subtree "1" diverges at the root (farthest), then sibling "0.1",
        // then the target leaf "0.0" itself.
        assert_eq!(
            t.sort_hosts_by_distance(Some(&target)),
            deques(&[&[3], &[4], &[2], &[0, 1]])
        );
    }

    #[test]
    fn distance_order_with_single_level_labels() {
        let t = tree(&[(0, "a"), (1, "b"), (2, "c")]);
        let target = parse_group_label("b").unwrap();
        assert_eq!(t.sort_hosts_by_distance(Some(&target)), deques(&[&[0], &[2], &[1]]));
    }

    // -- visibility toggling --

    #[test]
    fn remove_and_add_host_round_trip() {
        let mut t = tree(&[(0, "0.0"), (1, "0.1")]);
        assert!(t.contains(0));

        t.remove_host(0);
        assert!(!t.contains(0));
        assert_eq!(t.sort_hosts_by_distance(None), deques(&[&[1]]));
        // Idempotent.
        t.remove_host(0);

        t.add_host(0);
        assert!(t.contains(0));
        t.add_host(0);
        assert_eq!(t.sort_hosts_by_distance(None), deques(&[&[0], &[1]]));
    }

    #[test]
    fn leaf_group_count_survives_saturation_removal() {
        let mut t = tree(&[(0, "0.0"), (1, "0.1")]);
        t.remove_host(0);
        assert_eq!(t.leaf_group_count(), 2);
    }

    #[test]
    fn group_of_reports_registered_path() {
        let t = tree(&[(0, "dc1.rack7")]);
        assert_eq!(t.group_of(0), Some(["dc1".to_string(), "rack7".to_string()].as_slice()));
        assert_eq!(t.group_of(9), None);
    }
}
