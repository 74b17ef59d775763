//! Cluster configuration and its validity predicates.

use serde::{Deserialize, Serialize};

use super::error::{PlannerError, PlannerResult};

/// The immutable sizing triple of a planning request.
///
/// All derived quantities follow from `(host_count, sites_per_host,
/// kfactor)`; the partition count is `host_count * sites_per_host /
/// (kfactor + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub host_count: u32,
    pub sites_per_host: u32,
    pub kfactor: u32,
}

impl ClusterConfig {
    /// Number of logical partitions this configuration produces.
    #[must_use]
    pub fn partition_count(&self) -> u32 {
        self.host_count * self.sites_per_host / (self.kfactor + 1)
    }

    /// Total partition-replica slots across the cluster.
    #[must_use]
    pub fn total_sites(&self) -> u32 {
        self.host_count * self.sites_per_host
    }

    /// Validates the configuration. Checks run in order; the first failed
    /// predicate wins and its diagnostic is returned verbatim.
    ///
    /// # Errors
    ///
    /// [`PlannerError::InvalidConfig`] with the failed predicate's diagnostic.
    pub fn validate(&self) -> PlannerResult<()> {
        if self.host_count == 0 {
            return Err(PlannerError::InvalidConfig(
                "host count must be positive".to_string(),
            ));
        }
        if self.sites_per_host == 0 {
            return Err(PlannerError::InvalidConfig(
                "sites per host must be positive".to_string(),
            ));
        }
        if self.host_count <= self.kfactor {
            return Err(PlannerError::InvalidConfig(format!(
                "host count {} must be greater than kfactor {}",
                self.host_count, self.kfactor
            )));
        }
        if self.partition_count() == 0 {
            return Err(PlannerError::InvalidConfig(
                "configuration produces zero partitions".to_string(),
            ));
        }
        if self.total_sites() % (self.kfactor + 1) != 0 {
            return Err(PlannerError::InvalidConfig(format!(
                "total sites {} is not divisible by kfactor+1 ({})",
                self.total_sites(),
                self.kfactor + 1
            )));
        }
        Ok(())
    }

    /// Re-validates after a host addition: the delta over `prior_host_count`
    /// must be positive, no larger than `kfactor + 1`, and a multiple of
    /// `kfactor + 1`.
    ///
    /// # Errors
    ///
    /// [`PlannerError::InvalidConfig`] with the failed predicate's diagnostic.
    pub fn validate_add_hosts(&self, prior_host_count: u32) -> PlannerResult<()> {
        let group = self.kfactor + 1;
        let added = self.host_count.saturating_sub(prior_host_count);
        if self.host_count <= prior_host_count {
            return Err(PlannerError::InvalidConfig(format!(
                "host count {} does not grow the prior count {}",
                self.host_count, prior_host_count
            )));
        }
        if added > group {
            return Err(PlannerError::InvalidConfig(format!(
                "cannot add {added} hosts at once: at most kfactor+1 ({group})"
            )));
        }
        if added % group != 0 {
            return Err(PlannerError::InvalidConfig(format!(
                "added host count {added} must be a multiple of kfactor+1 ({group})"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
