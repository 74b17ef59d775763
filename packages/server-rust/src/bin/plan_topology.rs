//! `plan-topology`: plan a cluster topology document from the command line.
//!
//! The outermost process boundary: flag parsing, the
//! `VOLT_REPLICA_FALLBACK` environment lookup, and log subscriber setup all
//! happen here; the planner library itself never reads the environment.
//!
//! Host group tags are supplied as a JSON object keyed by host id:
//!
//! ```json
//! { "0": { "rack": "dc1.rack1", "buddy": "0" },
//!   "1": { "rack": "dc1.rack2", "buddy": "0" } }
//! ```
//!
//! Without a groups file, hosts `0..host_count` share a single rack and
//! buddy group.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use voltgrid_core::HostId;
use voltgrid_server::cluster::{plan_topology, ClusterConfig, HostTag, TopologyRequest};

#[derive(Debug, Parser)]
#[command(name = "plan-topology", about = "Plan a VoltGrid cluster topology document")]
struct Args {
    /// Number of hosts in the cluster.
    #[arg(long, short = 'H')]
    host_count: u32,

    /// Partition slots per host.
    #[arg(long, short = 's')]
    sites_per_host: u32,

    /// Replication factor beyond the master.
    #[arg(long, short = 'k', default_value_t = 0)]
    kfactor: u32,

    /// JSON file mapping host ids to rack and buddy group tags.
    #[arg(long)]
    host_groups: Option<PathBuf>,

    /// Force the round-robin fallback strategy.
    #[arg(long, env = "VOLT_REPLICA_FALLBACK")]
    replica_fallback: bool,
}

/// Raw per-host tag as written in the groups file.
#[derive(Debug, Deserialize)]
struct RawTag {
    rack: String,
    buddy: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ClusterConfig {
        host_count: args.host_count,
        sites_per_host: args.sites_per_host,
        kfactor: args.kfactor,
    };

    let mut request = match &args.host_groups {
        None => TopologyRequest::with_uniform_groups(config),
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading host groups from {}", path.display()))?;
            let tags: BTreeMap<HostId, RawTag> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing host groups from {}", path.display()))?;
            let host_tags = tags
                .into_iter()
                .map(|(host_id, tag)| Ok((host_id, HostTag::parse(&tag.rack, &tag.buddy)?)))
                .collect::<Result<_, voltgrid_server::PlannerError>>()?;
            TopologyRequest {
                config,
                host_tags,
                partition_masters: BTreeMap::new(),
                partition_replicas: BTreeMap::new(),
                force_fallback: false,
            }
        }
    };
    request.force_fallback = args.replica_fallback;

    let topology = plan_topology(&request).context("planning topology")?;
    println!("{}", topology.to_canonical_json());
    Ok(())
}
