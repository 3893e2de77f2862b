//! Endpoint ranking for session establishment.
//!
//! Produces the order in which endpoints are tried: a priority per
//! endpoint computed from the load-balancing policy, plus a random
//! tie-break, sorted ascending by `(priority, random)`. Ranking is pure;
//! connection attempts happen in the session manager.

use std::str::FromStr;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

use crate::config::NodeConfig;

/// Endpoint load-balancing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancing {
    /// Uniform random order.
    #[default]
    Random,
    /// Prefer endpoints whose hostname is textually closest to ours.
    NearestHostname,
    /// Declared configuration order.
    InOrder,
    /// Always the first endpoint, random among the rest.
    FirstOrRandom,
    /// Rotate the preferred endpoint on every ranking.
    RoundRobin,
}

impl FromStr for LoadBalancing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random" => Ok(LoadBalancing::Random),
            "nearest_hostname" => Ok(LoadBalancing::NearestHostname),
            "in_order" => Ok(LoadBalancing::InOrder),
            "first_or_random" => Ok(LoadBalancing::FirstOrRandom),
            "round_robin" => Ok(LoadBalancing::RoundRobin),
            _ => Err(format!("unknown load balancing policy: {s}")),
        }
    }
}

/// An endpoint with its computed connection priority and random
/// tie-break. Used only for ordering, discarded after connection.
#[derive(Debug, Clone)]
pub struct ShuffleHost {
    pub node: NodeConfig,
    pub priority: usize,
    pub random: u64,
}

/// Ranks candidate endpoints for connection attempts.
///
/// Holds the caller-local state the policies need: the local hostname for
/// [`LoadBalancing::NearestHostname`] and the rotation offset for
/// [`LoadBalancing::RoundRobin`]. Given a fixed policy, offset, and RNG
/// seed the produced order is deterministic.
#[derive(Debug)]
pub struct HostSelector {
    policy: LoadBalancing,
    local_hostname: String,
    round_robin_offset: AtomicUsize,
}

impl HostSelector {
    pub fn new(policy: LoadBalancing) -> Self {
        Self {
            policy,
            local_hostname: local_hostname(),
            round_robin_offset: AtomicUsize::new(0),
        }
    }

    /// Override the local hostname used by the nearest-hostname policy.
    pub fn with_local_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.local_hostname = hostname.into();
        self
    }

    pub fn policy(&self) -> LoadBalancing {
        self.policy
    }

    /// Rank endpoints with a caller-supplied RNG for the tie-break.
    pub fn rank_with<R: Rng>(&self, nodes: &[NodeConfig], rng: &mut R) -> Vec<ShuffleHost> {
        let offset = match self.policy {
            LoadBalancing::RoundRobin => {
                self.round_robin_offset.fetch_add(1, Ordering::Relaxed) % nodes.len().max(1)
            }
            _ => 0,
        };

        let mut hosts: Vec<ShuffleHost> = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| ShuffleHost {
                priority: self.priority(node, index, nodes.len(), offset),
                random: rng.gen(),
                node: node.clone(),
            })
            .collect();

        hosts.sort_by(|lhs, rhs| {
            (lhs.priority, lhs.random).cmp(&(rhs.priority, rhs.random))
        });
        hosts
    }

    /// Rank endpoints with a fresh thread-local RNG.
    pub fn rank(&self, nodes: &[NodeConfig]) -> Vec<ShuffleHost> {
        self.rank_with(nodes, &mut rand::thread_rng())
    }

    fn priority(&self, node: &NodeConfig, index: usize, count: usize, offset: usize) -> usize {
        match self.policy {
            LoadBalancing::Random => 0,
            LoadBalancing::InOrder => index,
            LoadBalancing::FirstOrRandom => usize::from(index != 0),
            LoadBalancing::RoundRobin => (index + count - offset) % count.max(1),
            LoadBalancing::NearestHostname => {
                hostname_distance(&self.local_hostname, &node.host)
            }
        }
    }
}

/// Textual distance between two hostnames: positionwise character
/// mismatches plus the length difference.
pub fn hostname_distance(local: &str, remote: &str) -> usize {
    let mismatches = local
        .bytes()
        .zip(remote.bytes())
        .filter(|(a, b)| a != b)
        .count();
    mismatches + local.len().abs_diff(remote.len())
}

fn local_hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
