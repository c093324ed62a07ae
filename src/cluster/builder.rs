//! Wallet clusters from shared funding sources
//!
//! Wallets funded by the same sender are joined into one cluster:
//! - transfers below [`MIN_FUNDING_AMOUNT`] are ignored
//! - joins are transitive (A-B via one funder, B-C via another gives A-B-C)
//! - funders are visited in address order, so ids are stable for a given
//!   input

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::chain::FundingSource;
use crate::cluster::union_find::UnionFind;

/// Smallest transfer that counts as a funding relationship
pub const MIN_FUNDING_AMOUNT: f64 = 100.0;

/// A group of wallets sharing at least one funding source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    /// Sequential id, starting at 1
    pub id: u32,
    /// Member wallets, sorted
    pub wallets: Vec<String>,
    pub size: usize,
    /// Funders shared by two or more members
    pub funding_sources: Vec<String>,
    /// Sum of shared-funder transfers into members
    pub total_funding: f64,
}

/// A wallet's place in a cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMembership {
    pub cluster_id: u32,
    pub cluster_size: usize,
    /// First shared funder discovered for this wallet
    pub shared_funding_source: String,
}

/// Result of one clustering pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct Clustering {
    /// Largest first
    pub clusters: Vec<Cluster>,
    #[serde(skip)]
    pub membership: HashMap<String, ClusterMembership>,
}

/// Clustering statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusteringStats {
    pub total_clusters: usize,
    pub clustered_wallets: usize,
    pub largest_cluster: usize,
}

impl Clustering {
    pub fn membership_of(&self, wallet: &str) -> Option<&ClusterMembership> {
        self.membership.get(wallet)
    }

    pub fn stats(&self) -> ClusteringStats {
        ClusteringStats {
            total_clusters: self.clusters.len(),
            clustered_wallets: self.membership.len(),
            largest_cluster: self.clusters.iter().map(|c| c.size).max().unwrap_or(0),
        }
    }
}

/// Build clusters from each wallet's funding sources.
///
/// Wallets with no material funder shared with another wallet get no
/// membership entry.
pub fn build_clusters(funding: &HashMap<String, Vec<FundingSource>>) -> Clustering {
    // funder -> wallet -> material amount
    let mut funded_by: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for (wallet, sources) in funding {
        for source in sources {
            if source.amount < MIN_FUNDING_AMOUNT {
                continue;
            }
            *funded_by
                .entry(source.address.to_lowercase())
                .or_default()
                .entry(wallet.to_lowercase())
                .or_default() += source.amount;
        }
    }

    let shared: Vec<(&String, &BTreeMap<String, f64>)> = funded_by
        .iter()
        .filter(|(_, wallets)| wallets.len() >= 2)
        .collect();
    if shared.is_empty() {
        debug!(funders = funded_by.len(), "No shared funding sources");
        return Clustering::default();
    }

    let mut uf = UnionFind::new();
    for (_, wallets) in &shared {
        let mut members = wallets.keys();
        if let Some(first) = members.next() {
            for other in members {
                uf.union(first, other);
            }
        }
    }

    // Ids follow funder order: the first funder touching a set names it
    let mut id_of_root: HashMap<String, u32> = HashMap::new();
    let mut clusters: Vec<Cluster> = Vec::new();
    for (funder, wallets) in &shared {
        let Some(first) = wallets.keys().next() else {
            continue;
        };
        let Some(root) = uf.find(first) else {
            continue;
        };
        let slot = match id_of_root.get(&root) {
            Some(id) => (*id - 1) as usize,
            None => {
                let id = clusters.len() as u32 + 1;
                id_of_root.insert(root, id);
                clusters.push(Cluster {
                    id,
                    wallets: Vec::new(),
                    size: 0,
                    funding_sources: Vec::new(),
                    total_funding: 0.0,
                });
                clusters.len() - 1
            }
        };
        let cluster = &mut clusters[slot];
        cluster.funding_sources.push((*funder).clone());
        cluster.total_funding += wallets.values().sum::<f64>();
    }

    for group in uf.groups() {
        let Some(root) = group.first().and_then(|w| uf.find(w)) else {
            continue;
        };
        if let Some(id) = id_of_root.get(&root) {
            let cluster = &mut clusters[(*id - 1) as usize];
            cluster.wallets = group;
            cluster.wallets.sort();
            cluster.size = cluster.wallets.len();
        }
    }

    let size_of: HashMap<u32, usize> = clusters.iter().map(|c| (c.id, c.size)).collect();
    let mut membership: HashMap<String, ClusterMembership> = HashMap::new();
    for (funder, wallets) in &shared {
        for wallet in wallets.keys() {
            if membership.contains_key(wallet) {
                continue;
            }
            let Some(id) = uf.find(wallet).and_then(|root| id_of_root.get(&root).copied()) else {
                continue;
            };
            membership.insert(
                wallet.clone(),
                ClusterMembership {
                    cluster_id: id,
                    cluster_size: size_of.get(&id).copied().unwrap_or(1),
                    shared_funding_source: (*funder).clone(),
                },
            );
        }
    }

    // Stable: equal sizes keep id order
    clusters.sort_by(|a, b| b.size.cmp(&a.size));

    info!(
        clusters = clusters.len(),
        wallets = membership.len(),
        shared_funders = shared.len(),
        "Built funding clusters"
    );

    Clustering {
        clusters,
        membership,
    }
}
