//! Funding-graph clustering

pub mod builder;
pub mod union_find;

pub use builder::{
    build_clusters, Cluster, ClusterMembership, Clustering, ClusteringStats, MIN_FUNDING_AMOUNT,
};
pub use union_find::UnionFind;
