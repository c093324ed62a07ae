//! Disjoint-set forest over string keys
//!
//! Keys map to dense indices; parent and rank live in flat arrays. Find is
//! iterative with full path compression, union is by rank.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct UnionFind {
    index: HashMap<String, usize>,
    keys: Vec<String>,
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys added
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Add a key as its own singleton set, returning its index
    pub fn insert(&mut self, key: &str) -> usize {
        if let Some(&i) = self.index.get(key) {
            return i;
        }
        let i = self.keys.len();
        self.index.insert(key.to_string(), i);
        self.keys.push(key.to_string());
        self.parent.push(i);
        self.rank.push(0);
        i
    }

    /// Representative key of the set containing `key`
    pub fn find(&mut self, key: &str) -> Option<String> {
        let i = *self.index.get(key)?;
        let root = self.root(i);
        Some(self.keys[root].clone())
    }

    /// Merge the sets of `a` and `b`, adding either key if missing.
    /// Returns false when they were already joined.
    pub fn union(&mut self, a: &str, b: &str) -> bool {
        let a = self.insert(a);
        let b = self.insert(b);
        let (ra, rb) = (self.root(a), self.root(b));
        if ra == rb {
            return false;
        }

        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
        true
    }

    pub fn connected(&mut self, a: &str, b: &str) -> bool {
        match (self.index.get(a).copied(), self.index.get(b).copied()) {
            (Some(a), Some(b)) => self.root(a) == self.root(b),
            _ => false,
        }
    }

    /// All sets, each listed in key insertion order; sets are ordered by
    /// their first-inserted member
    pub fn groups(&mut self) -> Vec<Vec<String>> {
        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<Vec<String>> = Vec::new();
        for i in 0..self.keys.len() {
            let root = self.root(i);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(self.keys[i].clone());
        }
        groups
    }

    fn root(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_is_symmetric_and_transitive() {
        let mut uf = UnionFind::new();
        assert!(uf.union("a", "b"));
        assert!(uf.union("c", "b"));
        assert!(!uf.union("a", "c"));

        assert!(uf.connected("a", "c"));
        assert!(uf.connected("c", "a"));
        assert_eq!(uf.find("a"), uf.find("c"));
    }

    #[test]
    fn test_disjoint_sets_stay_apart() {
        let mut uf = UnionFind::new();
        uf.union("a", "b");
        uf.union("x", "y");
        uf.insert("lonely");

        assert!(!uf.connected("a", "x"));
        assert!(!uf.connected("a", "missing"));
        assert_eq!(uf.find("missing"), None);
        assert_eq!(uf.len(), 5);

        let groups = uf.groups();
        assert_eq!(
            groups,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["x".to_string(), "y".to_string()],
                vec!["lonely".to_string()],
            ]
        );
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let mut uf = UnionFind::new();
        let keys: Vec<String> = (0..100_000).map(|i| format!("w{}", i)).collect();
        for pair in keys.windows(2) {
            uf.union(&pair[0], &pair[1]);
        }
        assert!(uf.connected("w0", "w99999"));
        assert_eq!(uf.groups().len(), 1);
    }
}
