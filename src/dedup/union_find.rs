//! Disjoint-set forest used for the duplicate-group union pass.
//!
//! The forest is owned by a single writer: pair generation may run in
//! parallel, but every `union` happens on one thread in a fixed order.

/// How two members came to be joined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evidence {
    /// Identical fingerprints.
    Exact,
    /// Similarity at or above the threshold.
    Similar(f64),
}

/// Union-find with union by rank and path halving.
///
/// Each root also records what kind of evidence merged its set and the
/// weakest similarity edge that did so.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
    size: Vec<usize>,
    exact: Vec<bool>,
    weakest: Vec<Option<f64>>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
            size: vec![1; n],
            exact: vec![false; n],
            weakest: vec![None; n],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Returns the root of `x`'s set.
    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Joins the sets of `a` and `b`. Returns `false` if they were already joined.
    ///
    /// Evidence is only recorded when the edge actually merges two sets.
    pub fn union(&mut self, a: usize, b: usize, evidence: Evidence) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }

        let (root, child) = if self.rank[ra] >= self.rank[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        if self.rank[root] == self.rank[child] {
            self.rank[root] = self.rank[root].saturating_add(1);
        }
        self.parent[child] = root;
        self.size[root] += self.size[child];
        self.exact[root] |= self.exact[child];
        self.weakest[root] = min_option(self.weakest[root], self.weakest[child]);

        match evidence {
            Evidence::Exact => self.exact[root] = true,
            Evidence::Similar(sim) => {
                self.weakest[root] = min_option(self.weakest[root], Some(sim));
            }
        }
        true
    }

    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Size of the set containing `x`.
    pub fn set_size(&mut self, x: usize) -> usize {
        let root = self.find(x);
        self.size[root]
    }

    /// Whether the set containing `x` was merged by an exact edge.
    pub fn has_exact_evidence(&mut self, x: usize) -> bool {
        let root = self.find(x);
        self.exact[root]
    }

    /// Weakest similarity edge that merged the set containing `x`.
    pub fn weakest_similarity(&mut self, x: usize) -> Option<f64> {
        let root = self.find(x);
        self.weakest[root]
    }

    /// Sets with two or more members, each listed in ascending index order.
    ///
    /// Sets are ordered by their smallest member.
    pub fn components(&mut self) -> Vec<Vec<usize>> {
        let n = self.len();
        let mut by_root: Vec<Vec<usize>> = vec![Vec::new(); n];
        for x in 0..n {
            let root = self.find(x);
            by_root[root].push(x);
        }
        let mut sets: Vec<Vec<usize>> = by_root.into_iter().filter(|s| s.len() >= 2).collect();
        sets.sort_by_key(|s| s[0]);
        sets
    }
}

fn min_option(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}
