//! Exact, near-duplicate and hybrid duplicate detection over an item set.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::ItemId;
use crate::error::RefineError;
use crate::hashing::Fingerprint;
use crate::similarity::{Embedding, SimilarPair, SimilarityEngine};

use super::union_find::{DisjointSet, Evidence};

/// Default similarity threshold for near-duplicates.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.95;

/// Duplicate detection method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DedupMethod {
    /// Identical content fingerprints.
    Hash,
    /// Embedding similarity at or above the threshold.
    Semantic,
    /// Hash grouping first, then similarity over the remainder.
    #[default]
    Hybrid,
}

impl DedupMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupMethod::Hash => "hash",
            DedupMethod::Semantic => "semantic",
            DedupMethod::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for DedupMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DedupMethod {
    type Err = RefineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hash" => Ok(DedupMethod::Hash),
            "semantic" => Ok(DedupMethod::Semantic),
            "hybrid" => Ok(DedupMethod::Hybrid),
            other => Err(RefineError::Validation(format!(
                "unknown dedup method '{}' (expected hash, semantic or hybrid)",
                other
            ))),
        }
    }
}

/// The per-item facts the deduplicator needs.
#[derive(Debug, Clone)]
pub struct DedupCandidate {
    pub item_id: ItemId,
    /// Ingestion order; the final survivor tie-break.
    pub ordinal: u64,
    pub fingerprint: Option<Fingerprint>,
    pub embedding: Option<Embedding>,
    pub quality: f64,
}

impl DedupCandidate {
    pub fn new(item_id: ItemId, ordinal: u64, quality: f64) -> Self {
        Self {
            item_id,
            ordinal,
            fingerprint: None,
            embedding: None,
            quality,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    fn quality_key(&self) -> f64 {
        if self.quality.is_nan() {
            0.0
        } else {
            self.quality
        }
    }
}

/// A set of two or more items judged equivalent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Kind of evidence that formed the group.
    pub method: DedupMethod,
    /// Members in ingestion order.
    pub members: Vec<ItemId>,
    /// The member that is kept.
    pub survivor: ItemId,
    /// Weakest similarity edge that joined the group; `None` for exact groups.
    pub similarity: Option<f64>,
}

impl DuplicateGroup {
    /// Members other than the survivor.
    pub fn rejected(&self) -> impl Iterator<Item = &ItemId> {
        self.members.iter().filter(move |id| **id != self.survivor)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Result of one deduplication pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupOutcome {
    pub method: DedupMethod,
    pub groups: Vec<DuplicateGroup>,
    pub candidates: usize,
}

impl DedupOutcome {
    /// Every non-survivor group member.
    pub fn rejected(&self) -> BTreeSet<ItemId> {
        self.groups
            .iter()
            .flat_map(|g| g.rejected().cloned())
            .collect()
    }

    /// Number of items rejected as duplicates.
    pub fn duplicates_found(&self) -> usize {
        self.groups.iter().map(|g| g.len().saturating_sub(1)).sum()
    }
}

/// Groups duplicate items and picks one survivor per group.
///
/// Survivor policy: highest quality wins, ties go to the earliest ingestion
/// ordinal. Groups are always disjoint.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    similarity_threshold: f64,
    engine: SimilarityEngine,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl Deduplicator {
    /// Creates a deduplicator; the threshold is clamped to [0, 1].
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold: similarity_threshold.clamp(0.0, 1.0),
            engine: SimilarityEngine::default(),
        }
    }

    pub fn builder() -> DeduplicatorBuilder {
        DeduplicatorBuilder::new()
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    /// Finds duplicate groups among `candidates` using `method`.
    pub fn find_duplicates(&self, candidates: &[DedupCandidate], method: DedupMethod) -> DedupOutcome {
        let mut forest = DisjointSet::new(candidates.len());

        match method {
            DedupMethod::Hash => {
                self.union_exact(candidates, &mut forest);
            }
            DedupMethod::Semantic => {
                let all: Vec<usize> = (0..candidates.len()).collect();
                self.union_similar(candidates, &all, &mut forest);
            }
            DedupMethod::Hybrid => {
                let hash_groups = self.union_exact(candidates, &mut forest);
                let representatives = hybrid_representatives(candidates, &hash_groups);
                self.union_similar(candidates, &representatives, &mut forest);
            }
        }

        let mut groups = Vec::new();
        for members in forest.components() {
            let head = members[0];
            let exact = forest.has_exact_evidence(head);
            let similarity = forest.weakest_similarity(head);
            let tag = match (exact, similarity.is_some()) {
                (true, true) => DedupMethod::Hybrid,
                (false, true) => DedupMethod::Semantic,
                _ => DedupMethod::Hash,
            };
            groups.push(build_group(candidates, members, tag, similarity));
        }

        tracing::debug!(
            method = %method,
            candidates = candidates.len(),
            groups = groups.len(),
            "Duplicate detection finished"
        );

        DedupOutcome {
            method,
            groups,
            candidates: candidates.len(),
        }
    }

    /// Unions candidates sharing a fingerprint; returns the exact groups.
    fn union_exact(&self, candidates: &[DedupCandidate], forest: &mut DisjointSet) -> Vec<Vec<usize>> {
        let mut by_fingerprint: HashMap<&Fingerprint, Vec<usize>> = HashMap::new();
        let mut first_seen: Vec<&Fingerprint> = Vec::new();

        for (idx, candidate) in candidates.iter().enumerate() {
            if let Some(fp) = &candidate.fingerprint {
                let members = by_fingerprint.entry(fp).or_default();
                if members.is_empty() {
                    first_seen.push(fp);
                }
                members.push(idx);
            }
        }

        let mut groups = Vec::new();
        for fp in first_seen {
            let Some(members) = by_fingerprint.remove(fp) else {
                continue;
            };
            if members.len() < 2 {
                continue;
            }
            for &other in &members[1..] {
                forest.union(members[0], other, Evidence::Exact);
            }
            groups.push(members);
        }
        groups
    }

    /// Unions similar candidates among `subset` (indices into `candidates`).
    ///
    /// Edges are applied strongest first, so the weakest merging edge of a
    /// group is its bottleneck similarity regardless of input order.
    fn union_similar(&self, candidates: &[DedupCandidate], subset: &[usize], forest: &mut DisjointSet) {
        let (indices, embeddings): (Vec<usize>, Vec<Embedding>) = subset
            .iter()
            .filter_map(|&idx| candidates[idx].embedding.clone().map(|e| (idx, e)))
            .unzip();

        let mut pairs: Vec<SimilarPair> = self
            .engine
            .similar_pairs(&embeddings, self.similarity_threshold);
        pairs.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| (a.left, a.right).cmp(&(b.left, b.right)))
        });

        for pair in pairs {
            forest.union(
                indices[pair.left],
                indices[pair.right],
                Evidence::Similar(pair.similarity),
            );
        }
    }
}

/// For hybrid runs: the survivor of each exact group plus every candidate
/// outside an exact group, in candidate order.
fn hybrid_representatives(candidates: &[DedupCandidate], hash_groups: &[Vec<usize>]) -> Vec<usize> {
    let mut grouped = vec![false; candidates.len()];
    let mut reps = Vec::new();
    for members in hash_groups {
        for &idx in members {
            grouped[idx] = true;
        }
        if let Some(survivor) = pick_survivor(candidates, members) {
            reps.push(survivor);
        }
    }
    reps.extend((0..candidates.len()).filter(|idx| !grouped[*idx]));
    reps.sort_unstable();
    reps
}

fn build_group(
    candidates: &[DedupCandidate],
    mut members: Vec<usize>,
    method: DedupMethod,
    similarity: Option<f64>,
) -> DuplicateGroup {
    members.sort_by_key(|&idx| (candidates[idx].ordinal, idx));
    let survivor = pick_survivor(candidates, &members).unwrap_or(members[0]);
    DuplicateGroup {
        method,
        members: members
            .iter()
            .map(|&idx| candidates[idx].item_id.clone())
            .collect(),
        survivor: candidates[survivor].item_id.clone(),
        similarity,
    }
}

/// Highest quality, then lowest ordinal, then lowest index.
fn pick_survivor(candidates: &[DedupCandidate], members: &[usize]) -> Option<usize> {
    members.iter().copied().min_by(|&a, &b| {
        let (ca, cb) = (&candidates[a], &candidates[b]);
        match cb.quality_key().total_cmp(&ca.quality_key()) {
            Ordering::Equal => (ca.ordinal, a).cmp(&(cb.ordinal, b)),
            other => other,
        }
    })
}

/// Builder for creating a Deduplicator with custom settings.
#[derive(Debug, Clone)]
pub struct DeduplicatorBuilder {
    similarity_threshold: f64,
    workers: Option<usize>,
}

impl Default for DeduplicatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeduplicatorBuilder {
    pub fn new() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            workers: None,
        }
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Number of threads used for pair generation.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn build(self) -> Deduplicator {
        let mut dedup = Deduplicator::new(self.similarity_threshold);
        if let Some(workers) = self.workers {
            dedup.engine = SimilarityEngine::new(workers);
        }
        dedup
    }
}
