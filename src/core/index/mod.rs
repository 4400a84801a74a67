//! # Index Module
//!
//! Sub-linear near-duplicate lookup over perceptual hashes.
//!
//! ## How It Works
//! 1. One BK-tree per hash kind (pHash, dHash, wHash)
//! 2. A query hits every tree the target has a hash for
//! 3. Per-candidate distances are merged and ranked by the smallest one
//!
//! ## Preset Thresholds
//! | Preset     | Max distance |
//! |------------|--------------|
//! | Ultra-Lite | 6            |
//! | Balanced   | 8            |
//! | Accurate   | 12           |

mod bktree;
mod hamming;

pub use bktree::BkTree;
pub use hamming::{hamming_distance, hash_bit_len, is_valid_hash, INFINITE_DISTANCE};

use crate::config::DedupConfig;
use crate::core::records::FileRecord;
use crate::core::store::FeatureStore;
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Bits assumed for similarity scoring when the hash length is unknown
const DEFAULT_HASH_BITS: u32 = 64;

/// The three perceptual hash families kept in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HashKind {
    /// DCT-based perceptual hash
    #[serde(rename = "phash")]
    Perceptual,
    /// Gradient-based difference hash
    #[serde(rename = "dhash")]
    Difference,
    /// Haar wavelet hash
    #[serde(rename = "whash")]
    Wavelet,
}

impl HashKind {
    pub const ALL: [HashKind; 3] = [HashKind::Perceptual, HashKind::Difference, HashKind::Wavelet];

    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Perceptual => "phash",
            HashKind::Difference => "dhash",
            HashKind::Wavelet => "whash",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "phash" | "perceptual" => Some(HashKind::Perceptual),
            "dhash" | "difference" => Some(HashKind::Difference),
            "whash" | "wavelet" => Some(HashKind::Wavelet),
            _ => None,
        }
    }

    fn slot(&self) -> usize {
        match self {
            HashKind::Perceptual => 0,
            HashKind::Difference => 1,
            HashKind::Wavelet => 2,
        }
    }
}

impl std::fmt::Display for HashKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashKind::Perceptual => write!(f, "pHash"),
            HashKind::Difference => write!(f, "dHash"),
            HashKind::Wavelet => write!(f, "wHash"),
        }
    }
}

/// A candidate returned by a near-duplicate query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearDuplicateMatch {
    pub file_id: i64,
    pub file_path: String,
    /// Distance per hash kind that matched within the threshold
    pub distances: BTreeMap<HashKind, u32>,
    /// Smallest of `distances`
    pub min_distance: u32,
    /// `1 - min_distance / hash_bits`, higher is more similar
    pub similarity_score: f64,
}

/// Per-file data the index keeps for lookups after build
#[derive(Debug, Clone)]
struct IndexedFile {
    path: String,
    hashes: [Option<String>; 3],
}

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub indexed_files: usize,
    pub phash_entries: usize,
    pub dhash_entries: usize,
    pub whash_entries: usize,
    pub max_distance: u32,
}

impl std::fmt::Display for IndexStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Search index: {} files (pHash {}, dHash {}, wHash {}), threshold {}",
            self.indexed_files,
            self.phash_entries,
            self.dhash_entries,
            self.whash_entries,
            self.max_distance
        )
    }
}

/// Three BK-trees, one per hash kind, over the stored file features
pub struct NearDuplicateSearchIndex {
    trees: [BkTree<i64>; 3],
    files: HashMap<i64, IndexedFile>,
    max_distance: u32,
    built: bool,
}

impl NearDuplicateSearchIndex {
    /// Create an empty index; the default threshold comes from the config's preset
    pub fn new(config: &DedupConfig) -> Self {
        Self::with_max_distance(config.max_distance())
    }

    /// Create an empty index with an explicit default threshold
    pub fn with_max_distance(max_distance: u32) -> Self {
        Self {
            trees: [BkTree::new(), BkTree::new(), BkTree::new()],
            files: HashMap::new(),
            max_distance,
            built: false,
        }
    }

    /// Default threshold used when a query passes `None`
    pub fn max_distance(&self) -> u32 {
        self.max_distance
    }

    /// Rebuild all three trees from the feature store
    ///
    /// Returns the number of files that contributed at least one hash.
    pub fn build_index(&mut self, store: &dyn FeatureStore) -> Result<usize, StoreError> {
        let records = store.load_records()?;
        Ok(self.build_from_records(&records))
    }

    /// Rebuild all three trees from records already in memory
    pub fn build_from_records<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a FileRecord>,
    ) -> usize {
        for tree in &mut self.trees {
            tree.clear();
        }
        self.files.clear();

        let mut processed = 0;
        for record in records {
            let mut hashes: [Option<String>; 3] = [None, None, None];

            for kind in HashKind::ALL {
                match record.hash(kind) {
                    Some(hash) if is_valid_hash(hash) => {
                        self.trees[kind.slot()].add(hash, record.id);
                        hashes[kind.slot()] = Some(hash.to_string());
                    }
                    Some(hash) => {
                        debug!(file_id = record.id, kind = %kind, hash, "Skipping malformed hash");
                    }
                    None => {}
                }
            }

            if hashes.iter().any(Option::is_some) {
                self.files.insert(
                    record.id,
                    IndexedFile {
                        path: record.path.clone(),
                        hashes,
                    },
                );
                processed += 1;
            }
        }

        self.built = true;
        info!(files = processed, "Built near-duplicate index");
        processed
    }

    /// True once built with at least one non-empty tree
    pub fn is_index_built(&self) -> bool {
        self.built && self.trees.iter().any(|tree| !tree.is_empty())
    }

    /// Find files near the given indexed file, excluding the file itself
    pub fn find_near_duplicates(
        &self,
        file_id: i64,
        max_distance: Option<u32>,
    ) -> Vec<NearDuplicateMatch> {
        if !self.is_index_built() {
            warn!(file_id, "Near-duplicate query on an unbuilt index");
            return Vec::new();
        }

        let Some(target) = self.files.get(&file_id) else {
            debug!(file_id, "File has no indexed hashes");
            return Vec::new();
        };

        let queries: Vec<(HashKind, &str)> = HashKind::ALL
            .iter()
            .filter_map(|kind| {
                target.hashes[kind.slot()]
                    .as_deref()
                    .map(|hash| (*kind, hash))
            })
            .collect();

        self.query(&queries, max_distance.unwrap_or(self.max_distance), Some(file_id))
    }

    /// Find indexed files near a raw hash that need not be indexed itself
    pub fn find_similar_by_hash(
        &self,
        hash_value: &str,
        hash_kind: HashKind,
        max_distance: Option<u32>,
    ) -> Vec<NearDuplicateMatch> {
        if !self.is_index_built() {
            warn!(kind = %hash_kind, "Similarity query on an unbuilt index");
            return Vec::new();
        }
        if !is_valid_hash(hash_value) {
            debug!(hash = hash_value, "Ignoring malformed query hash");
            return Vec::new();
        }

        self.query(
            &[(hash_kind, hash_value)],
            max_distance.unwrap_or(self.max_distance),
            None,
        )
    }

    fn query(
        &self,
        queries: &[(HashKind, &str)],
        threshold: u32,
        exclude: Option<i64>,
    ) -> Vec<NearDuplicateMatch> {
        let mut merged: BTreeMap<i64, BTreeMap<HashKind, u32>> = BTreeMap::new();
        let mut bits: HashMap<HashKind, u32> = HashMap::new();

        for &(kind, hash) in queries {
            bits.insert(kind, hash_bit_len(hash));
            for (candidate, distance) in self.trees[kind.slot()].search(hash, threshold) {
                if Some(candidate) == exclude {
                    continue;
                }
                merged.entry(candidate).or_default().insert(kind, distance);
            }
        }

        let mut results: Vec<NearDuplicateMatch> = merged
            .into_iter()
            .filter_map(|(candidate, distances)| {
                let (&best_kind, &min_distance) =
                    distances.iter().min_by_key(|(_, distance)| **distance)?;
                if min_distance > threshold {
                    return None;
                }

                let max_bits = bits
                    .get(&best_kind)
                    .copied()
                    .filter(|b| *b > 0)
                    .unwrap_or(DEFAULT_HASH_BITS);
                let similarity_score =
                    (1.0 - min_distance as f64 / max_bits as f64).clamp(0.0, 1.0);

                Some(NearDuplicateMatch {
                    file_id: candidate,
                    file_path: self
                        .files
                        .get(&candidate)
                        .map(|f| f.path.clone())
                        .unwrap_or_default(),
                    distances,
                    min_distance,
                    similarity_score,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            a.min_distance
                .cmp(&b.min_distance)
                .then(a.file_id.cmp(&b.file_id))
        });
        results
    }

    /// Entry counts per tree
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            indexed_files: self.files.len(),
            phash_entries: self.trees[HashKind::Perceptual.slot()].len(),
            dhash_entries: self.trees[HashKind::Difference.slot()].len(),
            whash_entries: self.trees[HashKind::Wavelet.slot()].len(),
            max_distance: self.max_distance,
        }
    }
}
