//! Two-tier grouping pass.

use super::{DuplicateGroup, GroupMetadata, GroupTier, OriginalSelection};
use crate::config::DedupConfig;
use crate::core::index::{HashKind, NearDuplicateMatch, NearDuplicateSearchIndex};
use crate::core::overrides::{ManualOverride, OverrideResolution, OverrideStore};
use crate::core::records::{capture_gap_secs, FileRecord};
use crate::core::store::{DedupStore, FeatureStore, GroupStore};
use crate::error::{DedupError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Tier-1 confidence when every member shares a SHA-256
const EXACT_CONFIRMED_CONFIDENCE: f64 = 1.0;
/// Tier-1 confidence on size + fast hash alone
const EXACT_UNCONFIRMED_CONFIDENCE: f64 = 0.95;
/// Tier-2 confidence at distance 0
const NEAR_CONFIDENCE_MAX: f64 = 0.90;
/// Tier-2 confidence at the threshold
const NEAR_CONFIDENCE_MIN: f64 = 0.50;

/// Stages of a grouping pass, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingStage {
    Load,
    Tier1Exact,
    Tier2Near,
    Persist,
}

impl std::fmt::Display for GroupingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupingStage::Load => write!(f, "load"),
            GroupingStage::Tier1Exact => write!(f, "tier1-exact"),
            GroupingStage::Tier2Near => write!(f, "tier2-near"),
            GroupingStage::Persist => write!(f, "persist"),
        }
    }
}

/// Counters for one grouping pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupingStats {
    pub files_processed: usize,
    pub exact_groups: usize,
    pub near_groups: usize,
    pub total_duplicates: usize,
    /// Files left out of Tier 2 because they carry no usable hash
    pub unhashed_files: usize,
    pub overrides_applied: usize,
    pub override_conflicts: usize,
    pub processing_time_ms: u64,
}

/// Aggregate view over a set of groups
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub total_groups: usize,
    pub exact_groups: usize,
    pub near_groups: usize,
    pub total_duplicates: usize,
    /// confidence >= 0.9
    pub high_confidence: usize,
    /// 0.7 <= confidence < 0.9
    pub medium_confidence: usize,
    pub low_confidence: usize,
    pub reclaimable_bytes: u64,
}

/// Members of a group before an original is chosen
struct Candidate<'a> {
    tier: GroupTier,
    members: Vec<&'a FileRecord>,
    confidence: f64,
    metadata: GroupMetadata,
}

/// Builds duplicate groups from the feature store
///
/// # Example
/// ```no_run
/// use photo_dedup_engine::config::DedupConfig;
/// use photo_dedup_engine::core::grouping::GroupingEngine;
/// use photo_dedup_engine::core::store::SqliteStore;
/// use std::sync::Arc;
///
/// let store = Arc::new(SqliteStore::open("photos.db".as_ref())?);
/// let engine = GroupingEngine::new(DedupConfig::default(), store);
/// let (groups, stats) = engine.process_all_files()?;
/// engine.store_groups(&groups)?;
/// println!("{} groups from {} files", groups.len(), stats.files_processed);
/// # Ok::<(), photo_dedup_engine::DedupError>(())
/// ```
pub struct GroupingEngine {
    config: DedupConfig,
    store: Arc<dyn DedupStore>,
}

impl GroupingEngine {
    pub fn new(config: DedupConfig, store: Arc<dyn DedupStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Load every record from the store and group it
    ///
    /// Nothing is persisted; call [`store_groups`](Self::store_groups) with the result.
    pub fn process_all_files(&self) -> Result<(Vec<DuplicateGroup>, GroupingStats)> {
        let start = Instant::now();
        info!(stage = %GroupingStage::Load, "Loading file records");
        let records = self.store.load_records()?;
        self.run(&records, start)
    }

    /// Group records already in memory
    pub fn group_records(
        &self,
        records: &[FileRecord],
    ) -> Result<(Vec<DuplicateGroup>, GroupingStats)> {
        self.run(records, Instant::now())
    }

    fn run(
        &self,
        records: &[FileRecord],
        start: Instant,
    ) -> Result<(Vec<DuplicateGroup>, GroupingStats)> {
        let mut ordered: Vec<&FileRecord> = records.iter().collect();
        ordered.sort_by_key(|r| r.id);

        let mut stats = GroupingStats {
            files_processed: ordered.len(),
            ..GroupingStats::default()
        };

        info!(
            stage = %GroupingStage::Tier1Exact,
            files = ordered.len(),
            "Finding exact duplicates"
        );
        let exact = self.exact_candidates(&ordered);
        let claimed: HashSet<i64> = exact
            .iter()
            .flat_map(|c| c.members.iter().map(|r| r.id))
            .collect();

        let remaining: Vec<&FileRecord> = ordered
            .iter()
            .copied()
            .filter(|r| !claimed.contains(&r.id))
            .collect();
        info!(
            stage = %GroupingStage::Tier2Near,
            files = remaining.len(),
            "Finding near duplicates"
        );
        let near = self.near_candidates(&remaining, &mut stats);

        let overrides = self.store.list_active_overrides()?;
        let grouped: HashSet<i64> = exact
            .iter()
            .chain(&near)
            .flat_map(|c| c.members.iter().map(|r| r.id))
            .collect();

        let mut groups = Vec::with_capacity(exact.len() + near.len());
        for (index, candidate) in exact.into_iter().chain(near).enumerate() {
            let group =
                self.assemble(index as i64 + 1, candidate, &overrides, &grouped, &mut stats)?;
            match group.tier {
                GroupTier::Exact => stats.exact_groups += 1,
                GroupTier::Near => stats.near_groups += 1,
            }
            stats.total_duplicates += group.duplicate_count();
            groups.push(group);
        }

        stats.processing_time_ms = start.elapsed().as_millis() as u64;
        info!(
            exact = stats.exact_groups,
            near = stats.near_groups,
            duplicates = stats.total_duplicates,
            elapsed_ms = stats.processing_time_ms,
            "Grouping complete"
        );
        Ok((groups, stats))
    }

    /// Tier 1: partition by (size, fast hash), then by SHA-256 when confirmation is on
    fn exact_candidates<'a>(&self, ordered: &[&'a FileRecord]) -> Vec<Candidate<'a>> {
        let mut partitions: BTreeMap<(u64, &str), Vec<&'a FileRecord>> = BTreeMap::new();
        for &record in ordered {
            if record.fast_hash.is_empty() {
                continue;
            }
            partitions
                .entry((record.size, record.fast_hash.as_str()))
                .or_default()
                .push(record);
        }

        let mut candidates = Vec::new();
        for members in partitions.into_values().filter(|m| m.len() >= 2) {
            if !self.config.sha256_confirmation {
                candidates.push(Self::exact_candidate(members, false));
                continue;
            }

            let mut by_sha: BTreeMap<&str, Vec<&'a FileRecord>> = BTreeMap::new();
            for record in members {
                match record.sha256_hash.as_deref() {
                    Some(sha) if !sha.is_empty() => by_sha.entry(sha).or_default().push(record),
                    _ => debug!(file_id = record.id, "No SHA-256, leaving for near-duplicate pass"),
                }
            }
            candidates.extend(
                by_sha
                    .into_values()
                    .filter(|m| m.len() >= 2)
                    .map(|m| Self::exact_candidate(m, true)),
            );
        }

        candidates.sort_by_key(|c| c.members.iter().map(|r| r.id).min());
        candidates
    }

    fn exact_candidate(members: Vec<&FileRecord>, confirmed: bool) -> Candidate<'_> {
        Candidate {
            tier: GroupTier::Exact,
            members,
            confidence: if confirmed {
                EXACT_CONFIRMED_CONFIDENCE
            } else {
                EXACT_UNCONFIRMED_CONFIDENCE
            },
            metadata: GroupMetadata {
                sha256_confirmed: Some(confirmed),
                ..GroupMetadata::default()
            },
        }
    }

    /// Tier 2: greedy, in id order, over files Tier 1 did not claim
    fn near_candidates<'a>(
        &self,
        remaining: &[&'a FileRecord],
        stats: &mut GroupingStats,
    ) -> Vec<Candidate<'a>> {
        let mut index = NearDuplicateSearchIndex::new(&self.config);
        let indexed = index.build_from_records(remaining.iter().copied());
        stats.unhashed_files = remaining.len() - indexed;

        if !index.is_index_built() {
            debug!("No hashed files left for the near-duplicate pass");
            return Vec::new();
        }

        let by_id: HashMap<i64, &'a FileRecord> = remaining.iter().map(|r| (r.id, *r)).collect();
        let threshold = index.max_distance();
        let mut claimed: HashSet<i64> = HashSet::new();
        let mut candidates = Vec::new();

        for &record in remaining {
            if claimed.contains(&record.id) {
                continue;
            }

            let accepted: Vec<(&'a FileRecord, NearDuplicateMatch)> = index
                .find_near_duplicates(record.id, None)
                .into_iter()
                .filter(|m| !claimed.contains(&m.file_id))
                .filter_map(|m| by_id.get(&m.file_id).map(|c| (*c, m)))
                .filter(|(c, _)| self.dimensions_compatible(record, c))
                .filter(|(c, _)| self.capture_times_compatible(record, c))
                .collect();

            if accepted.is_empty() {
                continue;
            }

            let min_phash_distance = accepted
                .iter()
                .filter_map(|(_, m)| m.distances.get(&HashKind::Perceptual).copied())
                .min();
            let min_distance = accepted.iter().map(|(_, m)| m.min_distance).min();

            claimed.insert(record.id);
            let mut members = vec![record];
            for (candidate, _) in accepted {
                claimed.insert(candidate.id);
                members.push(candidate);
            }

            let confidence =
                near_confidence(min_phash_distance.or(min_distance).unwrap_or(0), threshold);
            candidates.push(Candidate {
                tier: GroupTier::Near,
                members,
                confidence,
                metadata: GroupMetadata {
                    min_phash_distance,
                    min_distance,
                    ..GroupMetadata::default()
                },
            });
        }

        candidates
    }

    /// Pixel counts within `dimension_tolerance` of each other; unknown passes
    fn dimensions_compatible(&self, a: &FileRecord, b: &FileRecord) -> bool {
        let (ra, rb) = (a.resolution(), b.resolution());
        if ra == 0 || rb == 0 {
            return true;
        }
        let ratio = ra.min(rb) as f64 / ra.max(rb) as f64;
        let compatible = ratio >= 1.0 - self.config.dimension_tolerance;
        if !compatible {
            debug!(a = a.id, b = b.id, ratio, "Rejected near match on dimensions");
        }
        compatible
    }

    fn capture_times_compatible(&self, a: &FileRecord, b: &FileRecord) -> bool {
        if !self.config.exif_strict_mode {
            return true;
        }
        match (a.exif_datetime, b.exif_datetime) {
            (Some(ta), Some(tb)) => {
                capture_gap_secs(ta, tb) <= self.config.escalation.datetime_tolerance_secs
            }
            _ => true,
        }
    }

    fn assemble(
        &self,
        group_id: i64,
        candidate: Candidate<'_>,
        overrides: &[ManualOverride],
        grouped: &HashSet<i64>,
        stats: &mut GroupingStats,
    ) -> Result<DuplicateGroup> {
        let members: Vec<FileRecord> = candidate.members.iter().map(|r| (*r).clone()).collect();
        let selection = select_with_overrides(&members, group_id, overrides, grouped)?;

        if selection.override_applied {
            stats.overrides_applied += 1;
        }
        if selection.conflict.is_some() {
            stats.override_conflicts += 1;
        }

        let sizes: HashMap<i64, u64> = members.iter().map(|r| (r.id, r.size)).collect();
        let reclaimable_bytes: u64 = selection
            .duplicate_ids
            .iter()
            .filter_map(|id| sizes.get(id))
            .sum();

        Ok(DuplicateGroup {
            id: group_id,
            tier: candidate.tier,
            original_id: selection.original_id,
            duplicate_ids: selection.duplicate_ids,
            confidence: candidate.confidence,
            metadata: GroupMetadata {
                override_applied: selection.override_applied,
                override_conflict: selection.conflict,
                reclaimable_bytes,
                ..candidate.metadata
            },
        })
    }

    /// Choose the original for a finished set of members
    ///
    /// With a `group_id`, an active manual override whose chosen file is a
    /// member wins. An override keyed to the group whose file is gone yields
    /// the automatic choice with a conflict note. Nothing is written here;
    /// [`store_groups`](Self::store_groups) deactivates stale overrides.
    pub fn select_original(
        &self,
        members: &[FileRecord],
        group_id: Option<i64>,
    ) -> Result<OriginalSelection> {
        match group_id {
            Some(group_id) => {
                let overrides = self.store.list_active_overrides()?;
                let grouped: HashSet<i64> = members.iter().map(|r| r.id).collect();
                select_with_overrides(members, group_id, &overrides, &grouped)
            }
            None => OriginalSelection::automatic(members).ok_or(DedupError::EmptyGroup),
        }
    }

    /// Replace the persisted groups with `groups`, atomically
    ///
    /// Overrides are brought in line in the same transaction: one whose file
    /// now leads a renumbered group follows it, and one whose file left every
    /// group is deactivated.
    pub fn store_groups(&self, groups: &[DuplicateGroup]) -> Result<usize> {
        info!(stage = %GroupingStage::Persist, groups = groups.len(), "Storing groups");
        Ok(self.store.replace_groups(groups)?)
    }

    pub fn get_group_summary(&self, groups: &[DuplicateGroup]) -> GroupSummary {
        let mut summary = GroupSummary {
            total_groups: groups.len(),
            ..GroupSummary::default()
        };

        for group in groups {
            match group.tier {
                GroupTier::Exact => summary.exact_groups += 1,
                GroupTier::Near => summary.near_groups += 1,
            }
            summary.total_duplicates += group.duplicate_count();
            summary.reclaimable_bytes += group.metadata.reclaimable_bytes;

            if group.confidence >= 0.9 {
                summary.high_confidence += 1;
            } else if group.confidence >= 0.7 {
                summary.medium_confidence += 1;
            } else {
                summary.low_confidence += 1;
            }
        }

        summary
    }
}

fn select_with_overrides(
    members: &[FileRecord],
    group_id: i64,
    overrides: &[ManualOverride],
    grouped: &HashSet<i64>,
) -> Result<OriginalSelection> {
    let member_ids: Vec<i64> = members.iter().map(|r| r.id).collect();

    let selection = match OverrideResolution::resolve(overrides, group_id, &member_ids, grouped) {
        OverrideResolution::Active(o) => {
            debug!(
                group_id,
                keyed_to = o.group_id,
                file_id = o.original_file_id,
                "Applying manual override"
            );
            OriginalSelection::forced(members, o.original_file_id)
        }
        OverrideResolution::Stale(o) => {
            warn!(
                group_id,
                file_id = o.original_file_id,
                "Override points at a file that is no longer grouped"
            );
            OriginalSelection::automatic(members).map(|mut selection| {
                selection.conflict = Some(format!(
                    "Override chose file {} which is no longer in group {}",
                    o.original_file_id, group_id
                ));
                selection
            })
        }
        OverrideResolution::None => OriginalSelection::automatic(members),
    };

    selection.ok_or(DedupError::EmptyGroup)
}

/// Linear from `NEAR_CONFIDENCE_MAX` at 0 down to `NEAR_CONFIDENCE_MIN` at the threshold
fn near_confidence(distance: u32, threshold: u32) -> f64 {
    if threshold == 0 {
        return NEAR_CONFIDENCE_MAX;
    }
    let ratio = (distance as f64 / threshold as f64).min(1.0);
    NEAR_CONFIDENCE_MAX - (NEAR_CONFIDENCE_MAX - NEAR_CONFIDENCE_MIN) * ratio
}
