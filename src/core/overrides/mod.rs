//! # Overrides Module
//!
//! User corrections to automatic original selection.
//!
//! An active override wins over the deterministic sort on every later grouping
//! pass, following its chosen file even when group ids shift. If that file is
//! no longer in any group, the group carries a conflict note and the override
//! is deactivated when the pass is stored.
//!
//! ## Lifecycle
//! `None -> Active -> Stale -> removed on store_groups`

mod traits;

pub use traits::OverrideStore;

use crate::core::grouping::DuplicateGroup;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Scope of an override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideType {
    /// Applies to one group
    SingleGroup,
    /// Created from a user's default rule
    DefaultRule,
}

impl OverrideType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideType::SingleGroup => "single_group",
            OverrideType::DefaultRule => "default_rule",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "single_group" => Some(OverrideType::SingleGroup),
            "default_rule" => Some(OverrideType::DefaultRule),
            _ => None,
        }
    }
}

/// A user's choice of original for a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualOverride {
    /// Assigned by the store
    pub id: Option<i64>,
    pub group_id: i64,
    /// File the user chose as original
    pub original_file_id: i64,
    /// File automatic selection had picked
    pub automatic_file_id: Option<i64>,
    pub override_type: OverrideType,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

impl ManualOverride {
    /// New active single-group override
    pub fn new(group_id: i64, original_file_id: i64, automatic_file_id: Option<i64>) -> Self {
        Self {
            id: None,
            group_id,
            original_file_id,
            automatic_file_id,
            override_type: OverrideType::SingleGroup,
            reason: None,
            created_at: Utc::now(),
            active: true,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_type(mut self, override_type: OverrideType) -> Self {
        self.override_type = override_type;
        self
    }
}

/// Where a group stands with respect to the stored overrides
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideResolution {
    /// Nothing applies, automatic selection decides
    None,
    /// The chosen file is a member and becomes the original
    Active(ManualOverride),
    /// Keyed to this group, but its file is in no group any more
    Stale(ManualOverride),
}

impl OverrideResolution {
    /// Classify the active overrides against one group of a pass
    ///
    /// Group ids are positional, so an override is matched by its chosen
    /// file first: one keyed to `group_id` wins, otherwise the newest one
    /// whose file is a member. An override keyed to `group_id` is stale only
    /// when its file is absent from `grouped`, the files of every group in
    /// the pass.
    pub fn resolve(
        active: &[ManualOverride],
        group_id: i64,
        member_ids: &[i64],
        grouped: &HashSet<i64>,
    ) -> Self {
        let live = || active.iter().filter(|o| o.active);
        let is_member = |o: &&ManualOverride| member_ids.contains(&o.original_file_id);

        if let Some(o) = live().filter(|o| o.group_id == group_id).find(is_member) {
            return OverrideResolution::Active(o.clone());
        }
        if let Some(o) = live()
            .filter(is_member)
            .max_by_key(|o| (o.created_at, o.id))
        {
            return OverrideResolution::Active(o.clone());
        }
        live()
            .find(|o| o.group_id == group_id && !grouped.contains(&o.original_file_id))
            .map_or(OverrideResolution::None, |o| OverrideResolution::Stale(o.clone()))
    }

    /// File forced as original, if any
    pub fn chosen_file(&self) -> Option<i64> {
        match self {
            OverrideResolution::Active(o) => Some(o.original_file_id),
            _ => None,
        }
    }
}

/// Bookkeeping applied to a stored override when groups are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideChange {
    /// The chosen file now leads a group with a different id
    Rekey { override_id: i64, group_id: i64 },
    /// The chosen file left every group, or a newer override won its group
    Deactivate { override_id: i64 },
}

/// Changes that bring the active overrides in line with `groups`
///
/// Stores apply these in the same transaction that replaces the groups, so
/// an unpersisted pass never touches overrides.
pub fn reconcile(active: &[ManualOverride], groups: &[DuplicateGroup]) -> Vec<OverrideChange> {
    let owner: HashMap<i64, &DuplicateGroup> = groups
        .iter()
        .flat_map(|g| g.file_ids().into_iter().map(move |id| (id, g)))
        .collect();
    let led_by_override: HashSet<i64> = active
        .iter()
        .filter(|o| o.active)
        .filter_map(|o| owner.get(&o.original_file_id))
        .filter(|g| active.iter().any(|o| o.active && o.original_file_id == g.original_id))
        .map(|g| g.id)
        .collect();

    let mut changes = Vec::new();
    for o in active.iter().filter(|o| o.active) {
        let Some(override_id) = o.id else {
            continue;
        };
        match owner.get(&o.original_file_id) {
            None => changes.push(OverrideChange::Deactivate { override_id }),
            Some(g) if g.original_id == o.original_file_id => {
                if g.id != o.group_id {
                    changes.push(OverrideChange::Rekey {
                        override_id,
                        group_id: g.id,
                    });
                }
            }
            Some(g) if led_by_override.contains(&g.id) => {
                changes.push(OverrideChange::Deactivate { override_id })
            }
            Some(_) => {}
        }
    }
    changes
}
