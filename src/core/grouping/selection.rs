//! Deterministic original selection.

use crate::core::records::FileRecord;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};

/// Ordering used to pick a group's original; the smallest record wins.
///
/// Keys, first difference decides: higher resolution, earlier EXIF capture
/// (missing sorts last), larger file, preferred format, path. With unique
/// paths this is a strict total order.
pub fn compare_for_original(a: &FileRecord, b: &FileRecord) -> Ordering {
    Reverse(a.resolution())
        .cmp(&Reverse(b.resolution()))
        .then_with(|| match (a.exif_datetime, b.exif_datetime) {
            (Some(ta), Some(tb)) => ta.cmp(&tb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| Reverse(a.size).cmp(&Reverse(b.size)))
        .then_with(|| a.format.priority().cmp(&b.format.priority()))
        .then_with(|| a.path.cmp(&b.path))
}

/// Outcome of original selection for one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginalSelection {
    pub original_id: i64,
    /// Remaining members, best-ranked first
    pub duplicate_ids: Vec<i64>,
    /// The original came from an active manual override
    pub override_applied: bool,
    /// Set when a stored override pointed at a file no longer in the group
    pub conflict: Option<String>,
}

impl OriginalSelection {
    /// Rank members automatically; `None` for an empty slice
    pub(crate) fn automatic(members: &[FileRecord]) -> Option<Self> {
        let mut ranked: Vec<&FileRecord> = members.iter().collect();
        ranked.sort_by(|a, b| compare_for_original(a, b));

        let (first, rest) = ranked.split_first()?;
        Some(Self {
            original_id: first.id,
            duplicate_ids: rest.iter().map(|r| r.id).collect(),
            override_applied: false,
            conflict: None,
        })
    }

    /// Force `chosen` as original, keeping the automatic order for the rest
    pub(crate) fn forced(members: &[FileRecord], chosen: i64) -> Option<Self> {
        let mut selection = Self::automatic(members)?;
        if selection.original_id != chosen {
            selection.duplicate_ids.retain(|id| *id != chosen);
            selection.duplicate_ids.insert(0, selection.original_id);
            selection.original_id = chosen;
        }
        selection.override_applied = true;
        Some(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::records::FileFormat;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(secs: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 3, 14)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            + chrono::Duration::seconds(secs as i64)
    }

    fn file(id: i64, path: &str) -> FileRecord {
        FileRecord::new(id, path, 1000, "h")
    }

    fn pick(members: &[FileRecord]) -> i64 {
        OriginalSelection::automatic(members).unwrap().original_id
    }

    #[test]
    fn highest_resolution_wins_regardless_of_position() {
        let big = file(1, "/c.jpg").with_dimensions(200, 150);
        let small = file(2, "/a.jpg").with_dimensions(100, 100);
        let medium = file(3, "/b.jpg").with_dimensions(150, 100);

        assert_eq!(pick(&[big.clone(), small.clone(), medium.clone()]), 1);
        assert_eq!(pick(&[small.clone(), medium.clone(), big.clone()]), 1);
        assert_eq!(pick(&[medium, big, small]), 1);
    }

    #[test]
    fn earlier_capture_wins_and_missing_exif_sorts_last() {
        let early = file(1, "/z.jpg").with_exif(at(0), None);
        let late = file(2, "/y.jpg").with_exif(at(60), None);
        let none = file(3, "/a.jpg");

        assert_eq!(pick(&[none.clone(), late.clone(), early]), 1);
        assert_eq!(pick(&[none, late]), 2);
    }

    #[test]
    fn larger_file_then_format_then_path() {
        let mut big = file(1, "/z.jpg");
        big.size = 5000;
        let small = file(2, "/a.jpg");
        assert_eq!(pick(&[small.clone(), big]), 1);

        let raw = file(3, "/z.cr2").with_format(FileFormat::Raw);
        let jpeg = file(4, "/a.jpg").with_format(FileFormat::Jpeg);
        assert_eq!(pick(&[jpeg, raw]), 3);

        let a = file(5, "/a.jpg");
        let b = file(6, "/b.jpg");
        assert_eq!(pick(&[b, a]), 5);
    }

    #[test]
    fn duplicates_follow_rank_order() {
        let members = vec![
            file(1, "/c.jpg"),
            file(2, "/a.jpg"),
            file(3, "/b.jpg"),
        ];
        let selection = OriginalSelection::automatic(&members).unwrap();
        assert_eq!(selection.original_id, 2);
        assert_eq!(selection.duplicate_ids, vec![3, 1]);
    }

    #[test]
    fn forced_selection_moves_automatic_choice_to_duplicates() {
        let members = vec![file(1, "/a.jpg"), file(2, "/b.jpg"), file(3, "/c.jpg")];
        let selection = OriginalSelection::forced(&members, 3).unwrap();

        assert_eq!(selection.original_id, 3);
        assert_eq!(selection.duplicate_ids, vec![1, 2]);
        assert!(selection.override_applied);
    }

    #[test]
    fn empty_members_select_nothing() {
        assert!(OriginalSelection::automatic(&[]).is_none());
    }
}
