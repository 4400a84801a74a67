//! File records as loaded from the features table.

use crate::core::index::HashKind;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// File-format classification used as the last original-selection tie-break
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Raw,
    Tiff,
    Png,
    Jpeg,
    Webp,
    Other,
}

impl FileFormat {
    /// Preference rank (lower = more preferred as original)
    pub fn priority(&self) -> u8 {
        match self {
            FileFormat::Raw => 1,
            FileFormat::Tiff => 2,
            FileFormat::Png => 3,
            FileFormat::Jpeg => 4,
            FileFormat::Webp => 5,
            FileFormat::Other => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Raw => "raw",
            FileFormat::Tiff => "tiff",
            FileFormat::Png => "png",
            FileFormat::Jpeg => "jpeg",
            FileFormat::Webp => "webp",
            FileFormat::Other => "other",
        }
    }

    /// Parse a stored format name; anything unrecognised is `Other`
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "raw" => FileFormat::Raw,
            "tiff" | "tif" => FileFormat::Tiff,
            "png" => FileFormat::Png,
            "jpeg" | "jpg" => FileFormat::Jpeg,
            "webp" => FileFormat::Webp,
            _ => FileFormat::Other,
        }
    }

    /// Classify by file extension, including common camera RAW extensions
    pub fn from_extension(extension: &str) -> Self {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "cr2" | "cr3" | "nef" | "arw" | "dng" | "orf" | "rw2" | "raf" | "pef" | "srw" => {
                FileFormat::Raw
            }
            other => Self::from_name(other),
        }
    }
}

impl Default for FileFormat {
    fn default() -> Self {
        FileFormat::Other
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_ascii_uppercase())
    }
}

/// One scanned file with its precomputed features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// Cheap non-cryptographic content hash
    pub fast_hash: String,
    #[serde(default)]
    pub sha256_hash: Option<String>,
    #[serde(default)]
    pub phash: Option<String>,
    #[serde(default)]
    pub dhash: Option<String>,
    #[serde(default)]
    pub whash: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// EXIF DateTimeOriginal
    #[serde(default)]
    pub exif_datetime: Option<NaiveDateTime>,
    #[serde(default)]
    pub camera_model: Option<String>,
    #[serde(default)]
    pub format: FileFormat,
}

impl FileRecord {
    /// Minimal record; everything optional left empty
    pub fn new(id: i64, path: impl Into<String>, size: u64, fast_hash: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
            size,
            fast_hash: fast_hash.into(),
            sha256_hash: None,
            phash: None,
            dhash: None,
            whash: None,
            width: None,
            height: None,
            exif_datetime: None,
            camera_model: None,
            format: FileFormat::Other,
        }
    }

    /// Pixel count, 0 when dimensions are unknown
    pub fn resolution(&self) -> u64 {
        match (self.width, self.height) {
            (Some(w), Some(h)) => w as u64 * h as u64,
            _ => 0,
        }
    }

    /// The stored hash of the given kind, if any
    pub fn hash(&self, kind: HashKind) -> Option<&str> {
        match kind {
            HashKind::Perceptual => self.phash.as_deref(),
            HashKind::Difference => self.dhash.as_deref(),
            HashKind::Wavelet => self.whash.as_deref(),
        }
    }

    /// True when at least one perceptual-family hash is present
    pub fn has_any_hash(&self) -> bool {
        HashKind::ALL.iter().any(|kind| self.hash(*kind).is_some())
    }

    pub fn with_hashes(
        mut self,
        phash: Option<&str>,
        dhash: Option<&str>,
        whash: Option<&str>,
    ) -> Self {
        self.phash = phash.map(str::to_string);
        self.dhash = dhash.map(str::to_string);
        self.whash = whash.map(str::to_string);
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_exif(mut self, taken: NaiveDateTime, camera_model: Option<&str>) -> Self {
        self.exif_datetime = Some(taken);
        self.camera_model = camera_model.map(str::to_string);
        self
    }

    pub fn with_sha256(mut self, sha256: &str) -> Self {
        self.sha256_hash = Some(sha256.to_string());
        self
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }
}

/// Absolute difference between two capture times, in seconds
pub fn capture_gap_secs(a: NaiveDateTime, b: NaiveDateTime) -> f64 {
    let gap = (a - b).abs();
    match gap.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => gap.num_seconds() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    #[test]
    fn capture_gap_is_symmetric_and_sub_second() {
        let a = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let b = a + Duration::milliseconds(2010);
        assert!((capture_gap_secs(a, b) - 2.01).abs() < 1e-9);
        assert_eq!(capture_gap_secs(a, b), capture_gap_secs(b, a));
    }

    #[test]
    fn raw_is_most_preferred() {
        assert!(FileFormat::Raw.priority() < FileFormat::Jpeg.priority());
        assert_eq!(FileFormat::Other.priority(), 6);
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(FileFormat::from_extension("NEF"), FileFormat::Raw);
        assert_eq!(FileFormat::from_extension(".jpg"), FileFormat::Jpeg);
        assert_eq!(FileFormat::from_extension("tif"), FileFormat::Tiff);
        assert_eq!(FileFormat::from_extension("heic"), FileFormat::Other);
    }

    #[test]
    fn resolution_requires_both_dimensions() {
        let record = FileRecord::new(1, "/a.jpg", 10, "ff");
        assert_eq!(record.resolution(), 0);
        assert_eq!(record.with_dimensions(200, 150).resolution(), 30_000);
    }

    #[test]
    fn hash_lookup_by_kind() {
        let record =
            FileRecord::new(1, "/a.jpg", 10, "ff").with_hashes(Some("aa"), None, Some("cc"));
        assert_eq!(record.hash(HashKind::Perceptual), Some("aa"));
        assert_eq!(record.hash(HashKind::Difference), None);
        assert!(record.has_any_hash());
    }

    #[test]
    fn record_deserializes_with_optional_fields_missing() {
        let json = r#"{ "id": 7, "path": "/p/x.png", "size": 1500, "fast_hash": "abc",
                        "format": "png" }"#;
        let record: FileRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.format, FileFormat::Png);
        assert!(record.exif_datetime.is_none());
    }
}
