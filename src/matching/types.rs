//! Core record type definitions.
//!
//! Defines [`ResolutionState`] (which side of the match a record sits on),
//! [`Coordinate`], [`SubjectRecord`], [`MatchRecord`] with its forward-only
//! [`MatchStatus`] lifecycle, and the scan [`Thresholds`].

use serde::{Deserialize, Serialize};

/// Which role a subject record plays in a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    /// Seeking a match (e.g. a lost item). Scanned against the resolved pool.
    Unresolved,
    /// Part of the counterpart pool (e.g. a found item).
    Resolved,
}

impl ResolutionState {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResolutionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unresolved" => Ok(Self::Unresolved),
            "resolved" => Ok(Self::Resolved),
            _ => Err(format!("unknown resolution state: {s}")),
        }
    }
}

/// A validated latitude/longitude pair in degrees.
///
/// `0.0` is an ordinary coordinate. Absence of a location is expressed with
/// `Option<Coordinate>`, never with a sentinel value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Returns `None` for non-finite or out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }

    /// Build from nullable columns; both halves must be present.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Self::new(lat, lon),
            _ => None,
        }
    }
}

/// A record owned by the record store. The engine reads these and never
/// mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub id: String,
    pub state: ResolutionState,
    /// Zero or more embeddings. Empty means the record is not eligible.
    #[serde(default)]
    pub embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    pub location: Option<Coordinate>,
    /// Opaque contact metadata forwarded to the notification dispatcher.
    #[serde(default)]
    pub contact: Option<serde_json::Value>,
}

impl SubjectRecord {
    pub fn has_embeddings(&self) -> bool {
        !self.embeddings.is_empty()
    }
}

/// Lifecycle of a match. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Persisted, no dispatch has succeeded yet.
    Pending,
    /// Notification dispatcher accepted the match.
    Notified,
    /// Report generated and shared. Terminal.
    ReportSent,
    /// Report generation failed. Terminal.
    Failed,
}

impl MatchStatus {
    pub const ALL: [MatchStatus; 4] = [
        Self::Pending,
        Self::Notified,
        Self::ReportSent,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Notified => "notified",
            Self::ReportSent => "report_sent",
            Self::Failed => "failed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Notified => 1,
            Self::ReportSent | Self::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    /// `true` if moving from `self` to `next` goes strictly forward.
    pub fn can_advance_to(&self, next: MatchStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "notified" => Ok(Self::Notified),
            "report_sent" => Ok(Self::ReportSent),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown match status: {s}")),
        }
    }
}

/// A persisted match, matching the `matches` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    /// UUID v7 assigned on insert.
    pub id: String,
    /// The unresolved side.
    pub subject_id: String,
    /// The resolved side.
    pub counterpart_id: String,
    /// Best cosine similarity across all embedding pairs.
    pub similarity: f64,
    /// Great-circle distance in miles; `None` when unknown (infinite).
    pub distance_miles: Option<f64>,
    pub status: MatchStatus,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    pub updated_at: String,
    /// Attempt metadata from the fan-out (timestamps, errors, report detail).
    pub metadata: Option<serde_json::Value>,
}

/// Insert payload for the match store.
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub subject_id: String,
    pub counterpart_id: String,
    pub similarity: f64,
    pub distance_miles: f64,
}

/// Candidate filter applied by the scanner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub min_similarity: f64,
    pub max_distance_miles: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_similarity: 0.85,
            max_distance_miles: 50.0,
        }
    }
}
