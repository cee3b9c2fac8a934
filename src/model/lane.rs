use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored traffic approach, numbered from 1.
///
/// Lanes show up under three spellings on the wire: `"Lane 2"` in typed
/// events, `"lane2"` as a bulk-update key and `"Lane_2"` in the sensor
/// database export. [`LaneId::parse`] accepts all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaneId(u32);

impl LaneId {
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    pub const fn number(self) -> u32 {
        self.0
    }

    /// Display label, e.g. `"Lane 2"`.
    pub fn label(self) -> String {
        format!("Lane {}", self.0)
    }

    /// Top-level key used by bulk updates, e.g. `"lane2"`.
    pub fn key(self) -> String {
        format!("lane{}", self.0)
    }

    /// Parse any of the accepted lane spellings (case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        let rest = lowered.strip_prefix("lane")?;
        let digits = rest.trim_start_matches([' ', '_']);
        match digits.parse::<u32>() {
            Ok(n) if n > 0 => Some(Self(n)),
            _ => None,
        }
    }

    /// Check whether free text names this lane.
    ///
    /// A match must not be followed by another digit, so `"Lane 1"` is not
    /// found inside `"Lane 12"`.
    pub fn mentioned_in(self, text: &str) -> bool {
        let haystack = text.to_ascii_lowercase();
        let n = self.0;
        [format!("lane {n}"), format!("lane_{n}"), format!("lane{n}")]
            .iter()
            .any(|needle| {
                haystack.match_indices(needle.as_str()).any(|(at, _)| {
                    !haystack[at + needle.len()..].starts_with(|c: char| c.is_ascii_digit())
                })
            })
    }
}

impl std::fmt::Display for LaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lane {}", self.0)
    }
}

/// Traffic light color for a single lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightColor {
    Red,
    Yellow,
    Green,
}

impl LightColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Green => "green",
        }
    }
}

impl std::fmt::Display for LightColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which rule turns vehicle counts into light colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightMode {
    /// Every lane judged on its own count (single-lane displays).
    Threshold,
    /// Only the busiest lane gets green (intersection views).
    PairedPrecedence,
}

impl LightMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "threshold" => Some(Self::Threshold),
            "paired" | "paired_precedence" | "precedence" => Some(Self::PairedPrecedence),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Threshold => "threshold",
            Self::PairedPrecedence => "paired_precedence",
        }
    }
}

impl Default for LightMode {
    fn default() -> Self {
        Self::PairedPrecedence
    }
}

impl std::fmt::Display for LightMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Live state of one lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneState {
    pub lane_id: LaneId,
    pub vehicle_count: u32,
    pub secured: bool,
    pub light: LightColor,
    /// When a count for this lane was last applied; `None` until the first report.
    pub reported_at: Option<DateTime<Utc>>,
}

impl LaneState {
    pub fn new(lane_id: LaneId) -> Self {
        Self {
            lane_id,
            vehicle_count: 0,
            secured: true,
            light: LightColor::Red,
            reported_at: None,
        }
    }

    pub fn has_reported(&self) -> bool {
        self.reported_at.is_some()
    }
}
