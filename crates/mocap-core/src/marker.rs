use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Marker color palette recognised by the marker identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerColor {
    Red,
    Yellow,
    Green,
    Cyan,
    Blue,
    Magenta,
}

impl MarkerColor {
    pub const ALL: [MarkerColor; 6] = [
        MarkerColor::Red,
        MarkerColor::Yellow,
        MarkerColor::Green,
        MarkerColor::Cyan,
        MarkerColor::Blue,
        MarkerColor::Magenta,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MarkerColor::Red => "red",
            MarkerColor::Yellow => "yellow",
            MarkerColor::Green => "green",
            MarkerColor::Cyan => "cyan",
            MarkerColor::Blue => "blue",
            MarkerColor::Magenta => "magenta",
        }
    }

    fn from_label(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

/// Marker shape set recognised by the marker identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerPattern {
    Triangle,
    Square,
    Circle,
    Slash,
    Line,
    Y,
}

impl MarkerPattern {
    pub const ALL: [MarkerPattern; 6] = [
        MarkerPattern::Triangle,
        MarkerPattern::Square,
        MarkerPattern::Circle,
        MarkerPattern::Slash,
        MarkerPattern::Line,
        MarkerPattern::Y,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MarkerPattern::Triangle => "triangle",
            MarkerPattern::Square => "square",
            MarkerPattern::Circle => "circle",
            MarkerPattern::Slash => "slash",
            MarkerPattern::Line => "line",
            MarkerPattern::Y => "y",
        }
    }

    fn from_label(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

const UNIDENTIFIED: &str = "unidentified";
const MISSING: &str = "none";

/// A physical marker type: `(color, pattern)`.
///
/// Either half may be absent when the identifier could not classify it; with
/// both halves absent the marker is "unidentified". The textual label is
/// `"<color> <pattern>"` (e.g. `"red triangle"`), with `none` standing in for a
/// missing half and `"unidentified"` for a marker with neither.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MarkerIdentity {
    pub color: Option<MarkerColor>,
    pub pattern: Option<MarkerPattern>,
}

impl MarkerIdentity {
    pub const UNIDENTIFIED: MarkerIdentity = MarkerIdentity {
        color: None,
        pattern: None,
    };

    pub const fn new(color: MarkerColor, pattern: MarkerPattern) -> Self {
        Self {
            color: Some(color),
            pattern: Some(pattern),
        }
    }

    pub fn is_unidentified(&self) -> bool {
        self.color.is_none() && self.pattern.is_none()
    }

    /// Every identity the palette can produce, unidentified included.
    pub fn all() -> impl Iterator<Item = MarkerIdentity> {
        let colors = MarkerColor::ALL.into_iter().map(Some).chain([None]);
        colors.flat_map(|color| {
            MarkerPattern::ALL
                .into_iter()
                .map(Some)
                .chain([None])
                .map(move |pattern| MarkerIdentity { color, pattern })
        })
    }
}

impl fmt::Display for MarkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unidentified() {
            return f.write_str(UNIDENTIFIED);
        }
        let color = self.color.map_or(MISSING, MarkerColor::as_str);
        let pattern = self.pattern.map_or(MISSING, MarkerPattern::as_str);
        write!(f, "{color} {pattern}")
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid marker label {label:?}")]
pub struct ParseIdentityError {
    pub label: String,
}

impl FromStr for MarkerIdentity {
    type Err = ParseIdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseIdentityError {
            label: s.to_string(),
        };
        let s = s.trim();
        if s == UNIDENTIFIED {
            return Ok(Self::UNIDENTIFIED);
        }
        let (color, pattern) = s.split_once(' ').ok_or_else(err)?;
        let color = match color {
            MISSING => None,
            c => Some(MarkerColor::from_label(c).ok_or_else(err)?),
        };
        let pattern = match pattern {
            MISSING => None,
            p => Some(MarkerPattern::from_label(p).ok_or_else(err)?),
        };
        Ok(Self { color, pattern })
    }
}

impl From<MarkerIdentity> for String {
    fn from(id: MarkerIdentity) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for MarkerIdentity {
    type Error = ParseIdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One node's detections for one frame: at most one image-space point (pixels)
/// per marker identity.
pub type FrameDetections = BTreeMap<MarkerIdentity, Point2<f64>>;
