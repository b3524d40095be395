// src/version/mod.rs

//! Version handling and constraint satisfaction for package dependencies
//!
//! Versions are free-form strings ordered segment by segment. Separators
//! (`.`, `-`, `_`, `+`) split segments, and a boundary between digits and
//! letters splits them too, so `1.0RC1` reads as `1 . 0 . RC . 1`.
//! Numeric segments compare as numbers; word segments rank as
//! `dev < alpha = a < beta = b < RC = rc < (number) < pl = p`, with any
//! other word below `dev`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Rank of a numeric segment among the special word forms
const NUMBER_RANK: i8 = 4;

/// Special word forms, matched by prefix in this order
const SPECIAL_FORMS: &[(&str, i8)] = &[
    ("dev", 0),
    ("alpha", 1),
    ("a", 1),
    ("beta", 2),
    ("b", 2),
    ("RC", 3),
    ("rc", 3),
    ("#", NUMBER_RANK),
    ("pl", 5),
    ("p", 5),
];

/// One canonical segment of a version string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Number(u64),
    Word(i8),
}

impl Segment {
    fn parse(s: &str) -> Self {
        if s.bytes().all(|b| b.is_ascii_digit()) {
            Segment::Number(s.parse().unwrap_or(u64::MAX))
        } else {
            Segment::Word(special_rank(s))
        }
    }

    fn rank(&self) -> i8 {
        match self {
            Segment::Number(_) => NUMBER_RANK,
            Segment::Word(rank) => *rank,
        }
    }

    fn compare(&self, other: &Segment) -> Ordering {
        match (self, other) {
            (Segment::Number(a), Segment::Number(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn special_rank(word: &str) -> i8 {
    SPECIAL_FORMS
        .iter()
        .find(|(form, _)| word.starts_with(form))
        .map(|(_, rank)| *rank)
        .unwrap_or(-1)
}

/// Split a version string into canonical segments
fn canonicalize(s: &str) -> Vec<Segment> {
    let mut canonical = String::with_capacity(s.len() * 2);
    let mut prev: Option<char> = None;

    for c in s.chars() {
        let boundary = match prev {
            Some(p) => {
                let p_digit = p.is_ascii_digit();
                let c_digit = c.is_ascii_digit();
                (p_digit && !c_digit && c != '.') || (!p_digit && p != '.' && c_digit)
            }
            None => false,
        };

        if !c.is_ascii_alphanumeric() {
            if !canonical.ends_with('.') {
                canonical.push('.');
            }
        } else {
            if boundary && !canonical.ends_with('.') {
                canonical.push('.');
            }
            canonical.push(c);
        }
        prev = Some(c);
    }

    canonical
        .split('.')
        .filter(|part| !part.is_empty())
        .map(Segment::parse)
        .collect()
}

/// A package version
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    segments: Vec<Segment>,
}

impl Version {
    /// Parse a version string
    pub fn parse(s: &str) -> Result<Self> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(Error::ParseError("Empty version string".to_string()));
        }

        let segments = canonicalize(raw);
        if segments.is_empty() {
            return Err(Error::ParseError(format!("Invalid version '{}'", s)));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The version as originally written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Compare two versions
    pub fn compare(&self, other: &Version) -> Ordering {
        let mut left = self.segments.iter();
        let mut right = other.segments.iter();

        loop {
            match (left.next(), right.next()) {
                (Some(a), Some(b)) => match a.compare(b) {
                    Ordering::Equal => continue,
                    ord => return ord,
                },
                (Some(a), None) => return tail_order(a),
                (None, Some(b)) => return tail_order(b).reverse(),
                (None, None) => return Ordering::Equal,
            }
        }
    }
}

/// Ordering of a longer version against its shorter prefix
fn tail_order(extra: &Segment) -> Ordering {
    match extra {
        Segment::Number(_) => Ordering::Greater,
        Segment::Word(rank) => rank.cmp(&NUMBER_RANK),
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Equal versions always have the same segment count
        for segment in &self.segments {
            match segment {
                Segment::Number(n) => n.hash(state),
                Segment::Word(rank) => (u64::MAX - *rank as u64).hash(state),
            }
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Release stability, ordered from least to most stable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseState {
    Snapshot,
    Devel,
    Alpha,
    Beta,
    Stable,
}

impl ReleaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseState::Snapshot => "snapshot",
            ReleaseState::Devel => "devel",
            ReleaseState::Alpha => "alpha",
            ReleaseState::Beta => "beta",
            ReleaseState::Stable => "stable",
        }
    }

    /// Whether a release in `candidate` state is acceptable for a request
    /// of this state (this state or anything more stable)
    pub fn accepts(&self, candidate: ReleaseState) -> bool {
        candidate >= *self
    }

    pub fn all() -> [ReleaseState; 5] {
        [
            ReleaseState::Snapshot,
            ReleaseState::Devel,
            ReleaseState::Alpha,
            ReleaseState::Beta,
            ReleaseState::Stable,
        ]
    }
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReleaseState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "snapshot" => Ok(ReleaseState::Snapshot),
            "devel" | "dev" => Ok(ReleaseState::Devel),
            "alpha" => Ok(ReleaseState::Alpha),
            "beta" => Ok(ReleaseState::Beta),
            "stable" => Ok(ReleaseState::Stable),
            _ => Err(Error::ParseError(format!("Unknown release state '{}'", s))),
        }
    }
}

/// Version constraint operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// Any version is acceptable
    Any,
    /// Exact version match
    Exact(Version),
    /// Greater than
    GreaterThan(Version),
    /// Greater than or equal
    GreaterOrEqual(Version),
    /// Less than
    LessThan(Version),
    /// Less than or equal
    LessOrEqual(Version),
    /// Not equal
    NotEqual(Version),
    /// Every constraint must be satisfied (min/max/exclude ranges)
    All(Vec<VersionConstraint>),
}

impl VersionConstraint {
    /// Parse a version constraint string
    ///
    /// Examples:
    /// - ">= 1.2.3" → GreaterOrEqual(1.2.3)
    /// - "< 2.0.0" → LessThan(2.0.0)
    /// - ">= 1.0, < 2.0, != 1.5" → All([...])
    /// - "1.5.0" → Exact(1.5.0)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() || s == "*" {
            return Ok(VersionConstraint::Any);
        }

        if s.contains(',') {
            let parts = s
                .split(',')
                .map(Self::parse)
                .collect::<Result<Vec<_>>>()?;
            return Ok(VersionConstraint::All(parts));
        }

        if let Some(rest) = s.strip_prefix(">=") {
            Ok(VersionConstraint::GreaterOrEqual(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix("<=") {
            Ok(VersionConstraint::LessOrEqual(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix("!=") {
            Ok(VersionConstraint::NotEqual(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('>') {
            Ok(VersionConstraint::GreaterThan(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('<') {
            Ok(VersionConstraint::LessThan(Version::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('=') {
            Ok(VersionConstraint::Exact(Version::parse(rest)?))
        } else {
            // No operator means exact match
            Ok(VersionConstraint::Exact(Version::parse(s)?))
        }
    }

    /// Build a range constraint from optional bounds and exclusions
    pub fn from_bounds(min: Option<&Version>, max: Option<&Version>, exclude: &[Version]) -> Self {
        let mut parts = Vec::new();
        if let Some(min) = min {
            parts.push(VersionConstraint::GreaterOrEqual(min.clone()));
        }
        if let Some(max) = max {
            parts.push(VersionConstraint::LessOrEqual(max.clone()));
        }
        parts.extend(exclude.iter().cloned().map(VersionConstraint::NotEqual));

        match parts.len() {
            0 => VersionConstraint::Any,
            1 => parts.remove(0),
            _ => VersionConstraint::All(parts),
        }
    }

    /// Check if a version satisfies this constraint
    pub fn satisfies(&self, version: &Version) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Exact(v) => version == v,
            VersionConstraint::GreaterThan(v) => version > v,
            VersionConstraint::GreaterOrEqual(v) => version >= v,
            VersionConstraint::LessThan(v) => version < v,
            VersionConstraint::LessOrEqual(v) => version <= v,
            VersionConstraint::NotEqual(v) => version != v,
            VersionConstraint::All(parts) => parts.iter().all(|c| c.satisfies(version)),
        }
    }

    /// The single version this constraint pins, if any
    pub fn pinned(&self) -> Option<&Version> {
        match self {
            VersionConstraint::Exact(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => write!(f, "*"),
            VersionConstraint::Exact(v) => write!(f, "= {}", v),
            VersionConstraint::GreaterThan(v) => write!(f, "> {}", v),
            VersionConstraint::GreaterOrEqual(v) => write!(f, ">= {}", v),
            VersionConstraint::LessThan(v) => write!(f, "< {}", v),
            VersionConstraint::LessOrEqual(v) => write!(f, "<= {}", v),
            VersionConstraint::NotEqual(v) => write!(f, "!= {}", v),
            VersionConstraint::All(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", rendered.join(", "))
            }
        }
    }
}
