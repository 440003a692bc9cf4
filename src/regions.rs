//! The lookup table of selectable regions.
//!
//! The table is hierarchical: continents contain countries, countries contain provinces. Only the
//! leaves are selectable, the inner entries group them in the region selector.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const EMBEDDED_REGIONS: &str = include_str!("../assets/regions.json");

/// Identifier of a region polygon in the backing dataset (its `SMID` field).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Smid(pub u32);

impl fmt::Display for Smid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Smid {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Smid)
    }
}

/// Errors that can occur while loading the region table.
#[derive(Error, Debug)]
pub enum RegionTableError {
    /// The table is not valid JSON or has unexpected fields.
    #[error("Invalid region table")]
    Json(#[from] serde_json::Error),

    /// The table has no selectable region.
    #[error("Region table has no selectable regions")]
    Empty,
}

/// An entry of the region table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionEntry {
    /// Text shown in the selector.
    pub label: String,
    /// Stable machine readable name.
    pub value: String,
    /// The region's identifier in its dataset.
    pub smid: Smid,
    /// Nested regions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RegionEntry>,
}

impl RegionEntry {
    /// Whether the entry is a selectable region rather than a group.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// The static region lookup table.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionTable {
    entries: Vec<RegionEntry>,
}

impl RegionTable {
    /// Parses a region table from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, RegionTableError> {
        let entries: Vec<RegionEntry> = serde_json::from_str(json)?;
        let table = Self { entries };
        if table.leaves().next().is_none() {
            return Err(RegionTableError::Empty);
        }
        Ok(table)
    }

    /// The table shipped with the crate.
    pub fn embedded() -> Result<Self, RegionTableError> {
        Self::from_json_str(EMBEDDED_REGIONS)
    }

    /// The top level entries.
    pub fn entries(&self) -> &[RegionEntry] {
        &self.entries
    }

    /// All entries depth first, each with its depth in the hierarchy.
    pub fn flatten(&self) -> Vec<(usize, &RegionEntry)> {
        fn walk<'a>(entries: &'a [RegionEntry], depth: usize, out: &mut Vec<(usize, &'a RegionEntry)>) {
            for entry in entries {
                out.push((depth, entry));
                walk(&entry.children, depth + 1, out);
            }
        }

        let mut out = Vec::new();
        walk(&self.entries, 0, &mut out);
        out
    }

    /// The selectable regions.
    pub fn leaves(&self) -> impl Iterator<Item = &RegionEntry> {
        self.flatten()
            .into_iter()
            .map(|(_, entry)| entry)
            .filter(|entry| entry.is_leaf())
    }

    /// Finds a selectable region by its identifier.
    pub fn find(&self, smid: Smid) -> Option<&RegionEntry> {
        self.leaves().find(|entry| entry.smid == smid)
    }
}
