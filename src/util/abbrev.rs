//! Short, unique display labels for source trees and flavors.
//!
//! Worker output from many matrix cells is interleaved in one log stream,
//! so every line carries a compact label such as `official/deb`. Two
//! strategies are provided:
//!
//! - [`abbreviate_paths`] walks up from each path's basename until every
//!   path has a segment nobody else uses.
//! - [`abbreviate_columns`] finds the first character column that tells
//!   the strings apart and cuts a fixed-width code starting there.
//!
//! Labels are for display only. Paths and identity always use the full
//! source path or flavor name.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use thiserror::Error;

use crate::core::{BuildFlavor, SourceTree, WorkItem};

/// Default width of flavor codes.
pub const FLAVOR_LABEL_WIDTH: usize = 3;

/// Failure to find a unique abbreviation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbbrevError {
    #[error("no unique abbreviation found for: {}", .remaining.join(", "))]
    NoUniqueAbbreviation { remaining: Vec<String> },
}

/// Derive a label for each name.
///
/// This is path abbreviation: see [`abbreviate_paths`].
pub fn derive_labels<I, S>(names: I) -> Result<BTreeMap<String, String>, AbbrevError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    abbreviate_paths(names)
}

/// Label each path with its shortest unique trailing segment.
///
/// Each round, a candidate whose current basename is unique among all
/// current basenames (and not already taken as a label) is finalized.
/// The others move to their parent and try again. Running out of
/// segments while collisions remain is an error.
///
/// A path with no segments at all (e.g. `/`) is labelled with itself.
pub fn abbreviate_paths<I, S>(paths: I) -> Result<BTreeMap<String, String>, AbbrevError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let originals: BTreeSet<String> = paths.into_iter().map(|p| p.as_ref().to_string()).collect();

    let mut labels = BTreeMap::new();
    let mut taken: HashSet<String> = HashSet::new();

    // (original, segments, how many leading segments are still in play)
    let mut remaining: Vec<(String, Vec<String>, usize)> = Vec::new();
    for original in originals {
        let segments: Vec<String> = original
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            taken.insert(original.clone());
            labels.insert(original.clone(), original);
        } else {
            let depth = segments.len();
            remaining.push((original, segments, depth));
        }
    }

    while !remaining.is_empty() {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for (_, segments, depth) in &remaining {
            *counts.entry(segments[depth - 1].as_str()).or_default() += 1;
        }

        let mut finalized = Vec::new();
        let mut colliding = Vec::new();
        for (original, segments, depth) in &remaining {
            let base = &segments[depth - 1];
            if counts[base.as_str()] == 1 && !taken.contains(base) {
                finalized.push((original.clone(), base.clone()));
            } else {
                colliding.push((original.clone(), segments.clone(), depth - 1));
            }
        }

        for (original, base) in finalized {
            taken.insert(base.clone());
            labels.insert(original, base);
        }

        if colliding.iter().any(|(_, _, depth)| *depth == 0) {
            return Err(AbbrevError::NoUniqueAbbreviation {
                remaining: colliding.into_iter().map(|(o, _, _)| o).collect(),
            });
        }
        remaining = colliding;
    }

    Ok(labels)
}

/// Cut a fixed-width code out of each name at the first distinguishing column.
///
/// Columns are scanned left to right up to the length of the shortest
/// name. The first column holding a character that occurs exactly once
/// is a candidate start; it is chosen if the `width`-character slices
/// starting there are pairwise distinct, otherwise the scan moves on.
/// Slices near the end of a name may be shorter than `width`.
pub fn abbreviate_columns<I, S>(
    names: I,
    width: usize,
) -> Result<BTreeMap<String, String>, AbbrevError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let width = width.max(1);
    let names: BTreeSet<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();

    if names.len() <= 1 {
        return Ok(names
            .into_iter()
            .map(|name| {
                let label: String = name.chars().take(width).collect();
                (name, label)
            })
            .collect());
    }

    let chars: Vec<(String, Vec<char>)> = names
        .into_iter()
        .map(|name| {
            let chars = name.chars().collect();
            (name, chars)
        })
        .collect();
    let shortest = chars.iter().map(|(_, c)| c.len()).min().unwrap_or(0);

    for column in 0..shortest {
        let mut counts: HashMap<char, usize> = HashMap::new();
        for (_, c) in &chars {
            *counts.entry(c[column]).or_default() += 1;
        }
        if !counts.values().any(|&n| n == 1) {
            continue;
        }

        let labels: BTreeMap<String, String> = chars
            .iter()
            .map(|(name, c)| (name.clone(), c[column..].iter().take(width).collect()))
            .collect();
        let distinct: HashSet<&String> = labels.values().collect();
        if distinct.len() == labels.len() {
            return Ok(labels);
        }
    }

    Err(AbbrevError::NoUniqueAbbreviation {
        remaining: chars.into_iter().map(|(name, _)| name).collect(),
    })
}

/// Compact flavor codes, falling back to full names when no column works.
pub fn flavor_labels<I, S>(names: I, width: usize) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
    match abbreviate_columns(&names, width) {
        Ok(labels) => labels,
        Err(e) => {
            tracing::debug!("using full flavor names as labels: {}", e);
            names.into_iter().map(|n| (n.clone(), n)).collect()
        }
    }
}

/// Labels for every source tree and flavor of one run.
#[derive(Debug, Clone, Default)]
pub struct Labels {
    sources: BTreeMap<String, String>,
    flavors: BTreeMap<String, String>,
}

impl Labels {
    /// Derive labels for a run's sources and flavors.
    pub fn derive(sources: &[SourceTree], flavors: &[BuildFlavor]) -> Result<Self, AbbrevError> {
        let sources = abbreviate_paths(sources.iter().map(|s| s.display_string()))?;
        let flavors = flavor_labels(flavors.iter().map(|f| f.name.as_str()), FLAVOR_LABEL_WIDTH);
        Ok(Labels { sources, flavors })
    }

    /// Label for a source tree (its full path if unknown).
    pub fn source(&self, source: &SourceTree) -> String {
        let key = source.display_string();
        self.sources.get(&key).cloned().unwrap_or(key)
    }

    /// Label for a flavor (its name if unknown).
    pub fn flavor(&self, flavor: &BuildFlavor) -> String {
        self.flavors
            .get(&flavor.name)
            .cloned()
            .unwrap_or_else(|| flavor.name.clone())
    }

    /// Label for a work item, e.g. `official/deb`.
    pub fn item(&self, item: &WorkItem) -> String {
        format!("{}/{}", self.source(&item.source), self.flavor(&item.flavor))
    }
}
