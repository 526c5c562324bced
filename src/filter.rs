//! Search, filter, sort and group-by over entity sequences.
//!
//! Every function here is pure: inputs are borrowed, outputs are fresh
//! vectors, and no entity is modified.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::types::Entity;

/// Allowed values per field plus free-text search.
///
/// Values inside one field are OR-combined, fields are AND-combined, and an
/// empty value-set imposes no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(default)]
    pub fields: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub search: String,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `values` for `field` (adds to any values already allowed).
    pub fn with<I, S>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .entry(field.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_search(mut self, query: impl Into<String>) -> Self {
        self.search = query.into();
        self
    }

    /// True when no field constraint and no search query is active.
    pub fn is_empty(&self) -> bool {
        self.search.trim().is_empty() && self.fields.values().all(BTreeSet::is_empty)
    }

    pub fn active_count(&self) -> usize {
        self.fields.values().filter(|s| !s.is_empty()).count()
            + usize::from(!self.search.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortState {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Case-insensitive substring search over the listed fields.
/// A blank query returns the input unchanged.
pub fn search<E: Entity>(items: &[E], query: &str, keys: &[&str]) -> Vec<E> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return items.to_vec();
    }
    items
        .iter()
        .filter(|item| {
            keys.iter().any(|key| {
                item.field(key)
                    .as_text()
                    .is_some_and(|text| text.to_lowercase().contains(&needle))
            })
        })
        .cloned()
        .collect()
}

/// Keep items whose value for every constrained field is in the allowed set.
/// The search string is not applied here.
pub fn filter_by<E: Entity>(items: &[E], state: &FilterState) -> Vec<E> {
    let active: Vec<(&String, &BTreeSet<String>)> = state
        .fields
        .iter()
        .filter(|(_, allowed)| !allowed.is_empty())
        .collect();
    if active.is_empty() {
        return items.to_vec();
    }
    items
        .iter()
        .filter(|item| {
            active
                .iter()
                .all(|(field, allowed)| item.field(field).matches_any(allowed))
        })
        .cloned()
        .collect()
}

/// Search then filter, as the list and board views do.
pub fn apply_filters<E: Entity>(items: &[E], state: &FilterState, search_keys: &[&str]) -> Vec<E> {
    filter_by(&search(items, &state.search, search_keys), state)
}

/// Stable sort by field value. Missing values sort last in both directions.
pub fn sort_by<E: Entity>(items: &[E], field: &str, direction: SortDirection) -> Vec<E> {
    let mut keyed: Vec<(crate::types::FieldValue, &E)> =
        items.iter().map(|item| (item.field(field), item)).collect();
    keyed.sort_by(|(a, _), (b, _)| match (a.is_missing(), b.is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match direction {
            SortDirection::Asc => a.compare(b),
            SortDirection::Desc => b.compare(a),
        },
    });
    keyed.into_iter().map(|(_, item)| item.clone()).collect()
}

/// Partition items by the stringified value of `field`, preserving input
/// order inside each group. Groups are returned in first-seen order; missing
/// values group under the empty string.
pub fn group_by<E: Entity>(items: &[E], field: &str) -> Vec<(String, Vec<E>)> {
    let mut groups: Vec<(String, Vec<E>)> = Vec::new();
    for item in items {
        let key = item.field(field).as_text().unwrap_or_default();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(item.clone()),
            None => groups.push((key, vec![item.clone()])),
        }
    }
    groups
}
