//! Delta-overlay types.
//!
//! A delta example sees its parent's rows through three tables per field
//! kind: an order table of rank-sorted references, a table of delta-only
//! rows, and a table of per-origin-row overrides and suppressions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assertion::AssertCondition;
use crate::id::ExampleId;

/// Field families that have an overlay trio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    Header,
    Query,
    UrlEncoded,
    Assert,
}

impl OverlayKind {
    pub const ALL: [OverlayKind; 4] = [
        OverlayKind::Header,
        OverlayKind::Query,
        OverlayKind::UrlEncoded,
        OverlayKind::Assert,
    ];

    /// Table-name infix: `delta_<infix>_order` and friends.
    pub fn table_infix(&self) -> &'static str {
        match self {
            OverlayKind::Header => "header",
            OverlayKind::Query => "query",
            OverlayKind::UrlEncoded => "urlenc",
            OverlayKind::Assert => "assert",
        }
    }
}

/// Where an order row points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Origin,
    Delta,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Origin => "origin",
            RefKind::Delta => "delta",
        }
    }
}

impl std::str::FromStr for RefKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "origin" => Ok(RefKind::Origin),
            "delta" => Ok(RefKind::Delta),
            other => Err(format!("unknown ref kind: {other}")),
        }
    }
}

/// How an effective item relates to the parent example.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// Unchanged reference to a parent row.
    Origin,
    /// Reference to a parent row with at least one override.
    Mixed,
    /// Row that exists only in the delta example.
    Delta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovePosition {
    Before,
    After,
}

/// One row of a `delta_*_order` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRow {
    pub example_id: ExampleId,
    pub ref_kind: RefKind,
    pub ref_id: Uuid,
    pub rank: String,
    pub revision: i64,
}

/// Overridable fields of a header, query or url-encoded row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyValueFields {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
}

/// Partial override of [`KeyValueFields`]; `None` means "inherit".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyValuePatch {
    pub key: Option<String>,
    pub value: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

/// Overridable fields of an assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertFields {
    pub condition: AssertCondition,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssertPatch {
    pub condition: Option<AssertCondition>,
    pub enabled: Option<bool>,
}

/// One row of a `delta_*_state` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRow<P> {
    pub example_id: ExampleId,
    pub origin_id: Uuid,
    pub suppressed: bool,
    pub patch: P,
}

/// One row of a `delta_*_delta` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRow<F> {
    pub id: Uuid,
    pub example_id: ExampleId,
    pub fields: F,
}

/// An item of the effective list as seen by a delta example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayItem<F> {
    /// Stable handle used for update, reset, delete and move.
    pub item_id: Uuid,
    /// The parent row id when this position references one.
    pub origin_id: Option<Uuid>,
    /// The parent row's own fields, before overrides.
    pub origin: Option<F>,
    pub fields: F,
    pub classification: Classification,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_uses_upper_case_tags() {
        let json = serde_json::to_string(&Classification::Mixed).unwrap();
        assert_eq!(json, "\"MIXED\"");
    }

    #[test]
    fn every_kind_has_a_distinct_table_infix() {
        let mut infixes: Vec<_> = OverlayKind::ALL.iter().map(|k| k.table_infix()).collect();
        infixes.sort();
        infixes.dedup();
        assert_eq!(infixes.len(), OverlayKind::ALL.len());
    }
}
