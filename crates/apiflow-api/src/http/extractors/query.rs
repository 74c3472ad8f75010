//! Query parameter extractors.

use serde::Deserialize;

use apiflow_types::id::{ExampleId, FolderId, RunId};

/// `?origin_id=` on delta overlay routes. Defaults to the delta example's
/// version parent.
#[derive(Debug, Deserialize, Default)]
pub struct OriginQuery {
    pub origin_id: Option<ExampleId>,
}

/// Collection item listing; no `parent_id` means the collection root.
#[derive(Debug, Deserialize, Default)]
pub struct ItemListQuery {
    pub parent_id: Option<FolderId>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

/// Restricts execution listings to one run.
#[derive(Debug, Deserialize, Default)]
pub struct RunFilterQuery {
    pub run_id: Option<RunId>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ImportQuery {
    /// Assign fresh ids when the snapshot's workspace already exists.
    #[serde(default)]
    pub remap: bool,
}
