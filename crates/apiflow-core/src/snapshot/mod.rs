//! Workspace snapshot rules: export filtering, import validation and id
//! remapping. Reading and writing the rows is the storage layer's job.

mod filter;
mod remap;

use std::collections::HashSet;

use apiflow_types::error::RepositoryError;
use apiflow_types::id::WorkspaceId;
use apiflow_types::snapshot::{SNAPSHOT_FORMAT_VERSION, WorkspaceSnapshot};
use uuid::Uuid;

pub use filter::filter_snapshot;
pub use remap::{IdMap, remap_ids};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("unsupported snapshot format version {0} (expected {SNAPSHOT_FORMAT_VERSION})")]
    UnsupportedVersion(u32),

    #[error("workspace {0} already exists")]
    WorkspaceExists(WorkspaceId),

    #[error("identifier {0} appears more than once in the snapshot")]
    DuplicateId(Uuid),

    #[error("identifier {0} already exists in the database")]
    IdExists(Uuid),

    #[error("{entity} {id} references missing {missing} {target}")]
    MissingReference {
        entity: &'static str,
        id: Uuid,
        missing: &'static str,
        target: Uuid,
    },

    #[error("invalid snapshot: {0}")]
    Invalid(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Every entity id the snapshot introduces, including overlay delta rows.
///
/// Child rows keyed only by their owner (raw bodies, state rows, order rows)
/// have no id of their own and are not listed.
pub fn owned_ids(s: &WorkspaceSnapshot) -> Vec<Uuid> {
    let mut ids = vec![s.workspace.id.0];
    ids.extend(s.environments.iter().map(|e| e.id.0));
    ids.extend(s.variables.iter().map(|v| v.id.0));
    ids.extend(s.collections.iter().map(|c| c.id.0));
    ids.extend(s.folders.iter().map(|f| f.id.0));
    ids.extend(s.endpoints.iter().map(|e| e.id.0));
    ids.extend(s.collection_items.iter().map(|i| i.id.0));
    ids.extend(s.examples.iter().map(|e| e.id.0));
    for rows in [&s.headers, &s.queries, &s.urlencoded, &s.form_fields] {
        ids.extend(rows.iter().map(|r| r.id.0));
    }
    ids.extend(s.asserts.iter().map(|a| a.id.0));
    ids.extend(s.overlay.kv_deltas.iter().map(|d| d.row.id));
    ids.extend(s.overlay.assert_deltas.iter().map(|d| d.id));
    ids.extend(s.flows.iter().map(|f| f.id.0));
    ids.extend(s.flow_variables.iter().map(|v| v.id.0));
    ids.extend(s.nodes.iter().map(|n| n.id.0));
    ids.extend(s.edges.iter().map(|e| e.id.0));
    ids
}

fn require(
    known: &HashSet<Uuid>,
    entity: &'static str,
    id: Uuid,
    missing: &'static str,
    target: Uuid,
) -> Result<(), SnapshotError> {
    if known.contains(&target) {
        Ok(())
    } else {
        Err(SnapshotError::MissingReference {
            entity,
            id,
            missing,
            target,
        })
    }
}

/// Check a snapshot is self-contained: a supported version, unique ids, and
/// every foreign key pointing at a row inside the snapshot.
pub fn validate_snapshot(s: &WorkspaceSnapshot) -> Result<(), SnapshotError> {
    if s.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(s.format_version));
    }

    let mut known = HashSet::new();
    for id in owned_ids(s) {
        if !known.insert(id) {
            return Err(SnapshotError::DuplicateId(id));
        }
    }

    let ws = s.workspace.id.0;
    for env in &s.environments {
        if env.workspace_id.0 != ws {
            return Err(SnapshotError::Invalid(format!("environment {} belongs to another workspace", env.id)));
        }
    }
    for var in &s.variables {
        require(&known, "variable", var.id.0, "environment", var.env_id.0)?;
    }
    for c in &s.collections {
        if c.workspace_id.0 != ws {
            return Err(SnapshotError::Invalid(format!("collection {} belongs to another workspace", c.id)));
        }
    }
    for f in &s.folders {
        require(&known, "folder", f.id.0, "collection", f.collection_id.0)?;
        if let Some(parent) = f.parent_id {
            require(&known, "folder", f.id.0, "folder", parent.0)?;
        }
    }
    for e in &s.endpoints {
        require(&known, "endpoint", e.id.0, "collection", e.collection_id.0)?;
        if let Some(folder) = e.folder_id {
            require(&known, "endpoint", e.id.0, "folder", folder.0)?;
        }
        if let Some(parent) = e.delta_parent_id {
            require(&known, "endpoint", e.id.0, "endpoint", parent.0)?;
        }
    }
    for item in &s.collection_items {
        require(&known, "collection item", item.id.0, "collection", item.collection_id.0)?;
        let target = match item.item {
            apiflow_types::collection::ItemRef::Folder(f) => f.0,
            apiflow_types::collection::ItemRef::Endpoint(e) => e.0,
        };
        require(&known, "collection item", item.id.0, "item", target)?;
    }
    for ex in &s.examples {
        require(&known, "example", ex.id.0, "endpoint", ex.endpoint_id.0)?;
        if let Some(parent) = ex.version_parent_id {
            require(&known, "example", ex.id.0, "example", parent.0)?;
        }
    }
    for rows in [&s.headers, &s.queries, &s.urlencoded, &s.form_fields] {
        for r in rows {
            require(&known, "field", r.id.0, "example", r.example_id.0)?;
        }
    }
    for a in &s.asserts {
        require(&known, "assert", a.id.0, "example", a.example_id.0)?;
    }
    for body in &s.raw_bodies {
        require(&known, "raw body", body.example_id.0, "example", body.example_id.0)?;
    }
    for order in &s.overlay.orders {
        require(&known, "overlay order", order.row.ref_id, "example", order.row.example_id.0)?;
        require(&known, "overlay order", order.row.example_id.0, "row", order.row.ref_id)?;
    }
    for v in &s.flow_variables {
        require(&known, "flow variable", v.id.0, "flow", v.flow_id.0)?;
    }
    for f in &s.flows {
        if f.workspace_id.0 != ws {
            return Err(SnapshotError::Invalid(format!("flow {} belongs to another workspace", f.id)));
        }
    }
    for n in &s.nodes {
        require(&known, "node", n.id.0, "flow", n.flow_id.0)?;
    }
    for e in &s.edges {
        require(&known, "edge", e.id.0, "node", e.source_id.0)?;
        require(&known, "edge", e.id.0, "node", e.target_id.0)?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_is_valid() {
        validate_snapshot(&fixture::build().snapshot).unwrap();
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut s = fixture::build().snapshot;
        let dup = s.headers[0].clone();
        s.headers.push(dup);
        assert!(matches!(validate_snapshot(&s), Err(SnapshotError::DuplicateId(_))));
    }

    #[test]
    fn dangling_references_are_rejected() {
        let mut s = fixture::build().snapshot;
        s.examples.retain(|e| e.version_parent_id.is_none());
        let err = validate_snapshot(&s).unwrap_err();
        assert!(matches!(err, SnapshotError::MissingReference { .. }), "{err}");
    }

    #[test]
    fn future_versions_are_rejected() {
        let mut s = fixture::build().snapshot;
        s.format_version = SNAPSHOT_FORMAT_VERSION + 1;
        assert!(matches!(validate_snapshot(&s), Err(SnapshotError::UnsupportedVersion(_))));
    }
}
