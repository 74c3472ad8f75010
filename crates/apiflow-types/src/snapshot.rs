//! Workspace snapshot: a single aggregate holding every owned entity, used
//! for export and import.
//!
//! Arrays are emitted in dependency order (a row's referents precede it) and
//! ordered rows keep their `prev`/`next` pointers, so import can rebuild the
//! linked lists exactly.

use serde::{Deserialize, Serialize};

use crate::collection::{
    Assertion, Collection, CollectionItem, Endpoint, Example, Folder, KeyValue, RawBody,
};
use crate::flow::{Flow, FlowEdge, FlowNode, FlowVariable};
use crate::id::{ExampleId, FlowId};
use crate::overlay::{
    AssertFields, AssertPatch, DeltaRow, KeyValueFields, KeyValuePatch, OrderRow, OverlayKind,
    StateRow,
};
use crate::workspace::{Environment, Variable, Workspace};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayOrderRecord {
    pub kind: OverlayKind,
    #[serde(flatten)]
    pub row: OrderRow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueDeltaRecord {
    pub kind: OverlayKind,
    #[serde(flatten)]
    pub row: DeltaRow<KeyValueFields>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueStateRecord {
    pub kind: OverlayKind,
    #[serde(flatten)]
    pub row: StateRow<KeyValuePatch>,
}

/// Every row of every overlay trio owned by the snapshot's examples.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OverlaySnapshot {
    #[serde(default)]
    pub orders: Vec<OverlayOrderRecord>,
    #[serde(default)]
    pub kv_deltas: Vec<KeyValueDeltaRecord>,
    #[serde(default)]
    pub kv_states: Vec<KeyValueStateRecord>,
    #[serde(default)]
    pub assert_deltas: Vec<DeltaRow<AssertFields>>,
    #[serde(default)]
    pub assert_states: Vec<StateRow<AssertPatch>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub format_version: u32,
    pub workspace: Workspace,
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub collection_items: Vec<CollectionItem>,
    #[serde(default)]
    pub examples: Vec<Example>,
    #[serde(default)]
    pub headers: Vec<KeyValue>,
    #[serde(default)]
    pub queries: Vec<KeyValue>,
    #[serde(default)]
    pub urlencoded: Vec<KeyValue>,
    #[serde(default)]
    pub form_fields: Vec<KeyValue>,
    #[serde(default)]
    pub asserts: Vec<Assertion>,
    #[serde(default)]
    pub raw_bodies: Vec<RawBody>,
    #[serde(default)]
    pub overlay: OverlaySnapshot,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub flow_variables: Vec<FlowVariable>,
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

impl WorkspaceSnapshot {
    pub fn empty(workspace: Workspace) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            workspace,
            environments: Vec::new(),
            variables: Vec::new(),
            collections: Vec::new(),
            folders: Vec::new(),
            endpoints: Vec::new(),
            collection_items: Vec::new(),
            examples: Vec::new(),
            headers: Vec::new(),
            queries: Vec::new(),
            urlencoded: Vec::new(),
            form_fields: Vec::new(),
            asserts: Vec::new(),
            raw_bodies: Vec::new(),
            overlay: OverlaySnapshot::default(),
            flows: Vec::new(),
            flow_variables: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

/// Restricts an export to the given flows and/or examples plus whatever
/// they transitively depend on. Empty filter = whole workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFilter {
    #[serde(default)]
    pub flow_ids: Vec<FlowId>,
    #[serde(default)]
    pub example_ids: Vec<ExampleId>,
}

impl ExportFilter {
    pub fn is_empty(&self) -> bool {
        self.flow_ids.is_empty() && self.example_ids.is_empty()
    }
}
