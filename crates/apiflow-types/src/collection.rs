//! Collections, folders, endpoints, examples and the ordered rows an
//! example owns.
//!
//! Ordered rows carry `prev`/`next` pointers forming a doubly-linked list
//! within their scope: (collection, parent folder) for collection items,
//! the example for headers, queries, body fields and asserts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assertion::AssertCondition;
use crate::id::{
    AssertId, CollectionId, CollectionItemId, EndpointId, ExampleId, FieldId, FolderId,
    WorkspaceId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub collection_id: CollectionId,
    pub parent_id: Option<FolderId>,
    pub name: String,
}

/// What a collection item row points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ItemRef {
    Folder(FolderId),
    Endpoint(EndpointId),
}

/// Display-order row over folders and endpoints inside a
/// (collection, parent folder) scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub id: CollectionItemId,
    pub collection_id: CollectionId,
    pub parent_folder_id: Option<FolderId>,
    pub item: ItemRef,
    pub prev: Option<CollectionItemId>,
    pub next: Option<CollectionItemId>,
}

/// Method + URL template. A delta endpoint inherits both from
/// `delta_parent_id` when its own are empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub collection_id: CollectionId,
    pub folder_id: Option<FolderId>,
    pub name: String,
    pub method: String,
    pub url: String,
    pub delta_parent_id: Option<EndpointId>,
    pub created_at: DateTime<Utc>,
}

impl Endpoint {
    /// Effective (method, url) for this endpoint given its delta parent.
    pub fn inherit_from(&self, parent: Option<&Endpoint>) -> (String, String) {
        let method = if self.method.is_empty() {
            parent.map(|p| p.method.clone()).unwrap_or_default()
        } else {
            self.method.clone()
        };
        let url = if self.url.is_empty() {
            parent.map(|p| p.url.clone()).unwrap_or_default()
        } else {
            self.url.clone()
        };
        (method, url)
    }
}

/// Which body variant an example sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    #[default]
    None,
    Raw,
    Form,
    UrlEncoded,
}

impl BodyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyKind::None => "none",
            BodyKind::Raw => "raw",
            BodyKind::Form => "form",
            BodyKind::UrlEncoded => "url_encoded",
        }
    }
}

impl std::str::FromStr for BodyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(BodyKind::None),
            "raw" => Ok(BodyKind::Raw),
            "form" => Ok(BodyKind::Form),
            "url_encoded" => Ok(BodyKind::UrlEncoded),
            other => Err(format!("unknown body kind: {other}")),
        }
    }
}

/// A concrete, runnable parameterisation of an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id: ExampleId,
    pub endpoint_id: EndpointId,
    pub name: String,
    pub is_default: bool,
    pub body_kind: BodyKind,
    /// Set on delta examples: the example whose rows this one overlays.
    pub version_parent_id: Option<ExampleId>,
    pub prev: Option<ExampleId>,
    pub next: Option<ExampleId>,
    pub created_at: DateTime<Utc>,
}

impl Example {
    pub fn is_delta(&self) -> bool {
        self.version_parent_id.is_some()
    }
}

/// The four key/value child row families of an example.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Header,
    Query,
    UrlEncoded,
    Form,
}

impl FieldKind {
    pub const ALL: [FieldKind; 4] = [
        FieldKind::Header,
        FieldKind::Query,
        FieldKind::UrlEncoded,
        FieldKind::Form,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Header => "header",
            FieldKind::Query => "query",
            FieldKind::UrlEncoded => "url_encoded",
            FieldKind::Form => "form",
        }
    }
}

/// A header, query parameter, url-encoded or multipart form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub id: FieldId,
    pub example_id: ExampleId,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub delta_parent_id: Option<FieldId>,
    pub prev: Option<FieldId>,
    pub next: Option<FieldId>,
}

impl KeyValue {
    /// A detached row, ready to be linked in by the store.
    pub fn new(example_id: ExampleId, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: FieldId::new(),
            example_id,
            key: key.into(),
            value: value.into(),
            description: String::new(),
            enabled: true,
            delta_parent_id: None,
            prev: None,
            next: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub id: AssertId,
    pub example_id: ExampleId,
    pub condition: AssertCondition,
    pub enabled: bool,
    pub delta_parent_id: Option<AssertId>,
    pub prev: Option<AssertId>,
    pub next: Option<AssertId>,
}

impl Assertion {
    pub fn new(example_id: ExampleId, condition: AssertCondition) -> Self {
        Self {
            id: AssertId::new(),
            example_id,
            condition,
            enabled: true,
            delta_parent_id: None,
            prev: None,
            next: None,
        }
    }
}

/// Raw request body of an example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBody {
    pub example_id: ExampleId,
    pub data: Vec<u8>,
    #[serde(default = "default_visualize_mode")]
    pub visualize_mode: String,
    #[serde(default = "default_compress")]
    pub compress: String,
}

fn default_visualize_mode() -> String {
    "text".to_string()
}

fn default_compress() -> String {
    "none".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(method: &str, url: &str) -> Endpoint {
        Endpoint {
            id: EndpointId::new(),
            collection_id: CollectionId::new(),
            folder_id: None,
            name: "e".into(),
            method: method.into(),
            url: url.into(),
            delta_parent_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn delta_endpoint_inherits_empty_fields() {
        let parent = endpoint("POST", "https://api.test/items");
        let mut child = endpoint("", "");
        child.delta_parent_id = Some(parent.id);
        assert_eq!(
            child.inherit_from(Some(&parent)),
            ("POST".to_string(), "https://api.test/items".to_string())
        );

        child.url = "https://api.test/other".into();
        assert_eq!(child.inherit_from(Some(&parent)).1, "https://api.test/other");
    }

    #[test]
    fn body_kind_parses_stored_form() {
        for kind in [BodyKind::None, BodyKind::Raw, BodyKind::Form, BodyKind::UrlEncoded] {
            assert_eq!(kind.as_str().parse::<BodyKind>().unwrap(), kind);
        }
    }
}
