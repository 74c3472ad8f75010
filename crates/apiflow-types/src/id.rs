//! Typed identifiers.
//!
//! Every entity is keyed by a UUID v7, which sorts by creation time. Each
//! entity gets its own newtype so a `FlowId` can never be passed where a
//! `NodeId` is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-sortable).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifier of a workspace, the top-level container.
    WorkspaceId
);
define_id!(UserId);
define_id!(EnvId);
define_id!(VariableId);
define_id!(CollectionId);
define_id!(FolderId);
define_id!(
    /// Identifier of a display-order row over folders and endpoints.
    CollectionItemId
);
define_id!(EndpointId);
define_id!(ExampleId);
define_id!(
    /// Identifier shared by key/value child rows of an example
    /// (headers, queries, url-encoded and multipart form fields).
    FieldId
);
define_id!(AssertId);
define_id!(FlowId);
define_id!(FlowVariableId);
define_id!(NodeId);
define_id!(EdgeId);
define_id!(NodeExecutionId);
define_id!(
    /// Identifier of one execution of a flow.
    RunId
);
define_id!(ResponseId);
define_id!(ResponseHeaderId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_time_sortable() {
        let first = FlowId::new();
        let second = FlowId::new();
        assert!(first < second);
    }

    #[test]
    fn id_display_and_parse_agree() {
        let id = ExampleId::new();
        let parsed: ExampleId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn id_serializes_as_plain_string() {
        let id = NodeId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn invalid_id_is_rejected() {
        assert!("not-a-uuid".parse::<WorkspaceId>().is_err());
    }
}
