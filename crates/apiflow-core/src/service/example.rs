//! Example-level use cases that span more than one repository call.

use apiflow_types::collection::Example;
use apiflow_types::id::ExampleId;
use chrono::Utc;

use super::ServiceError;
use crate::repository::ExampleRepository;

pub struct ExampleService<E: ExampleRepository> {
    repo: E,
}

impl<E: ExampleRepository> ExampleService<E> {
    pub fn new(repo: E) -> Self {
        Self { repo }
    }

    /// Create a delta example over `parent`. Its overlay lists are seeded
    /// lazily on first read, so the new example starts out identical to
    /// its parent.
    pub async fn create_delta(&self, parent_id: &ExampleId, name: &str) -> Result<Example, ServiceError> {
        let parent = self
            .repo
            .get_example(parent_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("example {parent_id}")))?;
        let name = match name.trim() {
            "" => format!("{} (copy)", parent.name),
            n => n.to_string(),
        };
        let delta = Example {
            id: ExampleId::new(),
            endpoint_id: parent.endpoint_id,
            name,
            is_default: false,
            body_kind: parent.body_kind,
            version_parent_id: Some(parent.id),
            prev: None,
            next: None,
            created_at: Utc::now(),
        };
        let created = self.repo.create_example(&delta).await?;

        if let Some(body) = self.repo.get_raw_body(&parent.id).await? {
            let mut copy = body;
            copy.example_id = created.id;
            self.repo.put_raw_body(&copy).await?;
        }
        tracing::info!(example_id = %created.id, parent_id = %parent.id, "delta example created");
        Ok(created)
    }
}
