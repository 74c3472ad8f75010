//! `apiflow curl`: render an example as a curl command line.

use anyhow::Result;

use apiflow_infra::sqlite::Owned;
use apiflow_types::id::ExampleId;

use crate::http::handlers::example::render_curl;
use crate::state::AppState;

/// Print the resolved request for `example_id` with the owning workspace's
/// active environment applied.
pub async fn print_curl(state: &AppState, example_id: ExampleId, json: bool) -> Result<()> {
    let workspace_id = state.ownership.workspace_of(Owned::Example(example_id)).await?;
    let curl = render_curl(state, &example_id, &workspace_id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "example_id": example_id, "curl": curl })
        );
    } else {
        println!("{curl}");
    }
    Ok(())
}
