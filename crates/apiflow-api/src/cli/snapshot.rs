//! Snapshot CLI commands: export, import.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use apiflow_core::repository::WorkspaceRepository;
use apiflow_infra::sqlite::snapshot::ImportOptions;
use apiflow_types::id::{ExampleId, FlowId, WorkspaceId};
use apiflow_types::snapshot::{ExportFilter, WorkspaceSnapshot};
use apiflow_types::workspace::WorkspaceRole;

use crate::state::AppState;

/// Export a workspace to `output` or stdout.
///
/// # Examples
///
/// ```bash
/// apiflow export --workspace 0190c1d2-... --out ws.json
/// apiflow export --workspace 0190c1d2-... --flow 0190c1e5-...
/// ```
pub async fn export_workspace(
    state: &AppState,
    workspace_id: WorkspaceId,
    output: Option<&Path>,
    flow_ids: Vec<FlowId>,
    example_ids: Vec<ExampleId>,
    json: bool,
) -> Result<()> {
    let filter = ExportFilter {
        flow_ids,
        example_ids,
    };
    let snapshot = state.snapshots.export(&workspace_id, &filter).await?;
    let body = serde_json::to_string_pretty(&snapshot)?;

    let Some(path) = output else {
        println!("{body}");
        return Ok(());
    };
    tokio::fs::write(path, body.as_bytes())
        .await
        .with_context(|| format!("writing {}", path.display()))?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "workspace_id": workspace_id,
                "path": path.display().to_string(),
                "flows": snapshot.flows.len(),
                "examples": snapshot.examples.len(),
            })
        );
    } else {
        println!(
            "  {} Exported '{}' to {} ({} flows, {} examples)",
            style("✓").green().bold(),
            style(&snapshot.workspace.name).cyan(),
            style(path.display()).bold(),
            snapshot.flows.len(),
            snapshot.examples.len()
        );
    }
    Ok(())
}

/// Import a snapshot file, optionally granting ownership to an existing
/// user.
pub async fn import_workspace(
    state: &AppState,
    file: &Path,
    remap: bool,
    owner: Option<&str>,
    json: bool,
) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let snapshot: WorkspaceSnapshot =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", file.display()))?;

    let repo = state.workspace_service.repo();
    let owner = match owner {
        Some(email) => Some(
            repo.get_user_by_email(email)
                .await?
                .with_context(|| format!("no user with email '{email}'; create one with `apiflow token`"))?,
        ),
        None => None,
    };

    let report = state
        .snapshots
        .import(snapshot, ImportOptions { remap })
        .await?;
    if let Some(user) = &owner {
        if repo.member_role(&report.workspace_id, &user.id).await?.is_none() {
            repo.add_member(&report.workspace_id, &user.id, WorkspaceRole::Owner)
                .await?;
        }
    }

    if json {
        println!(
            "{}",
            serde_json::json!({
                "workspace_id": report.workspace_id,
                "remapped": report.remapped,
                "rows": report.rows,
            })
        );
    } else {
        println!(
            "  {} Imported workspace {} ({} rows{})",
            style("✓").green().bold(),
            style(report.workspace_id).cyan(),
            report.rows,
            if report.remapped { ", ids remapped" } else { "" }
        );
        if let Some(user) = owner {
            println!("    owner: {}", style(user.email).bold());
        }
    }
    Ok(())
}
