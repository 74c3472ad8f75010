//! `apiflow token`: issue a session token for API access.

use anyhow::{Result, bail};
use chrono::{Duration, Utc};
use console::style;

use apiflow_core::repository::WorkspaceRepository;
use apiflow_types::id::UserId;
use apiflow_types::workspace::User;

use crate::state::AppState;

/// Issue a token for `email`, creating the user when it does not exist yet.
pub async fn issue_token(
    state: &AppState,
    email: &str,
    name: Option<&str>,
    ttl_hours: i64,
    json: bool,
) -> Result<()> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        bail!("'{email}' is not an email address");
    }
    if ttl_hours <= 0 {
        bail!("--ttl-hours must be positive");
    }

    let repo = state.workspace_service.repo();
    let (user, created) = match repo.get_user_by_email(email).await? {
        Some(user) => (user, false),
        None => {
            let display = name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| email.split('@').next().unwrap_or(email));
            let user = User {
                id: UserId::new(),
                email: email.to_string(),
                name: display.to_string(),
                created_at: Utc::now(),
            };
            (repo.create_user(&user).await?, true)
        }
    };
    if created {
        tracing::info!(user_id = %user.id, "user created");
    }

    let ttl = Duration::hours(ttl_hours);
    let token = state.tokens.issue(&user.id, ttl);

    if json {
        println!(
            "{}",
            serde_json::json!({
                "user_id": user.id,
                "email": user.email,
                "created": created,
                "expires_at": Utc::now() + ttl,
                "token": token,
            })
        );
        return Ok(());
    }

    println!();
    if created {
        println!(
            "  {} Created user {} ({})",
            style("✓").green().bold(),
            style(&user.email).bold(),
            user.id
        );
    }
    println!(
        "  {} Token for {} (valid {} hours):",
        style("🔑").bold(),
        style(&user.email).cyan(),
        ttl_hours
    );
    println!();
    println!("  {}", style(&token).yellow().bold());
    println!();
    println!(
        "  {}",
        style("Send it as 'Authorization: Bearer <token>'").dim()
    );
    Ok(())
}
