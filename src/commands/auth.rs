//! Session commands: login, cookie import, logout and status.

use std::fs;
use std::io::{self, Read};

use anyhow::{Result, anyhow, bail};
use bookfetch_core::auth::{AuthError, Credentials, unique_domain_count};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::context::AppContext;

pub async fn run_login_command(
    ctx: &AppContext,
    cancel: &CancellationToken,
    username: &str,
    password: &str,
) -> Result<()> {
    let credentials = Credentials::new(username, password);
    let manager = ctx.session_manager();
    match manager.login(cancel, &credentials).await {
        Ok(session) => {
            info!(
                expires_at = %session.expires_at(),
                path = %ctx.store.path().display(),
                "Logged in"
            );
            Ok(())
        }
        Err(error) if error.is_account_problem() => Err(anyhow!("Login rejected: {error}")),
        Err(AuthError::Cancelled) => bail!("Login cancelled"),
        Err(error) => Err(anyhow!("Login failed: {error}")),
    }
}

pub fn run_import_cookies_command(ctx: &AppContext, source: &str) -> Result<()> {
    let raw = read_cookie_source(source)?;

    let session = ctx
        .session_manager()
        .import_session(&raw)
        .map_err(|error| anyhow!("Cookie import failed: {error}"))?;
    info!(
        cookies = session.cookies().len(),
        domains = unique_domain_count(session.cookies()),
        expires_at = %session.expires_at(),
        path = %ctx.store.path().display(),
        "Session imported"
    );
    Ok(())
}

pub fn run_logout_command(ctx: &AppContext) -> Result<()> {
    let removed = ctx
        .session_manager()
        .logout()
        .map_err(|error| anyhow!("Failed to remove session: {error}"))?;
    if removed {
        info!(path = %ctx.store.path().display(), "Session removed");
    } else {
        info!("No saved session");
    }
    Ok(())
}

pub fn run_status_command(ctx: &AppContext) -> Result<()> {
    match ctx.store.load() {
        Ok(Some(session)) => {
            let now = Utc::now();
            match session.remaining_at(now) {
                Some(remaining) if session.is_valid_at(now) => {
                    println!(
                        "Logged in{} (expires {}, {} min left)",
                        session
                            .username()
                            .map(|name| format!(" as {name}"))
                            .unwrap_or_default(),
                        session.expires_at().to_rfc3339(),
                        remaining.num_minutes()
                    );
                }
                _ => println!("Session expired at {}", session.expires_at().to_rfc3339()),
            }
        }
        Ok(None) => println!("Not logged in"),
        Err(error) => {
            warn!(error = %error, "Session file is unreadable");
            println!("Not logged in");
        }
    }
    Ok(())
}

fn read_cookie_source(source: &str) -> Result<String> {
    let raw = if source == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(source)
            .map_err(|error| anyhow!("Cannot read cookie file '{source}': {error}"))?
    };
    if raw.trim().is_empty() {
        bail!("No cookie data provided");
    }
    Ok(raw)
}
