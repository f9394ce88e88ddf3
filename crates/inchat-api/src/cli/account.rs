//! Account CLI commands: register, login, logout, whoami.

use anyhow::{Context, Result};
use console::style;
use dialoguer::Password;

use crate::state::AppState;

fn prompt_password(confirm: bool) -> Result<String> {
    let prompt = Password::new().with_prompt("Password");
    let prompt = if confirm {
        prompt.with_confirmation("Repeat password", "Passwords do not match")
    } else {
        prompt
    };
    prompt.interact().context("failed to read password")
}

/// Register `username` and save the new session.
pub async fn register(
    state: &AppState,
    username: &str,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => prompt_password(true)?,
    };

    let session = state.chat.register(username, &password, &password).await?;
    state.save_session(&session).await?;

    if json {
        let result = serde_json::json!({
            "username": username,
            "session": session.identity(),
            "expires": session.value().expiry,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!(
            "  {} Registered and logged in as {}",
            style("ok").green(),
            style(username).cyan().bold(),
        );
        println!();
    }
    Ok(())
}

/// Log in as `username` and save the session.
pub async fn login(
    state: &AppState,
    username: &str,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => prompt_password(false)?,
    };

    let session = state.chat.login(username, &password).await?;
    state.save_session(&session).await?;

    if json {
        let result = serde_json::json!({
            "username": username,
            "session": session.identity(),
            "expires": session.value().expiry,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!(
            "  {} Logged in as {} (session expires {})",
            style("ok").green(),
            style(username).cyan().bold(),
            style(session.value().expiry.format("%Y-%m-%d %H:%M UTC")).dim(),
        );
        println!();
    }
    Ok(())
}

/// End the current session, if any.
pub async fn logout(state: &AppState, json: bool) -> Result<()> {
    let session = state.current_session().await.ok();
    if let Some(session) = session {
        state.chat.logout(session).await?;
    }
    state.clear_session().await?;

    if json {
        println!("{}", serde_json::json!({ "logged_out": true }));
    } else {
        println!();
        println!("  {} Logged out", style("ok").green());
        println!();
    }
    Ok(())
}

/// Show the current account and its channel memberships.
pub async fn whoami(state: &AppState, json: bool) -> Result<()> {
    let session = state.current_session().await?;
    let account = state.chat.session_account(&session).await?;
    let user = state.chat.user(account.value().user).await?;

    if json {
        let result = serde_json::json!({
            "username": account.value().username,
            "joined": user.value().joined,
            "session_expires": session.value().expiry,
            "channels": account.value().memberships,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} (member since {})",
        style(&account.value().username).cyan().bold(),
        user.value().joined.format("%Y-%m-%d"),
    );
    if account.value().memberships.is_empty() {
        println!("  {}", style("Not in any channel yet").dim());
    }
    for membership in &account.value().memberships {
        println!(
            "  {} {} {}",
            style("-").dim(),
            style(&membership.alias).cyan(),
            style(format!("({})", membership.role)).dim(),
        );
    }
    println!();
    Ok(())
}
