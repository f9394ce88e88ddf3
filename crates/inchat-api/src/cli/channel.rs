//! Channel CLI subcommands.
//!
//! Channels may be named by name or by id. `watch` follows a channel by
//! long-polling for its next version and prints what changed.
//!
//! Waiters live in the process that created them, so a write made by another
//! `inchat` process cannot wake a `watch`; it is picked up by the re-check at
//! the end of each long-poll (`wait_timeout_secs`). `chat` reads messages
//! from stdin and posts them through the same service that follows the
//! channel, so its own posts show up immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use inchat_types::account::Role;
use inchat_types::channel::{Channel, Event, EventKind};
use inchat_types::stored::{Identity, Stored};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::state::{AppState, ConcreteChat};

/// Channel subcommands.
#[derive(Subcommand)]
pub enum ChannelCommand {
    /// Create a channel; you become its owner.
    Create { name: String },

    /// Join a channel as a participant.
    Join {
        /// Channel name or id.
        channel: String,
    },

    /// List all channels.
    #[command(alias = "ls")]
    List,

    /// Show a channel's events.
    Show {
        /// Channel name or id.
        channel: String,
    },

    /// Post a message.
    Post {
        /// Channel name or id.
        channel: String,
        message: String,
    },

    /// Replace the text of a message.
    Edit {
        /// Channel name or id.
        channel: String,
        /// Event id.
        event: Identity,
        message: String,
    },

    /// Delete an event.
    #[command(name = "delete-event")]
    DeleteEvent {
        /// Channel name or id.
        channel: String,
        /// Event id.
        event: Identity,
    },

    /// Give a member a new role (owners only).
    Role {
        /// Channel name or id.
        channel: String,
        username: String,
        /// banned, observer, participant, moderator or owner.
        role: Role,
    },

    /// Follow a channel and print changes as they happen (Ctrl+C to stop).
    ///
    /// Writes from other processes show up within one poll interval.
    Watch {
        /// Channel name or id.
        channel: String,

        /// Poll interval in seconds (defaults to `wait_timeout_secs`).
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Follow a channel and post each line typed on stdin (`/quit` or
    /// Ctrl+C to leave).
    Chat {
        /// Channel name or id.
        channel: String,
    },
}

/// Handle a channel subcommand.
pub async fn handle_channel_command(cmd: ChannelCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        ChannelCommand::Create { name } => create(state, &name, json).await,
        ChannelCommand::Join { channel } => join(state, &channel, json).await,
        ChannelCommand::List => list(state, json).await,
        ChannelCommand::Show { channel } => show(state, &channel, json).await,
        ChannelCommand::Post { channel, message } => post(state, &channel, &message, json).await,
        ChannelCommand::Edit {
            channel,
            event,
            message,
        } => edit(state, &channel, event, &message, json).await,
        ChannelCommand::DeleteEvent { channel, event } => {
            delete_event(state, &channel, event, json).await
        }
        ChannelCommand::Role {
            channel,
            username,
            role,
        } => set_role(state, &channel, &username, role, json).await,
        ChannelCommand::Watch { channel, timeout } => watch(state, &channel, timeout, json).await,
        ChannelCommand::Chat { channel } => chat(state, &channel, json).await,
    }
}

/// Resolve a channel argument: an id if it parses as one, else a name.
async fn resolve_channel(state: &AppState, channel: &str) -> Result<Stored<Channel>> {
    if let Ok(id) = channel.parse::<Identity>() {
        if let Ok(found) = state.chat.get_channel(id).await {
            return Ok(found);
        }
    }
    state
        .chat
        .find_channel(channel)
        .await
        .with_context(|| format!("Channel '{channel}' not found"))
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct EventView<'a> {
    id: Identity,
    time: String,
    sender: &'a str,
    kind: EventKind,
    message: Option<&'a str>,
}

impl<'a> EventView<'a> {
    fn new(event: &'a Stored<Event>) -> Self {
        let value = event.value();
        Self {
            id: event.identity(),
            time: value.time.to_rfc3339(),
            sender: &value.sender,
            kind: value.kind,
            message: value.message.as_deref(),
        }
    }
}

fn describe_event(event: &Event) -> String {
    match event.kind {
        EventKind::Join => format!("{} joined", event.sender),
        EventKind::Message => format!(
            "{}: {}",
            event.sender,
            event.message.as_deref().unwrap_or_default()
        ),
    }
}

fn print_channel_json(channel: &Stored<Channel>) -> Result<()> {
    let events: Vec<EventView<'_>> = channel.value().events.iter().map(EventView::new).collect();
    let result = serde_json::json!({
        "id": channel.identity(),
        "version": channel.version(),
        "name": channel.value().name,
        "events": events,
    });
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn print_ok(message: String) {
    println!();
    println!("  {} {}", style("ok").green(), message);
    println!();
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn create(state: &AppState, name: &str, json: bool) -> Result<()> {
    let account = state.current_account().await?;
    let channel = state.chat.create_channel(account, name).await?;
    if json {
        print_channel_json(&channel)
    } else {
        print_ok(format!(
            "Created channel {} ({})",
            style(name).cyan().bold(),
            style(channel.identity()).dim()
        ));
        Ok(())
    }
}

async fn join(state: &AppState, channel: &str, json: bool) -> Result<()> {
    let account = state.current_account().await?;
    let target = resolve_channel(state, channel).await?;
    let joined = state.chat.join_channel(account, target.identity()).await?;
    if json {
        print_channel_json(&joined)
    } else {
        print_ok(format!("Joined {}", style(&joined.value().name).cyan().bold()));
        Ok(())
    }
}

async fn list(state: &AppState, json: bool) -> Result<()> {
    let channels = state.chat.list_channels().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&channels)?);
        return Ok(());
    }

    if channels.is_empty() {
        println!();
        println!(
            "  {} No channels yet. Create one with: inchat channel create <name>",
            style("i").blue().bold()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Id").fg(Color::Cyan),
        ]);
    for channel in &channels {
        table.add_row(vec![
            Cell::new(&channel.name),
            Cell::new(channel.identity.to_string()),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn show(state: &AppState, channel: &str, json: bool) -> Result<()> {
    let channel = resolve_channel(state, channel).await?;
    if json {
        return print_channel_json(&channel);
    }

    println!();
    println!("  {}", style(&channel.value().name).cyan().bold());
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Time").fg(Color::Cyan),
            Cell::new("Event").fg(Color::Cyan),
            Cell::new("Id").fg(Color::Cyan),
        ]);
    for event in &channel.value().events {
        let value = event.value();
        table.add_row(vec![
            Cell::new(value.time.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(describe_event(value)),
            Cell::new(event.identity().to_string()).fg(Color::DarkGrey),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn post(state: &AppState, channel: &str, message: &str, json: bool) -> Result<()> {
    let account = state.current_account().await?;
    let target = resolve_channel(state, channel).await?;
    let updated = state
        .chat
        .post_message(account, target.identity(), message)
        .await?;
    if json {
        print_channel_json(&updated)
    } else {
        print_ok(format!("Posted to {}", style(&updated.value().name).cyan()));
        Ok(())
    }
}

async fn edit(
    state: &AppState,
    channel: &str,
    event: Identity,
    message: &str,
    json: bool,
) -> Result<()> {
    let account = state.current_account().await?;
    let target = resolve_channel(state, channel).await?;
    let updated = state
        .chat
        .edit_message(account, target.identity(), event, message)
        .await?;
    if json {
        print_channel_json(&updated)
    } else {
        print_ok(format!("Edited message {}", style(event).dim()));
        Ok(())
    }
}

async fn delete_event(state: &AppState, channel: &str, event: Identity, json: bool) -> Result<()> {
    let account = state.current_account().await?;
    let target = resolve_channel(state, channel).await?;
    let updated = state
        .chat
        .delete_event(account, target.identity(), event)
        .await?;
    if json {
        print_channel_json(&updated)
    } else {
        print_ok(format!("Deleted event {}", style(event).dim()));
        Ok(())
    }
}

async fn set_role(
    state: &AppState,
    channel: &str,
    username: &str,
    role: Role,
    json: bool,
) -> Result<()> {
    let account = state.current_account().await?;
    let target = resolve_channel(state, channel).await?;
    state
        .chat
        .set_role(account, target.identity(), username, role)
        .await?;
    if json {
        let result = serde_json::json!({
            "channel": target.value().name,
            "username": username,
            "role": role,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_ok(format!(
            "{} is now {} in {}",
            style(username).cyan(),
            style(role).bold(),
            style(&target.value().name).cyan()
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// watch
// ---------------------------------------------------------------------------

/// One difference between two versions of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChannelChange<'a> {
    Added(&'a Stored<Event>),
    Edited(&'a Stored<Event>),
    Removed(Identity),
}

/// What happened to the event list between `old` and `new`.
fn diff_events<'a>(old: &Channel, new: &'a Channel) -> Vec<ChannelChange<'a>> {
    let before: HashMap<Identity, _> = old
        .events
        .iter()
        .map(|e| (e.identity(), e.version()))
        .collect();

    let mut changes: Vec<ChannelChange<'a>> = new
        .events
        .iter()
        .filter_map(|event| match before.get(&event.identity()) {
            None => Some(ChannelChange::Added(event)),
            Some(version) if *version != event.version() => Some(ChannelChange::Edited(event)),
            Some(_) => None,
        })
        .collect();

    for event in &old.events {
        if new.event(event.identity()).is_none() {
            changes.push(ChannelChange::Removed(event.identity()));
        }
    }
    changes
}

fn print_change(change: &ChannelChange<'_>, json: bool) -> Result<()> {
    if json {
        let line = match change {
            ChannelChange::Added(event) => {
                serde_json::json!({ "change": "added", "event": EventView::new(event) })
            }
            ChannelChange::Edited(event) => {
                serde_json::json!({ "change": "edited", "event": EventView::new(event) })
            }
            ChannelChange::Removed(id) => serde_json::json!({ "change": "removed", "id": id }),
        };
        println!("{}", serde_json::to_string(&line)?);
        return Ok(());
    }

    match change {
        ChannelChange::Added(event) => println!(
            "  {} {}",
            style(event.value().time.format("%H:%M:%S")).dim(),
            describe_event(event.value())
        ),
        ChannelChange::Edited(event) => println!(
            "  {} {} {}",
            style(event.value().time.format("%H:%M:%S")).dim(),
            describe_event(event.value()),
            style("(edited)").dim()
        ),
        ChannelChange::Removed(id) => {
            println!("  {}", style(format!("event {id} was deleted")).dim())
        }
    }
    Ok(())
}

/// Print changes to a channel until it is deleted or the caller stops
/// polling the returned future.
async fn follow_channel(
    chat: &ConcreteChat,
    mut current: Stored<Channel>,
    timeout: Duration,
    json: bool,
) -> Result<()> {
    loop {
        let next = chat
            .wait_next_channel_version(current.identity(), current.version(), timeout)
            .await?;
        // A timeout just means nothing happened; poll again.
        let Some(next) = next else {
            tracing::debug!(channel = %current.identity(), "no change within timeout");
            continue;
        };
        for change in diff_events(current.value(), next.value()) {
            print_change(&change, json)?;
        }
        current = next;
    }
}

fn print_follow_header(verb: &str, channel: &Stored<Channel>, hint: &str) -> Result<()> {
    println!();
    println!(
        "  {verb} {} {}",
        style(&channel.value().name).cyan().bold(),
        style(hint).dim()
    );
    println!();
    for event in &channel.value().events {
        print_change(&ChannelChange::Added(event), false)?;
    }
    Ok(())
}

async fn watch(state: &AppState, channel: &str, timeout: Option<u64>, json: bool) -> Result<()> {
    let current = resolve_channel(state, channel).await?;
    let timeout = timeout
        .map(Duration::from_secs)
        .unwrap_or(state.chat.settings().wait_timeout);

    if !json {
        print_follow_header("Watching", &current, "(Ctrl+C to stop)")?;
    }

    tokio::select! {
        result = follow_channel(&state.chat, current, timeout, json) => result,
        _ = tokio::signal::ctrl_c() => Ok(()),
    }
}

/// One line of `chat` input.
#[derive(Debug, PartialEq, Eq)]
enum ChatInput<'a> {
    Post(&'a str),
    Quit,
    Skip,
}

fn parse_chat_line(line: &str) -> ChatInput<'_> {
    match line.trim() {
        "" => ChatInput::Skip,
        "/quit" | "/exit" => ChatInput::Quit,
        text => ChatInput::Post(text),
    }
}

async fn chat(state: &AppState, channel: &str, json: bool) -> Result<()> {
    let account = state.current_account().await?;
    let current = resolve_channel(state, channel).await?;
    let channel_id = current.identity();
    let timeout = state.chat.settings().wait_timeout;

    if !json {
        print_follow_header("Chatting in", &current, "(/quit or Ctrl+C to leave)")?;
    }

    let follower = {
        let chat = Arc::clone(&state.chat);
        tokio::spawn(async move { follow_channel(&chat, current, timeout, json).await })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let result = loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => break Ok(()),
        };
        let Some(line) = line else {
            break Ok(());
        };
        match parse_chat_line(&line) {
            ChatInput::Skip => continue,
            ChatInput::Quit => break Ok(()),
            ChatInput::Post(text) => {
                if let Err(e) = state.chat.post_message(account, channel_id, text).await {
                    eprintln!("  {} {e}", style("error").red());
                }
            }
        }
        if follower.is_finished() {
            break Ok(());
        }
    };

    follower.abort();
    match follower.await {
        Ok(Err(e)) => Err(e),
        _ => result,
    }
}
