//! Channels and channel events.
//!
//! A channel is a named, append-mostly list of events. Clients follow a
//! channel by waiting for its next version; every post, edit, or deletion
//! of an event therefore commits a new channel version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::stored::{Identity, Stored};

/// Kind of a channel event.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (kind IN ('message', 'join'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A user wrote to the channel.
    Message,
    /// A user joined the channel.
    Join,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Message => write!(f, "message"),
            EventKind::Join => write!(f, "join"),
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "message" => Ok(EventKind::Message),
            "join" => Ok(EventKind::Join),
            other => Err(format!("invalid event kind: '{other}'")),
        }
    }
}

/// Something that happened in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub channel: Identity,
    pub time: DateTime<Utc>,
    /// Username of the author (or of the joining user).
    pub sender: String,
    pub kind: EventKind,
    /// Message text. Always `Some` for `EventKind::Message`.
    pub message: Option<String>,
}

impl Event {
    pub fn message(
        channel: Identity,
        time: DateTime<Utc>,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            time,
            sender: sender.into(),
            kind: EventKind::Message,
            message: Some(text.into()),
        }
    }

    pub fn join(channel: Identity, time: DateTime<Utc>, sender: impl Into<String>) -> Self {
        Self {
            channel,
            time,
            sender: sender.into(),
            kind: EventKind::Join,
            message: None,
        }
    }

    /// The same event with different message text.
    pub fn with_message(&self, text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..self.clone()
        }
    }
}

/// A chat channel with its events in posting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub events: Vec<Stored<Event>>,
}

impl Channel {
    /// An empty channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Vec::new(),
        }
    }

    /// A new channel value with `event` appended. An event already in the
    /// channel is replaced in place, so reapplying a post is a no-op.
    pub fn post_event(&self, event: Stored<Event>) -> Self {
        if self.event(event.identity()).is_some() {
            return self.replace_event(event);
        }
        let mut events = self.events.clone();
        events.push(event);
        Self {
            name: self.name.clone(),
            events,
        }
    }

    /// A new channel value with the stored event of the same identity
    /// replaced by `event`. Unknown events are ignored.
    pub fn replace_event(&self, event: Stored<Event>) -> Self {
        let events = self
            .events
            .iter()
            .map(|e| {
                if e.identity() == event.identity() {
                    event.clone()
                } else {
                    e.clone()
                }
            })
            .collect();
        Self {
            name: self.name.clone(),
            events,
        }
    }

    /// A new channel value without the event `identity`.
    pub fn remove_event(&self, identity: Identity) -> Self {
        Self {
            name: self.name.clone(),
            events: self
                .events
                .iter()
                .filter(|e| e.identity() != identity)
                .cloned()
                .collect(),
        }
    }

    pub fn event(&self, identity: Identity) -> Option<&Stored<Event>> {
        self.events.iter().find(|e| e.identity() == identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(channel: Identity, text: &str) -> Stored<Event> {
        Stored::new(Event::message(channel, Utc::now(), "alice", text))
    }

    #[test]
    fn test_post_event_appends_in_order() {
        let id = Identity::new();
        let channel = Channel::new("general")
            .post_event(message(id, "one"))
            .post_event(message(id, "two"));
        let texts: Vec<_> = channel
            .events
            .iter()
            .map(|e| e.value().message.clone().unwrap())
            .collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn test_replace_and_remove_event() {
        let id = Identity::new();
        let first = message(id, "typo");
        let second = message(id, "other");
        let channel = Channel::new("general")
            .post_event(first.clone())
            .post_event(second.clone());

        let edited = first.new_version(first.value().with_message("fixed"));
        let channel = channel.replace_event(edited.clone());
        assert_eq!(channel.event(first.identity()), Some(&edited));

        let channel = channel.remove_event(first.identity());
        assert_eq!(channel.events, vec![second]);
    }

    #[test]
    fn test_reposting_an_event_does_not_duplicate_it() {
        let id = Identity::new();
        let first = message(id, "one");
        let second = message(id, "two");
        let channel = Channel::new("general")
            .post_event(first.clone())
            .post_event(second.clone());

        let reposted = channel.post_event(first.clone());
        assert_eq!(reposted, channel);
        assert_eq!(reposted.events, vec![first, second]);
    }

    #[test]
    fn test_join_event_has_no_message() {
        let event = Event::join(Identity::new(), Utc::now(), "bob");
        assert_eq!(event.kind, EventKind::Join);
        assert!(event.message.is_none());
    }

    #[test]
    fn test_event_kind_roundtrip() {
        for kind in [EventKind::Message, EventKind::Join] {
            let parsed: EventKind = kind.to_string().parse().unwrap();
            assert_eq!(kind, parsed);
        }
        assert!("leave".parse::<EventKind>().is_err());
    }
}
