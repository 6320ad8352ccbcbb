//! # Messages
//!
//! Every message in the space is an [`Envelope`] around a [`Payload`]. The
//! payload is a closed, tagged union; its [`MessageKind`] is the key the
//! dispatch loop uses to pick a handler.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::ActorRef;

/// Message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "payload_type", content = "payload")]
pub enum Payload {
    Ping { payload: String },
    Pong { payload: String },
    /// Number of pings a requestor should send.
    Count(i64),
    /// Free text; starts an echo run.
    Text(String),
    /// Completion token.
    Done,
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Ping { .. } => MessageKind::Ping,
            Payload::Pong { .. } => MessageKind::Pong,
            Payload::Count(_) => MessageKind::Count,
            Payload::Text(_) => MessageKind::Text,
            Payload::Done => MessageKind::Done,
        }
    }

    pub fn ping(payload: impl Into<String>) -> Self {
        Payload::Ping {
            payload: payload.into(),
        }
    }

    pub fn pong(payload: impl Into<String>) -> Self {
        Payload::Pong {
            payload: payload.into(),
        }
    }
}

/// Discriminant of [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Ping,
    Pong,
    Count,
    Text,
    Done,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Ping => "Ping",
            MessageKind::Pong => "Pong",
            MessageKind::Count => "Count",
            MessageKind::Text => "Text",
            MessageKind::Done => "Done",
        };
        f.write_str(name)
    }
}

/// A payload in flight, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub sender: Option<ActorRef>,
    pub dest: ActorRef,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Envelope {
    pub fn new(dest: ActorRef, payload: Payload, sender: Option<ActorRef>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            dest,
            payload,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}
