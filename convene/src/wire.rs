//! Frames exchanged between nodes and their byte encoding.
//!
//! A frame is serialized as JSON and preceded by its length as a 4-byte
//! big-endian integer.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

use convene_api::{ActorRef, Capabilities, Envelope, NodeAddress, NodeAnnouncement, RequirementSet};

/// Upper bound for one encoded frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const PREFIX_LEN: usize = 4;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("Frame encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Frame of {len} bytes exceeds the limit of {max} bytes", max = MAX_FRAME_LEN)]
    TooLarge { len: usize },
    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("Frame read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One unit of node-to-node traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub from: NodeAddress,
    pub body: FrameBody,
}

impl Frame {
    pub fn new(from: NodeAddress, body: FrameBody) -> Self {
        Self { from, body }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FrameBody {
    /// A node asks to enter the convention.
    Join { announcement: NodeAnnouncement },
    /// Leader's answer to `Join`: itself plus every other current member.
    JoinAck {
        leader: NodeAnnouncement,
        members: Vec<NodeAnnouncement>,
    },
    MemberJoined { announcement: NodeAnnouncement },
    MemberLeft { address: NodeAddress },
    /// Remote instantiation request.
    Spawn {
        request_id: Uuid,
        actor_type: String,
        requirements: RequirementSet,
    },
    Spawned {
        request_id: Uuid,
        outcome: SpawnOutcome,
    },
    Deliver { envelope: Envelope },
    /// Stops a local actor of the receiving node.
    StopActor { actor: ActorRef },
}

impl FrameBody {
    pub fn name(&self) -> &'static str {
        match self {
            FrameBody::Join { .. } => "Join",
            FrameBody::JoinAck { .. } => "JoinAck",
            FrameBody::MemberJoined { .. } => "MemberJoined",
            FrameBody::MemberLeft { .. } => "MemberLeft",
            FrameBody::Spawn { .. } => "Spawn",
            FrameBody::Spawned { .. } => "Spawned",
            FrameBody::Deliver { .. } => "Deliver",
            FrameBody::StopActor { .. } => "StopActor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnOutcome {
    Created(ActorRef),
    /// The host does not satisfy the requirements; carries what it actually
    /// advertises so the requester can correct its registry.
    Unsatisfied(Capabilities),
    Rejected(String),
}

pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, WireError> {
    let body = serde_json::to_vec(frame)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(WireError::TooLarge { len: body.len() });
    }
    let mut bytes = Vec::with_capacity(PREFIX_LEN + body.len());
    bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Decodes one complete length-prefixed frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, WireError> {
    if bytes.len() < PREFIX_LEN {
        return Err(WireError::Truncated {
            expected: PREFIX_LEN,
            actual: bytes.len(),
        });
    }
    let (prefix, body) = bytes.split_at(PREFIX_LEN);
    let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(WireError::TooLarge { len });
    }
    if body.len() != len {
        return Err(WireError::Truncated {
            expected: len,
            actual: body.len(),
        });
    }
    Ok(serde_json::from_slice(body)?)
}

/// Reads the next frame from a stream. `Ok(None)` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(WireError::TooLarge { len });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}
