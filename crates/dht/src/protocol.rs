//! Messages exchanged between ring nodes.
//!
//! Transports only move [`Envelope`]s; they never look inside. Every envelope
//! carries the sender's logical clock value.

use crate::pointers::Membership;
use corelib::{Id, NodeInfo, TableRep};
use serde::{Deserialize, Serialize};

/// A message stamped with the sender's logical clock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub time: u64,
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn new(time: u64, body: T) -> Self {
        Self { time, body }
    }
}

/// Operations a node serves to its peers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Liveness probe and diagnostics.
    Info,
    Pred,
    Succ,
    /// Closest preceding finger for `id`.
    Finger { id: Id },
    /// Successor of `id`, resolved by the callee.
    Find { id: Id },
    /// Candidate predecessor introducing itself.
    Notify(TableRep),
    Get { key: String },
    Add { key: String, val: String },
    Delete { key: String, val: String },
}

impl Request {
    /// Short operation name used in logs and failure reports.
    pub fn op(&self) -> &'static str {
        match self {
            Request::Info => "info",
            Request::Pred => "pred",
            Request::Succ => "succ",
            Request::Finger { .. } => "finger",
            Request::Find { .. } => "find",
            Request::Notify(_) => "notify",
            Request::Get { .. } => "get",
            Request::Add { .. } => "add",
            Request::Delete { .. } => "delete",
        }
    }
}

/// Outcome class of a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ok,
    /// Only legal as the answer to `Notify`: the candidate was not accepted.
    NotModified,
    /// The key of a `Get`/`Add`/`Delete` is outside the callee's range.
    NotOwner,
    BadRequest(String),
    Internal(String),
}

impl Status {
    /// True for the failure range.
    pub fn is_failure(&self) -> bool {
        matches!(self, Status::NotOwner | Status::BadRequest(_) | Status::Internal(_))
    }
}

/// Payload of a response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Empty,
    Node(NodeInfo),
    MaybeNode(Option<NodeInfo>),
    Table(TableRep),
    Values(Vec<String>),
    Info(NodeSnapshot),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub reply: Reply,
}

impl Response {
    pub fn ok(reply: Reply) -> Self {
        Self {
            status: Status::Ok,
            reply,
        }
    }

    pub fn not_modified() -> Self {
        Self {
            status: Status::NotModified,
            reply: Reply::Empty,
        }
    }

    pub fn not_owner() -> Self {
        Self {
            status: Status::NotOwner,
            reply: Reply::Empty,
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self {
            status: Status::BadRequest(reason.into()),
            reply: Reply::Empty,
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Internal(reason.into()),
            reply: Reply::Empty,
        }
    }
}

/// Point-in-time view of a node, served by `Info`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub node: NodeInfo,
    pub predecessor: Option<NodeInfo>,
    pub successor: NodeInfo,
    pub fingers: Vec<NodeInfo>,
    pub bits: u8,
    pub clock: u64,
    pub keys: usize,
    pub membership: Membership,
}
