use std::fmt;

use crate::collection::Key;
use crate::controller::ControllerId;
use crate::view::ViewId;

/// A property value could not be converted into the field it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyError {
    pub expected: &'static str,
    pub found: &'static str,
}

impl PropertyError {
    pub fn new(expected: &'static str, found: &'static str) -> Self {
        Self { expected, found }
    }
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)
    }
}

impl std::error::Error for PropertyError {}

/// Errors surfaced while realizing, diffing or removing trees.
///
/// None of these are recovered from internally. The tree may be left
/// partially updated when one is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Two live nodes under the same owner carry the same `id`.
    DuplicateId { id: String },
    /// Two items of one collection resolve to the same key.
    DuplicateKey { key: Key },
    /// A node that already has a live counterpart was realized again.
    AlreadyRealized { node: &'static str },
    /// A node was asked for its live position before being realized.
    Unrealized { node: &'static str },
    /// A controller tried to remove itself while it is the root of its
    /// owner's retained tree.
    IllegalRemoval { controller: ControllerId },
    /// The node type declares no property of this name.
    UnknownProperty { node: &'static str, name: String },
    InvalidProperty {
        node: &'static str,
        name: String,
        source: PropertyError,
    },
    MissingView { id: ViewId },
    MissingController { id: ControllerId },
    /// No controller up the owner chain handles the named event handler.
    HandlerNotFound { name: String },
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::DuplicateId { id } => write!(f, "duplicate id `{id}`"),
            ReconcileError::DuplicateKey { key } => {
                write!(f, "duplicate key `{key}` in collection")
            }
            ReconcileError::AlreadyRealized { node } => {
                write!(f, "{node} node is already realized")
            }
            ReconcileError::Unrealized { node } => write!(f, "{node} node is not realized"),
            ReconcileError::IllegalRemoval { controller } => write!(
                f,
                "controller {controller:?} is the root of its owner and cannot be removed"
            ),
            ReconcileError::UnknownProperty { node, name } => {
                write!(f, "{node} has no property `{name}`")
            }
            ReconcileError::InvalidProperty { node, name, source } => {
                write!(f, "invalid value for {node}.{name}: {source}")
            }
            ReconcileError::MissingView { id } => write!(f, "view {id:?} missing"),
            ReconcileError::MissingController { id } => write!(f, "controller {id:?} missing"),
            ReconcileError::HandlerNotFound { name } => {
                write!(f, "no handler named `{name}` up the owner chain")
            }
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcileError::InvalidProperty { source, .. } => Some(source),
            _ => None,
        }
    }
}
