//! Error types shared across the scene, interaction and loading layers.

use crate::data_structures::scene_graph::NodeHandle;

/// Errors surfaced synchronously by scene, binding and driver calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneError {
    #[error("asset load failed: {0}")]
    AssetLoadFailed(#[from] LoadError),
    #[error("invalid binding: {0}")]
    InvalidBinding(String),
    #[error("render attempted without an active camera")]
    NoActiveCamera,
    #[error("render attempted after the surface was destroyed")]
    SurfaceUnavailable,
    #[error("node {0:?} is not part of this scene")]
    UnknownNode(NodeHandle),
    #[error("node {handle:?} is not a {expected}")]
    WrongNodeKind {
        handle: NodeHandle,
        expected: &'static str,
    },
    #[error("parenting {child:?} under {parent:?} would create a cycle")]
    ParentCycle { child: NodeHandle, parent: NodeHandle },
    #[error("invalid scene fragment: {0}")]
    InvalidFragment(String),
    #[error("render driver is not running")]
    NotRunning,
}

/// Why an asset load failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    NotFound,
    Network,
    Malformed,
    UnresolvedReference,
    Cancelled,
    Io,
}

/// Terminal failure of a pending load.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind:?} while loading '{reference}': {message}")]
pub struct LoadError {
    pub reference: String,
    pub kind: LoadErrorKind,
    pub message: String,
}

impl LoadError {
    pub fn new(kind: LoadErrorKind, reference: impl Into<String>, message: impl ToString) -> Self {
        Self {
            reference: reference.into(),
            kind,
            message: message.to_string(),
        }
    }

    pub fn not_found(reference: impl Into<String>) -> Self {
        Self::new(LoadErrorKind::NotFound, reference, "no such asset")
    }

    pub fn malformed(reference: impl Into<String>, message: impl ToString) -> Self {
        Self::new(LoadErrorKind::Malformed, reference, message)
    }

    pub fn unresolved(reference: impl Into<String>, message: impl ToString) -> Self {
        Self::new(LoadErrorKind::UnresolvedReference, reference, message)
    }

    pub fn cancelled(reference: impl Into<String>) -> Self {
        Self::new(LoadErrorKind::Cancelled, reference, "load was cancelled")
    }

    /// Maps an I/O failure, keeping "not found" distinguishable.
    pub fn from_io(reference: impl Into<String>, err: &std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => LoadErrorKind::NotFound,
            _ => LoadErrorKind::Io,
        };
        Self::new(kind, reference, err)
    }
}
