use crate::tree::NodeId;

/// Structural failures raised by the tree host.
///
/// Requests that merely do not apply (zero-length ranges, formats already in
/// place, embeds offered to a text-only block) are not errors; they return
/// `Ok(())` without touching the tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    #[error("node {0:?} has been removed from the tree")]
    DeadNode(NodeId),
    #[error("no node type registered under `{0}`")]
    UnknownType(String),
    #[error("node {0:?} cannot hold children")]
    NotAContainer(NodeId),
    #[error("node {0:?} is not a text leaf")]
    NotText(NodeId),
    #[error("node {0:?} is not a block")]
    NotABlock(NodeId),
    #[error("node {0:?} has no parent")]
    Detached(NodeId),
    #[error("offset {offset} out of bounds for node {node:?} of length {len}")]
    OutOfBounds {
        node: NodeId,
        offset: usize,
        len: usize,
    },
    #[error("optimize did not converge after {0} passes")]
    OptimizeDidNotConverge(usize),
    #[error("duplicate node type `{0}` in registry")]
    DuplicateType(String),
}
