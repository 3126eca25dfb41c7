//! Generic block semantics shared by every block variant, and the plain
//! single-line block built from them.

use serde_json::Value;

use crate::delta::{Attrs, Delta};
use crate::document::OptimizeContext;
use crate::error::TreeError;
use crate::registry::{BlockVariant, NodeRole, NodeSpec, Scope, is_truthy};
use crate::tree::{NodeId, NodeKind, Tree};

/// A block holding exactly one line. Its break is implicit, so the block is
/// one longer than its content.
#[derive(Debug, Clone)]
pub struct LineBlock {
    name: String,
    tag: String,
}

impl LineBlock {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }
}

impl BlockVariant for LineBlock {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> NodeSpec {
        NodeSpec::block(&self.name, &self.tag)
    }

    fn optimize(
        &self,
        tree: &mut Tree,
        id: NodeId,
        ctx: &mut OptimizeContext,
    ) -> Result<(), TreeError> {
        optimize(tree, id, ctx)?;
        split_lines(tree, id, ctx)
    }
}

/// Block attributes plus the type entry, which the default block omits.
pub fn formats(tree: &Tree, id: NodeId) -> Result<Attrs, TreeError> {
    let NodeKind::Block { name, value, attrs } = tree.kind(id)? else {
        return Err(TreeError::NotABlock(id));
    };
    let mut formats = attrs.clone();
    if name != tree.registry().default_block() {
        formats.insert(name.clone(), value.clone());
    }
    Ok(formats)
}

/// Leaf runs with their inline formats, then the line break carrying the
/// block's formats.
pub fn delta(tree: &Tree, id: NodeId, block_formats: Attrs) -> Result<Delta, TreeError> {
    let mut delta = Delta::new();
    for node in tree.descendants(id)? {
        match tree.kind(node)? {
            NodeKind::Text { text } => {
                let inline = tree.inline_formats(node, id)?;
                delta = delta.insert_with(text.clone(), inline);
            }
            NodeKind::Embed { name, value } => {
                let inline = tree.inline_formats(node, id)?;
                let embed = Attrs::from([(name.clone(), value.clone())]);
                delta = delta.insert_embed(embed, Some(inline));
            }
            _ => {}
        }
    }
    Ok(delta.insert_with("\n", block_formats))
}

/// Generic block format: attributes are set in place, type changes replace
/// the node.
pub fn format(tree: &mut Tree, id: NodeId, name: &str, value: &Value) -> Result<(), TreeError> {
    let Some(role) = tree.registry().query(name, Scope::Block).map(|spec| spec.role) else {
        tracing::trace!(name, "not a block format, ignoring");
        return Ok(());
    };
    if role == NodeRole::BlockAttribute {
        return tree.set_block_attr(id, name, value);
    }

    let NodeKind::Block {
        name: own,
        value: own_value,
        ..
    } = tree.kind(id)?
    else {
        return Err(TreeError::NotABlock(id));
    };
    let same_type = own == name;
    let same_value = own_value == value;

    if same_type && !is_truthy(value) {
        let default = tree.registry().default_block().to_string();
        if name != default {
            tree.replace_with(id, &default, Value::Bool(true))?;
        }
    } else if is_truthy(value) && (!same_type || !same_value) {
        tree.replace_with(id, name, value.clone())?;
    }
    Ok(())
}

/// Generic structural cleanup of a block's children.
pub fn optimize(tree: &mut Tree, id: NodeId, _ctx: &mut OptimizeContext) -> Result<(), TreeError> {
    tree.optimize_children(id)
}

/// A single-line block whose content holds physical breaks is split into
/// one block per line, each keeping the type and attributes of the first.
fn split_lines(tree: &mut Tree, id: NodeId, ctx: &mut OptimizeContext) -> Result<(), TreeError> {
    let mut current = id;
    loop {
        let text = tree.text_content(current)?;
        let Some(ix) = text.chars().position(|c| c == '\n') else {
            return Ok(());
        };
        let Some(tail) = tree.split(current, ix + 1, false)? else {
            return Ok(());
        };
        tree.delete_at(current, ix, 1)?;
        ctx.splits += 1;
        tracing::debug!(block = ?current, tail = ?tail, "split line block at break");
        current = tail;
    }
}
