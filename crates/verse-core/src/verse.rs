//! The verse block: a run of lines styled and attributed as one block.
//!
//! Unlike [`LineBlock`](crate::block::LineBlock), a verse block stores its
//! line breaks physically in its text leaves. After `optimize` its content
//! always ends with exactly one trailing `\n`, and the rest of the document
//! still sees it line by line through [`VerseBlock::delta`].

use serde_json::Value;

use crate::block;
use crate::delta::{Attrs, Delta};
use crate::document::OptimizeContext;
use crate::error::TreeError;
use crate::registry::{BlockVariant, NodeSpec, Scope, is_truthy};
use crate::tree::{NodeId, NodeKind, Tree};

pub const VERSE_BLOCK_NAME: &str = "verse";

/// Indentation unit used when rendering verse lines.
pub const VERSE_TAB: &str = "  ";

pub const VERSE_CLASS: &str = "poem";

#[derive(Debug, Clone, Copy, Default)]
pub struct VerseBlock;

impl VerseBlock {
    /// The type value every verse block reports.
    pub fn type_value() -> Value {
        Value::Bool(true)
    }

    /// Forward: first break at or after `search`. Reverse: last break
    /// strictly before `search`.
    pub fn newline_index(
        &self,
        tree: &Tree,
        id: NodeId,
        search: usize,
        reverse: bool,
    ) -> Result<Option<usize>, TreeError> {
        let text = tree.text_content(id)?;
        let found = if reverse {
            text.chars()
                .take(search)
                .enumerate()
                .filter(|(_, c)| *c == '\n')
                .map(|(ix, _)| ix)
                .last()
        } else {
            text.chars()
                .enumerate()
                .skip(search)
                .find(|(_, c)| *c == '\n')
                .map(|(ix, _)| ix)
        };
        Ok(found)
    }
}

impl BlockVariant for VerseBlock {
    fn type_name(&self) -> &str {
        VERSE_BLOCK_NAME
    }

    fn spec(&self) -> NodeSpec {
        NodeSpec::block(VERSE_BLOCK_NAME, "blockquote")
    }

    fn create(&self, tree: &mut Tree, _value: Value) -> Result<NodeId, TreeError> {
        let id = tree.create_block(VERSE_BLOCK_NAME, Self::type_value())?;
        let render = tree.render_mut(id)?;
        render.set_attribute("spellcheck", "true");
        render.add_class(VERSE_CLASS);
        Ok(id)
    }

    fn formats(&self, tree: &Tree, id: NodeId) -> Result<Attrs, TreeError> {
        let mut formats = tree.block_attrs(id)?.clone();
        formats.insert(VERSE_BLOCK_NAME.to_string(), Self::type_value());
        Ok(formats)
    }

    fn delta(&self, tree: &Tree, id: NodeId) -> Result<Delta, TreeError> {
        let mut text = tree.text_content(id)?;
        if text.ends_with('\n') {
            text.pop();
        }
        let formats = self.formats(tree, id)?;
        Ok(text.split('\n').fold(Delta::new(), |delta, line| {
            delta.insert(line).insert_with("\n", formats.clone())
        }))
    }

    fn format(
        &self,
        tree: &mut Tree,
        id: NodeId,
        name: &str,
        value: &Value,
    ) -> Result<(), TreeError> {
        if name == VERSE_BLOCK_NAME && is_truthy(value) {
            return Ok(());
        }
        if tree.text_content(id)?.ends_with('\n') {
            if let Some(leaf) = tree.last_text_leaf(id)? {
                let len = tree.text_len(leaf)?;
                tree.delete_text(leaf, len - 1, 1)?;
            }
        }
        block::format(tree, id, name, value)
    }

    fn format_at(
        &self,
        tree: &mut Tree,
        id: NodeId,
        index: usize,
        length: usize,
        name: &str,
        value: &Value,
    ) -> Result<(), TreeError> {
        if length == 0 {
            return Ok(());
        }
        if tree.registry().query(name, Scope::Block).is_none()
            || (name == VERSE_BLOCK_NAME && *value == Self::type_value())
        {
            tracing::trace!(name, "verse format request does not apply");
            return Ok(());
        }

        let Some(next_newline) = self.newline_index(tree, id, index, false)? else {
            return Ok(());
        };
        if next_newline >= index + length {
            tracing::trace!(index, length, "range does not reach a line break");
            return Ok(());
        }
        let line_start = self
            .newline_index(tree, id, index, true)?
            .map_or(0, |ix| ix + 1);
        let isolate_len = next_newline - line_start + 1;

        let line = tree.isolate(id, line_start, isolate_len)?;
        let next = tree.next(line);
        self.format(tree, line, name, value)?;

        if let Some(next) = next {
            if tree.is_block_of(next, VERSE_BLOCK_NAME) {
                let remaining = (index + length).saturating_sub(line_start + isolate_len);
                self.format_at(tree, next, 0, remaining, name, value)?;
            }
        }
        Ok(())
    }

    fn insert_at(
        &self,
        tree: &mut Tree,
        id: NodeId,
        index: usize,
        value: &str,
        embed: Option<&Value>,
    ) -> Result<(), TreeError> {
        if embed.is_some() {
            tracing::trace!(value, "verse blocks do not take embeds");
            return Ok(());
        }
        match tree.text_leaf_at(id, index, true)? {
            Some((leaf, offset)) => tree.insert_text(leaf, offset, value),
            None => {
                let leaf = tree.create_text(value);
                tree.append_child(id, leaf)
            }
        }
    }

    fn length(&self, tree: &Tree, id: NodeId) -> Result<usize, TreeError> {
        let text = tree.text_content(id)?;
        let len = text.chars().count();
        Ok(if text.ends_with('\n') { len } else { len + 1 })
    }

    fn optimize(
        &self,
        tree: &mut Tree,
        id: NodeId,
        ctx: &mut OptimizeContext,
    ) -> Result<(), TreeError> {
        if !tree.text_content(id)?.ends_with('\n') {
            let brk = tree.create_text("\n");
            tree.append_child(id, brk)?;
            ctx.breaks_restored += 1;
        }
        block::optimize(tree, id, ctx)?;

        let Some(next) = tree.next(id) else {
            return Ok(());
        };
        if !tree.is_block_of(next, VERSE_BLOCK_NAME)
            || self.attribute_signature(tree, id)? != self.attribute_signature(tree, next)?
        {
            return Ok(());
        }
        self.optimize(tree, next, ctx)?;
        tree.move_children(next, id, None)?;
        tree.remove(next)?;
        ctx.merges += 1;
        tracing::debug!(into = ?id, merged = ?next, "merged adjacent verse blocks");
        Ok(())
    }

    fn replace(&self, tree: &mut Tree, id: NodeId, target: NodeId) -> Result<(), TreeError> {
        tree.replace_node(id, target)?;
        for node in tree.descendants(id)? {
            if !tree.contains(node) {
                continue;
            }
            if tree.is_embed(node) {
                tree.remove(node)?;
                continue;
            }
            match tree.kind(node)? {
                NodeKind::Text { .. } => {}
                NodeKind::Markup => tree.remove(node)?,
                _ => tree.unwrap(node)?,
            }
        }
        Ok(())
    }
}
