use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::delta::{Delta, Insert};
use crate::error::TreeError;
use crate::registry::{NodeRegistry, NodeRole, is_truthy};
use crate::tree::{NodeId, Tree};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentConfig {
    #[serde(default)]
    pub max_optimize_passes: usize,
}

impl DocumentConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_optimize_passes == 0 {
            self.max_optimize_passes = 100;
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeContext {
    pub passes: usize,
    pub breaks_restored: usize,
    pub merges: usize,
    pub splits: usize,
}

pub struct Document {
    tree: Tree,
    config: DocumentConfig,
}

impl Document {
    pub fn new(registry: NodeRegistry, config: DocumentConfig) -> Result<Self, TreeError> {
        let mut doc = Self {
            tree: Tree::new(registry),
            config: config.with_defaults(),
        };
        doc.optimize()?;
        Ok(doc)
    }

    pub fn standard() -> Self {
        Self::new(NodeRegistry::standard(), DocumentConfig::default())
            .expect("standard document must be valid")
    }

    pub fn from_delta(registry: NodeRegistry, delta: &Delta) -> Result<Self, TreeError> {
        let mut doc = Self::new(registry, DocumentConfig::default())?;
        doc.set_contents(delta)?;
        Ok(doc)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn blocks(&self) -> Result<Vec<NodeId>, TreeError> {
        self.tree.children(self.tree.root())
    }

    pub fn length(&self) -> Result<usize, TreeError> {
        self.tree.length(self.tree.root())
    }

    pub fn contents(&self) -> Result<Delta, TreeError> {
        let mut delta = Delta::new();
        for block in self.blocks()? {
            let variant = self.tree.variant_of(block)?;
            delta = delta.concat(variant.delta(&self.tree, block)?);
        }
        Ok(delta)
    }

    pub fn text(&self) -> Result<String, TreeError> {
        Ok(self
            .contents()?
            .ops()
            .iter()
            .filter_map(|op| op.insert.as_text())
            .collect())
    }

    pub fn set_contents(&mut self, delta: &Delta) -> Result<(), TreeError> {
        let root = self.tree.root();
        for block in self.blocks()? {
            self.tree.remove(block)?;
        }

        for line in delta.lines() {
            let registry = self.tree.registry();
            let (block_name, block_value) = line
                .attrs
                .iter()
                .find(|(name, value)| {
                    registry.spec(name).is_some_and(|s| s.role == NodeRole::Block)
                        && is_truthy(value)
                })
                .map(|(name, value)| (name.clone(), value.clone()))
                .unwrap_or_else(|| (registry.default_block().to_string(), Value::Bool(true)));
            let attributes: Vec<_> = line
                .attrs
                .iter()
                .filter(|(name, _)| {
                    registry
                        .spec(name)
                        .is_some_and(|s| s.role == NodeRole::BlockAttribute)
                })
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();

            let block = self.tree.create(&block_name, block_value)?;
            for (name, value) in &attributes {
                self.tree.set_block_attr(block, name, value)?;
            }
            self.tree.append_child(root, block)?;

            let variant = self.tree.variant_of(block)?;
            for op in line.delta.ops() {
                let start = self.tree.children_length(block)?;
                match &op.insert {
                    Insert::Text(text) => {
                        variant.insert_at(&mut self.tree, block, start, text, None)?;
                    }
                    Insert::Embed(embed) => {
                        let Some((name, value)) = embed.iter().next() else {
                            continue;
                        };
                        let registered = self
                            .tree
                            .registry()
                            .spec(name)
                            .is_some_and(|s| s.role == NodeRole::Embed);
                        if !registered {
                            tracing::trace!(name = name.as_str(), "dropping unregistered embed");
                            continue;
                        }
                        variant.insert_at(&mut self.tree, block, start, name, Some(value))?;
                    }
                }

                let inserted = self.tree.children_length(block)? - start;
                if inserted == 0 {
                    continue;
                }
                for (name, value) in op.attrs().into_iter().flatten() {
                    if self.tree.registry().is_inline_format(name) && is_truthy(value) {
                        variant.format_at(&mut self.tree, block, start, inserted, name, value)?;
                    }
                }
            }
        }

        self.optimize()?;
        Ok(())
    }

    pub fn format_text(
        &mut self,
        index: usize,
        length: usize,
        name: &str,
        value: &Value,
    ) -> Result<(), TreeError> {
        let root = self.tree.root();
        self.tree
            .for_each_at(root, index, length, |tree, block, offset, len| {
                let variant = tree.variant_of(block)?;
                variant.format_at(tree, block, offset, len, name, value)
            })?;
        self.optimize()?;
        Ok(())
    }

    /// Like [`Document::format_text`], with the range extended to the end of
    /// the last line it touches so block formats always reach a break.
    pub fn format_lines(
        &mut self,
        index: usize,
        length: usize,
        name: &str,
        value: &Value,
    ) -> Result<(), TreeError> {
        let last = index + length.saturating_sub(1);
        let Some(line_end) = self.line_breaks()?.into_iter().find(|&brk| brk >= last) else {
            return Ok(());
        };
        self.format_text(index, line_end + 1 - index, name, value)
    }

    pub fn line_breaks(&self) -> Result<Vec<usize>, TreeError> {
        let mut breaks = Vec::new();
        let mut offset = 0;
        for op in self.contents()?.ops() {
            match &op.insert {
                Insert::Text(text) => {
                    for c in text.chars() {
                        if c == '\n' {
                            breaks.push(offset);
                        }
                        offset += 1;
                    }
                }
                Insert::Embed(_) => offset += 1,
            }
        }
        Ok(breaks)
    }

    pub fn insert_text(&mut self, index: usize, text: &str) -> Result<(), TreeError> {
        self.insert(index, text, None)
    }

    pub fn insert_embed(
        &mut self,
        index: usize,
        name: &str,
        value: Value,
    ) -> Result<(), TreeError> {
        self.insert(index, name, Some(&value))
    }

    fn insert(
        &mut self,
        index: usize,
        value: &str,
        embed: Option<&Value>,
    ) -> Result<(), TreeError> {
        let root = self.tree.root();
        let (block, offset) = match self.tree.child_at(root, index, false)? {
            Some(found) => found,
            None => {
                let default = self.tree.registry().default_block().to_string();
                let block = self.tree.create(&default, Value::Bool(true))?;
                self.tree.append_child(root, block)?;
                (block, 0)
            }
        };
        let variant = self.tree.variant_of(block)?;
        variant.insert_at(&mut self.tree, block, offset, value, embed)?;
        self.optimize()?;
        Ok(())
    }

    pub fn optimize(&mut self) -> Result<OptimizeContext, TreeError> {
        let mut ctx = OptimizeContext::default();
        let root = self.tree.root();

        for _ in 0..self.config.max_optimize_passes {
            ctx.passes += 1;
            let before = self.tree.revision();

            if self.tree.first_child(root).is_none() {
                let default = self.tree.registry().default_block().to_string();
                let block = self.tree.create(&default, Value::Bool(true))?;
                self.tree.append_child(root, block)?;
            }

            for block in self.blocks()? {
                if !self.tree.contains(block) || !self.tree.is_block(block) {
                    continue;
                }
                let variant = self.tree.variant_of(block)?;
                variant.optimize(&mut self.tree, block, &mut ctx)?;
            }

            if self.tree.revision() == before {
                tracing::debug!(
                    passes = ctx.passes,
                    merges = ctx.merges,
                    splits = ctx.splits,
                    breaks_restored = ctx.breaks_restored,
                    "document optimized"
                );
                return Ok(ctx);
            }
        }

        Err(TreeError::OptimizeDidNotConverge(
            self.config.max_optimize_passes,
        ))
    }
}
