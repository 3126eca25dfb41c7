use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::{self, LineBlock};
use crate::delta::{Attrs, Delta};
use crate::document::OptimizeContext;
use crate::error::TreeError;
use crate::tree::{NodeId, Tree};
use crate::verse::VerseBlock;

pub const DEFAULT_BLOCK: &str = "paragraph";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Block,
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Block,
    BlockAttribute,
    Inline,
    Embed,
}

impl NodeRole {
    pub fn scope(self) -> Scope {
        match self {
            NodeRole::Block | NodeRole::BlockAttribute => Scope::Block,
            NodeRole::Inline | NodeRole::Embed => Scope::Inline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub role: NodeRole,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl NodeSpec {
    fn new(name: impl Into<String>, role: NodeRole, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            tag: tag.into(),
            class: None,
        }
    }

    pub fn block(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::new(name, NodeRole::Block, tag)
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Self::new(name, NodeRole::BlockAttribute, "")
    }

    pub fn inline(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::new(name, NodeRole::Inline, tag)
    }

    pub fn embed(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::new(name, NodeRole::Embed, tag)
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }
}

pub trait BlockVariant: Send + Sync {
    fn type_name(&self) -> &str;

    fn spec(&self) -> NodeSpec;

    fn create(&self, tree: &mut Tree, value: Value) -> Result<NodeId, TreeError> {
        tree.create_block(self.type_name(), value)
    }

    fn formats(&self, tree: &Tree, id: NodeId) -> Result<Attrs, TreeError> {
        block::formats(tree, id)
    }

    fn attribute_signature(&self, tree: &Tree, id: NodeId) -> Result<Attrs, TreeError> {
        self.formats(tree, id)
    }

    fn delta(&self, tree: &Tree, id: NodeId) -> Result<Delta, TreeError> {
        block::delta(tree, id, self.formats(tree, id)?)
    }

    fn format(
        &self,
        tree: &mut Tree,
        id: NodeId,
        name: &str,
        value: &Value,
    ) -> Result<(), TreeError> {
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
        if tree.registry().query(name, Scope::Block).is_some() {
            if index + length >= self.length(tree, id)? {
                self.format(tree, id, name, value)?;
            }
            return Ok(());
        }
        if tree.registry().is_inline_format(name) {
            return tree.format_inline_at(id, index, length, name, value);
        }
        tracing::trace!(name, "format is not registered, ignoring");
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
        tree.insert_at(id, index, value, embed)
    }

    fn length(&self, tree: &Tree, id: NodeId) -> Result<usize, TreeError> {
        Ok(tree.children_length(id)? + 1)
    }

    fn optimize(
        &self,
        tree: &mut Tree,
        id: NodeId,
        ctx: &mut OptimizeContext,
    ) -> Result<(), TreeError> {
        block::optimize(tree, id, ctx)
    }

    fn replace(&self, tree: &mut Tree, id: NodeId, target: NodeId) -> Result<(), TreeError> {
        tree.replace_node(id, target)
    }
}

#[derive(Clone)]
pub struct NodeRegistry {
    specs: HashMap<String, NodeSpec>,
    variants: HashMap<String, Arc<dyn BlockVariant>>,
    default_block: String,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self {
            specs: HashMap::new(),
            variants: HashMap::new(),
            default_block: DEFAULT_BLOCK.to_string(),
        }
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.specs.keys().collect();
        names.sort();
        f.debug_struct("NodeRegistry")
            .field("types", &names)
            .field("default_block", &self.default_block)
            .finish()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        Self::try_standard().expect("standard registry must be valid")
    }

    fn try_standard() -> Result<Self, TreeError> {
        let mut registry = Self::new();
        registry.register_block(Arc::new(LineBlock::new(DEFAULT_BLOCK, "p")))?;
        registry.register_block(Arc::new(LineBlock::new("header", "h1")))?;
        registry.register_block(Arc::new(LineBlock::new("blockquote", "blockquote")))?;
        registry.register_block(Arc::new(VerseBlock))?;
        registry.register(NodeSpec::attribute("align"))?;
        registry.register(NodeSpec::inline("bold", "strong"))?;
        registry.register(NodeSpec::inline("italic", "em"))?;
        registry.register(NodeSpec::embed("image", "img"))?;
        Ok(registry)
    }

    pub fn register(&mut self, spec: NodeSpec) -> Result<(), TreeError> {
        if self.specs.contains_key(&spec.name) {
            return Err(TreeError::DuplicateType(spec.name));
        }
        self.specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn register_block(&mut self, variant: Arc<dyn BlockVariant>) -> Result<(), TreeError> {
        let spec = variant.spec();
        let name = spec.name.clone();
        self.register(spec)?;
        self.variants.insert(name, variant);
        Ok(())
    }

    pub fn set_default_block(&mut self, name: impl Into<String>) {
        self.default_block = name.into();
    }

    pub fn default_block(&self) -> &str {
        &self.default_block
    }

    pub fn spec(&self, name: &str) -> Option<&NodeSpec> {
        self.specs.get(name)
    }

    pub fn query(&self, name: &str, scope: Scope) -> Option<&NodeSpec> {
        self.specs.get(name).filter(|spec| spec.role.scope() == scope)
    }

    pub fn is_inline_format(&self, name: &str) -> bool {
        self.specs
            .get(name)
            .is_some_and(|spec| spec.role == NodeRole::Inline)
    }

    pub fn variant(&self, name: &str) -> Option<Arc<dyn BlockVariant>> {
        self.variants.get(name).cloned()
    }
}

/// Falsy values clear a format: `null`, `false`, `0` and `""`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
