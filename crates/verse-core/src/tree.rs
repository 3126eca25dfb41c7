use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::delta::Attrs;
use crate::error::TreeError;
use crate::registry::{BlockVariant, NodeRegistry, NodeRole, is_truthy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderHandle(u64);

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderElement {
    pub tag: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl RenderElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn add_class(&mut self, class: impl Into<String>) {
        let class = class.into();
        if !self.classes.contains(&class) {
            self.classes.push(class);
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Block {
        name: String,
        value: Value,
        attrs: Attrs,
    },
    Inline {
        name: String,
        value: Value,
    },
    Embed {
        name: String,
        value: Value,
    },
    Text {
        text: String,
    },
    Markup,
}

impl NodeKind {
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeKind::Root | NodeKind::Block { .. } | NodeKind::Inline { .. } | NodeKind::Markup
        )
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeKind::Text { .. } | NodeKind::Embed { .. })
    }
}

#[derive(Debug, Clone)]
struct Slot {
    kind: NodeKind,
    handle: RenderHandle,
    render: RenderElement,
    parent: Option<NodeId>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
}

pub struct Tree {
    slots: Vec<Option<Slot>>,
    handles: HashMap<RenderHandle, NodeId>,
    registry: NodeRegistry,
    root: NodeId,
    next_handle: u64,
    revision: u64,
}

impl Tree {
    pub fn new(registry: NodeRegistry) -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            handles: HashMap::new(),
            registry,
            root: NodeId(0),
            next_handle: 0,
            revision: 0,
        };
        tree.root = tree.alloc(NodeKind::Root, RenderElement::new("article"));
        tree
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    fn alloc(&mut self, kind: NodeKind, render: RenderElement) -> NodeId {
        let handle = RenderHandle(self.next_handle);
        self.next_handle += 1;
        let id = NodeId(self.slots.len());
        if !matches!(kind, NodeKind::Markup) {
            self.handles.insert(handle, id);
        }
        self.slots.push(Some(Slot {
            kind,
            handle,
            render,
            parent: None,
            prev: None,
            next: None,
            first_child: None,
            last_child: None,
        }));
        id
    }

    fn slot(&self, id: NodeId) -> Result<&Slot, TreeError> {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(TreeError::DeadNode(id))
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut Slot, TreeError> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(TreeError::DeadNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_ok()
    }

    pub fn create(&mut self, name: &str, value: Value) -> Result<NodeId, TreeError> {
        let spec = self
            .registry
            .spec(name)
            .cloned()
            .ok_or_else(|| TreeError::UnknownType(name.to_string()))?;
        let mut render = RenderElement::new(spec.tag);
        if let Some(class) = spec.class {
            render.add_class(class);
        }

        match spec.role {
            NodeRole::Block => {
                let variant = self.variant(name)?;
                variant.create(self, value)
            }
            NodeRole::Inline => Ok(self.alloc(
                NodeKind::Inline {
                    name: spec.name,
                    value,
                },
                render,
            )),
            NodeRole::Embed => Ok(self.alloc(
                NodeKind::Embed {
                    name: spec.name,
                    value,
                },
                render,
            )),
            NodeRole::BlockAttribute => Err(TreeError::UnknownType(name.to_string())),
        }
    }

    pub fn create_block(&mut self, name: &str, value: Value) -> Result<NodeId, TreeError> {
        let spec = self
            .registry
            .spec(name)
            .filter(|spec| spec.role == NodeRole::Block)
            .cloned()
            .ok_or_else(|| TreeError::UnknownType(name.to_string()))?;
        let mut render = RenderElement::new(spec.tag);
        if let Some(class) = spec.class {
            render.add_class(class);
        }
        Ok(self.alloc(
            NodeKind::Block {
                name: spec.name,
                value,
                attrs: Attrs::new(),
            },
            render,
        ))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(
            NodeKind::Text { text: text.into() },
            RenderElement::new("#text"),
        )
    }

    pub fn create_markup(&mut self, tag: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Markup, RenderElement::new(tag))
    }

    pub fn find(&self, handle: RenderHandle) -> Option<NodeId> {
        self.handles
            .get(&handle)
            .copied()
            .filter(|id| self.contains(*id))
    }

    pub fn handle(&self, id: NodeId) -> Result<RenderHandle, TreeError> {
        Ok(self.slot(id)?.handle)
    }

    pub fn render(&self, id: NodeId) -> Result<&RenderElement, TreeError> {
        Ok(&self.slot(id)?.render)
    }

    pub fn render_mut(&mut self, id: NodeId) -> Result<&mut RenderElement, TreeError> {
        Ok(&mut self.slot_mut(id)?.render)
    }

    pub fn kind(&self, id: NodeId) -> Result<&NodeKind, TreeError> {
        Ok(&self.slot(id)?.kind)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).ok().and_then(|s| s.parent)
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).ok().and_then(|s| s.prev)
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).ok().and_then(|s| s.next)
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).ok().and_then(|s| s.first_child)
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).ok().and_then(|s| s.last_child)
    }

    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut out = Vec::new();
        let mut cur = self.slot(id)?.first_child;
        while let Some(child) = cur {
            out.push(child);
            cur = self.slot(child)?.next;
        }
        Ok(out)
    }

    pub fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut out = Vec::new();
        let mut stack = self.children(id)?;
        stack.reverse();
        while let Some(node) = stack.pop() {
            out.push(node);
            let mut kids = self.children(node)?;
            kids.reverse();
            stack.extend(kids);
        }
        Ok(out)
    }

    pub fn variant(&self, name: &str) -> Result<Arc<dyn BlockVariant>, TreeError> {
        self.registry
            .variant(name)
            .ok_or_else(|| TreeError::UnknownType(name.to_string()))
    }

    pub fn variant_of(&self, id: NodeId) -> Result<Arc<dyn BlockVariant>, TreeError> {
        match self.kind(id)? {
            NodeKind::Block { name, .. } => self.variant(name),
            _ => Err(TreeError::NotABlock(id)),
        }
    }

    pub fn block_name(&self, id: NodeId) -> Option<&str> {
        match self.kind(id).ok()? {
            NodeKind::Block { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_block(&self, id: NodeId) -> bool {
        self.block_name(id).is_some()
    }

    pub fn is_block_of(&self, id: NodeId, name: &str) -> bool {
        self.block_name(id) == Some(name)
    }

    pub fn is_embed(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Ok(NodeKind::Embed { .. }))
    }

    pub fn block_value(&self, id: NodeId) -> Result<&Value, TreeError> {
        match self.kind(id)? {
            NodeKind::Block { value, .. } => Ok(value),
            _ => Err(TreeError::NotABlock(id)),
        }
    }

    pub fn block_attrs(&self, id: NodeId) -> Result<&Attrs, TreeError> {
        match self.kind(id)? {
            NodeKind::Block { attrs, .. } => Ok(attrs),
            _ => Err(TreeError::NotABlock(id)),
        }
    }

    pub fn set_block_attr(
        &mut self,
        id: NodeId,
        name: &str,
        value: &Value,
    ) -> Result<(), TreeError> {
        let NodeKind::Block { attrs, .. } = &mut self.slot_mut(id)?.kind else {
            return Err(TreeError::NotABlock(id));
        };
        if is_truthy(value) {
            attrs.insert(name.to_string(), value.clone());
        } else {
            attrs.remove(name);
        }
        self.bump();
        Ok(())
    }

    pub fn text_content(&self, id: NodeId) -> Result<String, TreeError> {
        if let NodeKind::Text { text } = self.kind(id)? {
            return Ok(text.clone());
        }
        let mut out = String::new();
        for node in self.descendants(id)? {
            if let NodeKind::Text { text } = self.kind(node)? {
                out.push_str(text);
            }
        }
        Ok(out)
    }

    pub fn length(&self, id: NodeId) -> Result<usize, TreeError> {
        match self.kind(id)? {
            NodeKind::Text { text } => Ok(text.chars().count()),
            NodeKind::Embed { .. } => Ok(1),
            NodeKind::Block { name, .. } => {
                let variant = self.variant(name)?;
                variant.length(self, id)
            }
            NodeKind::Root | NodeKind::Inline { .. } | NodeKind::Markup => {
                self.children_length(id)
            }
        }
    }

    pub fn children_length(&self, id: NodeId) -> Result<usize, TreeError> {
        let mut len = 0;
        for child in self.children(id)? {
            len += self.length(child)?;
        }
        Ok(len)
    }

    pub fn text_len(&self, leaf: NodeId) -> Result<usize, TreeError> {
        match self.kind(leaf)? {
            NodeKind::Text { text } => Ok(text.chars().count()),
            _ => Err(TreeError::NotText(leaf)),
        }
    }

    pub fn insert_text(
        &mut self,
        leaf: NodeId,
        offset: usize,
        value: &str,
    ) -> Result<(), TreeError> {
        let NodeKind::Text { text } = &mut self.slot_mut(leaf)?.kind else {
            return Err(TreeError::NotText(leaf));
        };
        let len = text.chars().count();
        if offset > len {
            return Err(TreeError::OutOfBounds {
                node: leaf,
                offset,
                len,
            });
        }
        let at = byte_offset(text, offset);
        text.insert_str(at, value);
        self.bump();
        Ok(())
    }

    pub fn delete_text(
        &mut self,
        leaf: NodeId,
        offset: usize,
        count: usize,
    ) -> Result<(), TreeError> {
        let NodeKind::Text { text } = &mut self.slot_mut(leaf)?.kind else {
            return Err(TreeError::NotText(leaf));
        };
        let len = text.chars().count();
        if offset > len {
            return Err(TreeError::OutOfBounds {
                node: leaf,
                offset,
                len,
            });
        }
        let start = byte_offset(text, offset);
        let end = byte_offset(text, (offset + count).min(len));
        if start == end {
            return Ok(());
        }
        text.replace_range(start..end, "");
        self.bump();
        Ok(())
    }

    fn detach(&mut self, id: NodeId) -> Result<(), TreeError> {
        let (parent, prev, next) = {
            let slot = self.slot(id)?;
            (slot.parent, slot.prev, slot.next)
        };
        let Some(parent) = parent else {
            return Ok(());
        };
        match prev {
            Some(prev) => self.slot_mut(prev)?.next = next,
            None => self.slot_mut(parent)?.first_child = next,
        }
        match next {
            Some(next) => self.slot_mut(next)?.prev = prev,
            None => self.slot_mut(parent)?.last_child = prev,
        }
        let slot = self.slot_mut(id)?;
        slot.parent = None;
        slot.prev = None;
        slot.next = None;
        Ok(())
    }

    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), TreeError> {
        if !self.kind(parent)?.is_container() {
            return Err(TreeError::NotAContainer(parent));
        }
        if let Some(reference) = reference {
            if self.slot(reference)?.parent != Some(parent) {
                return Err(TreeError::Detached(reference));
            }
            if reference == child {
                return Ok(());
            }
        }

        self.detach(child)?;
        let prev = match reference {
            Some(reference) => self.slot(reference)?.prev,
            None => self.slot(parent)?.last_child,
        };
        {
            let slot = self.slot_mut(child)?;
            slot.parent = Some(parent);
            slot.prev = prev;
            slot.next = reference;
        }
        match prev {
            Some(prev) => self.slot_mut(prev)?.next = Some(child),
            None => self.slot_mut(parent)?.first_child = Some(child),
        }
        match reference {
            Some(reference) => self.slot_mut(reference)?.prev = Some(child),
            None => self.slot_mut(parent)?.last_child = Some(child),
        }
        self.bump();
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.insert_before(parent, child, None)
    }

    pub fn remove(&mut self, id: NodeId) -> Result<(), TreeError> {
        let mut doomed = self.descendants(id)?;
        doomed.push(id);
        self.detach(id)?;
        for node in doomed {
            if let Some(slot) = self.slots.get_mut(node.0).and_then(Option::take) {
                self.handles.remove(&slot.handle);
            }
        }
        self.bump();
        Ok(())
    }

    pub fn move_children(
        &mut self,
        from: NodeId,
        to: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), TreeError> {
        for child in self.children(from)? {
            self.insert_before(to, child, reference)?;
        }
        Ok(())
    }

    pub fn unwrap(&mut self, id: NodeId) -> Result<(), TreeError> {
        let parent = self.parent(id).ok_or(TreeError::Detached(id))?;
        self.move_children(id, parent, Some(id))?;
        self.remove(id)
    }

    pub fn wrap(&mut self, id: NodeId, name: &str, value: Value) -> Result<NodeId, TreeError> {
        let parent = self.parent(id).ok_or(TreeError::Detached(id))?;
        let wrapper = self.create(name, value)?;
        self.insert_before(parent, wrapper, Some(id))?;
        self.append_child(wrapper, id)?;
        Ok(wrapper)
    }

    fn clone_shallow(&mut self, id: NodeId) -> Result<NodeId, TreeError> {
        let slot = self.slot(id)?;
        let kind = match &slot.kind {
            NodeKind::Root => return Err(TreeError::Detached(id)),
            NodeKind::Text { .. } => NodeKind::Text {
                text: String::new(),
            },
            kind => kind.clone(),
        };
        let render = slot.render.clone();
        Ok(self.alloc(kind, render))
    }

    /// Child covering `index` and the offset inside it.
    ///
    /// With `inclusive`, an index sitting exactly at a child's end resolves to
    /// that child unless a non-empty sibling follows.
    pub fn child_at(
        &self,
        parent: NodeId,
        index: usize,
        inclusive: bool,
    ) -> Result<Option<(NodeId, usize)>, TreeError> {
        let mut index = index;
        let mut cur = self.first_child(parent);
        while let Some(child) = cur {
            let len = self.length(child)?;
            let next = self.next(child);
            let next_empty = match next {
                Some(next) => self.length(next)? == 0,
                None => true,
            };
            if index < len || (inclusive && index == len && next_empty) {
                return Ok(Some((child, index)));
            }
            index -= len;
            cur = next;
        }
        Ok(None)
    }

    /// Visits the children of `parent` overlapping `[index, index + length)`
    /// with the offset and clipped length inside each child. The following
    /// sibling is captured before the callback runs, so nodes the callback
    /// inserts after the current child are not visited.
    pub fn for_each_at<F>(
        &mut self,
        parent: NodeId,
        index: usize,
        length: usize,
        mut f: F,
    ) -> Result<(), TreeError>
    where
        F: FnMut(&mut Tree, NodeId, usize, usize) -> Result<(), TreeError>,
    {
        if length == 0 {
            return Ok(());
        }
        let Some((start, offset)) = self.child_at(parent, index, false)? else {
            return Ok(());
        };
        let end = index + length;
        let mut cur_index = index - offset;
        let mut cur = Some(start);
        while let Some(node) = cur {
            if cur_index >= end || !self.contains(node) {
                break;
            }
            let cur_len = self.length(node)?;
            let next = self.next(node);
            if index > cur_index {
                f(self, node, index - cur_index, length.min(cur_index + cur_len - index))?;
            } else {
                f(self, node, 0, cur_len.min(end - cur_index))?;
            }
            cur_index += cur_len;
            cur = next;
        }
        Ok(())
    }

    /// Splits `id` at `index`, returning the node that now starts there.
    ///
    /// Without `force`, splitting at 0 returns `id` itself and splitting at
    /// the end returns the next sibling (which may not exist).
    pub fn split(
        &mut self,
        id: NodeId,
        index: usize,
        force: bool,
    ) -> Result<Option<NodeId>, TreeError> {
        let len = self.length(id)?;
        if index > len {
            return Err(TreeError::OutOfBounds {
                node: id,
                offset: index,
                len,
            });
        }
        if !force {
            if index == 0 {
                return Ok(Some(id));
            }
            if index == len {
                return Ok(self.next(id));
            }
        }

        match self.kind(id)? {
            NodeKind::Text { text } => {
                let at = byte_offset(text, index);
                let tail = text[at..].to_string();
                if let NodeKind::Text { text } = &mut self.slot_mut(id)?.kind {
                    text.truncate(at);
                }
                let parent = self.parent(id).ok_or(TreeError::Detached(id))?;
                let next = self.next(id);
                let after = self.create_text(tail);
                self.insert_before(parent, after, next)?;
                Ok(Some(after))
            }
            NodeKind::Embed { .. } => Ok(if index == 0 { Some(id) } else { self.next(id) }),
            _ => {
                let after = self.clone_shallow(id)?;
                if let Some(parent) = self.parent(id) {
                    let next = self.next(id);
                    self.insert_before(parent, after, next)?;
                }
                self.for_each_at(id, index, len, |tree, child, offset, _| {
                    if let Some(tail) = tree.split(child, offset, force)? {
                        tree.append_child(after, tail)?;
                    }
                    Ok(())
                })?;
                Ok(Some(after))
            }
        }
    }

    pub fn isolate(
        &mut self,
        id: NodeId,
        index: usize,
        length: usize,
    ) -> Result<NodeId, TreeError> {
        let target = self.split(id, index, false)?.ok_or(TreeError::OutOfBounds {
            node: id,
            offset: index,
            len: self.length(id)?,
        })?;
        self.split(target, length, false)?;
        tracing::debug!(node = ?id, index, length, isolated = ?target, "isolated range");
        Ok(target)
    }

    pub fn replace_node(&mut self, id: NodeId, target: NodeId) -> Result<(), TreeError> {
        if self.kind(target)?.is_container() && self.kind(id)?.is_container() {
            self.move_children(target, id, None)?;
        }
        let parent = self.parent(target).ok_or(TreeError::Detached(target))?;
        let next = self.next(target);
        self.insert_before(parent, id, next)?;
        self.remove(target)
    }

    /// Replaces `id` with a fresh node of type `name`, carrying over block
    /// attributes. The new node's variant decides how the replacement is
    /// performed.
    pub fn replace_with(
        &mut self,
        id: NodeId,
        name: &str,
        value: Value,
    ) -> Result<NodeId, TreeError> {
        let replacement = self.create(name, value)?;
        if let (Ok(attrs), true) = (self.block_attrs(id).cloned(), self.is_block(replacement)) {
            for (key, value) in &attrs {
                self.set_block_attr(replacement, key, value)?;
            }
        }
        match self.variant_of(replacement) {
            Ok(variant) => variant.replace(self, replacement, id)?,
            Err(_) => self.replace_node(replacement, id)?,
        }
        tracing::debug!(from = ?id, to = ?replacement, name, "replaced node");
        Ok(replacement)
    }

    pub fn insert_at(
        &mut self,
        id: NodeId,
        index: usize,
        value: &str,
        embed: Option<&Value>,
    ) -> Result<(), TreeError> {
        match (self.kind(id)?, embed) {
            (NodeKind::Text { .. }, None) => self.insert_text(id, index, value),
            (NodeKind::Text { .. } | NodeKind::Embed { .. }, _) => {
                let node = self.new_leaf(value, embed)?;
                let parent = self.parent(id).ok_or(TreeError::Detached(id))?;
                let reference = self.split(id, index, false)?;
                self.insert_before(parent, node, reference)
            }
            _ => match self.child_at(id, index, false)? {
                Some((child, offset)) => self.insert_at(child, offset, value, embed),
                None => {
                    let node = self.new_leaf(value, embed)?;
                    self.append_child(id, node)
                }
            },
        }
    }

    fn new_leaf(&mut self, value: &str, embed: Option<&Value>) -> Result<NodeId, TreeError> {
        match embed {
            Some(def) => self.create(value, def.clone()),
            None => Ok(self.create_text(value)),
        }
    }

    pub fn delete_at(&mut self, id: NodeId, index: usize, length: usize) -> Result<(), TreeError> {
        match self.kind(id)? {
            NodeKind::Text { .. } => self.delete_text(id, index, length),
            NodeKind::Embed { .. } => self.remove(id),
            _ => self.for_each_at(id, index, length, |tree, child, offset, len| {
                tree.delete_at(child, offset, len)
            }),
        }
    }

    pub fn format_inline_at(
        &mut self,
        id: NodeId,
        index: usize,
        length: usize,
        name: &str,
        value: &Value,
    ) -> Result<(), TreeError> {
        match self.kind(id)? {
            NodeKind::Text { .. } => {
                if is_truthy(value) {
                    let target = self.isolate(id, index, length)?;
                    self.wrap(target, name, value.clone())?;
                }
                Ok(())
            }
            NodeKind::Embed { .. } => {
                if is_truthy(value) && index == 0 && length > 0 {
                    self.wrap(id, name, value.clone())?;
                }
                Ok(())
            }
            NodeKind::Inline {
                name: own,
                value: current,
            } if own == name => {
                if current == value {
                    return Ok(());
                }
                let target = self.isolate(id, index, length)?;
                if !is_truthy(value) {
                    return self.unwrap(target);
                }
                if let NodeKind::Inline { value: current, .. } = &mut self.slot_mut(target)?.kind {
                    *current = value.clone();
                }
                self.bump();
                Ok(())
            }
            _ => self.for_each_at(id, index, length, |tree, child, offset, len| {
                tree.format_inline_at(child, offset, len, name, value)
            }),
        }
    }

    pub fn text_leaf_at(
        &self,
        id: NodeId,
        index: usize,
        inclusive: bool,
    ) -> Result<Option<(NodeId, usize)>, TreeError> {
        let mut node = id;
        let mut index = index;
        loop {
            match self.kind(node)? {
                NodeKind::Text { .. } => return Ok(Some((node, index))),
                NodeKind::Embed { .. } => return Ok(None),
                _ => {}
            }
            let Some((child, offset)) = self.child_at(node, index, inclusive)? else {
                return Ok(None);
            };
            node = child;
            index = offset;
        }
    }

    pub fn last_text_leaf(&self, id: NodeId) -> Result<Option<NodeId>, TreeError> {
        for node in self.descendants(id)?.into_iter().rev() {
            if let NodeKind::Text { text } = self.kind(node)? {
                if !text.is_empty() {
                    return Ok(Some(node));
                }
            }
        }
        Ok(None)
    }

    pub fn inline_formats(&self, leaf: NodeId, block: NodeId) -> Result<Attrs, TreeError> {
        let mut attrs = Attrs::new();
        let mut cur = self.parent(leaf);
        while let Some(node) = cur {
            if node == block {
                break;
            }
            if let NodeKind::Inline { name, value } = self.kind(node)? {
                attrs.entry(name.clone()).or_insert_with(|| value.clone());
            }
            cur = self.parent(node);
        }
        Ok(attrs)
    }

    pub fn optimize_children(&mut self, id: NodeId) -> Result<(), TreeError> {
        let mut cur = self.first_child(id);
        while let Some(child) = cur {
            let following = self.next(child);
            match self.kind(child)? {
                NodeKind::Text { text } if text.is_empty() => {
                    self.remove(child)?;
                    cur = following;
                    continue;
                }
                NodeKind::Text { .. } => {
                    while let Some(next) = self.next(child) {
                        let NodeKind::Text { text } = self.kind(next)? else {
                            break;
                        };
                        let tail = text.clone();
                        let len = self.text_len(child)?;
                        self.insert_text(child, len, &tail)?;
                        self.remove(next)?;
                    }
                }
                NodeKind::Inline { .. } | NodeKind::Markup => {
                    self.optimize_children(child)?;
                    if self.first_child(child).is_none() {
                        self.remove(child)?;
                        cur = following;
                        continue;
                    }
                    if let Some(next) = self.next(child) {
                        let same = match (self.kind(child)?, self.kind(next)?) {
                            (
                                NodeKind::Inline { name, value },
                                NodeKind::Inline {
                                    name: next_name,
                                    value: next_value,
                                },
                            ) => name == next_name && value == next_value,
                            _ => false,
                        };
                        if same {
                            self.move_children(next, child, None)?;
                            self.remove(next)?;
                        }
                    }
                }
                _ => {}
            }
            cur = self.next(child);
        }
        Ok(())
    }
}

fn byte_offset(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map_or(s.len(), |(at, _)| at)
}
