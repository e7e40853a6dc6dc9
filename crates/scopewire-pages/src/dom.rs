//! In-memory document model
//!
//! A [`Document`] owns an arena of nodes; a [`Node`] is a cheap handle made
//! of the document and a generational index. Handles to released nodes are
//! detected instead of aliasing a reused slot: every operation on a stale
//! handle either returns `None`/an empty value or [`DomError::StaleNode`].
//!
//! Besides the usual tree structure, every node carries the state the
//! compiler attaches to it: an optional [`Scope`], the cached directive
//! bindings and an [`EventEmitter`] for DOM events.
//!
//! ## Example
//!
//! ```
//! use scopewire_pages::dom::Document;
//!
//! let document = Document::from_html(r#"<ul><li class="a">one</li></ul>"#).unwrap();
//! let list = document.root().first_child().unwrap();
//!
//! let item = document.create_element("li");
//! item.set_text_content("two");
//! list.append_child(&item).unwrap();
//!
//! assert_eq!(list.outer_html(), r#"<ul><li class="a">one</li><li>two</li></ul>"#);
//! assert_eq!(list.text_content(), "onetwo");
//! ```

mod html;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use scopewire_core::{EventEmitter, ListenerOutcome, Scope, Subscription, Value};

use crate::directive::DirectiveBinding;
use crate::error::DomError;

use self::html::Fragment;

/// Generational index of a node inside its document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
	index: u32,
	generation: u32,
}

/// Kind of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
	Document,
	Element,
	Text,
	Comment,
}

enum NodeKind {
	Document,
	Element(ElementData),
	Text(String),
	Comment(String),
}

struct ElementData {
	tag: String,
	attributes: Vec<(String, String)>,
	/// Live form value, shadowing the `value` attribute once written
	value: Option<String>,
}

struct NodeData {
	kind: NodeKind,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
	scope: Option<Scope>,
	controller_bound: bool,
	bindings: IndexMap<String, Rc<DirectiveBinding>>,
	listeners: EventEmitter<DomEvent>,
}

impl NodeData {
	fn new(kind: NodeKind) -> Self {
		Self {
			kind,
			parent: None,
			children: Vec::new(),
			scope: None,
			controller_bound: false,
			bindings: IndexMap::new(),
			listeners: EventEmitter::new(),
		}
	}

	fn can_have_children(&self) -> bool {
		matches!(self.kind, NodeKind::Document | NodeKind::Element(_))
	}
}

struct Slot {
	generation: u32,
	data: Option<NodeData>,
}

#[derive(Default)]
struct Tree {
	slots: Vec<Slot>,
	free: Vec<u32>,
	live: usize,
}

impl Tree {
	fn insert(&mut self, kind: NodeKind) -> NodeId {
		self.live += 1;
		let data = Some(NodeData::new(kind));
		if let Some(index) = self.free.pop() {
			let slot = &mut self.slots[index as usize];
			slot.data = data;
			return NodeId {
				index,
				generation: slot.generation,
			};
		}
		let index = self.slots.len() as u32;
		self.slots.push(Slot {
			generation: 0,
			data,
		});
		NodeId {
			index,
			generation: 0,
		}
	}

	fn get(&self, id: NodeId) -> Option<&NodeData> {
		self.slots
			.get(id.index as usize)
			.filter(|slot| slot.generation == id.generation)
			.and_then(|slot| slot.data.as_ref())
	}

	fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
		self.slots
			.get_mut(id.index as usize)
			.filter(|slot| slot.generation == id.generation)
			.and_then(|slot| slot.data.as_mut())
	}

	fn free(&mut self, id: NodeId) {
		if let Some(slot) = self.slots.get_mut(id.index as usize)
			&& slot.generation == id.generation
			&& slot.data.take().is_some()
		{
			slot.generation = slot.generation.wrapping_add(1);
			self.free.push(id.index);
			self.live -= 1;
		}
	}

	/// Preorder ids of `id` and its descendants.
	fn subtree(&self, id: NodeId) -> Vec<NodeId> {
		let mut out = Vec::new();
		let mut stack = vec![id];
		while let Some(current) = stack.pop() {
			if let Some(data) = self.get(current) {
				out.push(current);
				stack.extend(data.children.iter().rev());
			}
		}
		out
	}

	fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
		let mut current = Some(node);
		while let Some(id) = current {
			if id == ancestor {
				return true;
			}
			current = self.get(id).and_then(|data| data.parent);
		}
		false
	}

	fn detach(&mut self, id: NodeId) {
		let Some(parent) = self.get_mut(id).and_then(|data| data.parent.take()) else {
			return;
		};
		if let Some(parent) = self.get_mut(parent) {
			parent.children.retain(|child| *child != id);
		}
	}

	fn build(&mut self, fragment: &Fragment) -> NodeId {
		match fragment {
			Fragment::Text(text) => self.insert(NodeKind::Text(text.clone())),
			Fragment::Comment(text) => self.insert(NodeKind::Comment(text.clone())),
			Fragment::Element {
				tag,
				attributes,
				children,
			} => {
				let id = self.insert(NodeKind::Element(ElementData {
					tag: tag.clone(),
					attributes: attributes.clone(),
					value: None,
				}));
				for child in children {
					let child = self.build(child);
					self.attach(id, child, None);
				}
				id
			}
		}
	}

	/// Links a detached `child` under `parent` at `index` (or last).
	fn attach(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
		if let Some(data) = self.get_mut(child) {
			data.parent = Some(parent);
		}
		if let Some(data) = self.get_mut(parent) {
			let index = index.unwrap_or(data.children.len()).min(data.children.len());
			data.children.insert(index, child);
		}
	}

	fn to_fragment(&self, id: NodeId) -> Option<Fragment> {
		let data = self.get(id)?;
		Some(match &data.kind {
			NodeKind::Text(text) => Fragment::Text(text.clone()),
			NodeKind::Comment(text) => Fragment::Comment(text.clone()),
			NodeKind::Element(element) => Fragment::Element {
				tag: element.tag.clone(),
				attributes: element.attributes.clone(),
				children: data
					.children
					.iter()
					.filter_map(|child| self.to_fragment(*child))
					.collect(),
			},
			NodeKind::Document => return None,
		})
	}

	fn text_content(&self, id: NodeId, out: &mut String) {
		let Some(data) = self.get(id) else {
			return;
		};
		if let NodeKind::Text(text) = &data.kind {
			out.push_str(text);
		}
		for child in &data.children {
			self.text_content(*child, out);
		}
	}

	fn write_html(&self, id: NodeId, out: &mut String) {
		let Some(data) = self.get(id) else {
			return;
		};
		match &data.kind {
			NodeKind::Document => self.write_children(data, false, out),
			NodeKind::Text(text) => html::escape_text(text, out),
			NodeKind::Comment(text) => {
				out.push_str("<!--");
				out.push_str(text);
				out.push_str("-->");
			}
			NodeKind::Element(element) => {
				out.push('<');
				out.push_str(&element.tag);
				for (name, value) in &element.attributes {
					out.push(' ');
					out.push_str(name);
					if !value.is_empty() {
						out.push_str("=\"");
						html::escape_attribute(value, out);
						out.push('"');
					}
				}
				out.push('>');
				if html::is_void(&element.tag) {
					return;
				}
				self.write_children(data, html::is_raw_text(&element.tag), out);
				out.push_str("</");
				out.push_str(&element.tag);
				out.push('>');
			}
		}
	}

	fn write_children(&self, data: &NodeData, raw: bool, out: &mut String) {
		for child in &data.children {
			match self.get(*child) {
				Some(NodeData {
					kind: NodeKind::Text(text),
					..
				}) if raw => out.push_str(text),
				_ => self.write_html(*child, out),
			}
		}
	}
}

/// An HTML document: the arena owning every node created through it.
///
/// `Document` is a cheap handle; clones refer to the same document.
#[derive(Clone)]
pub struct Document {
	tree: Rc<RefCell<Tree>>,
	root: NodeId,
}

impl Document {
	/// Creates an empty document.
	pub fn new() -> Self {
		let mut tree = Tree::default();
		let root = tree.insert(NodeKind::Document);
		Self {
			tree: Rc::new(RefCell::new(tree)),
			root,
		}
	}

	/// Parses `html` into a new document.
	pub fn from_html(html: &str) -> Result<Self, DomError> {
		let document = Self::new();
		document.root().set_inner_html(html)?;
		Ok(document)
	}

	/// The document node
	pub fn root(&self) -> Node {
		self.node(self.root)
	}

	fn node(&self, id: NodeId) -> Node {
		Node {
			document: self.clone(),
			id,
		}
	}

	pub fn create_element(&self, tag: &str) -> Node {
		let id = self.tree.borrow_mut().insert(NodeKind::Element(ElementData {
			tag: tag.to_ascii_lowercase(),
			attributes: Vec::new(),
			value: None,
		}));
		self.node(id)
	}

	pub fn create_text(&self, text: &str) -> Node {
		let id = self.tree.borrow_mut().insert(NodeKind::Text(text.to_string()));
		self.node(id)
	}

	pub fn create_comment(&self, text: &str) -> Node {
		let id = self.tree.borrow_mut().insert(NodeKind::Comment(text.to_string()));
		self.node(id)
	}

	/// Parses `html` into detached nodes owned by this document.
	pub fn parse_fragment(&self, html: &str) -> Result<Vec<Node>, DomError> {
		let fragments = html::parse(html)?;
		let mut tree = self.tree.borrow_mut();
		let ids: Vec<NodeId> = fragments.iter().map(|fragment| tree.build(fragment)).collect();
		drop(tree);
		Ok(ids.into_iter().map(|id| self.node(id)).collect())
	}

	/// Number of nodes currently alive, including the document node.
	pub fn node_count(&self) -> usize {
		self.tree.borrow().live
	}

	/// Detaches `node`, tears its subtree down and frees every node in it.
	///
	/// Handles to released nodes become stale.
	pub fn release(&self, node: &Node) {
		if !node.same_document(self) || node.id == self.root {
			return;
		}
		node.teardown();
		let mut tree = self.tree.borrow_mut();
		tree.detach(node.id);
		for id in tree.subtree(node.id) {
			tree.free(id);
		}
	}

	pub fn ptr_eq(&self, other: &Document) -> bool {
		Rc::ptr_eq(&self.tree, &other.tree)
	}
}

impl Default for Document {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Document {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Document")
			.field("nodes", &self.node_count())
			.finish()
	}
}

/// Handle to a node of a [`Document`]
#[derive(Clone)]
pub struct Node {
	document: Document,
	id: NodeId,
}

impl PartialEq for Node {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id && self.document.ptr_eq(&other.document)
	}
}

impl Eq for Node {}

impl Node {
	pub fn id(&self) -> NodeId {
		self.id
	}

	pub fn document(&self) -> &Document {
		&self.document
	}

	fn same_document(&self, document: &Document) -> bool {
		self.document.ptr_eq(document)
	}

	fn read<R>(&self, f: impl FnOnce(&NodeData) -> R) -> Option<R> {
		self.document.tree.borrow().get(self.id).map(f)
	}

	fn write<R>(&self, f: impl FnOnce(&mut NodeData) -> R) -> Result<R, DomError> {
		self.document
			.tree
			.borrow_mut()
			.get_mut(self.id)
			.map(f)
			.ok_or(DomError::StaleNode)
	}

	fn element<R>(&self, f: impl FnOnce(&ElementData) -> R) -> Option<R> {
		self.read(|data| match &data.kind {
			NodeKind::Element(element) => Some(f(element)),
			_ => None,
		})
		.flatten()
	}

	fn element_mut<R>(&self, f: impl FnOnce(&mut ElementData) -> R) -> Result<R, DomError> {
		self.write(|data| match &mut data.kind {
			NodeKind::Element(element) => Ok(f(element)),
			_ => Err(DomError::HierarchyRequest("node is not an element")),
		})?
	}

	/// Returns false once the node has been released.
	pub fn is_alive(&self) -> bool {
		self.read(|_| ()).is_some()
	}

	pub fn node_type(&self) -> Option<NodeType> {
		self.read(|data| match data.kind {
			NodeKind::Document => NodeType::Document,
			NodeKind::Element(_) => NodeType::Element,
			NodeKind::Text(_) => NodeType::Text,
			NodeKind::Comment(_) => NodeType::Comment,
		})
	}

	pub fn is_element(&self) -> bool {
		self.node_type() == Some(NodeType::Element)
	}

	/// Lowercase tag name of an element
	pub fn tag_name(&self) -> Option<String> {
		self.element(|element| element.tag.clone())
	}

	// ------------------------------------------------------------------
	// Navigation
	// ------------------------------------------------------------------

	pub fn parent(&self) -> Option<Node> {
		self.read(|data| data.parent)
			.flatten()
			.map(|id| self.document.node(id))
	}

	pub fn children(&self) -> Vec<Node> {
		self.read(|data| data.children.clone())
			.unwrap_or_default()
			.into_iter()
			.map(|id| self.document.node(id))
			.collect()
	}

	pub fn first_child(&self) -> Option<Node> {
		self.read(|data| data.children.first().copied())
			.flatten()
			.map(|id| self.document.node(id))
	}

	pub fn last_child(&self) -> Option<Node> {
		self.read(|data| data.children.last().copied())
			.flatten()
			.map(|id| self.document.node(id))
	}

	fn sibling(&self, offset: isize) -> Option<Node> {
		let tree = self.document.tree.borrow();
		let parent = tree.get(tree.get(self.id)?.parent?)?;
		let index = parent.children.iter().position(|child| *child == self.id)?;
		let id = *parent.children.get(index.checked_add_signed(offset)?)?;
		drop(tree);
		Some(self.document.node(id))
	}

	pub fn next_sibling(&self) -> Option<Node> {
		self.sibling(1)
	}

	pub fn previous_sibling(&self) -> Option<Node> {
		self.sibling(-1)
	}

	/// This node followed by its descendants, in document order.
	pub fn descendants_and_self(&self) -> Vec<Node> {
		self.document
			.tree
			.borrow()
			.subtree(self.id)
			.into_iter()
			.map(|id| self.document.node(id))
			.collect()
	}

	/// Returns true if `other` is this node or one of its descendants.
	pub fn contains(&self, other: &Node) -> bool {
		other.same_document(&self.document)
			&& self
				.document
				.tree
				.borrow()
				.is_inclusive_ancestor(self.id, other.id)
	}

	/// Elements of the subtree (including this node) carrying `attribute`.
	pub fn find_by_attribute(&self, attribute: &str) -> Vec<Node> {
		self.descendants_and_self()
			.into_iter()
			.filter(|node| node.has_attribute(attribute))
			.collect()
	}

	/// Elements of the subtree (including this node) with the given tag.
	pub fn find_by_tag(&self, tag: &str) -> Vec<Node> {
		let tag = tag.to_ascii_lowercase();
		self.descendants_and_self()
			.into_iter()
			.filter(|node| node.tag_name().as_deref() == Some(tag.as_str()))
			.collect()
	}

	// ------------------------------------------------------------------
	// Mutation
	// ------------------------------------------------------------------

	pub fn append_child(&self, child: &Node) -> Result<(), DomError> {
		self.insert_before(child, None)
	}

	/// Inserts `child` before `reference`, or last when `reference` is
	/// `None`. The child is first detached from its current parent.
	pub fn insert_before(&self, child: &Node, reference: Option<&Node>) -> Result<(), DomError> {
		if !child.same_document(&self.document) || reference.is_some_and(|r| !r.same_document(&self.document)) {
			return Err(DomError::WrongDocument);
		}
		let mut tree = self.document.tree.borrow_mut();
		let target = tree.get(self.id).ok_or(DomError::StaleNode)?;
		if !target.can_have_children() {
			return Err(DomError::HierarchyRequest("text and comment nodes cannot have children"));
		}
		let inserted = tree.get(child.id).ok_or(DomError::StaleNode)?;
		if matches!(inserted.kind, NodeKind::Document) {
			return Err(DomError::HierarchyRequest("the document node cannot be inserted"));
		}
		if tree.is_inclusive_ancestor(child.id, self.id) {
			return Err(DomError::HierarchyRequest(
				"a node cannot be inserted into itself or its descendants",
			));
		}

		let mut reference = reference.map(|r| r.id);
		if let Some(reference_id) = reference {
			if tree.get(reference_id).and_then(|data| data.parent) != Some(self.id) {
				return Err(DomError::NotAChild);
			}
			if reference_id == child.id {
				let siblings = &tree.get(self.id).ok_or(DomError::StaleNode)?.children;
				let index = siblings.iter().position(|id| *id == child.id);
				reference = index.and_then(|index| siblings.get(index + 1).copied());
			}
		}

		tree.detach(child.id);
		let index = match reference {
			Some(reference_id) => tree
				.get(self.id)
				.and_then(|data| data.children.iter().position(|id| *id == reference_id)),
			None => None,
		};
		tree.attach(self.id, child.id, index);
		Ok(())
	}

	pub fn remove_child(&self, child: &Node) -> Result<(), DomError> {
		if !child.same_document(&self.document) {
			return Err(DomError::WrongDocument);
		}
		let mut tree = self.document.tree.borrow_mut();
		tree.get(self.id).ok_or(DomError::StaleNode)?;
		if tree.get(child.id).ok_or(DomError::StaleNode)?.parent != Some(self.id) {
			return Err(DomError::NotAChild);
		}
		tree.detach(child.id);
		Ok(())
	}

	/// Removes the node from its parent, keeping it alive.
	pub fn detach(&self) {
		self.document.tree.borrow_mut().detach(self.id);
	}

	/// Replaces this node with `replacement` in the parent.
	pub fn replace_with(&self, replacement: &Node) -> Result<(), DomError> {
		let parent = self.parent().ok_or(DomError::NotAChild)?;
		parent.insert_before(replacement, Some(self))?;
		self.detach();
		Ok(())
	}

	/// Copies the node and its descendants. Scopes, bindings, listeners and
	/// live form values are not copied.
	pub fn clone_deep(&self) -> Result<Node, DomError> {
		let mut tree = self.document.tree.borrow_mut();
		let fragment = tree.to_fragment(self.id).ok_or(DomError::StaleNode)?;
		let id = tree.build(&fragment);
		drop(tree);
		Ok(self.document.node(id))
	}

	// ------------------------------------------------------------------
	// Attributes and content
	// ------------------------------------------------------------------

	pub fn attribute(&self, name: &str) -> Option<String> {
		self.element(|element| {
			element
				.attributes
				.iter()
				.find(|(key, _)| key == name)
				.map(|(_, value)| value.clone())
		})
		.flatten()
	}

	pub fn has_attribute(&self, name: &str) -> bool {
		self.element(|element| element.attributes.iter().any(|(key, _)| key == name))
			.unwrap_or(false)
	}

	/// Attribute names and values in document order
	pub fn attributes(&self) -> Vec<(String, String)> {
		self.element(|element| element.attributes.clone())
			.unwrap_or_default()
	}

	pub fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError> {
		let name = name.to_ascii_lowercase();
		self.element_mut(|element| {
			match element.attributes.iter_mut().find(|(key, _)| *key == name) {
				Some((_, existing)) => *existing = value.to_string(),
				None => element.attributes.push((name, value.to_string())),
			}
		})
	}

	pub fn remove_attribute(&self, name: &str) -> Result<(), DomError> {
		self.element_mut(|element| element.attributes.retain(|(key, _)| key != name))
	}

	/// Concatenated text of the node and its descendants.
	///
	/// For a comment this is the comment body.
	pub fn text_content(&self) -> String {
		let tree = self.document.tree.borrow();
		if let Some(NodeData {
			kind: NodeKind::Comment(text),
			..
		}) = tree.get(self.id)
		{
			return text.clone();
		}
		let mut out = String::new();
		tree.text_content(self.id, &mut out);
		out
	}

	/// Replaces the children with a single text node, or sets the data of a
	/// text or comment node. Replaced children are released.
	pub fn set_text_content(&self, text: &str) {
		let replaced = self.write(|data| match &mut data.kind {
			NodeKind::Text(existing) | NodeKind::Comment(existing) => {
				*existing = text.to_string();
				false
			}
			_ => true,
		});
		if replaced != Ok(true) {
			return;
		}
		self.release_children();
		if !text.is_empty() {
			let node = self.document.create_text(text);
			let _ = self.append_child(&node);
		}
	}

	fn release_children(&self) {
		for child in self.children() {
			self.document.release(&child);
		}
	}

	pub fn inner_html(&self) -> String {
		let tree = self.document.tree.borrow();
		let mut out = String::new();
		if let Some(data) = tree.get(self.id) {
			let raw = matches!(&data.kind, NodeKind::Element(e) if html::is_raw_text(&e.tag));
			tree.write_children(data, raw, &mut out);
		}
		out
	}

	/// Parses `html` and replaces the children with the result. On a parse
	/// error the node is left untouched.
	pub fn set_inner_html(&self, html: &str) -> Result<(), DomError> {
		if !self.read(NodeData::can_have_children).ok_or(DomError::StaleNode)? {
			return Err(DomError::HierarchyRequest("text and comment nodes cannot have children"));
		}
		let nodes = self.document.parse_fragment(html)?;
		self.release_children();
		for node in &nodes {
			self.append_child(node)?;
		}
		Ok(())
	}

	pub fn outer_html(&self) -> String {
		let mut out = String::new();
		self.document.tree.borrow().write_html(self.id, &mut out);
		out
	}

	/// Form value: the live value once set, else the `value` attribute.
	pub fn value(&self) -> String {
		self.element(|element| {
			element.value.clone().unwrap_or_else(|| {
				element
					.attributes
					.iter()
					.find(|(key, _)| key == "value")
					.map(|(_, value)| value.clone())
					.unwrap_or_default()
			})
		})
		.unwrap_or_default()
	}

	pub fn set_value(&self, value: &str) -> Result<(), DomError> {
		self.element_mut(|element| element.value = Some(value.to_string()))
	}

	// ------------------------------------------------------------------
	// Compiler state
	// ------------------------------------------------------------------

	/// Scope attached directly to this node
	pub fn scope(&self) -> Option<Scope> {
		self.read(|data| data.scope.clone()).flatten()
	}

	/// Attaches a scope, returning the previous one.
	pub fn set_scope(&self, scope: Option<Scope>) -> Result<Option<Scope>, DomError> {
		self.write(|data| std::mem::replace(&mut data.scope, scope))
	}

	/// Scope of this node or of its closest ancestor that has one.
	pub fn nearest_scope(&self) -> Option<Scope> {
		let tree = self.document.tree.borrow();
		let mut current = Some(self.id);
		while let Some(id) = current {
			let data = tree.get(id)?;
			if let Some(scope) = &data.scope {
				return Some(scope.clone());
			}
			current = data.parent;
		}
		None
	}

	pub(crate) fn is_controller_bound(&self) -> bool {
		self.read(|data| data.controller_bound).unwrap_or(false)
	}

	pub(crate) fn mark_controller_bound(&self) -> Result<(), DomError> {
		self.write(|data| data.controller_bound = true)
	}

	pub(crate) fn binding(&self, name: &str) -> Option<Rc<DirectiveBinding>> {
		self.read(|data| data.bindings.get(name).cloned()).flatten()
	}

	pub(crate) fn insert_binding(&self, name: &str, binding: Rc<DirectiveBinding>) -> Result<(), DomError> {
		self.write(|data| {
			data.bindings.insert(name.to_string(), binding);
		})
	}

	/// Names of the directives bound to this node
	pub fn binding_names(&self) -> Vec<String> {
		self.read(|data| data.bindings.keys().cloned().collect())
			.unwrap_or_default()
	}

	/// Disposes the directive bindings and listeners of the subtree and
	/// detaches its scopes. Scopes created for controllers are disposed;
	/// scopes supplied from outside are only detached. The nodes themselves
	/// stay in place.
	pub fn teardown(&self) {
		let ids = self.document.tree.borrow().subtree(self.id);
		let mut bindings = Vec::new();
		let mut scopes = Vec::new();
		{
			let mut tree = self.document.tree.borrow_mut();
			for id in &ids {
				if let Some(data) = tree.get_mut(*id) {
					bindings.extend(std::mem::take(&mut data.bindings).into_values());
					let scope = data.scope.take();
					if std::mem::take(&mut data.controller_bound) {
						scopes.extend(scope);
					}
					data.listeners.clear();
				}
			}
		}
		// Disposing may edit the tree, so no borrow is held here.
		for binding in bindings {
			binding.dispose();
		}
		for scope in scopes {
			scope.dispose();
		}
	}

	/// Detaches and frees the subtree. See [`Document::release`].
	pub fn release(&self) {
		self.document.release(self);
	}

	// ------------------------------------------------------------------
	// Events
	// ------------------------------------------------------------------

	/// Registers a listener for DOM events of `kind` targeted at this node.
	pub fn on<F, R>(&self, kind: &str, callback: F) -> Subscription
	where
		F: Fn(&DomEvent) -> R + 'static,
		R: ListenerOutcome,
	{
		match self.read(|data| data.listeners.clone()) {
			Some(listeners) => listeners.on(kind, callback),
			None => Subscription::detached(),
		}
	}

	/// Delivers `event` to the listeners of this node. Events do not bubble.
	pub fn dispatch(&self, event: &DomEvent) {
		if let Some(listeners) = self.read(|data| data.listeners.clone()) {
			tracing::trace!(kind = %event.kind, node = ?self.id, "dispatching DOM event");
			listeners.trigger([event.kind.as_str()], event);
		}
	}

	/// Dispatches an event of `kind` without detail.
	pub fn fire(&self, kind: &str) {
		self.dispatch(&DomEvent::new(kind, self.clone()));
	}

	pub fn click(&self) {
		self.fire("click");
	}

	pub fn downgrade(&self) -> WeakNode {
		WeakNode {
			tree: Rc::downgrade(&self.document.tree),
			root: self.document.root,
			id: self.id,
		}
	}
}

impl fmt::Debug for Node {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("Node");
		debug.field("id", &self.id);
		match self.node_type() {
			Some(NodeType::Element) => debug.field("tag", &self.tag_name()),
			Some(kind) => debug.field("type", &kind),
			None => debug.field("stale", &true),
		};
		debug.finish()
	}
}

/// Handle that neither keeps the document nor the node alive
#[derive(Clone)]
pub struct WeakNode {
	tree: Weak<RefCell<Tree>>,
	root: NodeId,
	id: NodeId,
}

impl WeakNode {
	/// Returns the node if its document and the node itself are alive.
	pub fn upgrade(&self) -> Option<Node> {
		let tree = self.tree.upgrade()?;
		let node = Node {
			document: Document {
				tree,
				root: self.root,
			},
			id: self.id,
		};
		node.is_alive().then_some(node)
	}
}

impl fmt::Debug for WeakNode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WeakNode").field("id", &self.id).finish()
	}
}

/// Event delivered to node listeners
#[derive(Debug, Clone)]
pub struct DomEvent {
	/// Event name, e.g. `click` or `change`
	pub kind: String,
	/// Node the event was dispatched to
	pub target: Node,
	/// Payload supplied by the dispatcher
	pub detail: Value,
}

impl DomEvent {
	pub fn new(kind: impl Into<String>, target: Node) -> Self {
		Self {
			kind: kind.into(),
			target,
			detail: Value::Null,
		}
	}

	pub fn with_detail(mut self, detail: impl Into<Value>) -> Self {
		self.detail = detail.into();
		self
	}
}
