//! Segment-indexed subscription trie.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Every
//! node keeps the id of its parent, which is only ever read while pruning
//! empty branches after a removal.

use std::collections::HashMap;

use arcstr::ArcStr;

use super::topic_format::segments;
use super::wildcard;

/// Matching semantics of a [`TopicMatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
	/// Routes registered on a node match every topic reaching or passing
	/// through it: a route on `a/b/` also receives `a/b/c/`.
	#[default]
	Emitter,
	/// Routes match only when the topic is fully consumed at their node,
	/// except for `#` which matches whatever remains.
	Mqtt,
}

/// Handle of a node inside the trie arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

const ROOT: NodeId = NodeId(0);

#[derive(Debug)]
struct TrieNode<T> {
	segment: ArcStr,
	parent: Option<NodeId>,
	children: HashMap<ArcStr, NodeId>,
	/// Routes keyed by full pattern text
	routes: HashMap<ArcStr, T>,
}

impl<T> TrieNode<T> {
	fn new(segment: ArcStr, parent: Option<NodeId>) -> Self {
		Self {
			segment,
			parent,
			children: HashMap::new(),
			routes: HashMap::new(),
		}
	}

	fn is_empty(&self) -> bool {
		self.routes.is_empty() && self.children.is_empty()
	}
}

/// Maps topic patterns to values and answers which values match a topic.
///
/// Patterns are split on `/` with empty segments dropped. `+` matches a
/// single segment under both policies; `#` is only meaningful under
/// [`MatchPolicy::Mqtt`].
#[derive(Debug)]
pub struct TopicMatcher<T> {
	nodes: Vec<Option<TrieNode<T>>>,
	free: Vec<usize>,
	policy: MatchPolicy,
}

impl<T> Default for TopicMatcher<T> {
	fn default() -> Self {
		Self::new(MatchPolicy::default())
	}
}

impl<T> TopicMatcher<T> {
	/// Creates an empty trie holding only the root node.
	pub fn new(policy: MatchPolicy) -> Self {
		Self {
			nodes: vec![Some(TrieNode::new(ArcStr::new(), None))],
			free: Vec::new(),
			policy,
		}
	}

	pub fn policy(&self) -> MatchPolicy {
		self.policy
	}

	/// Number of live nodes, root included.
	pub fn node_count(&self) -> usize {
		self.nodes.len() - self.free.len()
	}

	/// Number of registered routes.
	pub fn route_count(&self) -> usize {
		self.nodes
			.iter()
			.flatten()
			.map(|node| node.routes.len())
			.sum()
	}

	/// Registers `value` under `pattern`, creating missing nodes on the way.
	///
	/// Returns the value previously registered under the exact same pattern.
	pub fn insert(&mut self, pattern: &str, value: T) -> Option<T> {
		let mut current = ROOT;
		for segment in segments(pattern) {
			current = match self.child(current, segment) {
				| Some(child) => child,
				| None => self.attach(current, ArcStr::from(segment)),
			};
		}

		self.node_mut(current)
			.and_then(|node| node.routes.insert(ArcStr::from(pattern), value))
	}

	/// Removes the route registered under `pattern` and prunes every
	/// ancestor left without routes and children. The root is never pruned.
	pub fn remove(&mut self, pattern: &str) -> Option<T> {
		let mut current = ROOT;
		for segment in segments(pattern) {
			current = self.child(current, segment)?;
		}

		let removed = self.node_mut(current)?.routes.remove(pattern)?;
		self.prune(current);
		Some(removed)
	}

	/// Collects every value whose pattern matches `topic`.
	///
	/// The same value is reported once per matching pattern.
	pub fn find_by_path(&self, topic: &str) -> Vec<&T> {
		let query: Vec<&str> = segments(topic).collect();
		let mut matched = Vec::new();
		match self.policy {
			| MatchPolicy::Emitter => {
				self.collect_emitter(ROOT, &query, &mut matched)
			}
			| MatchPolicy::Mqtt => self.collect_mqtt(ROOT, &query, &mut matched),
		}
		matched
	}

	fn collect_emitter<'a>(
		&'a self,
		id: NodeId,
		query: &[&str],
		matched: &mut Vec<&'a T>,
	) {
		let Some(node) = self.node(id) else {
			return;
		};
		matched.extend(node.routes.values());

		if let [segment, rest @ ..] = query {
			if let Some(child) = node.children.get(*segment) {
				self.collect_emitter(*child, rest, matched);
			}
			if let Some(child) = node.children.get(wildcard::SINGLE_LEVEL) {
				self.collect_emitter(*child, rest, matched);
			}
		}
	}

	fn collect_mqtt<'a>(
		&'a self,
		id: NodeId,
		query: &[&str],
		matched: &mut Vec<&'a T>,
	) {
		let Some(node) = self.node(id) else {
			return;
		};
		if let [segment, rest @ ..] = query {
			if let Some(child) = node.children.get(*segment) {
				self.collect_mqtt(*child, rest, matched);
			}
			if let Some(child) = node.children.get(wildcard::SINGLE_LEVEL) {
				self.collect_mqtt(*child, rest, matched);
			}
		} else {
			matched.extend(node.routes.values());
		}

		if let Some(hash) = node
			.children
			.get(wildcard::MULTI_LEVEL)
			.and_then(|child| self.node(*child))
		{
			matched.extend(hash.routes.values());
		}
	}

	fn node(&self, id: NodeId) -> Option<&TrieNode<T>> {
		self.nodes.get(id.0).and_then(Option::as_ref)
	}

	fn node_mut(&mut self, id: NodeId) -> Option<&mut TrieNode<T>> {
		self.nodes.get_mut(id.0).and_then(Option::as_mut)
	}

	fn child(&self, id: NodeId, segment: &str) -> Option<NodeId> {
		self.node(id)?.children.get(segment).copied()
	}

	fn attach(&mut self, parent: NodeId, segment: ArcStr) -> NodeId {
		let node = TrieNode::new(segment.clone(), Some(parent));
		let id = match self.free.pop() {
			| Some(slot) => {
				self.nodes[slot] = Some(node);
				NodeId(slot)
			}
			| None => {
				self.nodes.push(Some(node));
				NodeId(self.nodes.len() - 1)
			}
		};
		if let Some(parent) = self.node_mut(parent) {
			parent.children.insert(segment, id);
		}
		id
	}

	/// Walks upward from `id`, detaching nodes until one keeps content.
	fn prune(&mut self, mut id: NodeId) {
		while id != ROOT {
			let Some(node) = self.node(id) else {
				return;
			};
			if !node.is_empty() {
				return;
			}
			let Some(parent) = node.parent else {
				return;
			};
			let segment = node.segment.clone();

			if let Some(parent_node) = self.node_mut(parent) {
				parent_node.children.remove(&segment);
			}
			self.nodes[id.0] = None;
			self.free.push(id.0);
			id = parent;
		}
	}
}
