//! Arena-backed query tree.
//!
//! Nodes live in one `Vec` and refer to children by index, so walks and drop
//! never recurse regardless of how deeply a query nests.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FedgateError, Result};

/// `ParentType.field` key used by cost rules and historical statistics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldKey(String);

impl FieldKey {
    pub fn new(parent_type: &str, field: &str) -> Self {
        Self(format!("{parent_type}.{field}"))
    }

    /// Parse a configured key. Both sides of the single `.` must be non-empty.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.split_once('.') {
            Some((ty, field)) if !ty.is_empty() && !field.is_empty() && !field.contains('.') => {
                Ok(Self(raw.to_string()))
            }
            _ => Err(FedgateError::Config(format!(
                "invalid field key: {raw} (expected Type.field)"
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parent_type(&self) -> &str {
        self.0.split_once('.').map(|(t, _)| t).unwrap_or(&self.0)
    }

    pub fn field_name(&self) -> &str {
        self.0.split_once('.').map(|(_, f)| f).unwrap_or("")
    }
}

impl Borrow<str> for FieldKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FieldKey {
    type Error = FedgateError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<FieldKey> for String {
    fn from(key: FieldKey) -> Self {
        key.0
    }
}

/// Index of a node inside its `QueryTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One selected field.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryNode {
    pub key: FieldKey,
    pub alias: Option<String>,
    /// Arguments in document order, variables already resolved.
    pub arguments: Vec<(String, Value)>,
    pub children: Vec<NodeId>,
}

impl QueryNode {
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Parsed operation structure. Top-level fields are the roots, at depth 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryTree {
    nodes: Vec<QueryNode>,
    roots: Vec<NodeId>,
}

impl QueryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_root(&mut self, key: FieldKey, arguments: Vec<(String, Value)>) -> NodeId {
        let id = self.alloc(key, arguments);
        self.roots.push(id);
        id
    }

    pub fn push_child(
        &mut self,
        parent: NodeId,
        key: FieldKey,
        arguments: Vec<(String, Value)>,
    ) -> Result<NodeId> {
        if parent.0 >= self.nodes.len() {
            return Err(FedgateError::Internal(format!(
                "parent node {} out of range",
                parent.0
            )));
        }
        let id = self.alloc(key, arguments);
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.push(id);
        }
        Ok(id)
    }

    pub fn set_alias(&mut self, id: NodeId, alias: Option<String>) {
        if let Some(n) = self.nodes.get_mut(id.0) {
            n.alias = alias;
        }
    }

    fn alloc(&mut self, key: FieldKey, arguments: Vec<(String, Value)>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(QueryNode {
            key,
            alias: None,
            arguments,
            children: Vec::new(),
        });
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&QueryNode> {
        self.nodes.get(id.0)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pre-order walk yielding each node with its depth (roots are 1).
    pub fn walk(&self) -> Walk<'_> {
        let stack = self.roots.iter().rev().map(|id| (*id, 1)).collect();
        Walk { tree: self, stack }
    }

    /// Maximum nesting depth; 0 for an empty tree.
    pub fn max_depth(&self) -> u32 {
        self.walk().map(|(_, d)| d).max().unwrap_or(0)
    }
}

/// Explicit-stack pre-order iterator over a `QueryTree`.
pub struct Walk<'a> {
    tree: &'a QueryTree,
    stack: Vec<(NodeId, u32)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (&'a QueryNode, u32);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (id, depth) = self.stack.pop()?;
            let Some(node) = self.tree.node(id) else { continue };
            let child_depth = depth.saturating_add(1);
            self.stack
                .extend(node.children.iter().rev().map(|c| (*c, child_depth)));
            return Some((node, depth));
        }
    }
}
