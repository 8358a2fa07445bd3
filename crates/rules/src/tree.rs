//! Diagnosis tree: AND/OR/NOT combinators over leaf verdicts.
//!
//! A leaf node is true when its check item is abnormal. Interior nodes
//! combine their children; the root value is the diagnosis.

use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, RuleError};

/// Logical operators for interior nodes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

/// Tree node as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NodeConfig {
    /// Reference to a check item.
    Leaf { leaf: String },
    /// Combinator over child nodes.
    Branch {
        name: String,
        operator: LogicalOperator,
        #[serde(default)]
        children: Vec<NodeConfig>,
    },
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        name: String,
        known: bool,
    },
    Branch {
        name: String,
        operator: LogicalOperator,
        children: Vec<Node>,
    },
}

/// Outcome of one diagnosis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub root: bool,
    /// Node name -> value, in evaluation order (children before parents).
    pub nodes: IndexMap<String, bool>,
}

/// Validated, immutable diagnosis tree.
#[derive(Debug, Clone)]
pub struct DiagTree {
    root: Node,
}

impl DiagTree {
    /// Validate `config` against the set of known leaf names.
    ///
    /// Unknown leaf references are logged and evaluate to false. An empty
    /// AND/OR or a NOT without exactly one child is an error.
    pub fn from_config<'a>(
        config: &NodeConfig,
        known_leaves: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let known: HashSet<&str> = known_leaves.into_iter().collect();
        let root = build(config, &known)?;
        Ok(Self { root })
    }

    /// Evaluate against the set of abnormal leaves.
    pub fn diagnose(&self, abnormal: &BTreeSet<String>) -> Diagnosis {
        let mut nodes = IndexMap::new();
        let root = evaluate_node(&self.root, abnormal, &mut nodes);
        Diagnosis { root, nodes }
    }

    /// Leaf names referenced anywhere in the tree.
    pub fn leaf_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_leaves(&self.root, &mut names);
        names
    }
}

fn build(config: &NodeConfig, known: &HashSet<&str>) -> Result<Node> {
    match config {
        NodeConfig::Leaf { leaf } => {
            let is_known = known.contains(leaf.as_str());
            if !is_known {
                warn!(leaf = %leaf, "diagnosis tree references unknown check item");
            }
            Ok(Node::Leaf {
                name: leaf.clone(),
                known: is_known,
            })
        }
        NodeConfig::Branch {
            name,
            operator,
            children,
        } => {
            match operator {
                LogicalOperator::And | LogicalOperator::Or if children.is_empty() => {
                    return Err(RuleError::Tree(format!(
                        "node `{name}` has no children"
                    )));
                }
                LogicalOperator::Not if children.len() != 1 => {
                    return Err(RuleError::Tree(format!(
                        "NOT node `{name}` needs exactly one child, got {}",
                        children.len()
                    )));
                }
                _ => {}
            }
            let children = children
                .iter()
                .map(|c| build(c, known))
                .collect::<Result<Vec<_>>>()?;
            Ok(Node::Branch {
                name: name.clone(),
                operator: *operator,
                children,
            })
        }
    }
}

/// Recursively evaluate a node, recording every node's value.
fn evaluate_node(node: &Node, abnormal: &BTreeSet<String>, out: &mut IndexMap<String, bool>) -> bool {
    match node {
        Node::Leaf { name, known } => {
            let value = *known && abnormal.contains(name);
            out.insert(name.clone(), value);
            value
        }
        Node::Branch {
            name,
            operator,
            children,
        } => {
            // Evaluate all children so every node gets a recorded value
            let values: Vec<bool> = children
                .iter()
                .map(|c| evaluate_node(c, abnormal, out))
                .collect();
            let value = match operator {
                LogicalOperator::And => values.iter().all(|v| *v),
                LogicalOperator::Or => values.iter().any(|v| *v),
                LogicalOperator::Not => !values[0],
            };
            out.insert(name.clone(), value);
            value
        }
    }
}

fn collect_leaves<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
    match node {
        Node::Leaf { name, .. } => out.push(name),
        Node::Branch { children, .. } => {
            for child in children {
                collect_leaves(child, out);
            }
        }
    }
}
