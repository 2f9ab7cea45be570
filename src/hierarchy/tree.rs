use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest slug kept in a node id.
const MAX_SLUG_LEN: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptNode {
    pub id: String,
    pub label: String,
    /// 1 for leaves built from typed text, higher for synthesized concepts.
    pub layer: u32,
    pub content: String,
    pub children: Vec<String>,
    pub parent: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("tree has no nodes")]
    Empty,
    #[error("node id {0} is used twice")]
    DuplicateId(String),
    #[error("node {0} is referenced but doesn't exist")]
    MissingNode(String),
    #[error("expected exactly one root, found {0}")]
    RootCount(usize),
    #[error("{child} lists {parent} as parent, but {parent} doesn't list it as a child")]
    Inconsistent { parent: String, child: String },
    #[error("node {0} is its own ancestor")]
    Cycle(String),
}

/// Serialized form of a tree, a flat list of nodes.
#[derive(Serialize, Deserialize)]
struct TreeSnapshot {
    nodes: Vec<ConceptNode>,
}

/// Snapshot of a concept hierarchy. Nodes keep their insertion order, which is also the order
/// they are persisted in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "TreeSnapshot", try_from = "TreeSnapshot")]
pub struct ConceptTree {
    nodes: Vec<ConceptNode>,
    index: HashMap<String, usize>,
}

impl From<ConceptTree> for TreeSnapshot {
    fn from(tree: ConceptTree) -> Self {
        Self { nodes: tree.nodes }
    }
}

impl TryFrom<TreeSnapshot> for ConceptTree {
    type Error = TreeError;

    fn try_from(snapshot: TreeSnapshot) -> Result<Self, Self::Error> {
        let mut tree = ConceptTree::default();
        for node in snapshot.nodes {
            tree.insert(node)?;
        }
        tree.validate()?;
        Ok(tree)
    }
}

impl ConceptTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[ConceptNode] {
        &self.nodes
    }

    pub fn get(&self, id: &str) -> Option<&ConceptNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut ConceptNode, TreeError> {
        match self.index.get(id) {
            Some(&i) => Ok(&mut self.nodes[i]),
            None => Err(TreeError::MissingNode(id.into())),
        }
    }

    /// The first node without a parent. Only meaningful for a validated tree.
    pub fn root(&self) -> Option<&ConceptNode> {
        self.nodes.iter().find(|n| n.parent.is_none())
    }

    pub fn max_layer(&self) -> u32 {
        self.nodes.iter().map(|n| n.layer).max().unwrap_or(0)
    }

    pub fn insert(&mut self, node: ConceptNode) -> Result<(), TreeError> {
        if self.index.contains_key(&node.id) {
            return Err(TreeError::DuplicateId(node.id));
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Adds a childless, parentless node with an id derived from `label` and returns the id.
    pub fn add_node(&mut self, layer: u32, label: String, content: String) -> String {
        let id = self.unique_id(layer, &label);
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(ConceptNode {
            id: id.clone(),
            label,
            layer,
            content,
            children: vec![],
            parent: None,
        });
        id
    }

    /// Makes `child` a child of `parent`, keeping both sides of the relation in sync.
    pub fn attach(&mut self, parent: &str, child: &str) -> Result<(), TreeError> {
        // Both must exist before anything is modified.
        self.get_mut(parent)?;
        let child_node = self.get_mut(child)?;
        if child_node.parent.is_some() {
            return Err(TreeError::Inconsistent {
                parent: parent.into(),
                child: child.into(),
            });
        }
        child_node.parent = Some(parent.into());
        self.get_mut(parent)?.children.push(child.into());
        Ok(())
    }

    fn unique_id(&self, layer: u32, label: &str) -> String {
        let base = format!("L{layer}_{}", slug(label));
        if !self.index.contains_key(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|id| !self.index.contains_key(id))
            .unwrap_or(base)
    }

    /// Checks the structure: a single root, parent pointers that mirror children lists, and no
    /// cycles.
    pub fn validate(&self) -> Result<(), TreeError> {
        if self.nodes.is_empty() {
            return Err(TreeError::Empty);
        }

        let roots = self.nodes.iter().filter(|n| n.parent.is_none()).count();
        if roots != 1 {
            return Err(TreeError::RootCount(roots));
        }

        for node in &self.nodes {
            if let Some(parent) = &node.parent {
                let parent_node = self
                    .get(parent)
                    .ok_or_else(|| TreeError::MissingNode(parent.clone()))?;
                if !parent_node.children.contains(&node.id) {
                    return Err(TreeError::Inconsistent {
                        parent: parent.clone(),
                        child: node.id.clone(),
                    });
                }
            }
            let mut seen = HashSet::new();
            for child in &node.children {
                let child_node = self
                    .get(child)
                    .ok_or_else(|| TreeError::MissingNode(child.clone()))?;
                if child_node.parent.as_deref() != Some(node.id.as_str()) || !seen.insert(child) {
                    return Err(TreeError::Inconsistent {
                        parent: node.id.clone(),
                        child: child.clone(),
                    });
                }
            }
        }

        for node in &self.nodes {
            let mut current = node.parent.as_deref();
            let mut steps = 0;
            while let Some(id) = current {
                steps += 1;
                if id == node.id || steps > self.nodes.len() {
                    return Err(TreeError::Cycle(node.id.clone()));
                }
                current = self.get(id).and_then(|n| n.parent.as_deref());
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Lowercase ascii-alphanumeric rendering of a label, words separated by `_`.
pub fn slug(label: &str) -> String {
    let mut slug = String::new();
    for c in label.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.chars().count() > MAX_SLUG_LEN {
        slug = slug.chars().take(MAX_SLUG_LEN).collect();
        while slug.ends_with('_') {
            slug.pop();
        }
    }
    if slug.is_empty() {
        slug.push_str("node");
    }
    slug
}
