// Content trees: the block structure of one branch of a course or library.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field holding a course's Canvas course id on the root block.
pub const CANVAS_COURSE_ID_FIELD: &str = "canvas_course_id";
/// Field marking a subsection as graded.
pub const GRADED_FIELD: &str = "graded";
/// Field holding a block's due date (RFC 3339).
pub const DUE_FIELD: &str = "due";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Draft,
    Published,
}

impl Branch {
    pub const ALL: [Branch; 2] = [Branch::Draft, Branch::Published];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Branch {
    type Err = ContentTreeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            other => Err(ContentTreeError::UnknownBranch(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentTreeError {
    #[error("unknown branch `{0}`")]
    UnknownBranch(String),
    #[error("root block `{0}` is not part of the tree")]
    MissingRoot(String),
    #[error("block `{parent}` lists unknown child `{child}`")]
    MissingChild { parent: String, child: String },
    #[error("block `{0}` is keyed under a different id")]
    MismatchedId(String),
    #[error("block `{0}` is reachable more than once")]
    Cycle(String),
    #[error("block {field} `{value}` must be a plain name (no path separators, NUL or leading dot)")]
    UnsafeName { field: &'static str, value: String },
}

/// Block types and ids become file and directory names on export. A safe
/// segment is non-empty, does not start with `.`, and has no slash, backslash or NUL.
pub fn is_safe_path_segment(value: &str) -> bool {
    !value.is_empty() && !value.starts_with('.') && !value.contains(['/', '\\', '\0'])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub block_type: String,
    pub block_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Child block ids, in display order.
    #[serde(default)]
    pub children: Vec<String>,
}

impl ContentBlock {
    pub fn new(block_type: &str, block_id: &str, display_name: &str) -> Self {
        Self {
            block_type: block_type.to_string(),
            block_id: block_id.to_string(),
            display_name: display_name.to_string(),
            fields: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn with_children<S: AsRef<str>>(mut self, children: &[S]) -> Self {
        self.children = children.iter().map(|child| child.as_ref().to_string()).collect();
        self
    }

    pub fn is_graded(&self) -> bool {
        self.fields.get(GRADED_FIELD).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Block ids are local to the tree; the owning content key is implied by
/// where the tree is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTree {
    pub root: String,
    pub blocks: BTreeMap<String, ContentBlock>,
}

impl ContentTree {
    pub fn from_blocks(root: &str, blocks: impl IntoIterator<Item = ContentBlock>) -> Self {
        Self {
            root: root.to_string(),
            blocks: blocks.into_iter().map(|block| (block.block_id.clone(), block)).collect(),
        }
    }

    pub fn root_block(&self) -> Option<&ContentBlock> {
        self.blocks.get(&self.root)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Root plus every child reference resolves, no block is reached twice,
    /// and every block type and id is usable as a file name.
    pub fn validate(&self) -> Result<(), ContentTreeError> {
        if !self.blocks.contains_key(&self.root) {
            return Err(ContentTreeError::MissingRoot(self.root.clone()));
        }
        for (id, block) in &self.blocks {
            if *id != block.block_id {
                return Err(ContentTreeError::MismatchedId(id.clone()));
            }
            for (field, value) in [("type", &block.block_type), ("id", &block.block_id)] {
                if !is_safe_path_segment(value) {
                    return Err(ContentTreeError::UnsafeName { field, value: value.clone() });
                }
            }
            for child in &block.children {
                if !self.blocks.contains_key(child) {
                    return Err(ContentTreeError::MissingChild {
                        parent: id.clone(),
                        child: child.clone(),
                    });
                }
            }
        }

        let mut seen = BTreeSet::new();
        let mut stack = vec![self.root.as_str()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                return Err(ContentTreeError::Cycle(id.to_string()));
            }
            if let Some(block) = self.blocks.get(id) {
                stack.extend(block.children.iter().rev().map(String::as_str));
            }
        }
        Ok(())
    }

    /// Blocks reachable from the root, depth first in display order.
    pub fn walk(&self) -> Vec<&ContentBlock> {
        let mut ordered = Vec::with_capacity(self.blocks.len());
        let mut seen = BTreeSet::new();
        let mut stack = vec![self.root.as_str()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(block) = self.blocks.get(id) {
                ordered.push(block);
                stack.extend(block.children.iter().rev().map(String::as_str));
            }
        }
        ordered
    }

    /// Graded subsections in course order.
    pub fn graded_subsections(&self) -> Vec<&ContentBlock> {
        self.walk()
            .into_iter()
            .filter(|block| block.block_type == "sequential" && block.is_graded())
            .collect()
    }

    pub fn canvas_course_id(&self) -> Option<String> {
        let value = self.root_block()?.fields.get(CANVAS_COURSE_ID_FIELD)?;
        match value {
            Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}
