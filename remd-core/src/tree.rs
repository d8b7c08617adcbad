//! Hierarchical tree built from the flat list of retrieved files.
//!
//! Children are kept in a `BTreeMap`, so names are already in lexicographic
//! (byte) order; [`TreeNode::children`] yields directories before files.

use std::collections::BTreeMap;

use crate::contract::RetrievedFile;
use crate::error::ConvertError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeNode {
    pub name: String,
    children: BTreeMap<String, TreeNode>,
    file: Option<RetrievedFile>,
}

impl TreeNode {
    fn directory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn is_file(&self) -> bool {
        self.file.is_some()
    }

    pub fn file(&self) -> Option<&RetrievedFile> {
        self.file.as_ref()
    }

    /// Directories first, then files; each group in lexicographic order.
    pub fn children(&self) -> impl Iterator<Item = &TreeNode> {
        let dirs = self.children.values().filter(|c| !c.is_file());
        let files = self.children.values().filter(|c| c.is_file());
        dirs.chain(files)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// All files below this node in diagram order (depth-first).
    pub fn files(&self) -> Vec<&RetrievedFile> {
        let mut out = Vec::new();
        self.collect_files(&mut out);
        out
    }

    fn collect_files<'a>(&'a self, out: &mut Vec<&'a RetrievedFile>) {
        for child in self.children() {
            match &child.file {
                Some(file) => out.push(file),
                None => child.collect_files(out),
            }
        }
    }
}

/// Build the root node. A path used both as a file and as a directory prefix,
/// or listed twice, is a [`ConvertError::TreeConflict`].
pub fn build(files: Vec<RetrievedFile>) -> Result<TreeNode, ConvertError> {
    let mut root = TreeNode::directory("");
    for file in files {
        insert(&mut root, file)?;
    }
    Ok(root)
}

fn insert(root: &mut TreeNode, file: RetrievedFile) -> Result<(), ConvertError> {
    let path = file.path().to_string();
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let Some((leaf, dirs)) = parts.split_last() else {
        return Err(ConvertError::TreeConflict(path));
    };

    let mut node = root;
    for (depth, dir) in dirs.iter().enumerate() {
        node = node
            .children
            .entry((*dir).to_string())
            .or_insert_with(|| TreeNode::directory(dir));
        if node.is_file() {
            return Err(ConvertError::TreeConflict(parts[..=depth].join("/")));
        }
    }

    if node.children.contains_key(*leaf) {
        return Err(ConvertError::TreeConflict(path));
    }
    node.children.insert(
        (*leaf).to_string(),
        TreeNode {
            name: (*leaf).to_string(),
            children: BTreeMap::new(),
            file: Some(file),
        },
    );
    Ok(())
}
