//! Depth-first flattening of the collection tree.
//!
//! Traversal uses an explicit stack so that arbitrarily deep documents cannot
//! exhaust the call stack. Children are visited in declared order and each
//! request is tagged with the `/`-joined names of its ancestor folders.

use super::{Collection, Node, RequestItem};
use log::warn;

/// A request template together with its folder path.
#[derive(Debug, Clone, Copy)]
pub struct FlatRequest<'a> {
    /// `/`-joined ancestor folder names, empty at the root.
    pub folder: &'a str,

    /// The request node.
    pub item: &'a RequestItem,
}

/// Flattens the collection into its requests in traversal order.
///
/// Folders without children contribute nothing. Nodes that are neither folders
/// nor requests are skipped with a warning.
///
/// # Returns
///
/// The requests as `(folder, request)` pairs. Folder paths are owned by the
/// returned [`FlattenedCollection`] so the pairs can borrow them.
pub fn flatten(collection: &Collection) -> FlattenedCollection<'_> {
    let mut folders: Vec<String> = vec![String::new()];
    let mut entries: Vec<(usize, &RequestItem)> = Vec::new();

    // (index into `folders`, node); pushed in reverse so pops keep declared order
    let mut stack: Vec<(usize, &Node)> = collection.item.iter().rev().map(|n| (0, n)).collect();

    while let Some((folder_index, node)) = stack.pop() {
        match node {
            Node::Folder(folder) => {
                if folder.item.is_empty() {
                    continue;
                }
                let parent = &folders[folder_index];
                let path = match (parent.is_empty(), folder.name.is_empty()) {
                    (_, true) => parent.clone(),
                    (true, false) => folder.name.clone(),
                    (false, false) => format!("{}/{}", parent, folder.name),
                };
                folders.push(path);
                let child_index = folders.len() - 1;
                stack.extend(folder.item.iter().rev().map(|child| (child_index, child)));
            }
            Node::Request(item) => entries.push((folder_index, item)),
            Node::Unknown(value) => {
                let name = value
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or("<unnamed>");
                warn!("Skipping collection node '{}': neither folder nor request", name);
            }
        }
    }

    FlattenedCollection { folders, entries }
}

/// Result of [`flatten`]; owns the folder path strings.
#[derive(Debug)]
pub struct FlattenedCollection<'a> {
    folders: Vec<String>,
    entries: Vec<(usize, &'a RequestItem)>,
}

impl<'a> FlattenedCollection<'a> {
    /// Number of requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the collection holds no requests.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the requests in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = FlatRequest<'_>> + '_ {
        self.entries.iter().map(|(index, item)| FlatRequest {
            folder: self.folders[*index].as_str(),
            item,
        })
    }
}
