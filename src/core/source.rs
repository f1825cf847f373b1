//! Provenance markers with chained validity
//!
//! Every contribution to the duel (an ability instance, an ongoing effect, a
//! sourced value) is attributed to a source. A source is either a root,
//! whose validity is its own flag, or chained to a parent, in which case it
//! is valid only while its own flag is set AND its parent is valid. An
//! effect created by an ability therefore stops being valid as soon as the
//! ability's source is invalidated.
//!
//! Sources live in a [`SourceArena`] and refer to their parent by index, so
//! there are no owning back-references. Parents are normally assigned at
//! creation time (which cannot form a cycle); [`SourceArena::reparent`]
//! checks for cycles explicitly.

use crate::{DuelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a source inside a [`SourceArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(u32);

impl SourceId {
    pub fn new(id: u32) -> Self {
        SourceId(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SourceNode {
    label: String,
    valid: bool,
    parent: Option<SourceId>,
}

/// Arena owning every source of a duel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceArena {
    nodes: Vec<SourceNode>,
}

impl SourceArena {
    pub fn new() -> Self {
        SourceArena { nodes: Vec::new() }
    }

    /// Create a root source, valid until invalidated
    pub fn root(&mut self, label: impl Into<String>) -> SourceId {
        self.push(label.into(), None)
    }

    /// Create a source whose validity also depends on `parent`
    pub fn chained(&mut self, parent: SourceId, label: impl Into<String>) -> Result<SourceId> {
        self.node(parent)?;
        Ok(self.push(label.into(), Some(parent)))
    }

    fn push(&mut self, label: String, parent: Option<SourceId>) -> SourceId {
        let id = SourceId::new(self.nodes.len() as u32);
        self.nodes.push(SourceNode {
            label,
            valid: true,
            parent,
        });
        id
    }

    fn node(&self, id: SourceId) -> Result<&SourceNode> {
        self.nodes
            .get(id.index())
            .ok_or(DuelError::SourceNotFound(id.as_u32()))
    }

    /// Human-readable label given at creation
    pub fn label(&self, id: SourceId) -> Option<&str> {
        self.nodes.get(id.index()).map(|node| node.label.as_str())
    }

    /// Parent of a chained source
    pub fn parent(&self, id: SourceId) -> Option<SourceId> {
        self.nodes.get(id.index()).and_then(|node| node.parent)
    }

    /// Clear the source's own flag. Every source chained below it becomes
    /// invalid too.
    pub fn invalidate(&mut self, id: SourceId) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id.index())
            .ok_or(DuelError::SourceNotFound(id.as_u32()))?;
        node.valid = false;
        Ok(())
    }

    /// Walk the chain up to its root. Unknown ids, dangling parents and
    /// cycles all read as invalid.
    pub fn is_valid(&self, id: SourceId) -> bool {
        let mut current = Some(id);
        let mut steps = 0usize;
        while let Some(cursor) = current {
            let Some(node) = self.nodes.get(cursor.index()) else {
                return false;
            };
            if !node.valid {
                return false;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return false;
            }
            current = node.parent;
        }
        true
    }

    /// Move `child` under `parent` (or make it a root with `None`).
    ///
    /// Fails with [`DuelError::SourceCycle`] if `child` is an ancestor of
    /// `parent` (or the same source).
    pub fn reparent(&mut self, child: SourceId, parent: Option<SourceId>) -> Result<()> {
        self.node(child)?;
        if let Some(parent) = parent {
            self.node(parent)?;
            if self.is_ancestor_or_self(child, parent) {
                return Err(DuelError::SourceCycle {
                    child: child.as_u32(),
                    parent: parent.as_u32(),
                });
            }
        }
        self.nodes[child.index()].parent = parent;
        Ok(())
    }

    /// True if `ancestor` appears on the chain starting at `id`
    fn is_ancestor_or_self(&self, ancestor: SourceId, id: SourceId) -> bool {
        let mut current = Some(id);
        let mut steps = 0usize;
        while let Some(cursor) = current {
            if cursor == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                // Existing cycle; refuse to extend it.
                return true;
            }
            current = self.nodes.get(cursor.index()).and_then(|node| node.parent);
        }
        false
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
