// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Arena-backed version chains.
//!
//! Both row versions and catalog entries are kept as doubly linked chains
//! ordered newest to oldest. Nodes live in a [`VersionArena`] and are
//! addressed by generation-checked [`NodeId`] handles, so a handle to a
//! reclaimed node is detected instead of dereferenced.
//!
//! Writers populate a node completely with [`VersionArena::insert`] and only
//! then publish it with [`VersionArena::link`]. Readers walk a chain with
//! [`VersionArena::walk`] and never observe a half-built node.

use std::fmt;

/// Generation-checked handle to a node in a [`VersionArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Returns the slot index.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the slot generation this handle was issued for.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Neighbour links of a chain node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainLinks {
    /// The next newer version, `None` for the chain head.
    pub newer: Option<NodeId>,
    /// The next older version, `None` at the chain terminus.
    pub older: Option<NodeId>,
}

/// A node that can be threaded onto a version chain.
pub trait ChainNode {
    /// Stamp of the change this node records (transaction id while
    /// uncommitted, commit sequence afterwards).
    fn stamp(&self) -> u64;

    /// Returns the node's links.
    fn links(&self) -> &ChainLinks;

    /// Returns the node's links for modification.
    fn links_mut(&mut self) -> &mut ChainLinks;
}

/// Structural errors raised by chain operations.
///
/// These indicate a bug in the write path rather than a user error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("node {0} does not exist (stale or reclaimed handle)")]
    DanglingNode(NodeId),

    #[error("node {0} is already linked into a chain")]
    AlreadyLinked(NodeId),

    #[error("node {0} is not the head of its chain")]
    NotHead(NodeId),

    #[error("node {0} has no newer version")]
    NoNewerVersion(NodeId),
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// Slot arena holding the nodes of many chains.
pub struct VersionArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for VersionArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> VersionArena<T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Returns the number of live nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the arena holds no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the node behind a handle, if it is still live.
    pub fn get(&self, id: NodeId) -> Option<&T> {
        match self.slots.get(id.index as usize) {
            Some(Slot::Occupied { generation, value }) if *generation == id.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Returns the node behind a handle for modification.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        match self.slots.get_mut(id.index as usize) {
            Some(Slot::Occupied { generation, value }) if *generation == id.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Like [`get`](Self::get) but reports a dangling handle as an error.
    pub fn node(&self, id: NodeId) -> Result<&T, ChainError> {
        self.get(id).ok_or(ChainError::DanglingNode(id))
    }

    /// Like [`get_mut`](Self::get_mut) but reports a dangling handle as an error.
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut T, ChainError> {
        self.get_mut(id).ok_or(ChainError::DanglingNode(id))
    }

    fn release(&mut self, id: NodeId) -> Result<T, ChainError> {
        let generation = match self.slots.get(id.index as usize) {
            Some(Slot::Occupied { generation, .. }) if *generation == id.generation => *generation,
            _ => return Err(ChainError::DanglingNode(id)),
        };
        let vacant = Slot::Vacant {
            generation: generation.wrapping_add(1),
        };
        match std::mem::replace(&mut self.slots[id.index as usize], vacant) {
            Slot::Occupied { value, .. } => {
                self.free.push(id.index);
                self.len -= 1;
                Ok(value)
            }
            Slot::Vacant { .. } => unreachable!("slot checked occupied above"),
        }
    }
}

impl<T: ChainNode> VersionArena<T> {
    /// Stores a fully populated node. The node is not yet part of any chain.
    pub fn insert(&mut self, value: T) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let generation = match slot {
                Slot::Vacant { generation } => *generation,
                Slot::Occupied { .. } => unreachable!("free list points at occupied slot"),
            };
            *slot = Slot::Occupied { generation, value };
            NodeId { index, generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot::Occupied {
                generation: 0,
                value,
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Publishes `newer` as the new head above `older`.
    ///
    /// `newer` must be unlinked and `older`, when given, must be the current
    /// head of its chain.
    pub fn link(&mut self, newer: NodeId, older: Option<NodeId>) -> Result<(), ChainError> {
        let links = *self.node(newer)?.links();
        if links.newer.is_some() || links.older.is_some() {
            return Err(ChainError::AlreadyLinked(newer));
        }
        if let Some(older) = older {
            if older == newer {
                return Err(ChainError::AlreadyLinked(newer));
            }
            let older_node = self.node_mut(older)?;
            if older_node.links().newer.is_some() {
                return Err(ChainError::NotHead(older));
            }
            older_node.links_mut().newer = Some(newer);
        }
        self.node_mut(newer)?.links_mut().older = older;
        Ok(())
    }

    /// Splices a node out of its chain and frees its slot.
    ///
    /// The node's newer and older neighbours are joined. The caller is
    /// responsible for moving its head pointer when the removed node had no
    /// newer neighbour.
    pub fn unlink(&mut self, id: NodeId) -> Result<T, ChainError> {
        let links = *self.node(id)?.links();
        if let Some(newer) = links.newer {
            self.node_mut(newer)?.links_mut().older = links.older;
        }
        if let Some(older) = links.older {
            self.node_mut(older)?.links_mut().newer = links.newer;
        }
        self.release(id)
    }

    /// Iterates a chain from `head` towards its oldest node.
    pub fn walk(&self, head: Option<NodeId>) -> ChainIter<'_, T> {
        ChainIter {
            arena: self,
            next: head,
        }
    }

    /// Returns the number of nodes reachable from `head`.
    pub fn chain_len(&self, head: Option<NodeId>) -> usize {
        self.walk(head).count()
    }
}

/// Iterator over a chain, newest to oldest.
pub struct ChainIter<'a, T> {
    arena: &'a VersionArena<T>,
    next: Option<NodeId>,
}

impl<'a, T: ChainNode> Iterator for ChainIter<'a, T> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let node = self.arena.get(id)?;
        self.next = node.links().older;
        Some((id, node))
    }
}
