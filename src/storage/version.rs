// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Row version nodes.
//!
//! A table keeps the newest values of every row in its base slot. Each
//! change pushes a [`VersionNode`] holding the row's image from *before* the
//! change, stamped with the changing transaction. A node's image is therefore
//! valid from the stamp of its older neighbour (or forever, at the terminus)
//! up to its own stamp.

use crate::txn::Snapshot;

use super::chain::{ChainError, ChainLinks, ChainNode, NodeId, VersionArena};
use super::{Row, RowId};

/// Kind of change that superseded a node's image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Row image preserved by a version node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowImage {
    /// The row did not exist yet.
    Absent,
    /// The row held these values.
    Values(Row),
    /// The row was live with the values still held by the base slot.
    Live,
}

/// One superseded version of a row.
#[derive(Debug)]
pub struct VersionNode {
    pub(crate) row_id: RowId,
    pub(crate) stamp: u64,
    pub(crate) kind: ChangeKind,
    pub(crate) image: RowImage,
    pub(crate) links: ChainLinks,
}

impl VersionNode {
    pub(crate) fn new(row_id: RowId, stamp: u64, kind: ChangeKind, image: RowImage) -> Self {
        Self {
            row_id,
            stamp,
            kind,
            image,
            links: ChainLinks::default(),
        }
    }

    /// Returns the row this node belongs to.
    #[inline]
    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    /// Returns the kind of change that superseded this image.
    #[inline]
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// Returns the preserved image.
    #[inline]
    pub fn image(&self) -> &RowImage {
        &self.image
    }
}

impl ChainNode for VersionNode {
    #[inline]
    fn stamp(&self) -> u64 {
        self.stamp
    }

    #[inline]
    fn links(&self) -> &ChainLinks {
        &self.links
    }

    #[inline]
    fn links_mut(&mut self) -> &mut ChainLinks {
        &mut self.links
    }
}

/// Version of a row selected for a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibleVersion {
    /// The base slot holds the visible version.
    Base,
    /// The image held by this node is visible.
    Node(NodeId),
}

/// Finds the version of a row visible to `snapshot`.
///
/// Walks from `head` towards the base. If the newest change is visible the
/// base slot is the answer. Otherwise the answer is the first node whose own
/// stamp is invisible and whose older neighbour's stamp is visible (or which
/// has no older neighbour).
pub fn find_visible(
    arena: &VersionArena<VersionNode>,
    head: Option<NodeId>,
    snapshot: &Snapshot,
) -> Result<VisibleVersion, ChainError> {
    let Some(mut current) = head else {
        return Ok(VisibleVersion::Base);
    };
    if snapshot.sees(arena.node(current)?.stamp) {
        return Ok(VisibleVersion::Base);
    }
    loop {
        match arena.node(current)?.links.older {
            None => return Ok(VisibleVersion::Node(current)),
            Some(older) => {
                if snapshot.sees(arena.node(older)?.stamp) {
                    return Ok(VisibleVersion::Node(current));
                }
                current = older;
            }
        }
    }
}

/// Materializes a visible version into row values.
///
/// `base` and `deleted` describe the row's base slot.
pub fn resolve<'a>(
    arena: &'a VersionArena<VersionNode>,
    visible: VisibleVersion,
    base: &'a Row,
    deleted: bool,
) -> Result<Option<&'a Row>, ChainError> {
    match visible {
        VisibleVersion::Base => Ok((!deleted).then_some(base)),
        VisibleVersion::Node(id) => Ok(match &arena.node(id)?.image {
            RowImage::Absent => None,
            RowImage::Values(row) => Some(row),
            RowImage::Live => Some(base),
        }),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::storage::Value;
    use crate::txn::{TxnId, TXN_ID_START};
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Update(i64),
        Delete,
        Reinsert(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<i64>().prop_map(Op::Update),
            Just(Op::Delete),
            any::<i64>().prop_map(Op::Reinsert),
        ]
    }

    proptest! {
        /// Every snapshot resolves to the state produced by the last change
        /// committed before it.
        #[test]
        fn visible_version_matches_history(
            first in any::<i64>(),
            ops in prop::collection::vec(op_strategy(), 0..12),
            start in 0u64..200,
        ) {
            let mut arena = VersionArena::new();
            let mut head: Option<NodeId> = None;
            let mut base = Row::new(vec![Value::from(first)]);
            let mut deleted = false;
            // history[i] = (stamp, state after change)
            let mut history: Vec<(u64, Option<Row>)> = Vec::new();

            let mut push = |arena: &mut VersionArena<VersionNode>, stamp, kind, image| {
                let id = arena.insert(VersionNode::new(RowId(0), stamp, kind, image));
                arena.link(id, head).unwrap();
                head = Some(id);
            };

            push(&mut arena, 10, ChangeKind::Insert, RowImage::Absent);
            history.push((10, Some(base.clone())));

            for (i, op) in ops.iter().enumerate() {
                let stamp = 20 + 10 * i as u64;
                match *op {
                    Op::Update(v) if !deleted => {
                        push(&mut arena, stamp, ChangeKind::Update, RowImage::Values(base.clone()));
                        base = Row::new(vec![Value::from(v)]);
                    }
                    Op::Delete if !deleted => {
                        push(&mut arena, stamp, ChangeKind::Delete, RowImage::Live);
                        deleted = true;
                    }
                    Op::Reinsert(v) if deleted => {
                        push(&mut arena, stamp, ChangeKind::Update, RowImage::Absent);
                        base = Row::new(vec![Value::from(v)]);
                        deleted = false;
                    }
                    _ => continue,
                }
                history.push((stamp, (!deleted).then(|| base.clone())));
            }

            let expected = history
                .iter()
                .rev()
                .find(|(stamp, _)| *stamp < start)
                .and_then(|(_, state)| state.clone());

            let snapshot = Snapshot::new(start, TxnId(TXN_ID_START + 7));
            let visible = find_visible(&arena, head, &snapshot).unwrap();
            let actual = resolve(&arena, visible, &base, deleted).unwrap().cloned();
            prop_assert_eq!(actual, expected);
        }
    }
}
