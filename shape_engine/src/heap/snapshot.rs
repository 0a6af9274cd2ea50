// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Heap snapshot reporting.
//!
//! A snapshot is a graph of nodes, one per heap cell, connected by named
//! edges. Nodes are reported in two steps: first the out-of-line cells owned
//! by a shape (property map, transition table) as leaf nodes, then the shape
//! itself with its outgoing edges.

use super::{CellKind, Heap};
use crate::shape::ObjectShape;

/// Stable identity of a snapshot node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn of(shape: ObjectShape, kind: CellKind) -> Self {
        let tag = match kind {
            CellKind::HiddenClass => 1,
            CellKind::DictPropertyMap => 2,
            CellKind::TransitionTable => 3,
        };
        Self(shape.get_index() as u64 * 4 + tag)
    }
}

/// Receiver of heap snapshot nodes and edges.
pub trait HeapSnapshot {
    /// Start a new node. Edges added until the matching
    /// [`end_node`](HeapSnapshot::end_node) originate from it.
    fn begin_node(&mut self);

    /// Add an edge from the current node to `target`.
    fn add_named_edge(&mut self, name: &'static str, target: NodeId);

    /// Finish the current node.
    fn end_node(&mut self, kind: CellKind, name: &str, id: NodeId, self_size: usize);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEdge {
    pub name: &'static str,
    pub target: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotNode {
    pub kind: CellKind,
    pub name: String,
    pub id: NodeId,
    pub self_size: usize,
    pub edges: Vec<SnapshotEdge>,
}

/// [`HeapSnapshot`] that keeps every reported node in memory.
#[derive(Debug, Default)]
pub struct RecordingSnapshot {
    nodes: Vec<SnapshotNode>,
    pending_edges: Vec<SnapshotEdge>,
    open: bool,
}

impl RecordingSnapshot {
    pub fn nodes(&self) -> &[SnapshotNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&SnapshotNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Find the node reported for a shape.
    pub fn shape_node(&self, shape: ObjectShape) -> Option<&SnapshotNode> {
        self.node(NodeId::of(shape, CellKind::HiddenClass))
    }

    /// Follow the edge called `name` out of `node`.
    pub fn edge_target(&self, node: &SnapshotNode, name: &str) -> Option<&SnapshotNode> {
        let edge = node.edges.iter().find(|edge| edge.name == name)?;
        self.node(edge.target)
    }
}

impl HeapSnapshot for RecordingSnapshot {
    fn begin_node(&mut self) {
        debug_assert!(!self.open, "Snapshot nodes cannot nest");
        self.open = true;
    }

    fn add_named_edge(&mut self, name: &'static str, target: NodeId) {
        debug_assert!(self.open, "Snapshot edge outside of a node");
        self.pending_edges.push(SnapshotEdge { name, target });
    }

    fn end_node(&mut self, kind: CellKind, name: &str, id: NodeId, self_size: usize) {
        debug_assert!(self.open, "Unbalanced snapshot end_node");
        self.open = false;
        self.nodes.push(SnapshotNode {
            kind,
            name: name.to_owned(),
            id,
            self_size,
            edges: core::mem::take(&mut self.pending_edges),
        });
    }
}

impl Heap {
    /// Report every live shape and the cells it owns to `snapshot`.
    pub fn take_snapshot(&self, snapshot: &mut impl HeapSnapshot) {
        for (index, record) in self.shapes.iter().enumerate() {
            let Some(record) = record else {
                continue;
            };
            let shape = ObjectShape::from_index(index);
            record.snapshot_add_nodes(shape, snapshot);
            snapshot.begin_node();
            record.snapshot_add_edges(shape, snapshot);
            snapshot.end_node(
                CellKind::HiddenClass,
                record.snapshot_name(),
                NodeId::of(shape, CellKind::HiddenClass),
                core::mem::size_of_val(record),
            );
        }
    }
}
