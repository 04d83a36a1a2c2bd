//! Connected-component clustering of the physical topology.

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::properties::{Connection, Shape, ShapeId};

/// A set of shapes joined by physical links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// 1-based, in order of each segment's smallest shape id
    pub id: usize,
    pub shape_ids: Vec<ShapeId>,
    pub device_count: usize,
    /// Links with both ends inside this segment
    pub internal_connections: usize,
    /// Overlay links reaching another segment
    pub external_connections: usize,
}

/// Partition `shapes` (sorted by id) into segments.
///
/// Only physical links feed the union-find, so two sites joined solely by a VPN or tunnel
/// stay separate segments. Overlay links never merge; they count as
/// internal when both ends already share a segment and as external on both sides otherwise.
pub fn cluster(shapes: &[Shape], connections: &[Connection]) -> Vec<Segment> {
    let index: HashMap<&ShapeId, usize> = shapes
        .iter()
        .enumerate()
        .map(|(i, shape)| (&shape.id, i))
        .collect();
    let endpoints = |c: &Connection| {
        index
            .get(&c.source_id)
            .copied()
            .zip(index.get(&c.target_id).copied())
    };

    let mut sets = UnionFind::<usize>::new(shapes.len());
    for connection in connections.iter().filter(|c| !c.connection_type.is_overlay()) {
        if let Some((a, b)) = endpoints(connection) {
            sets.union(a, b);
        }
    }

    // Shapes are visited in id order, so the first member seen is the smallest.
    let mut segment_of_root: BTreeMap<usize, usize> = BTreeMap::new();
    let mut segments: Vec<Segment> = Vec::new();
    let mut segment_of_shape = vec![0; shapes.len()];
    for (i, shape) in shapes.iter().enumerate() {
        let root = sets.find(i);
        let slot = *segment_of_root.entry(root).or_insert_with(|| {
            segments.push(Segment {
                id: segments.len() + 1,
                shape_ids: Vec::new(),
                device_count: 0,
                internal_connections: 0,
                external_connections: 0,
            });
            segments.len() - 1
        });
        segments[slot].shape_ids.push(shape.id.clone());
        segments[slot].device_count += 1;
        segment_of_shape[i] = slot;
    }

    for connection in connections {
        let Some((a, b)) = endpoints(connection) else {
            continue;
        };
        let (left, right) = (segment_of_shape[a], segment_of_shape[b]);
        if left == right {
            segments[left].internal_connections += 1;
        } else {
            segments[left].external_connections += 1;
            segments[right].external_connections += 1;
        }
    }

    tracing::debug!(
        "Clustered {} shapes into {} segments",
        shapes.len(),
        segments.len()
    );
    segments
}
