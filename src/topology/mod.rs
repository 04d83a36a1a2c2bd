//! # Topology Assembly
//!
//! Aggregates classified shapes and mapped connections into a single [`Topology`] and derives
//! its metrics, segments and device inventory.
//!
//! ## Determinism
//!
//! [`assemble`] sorts shapes and connections by id before computing anything, and every
//! derived collection is ordered by a total key. Two calls with the same sets of shapes and
//! connections therefore serialize to identical bytes, whatever order the pages were read in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    codec::{
        archive::DocumentMetadata,
        diagnostic::UnresolvedConnection,
        resolve::{self, DeviceProfile},
    },
    config::TopologyConfig,
    properties::{Connection, Shape, ShapeId},
};

pub mod metrics;
pub mod segments;

pub use metrics::{DeviceDegree, NetworkMetrics, NetworkType, RedundancyLevel, TopologyPattern};
pub use segments::Segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyOptions {
    /// Length of the most-connected ranking
    pub top_n: usize,
}

impl Default for TopologyOptions {
    fn default() -> Self {
        TopologyConfig::default().into()
    }
}

impl From<TopologyConfig> for TopologyOptions {
    fn from(config: TopologyConfig) -> Self {
        TopologyOptions {
            top_n: config.top_n,
        }
    }
}

/// The assembled network model of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub shapes: Vec<Shape>,
    pub connections: Vec<Connection>,
    pub metadata: DocumentMetadata,
    pub page_count: usize,
    pub metrics: NetworkMetrics,
    pub segments: Vec<Segment>,
    pub inventory: Vec<DeviceProfile>,
}

impl Topology {
    pub fn shape(&self, id: &ShapeId) -> Option<&Shape> {
        self.shapes
            .binary_search_by(|shape| shape.id.cmp(id))
            .ok()
            .map(|i| &self.shapes[i])
    }
}

/// The JSON document stored for a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseArtifact {
    pub filename: String,
    #[serde(flatten)]
    pub topology: Topology,
    pub unresolved_connections: Vec<UnresolvedConnection>,
}

impl ParseArtifact {
    pub fn new(
        filename: impl Into<String>,
        topology: Topology,
        mut unresolved_connections: Vec<UnresolvedConnection>,
    ) -> Self {
        unresolved_connections.sort_by(|a, b| a.connector_id.cmp(&b.connector_id));
        ParseArtifact {
            filename: filename.into(),
            topology,
            unresolved_connections,
        }
    }
}

/// Build the topology and compute its derived data.
///
/// # Arguments
///
/// * `shapes` - classified shapes, in any order
/// * `connections` - mapped connections whose endpoints name shapes in `shapes`
/// * `metadata` - document properties from the archive
/// * `page_count` - number of pages read
/// * `options` - ranking parameters
pub fn assemble(
    mut shapes: Vec<Shape>,
    mut connections: Vec<Connection>,
    metadata: DocumentMetadata,
    page_count: usize,
    options: &TopologyOptions,
) -> Topology {
    shapes.sort_by(|a, b| a.id.cmp(&b.id));
    connections.sort_by(|a, b| {
        a.id.cmp(&b.id)
            .then_with(|| a.source_id.cmp(&b.source_id))
            .then_with(|| a.target_id.cmp(&b.target_id))
    });

    let mut degree: HashMap<&ShapeId, usize> = HashMap::new();
    for connection in &connections {
        // a self-loop contributes to both ends
        *degree.entry(&connection.source_id).or_default() += 1;
        *degree.entry(&connection.target_id).or_default() += 1;
    }
    for shape in shapes.iter_mut() {
        shape.connection_count = degree.get(&shape.id).copied().unwrap_or(0);
    }

    let metrics = metrics::compute(&shapes, &connections, options.top_n);
    let segments = segments::cluster(&shapes, &connections);
    let inventory = resolve::inventory(&shapes);
    tracing::info!(
        "Assembled topology: {} shapes, {} connections, {} segments",
        shapes.len(),
        connections.len(),
        segments.len()
    );

    Topology {
        shapes,
        connections,
        metadata,
        page_count,
        metrics,
        segments,
        inventory,
    }
}
