//! Derived network metrics.
//!
//! All figures are computed from degree counts and type tallies, so they depend only on the
//! *set* of shapes and connections, never on input order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::properties::{Connection, ConnectionType, DeviceType, Shape, ShapeId};

/// One entry of the most-connected ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDegree {
    pub id: ShapeId,
    pub name: String,
    pub shape_type: DeviceType,
    pub connections: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    Empty,
    Disconnected,
    Mesh,
    Hybrid,
    Star,
    Bus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopologyPattern {
    None,
    #[serde(rename = "Hub and Spoke")]
    HubAndSpoke,
    Redundant,
    Hierarchical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedundancyLevel {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub total_devices: usize,
    pub total_connections: usize,
    /// Count per device type; types with no shapes are omitted
    pub device_type_distribution: BTreeMap<DeviceType, usize>,
    pub connection_type_distribution: BTreeMap<ConnectionType, usize>,
    pub average_connections_per_device: f64,
    pub network_density: f64,
    pub most_connected: Vec<DeviceDegree>,
    pub isolated: Vec<ShapeId>,
    pub hubs: Vec<ShapeId>,
    pub most_common_device_type: Option<DeviceType>,
    pub network_type: NetworkType,
    pub topology_pattern: TopologyPattern,
    pub redundancy: RedundancyLevel,
    pub healed_connections: usize,
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Compute metrics over shapes whose `connection_count` has already been filled in.
///
/// `shapes` must be sorted by id; the rankings rely on it for their tie-breaks.
pub fn compute(shapes: &[Shape], connections: &[Connection], top_n: usize) -> NetworkMetrics {
    let device_count = shapes.len();
    let connection_count = connections.len();

    let mut device_type_distribution = BTreeMap::new();
    for shape in shapes {
        *device_type_distribution.entry(shape.shape_type).or_insert(0) += 1;
    }
    let mut connection_type_distribution = BTreeMap::new();
    for connection in connections {
        *connection_type_distribution
            .entry(connection.connection_type)
            .or_insert(0) += 1;
    }

    let average = if device_count == 0 {
        0.0
    } else {
        (2 * connection_count) as f64 / device_count as f64
    };
    let density = if device_count < 2 {
        0.0
    } else {
        let possible = (device_count * (device_count - 1)) as f64 / 2.0;
        (connection_count as f64 / possible).clamp(0.0, 1.0)
    };

    let mut ranked: Vec<&Shape> = shapes.iter().filter(|s| s.connection_count > 0).collect();
    // stable sort keeps ascending id among equal counts
    ranked.sort_by(|a, b| b.connection_count.cmp(&a.connection_count));
    let most_connected = ranked
        .iter()
        .take(top_n)
        .map(|s| DeviceDegree {
            id: s.id.clone(),
            name: s.name.clone(),
            shape_type: s.shape_type,
            connections: s.connection_count,
        })
        .collect();

    let isolated = shapes
        .iter()
        .filter(|s| s.connection_count == 0)
        .map(|s| s.id.clone())
        .collect();

    let degrees: Vec<usize> = ranked.iter().map(|s| s.connection_count).collect();
    let mean_degree = if degrees.is_empty() {
        0.0
    } else {
        degrees.iter().sum::<usize>() as f64 / degrees.len() as f64
    };
    let mut hubs: Vec<ShapeId> = ranked
        .iter()
        .filter(|s| s.connection_count as f64 > mean_degree * 2.0)
        .map(|s| s.id.clone())
        .collect();
    hubs.sort();

    // BTreeMap iteration is in type order, so the first maximum wins ties
    let most_common_device_type = device_type_distribution
        .iter()
        .fold(None, |best: Option<(DeviceType, usize)>, (kind, count)| match best {
            Some((_, top)) if top >= *count => best,
            _ => Some((*kind, *count)),
        })
        .map(|(kind, _)| kind);

    NetworkMetrics {
        total_devices: device_count,
        total_connections: connection_count,
        device_type_distribution,
        connection_type_distribution,
        average_connections_per_device: round_to(average, 2),
        network_density: round_to(density, 4),
        most_connected,
        isolated,
        hubs,
        most_common_device_type,
        network_type: network_type(device_count, connection_count, average),
        topology_pattern: topology_pattern(&degrees, mean_degree),
        redundancy: redundancy(device_count, connection_count, average),
        healed_connections: connections.iter().filter(|c| c.healed).count(),
    }
}

fn network_type(devices: usize, connections: usize, average: f64) -> NetworkType {
    if devices == 0 {
        NetworkType::Empty
    } else if connections == 0 {
        NetworkType::Disconnected
    } else if average > 4.0 {
        NetworkType::Mesh
    } else if average > 2.5 {
        NetworkType::Hybrid
    } else if average > 1.5 {
        NetworkType::Star
    } else {
        NetworkType::Bus
    }
}

fn topology_pattern(degrees: &[usize], mean: f64) -> TopologyPattern {
    let Some(max) = degrees.iter().copied().max() else {
        return TopologyPattern::None;
    };
    if max as f64 > mean * 3.0 {
        TopologyPattern::HubAndSpoke
    } else if degrees.iter().all(|d| *d >= 2) {
        TopologyPattern::Redundant
    } else {
        TopologyPattern::Hierarchical
    }
}

fn redundancy(devices: usize, connections: usize, average: f64) -> RedundancyLevel {
    if devices == 0 || connections == 0 {
        RedundancyLevel::None
    } else if average >= 3.0 {
        RedundancyLevel::High
    } else if average >= 2.0 {
        RedundancyLevel::Medium
    } else if average >= 1.5 {
        RedundancyLevel::Low
    } else {
        RedundancyLevel::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_classification() {
        assert_eq!(network_type(0, 0, 0.0), NetworkType::Empty);
        assert_eq!(network_type(3, 0, 0.0), NetworkType::Disconnected);
        assert_eq!(network_type(4, 9, 4.5), NetworkType::Mesh);
        assert_eq!(network_type(4, 6, 3.0), NetworkType::Hybrid);
        assert_eq!(network_type(4, 4, 2.0), NetworkType::Star);
        assert_eq!(network_type(4, 3, 1.5), NetworkType::Bus);

        assert_eq!(redundancy(4, 6, 3.0), RedundancyLevel::High);
        assert_eq!(redundancy(4, 4, 2.0), RedundancyLevel::Medium);
        assert_eq!(redundancy(4, 3, 1.5), RedundancyLevel::Low);
        assert_eq!(redundancy(4, 2, 1.0), RedundancyLevel::None);
    }

    #[test]
    fn test_topology_pattern() {
        assert_eq!(topology_pattern(&[], 0.0), TopologyPattern::None);
        // star: centre 6, six leaves of 1, mean 12/7
        let star = [6, 1, 1, 1, 1, 1, 1];
        assert_eq!(
            topology_pattern(&star, 12.0 / 7.0),
            TopologyPattern::HubAndSpoke
        );
        assert_eq!(topology_pattern(&[2, 2, 2], 2.0), TopologyPattern::Redundant);
        assert_eq!(topology_pattern(&[1, 2, 1], 4.0 / 3.0), TopologyPattern::Hierarchical);
    }

    #[test]
    fn test_pattern_labels_serialize() {
        assert_eq!(
            serde_json::to_string(&TopologyPattern::HubAndSpoke).unwrap(),
            "\"Hub and Spoke\""
        );
        assert_eq!(serde_json::to_string(&NetworkType::Bus).unwrap(), "\"Bus\"");
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_to(4.0 / 3.0, 2), 1.33);
        assert_eq!(round_to(2.0 / 3.0, 4), 0.6667);
    }
}
