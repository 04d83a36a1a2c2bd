//! Connection mapping and geometric endpoint healing.
//!
//! Every connector endpoint is first resolved by reference against the set of shape ids. An
//! endpoint whose reference is absent, names a group container, or names nothing known is
//! repaired by snapping its coordinate to the nearest shape centroid on the same page, within
//! `radius_factor` times the page's median shape size. Members of a referenced group are tried
//! before the rest of the page.

use std::collections::{BTreeMap, HashMap};

use crate::{
    codec::{
        classify::Classifier,
        custom_props::{apply_connection_defaults, extract},
        diagnostic::{Endpoint, EndpointStatus, ParseDiagnostic, UnresolvedConnection, UnresolvedReason},
    },
    properties::{Connection, GroupShape, Point, RawConnector, Shape, ShapeId},
};

#[derive(Debug, Clone, PartialEq)]
pub struct HealingOptions {
    pub radius_factor: f64,
    /// Fill missing bandwidth/media properties on emitted connections
    pub enrich_defaults: bool,
}

impl Default for HealingOptions {
    fn default() -> Self {
        HealingOptions {
            radius_factor: 1.5,
            enrich_defaults: false,
        }
    }
}

/// Result of mapping every connector of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionMap {
    pub connections: Vec<Connection>,
    pub unresolved: Vec<UnresolvedConnection>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ConnectionMap {
    pub fn healed_count(&self) -> usize {
        self.connections.iter().filter(|c| c.healed).count()
    }
}

/// Median of `values`, or `None` when empty. `values` is sorted in place.
fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Lookup structure over the classified shapes of one document.
pub struct ShapeIndex<'a> {
    by_id: HashMap<&'a ShapeId, &'a Shape>,
    by_page: BTreeMap<usize, Vec<&'a Shape>>,
    radius: BTreeMap<usize, f64>,
    groups: HashMap<&'a ShapeId, &'a GroupShape>,
}

impl<'a> ShapeIndex<'a> {
    pub fn new(shapes: &'a [Shape], groups: &'a [GroupShape], radius_factor: f64) -> Self {
        let mut by_page: BTreeMap<usize, Vec<&'a Shape>> = BTreeMap::new();
        for shape in shapes {
            by_page.entry(shape.page).or_default().push(shape);
        }
        let radius = by_page
            .iter()
            .map(|(page, shapes)| {
                let mut sizes: Vec<f64> = shapes
                    .iter()
                    .map(|s| s.size())
                    .filter(|s| *s > 0.0)
                    .collect();
                let r = median(&mut sizes).unwrap_or(0.0) * radius_factor;
                (*page, r)
            })
            .collect();
        ShapeIndex {
            by_id: shapes.iter().map(|s| (&s.id, s)).collect(),
            by_page,
            radius,
            groups: groups.iter().map(|g| (&g.id, g)).collect(),
        }
    }

    pub fn contains(&self, id: &ShapeId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Healing radius for `page`; zero when the page has no sized shapes.
    pub fn radius(&self, page: usize) -> f64 {
        self.radius.get(&page).copied().unwrap_or(0.0)
    }

    /// Nearest shape to `point` among `candidates`, within `limit` when given.
    /// Equal distances resolve to the smaller shape id.
    fn nearest<I>(candidates: I, point: &Point, limit: Option<f64>) -> Option<(&'a Shape, f64)>
    where
        I: IntoIterator<Item = &'a Shape>,
    {
        candidates
            .into_iter()
            .map(|s| (s, s.center().distance(point)))
            .filter(|(_, d)| limit.map(|r| *d <= r).unwrap_or(true))
            .min_by(|(a, da), (b, db)| da.total_cmp(db).then_with(|| a.id.cmp(&b.id)))
    }

    /// Nearest shape on `page` within the healing radius.
    pub fn nearest_on_page(&self, page: usize, point: &Point) -> Option<(&'a Shape, f64)> {
        let shapes = self.by_page.get(&page)?;
        Self::nearest(shapes.iter().copied(), point, Some(self.radius(page)))
    }

    /// Resolve one end of `connector`.
    pub fn resolve(&self, connector: &RawConnector, end: Endpoint) -> EndpointStatus {
        let (reference, point) = match end {
            Endpoint::Source => (connector.source.as_ref(), connector.begin),
            Endpoint::Target => (connector.target.as_ref(), connector.end),
        };
        if let Some(id) = reference.filter(|id| self.contains(id)) {
            return EndpointStatus::Direct {
                shape_id: id.clone(),
            };
        }

        if let Some(group) = reference.and_then(|id| self.groups.get(id)) {
            let members = group.members.iter().filter_map(|m| self.by_id.get(m).copied());
            let anchor = point.unwrap_or(group.bounds.center);
            if let Some((shape, distance)) = Self::nearest(members, &anchor, None) {
                return EndpointStatus::Healed {
                    shape_id: shape.id.clone(),
                    distance,
                };
            }
        }

        let Some(point) = point else {
            return EndpointStatus::Unresolved {
                reason: UnresolvedReason::NoGeometry {
                    reference: reference.cloned(),
                },
            };
        };
        match self.nearest_on_page(connector.page, &point) {
            Some((shape, distance)) => EndpointStatus::Healed {
                shape_id: shape.id.clone(),
                distance,
            },
            None => EndpointStatus::Unresolved {
                reason: UnresolvedReason::NoCandidateInRadius {
                    radius: self.radius(connector.page),
                    reference: reference.cloned(),
                },
            },
        }
    }
}

/// Resolve every connector against `shapes`.
///
/// # Arguments
///
/// * `connectors` - Raw connectors of all pages, in document order
/// * `shapes` - The complete, classified shape set; healing only starts once it is final
/// * `groups` - Group containers, whose members are preferred when a group is referenced
/// * `classifier` - Connection keyword table
/// * `options` - Healing radius factor and default enrichment
///
/// # Returns
///
/// Connections in connector order, unresolved connectors, and per-endpoint diagnostics.
pub fn map(
    connectors: &[RawConnector],
    shapes: &[Shape],
    groups: &[GroupShape],
    classifier: &Classifier,
    options: &HealingOptions,
) -> ConnectionMap {
    let index = ShapeIndex::new(shapes, groups, options.radius_factor);
    let mut result = ConnectionMap::default();

    for connector in connectors {
        let source = index.resolve(connector, Endpoint::Source);
        let target = index.resolve(connector, Endpoint::Target);

        for (end, status) in [(Endpoint::Source, &source), (Endpoint::Target, &target)] {
            if let EndpointStatus::Healed { shape_id, distance } = status {
                tracing::debug!(
                    "Healed {end} of connector {} to shape {shape_id} ({distance:.3})",
                    connector.id
                );
                result.diagnostics.push(ParseDiagnostic::HealedEndpoint {
                    connector_id: connector.id.clone(),
                    end,
                    shape_id: shape_id.clone(),
                    distance: *distance,
                });
            }
        }

        let resolved = source.shape_id().cloned().zip(target.shape_id().cloned());
        let Some((source_id, target_id)) = resolved else {
            let unresolved = UnresolvedConnection {
                connector_id: connector.id.clone(),
                page: connector.page,
                label: connector.text.clone(),
                source,
                target,
            };
            tracing::warn!(
                "Connector {} on page {} left unresolved",
                connector.id,
                connector.page
            );
            result
                .diagnostics
                .push(ParseDiagnostic::UnresolvedConnection(unresolved.clone()));
            result.unresolved.push(unresolved);
            continue;
        };

        let mut properties = extract(&connector.rows);
        if !connector.text.is_empty() {
            properties
                .entry("label".to_string())
                .or_insert_with(|| connector.text.clone());
        }
        let connection_type = classifier.classify_connection(&connector.text, &properties);
        if options.enrich_defaults {
            apply_connection_defaults(&mut properties, connection_type);
        }
        let connection = Connection {
            id: connector.id.clone(),
            source_id,
            target_id,
            connection_type,
            properties,
            healed: source.is_healed() || target.is_healed(),
        };
        if connection.is_self_loop() {
            result.diagnostics.push(ParseDiagnostic::warning(format!(
                "Connector {} joins shape {} to itself",
                connection.id, connection.source_id
            )));
        }
        result.connections.push(connection);
    }

    tracing::debug!(
        "Mapped {} connector(s): {} connection(s), {} healed, {} unresolved",
        connectors.len(),
        result.connections.len(),
        result.healed_count(),
        result.unresolved.len()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{Bounds, ConnectionType, DeviceType, PropertyRow, RawShape};
    use test_log::test;

    fn shape(id: &str, x: f64, y: f64) -> Shape {
        let raw = RawShape {
            id: ShapeId::from(id),
            text: format!("Device {id}"),
            master: None,
            bounds: Bounds {
                center: Point::new(x, y),
                width: 1.0,
                height: 1.0,
            },
            rows: vec![],
            page: 1,
            group: None,
        };
        Shape::from_raw(&raw, DeviceType::Unknown, Default::default())
    }

    fn connector(
        id: &str,
        source: Option<&str>,
        target: Option<&str>,
        begin: Option<(f64, f64)>,
        end: Option<(f64, f64)>,
    ) -> RawConnector {
        RawConnector {
            id: ShapeId::from(id),
            text: String::new(),
            master: None,
            source: source.map(ShapeId::from),
            target: target.map(ShapeId::from),
            begin: begin.map(|(x, y)| Point::new(x, y)),
            end: end.map(|(x, y)| Point::new(x, y)),
            rows: vec![],
            page: 1,
        }
    }

    fn run(connectors: &[RawConnector], shapes: &[Shape], groups: &[GroupShape]) -> ConnectionMap {
        map(
            connectors,
            shapes,
            groups,
            &Classifier::embedded().unwrap(),
            &HealingOptions::default(),
        )
    }

    #[test]
    fn test_direct_endpoints_are_not_healed() {
        let shapes = vec![shape("1", 0.0, 0.0), shape("2", 10.0, 0.0)];
        let result = run(&[connector("3", Some("1"), Some("2"), None, None)], &shapes, &[]);
        assert_eq!(result.connections.len(), 1);
        let c = &result.connections[0];
        assert!(!c.healed);
        assert_eq!(c.source_id.as_str(), "1");
        assert_eq!(c.target_id.as_str(), "2");
        assert!(result.unresolved.is_empty());
    }

    #[test]
    fn test_missing_target_heals_to_only_candidate_in_radius() {
        // median size 1.0, radius 1.5
        let shapes = vec![shape("1", 0.0, 0.0), shape("2", 10.0, 0.0)];
        let result = run(
            &[connector("3", Some("1"), None, Some((0.0, 0.0)), Some((9.2, 0.4)))],
            &shapes,
            &[],
        );
        assert_eq!(result.connections.len(), 1);
        assert_eq!(result.connections[0].target_id.as_str(), "2");
        assert!(result.connections[0].healed);
        assert_eq!(result.healed_count(), 1);
        assert!(matches!(
            result.diagnostics[0],
            ParseDiagnostic::HealedEndpoint {
                end: Endpoint::Target,
                ..
            }
        ));
    }

    #[test]
    fn test_no_candidate_in_radius_is_unresolved() {
        let shapes = vec![shape("1", 0.0, 0.0), shape("2", 10.0, 0.0)];
        let result = run(
            &[connector("3", Some("404"), Some("2"), Some((5.0, 5.0)), Some((10.0, 0.0)))],
            &shapes,
            &[],
        );
        assert!(result.connections.is_empty());
        assert_eq!(result.unresolved.len(), 1);
        let u = &result.unresolved[0];
        assert_eq!(u.unresolved_ends(), vec![Endpoint::Source]);
        assert_eq!(
            u.source,
            EndpointStatus::Unresolved {
                reason: UnresolvedReason::NoCandidateInRadius {
                    radius: 1.5,
                    reference: Some(ShapeId::from("404")),
                }
            }
        );
        assert!(result
            .diagnostics
            .iter()
            .any(ParseDiagnostic::is_unresolved_connection));
    }

    #[test]
    fn test_no_geometry_is_unresolved() {
        let shapes = vec![shape("1", 0.0, 0.0)];
        let result = run(&[connector("3", Some("1"), None, None, None)], &shapes, &[]);
        assert_eq!(
            result.unresolved[0].target,
            EndpointStatus::Unresolved {
                reason: UnresolvedReason::NoGeometry { reference: None }
            }
        );
    }

    #[test]
    fn test_equidistant_candidates_pick_smallest_id() {
        let shapes = vec![shape("10", 1.0, 0.0), shape("9", -1.0, 0.0)];
        let result = run(
            &[connector("3", None, None, Some((0.0, 0.0)), Some((0.0, 0.0)))],
            &shapes,
            &[],
        );
        let c = &result.connections[0];
        assert_eq!(c.source_id.as_str(), "9");
        assert_eq!(c.target_id.as_str(), "9");
        assert!(c.is_self_loop());
        assert!(result.diagnostics.iter().any(ParseDiagnostic::is_warning));
    }

    #[test]
    fn test_group_reference_prefers_members() {
        // A page shape sits closer to the endpoint than either member.
        let mut shapes = vec![shape("11", 0.0, 0.0), shape("12", 4.0, 0.0)];
        shapes.push(shape("30", 5.0, 0.0));
        shapes.push(shape("31", 20.0, 0.0));
        let group = GroupShape {
            id: ShapeId::from("10"),
            page: 1,
            bounds: Bounds {
                center: Point::new(2.0, 0.0),
                width: 6.0,
                height: 2.0,
            },
            members: vec![ShapeId::from("11"), ShapeId::from("12")],
        };
        let result = run(
            &[connector("3", Some("10"), Some("31"), Some((5.0, 0.2)), Some((20.0, 0.0)))],
            &shapes,
            &[group],
        );
        assert_eq!(result.connections[0].source_id.as_str(), "12");
        assert!(result.connections[0].healed);
    }

    #[test]
    fn test_healing_stays_on_page() {
        let mut other_page = shape("2:1", 0.0, 0.0);
        other_page.page = 2;
        let shapes = vec![shape("1:1", 10.0, 10.0), other_page];
        let result = run(
            &[connector("1:2", None, Some("1:1"), Some((0.0, 0.0)), None)],
            &shapes,
            &[],
        );
        assert_eq!(result.unresolved.len(), 1);
    }

    #[test]
    fn test_connection_type_and_properties() {
        let shapes = vec![shape("1", 0.0, 0.0), shape("2", 10.0, 0.0)];
        let mut c = connector("3", Some("1"), Some("2"), None, None);
        c.text = "10G SFP+".to_string();
        c.rows = vec![PropertyRow {
            name: "Row_1".into(),
            label: Some("VLAN ID".into()),
            value: Some("20".into()),
        }];
        let result = run(&[c], &shapes, &[]);
        let conn = &result.connections[0];
        assert_eq!(conn.connection_type, ConnectionType::Fiber);
        assert_eq!(conn.properties["vlan"], "20");
        assert_eq!(conn.properties["label"], "10G SFP+");
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }
}
