//! Diagnostic types for diagram parsing and connector resolution.
//!
//! Diagnostics are non-fatal: a parse that produces them still yields a valid topology. The
//! most important one is [`UnresolvedConnection`], a connector that could not be attached to
//! shapes at both ends, even after geometric healing.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use crate::properties::ShapeId;

/// Which end of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Source,
    Target,
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Source => f.write_str("source"),
            Endpoint::Target => f.write_str("target"),
        }
    }
}

/// Why an endpoint could not be attached to a shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// The reference did not name a shape and the connector has no endpoint coordinate
    NoGeometry { reference: Option<ShapeId> },
    /// No shape centroid lies within the healing radius of the endpoint coordinate
    NoCandidateInRadius {
        radius: f64,
        /// The declared reference, if any
        reference: Option<ShapeId>,
    },
}

/// Resolution outcome of one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EndpointStatus {
    /// The declared reference named an existing shape
    Direct { shape_id: ShapeId },
    /// Repaired to the nearest shape
    Healed { shape_id: ShapeId, distance: f64 },
    Unresolved { reason: UnresolvedReason },
}

impl EndpointStatus {
    pub fn shape_id(&self) -> Option<&ShapeId> {
        match self {
            EndpointStatus::Direct { shape_id } | EndpointStatus::Healed { shape_id, .. } => {
                Some(shape_id)
            }
            EndpointStatus::Unresolved { .. } => None,
        }
    }

    pub fn is_healed(&self) -> bool {
        matches!(self, EndpointStatus::Healed { .. })
    }

    pub fn is_resolved(&self) -> bool {
        self.shape_id().is_some()
    }
}

/// A connector with at least one endpoint left unattached after healing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedConnection {
    pub connector_id: ShapeId,
    pub page: usize,
    pub label: String,
    pub source: EndpointStatus,
    pub target: EndpointStatus,
}

impl UnresolvedConnection {
    /// The ends that failed, in source/target order.
    pub fn unresolved_ends(&self) -> Vec<Endpoint> {
        let mut ends = Vec::with_capacity(2);
        if !self.source.is_resolved() {
            ends.push(Endpoint::Source);
        }
        if !self.target.is_resolved() {
            ends.push(Endpoint::Target);
        }
        ends
    }
}

/// Diagnostic information produced while reading and assembling a diagram.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseDiagnostic {
    /// A connector that could not be turned into a connection
    UnresolvedConnection(UnresolvedConnection),

    /// An endpoint attached by the nearest-shape heuristic rather than by reference
    HealedEndpoint {
        connector_id: ShapeId,
        end: Endpoint,
        shape_id: ShapeId,
        distance: f64,
    },

    /// A recoverable oddity in the source (bad cell value, duplicate id, self-loop)
    Warning(String),

    /// An informational message about the parse
    Info(String),
}

impl ParseDiagnostic {
    /// Create a warning diagnostic
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning(message.into())
    }

    /// Create an info diagnostic
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info(message.into())
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning(_))
    }

    /// Check if this diagnostic represents an unresolved connection
    pub fn is_unresolved_connection(&self) -> bool {
        matches!(self, Self::UnresolvedConnection(_))
    }

    /// Get the unresolved connection if this is one
    pub fn as_unresolved_connection(&self) -> Option<&UnresolvedConnection> {
        match self {
            Self::UnresolvedConnection(unresolved) => Some(unresolved),
            _ => None,
        }
    }
}

impl Display for ParseDiagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedConnection(unresolved) => {
                let ends: Vec<String> = unresolved
                    .unresolved_ends()
                    .iter()
                    .map(Endpoint::to_string)
                    .collect();
                write!(
                    f,
                    "Unresolved connector {} on page {} ({} end unresolved)",
                    unresolved.connector_id,
                    unresolved.page,
                    ends.join("+")
                )
            }
            Self::HealedEndpoint {
                connector_id,
                end,
                shape_id,
                distance,
            } => write!(
                f,
                "Healed {end} of connector {connector_id} to shape {shape_id} (distance {distance:.3})"
            ),
            Self::Warning(msg) => write!(f, "Warning: {msg}"),
            Self::Info(msg) => write!(f, "Info: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unresolved() -> UnresolvedConnection {
        UnresolvedConnection {
            connector_id: ShapeId::from("9"),
            page: 1,
            label: String::new(),
            source: EndpointStatus::Unresolved {
                reason: UnresolvedReason::NoCandidateInRadius {
                    radius: 1.5,
                    reference: Some(ShapeId::from("404")),
                },
            },
            target: EndpointStatus::Direct {
                shape_id: ShapeId::from("2"),
            },
        }
    }

    #[test]
    fn test_parse_diagnostic_creation() {
        let warning = ParseDiagnostic::warning("Test warning");
        let info = ParseDiagnostic::info("Test info");

        assert!(warning.is_warning());
        assert!(matches!(info, ParseDiagnostic::Info(_)));
        assert!(!info.is_unresolved_connection());
    }

    #[test]
    fn test_unresolved_ends() {
        let u = unresolved();
        assert_eq!(u.unresolved_ends(), vec![Endpoint::Source]);
        let diag = ParseDiagnostic::UnresolvedConnection(u);
        assert!(diag.is_unresolved_connection());
        assert_eq!(
            diag.to_string(),
            "Unresolved connector 9 on page 1 (source end unresolved)"
        );
    }

    #[test]
    fn test_endpoint_status_serialization() {
        let json = serde_json::to_value(unresolved()).unwrap();
        assert_eq!(json["source"]["status"], "unresolved");
        assert_eq!(json["source"]["reason"]["kind"], "no_candidate_in_radius");
        assert_eq!(json["source"]["reason"]["reference"], "404");
        assert_eq!(json["target"]["status"], "direct");
        assert_eq!(json["target"]["shape_id"], "2");
    }
}
