//! Core data model: identifiers, taxonomy enums, raw archive elements and their derived forms.
//!
//! Raw types ([`RawShape`], [`RawConnector`]) are produced by the page reader and never mutated
//! afterwards. Derived types ([`Shape`], [`Connection`]) are built from them one-to-one by the
//! classifier, property extractor and connection mapper.

use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

/// Normalized custom-property map attached to shapes and connections.
pub type PropertyMap = BTreeMap<String, String>;

/// Archive-local identifier of a shape or connector.
///
/// Single-page documents use the raw Visio `ID` attribute; multi-page documents qualify it as
/// `"{page}:{id}"`. Ordering is natural: runs of digits compare numerically, so `"2" < "10"`
/// and `"1:9" < "1:10" < "2:1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    pub fn new(id: impl Into<String>) -> Self {
        ShapeId(id.into())
    }

    /// Build the id for `raw` on a 1-based `page`, qualified when the document has several pages.
    pub fn scoped(raw: &str, page: usize, multi_page: bool) -> Self {
        if multi_page {
            ShapeId(format!("{page}:{raw}"))
        } else {
            ShapeId(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ShapeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShapeId {
    fn from(s: &str) -> Self {
        ShapeId(s.to_string())
    }
}

impl PartialOrd for ShapeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ShapeId {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.0, &other.0).then_with(|| self.0.cmp(&other.0))
    }
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let mut ln = String::new();
                while let Some(c) = left.peek().copied().filter(char::is_ascii_digit) {
                    ln.push(c);
                    left.next();
                }
                let mut rn = String::new();
                while let Some(c) = right.peek().copied().filter(char::is_ascii_digit) {
                    rn.push(c);
                    right.next();
                }
                let lt = ln.trim_start_matches('0');
                let rt = rn.trim_start_matches('0');
                let ord = lt.len().cmp(&rt.len()).then_with(|| lt.cmp(rt));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left.next();
                right.next();
            }
        }
    }
}

/// Network-device taxonomy assigned by the shape classifier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Router,
    Switch,
    Firewall,
    Server,
    Workstation,
    Cloud,
    #[default]
    Unknown,
}

impl DeviceType {
    pub const ALL: [DeviceType; 7] = [
        DeviceType::Router,
        DeviceType::Switch,
        DeviceType::Firewall,
        DeviceType::Server,
        DeviceType::Workstation,
        DeviceType::Cloud,
        DeviceType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Router => "router",
            DeviceType::Switch => "switch",
            DeviceType::Firewall => "firewall",
            DeviceType::Server => "server",
            DeviceType::Workstation => "workstation",
            DeviceType::Cloud => "cloud",
            DeviceType::Unknown => "unknown",
        }
    }
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link taxonomy assigned to connections.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Ethernet,
    Fiber,
    Trunk,
    Logical,
    #[default]
    Unknown,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Ethernet => "ethernet",
            ConnectionType::Fiber => "fiber",
            ConnectionType::Trunk => "trunk",
            ConnectionType::Logical => "logical",
            ConnectionType::Unknown => "unknown",
        }
    }

    /// Logical links (VPN, tunnels) are overlays and do not join physical segments.
    pub fn is_overlay(&self) -> bool {
        matches!(self, ConnectionType::Logical)
    }
}

impl Display for ConnectionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned placement of a shape, in page units, anchored at its centre.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub center: Point,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    /// Characteristic size used for the healing radius.
    pub fn size(&self) -> f64 {
        (self.width.abs() + self.height.abs()) / 2.0
    }
}

/// One row of a Visio `Property` section, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyRow {
    /// The row's `N` attribute (`Row_1`, `IPAddress`, ...)
    pub name: String,
    /// The `Label` cell, when present
    pub label: Option<String>,
    /// The `Value` cell's `V` attribute or text
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawShape {
    pub id: ShapeId,
    pub text: String,
    pub master: Option<String>,
    pub bounds: Bounds,
    pub rows: Vec<PropertyRow>,
    /// 1-based page number
    pub page: usize,
    /// Enclosing group, when the shape was read from inside a group container
    pub group: Option<ShapeId>,
}

impl RawShape {
    /// Display name: the label text, or a synthetic `Shape_{id}` when the shape carries no text.
    pub fn name(&self) -> String {
        if self.text.is_empty() {
            format!("Shape_{}", self.id)
        } else {
            self.text.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawConnector {
    pub id: ShapeId,
    pub text: String,
    pub master: Option<String>,
    pub source: Option<ShapeId>,
    pub target: Option<ShapeId>,
    pub begin: Option<Point>,
    pub end: Option<Point>,
    pub rows: Vec<PropertyRow>,
    pub page: usize,
}

/// A group container read from a page, with the ids of its direct members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupShape {
    pub id: ShapeId,
    pub page: usize,
    pub bounds: Bounds,
    pub members: Vec<ShapeId>,
}

/// A classified shape as it appears in the parse artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: ShapeId,
    pub name: String,
    pub shape_type: DeviceType,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub properties: PropertyMap,
    pub page: usize,
    pub connection_count: usize,
}

impl Shape {
    pub fn from_raw(raw: &RawShape, shape_type: DeviceType, properties: PropertyMap) -> Self {
        Shape {
            id: raw.id.clone(),
            name: raw.name(),
            shape_type,
            x: raw.bounds.center.x,
            y: raw.bounds.center.y,
            width: raw.bounds.width,
            height: raw.bounds.height,
            properties,
            page: raw.page,
            connection_count: 0,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> f64 {
        Bounds {
            center: self.center(),
            width: self.width,
            height: self.height,
        }
        .size()
    }
}

/// A connector whose endpoints both resolved to shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ShapeId,
    pub source_id: ShapeId,
    pub target_id: ShapeId,
    pub connection_type: ConnectionType,
    pub properties: PropertyMap,
    /// True when at least one endpoint was repaired geometrically rather than read directly
    pub healed: bool,
}

impl Connection {
    pub fn is_self_loop(&self) -> bool {
        self.source_id == self.target_id
    }
}
