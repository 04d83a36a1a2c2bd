//! Page XML → raw shapes, connectors and group containers.
//!
//! Visio stores geometry in `<Cell N=".." V=".."/>` elements. A shape's centre in its parent's
//! coordinate frame is `Pin - LocPin + Size/2`; members of a group are expressed in the group's
//! local frame, whose origin sits at the group's `Pin - LocPin`.

use roxmltree::{Document, Node};
use std::collections::{HashMap, HashSet};

use crate::{
    codec::{classify::MasterMap, diagnostic::ParseDiagnostic},
    error::NetdocError,
    properties::{Bounds, GroupShape, Point, PropertyRow, RawConnector, RawShape, ShapeId},
};

/// Everything read from one page part.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContents {
    pub page: usize,
    pub shapes: Vec<RawShape>,
    pub connectors: Vec<RawConnector>,
    pub groups: Vec<GroupShape>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

#[derive(Debug, Default, Clone)]
struct Glue {
    source: Option<String>,
    target: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Frame {
    dx: f64,
    dy: f64,
}

#[derive(Debug, Default)]
struct Cells(HashMap<String, f64>);

impl Cells {
    fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    fn bounds(&self, frame: Frame) -> Bounds {
        let width = self.get("Width").unwrap_or(0.0);
        let height = self.get("Height").unwrap_or(0.0);
        let pin_x = self.get("PinX").unwrap_or(0.0);
        let pin_y = self.get("PinY").unwrap_or(0.0);
        let loc_x = self.get("LocPinX").unwrap_or(width / 2.0);
        let loc_y = self.get("LocPinY").unwrap_or(height / 2.0);
        Bounds {
            center: Point::new(
                frame.dx + pin_x - loc_x + width / 2.0,
                frame.dy + pin_y - loc_y + height / 2.0,
            ),
            width,
            height,
        }
    }

    /// Frame for members of a group with these cells.
    fn child_frame(&self, frame: Frame) -> Frame {
        let width = self.get("Width").unwrap_or(0.0);
        let height = self.get("Height").unwrap_or(0.0);
        Frame {
            dx: frame.dx + self.get("PinX").unwrap_or(0.0)
                - self.get("LocPinX").unwrap_or(width / 2.0),
            dy: frame.dy + self.get("PinY").unwrap_or(0.0)
                - self.get("LocPinY").unwrap_or(height / 2.0),
        }
    }

    fn point(&self, x: &str, y: &str, frame: Frame) -> Option<Point> {
        Some(Point::new(frame.dx + self.get(x)?, frame.dy + self.get(y)?))
    }

    fn is_one_dimensional(&self) -> bool {
        self.get("BeginX").is_some() && self.get("EndX").is_some()
    }
}

fn element_children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    local: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == local)
}

fn first_child<'a, 'input: 'a>(node: Node<'a, 'input>, local: &'static str) -> Option<Node<'a, 'input>> {
    element_children(node, local).next()
}

/// Whitespace-collapsed concatenation of every text node below `node`.
fn collapsed_text(node: Node) -> String {
    let raw: Vec<&str> = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    raw.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn cell_value(cell: Node) -> Option<String> {
    cell.attribute("V")
        .map(str::to_string)
        .or_else(|| cell.text().map(str::to_string))
}

struct PageReader<'m> {
    page: usize,
    multi_page: bool,
    masters: &'m MasterMap,
    glue: HashMap<String, Glue>,
    seen: HashSet<String>,
    contents: PageContents,
}

impl PageReader<'_> {
    fn id(&self, raw: &str) -> ShapeId {
        ShapeId::scoped(raw, self.page, self.multi_page)
    }

    fn read_cells(&mut self, shape: Node, raw_id: &str) -> Cells {
        let mut cells = HashMap::new();
        for cell in element_children(shape, "Cell") {
            let (Some(name), Some(value)) = (cell.attribute("N"), cell.attribute("V")) else {
                continue;
            };
            match value.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => {
                    cells.insert(name.to_string(), v);
                }
                _ => {
                    // Formula errors and themed values are common in geometry-free cells.
                    if matches!(name, "PinX" | "PinY" | "Width" | "Height") {
                        self.contents.diagnostics.push(ParseDiagnostic::warning(format!(
                            "Shape {raw_id} on page {}: non-numeric {name} value {value:?}",
                            self.page
                        )));
                    }
                }
            }
        }
        Cells(cells)
    }

    fn read_rows(shape: Node) -> Vec<PropertyRow> {
        element_children(shape, "Section")
            .filter(|s| s.attribute("N") == Some("Property"))
            .flat_map(|section| element_children(section, "Row"))
            .map(|row| {
                let mut parsed = PropertyRow {
                    name: row
                        .attribute("N")
                        .or_else(|| row.attribute("IX"))
                        .unwrap_or_default()
                        .to_string(),
                    ..Default::default()
                };
                for cell in element_children(row, "Cell") {
                    match cell.attribute("N") {
                        Some("Label") => parsed.label = cell_value(cell),
                        Some("Value") => parsed.value = cell_value(cell),
                        _ => {}
                    }
                }
                parsed
            })
            .collect()
    }

    fn master_name(&self, master: Option<&str>) -> Option<&str> {
        master
            .and_then(|id| self.masters.get(id))
            .map(String::as_str)
    }

    fn is_connector(&self, raw_id: &str, cells: &Cells, master: Option<&str>) -> bool {
        self.glue.contains_key(raw_id)
            || cells.is_one_dimensional()
            || cells.get("ObjType") == Some(2.0)
            || self
                .master_name(master)
                .map(|n| n.to_lowercase().contains("connector"))
                .unwrap_or(false)
    }

    /// Visit one `<Shape>` element. `group` is the enclosing container, if any.
    fn visit(&mut self, shape: Node, frame: Frame, group: Option<&ShapeId>) -> Option<ShapeId> {
        let Some(raw_id) = shape.attribute("ID") else {
            self.contents.diagnostics.push(ParseDiagnostic::warning(format!(
                "Shape without ID on page {} skipped",
                self.page
            )));
            return None;
        };
        if !self.seen.insert(raw_id.to_string()) {
            self.contents.diagnostics.push(ParseDiagnostic::warning(format!(
                "Duplicate shape ID {raw_id} on page {} skipped",
                self.page
            )));
            return None;
        }
        let id = self.id(raw_id);
        let cells = self.read_cells(shape, raw_id);
        let master = shape.attribute("Master").map(str::to_string);
        let text = first_child(shape, "Text")
            .map(collapsed_text)
            .unwrap_or_default();
        let rows = Self::read_rows(shape);

        let members = first_child(shape, "Shapes");
        // A group that instantiates a master is one stencil device; only plain groups are
        // containers.
        let is_container = shape.attribute("Type") == Some("Group") && master.is_none();

        if let (true, Some(members)) = (is_container, members) {
            if group.is_some() {
                tracing::debug!(
                    "Nested group {raw_id} on page {} read as a single shape",
                    self.page
                );
            } else {
                let child_frame = cells.child_frame(frame);
                let mut member_ids = Vec::new();
                for child in element_children(members, "Shape") {
                    if let Some(child_id) = self.visit(child, child_frame, Some(&id)) {
                        member_ids.push(child_id);
                    }
                }
                self.contents.groups.push(GroupShape {
                    id,
                    page: self.page,
                    bounds: cells.bounds(frame),
                    members: member_ids,
                });
                return None;
            }
        }

        if self.is_connector(raw_id, &cells, master.as_deref()) {
            let glue = self.glue.get(raw_id).cloned().unwrap_or_default();
            let connector = RawConnector {
                id,
                text,
                master,
                source: glue.source.as_deref().map(|s| self.id(s)),
                target: glue.target.as_deref().map(|t| self.id(t)),
                begin: cells.point("BeginX", "BeginY", frame),
                end: cells.point("EndX", "EndY", frame),
                rows,
                page: self.page,
            };
            self.contents.connectors.push(connector);
            return None;
        }

        self.contents.shapes.push(RawShape {
            id: id.clone(),
            text,
            master,
            bounds: cells.bounds(frame),
            rows,
            page: self.page,
            group: group.cloned(),
        });
        Some(id)
    }
}

fn read_glue(root: Node) -> HashMap<String, Glue> {
    let mut glue: HashMap<String, Glue> = HashMap::new();
    let Some(connects) = first_child(root, "Connects") else {
        return glue;
    };
    for connect in element_children(connects, "Connect") {
        let (Some(from), Some(to)) = (connect.attribute("FromSheet"), connect.attribute("ToSheet"))
        else {
            continue;
        };
        // control handles and connection points also glue; only line ends make a connector
        let begin = match connect.attribute("FromCell") {
            Some("BeginX") => true,
            Some("EndX") => false,
            _ => continue,
        };
        let entry = glue.entry(from.to_string()).or_default();
        let end = if begin { &mut entry.source } else { &mut entry.target };
        end.get_or_insert_with(|| to.to_string());
    }
    glue
}

/// Read one page part.
///
/// # Arguments
///
/// * `xml` - The page part's XML text
/// * `page` - 1-based page number
/// * `multi_page` - Whether ids must be qualified with the page number
/// * `masters` - Master id → name, used to recognize connector masters
///
/// # Returns
///
/// Shapes, connectors and group containers in document order, plus non-fatal diagnostics.
/// A page that is not well-formed XML is a [`NetdocError::MalformedArchive`].
pub fn read_page(
    xml: &str,
    page: usize,
    multi_page: bool,
    masters: &MasterMap,
) -> Result<PageContents, NetdocError> {
    let doc = Document::parse(xml)
        .map_err(|e| NetdocError::MalformedArchive(format!("page {page}: {e}")))?;
    let root = doc.root_element();
    let mut reader = PageReader {
        page,
        multi_page,
        masters,
        glue: read_glue(root),
        seen: HashSet::new(),
        contents: PageContents {
            page,
            ..Default::default()
        },
    };
    if let Some(shapes) = first_child(root, "Shapes") {
        for shape in element_children(shapes, "Shape") {
            reader.visit(shape, Frame::default(), None);
        }
    }
    tracing::debug!(
        "Page {page}: {} shape(s), {} connector(s), {} group(s)",
        reader.contents.shapes.len(),
        reader.contents.connectors.len(),
        reader.contents.groups.len()
    );
    Ok(reader.contents)
}
