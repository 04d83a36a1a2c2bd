//! In-memory `.vsdx` builder for tests.
//!
//! Only depends on `zip` and std so integration tests and benches can include it with
//! `#[path]`.

use std::io::{Cursor, Write};
use zip::{write::SimpleFileOptions, ZipWriter};

const VISIO_NS: &str = "http://schemas.microsoft.com/office/visio/2012/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Debug, Clone)]
enum FixtureKind {
    Device,
    Connector {
        source: Option<String>,
        target: Option<String>,
        begin: Option<(f64, f64)>,
        end: Option<(f64, f64)>,
    },
    Group {
        members: Vec<FixtureShape>,
    },
}

/// One shape element of a fixture page.
#[derive(Debug, Clone)]
pub struct FixtureShape {
    id: String,
    text: String,
    master: Option<String>,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    properties: Vec<(String, String)>,
    glue: Vec<(String, String)>,
    kind: FixtureKind,
}

impl FixtureShape {
    /// A 1x1 device centred on `(x, y)`.
    pub fn device(id: &str, label: &str, x: f64, y: f64) -> Self {
        FixtureShape {
            id: id.to_string(),
            text: label.to_string(),
            master: None,
            x,
            y,
            width: 1.0,
            height: 1.0,
            properties: Vec::new(),
            glue: Vec::new(),
            kind: FixtureKind::Device,
        }
    }

    /// A line shape; glue and endpoints are added with [`from`](Self::from),
    /// [`to`](Self::to), [`begin`](Self::begin) and [`end`](Self::end). Endpoints left unset
    /// default to the glued shape's centre when it is on the same page.
    pub fn connector(id: &str) -> Self {
        FixtureShape {
            id: id.to_string(),
            text: String::new(),
            master: None,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            properties: Vec::new(),
            glue: Vec::new(),
            kind: FixtureKind::Connector {
                source: None,
                target: None,
                begin: None,
                end: None,
            },
        }
    }

    /// A plain group container with its centre at `(x, y)`. Member coordinates are relative
    /// to the group's lower-left corner.
    pub fn group(id: &str, x: f64, y: f64, width: f64, height: f64, members: Vec<FixtureShape>) -> Self {
        FixtureShape {
            id: id.to_string(),
            text: String::new(),
            master: None,
            x,
            y,
            width,
            height,
            properties: Vec::new(),
            glue: Vec::new(),
            kind: FixtureKind::Group { members },
        }
    }

    pub fn label(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn master(mut self, id: &str) -> Self {
        self.master = Some(id.to_string());
        self
    }

    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Custom property row with the given label and value.
    pub fn property(mut self, label: &str, value: &str) -> Self {
        self.properties.push((label.to_string(), value.to_string()));
        self
    }

    /// Extra `Connect` row gluing `cell` of this shape to `shape`, e.g. a callout's
    /// `Controls.Row_1` handle.
    pub fn glued(mut self, cell: &str, shape: &str) -> Self {
        self.glue.push((cell.to_string(), shape.to_string()));
        self
    }

    pub fn from(mut self, shape: &str) -> Self {
        if let FixtureKind::Connector { source, .. } = &mut self.kind {
            *source = Some(shape.to_string());
        }
        self
    }

    pub fn to(mut self, shape: &str) -> Self {
        if let FixtureKind::Connector { target, .. } = &mut self.kind {
            *target = Some(shape.to_string());
        }
        self
    }

    pub fn begin(mut self, x: f64, y: f64) -> Self {
        if let FixtureKind::Connector { begin, .. } = &mut self.kind {
            *begin = Some((x, y));
        }
        self
    }

    pub fn end(mut self, x: f64, y: f64) -> Self {
        if let FixtureKind::Connector { end, .. } = &mut self.kind {
            *end = Some((x, y));
        }
        self
    }

    fn cell(out: &mut String, name: &str, value: f64) {
        out.push_str(&format!(r#"<Cell N="{name}" V="{value}"/>"#));
    }

    fn write(&self, out: &mut String, centres: &[(String, (f64, f64))]) {
        let centre_of = |id: &Option<String>| {
            id.as_ref()
                .and_then(|id| centres.iter().find(|(c, _)| c == id))
                .map(|(_, p)| *p)
        };
        let kind_attr = match self.kind {
            FixtureKind::Group { .. } => "Group",
            _ => "Shape",
        };
        out.push_str(&format!(r#"<Shape ID="{}" Type="{kind_attr}""#, escape(&self.id)));
        if let Some(master) = &self.master {
            out.push_str(&format!(r#" Master="{}""#, escape(master)));
        }
        out.push('>');
        match &self.kind {
            FixtureKind::Connector {
                source,
                target,
                begin,
                end,
            } => {
                let begin = begin.or_else(|| centre_of(source));
                let end = end.or_else(|| centre_of(target));
                if let Some((x, y)) = begin {
                    Self::cell(out, "BeginX", x);
                    Self::cell(out, "BeginY", y);
                }
                if let Some((x, y)) = end {
                    Self::cell(out, "EndX", x);
                    Self::cell(out, "EndY", y);
                }
                Self::cell(out, "ObjType", 2.0);
            }
            _ => {
                Self::cell(out, "PinX", self.x);
                Self::cell(out, "PinY", self.y);
                Self::cell(out, "Width", self.width);
                Self::cell(out, "Height", self.height);
            }
        }
        if !self.properties.is_empty() {
            out.push_str(r#"<Section N="Property">"#);
            for (i, (label, value)) in self.properties.iter().enumerate() {
                out.push_str(&format!(
                    r#"<Row N="Row_{}"><Cell N="Label" V="{}"/><Cell N="Value" V="{}" U="STR"/></Row>"#,
                    i + 1,
                    escape(label),
                    escape(value)
                ));
            }
            out.push_str("</Section>");
        }
        if let FixtureKind::Group { members } = &self.kind {
            out.push_str("<Shapes>");
            for member in members {
                member.write(out, &[]);
            }
            out.push_str("</Shapes>");
        }
        if !self.text.is_empty() {
            out.push_str(&format!("<Text>{}</Text>", escape(&self.text)));
        }
        out.push_str("</Shape>");
    }
}

#[derive(Debug, Clone)]
struct FixturePage {
    name: String,
    shapes: Vec<FixtureShape>,
}

impl FixturePage {
    fn xml(&self) -> String {
        let centres: Vec<(String, (f64, f64))> = self
            .shapes
            .iter()
            .filter(|s| matches!(s.kind, FixtureKind::Device))
            .map(|s| (s.id.clone(), (s.x, s.y)))
            .collect();
        let mut shapes = String::new();
        let mut connects = String::new();
        for shape in &self.shapes {
            shape.write(&mut shapes, &centres);
            if let FixtureKind::Connector { source, target, .. } = &shape.kind {
                for (cell, sheet) in [("BeginX", source), ("EndX", target)] {
                    if let Some(sheet) = sheet {
                        connects.push_str(&format!(
                            r#"<Connect FromSheet="{}" FromCell="{cell}" ToSheet="{}"/>"#,
                            escape(&shape.id),
                            escape(sheet)
                        ));
                    }
                }
            }
            for (cell, sheet) in &shape.glue {
                connects.push_str(&format!(
                    r#"<Connect FromSheet="{}" FromCell="{}" ToSheet="{}" ToCell="PinX"/>"#,
                    escape(&shape.id),
                    escape(cell),
                    escape(sheet)
                ));
            }
        }
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?><PageContents xmlns="{VISIO_NS}" xml:space="preserve"><Shapes>{shapes}</Shapes><Connects>{connects}</Connects></PageContents>"#
        )
    }
}

/// Builder for a minimal but complete diagram archive.
#[derive(Debug, Clone, Default)]
pub struct DiagramFixture {
    masters: Vec<(String, String)>,
    pages: Vec<FixturePage>,
    author: Option<String>,
    created: Option<String>,
    title: Option<String>,
}

impl DiagramFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn master(mut self, id: &str, name: &str) -> Self {
        self.masters.push((id.to_string(), name.to_string()));
        self
    }

    pub fn author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    pub fn created(mut self, created: &str) -> Self {
        self.created = Some(created.to_string());
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Start a new page; following shapes are added to it.
    pub fn page_named(mut self, name: &str) -> Self {
        self.pages.push(FixturePage {
            name: name.to_string(),
            shapes: Vec::new(),
        });
        self
    }

    /// Add a shape to the current page, creating `Page-1` if there is none yet.
    pub fn shape(mut self, shape: FixtureShape) -> Self {
        if self.pages.is_empty() {
            self = self.page_named("Page-1");
        }
        if let Some(page) = self.pages.last_mut() {
            page.shapes.push(shape);
        }
        self
    }

    fn pages_index(&self) -> (String, String) {
        let mut index = format!(r#"<Pages xmlns="{VISIO_NS}" xmlns:r="{REL_NS}">"#);
        let mut rels = format!(r#"<Relationships xmlns="{PACKAGE_REL_NS}">"#);
        for (i, page) in self.pages.iter().enumerate() {
            let n = i + 1;
            index.push_str(&format!(
                r#"<Page ID="{}" NameU="{name}" Name="{name}"><Rel r:id="rId{n}"/></Page>"#,
                i,
                name = escape(&page.name)
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="http://schemas.microsoft.com/visio/2010/relationships/page" Target="page{n}.xml"/>"#
            ));
        }
        index.push_str("</Pages>");
        rels.push_str("</Relationships>");
        (index, rels)
    }

    fn masters_xml(&self) -> String {
        let mut xml = format!(r#"<Masters xmlns="{VISIO_NS}">"#);
        for (id, name) in &self.masters {
            xml.push_str(&format!(
                r#"<Master ID="{}" NameU="{name}" Name="{name}"/>"#,
                escape(id),
                name = escape(name)
            ));
        }
        xml.push_str("</Masters>");
        xml
    }

    fn core_xml(&self) -> String {
        let mut xml = String::from(
            r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
        );
        if let Some(title) = &self.title {
            xml.push_str(&format!("<dc:title>{}</dc:title>", escape(title)));
        }
        if let Some(author) = &self.author {
            xml.push_str(&format!("<dc:creator>{}</dc:creator>", escape(author)));
        }
        if let Some(created) = &self.created {
            xml.push_str(&format!(
                r#"<dcterms:created xsi:type="dcterms:W3CDTF">{}</dcterms:created>"#,
                escape(created)
            ));
        }
        xml.push_str("</cp:coreProperties>");
        xml
    }

    /// Serialize to `.vsdx` bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut parts: Vec<(String, String)> = vec![(
            "[Content_Types].xml".to_string(),
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/></Types>"#.to_string(),
        )];
        parts.push(("docProps/core.xml".to_string(), self.core_xml()));
        parts.push(("visio/masters/masters.xml".to_string(), self.masters_xml()));
        let (index, rels) = self.pages_index();
        parts.push(("visio/pages/pages.xml".to_string(), index));
        parts.push(("visio/pages/_rels/pages.xml.rels".to_string(), rels));
        for (i, page) in self.pages.iter().enumerate() {
            parts.push((format!("visio/pages/page{}.xml", i + 1), page.xml()));
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in parts {
            writer
                .start_file(name, SimpleFileOptions::default())
                .expect("in-memory zip entry");
            writer
                .write_all(content.as_bytes())
                .expect("in-memory zip write");
        }
        writer.finish().expect("in-memory zip finish").into_inner()
    }
}
