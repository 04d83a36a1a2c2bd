//! The `.vsdx` container: a zip archive of XML parts.
//!
//! [`DiagramArchive::open`] validates the container once and keeps the raw bytes; page parts
//! are only decompressed and read when [`DiagramArchive::pages`] is iterated.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    io::{Cursor, Read, Seek},
    path::Path,
};
use zip::{result::ZipError, ZipArchive};

use crate::{
    codec::{classify::MasterMap, diagnostic::ParseDiagnostic},
    error::NetdocError,
};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const MASTERS_PART: &str = "visio/masters/masters.xml";
pub const PAGES_INDEX_PART: &str = "visio/pages/pages.xml";
pub const PAGES_RELS_PART: &str = "visio/pages/_rels/pages.xml.rels";
pub const CORE_PROPS_PART: &str = "docProps/core.xml";
pub const APP_PROPS_PART: &str = "docProps/app.xml";

const RELATIONSHIP_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Extensions of the XML diagram family (drawings, macro-enabled drawings, stencils, templates).
pub const DIAGRAM_EXTENSIONS: [&str; 6] = ["vsdx", "vsdm", "vssx", "vssm", "vstx", "vstm"];
/// Pre-XML binary formats, which are not supported.
pub const LEGACY_EXTENSIONS: [&str; 3] = ["vsd", "vss", "vst"];

static PAGE_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^visio/pages/page(\d+)\.xml$").expect("Page part pattern is a valid regex.")
});

fn has_extension(path: &Path, candidates: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| candidates.iter().any(|c| e.eq_ignore_ascii_case(c)))
        .unwrap_or(false)
}

pub fn is_diagram_path(path: &Path) -> bool {
    has_extension(path, &DIAGRAM_EXTENSIONS)
}

pub fn is_legacy_path(path: &Path) -> bool {
    has_extension(path, &LEGACY_EXTENSIONS)
}

/// Reject pre-XML binary diagrams by extension before their bytes are read.
pub fn ensure_supported(path: &Path) -> Result<(), NetdocError> {
    if is_legacy_path(path) {
        return Err(NetdocError::MalformedArchive(format!(
            "{} uses the legacy binary diagram format; save it as .vsdx",
            path.display()
        )));
    }
    Ok(())
}

/// Document-level properties from `docProps/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub author: Option<String>,
    /// RFC 3339, UTC, second precision
    pub created: Option<String>,
    pub modified: Option<String>,
    pub title: Option<String>,
    pub subject: Option<String>,
    pub manager: Option<String>,
    pub company: Option<String>,
}

/// One page part, read on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePart {
    /// 1-based position in document order
    pub number: usize,
    pub name: String,
    pub part: String,
    pub xml: String,
}

#[derive(Debug, Clone)]
struct PageEntry {
    part: String,
    name: String,
}

/// An opened, structurally validated diagram container.
#[derive(Debug, Clone)]
pub struct DiagramArchive {
    bytes: Vec<u8>,
    pages: Vec<PageEntry>,
    masters: MasterMap,
    metadata: DocumentMetadata,
    diagnostics: Vec<ParseDiagnostic>,
}

impl DiagramArchive {
    /// Validate `bytes` as a diagram container.
    ///
    /// # Errors
    ///
    /// - [`NetdocError::MalformedArchive`] when the zip structure or a required XML part
    ///   cannot be read
    /// - [`NetdocError::MissingRequiredPart`] when the content-types manifest, every page
    ///   part, or the masters part is absent
    pub fn open(bytes: impl Into<Vec<u8>>) -> Result<Self, NetdocError> {
        let bytes = bytes.into();
        let (pages, masters, metadata, diagnostics) = {
            let mut zip = ZipArchive::new(Cursor::new(bytes.as_slice())).map_err(|e| {
                NetdocError::MalformedArchive(format!("not a readable zip archive: {e}"))
            })?;
            let names: Vec<String> = zip.file_names().map(str::to_string).collect();

            if !names.iter().any(|n| n == CONTENT_TYPES_PART) {
                return Err(NetdocError::MissingRequiredPart(
                    CONTENT_TYPES_PART.to_string(),
                ));
            }
            let mut numbered: Vec<(u64, String)> = names
                .iter()
                .filter_map(|n| {
                    let caps = PAGE_PART.captures(n)?;
                    let number = caps.get(1)?.as_str().parse::<u64>().ok()?;
                    Some((number, n.clone()))
                })
                .collect();
            if numbered.is_empty() {
                return Err(NetdocError::MissingRequiredPart(
                    "visio/pages/page1.xml".to_string(),
                ));
            }
            if !names.iter().any(|n| n == MASTERS_PART) {
                return Err(NetdocError::MissingRequiredPart(MASTERS_PART.to_string()));
            }
            numbered.sort();

            let content_types = read_part(&mut zip, CONTENT_TYPES_PART)?;
            Document::parse(&content_types)?;

            let masters_xml = read_part(&mut zip, MASTERS_PART)?;
            let masters = parse_masters(&Document::parse(&masters_xml)?);

            let mut diagnostics = Vec::new();
            let names_by_part = page_names(&mut zip, &names, &mut diagnostics);
            let pages = numbered
                .into_iter()
                .enumerate()
                .map(|(idx, (_, part))| {
                    let name = names_by_part
                        .get(&part)
                        .cloned()
                        .unwrap_or_else(|| format!("Page-{}", idx + 1));
                    PageEntry { part, name }
                })
                .collect::<Vec<_>>();

            let metadata = read_metadata(&mut zip, &names, &mut diagnostics);
            (pages, masters, metadata, diagnostics)
        };

        tracing::debug!(
            "Opened diagram archive: {} page(s), {} master(s)",
            pages.len(),
            masters.len()
        );
        Ok(DiagramArchive {
            bytes,
            pages,
            masters,
            metadata,
            diagnostics,
        })
    }

    /// Lazily read page parts in document order. Each call starts again from the first page.
    pub fn pages(&self) -> Pages<'_> {
        Pages {
            archive: self,
            zip: None,
            next: 0,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_names(&self) -> Vec<&str> {
        self.pages.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn masters(&self) -> &MasterMap {
        &self.masters
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    /// Non-fatal problems found while opening (unreadable optional parts, bad dates).
    pub fn diagnostics(&self) -> &[ParseDiagnostic] {
        &self.diagnostics
    }
}

/// Iterator returned by [`DiagramArchive::pages`].
pub struct Pages<'a> {
    archive: &'a DiagramArchive,
    zip: Option<ZipArchive<Cursor<&'a [u8]>>>,
    next: usize,
}

impl Iterator for Pages<'_> {
    type Item = Result<PagePart, NetdocError>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.archive.pages.get(self.next)?;
        let number = self.next + 1;
        self.next += 1;
        if self.zip.is_none() {
            match ZipArchive::new(Cursor::new(self.archive.bytes.as_slice())) {
                Ok(zip) => self.zip = Some(zip),
                Err(e) => return Some(Err(e.into())),
            }
        }
        let zip = self.zip.as_mut()?;
        tracing::debug!("Reading page {number} from {}", entry.part);
        Some(read_part(zip, &entry.part).map(|xml| PagePart {
            number,
            name: entry.name.clone(),
            part: entry.part.clone(),
            xml,
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.archive.pages.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

fn read_part<R: Read + Seek>(zip: &mut ZipArchive<R>, name: &str) -> Result<String, NetdocError> {
    let mut file = zip.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => NetdocError::MissingRequiredPart(name.to_string()),
        other => other.into(),
    })?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| NetdocError::MalformedArchive(format!("{name}: {e}")))?;
    match content.strip_prefix('\u{feff}') {
        Some(stripped) => Ok(stripped.to_string()),
        None => Ok(content),
    }
}

fn read_optional_part<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    names: &[String],
    name: &str,
    diagnostics: &mut Vec<ParseDiagnostic>,
) -> Option<String> {
    if !names.iter().any(|n| n == name) {
        return None;
    }
    match read_part(zip, name) {
        Ok(content) => Some(content),
        Err(e) => {
            diagnostics.push(ParseDiagnostic::warning(format!("{name} unreadable: {e}")));
            None
        }
    }
}

fn children_named<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    local: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == local)
}

fn parse_masters(doc: &Document) -> MasterMap {
    children_named(doc.root_element(), "Master")
        .filter_map(|m| {
            let id = m.attribute("ID")?;
            let name = m.attribute("NameU").or_else(|| m.attribute("Name"))?;
            Some((id.to_string(), name.to_string()))
        })
        .collect()
}

/// Part name → page name, via `pages.xml` and its relationships part. Falls back to document
/// order when the relationships part is missing.
fn page_names<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    names: &[String],
    diagnostics: &mut Vec<ParseDiagnostic>,
) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    let Some(index_xml) = read_optional_part(zip, names, PAGES_INDEX_PART, diagnostics) else {
        return result;
    };
    let index = match Document::parse(&index_xml) {
        Ok(doc) => doc,
        Err(e) => {
            diagnostics.push(ParseDiagnostic::warning(format!(
                "{PAGES_INDEX_PART} is not well-formed: {e}"
            )));
            return result;
        }
    };

    let mut targets: BTreeMap<String, String> = BTreeMap::new();
    if let Some(rels_xml) = read_optional_part(zip, names, PAGES_RELS_PART, diagnostics) {
        if let Ok(rels) = Document::parse(&rels_xml) {
            for rel in children_named(rels.root_element(), "Relationship") {
                if let (Some(id), Some(target)) = (rel.attribute("Id"), rel.attribute("Target")) {
                    let target = target.trim_start_matches('/');
                    let part = if target.starts_with("visio/") {
                        target.to_string()
                    } else {
                        format!("visio/pages/{target}")
                    };
                    targets.insert(id.to_string(), part);
                }
            }
        }
    }

    for (idx, page) in children_named(index.root_element(), "Page").enumerate() {
        let Some(name) = page.attribute("NameU").or_else(|| page.attribute("Name")) else {
            continue;
        };
        let part = children_named(page, "Rel")
            .find_map(|rel| rel.attribute((RELATIONSHIP_NS, "id")))
            .and_then(|rid| targets.get(rid).cloned())
            .unwrap_or_else(|| format!("visio/pages/page{}.xml", idx + 1));
        result.insert(part, name.to_string());
    }
    result
}

fn read_metadata<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    names: &[String],
    diagnostics: &mut Vec<ParseDiagnostic>,
) -> DocumentMetadata {
    let mut metadata = DocumentMetadata::default();
    if let Some(core) = read_optional_part(zip, names, CORE_PROPS_PART, diagnostics) {
        match Document::parse(&core) {
            Ok(doc) => {
                metadata.author = element_text(&doc, "creator");
                metadata.title = element_text(&doc, "title");
                metadata.subject = element_text(&doc, "subject");
                metadata.created = timestamp(&doc, "created", diagnostics);
                metadata.modified = timestamp(&doc, "modified", diagnostics);
            }
            Err(e) => diagnostics.push(ParseDiagnostic::warning(format!(
                "{CORE_PROPS_PART} is not well-formed: {e}"
            ))),
        }
    }
    if let Some(app) = read_optional_part(zip, names, APP_PROPS_PART, diagnostics) {
        match Document::parse(&app) {
            Ok(doc) => {
                metadata.manager = element_text(&doc, "Manager");
                metadata.company = element_text(&doc, "Company");
            }
            Err(e) => diagnostics.push(ParseDiagnostic::warning(format!(
                "{APP_PROPS_PART} is not well-formed: {e}"
            ))),
        }
    }
    metadata
}

fn element_text(doc: &Document, local: &str) -> Option<String> {
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == local)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn timestamp(doc: &Document, local: &str, diagnostics: &mut Vec<ParseDiagnostic>) -> Option<String> {
    let raw = element_text(doc, local)?;
    let normalized = normalize_timestamp(&raw);
    if normalized.is_none() {
        diagnostics.push(ParseDiagnostic::warning(format!(
            "Ignoring unparseable {local} timestamp {raw:?}"
        )));
    }
    normalized
}

/// Normalize a W3C date/time to RFC 3339 UTC with second precision.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let utc: DateTime<Utc> = if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        dt.with_timezone(&Utc)
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        naive.and_utc()
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        naive.and_utc()
    } else if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0)?.and_utc()
    } else {
        return None;
    };
    Some(utc.to_rfc3339_opts(SecondsFormat::Secs, true))
}
