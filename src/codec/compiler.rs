use rayon::prelude::*;

use crate::{
    codec::{
        archive::{DiagramArchive, DocumentMetadata, PagePart},
        classify::{Classifier, MasterMap},
        custom_props::{apply_device_defaults, extract},
        diagnostic::ParseDiagnostic,
        heal::{self, ConnectionMap, HealingOptions},
        page::read_page,
    },
    config::NetdocConfig,
    error::NetdocError,
    properties::{GroupShape, RawConnector, Shape},
    topology::{assemble, ParseArtifact, TopologyOptions},
};

/// Turns the bytes of one diagram into a [`ParseArtifact`].
///
/// ## Overview
///
/// Compilation runs in four stages, each exposed separately so a caller can report progress
/// between them:
///
/// 1. [`open`](Self::open) validates the zip container and reads masters and metadata.
/// 2. [`extract`](Self::extract) reads every page, classifies its shapes and normalizes their
///    properties. Pages are decompressed sequentially and then processed in parallel on the
///    rayon pool; results are concatenated in page order, so the outcome does not depend on
///    scheduling.
/// 3. [`heal`](Self::heal) maps connectors to connections. It needs the complete shape set of
///    the document and therefore only runs once extraction has joined.
/// 4. [`assemble`](Self::assemble) builds the topology and its metrics.
///
/// [`compile`](Self::compile) chains all four.
///
/// ## Diagnostics
///
/// Nothing short of a broken container fails compilation. Unreadable cells, duplicate ids,
/// healed endpoints and unresolved connectors are all reported as [`ParseDiagnostic`]s next
/// to the artifact.
#[derive(Debug, Clone)]
pub struct DiagramCompiler {
    classifier: Classifier,
    healing: HealingOptions,
    topology: TopologyOptions,
}

/// Output of the extraction stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub shapes: Vec<Shape>,
    pub connectors: Vec<RawConnector>,
    pub groups: Vec<GroupShape>,
    pub metadata: DocumentMetadata,
    pub page_count: usize,
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// A finished compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileResult {
    pub artifact: ParseArtifact,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl CompileResult {
    /// Warnings and unresolved connectors; healed endpoints and info messages are left out.
    pub fn warnings(&self) -> impl Iterator<Item = &ParseDiagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.is_warning() || d.is_unresolved_connection())
    }
}

impl DiagramCompiler {
    /// Build a compiler from configuration, loading any replacement rule tables.
    pub fn new(config: &NetdocConfig) -> Result<Self, NetdocError> {
        Ok(Self::with_classifier(
            Classifier::from_config(&config.extraction)?,
            config,
        ))
    }

    pub fn with_classifier(classifier: Classifier, config: &NetdocConfig) -> Self {
        DiagramCompiler {
            classifier,
            healing: HealingOptions {
                radius_factor: config.healing.radius_factor,
                enrich_defaults: config.extraction.enrich_defaults,
            },
            topology: config.topology.clone().into(),
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn open(&self, bytes: impl Into<Vec<u8>>) -> Result<DiagramArchive, NetdocError> {
        DiagramArchive::open(bytes)
    }

    /// Read and classify every page of `archive`.
    pub fn extract(&self, archive: &DiagramArchive) -> Result<Extraction, NetdocError> {
        let parts: Vec<PagePart> = archive.pages().collect::<Result<_, _>>()?;
        let multi_page = parts.len() > 1;
        let masters = archive.masters();

        let pages: Vec<Extraction> = parts
            .par_iter()
            .map(|part| self.extract_page(part, multi_page, masters))
            .collect::<Result<_, _>>()?;

        let mut extraction = Extraction {
            metadata: archive.metadata().clone(),
            page_count: parts.len(),
            diagnostics: archive.diagnostics().to_vec(),
            ..Default::default()
        };
        for page in pages {
            extraction.shapes.extend(page.shapes);
            extraction.connectors.extend(page.connectors);
            extraction.groups.extend(page.groups);
            extraction.diagnostics.extend(page.diagnostics);
        }
        tracing::debug!(
            "Extracted {} shape(s) and {} connector(s) from {} page(s)",
            extraction.shapes.len(),
            extraction.connectors.len(),
            extraction.page_count
        );
        Ok(extraction)
    }

    fn extract_page(
        &self,
        part: &PagePart,
        multi_page: bool,
        masters: &MasterMap,
    ) -> Result<Extraction, NetdocError> {
        let contents = read_page(&part.xml, part.number, multi_page, masters)?;
        let shapes = contents
            .shapes
            .iter()
            .map(|raw| {
                let kind = self.classifier.classify_shape(raw, masters);
                let mut shape = Shape::from_raw(raw, kind, extract(&raw.rows));
                if self.healing.enrich_defaults {
                    apply_device_defaults(&mut shape);
                }
                shape
            })
            .collect();
        Ok(Extraction {
            shapes,
            connectors: contents.connectors,
            groups: contents.groups,
            diagnostics: contents.diagnostics,
            ..Default::default()
        })
    }

    pub fn heal(&self, extraction: &Extraction) -> ConnectionMap {
        heal::map(
            &extraction.connectors,
            &extraction.shapes,
            &extraction.groups,
            &self.classifier,
            &self.healing,
        )
    }

    /// Build the artifact. Diagnostics of both earlier stages are merged in stage order.
    pub fn assemble(
        &self,
        filename: &str,
        extraction: Extraction,
        connections: ConnectionMap,
    ) -> CompileResult {
        let mut diagnostics = extraction.diagnostics;
        diagnostics.extend(connections.diagnostics);
        let topology = assemble(
            extraction.shapes,
            connections.connections,
            extraction.metadata,
            extraction.page_count,
            &self.topology,
        );
        diagnostics.push(ParseDiagnostic::info(format!(
            "{} device(s), {} connection(s) in {} segment(s)",
            topology.shapes.len(),
            topology.connections.len(),
            topology.segments.len()
        )));
        CompileResult {
            artifact: ParseArtifact::new(filename, topology, connections.unresolved),
            diagnostics,
        }
    }

    /// Run every stage on `bytes`.
    pub fn compile(
        &self,
        filename: &str,
        bytes: impl Into<Vec<u8>>,
    ) -> Result<CompileResult, NetdocError> {
        let archive = self.open(bytes)?;
        let extraction = self.extract(&archive)?;
        let connections = self.heal(&extraction);
        Ok(self.assemble(filename, extraction, connections))
    }
}

/// Serialize an artifact the way it is stored: pretty-printed JSON.
pub fn to_json(artifact: &ParseArtifact) -> Result<Vec<u8>, NetdocError> {
    Ok(serde_json::to_vec_pretty(artifact)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        properties::{ConnectionType, DeviceType, ShapeId},
        tests::helpers::{DiagramFixture, FixtureShape},
    };
    use test_log::test;

    fn compiler() -> DiagramCompiler {
        DiagramCompiler::new(&NetdocConfig::default()).unwrap()
    }

    fn campus() -> DiagramFixture {
        DiagramFixture::new()
            .master("1", "Router")
            .shape(FixtureShape::device("1", "Gateway", 0.0, 0.0).master("1"))
            .shape(FixtureShape::device("2", "Core Switch", 5.0, 0.0).property("IP Address", "10.0.0.2"))
            .shape(FixtureShape::device("3", "Web Server", 10.0, 0.0))
            .shape(FixtureShape::connector("4").from("1").to("2").label("fiber uplink"))
            .shape(FixtureShape::connector("5").from("2").end(9.6, 0.3))
    }

    #[test]
    fn test_compile_end_to_end() {
        let result = compiler().compile("campus.vsdx", campus().build()).unwrap();
        let topology = &result.artifact.topology;
        assert_eq!(topology.page_count, 1);
        assert_eq!(topology.shapes.len(), 3);
        assert_eq!(topology.shapes[0].shape_type, DeviceType::Router);
        assert_eq!(topology.shapes[1].shape_type, DeviceType::Switch);
        assert_eq!(topology.shapes[1].properties["ip_address"], "10.0.0.2");
        assert_eq!(topology.shapes[2].shape_type, DeviceType::Server);

        assert_eq!(topology.connections.len(), 2);
        let uplink = &topology.connections[0];
        assert_eq!(uplink.connection_type, ConnectionType::Fiber);
        assert!(!uplink.healed);
        let healed = &topology.connections[1];
        assert_eq!(healed.target_id, ShapeId::from("3"));
        assert!(healed.healed);
        assert_eq!(topology.metrics.healed_connections, 1);
        assert!(result.artifact.unresolved_connections.is_empty());
    }

    #[test]
    fn test_summary_info_is_not_a_warning() {
        let result = compiler().compile("campus.vsdx", campus().build()).unwrap();
        let last = result.diagnostics.last().unwrap();
        assert_eq!(
            last,
            &ParseDiagnostic::info("3 device(s), 2 connection(s) in 1 segment(s)")
        );
        assert!(result.warnings().all(|d| !matches!(d, ParseDiagnostic::Info(_))));
    }

    #[test]
    fn test_control_glue_leaves_devices_alone() {
        let fixture = DiagramFixture::new()
            .shape(FixtureShape::device("1", "Core Router", 0.0, 0.0))
            .shape(FixtureShape::device("2", "Callout Switch", 4.0, 0.0).glued("Controls.Row_1", "1"));
        let result = compiler().compile("callout.vsdx", fixture.build()).unwrap();
        let topology = &result.artifact.topology;
        assert_eq!(topology.shapes.len(), 2);
        assert_eq!(topology.shapes[1].shape_type, DeviceType::Switch);
        assert!(topology.connections.is_empty());
        assert!(result.artifact.unresolved_connections.is_empty());
    }

    #[test]
    fn test_versioned_acronym_labels_canonicalize() {
        let fixture = DiagramFixture::new().shape(
            FixtureShape::device("1", "Edge Router", 0.0, 0.0)
                .property("IPv4 Address", "10.1.0.1")
                .property("MAC Addr", "00:11:22:33:44:55"),
        );
        let result = compiler().compile("edge.vsdx", fixture.build()).unwrap();
        let properties = &result.artifact.topology.shapes[0].properties;
        assert_eq!(properties["ip_address"], "10.1.0.1");
        assert_eq!(properties["mac_address"], "00:11:22:33:44:55");
    }

    #[test]
    fn test_multi_page_ids_and_order() {
        let fixture = DiagramFixture::new()
            .page_named("One")
            .shape(FixtureShape::device("1", "Router A", 0.0, 0.0))
            .page_named("Two")
            .shape(FixtureShape::device("1", "Router B", 0.0, 0.0))
            .shape(FixtureShape::device("2", "Switch B", 3.0, 0.0))
            .shape(FixtureShape::connector("3").from("1").to("2"));
        let result = compiler().compile("multi.vsdx", fixture.build()).unwrap();
        let topology = &result.artifact.topology;
        assert_eq!(topology.page_count, 2);
        let ids: Vec<&str> = topology.shapes.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1:1", "2:1", "2:2"]);
        assert_eq!(topology.connections[0].source_id, ShapeId::from("2:1"));
        assert_eq!(topology.shapes[1].page, 2);
    }

    #[test]
    fn test_repeated_compilation_is_byte_identical() {
        let bytes = campus().build();
        let first = to_json(&compiler().compile("campus.vsdx", bytes.clone()).unwrap().artifact).unwrap();
        let second = to_json(&compiler().compile("campus.vsdx", bytes).unwrap().artifact).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_enrich_defaults() {
        let mut config = NetdocConfig::default();
        config.extraction.enrich_defaults = true;
        let compiler = DiagramCompiler::new(&config).unwrap();
        let result = compiler.compile("campus.vsdx", campus().build()).unwrap();
        let topology = &result.artifact.topology;
        assert_eq!(topology.shapes[0].properties["vendor"], "Generic");
        assert_eq!(topology.connections[0].properties["bandwidth"], "10 Gbps");
    }

    #[test]
    fn test_broken_page_fails_compilation() {
        use std::io::{Cursor, Write};
        use zip::{write::SimpleFileOptions, ZipWriter};

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in [
            ("[Content_Types].xml", "<Types/>"),
            ("visio/masters/masters.xml", "<Masters/>"),
            ("visio/pages/page1.xml", "<PageContents><Shapes>"),
        ] {
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();
        let err = compiler().compile("broken.vsdx", bytes).unwrap_err();
        assert!(matches!(err, NetdocError::MalformedArchive(_)));
    }
}
