//! Diagram parsing: from `.vsdx` bytes to classified shapes and mapped connections.
//!
//! ## Key Components
//!
//! - [`DiagramArchive`] - Validated zip container with lazy page access
//! - [`read_page`](page::read_page) - Page XML to raw shapes, connectors and group containers
//! - [`Classifier`] - Keyword-table device and link classification
//! - [`custom_props`] - Property row normalization and canonical keys
//! - [`heal::map`] - Connector resolution with geometric endpoint repair
//! - [`resolve`] - Device role/vendor/model profiles for the inventory
//! - [`DiagramCompiler`] - Runs the stages above and assembles the topology
//! - [`ParseDiagnostic`] - Non-fatal findings, including unresolved connectors
//!
//! ## Rule Tables
//!
//! Device and connection keywords live in TOML tables embedded from `assets/`. The first rule
//! (in file order) with a matching keyword wins, so more specific categories come first:
//!
//! ```rust
//! use netdoc_core::{codec::RuleTable, properties::DeviceType};
//!
//! let table = RuleTable::<DeviceType>::from_toml(
//!     r#"
//! [[rule]]
//! kind = "firewall"
//! keywords = ["fw", "palo alto"]
//!
//! [[rule]]
//! kind = "router"
//! keywords = ["router", "isr*"]
//! "#,
//! )?;
//! assert_eq!(table.first_match("EDGE-FW-01"), Some(DeviceType::Firewall));
//! assert_eq!(table.first_match("ISR4331 branch"), Some(DeviceType::Router));
//! assert_eq!(table.first_match("printer"), None);
//! # Ok::<(), netdoc_core::NetdocError>(())
//! ```

pub mod archive;
pub mod classify;
pub mod compiler;
pub mod custom_props;
pub mod diagnostic;
pub mod heal;
pub mod page;
pub mod resolve;

pub use archive::{DiagramArchive, DocumentMetadata};
pub use classify::{Classifier, MasterMap, RuleTable};
pub use compiler::{to_json, CompileResult, DiagramCompiler, Extraction};
pub use diagnostic::{Endpoint, EndpointStatus, ParseDiagnostic, UnresolvedConnection, UnresolvedReason};
pub use heal::{ConnectionMap, HealingOptions};
pub use resolve::{DeviceProfile, DeviceRole};
