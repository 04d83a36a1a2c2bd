//! # netdoc-core
//!
//! A Rust library for turning network diagrams (`.vsdx`) into a typed, queryable network topology.
//!
//! ## Overview
//!
//! netdoc-core reads the zip/XML container of a diagram, classifies every shape into a device
//! taxonomy, normalizes its custom properties, and maps connectors onto device-to-device
//! connections. Connectors whose endpoints are not glued to a shape are **healed** by snapping
//! them to the nearest shape on the page; anything that still cannot be attached is reported,
//! never silently dropped. The result is a [`ParseArtifact`](topology::ParseArtifact): shapes,
//! connections, document metadata, and derived metrics (density, hubs, isolated devices,
//! segments, device inventory).
//!
//! ### Key Features
//!
//! - **Error tolerance**: a broken cell or dangling connector becomes a diagnostic, not a failure
//! - **Geometric healing**: nearest-centroid endpoint repair within a per-page radius
//! - **Data-driven classification**: keyword tables in TOML, replaceable through configuration
//! - **Deterministic output**: the same input bytes always produce the same artifact bytes
//! - **Job orchestration**: queue-driven workers with retry, state tracking and notifications
//!
//! ## Architecture
//!
//! - **[`codec`]**: Container reading, classification, property extraction, healing (`DiagramCompiler`)
//! - **[`topology`]**: Topology assembly and metrics
//! - **[`properties`]**: Shapes, connections, identifiers and taxonomies
//! - **[`service`]**: The `ParserService` job runner and worker loop
//! - **[`job`]**: Job state machine and retry policy
//! - **[`storage`]** / **[`queue`]**: Blob store, message queue and notification seams
//! - **[`commands`]**: Parse request and completion notification messages
//! - **[`event`]**: Job progress events
//!
//! ## Quick Start
//!
//! ### Parsing a diagram
//!
//! ```rust,no_run
//! use netdoc_core::{codec::DiagramCompiler, config::NetdocConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let compiler = DiagramCompiler::new(&NetdocConfig::default())?;
//!     let bytes = std::fs::read("campus.vsdx")?;
//!     let result = compiler.compile("campus.vsdx", bytes)?;
//!
//!     let topology = &result.artifact.topology;
//!     for shape in &topology.shapes {
//!         println!("{} ({}): {} link(s)", shape.name, shape.shape_type, shape.connection_count);
//!     }
//!     println!("density {}", topology.metrics.network_density);
//!     Ok(())
//! }
//! ```
//!
//! ### Working with Diagnostics
//!
//! ```rust,no_run
//! # use netdoc_core::{codec::{DiagramCompiler, ParseDiagnostic}, config::NetdocConfig};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let compiler = DiagramCompiler::new(&NetdocConfig::default())?;
//! # let result = compiler.compile("campus.vsdx", std::fs::read("campus.vsdx")?)?;
//! for diagnostic in &result.diagnostics {
//!     match diagnostic {
//!         ParseDiagnostic::UnresolvedConnection(unresolved) => {
//!             println!("Dangling connector: {}", unresolved.connector_id);
//!         }
//!         ParseDiagnostic::Warning(msg) => {
//!             println!("Warning: {}", msg);
//!         }
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Running the job service
//!
//! ```rust,no_run
//! use netdoc_core::{
//!     config::NetdocConfig,
//!     queue::{MemoryNotifications, MemoryQueue},
//!     service::ParserService,
//!     storage::FsBlobStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(FsBlobStore::new("./blobs"));
//!     let notifications = Arc::new(MemoryNotifications::default());
//!     let service = ParserService::new(store, notifications.clone(), NetdocConfig::default())?;
//!
//!     let queue = Arc::new(MemoryQueue::default());
//!     queue.push(br#"{"document_id":"d1","file_path":"uploads/d1.vsdx","project_id":"p1"}"#.to_vec());
//!     let (_stop, stop_rx) = tokio::sync::watch::channel(false);
//!     service.run_worker(queue, stop_rx).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **default**: The library
//! - **bin**: The `netdoc` command-line tool (`clap`, `tracing-subscriber`, `ctrlc`)

pub mod codec;
pub mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod properties;
pub mod queue;
pub mod service;
pub mod storage;
#[cfg(test)]
mod tests;
pub mod topology;

pub use error::*;
