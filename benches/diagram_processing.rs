//! Performance benchmarks for diagram processing
//!
//! These benchmarks build synthetic diagrams with the test fixture builder and measure:
//! - Full compilation (container, extraction, healing, assembly)
//! - Healing of dangling connectors against a large shape set
//! - One job through the parser service with in-memory storage
//!
//! Run with: cargo bench

#[allow(dead_code)]
#[path = "../src/tests/helpers.rs"]
mod fixture;

use criterion::{criterion_group, criterion_main, Criterion};
use fixture::{DiagramFixture, FixtureShape};
use netdoc_core::{
    codec::DiagramCompiler,
    commands::ParseRequest,
    config::NetdocConfig,
    queue::MemoryNotifications,
    service::ParserService,
    storage::MemoryBlobStore,
};
use std::sync::Arc;

const LABELS: [&str; 5] = ["Core Router", "Access Switch", "Edge Firewall", "App Server", "Laptop"];

// A grid of `pages` x `per_page` devices chained by glued connectors; every fifth connector
// is left unglued with its end on the next device so it has to be healed.
fn grid_diagram(pages: usize, per_page: usize) -> Vec<u8> {
    let mut fixture = DiagramFixture::new();
    for page in 0..pages {
        fixture = fixture.page_named(&format!("Floor {page}"));
        for i in 0..per_page {
            let (x, y) = ((i % 20) as f64 * 3.0, (i / 20) as f64 * 3.0);
            fixture = fixture.shape(FixtureShape::device(
                &(i + 1).to_string(),
                &format!("{}-{i}", LABELS[i % LABELS.len()]),
                x,
                y,
            ));
        }
        for i in 1..per_page {
            let id = (per_page + i).to_string();
            let connector = FixtureShape::connector(&id).from(&i.to_string());
            let next = ((i % 20) as f64 * 3.0, (i / 20) as f64 * 3.0);
            fixture = fixture.shape(if i % 5 == 0 {
                connector.end(next.0 + 0.2, next.1 + 0.2)
            } else {
                connector.to(&(i + 1).to_string())
            });
        }
    }
    fixture.build()
}

fn bench_compile(c: &mut Criterion) {
    let compiler = DiagramCompiler::new(&NetdocConfig::default()).unwrap();
    let small = grid_diagram(1, 50);
    let large = grid_diagram(4, 400);

    c.bench_function("compile_single_page_50", |b| {
        b.iter(|| compiler.compile("small.vsdx", small.clone()).unwrap())
    });
    c.bench_function("compile_four_pages_400", |b| {
        b.iter(|| compiler.compile("large.vsdx", large.clone()).unwrap())
    });
}

fn bench_heal(c: &mut Criterion) {
    let compiler = DiagramCompiler::new(&NetdocConfig::default()).unwrap();
    let archive = compiler.open(grid_diagram(1, 1000)).unwrap();
    let extraction = compiler.extract(&archive).unwrap();

    c.bench_function("heal_1000_shapes", |b| b.iter(|| compiler.heal(&extraction)));
}

fn bench_service_job(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let blobs = Arc::new(MemoryBlobStore::new());
    blobs.insert("uploads/bench.vsdx", grid_diagram(2, 200));
    let service = ParserService::new(
        blobs,
        Arc::new(MemoryNotifications::default()),
        NetdocConfig::default(),
    )
    .unwrap();

    c.bench_function("service_job_two_pages_200", |b| {
        b.to_async(&rt).iter(|| async {
            service
                .process(ParseRequest::new("bench", "uploads/bench.vsdx", "p1"))
                .await
        });
    });
}

criterion_group!(benches, bench_compile, bench_heal, bench_service_job);
criterion_main!(benches);
