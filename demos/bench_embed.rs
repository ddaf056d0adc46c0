//! Manual latency probe for the embedder. Not part of the package build
//! (see `exclude` in Cargo.toml) — run with `rustc --edition 2021
//! -L target/debug/deps --extern reqrag=... demos/bench_embed.rs` against
//! a built `libreqrag`, or copy into a scratch `[[bin]]` entry locally.

use std::time::Instant;

use reqrag::embedder::{Embedder, ModelSpec};

fn main() {
    println!("Initializing embedder...");
    let start = Instant::now();
    let embedder = Embedder::new(&ModelSpec::default()).unwrap();
    println!("Init: {:?}", start.elapsed());
    println!("Provider: {}", embedder.provider());

    println!("\nWarmup...");
    let start = Instant::now();
    embedder.warm().unwrap();
    println!("Warmup: {:?}", start.elapsed());

    println!("\nSingle query embeddings:");
    for query in [
        "בקשות מאת דנה כהן",
        "בקשות דחופות",
        "סיכום בקשות בפרויקט תשתיות",
        "דומה ל REQ-42",
        "בקשות בסטטוס 2",
    ] {
        let start = Instant::now();
        let _ = embedder.embed_query(query).unwrap();
        println!("  {:30} {:?}", query, start.elapsed());
    }

    println!("\nBatch embedding (10 chunks):");
    let docs: Vec<&str> = (0..10).map(|_| "פרויקט: תשתיות צפון | סטטוס: 2 | עודכן על ידי: דנה כהן").collect();
    let start = Instant::now();
    let _ = embedder.embed_documents(&docs).unwrap();
    println!("  10 chunks: {:?} ({:?}/chunk)", start.elapsed(), start.elapsed() / 10);
}
