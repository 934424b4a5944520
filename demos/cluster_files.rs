//! Cluster a directory of GeoJSON extracts.
//!
//! Expects `skiareas.geojson`, `lifts.geojson` and `runs.geojson` in the input directory
//! and writes the clustered collections under the same names to the output directory.
//!
//! Run with: cargo run --example cluster_files -- <input-dir> <output-dir> [config.json]

use ski_area_clustering::{cluster_files, ClusterPaths, ClusteringConfig, UuidIdGenerator};
use std::env;
use std::process;
use std::time::Instant;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <input-dir> <output-dir> [config.json]", args[0]);
        process::exit(2);
    }

    let config = match args.get(3) {
        Some(path) => match ClusteringConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        None => ClusteringConfig::default(),
    };

    println!("Ski Area Clustering\n");
    println!("Config: {:?}\n", config);

    let paths = ClusterPaths::in_directories(&args[1], &args[2]);
    let start = Instant::now();
    let output = match cluster_files(&paths, &config, &mut UuidIdGenerator) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    let elapsed = start.elapsed();

    let generated = output.ski_areas.features.iter().filter(|a| a.properties.generated).count();
    let unassigned_runs = output.runs.features.iter().filter(|r| r.properties.ski_areas.is_empty()).count();
    let unassigned_lifts = output.lifts.features.iter().filter(|l| l.properties.ski_areas.is_empty()).count();

    println!("Clustering completed in {:?}\n", elapsed);
    println!("Stats:");
    println!("  Ski areas: {} ({} generated)", output.ski_areas.features.len(), generated);
    println!("  Runs: {} ({} unassigned)", output.runs.features.len(), unassigned_runs);
    println!("  Lifts: {} ({} unassigned)", output.lifts.features.len(), unassigned_lifts);
}
