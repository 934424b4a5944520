//! Cluster a synthetic set of resorts and print their statistics.
//!
//! Run with: cargo run --example synthetic_resort --features parallel

use ski_area_clustering::{
    assemble_output, compute_statistics, compute_statistics_parallel, resolve_membership, ClusterInput,
    ClusteringConfig, Geometry, LiftFeature, LiftProperties, LiftType,
    Position, RunDifficulty, RunFeature, RunProperties, RunUse, SequentialIdGenerator, SkiAreaFeature,
    SkiAreaProperties, Source, SourceType,
};
use std::time::Instant;

fn main() {
    println!("Synthetic Resort Clustering Example\n");

    let mut input = ClusterInput::default();

    // Alpine resort covered by a Skimap.org point
    input.ski_areas.push(SkiAreaFeature::new(
        Geometry::Point(Position::new(11.1220, 47.5571)),
        SkiAreaProperties::authoritative(
            "skimap-1",
            Some("Alpine Resort".to_string()),
            Source { source_type: SourceType::SkimapOrg, id: "1".to_string() },
        ),
    ));
    add_resort(&mut input, "alpine", 11.1220, 47.5571, 6);

    // Unmapped resorts in North America and Japan, plus a nordic loop
    add_resort(&mut input, "rockies", -106.80, 39.60, 10);
    add_resort(&mut input, "hakuba", 137.85, 36.70, 8);
    input.runs.push(RunFeature::new(
        Geometry::LineString(vec![
            Position::with_elevation(10.50, 46.90, 1600.0),
            Position::with_elevation(10.51, 46.90, 1610.0),
            Position::with_elevation(10.51, 46.91, 1590.0),
        ]),
        RunProperties::new("nordic-loop", vec![RunUse::Nordic], Some(RunDifficulty::Easy)),
    ));

    // A lonely ski tour, never clustered
    input.runs.push(RunFeature::new(
        Geometry::LineString(vec![Position::new(9.0, 46.0), Position::new(9.01, 46.02)]),
        RunProperties::new("tour", vec![RunUse::Skitour], None),
    ));

    println!("Created {} runs and {} lifts\n", input.runs.len(), input.lifts.len());

    let config = ClusteringConfig::default();
    let mut ids = SequentialIdGenerator::new("synthetic");

    let start = Instant::now();
    let membership = resolve_membership(input.ski_areas, &input.runs, &input.lifts, &config, &mut ids);
    println!("Membership resolved in {:?}", start.elapsed());

    // Sequential statistics
    let start = Instant::now();
    let sequential = compute_statistics(&membership, &input.runs, &input.lifts, config.vertical_mode);
    println!("Sequential statistics: {:?}", start.elapsed());

    // Parallel statistics
    let start = Instant::now();
    let statistics = compute_statistics_parallel(&membership, &input.runs, &input.lifts, config.vertical_mode);
    println!("Parallel statistics: {:?}", start.elapsed());
    println!("Results match: {}\n", sequential == statistics);

    let output = assemble_output(membership, statistics, input.runs, input.lifts);

    println!("Found {} ski areas:\n", output.ski_areas.features.len());

    for ski_area in &output.ski_areas.features {
        let properties = &ski_area.properties;
        println!(
            "  {} ({}) generated={} activities={:?} convention={:?}",
            properties.id,
            properties.name.as_deref().unwrap_or("unnamed"),
            properties.generated,
            properties.activities,
            properties.run_convention,
        );
        if let Some(statistics) = &properties.statistics {
            for (activity, runs) in &statistics.runs.by_activity {
                println!(
                    "    {:?} runs: {} ({:.2} km, {:.0} m descent)",
                    activity,
                    runs.total.count,
                    runs.total.length_in_km,
                    runs.total.combined_elevation_change.unwrap_or(0.0)
                );
            }
            for (lift_type, lifts) in &statistics.lifts.by_type {
                println!("    {} lifts: {} ({:.2} km)", lift_type, lifts.count, lifts.length_in_km);
            }
            if let (Some(min), Some(max)) = (statistics.min_elevation, statistics.max_elevation) {
                println!("    elevation: {:.0} - {:.0} m", min, max);
            }
        }
    }

    let unassigned = output.runs.features.iter().filter(|r| r.properties.ski_areas.is_empty()).count();
    println!("\nUnassigned runs: {}", unassigned);
}

/// A chairlift with `runs` runs fanning out from its top station.
fn add_resort(input: &mut ClusterInput, name: &str, lng: f64, lat: f64, runs: usize) {
    let base = Position::with_elevation(lng, lat, 1200.0);
    let top = Position::with_elevation(lng + 0.004, lat + 0.006, 1900.0);

    input.lifts.push(LiftFeature::new(
        Geometry::LineString(vec![base.clone(), top.clone()]),
        LiftProperties::new(format!("{}-lift", name), LiftType::ChairLift),
    ));

    let difficulties = [RunDifficulty::Easy, RunDifficulty::Intermediate, RunDifficulty::Advanced];
    for i in 0..runs {
        let spread = (i as f64 - runs as f64 / 2.0) * 0.001;
        let mid = Position::with_elevation(lng + 0.002 + spread, lat + 0.003, 1550.0 - i as f64 * 10.0);
        input.runs.push(RunFeature::new(
            Geometry::LineString(vec![top.clone(), mid, base.clone()]),
            RunProperties::new(
                format!("{}-run-{}", name, i),
                vec![RunUse::Downhill],
                Some(difficulties[i % difficulties.len()].clone()),
            ),
        ));
    }
}
