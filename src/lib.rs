//! # Ski Area Clustering
//!
//! Ski area clustering and statistics aggregation for winter sports map data.
//!
//! This library provides:
//! - Merging of authoritative ski areas (OpenStreetMap, Skimap.org) describing the same place
//! - Assignment of runs and lifts to authoritative ski areas by containment and proximity
//! - Synthesis of generated ski areas from connected runs and lifts nobody claimed
//! - Nested per-ski-area statistics (runs by activity and difficulty, lifts by type)
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel processing with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use ski_area_clustering::{
//!     ClusterInput, ClusteringConfig, Geometry, Position, RunFeature, RunProperties, RunUse,
//!     SequentialIdGenerator, cluster_ski_areas,
//! };
//!
//! let run = RunFeature::new(
//!     Geometry::LineString(vec![
//!         Position::with_elevation(11.10, 47.55, 1500.0),
//!         Position::with_elevation(11.11, 47.55, 1200.0),
//!     ]),
//!     RunProperties::new("run-1", vec![RunUse::Downhill], None),
//! );
//!
//! let input = ClusterInput { runs: vec![run], ..Default::default() };
//! let mut ids = SequentialIdGenerator::new("area");
//! let output = cluster_ski_areas(input, &ClusteringConfig::default(), &mut ids);
//!
//! assert_eq!(output.ski_areas.features.len(), 1);
//! assert_eq!(output.runs.features[0].properties.ski_areas, vec!["area-0".to_string()]);
//! ```

use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

pub mod error;
pub use error::{ClusterError, Result};

pub mod features;
pub use features::{
    Activity, ElevationProfile, Feature, FeatureCollection, Geometry, LiftFeature, LiftProperties,
    LiftType, Position, RunConvention, RunDifficulty, RunFeature, RunProperties, RunUse,
    SkiAreaFeature, SkiAreaProperties, Source, SourceType, Status,
};

pub mod geo_utils;

pub mod activity;
pub use activity::DifficultyBucket;

pub mod id_generator;
pub use id_generator::{IdGenerator, SequentialIdGenerator, UuidIdGenerator};

pub mod spatial;
pub mod union_find;

// Authoritative ski area merging
pub mod merge;
pub use merge::{merge_authoritative_ski_areas, MergedSkiArea};

// Membership resolution (claims + connectivity clustering)
pub mod clustering;
pub use clustering::{resolve_membership, Membership, SkiAreaMembers};

pub mod statistics;
pub use statistics::{compute_statistics, RunStatistics, SkiAreaStatistics, Stats};
#[cfg(feature = "parallel")]
pub use statistics::compute_statistics_parallel;

pub mod assembly;
pub use assembly::assemble_output;

pub mod io;
pub use io::{cluster_files, load_collection, write_collection, ClusterPaths};

// ============================================================================
// Core Types
// ============================================================================

/// Bounding box in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

/// How the top-level elevation range of a ski area is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerticalMode {
    /// Min/max across both the run and the lift subtrees.
    #[default]
    Combined,
    /// Overlap of the lift range and the run range, when both exist and overlap.
    LiftServed,
}

/// Configuration for clustering and statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusteringConfig {
    /// Maximum gap between two unclaimed features for them to be linked.
    /// Default: 60.0 meters
    pub connectivity_threshold_meters: f64,

    /// Tolerance around authoritative polygon ski areas when claiming features.
    /// Default: 25.0 meters
    pub claim_tolerance_meters: f64,

    /// Radius around authoritative point ski areas when claiming features.
    /// Default: 500.0 meters
    pub point_claim_radius_meters: f64,

    /// Authoritative point ski areas from different datasets closer than this are merged.
    /// Default: 250.0 meters
    pub merge_distance_meters: f64,

    /// Extend point ski area claims through the connectivity graph.
    /// Default: true
    pub expand_point_claims: bool,

    /// Default: [`VerticalMode::Combined`]
    pub vertical_mode: VerticalMode,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            connectivity_threshold_meters: 60.0,
            claim_tolerance_meters: 25.0,
            point_claim_radius_meters: 500.0,
            merge_distance_meters: 250.0,
            expand_point_claims: true,
            vertical_mode: VerticalMode::Combined,
        }
    }
}

impl ClusteringConfig {
    /// Reject negative or non-finite distances.
    pub fn validate(&self) -> Result<()> {
        let distances = [
            ("connectivityThresholdMeters", self.connectivity_threshold_meters),
            ("claimToleranceMeters", self.claim_tolerance_meters),
            ("pointClaimRadiusMeters", self.point_claim_radius_meters),
            ("mergeDistanceMeters", self.merge_distance_meters),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value < 0.0 {
                return Err(ClusterError::InvalidConfig(format!(
                    "{} must be a non-negative distance, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Load and validate a JSON configuration file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ClusterError::Io { path: path.to_path_buf(), source })?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|source| ClusterError::Json { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }
}

/// The three input collections, already elevation-augmented and normalized.
#[derive(Debug, Clone, Default)]
pub struct ClusterInput {
    pub ski_areas: Vec<SkiAreaFeature>,
    pub lifts: Vec<LiftFeature>,
    pub runs: Vec<RunFeature>,
}

/// The three output collections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterOutput {
    pub ski_areas: FeatureCollection<SkiAreaProperties>,
    pub lifts: FeatureCollection<LiftProperties>,
    pub runs: FeatureCollection<RunProperties>,
}

// ============================================================================
// Core Functions
// ============================================================================

/// Cluster runs and lifts into ski areas and annotate every ski area with statistics.
///
/// Malformed features are logged and left unassigned; the batch never aborts.
pub fn cluster_ski_areas(
    input: ClusterInput,
    config: &ClusteringConfig,
    ids: &mut dyn IdGenerator,
) -> ClusterOutput {
    let start = Instant::now();
    let ClusterInput { ski_areas, lifts, runs } = input;

    let membership = resolve_membership(ski_areas, &runs, &lifts, config, ids);

    #[cfg(feature = "parallel")]
    let statistics = compute_statistics_parallel(&membership, &runs, &lifts, config.vertical_mode);
    #[cfg(not(feature = "parallel"))]
    let statistics = compute_statistics(&membership, &runs, &lifts, config.vertical_mode);

    let output = assemble_output(membership, statistics, runs, lifts);

    info!(
        "[SkiAreaClustering] Produced {} ski areas in {:?}",
        output.ski_areas.features.len(),
        start.elapsed()
    );
    output
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn line(coords: &[(f64, f64)]) -> Geometry {
        Geometry::LineString(coords.iter().map(|&(lng, lat)| Position::new(lng, lat)).collect())
    }

    fn run(id: &str, uses: Vec<RunUse>, geometry: Geometry) -> RunFeature {
        RunFeature::new(geometry, RunProperties::new(id, uses, None))
    }

    fn cluster(input: ClusterInput) -> ClusterOutput {
        let mut ids = SequentialIdGenerator::new("mock-UUID");
        cluster_ski_areas(input, &ClusteringConfig::default(), &mut ids)
    }

    fn rabenkopf_input() -> ClusterInput {
        let ski_area = SkiAreaFeature::new(
            Geometry::Point(Position::new(11.122066084534, 47.557111836837)),
            SkiAreaProperties::authoritative(
                "1",
                Some("Rabenkopflift Oberau".to_string()),
                Source { source_type: SourceType::SkimapOrg, id: "13666".to_string() },
            ),
        );
        let lift = LiftFeature::new(
            line(&[(11.1223444, 47.5572422), (11.1164297, 47.5581563)]),
            LiftProperties::new("2", LiftType::TBar),
        );
        let runs = vec![
            run("3", vec![RunUse::Downhill], line(&[(11.1164229, 47.558125), (11.1171866, 47.5576413)])),
            run("4", vec![RunUse::Sled], line(&[(11.1165, 47.5582), (11.1170, 47.5579)])),
        ];
        ClusterInput { ski_areas: vec![ski_area], lifts: vec![lift], runs }
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: ClusteringConfig =
            serde_json::from_value(json!({"connectivityThresholdMeters": 30.0, "verticalMode": "liftServed"})).unwrap();
        assert_eq!(config.connectivity_threshold_meters, 30.0);
        assert_eq!(config.vertical_mode, VerticalMode::LiftServed);
        assert_eq!(config.point_claim_radius_meters, 500.0);
        assert!(config.expand_point_claims);
    }

    #[test]
    fn test_config_validation() {
        assert!(ClusteringConfig::default().validate().is_ok());
        let config = ClusteringConfig { claim_tolerance_meters: -1.0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ClusterError::InvalidConfig(_))));
        let config = ClusteringConfig { merge_distance_meters: f64::NAN, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_single_downhill_run_statistics() {
        let input = ClusterInput {
            runs: vec![run(
                "3",
                vec![RunUse::Downhill],
                Geometry::LineString(vec![
                    Position::with_elevation(0.0, 0.0, 100.0),
                    Position::with_elevation(1.0, 0.0, 90.0),
                ]),
            )],
            ..Default::default()
        };
        let output = cluster(input);
        assert_eq!(output.ski_areas.features.len(), 1);

        let value = serde_json::to_value(&output.ski_areas.features[0]).unwrap();
        assert_eq!(value["geometry"], json!({"type": "Point", "coordinates": [0.5, 0.0]}));

        let properties = &value["properties"];
        assert_eq!(properties["id"], json!("mock-UUID-0"));
        assert_eq!(properties["generated"], json!(true));
        assert_eq!(properties["name"], json!(null));
        assert_eq!(properties["sources"], json!([]));
        assert_eq!(properties["activities"], json!(["downhill"]));
        assert_eq!(properties["status"], json!("operating"));
        assert_eq!(properties["runConvention"], json!("europe"));
        assert_eq!(properties["type"], json!("skiArea"));

        let statistics = &properties["statistics"];
        let other = &statistics["runs"]["byActivity"]["downhill"]["byDifficulty"]["other"];
        assert_eq!(other["count"], json!(1));
        assert_eq!(other["minElevation"], json!(90.0));
        assert_eq!(other["maxElevation"], json!(100.0));
        assert_eq!(other["combinedElevationChange"], json!(10.0));
        let length = other["lengthInKm"].as_f64().unwrap();
        assert!((length - 111.195_080_233_532_9).abs() < 1e-6);
        assert_eq!(statistics["minElevation"], json!(90.0));
        assert_eq!(statistics["maxElevation"], json!(100.0));
        assert_eq!(statistics["lifts"], json!({"byType": {}}));
    }

    #[test]
    fn test_point_ski_area_with_lift_and_runs() {
        let output = cluster(rabenkopf_input());
        assert_eq!(output.ski_areas.features.len(), 1);

        let ski_area = &output.ski_areas.features[0].properties;
        assert_eq!(ski_area.id, "1");
        assert!(!ski_area.generated);
        assert_eq!(ski_area.activities, vec![Activity::Downhill]);
        assert_eq!(ski_area.run_convention, Some(RunConvention::Europe));

        let statistics = ski_area.statistics.as_ref().unwrap();
        let t_bar = &statistics.lifts.by_type[&LiftType::TBar];
        assert_eq!(t_bar.count, 1);
        assert!((t_bar.length_in_km - 0.455_327_355_361_944_5).abs() < 1e-3);
        assert_eq!(statistics.runs.by_activity.len(), 1);
        assert_eq!(statistics.min_elevation, None);

        assert_eq!(output.lifts.features[0].properties.ski_areas, vec!["1".to_string()]);
        assert_eq!(output.runs.features[0].properties.ski_areas, vec!["1".to_string()]);
    }

    #[test]
    fn test_every_referenced_id_is_emitted_once() {
        let mut input = rabenkopf_input();
        input.runs.push(run("far", vec![RunUse::Downhill], line(&[(12.0, 47.0), (12.001, 47.0)])));
        input.runs.push(run("nordic", vec![RunUse::Nordic], line(&[(12.0, 47.0), (12.001, 47.0)])));
        let output = cluster(input);

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for ski_area in &output.ski_areas.features {
            *counts.entry(ski_area.properties.id.as_str()).or_default() += 1;
        }
        let referenced = output
            .runs
            .features
            .iter()
            .flat_map(|r| r.properties.ski_areas.iter())
            .chain(output.lifts.features.iter().flat_map(|l| l.properties.ski_areas.iter()));
        for id in referenced {
            assert_eq!(counts.get(id.as_str()), Some(&1), "id {} not emitted exactly once", id);
        }

        for ski_area in &output.ski_areas.features {
            let properties = &ski_area.properties;
            if properties.generated {
                assert!(properties.sources.is_empty());
                assert!(properties.name.is_none());
            } else {
                assert!(!properties.sources.is_empty());
            }
        }
    }

    #[test]
    fn test_backcountry_run_stays_unassigned() {
        let input = ClusterInput {
            runs: vec![run("tour", vec![RunUse::Skitour], line(&[(11.0, 47.0), (11.01, 47.01)]))],
            ..Default::default()
        };
        let output = cluster(input);
        assert!(output.ski_areas.features.is_empty());
        assert_eq!(output.runs.features.len(), 1);
        assert!(output.runs.features[0].properties.ski_areas.is_empty());
    }

    #[test]
    fn test_coincident_runs_with_disjoint_activities() {
        let geometry = line(&[(11.0, 47.0), (11.001, 47.0)]);
        let input = ClusterInput {
            runs: vec![
                run("downhill", vec![RunUse::Downhill], geometry.clone()),
                run("nordic", vec![RunUse::Nordic], geometry),
            ],
            ..Default::default()
        };
        let output = cluster(input);
        assert_eq!(output.ski_areas.features.len(), 2);

        let downhill_area = &output.runs.features[0].properties.ski_areas;
        let nordic_area = &output.runs.features[1].properties.ski_areas;
        assert_eq!(downhill_area.len(), 1);
        assert_eq!(nordic_area.len(), 1);
        assert_ne!(downhill_area, nordic_area);

        for ski_area in &output.ski_areas.features {
            let statistics = ski_area.properties.statistics.as_ref().unwrap();
            assert_eq!(statistics.runs.by_activity.len(), 1);
            assert_eq!(ski_area.properties.activities.len(), 1);
        }
    }

    #[test]
    fn test_adjacent_downhill_runs_share_area() {
        let input = ClusterInput {
            runs: vec![
                run("a", vec![RunUse::Downhill], line(&[(11.0, 47.0), (11.001, 47.0)])),
                run("b", vec![RunUse::Downhill], line(&[(11.0012, 47.0), (11.002, 47.0)])),
            ],
            ..Default::default()
        };
        let output = cluster(input);
        assert_eq!(output.ski_areas.features.len(), 1);
        let statistics = output.ski_areas.features[0].properties.statistics.as_ref().unwrap();
        assert_eq!(statistics.runs.by_activity[&Activity::Downhill].total.count, 2);
    }

    #[test]
    fn test_empty_grouping_keys_are_omitted() {
        let input = ClusterInput {
            runs: vec![run("n", vec![RunUse::Nordic], line(&[(11.0, 47.0), (11.001, 47.0)]))],
            ..Default::default()
        };
        let output = cluster(input);
        let value = serde_json::to_value(&output.ski_areas.features[0].properties.statistics).unwrap();
        let by_activity = value["runs"]["byActivity"].as_object().unwrap();
        assert_eq!(by_activity.keys().collect::<Vec<_>>(), vec!["nordic"]);
        let by_difficulty = by_activity["nordic"]["byDifficulty"].as_object().unwrap();
        assert_eq!(by_difficulty.keys().collect::<Vec<_>>(), vec!["other"]);
    }

    #[test]
    fn test_authoritative_area_without_members_is_emitted() {
        let ski_area = SkiAreaFeature::new(
            Geometry::Point(Position::new(138.5, 36.7)),
            SkiAreaProperties::authoritative(
                "lonely",
                None,
                Source { source_type: SourceType::OpenStreetMap, id: "node/1".to_string() },
            ),
        );
        let output = cluster(ClusterInput { ski_areas: vec![ski_area], ..Default::default() });
        let properties = &output.ski_areas.features[0].properties;
        assert_eq!(properties.run_convention, Some(RunConvention::Japan));
        assert_eq!(properties.statistics, Some(SkiAreaStatistics::default()));
    }

    #[test]
    fn test_output_is_reproducible() {
        let first = serde_json::to_string(&cluster(rabenkopf_input())).unwrap();
        let second = serde_json::to_string(&cluster(rabenkopf_input())).unwrap();
        assert_eq!(first, second);
    }

    /// Rabenkopf plus an OSM polygon resort and unclaimed downhill and nordic runs.
    fn mixed_input() -> ClusterInput {
        let mut input = rabenkopf_input();
        input.ski_areas.push(SkiAreaFeature::new(
            Geometry::Polygon(vec![vec![
                Position::new(10.0, 46.0),
                Position::new(10.01, 46.0),
                Position::new(10.01, 46.01),
                Position::new(10.0, 46.01),
                Position::new(10.0, 46.0),
            ]]),
            SkiAreaProperties::authoritative(
                "osm-7",
                None,
                Source { source_type: SourceType::OpenStreetMap, id: "way/7".to_string() },
            ),
        ));
        input.runs.extend([
            run("in-polygon", vec![RunUse::Downhill], line(&[(10.002, 46.008), (10.004, 46.002)])),
            run("crossing-a", vec![RunUse::Downhill], line(&[(12.0, 46.99), (12.0, 47.01)])),
            run("crossing-b", vec![RunUse::Downhill], line(&[(11.99, 47.0), (12.01, 47.0)])),
            run("loop", vec![RunUse::Nordic], line(&[(13.0, 47.0), (13.01, 47.0), (13.01, 47.01)])),
        ]);
        input.lifts.push(LiftFeature::new(
            line(&[(12.0, 47.0), (12.005, 47.005)]),
            LiftProperties::new("chair", LiftType::ChairLift),
        ));
        input
    }

    #[test]
    fn test_mixed_output_is_reproducible() {
        let first = cluster(mixed_input());
        let generated: Vec<&str> = first
            .ski_areas
            .features
            .iter()
            .filter(|a| a.properties.generated)
            .map(|a| a.properties.id.as_str())
            .collect();
        assert_eq!(generated, vec!["mock-UUID-0", "mock-UUID-1"]);

        let second = cluster(mixed_input());
        assert_eq!(serde_json::to_string(&first).unwrap(), serde_json::to_string(&second).unwrap());
    }

    #[test]
    fn test_reclustering_own_output_is_stable() {
        let input = mixed_input();
        let ski_areas = input.ski_areas.clone();
        let first = cluster(input);

        // Runs and lifts come back carrying their previous skiAreas
        let again = cluster(ClusterInput {
            ski_areas,
            lifts: first.lifts.features.clone(),
            runs: first.runs.features.clone(),
        });
        assert_eq!(serde_json::to_string(&first).unwrap(), serde_json::to_string(&again).unwrap());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_statistics_match_sequential() {
        let input = mixed_input();
        let mut ids = SequentialIdGenerator::new("mock-UUID");
        let membership =
            resolve_membership(input.ski_areas, &input.runs, &input.lifts, &ClusteringConfig::default(), &mut ids);

        for mode in [VerticalMode::Combined, VerticalMode::LiftServed] {
            let sequential = compute_statistics(&membership, &input.runs, &input.lifts, mode);
            let parallel = compute_statistics_parallel(&membership, &input.runs, &input.lifts, mode);
            assert_eq!(
                serde_json::to_string(&sequential).unwrap(),
                serde_json::to_string(&parallel).unwrap()
            );
        }
    }
}
