//! GeoJSON file input/output for the batch pipeline.

use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::{ClusterError, Result};
use crate::id_generator::IdGenerator;
use crate::{cluster_ski_areas, ClusterInput, ClusterOutput, ClusteringConfig, FeatureCollection};

/// Locations of the three input and three output collections.
#[derive(Debug, Clone)]
pub struct ClusterPaths {
    pub input_ski_areas: PathBuf,
    pub input_lifts: PathBuf,
    pub input_runs: PathBuf,
    pub output_ski_areas: PathBuf,
    pub output_lifts: PathBuf,
    pub output_runs: PathBuf,
}

impl ClusterPaths {
    /// `skiareas.geojson`, `lifts.geojson` and `runs.geojson` in each directory.
    pub fn in_directories(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        let (input, output) = (input.as_ref(), output.as_ref());
        Self {
            input_ski_areas: input.join("skiareas.geojson"),
            input_lifts: input.join("lifts.geojson"),
            input_runs: input.join("runs.geojson"),
            output_ski_areas: output.join("skiareas.geojson"),
            output_lifts: output.join("lifts.geojson"),
            output_runs: output.join("runs.geojson"),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ClusterError {
    ClusterError::Io { path: path.to_path_buf(), source }
}

fn json_error(path: &Path, source: serde_json::Error) -> ClusterError {
    ClusterError::Json { path: path.to_path_buf(), source }
}

/// Read a feature collection from a GeoJSON file.
pub fn load_collection<P: DeserializeOwned>(path: impl AsRef<Path>) -> Result<FeatureCollection<P>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| json_error(path, e))
}

/// Write a feature collection as GeoJSON.
pub fn write_collection<P: Serialize>(path: impl AsRef<Path>, collection: &FeatureCollection<P>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| io_error(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, collection).map_err(|e| json_error(path, e))?;
    writer.flush().map_err(|e| io_error(path, e))
}

/// Load the inputs, cluster, and write the outputs.
pub fn cluster_files(
    paths: &ClusterPaths,
    config: &ClusteringConfig,
    ids: &mut dyn IdGenerator,
) -> Result<ClusterOutput> {
    config.validate()?;
    let start = Instant::now();

    let input = ClusterInput {
        ski_areas: load_collection(&paths.input_ski_areas)?.features,
        lifts: load_collection(&paths.input_lifts)?.features,
        runs: load_collection(&paths.input_runs)?.features,
    };
    info!(
        "[SkiAreaClustering] Loaded {} ski areas, {} lifts, {} runs",
        input.ski_areas.len(),
        input.lifts.len(),
        input.runs.len()
    );

    let output = cluster_ski_areas(input, config, ids);

    write_collection(&paths.output_ski_areas, &output.ski_areas)?;
    write_collection(&paths.output_lifts, &output.lifts)?;
    write_collection(&paths.output_runs, &output.runs)?;

    info!("[SkiAreaClustering] Wrote outputs in {:?}", start.elapsed());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RunProperties, SequentialIdGenerator};
    use serde_json::json;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ski-area-clustering-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_file_reports_path() {
        let result = load_collection::<RunProperties>("/nonexistent/runs.geojson");
        match result {
            Err(ClusterError::Io { path, .. }) => assert_eq!(path, PathBuf::from("/nonexistent/runs.geojson")),
            other => panic!("expected io error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_reports_path() {
        let dir = scratch_dir("invalid");
        let path = dir.join("runs.geojson");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_collection::<RunProperties>(&path), Err(ClusterError::Json { .. })));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_cluster_files_round_trip() {
        let input = scratch_dir("input");
        let output = scratch_dir("output");

        let empty = json!({"type": "FeatureCollection", "features": []});
        let runs = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0, 100.0], [1.0, 0.0, 90.0]]},
                "properties": {"id": "3", "uses": ["downhill"], "difficulty": null, "skiAreas": [], "color": "#000"}
            }]
        });
        fs::write(input.join("skiareas.geojson"), empty.to_string()).unwrap();
        fs::write(input.join("lifts.geojson"), empty.to_string()).unwrap();
        fs::write(input.join("runs.geojson"), runs.to_string()).unwrap();

        let paths = ClusterPaths::in_directories(&input, &output);
        let mut ids = SequentialIdGenerator::new("mock-UUID");
        let result = cluster_files(&paths, &ClusteringConfig::default(), &mut ids).unwrap();
        assert_eq!(result.ski_areas.features.len(), 1);

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output.join("runs.geojson")).unwrap()).unwrap();
        let properties = &written["features"][0]["properties"];
        assert_eq!(properties["skiAreas"], json!(["mock-UUID-0"]));
        assert_eq!(properties["color"], json!("#000"));

        let areas: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output.join("skiareas.geojson")).unwrap()).unwrap();
        assert_eq!(areas["features"][0]["properties"]["generated"], json!(true));

        fs::remove_dir_all(&input).ok();
        fs::remove_dir_all(&output).ok();
    }
}
