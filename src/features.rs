//! GeoJSON-compatible feature types for ski areas, lifts and runs.
//!
//! Geometries keep their coordinates exactly as they were read, including an
//! optional third (elevation) component, so emitted collections carry the
//! upstream geometry untouched. Properties this crate does not interpret are
//! preserved through a flattened map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::statistics::SkiAreaStatistics;

// ============================================================================
// Geometry
// ============================================================================

/// A single coordinate: `[lng, lat]` or `[lng, lat, elevation]`.
///
/// Stored as the raw number array so that serialization reproduces the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(pub Vec<f64>);

impl Position {
    /// Create a position without elevation.
    pub fn new(lng: f64, lat: f64) -> Self {
        Self(vec![lng, lat])
    }

    /// Create a position carrying an elevation sample in meters.
    pub fn with_elevation(lng: f64, lat: f64, elevation: f64) -> Self {
        Self(vec![lng, lat, elevation])
    }

    pub fn lng(&self) -> f64 {
        self.0.first().copied().unwrap_or(f64::NAN)
    }

    pub fn lat(&self) -> f64 {
        self.0.get(1).copied().unwrap_or(f64::NAN)
    }

    /// Elevation sample, if present and finite.
    pub fn elevation(&self) -> Option<f64> {
        self.0.get(2).copied().filter(|e| e.is_finite())
    }

    /// Check if the position has valid WGS84 coordinates.
    pub fn is_valid(&self) -> bool {
        let (lng, lat) = (self.lng(), self.lat());
        lng.is_finite()
            && lat.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng)
    }
}

/// GeoJSON geometry, adjacently tagged as `{"type": ..., "coordinates": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// Every vertex sequence of the geometry.
    ///
    /// Points (and each member of a multi-point) are single-vertex sequences;
    /// polygon rings are returned as closed sequences.
    pub fn vertex_sequences(&self) -> Vec<&[Position]> {
        match self {
            Geometry::Point(p) => vec![std::slice::from_ref(p)],
            Geometry::MultiPoint(points) => points.iter().map(std::slice::from_ref).collect(),
            Geometry::LineString(line) => vec![line.as_slice()],
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                lines.iter().map(Vec::as_slice).collect()
            }
            Geometry::MultiPolygon(polygons) => polygons
                .iter()
                .flat_map(|rings| rings.iter().map(Vec::as_slice))
                .collect(),
        }
    }

    /// Vertices used for centroid computation: polygon rings drop their
    /// closing coordinate so it is not counted twice.
    pub fn centroid_vertices(&self) -> Vec<&Position> {
        match self {
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => self
                .vertex_sequences()
                .into_iter()
                .flat_map(|ring| {
                    let open = if ring.len() > 1 && ring.first() == ring.last() {
                        &ring[..ring.len() - 1]
                    } else {
                        ring
                    };
                    open.iter()
                })
                .collect(),
            _ => self.vertex_sequences().into_iter().flatten().collect(),
        }
    }

    /// Polygons as lists of rings (outer ring first). Empty for non-areal geometries.
    pub fn polygons(&self) -> Vec<&[Vec<Position>]> {
        match self {
            Geometry::Polygon(rings) => vec![rings.as_slice()],
            Geometry::MultiPolygon(polygons) => polygons.iter().map(Vec::as_slice).collect(),
            _ => vec![],
        }
    }

    pub fn is_areal(&self) -> bool {
        matches!(self, Geometry::Polygon(_) | Geometry::MultiPolygon(_))
    }

    /// A geometry is usable when it has at least one vertex and every vertex is valid.
    pub fn is_valid(&self) -> bool {
        let sequences = self.vertex_sequences();
        !sequences.is_empty()
            && sequences
                .iter()
                .all(|seq| !seq.is_empty() && seq.iter().all(Position::is_valid))
    }
}

// ============================================================================
// Features & Collections
// ============================================================================

/// A GeoJSON feature with typed properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature<P> {
    pub geometry: Geometry,
    pub properties: P,
}

impl<P> Feature<P> {
    pub fn new(geometry: Geometry, properties: P) -> Self {
        Self { geometry, properties }
    }
}

/// A GeoJSON feature collection with typed properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection<P> {
    pub features: Vec<Feature<P>>,
}

impl<P> FeatureCollection<P> {
    pub fn new(features: Vec<Feature<P>>) -> Self {
        Self { features }
    }
}

pub type RunFeature = Feature<RunProperties>;
pub type LiftFeature = Feature<LiftProperties>;
pub type SkiAreaFeature = Feature<SkiAreaProperties>;

// ============================================================================
// String-backed enums
// ============================================================================

/// Declares an enum that round-trips through its string value. Values not
/// known to this crate are kept verbatim in `Other`.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $value,)+
                    $name::Other(value) => value.as_str(),
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                let known = match value.as_str() {
                    $($value => Some($name::$variant),)+
                    _ => None,
                };
                known.unwrap_or_else(|| $name::Other(value))
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name::from(value.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                match value {
                    $name::Other(value) => value,
                    known => known.as_str().to_string(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// Usage tag of a run as normalized upstream.
    RunUse {
        Downhill => "downhill",
        Nordic => "nordic",
        Skitour => "skitour",
        Sled => "sled",
        Hike => "hike",
        Sleigh => "sleigh",
        SnowPark => "snow_park",
        Playground => "playground",
        Fatbike => "fatbike",
        Connection => "connection",
    }
}

string_enum! {
    /// Normalized run difficulty.
    RunDifficulty {
        Novice => "novice",
        Easy => "easy",
        Intermediate => "intermediate",
        Advanced => "advanced",
        Expert => "expert",
        Freeride => "freeride",
        Extreme => "extreme",
    }
}

string_enum! {
    /// Aerialway / lift type.
    LiftType {
        CableCar => "cable_car",
        Gondola => "gondola",
        MixedLift => "mixed_lift",
        ChairLift => "chair_lift",
        DragLift => "drag_lift",
        TBar => "t-bar",
        JBar => "j-bar",
        Platter => "platter",
        RopeTow => "rope_tow",
        MagicCarpet => "magic_carpet",
        Funicular => "funicular",
        Railway => "railway",
    }
}

/// Ski-area level activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    Downhill,
    Nordic,
    Backcountry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Operating,
    Disused,
    Abandoned,
    Proposed,
    Planned,
    Construction,
}

/// Regional convention used to interpret run difficulty colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunConvention {
    Europe,
    Japan,
    NorthAmerica,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    #[serde(rename = "openstreetmap")]
    OpenStreetMap,
    #[serde(rename = "skimap.org")]
    SkimapOrg,
}

/// Provenance record of an authoritative ski area.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub id: String,
}

// ============================================================================
// Properties
// ============================================================================

/// Resampled height sequence attached upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationProfile {
    pub heights: Vec<f64>,
    /// Horizontal distance between samples, in meters.
    pub resolution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProperties {
    pub id: String,
    #[serde(default)]
    pub uses: Vec<RunUse>,
    #[serde(default)]
    pub difficulty: Option<RunDifficulty>,
    #[serde(default)]
    pub elevation_profile: Option<ElevationProfile>,
    #[serde(default)]
    pub ski_areas: Vec<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl RunProperties {
    pub fn new(id: impl Into<String>, uses: Vec<RunUse>, difficulty: Option<RunDifficulty>) -> Self {
        Self {
            id: id.into(),
            uses,
            difficulty,
            elevation_profile: None,
            ski_areas: vec![],
            other: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiftProperties {
    pub id: String,
    pub lift_type: LiftType,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub ski_areas: Vec<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl LiftProperties {
    pub fn new(id: impl Into<String>, lift_type: LiftType) -> Self {
        Self {
            id: id.into(),
            lift_type,
            status: Some(Status::Operating),
            ski_areas: vec![],
            other: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkiAreaProperties {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub run_convention: Option<RunConvention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<SkiAreaStatistics>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl SkiAreaProperties {
    /// Properties of an authoritative ski area from a single source record.
    pub fn authoritative(id: impl Into<String>, name: Option<String>, source: Source) -> Self {
        Self {
            id: id.into(),
            name,
            generated: false,
            activities: vec![],
            sources: vec![source],
            status: Some(Status::Operating),
            run_convention: None,
            statistics: None,
            other: Map::new(),
        }
    }

    /// Properties of a ski area synthesized by clustering.
    pub fn generated(id: impl Into<String>, activity: Activity) -> Self {
        let mut other = Map::new();
        other.insert("type".to_string(), Value::String("skiArea".to_string()));
        Self {
            id: id.into(),
            name: None,
            generated: true,
            activities: vec![activity],
            sources: vec![],
            status: Some(Status::Operating),
            run_convention: None,
            statistics: None,
            other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_geometry_roundtrip_keeps_elevation() {
        let value = json!({
            "type": "LineString",
            "coordinates": [[11.12, 47.55, 1200.5], [11.13, 47.56]]
        });
        let geometry: Geometry = serde_json::from_value(value.clone()).unwrap();
        match &geometry {
            Geometry::LineString(line) => {
                assert_eq!(line[0].elevation(), Some(1200.5));
                assert_eq!(line[1].elevation(), None);
            }
            other => panic!("unexpected geometry {:?}", other),
        }
        assert_eq!(serde_json::to_value(&geometry).unwrap(), value);
    }

    #[test]
    fn test_unknown_run_use_is_preserved() {
        let uses: Vec<RunUse> = serde_json::from_value(json!(["downhill", "ice_skate"])).unwrap();
        assert_eq!(uses[0], RunUse::Downhill);
        assert_eq!(uses[1], RunUse::Other("ice_skate".to_string()));
        assert_eq!(serde_json::to_value(&uses).unwrap(), json!(["downhill", "ice_skate"]));
    }

    #[test]
    fn test_run_feature_keeps_unknown_properties() {
        let value = json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [0.0, 0.0]},
            "properties": {
                "id": "3",
                "uses": ["sled"],
                "difficulty": null,
                "skiAreas": [],
                "name": "Sledding run",
                "colorName": "green"
            }
        });
        let feature: RunFeature = serde_json::from_value(value).unwrap();
        assert_eq!(feature.properties.other["name"], json!("Sledding run"));
        let out = serde_json::to_value(&feature).unwrap();
        assert_eq!(out["type"], json!("Feature"));
        assert_eq!(out["properties"]["colorName"], json!("green"));
    }

    #[test]
    fn test_centroid_vertices_skip_closing_coordinate() {
        let ring = vec![
            Position::new(0.0, 0.0),
            Position::new(1.0, 0.0),
            Position::new(1.0, 1.0),
            Position::new(0.0, 0.0),
        ];
        let polygon = Geometry::Polygon(vec![ring]);
        assert_eq!(polygon.centroid_vertices().len(), 3);
    }

    #[test]
    fn test_invalid_geometry() {
        assert!(!Geometry::LineString(vec![]).is_valid());
        assert!(!Geometry::Point(Position(vec![1.0])).is_valid());
        assert!(!Geometry::Point(Position::new(f64::NAN, 0.0)).is_valid());
        assert!(Geometry::Point(Position::new(10.0, 45.0)).is_valid());
    }

    #[test]
    fn test_source_type_names() {
        let source = Source { source_type: SourceType::SkimapOrg, id: "13666".to_string() };
        assert_eq!(
            serde_json::to_value(&source).unwrap(),
            json!({"type": "skimap.org", "id": "13666"})
        );
    }
}
