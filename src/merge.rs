//! Merging of authoritative ski areas that describe the same physical ski area.
//!
//! Two authoritative records are considered the same ski area when:
//! - one is areal and contains the representative point of the other (an OSM site
//!   or landuse polygon around a Skimap.org point, or a site polygon around its
//!   member polygons),
//! - both are areal and their interiors overlap, or
//! - both are points from different source datasets within
//!   [`ClusteringConfig::merge_distance_meters`](crate::ClusteringConfig) of each other.
//!
//! Merging is transitive. The merged record keeps the id and geometry of the richest
//! source, accumulates every provenance record, and prefers non-null values for the
//! remaining properties. The geometries of every merged record are kept alongside it
//! as footprints, so members of a site keep claiming the features inside them.

use log::{debug, info, warn};
use std::collections::BTreeSet;

use crate::geo_utils::{areas_overlap, compute_center, contains_point, geometry_bounds, haversine_distance};
use crate::spatial::{FeatureEnvelope, SpatialIndex};
use crate::union_find::UnionFind;
use crate::{ClusteringConfig, Geometry, Position, SkiAreaFeature, SourceType};

/// Rank used to pick the primary record of a merged group; higher is richer.
fn source_rank(ski_area: &SkiAreaFeature) -> u8 {
    let osm = ski_area
        .properties
        .sources
        .iter()
        .any(|s| s.source_type == SourceType::OpenStreetMap);
    let skimap = ski_area
        .properties
        .sources
        .iter()
        .any(|s| s.source_type == SourceType::SkimapOrg);

    match (ski_area.geometry.is_areal(), osm, skimap) {
        (true, true, _) => 3,
        (_, _, true) => 2,
        (_, true, _) => 1,
        _ => 0,
    }
}

fn representative_point(geometry: &Geometry) -> Option<Position> {
    compute_center(geometry.centroid_vertices())
}

fn source_types(ski_area: &SkiAreaFeature) -> BTreeSet<u8> {
    ski_area
        .properties
        .sources
        .iter()
        .map(|s| match s.source_type {
            SourceType::OpenStreetMap => 0,
            SourceType::SkimapOrg => 1,
        })
        .collect()
}

/// An authoritative ski area after merging, with the geometry of every record it absorbed.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSkiArea {
    pub ski_area: SkiAreaFeature,
    /// Geometries of the merged records, primary first.
    pub footprints: Vec<Geometry>,
}

impl MergedSkiArea {
    fn single(ski_area: SkiAreaFeature) -> Self {
        let footprints = vec![ski_area.geometry.clone()];
        Self { ski_area, footprints }
    }

    /// True when any merged record has a polygon footprint.
    pub fn is_areal(&self) -> bool {
        self.footprints.iter().any(Geometry::is_areal)
    }

    /// Footprints that claim features: the polygons when there are any, otherwise every point.
    pub fn claim_footprints(&self) -> impl Iterator<Item = &Geometry> {
        let areal = self.is_areal();
        self.footprints.iter().filter(move |geometry| !areal || geometry.is_areal())
    }
}

/// Decide whether two valid authoritative ski areas describe the same ski area.
pub fn same_ski_area(a: &SkiAreaFeature, b: &SkiAreaFeature, config: &ClusteringConfig) -> bool {
    let (Some(a_point), Some(b_point)) = (
        representative_point(&a.geometry),
        representative_point(&b.geometry),
    ) else {
        return false;
    };

    match (a.geometry.is_areal(), b.geometry.is_areal()) {
        (true, true) => {
            let contained = contains_point(&a.geometry, &b_point) || contains_point(&b.geometry, &a_point);
            if contained {
                return true;
            }
            let overlapping = areas_overlap(&a.geometry, &b.geometry);
            if overlapping {
                warn!(
                    "[SkiAreaMerge] Ski areas {} and {} overlap without containment, merging",
                    a.properties.id, b.properties.id
                );
            }
            overlapping
        }
        (true, false) => contains_point(&a.geometry, &b_point),
        (false, true) => contains_point(&b.geometry, &a_point),
        (false, false) => {
            source_types(a) != source_types(b)
                && haversine_distance(&a_point, &b_point) <= config.merge_distance_meters
        }
    }
}

/// Number of other group members whose representative point lies inside `candidate`.
fn enclosed_count(
    ski_areas: &[SkiAreaFeature],
    group: &[usize],
    points: &[Option<Position>],
    candidate: usize,
) -> usize {
    group
        .iter()
        .zip(points)
        .filter(|&(&other, point)| {
            other != candidate
                && point
                    .as_ref()
                    .is_some_and(|p| contains_point(&ski_areas[candidate].geometry, p))
        })
        .count()
}

/// Merge a group of records (indices into `ski_areas`, ascending) into one.
///
/// The primary is the richest source; among equally rich records the one enclosing the
/// most other members wins, so a site polygon is preferred over its member polygons.
fn merge_group(ski_areas: &[SkiAreaFeature], group: &[usize]) -> MergedSkiArea {
    let points: Vec<Option<Position>> = group
        .iter()
        .map(|&i| representative_point(&ski_areas[i].geometry))
        .collect();

    let primary_index = group
        .iter()
        .copied()
        .map(|i| (i, source_rank(&ski_areas[i]), enclosed_count(ski_areas, group, &points, i)))
        .max_by(|a, b| {
            (a.1, a.2)
                .cmp(&(b.1, b.2))
                // Earlier records win ties
                .then(b.0.cmp(&a.0))
        })
        .map_or(group[0], |(i, _, _)| i);

    let mut merged = ski_areas[primary_index].clone();
    let mut activities: BTreeSet<_> = merged.properties.activities.iter().copied().collect();

    for &index in group.iter().filter(|&&i| i != primary_index) {
        let other = &ski_areas[index].properties;

        if merged.properties.name.is_none() {
            merged.properties.name = other.name.clone();
        }
        if merged.properties.status.is_none() {
            merged.properties.status = other.status;
        }
        if merged.properties.run_convention.is_none() {
            merged.properties.run_convention = other.run_convention;
        }
        activities.extend(other.activities.iter().copied());
        for source in &other.sources {
            if !merged.properties.sources.contains(source) {
                merged.properties.sources.push(source.clone());
            }
        }
        for (key, value) in &other.other {
            let missing = merged.properties.other.get(key).map_or(true, |v| v.is_null());
            if missing {
                merged.properties.other.insert(key.clone(), value.clone());
            }
        }
    }

    merged.properties.activities = activities.into_iter().collect();
    merged.properties.generated = false;

    let footprints = std::iter::once(primary_index)
        .chain(group.iter().copied().filter(|&i| i != primary_index))
        .map(|i| ski_areas[i].geometry.clone())
        .collect();

    debug!(
        "[SkiAreaMerge] Merged {} records into {} ({} sources)",
        group.len(),
        merged.properties.id,
        merged.properties.sources.len()
    );
    MergedSkiArea { ski_area: merged, footprints }
}

/// Merge authoritative ski areas describing the same physical ski area.
///
/// Records with unusable geometry are passed through unmerged. The output keeps the
/// input order of each group's first record.
///
/// # Example
/// ```
/// use ski_area_clustering::{
///     ClusteringConfig, Geometry, Position, SkiAreaFeature, SkiAreaProperties, Source, SourceType,
///     merge::merge_authoritative_ski_areas,
/// };
///
/// let osm = SkiAreaFeature::new(
///     Geometry::Point(Position::new(11.1220, 47.5571)),
///     SkiAreaProperties::authoritative(
///         "osm-1",
///         Some("Rabenkopf".to_string()),
///         Source { source_type: SourceType::OpenStreetMap, id: "way/1".to_string() },
///     ),
/// );
/// let skimap = SkiAreaFeature::new(
///     Geometry::Point(Position::new(11.1221, 47.5572)),
///     SkiAreaProperties::authoritative(
///         "skimap-13666",
///         None,
///         Source { source_type: SourceType::SkimapOrg, id: "13666".to_string() },
///     ),
/// );
///
/// let merged = merge_authoritative_ski_areas(vec![osm, skimap], &ClusteringConfig::default());
/// assert_eq!(merged.len(), 1);
/// assert_eq!(merged[0].ski_area.properties.sources.len(), 2);
/// assert_eq!(merged[0].footprints.len(), 2);
/// ```
pub fn merge_authoritative_ski_areas(
    ski_areas: Vec<SkiAreaFeature>,
    config: &ClusteringConfig,
) -> Vec<MergedSkiArea> {
    if ski_areas.len() < 2 {
        return ski_areas.into_iter().map(MergedSkiArea::single).collect();
    }

    let mut envelopes = Vec::with_capacity(ski_areas.len());
    for (index, ski_area) in ski_areas.iter().enumerate() {
        if !ski_area.geometry.is_valid() {
            warn!(
                "[SkiAreaMerge] Ski area {} has malformed geometry, skipping merge",
                ski_area.properties.id
            );
            continue;
        }
        if let Some(bounds) = geometry_bounds(&ski_area.geometry) {
            envelopes.push(FeatureEnvelope { index, bounds });
        }
    }
    let index = SpatialIndex::new(envelopes.clone());

    let mut uf = UnionFind::new(ski_areas.len());
    for envelope in &envelopes {
        let a = envelope.index;
        for b in index.candidates(&envelope.bounds, config.merge_distance_meters) {
            if b <= a {
                continue;
            }
            if same_ski_area(&ski_areas[a], &ski_areas[b], config) {
                uf.union(a, b);
            }
        }
    }

    let groups = uf.groups(0..ski_areas.len());
    let merged: Vec<MergedSkiArea> = groups
        .iter()
        .map(|group| {
            if group.len() == 1 {
                MergedSkiArea::single(ski_areas[group[0]].clone())
            } else {
                merge_group(&ski_areas, group)
            }
        })
        .collect();

    info!(
        "[SkiAreaMerge] {} authoritative ski areas merged into {}",
        ski_areas.len(),
        merged.len()
    );
    merged
}
