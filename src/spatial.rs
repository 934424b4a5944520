//! R-tree index over feature bounding boxes.
//!
//! Used as a pre-filter before exact geometry distance checks: a query returns every
//! indexed feature whose bounds come within a buffer (in meters) of the query bounds.

use rstar::{RTree, RTreeObject, AABB};

use crate::geo_utils::meters_to_degrees;
use crate::Bounds;

/// Bounding box of one indexed feature.
#[derive(Debug, Clone)]
pub struct FeatureEnvelope {
    pub index: usize,
    pub bounds: Bounds,
}

impl RTreeObject for FeatureEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.min_lng, self.bounds.min_lat],
            [self.bounds.max_lng, self.bounds.max_lat],
        )
    }
}

pub struct SpatialIndex {
    tree: RTree<FeatureEnvelope>,
}

impl SpatialIndex {
    pub fn new(envelopes: Vec<FeatureEnvelope>) -> Self {
        Self {
            tree: RTree::bulk_load(envelopes),
        }
    }

    /// Indices of features whose bounds intersect `bounds` grown by `buffer_meters`.
    ///
    /// The result is sorted so callers iterate candidates in input order.
    pub fn candidates(&self, bounds: &Bounds, buffer_meters: f64) -> Vec<usize> {
        let reference_lat = if bounds.min_lat.abs() > bounds.max_lat.abs() {
            bounds.min_lat
        } else {
            bounds.max_lat
        };
        let lat_tolerance = meters_to_degrees(buffer_meters, 0.0);
        let lng_tolerance = meters_to_degrees(buffer_meters, reference_lat);

        let search_bounds = AABB::from_corners(
            [bounds.min_lng - lng_tolerance, bounds.min_lat - lat_tolerance],
            [bounds.max_lng + lng_tolerance, bounds.max_lat + lat_tolerance],
        );

        let mut indices: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&search_bounds)
            .map(|envelope| envelope.index)
            .collect();
        indices.sort_unstable();
        indices
    }
}
