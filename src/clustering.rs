//! Connectivity & clustering resolver.
//!
//! Decides which runs and lifts belong to which ski area:
//!
//! 1. Authoritative ski areas are merged ([`crate::merge`]) and claim every feature
//!    within tolerance of any of their footprints. Point ski areas use a radius and
//!    then extend their claim through the connectivity graph.
//! 2. The remaining features form a proximity graph (R-tree pre-filter, exact geometry
//!    distance check). Links require a compatible activity: lifts link with anything,
//!    two runs only when they share a liftable activity, and runs without a liftable
//!    activity are never linked.
//! 3. For each liftable activity, connected components (Union-Find) of the unclaimed
//!    features that carry it become one generated ski area each, provided the
//!    component contains at least one run.
//!
//! Membership is final once [`resolve_membership`] returns; nothing is written back
//! onto the features here.

use log::{debug, info, warn};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::time::Instant;

use crate::activity::{activities_for_uses, is_backcountry_only, liftable_activities, LIFTABLE_ACTIVITIES};
use crate::geo_utils::{compute_center, geometry_bounds, geometry_distance};
use crate::id_generator::IdGenerator;
use crate::merge::{merge_authoritative_ski_areas, MergedSkiArea};
use crate::spatial::{FeatureEnvelope, SpatialIndex};
use crate::union_find::UnionFind;
use crate::{
    Activity, Bounds, ClusteringConfig, Geometry, LiftFeature, Position, RunConvention, RunFeature,
    SkiAreaFeature, SkiAreaProperties,
};

// ============================================================================
// Membership
// ============================================================================

/// Members of one ski area, as ascending indices into the run and lift inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkiAreaMembers {
    pub runs: Vec<usize>,
    pub lifts: Vec<usize>,
    /// Activities counted in run statistics; `None` counts every activity of a run.
    pub activity_filter: Option<Vec<Activity>>,
}

/// Final ski area collection and feature → ski area assignment.
#[derive(Debug, Clone, Default)]
pub struct Membership {
    /// Merged authoritative ski areas (input order) followed by generated ones.
    pub ski_areas: Vec<SkiAreaFeature>,
    /// Members of each ski area, parallel to `ski_areas`.
    pub members: Vec<SkiAreaMembers>,
    /// Ski area ids per run, in ski area order.
    pub run_ski_areas: Vec<Vec<String>>,
    /// Ski area ids per lift, in ski area order.
    pub lift_ski_areas: Vec<Vec<String>>,
}

impl Membership {
    pub fn generated_count(&self) -> usize {
        self.ski_areas.iter().filter(|a| a.properties.generated).count()
    }
}

// ============================================================================
// Graph Nodes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Run,
    Lift,
}

/// A run or lift with usable geometry.
struct Node<'a> {
    kind: NodeKind,
    /// Index into the run or lift input.
    index: usize,
    geometry: &'a Geometry,
    /// Liftable activities of a run; empty for lifts.
    liftable: Vec<Activity>,
    backcountry_only: bool,
    bounds: Bounds,
}

impl Node<'_> {
    /// Runs without a liftable activity never take part in connectivity.
    fn is_linkable(&self) -> bool {
        self.kind == NodeKind::Lift || !self.liftable.is_empty()
    }

    fn carries(&self, activity: Activity) -> bool {
        self.kind == NodeKind::Lift || self.liftable.contains(&activity)
    }

    fn compatible_with(&self, other: &Node) -> bool {
        if !self.is_linkable() || !other.is_linkable() {
            return false;
        }
        if self.kind == NodeKind::Lift || other.kind == NodeKind::Lift {
            return true;
        }
        self.liftable.iter().any(|a| other.liftable.contains(a))
    }
}

fn build_nodes<'a>(runs: &'a [RunFeature], lifts: &'a [LiftFeature]) -> Vec<Node<'a>> {
    let mut nodes = Vec::with_capacity(runs.len() + lifts.len());

    for (index, run) in runs.iter().enumerate() {
        let bounds = match geometry_bounds(&run.geometry) {
            Some(bounds) if run.geometry.is_valid() => bounds,
            _ => {
                warn!(
                    "[SkiAreaClustering] Run {} has malformed geometry, excluded from clustering",
                    run.properties.id
                );
                continue;
            }
        };
        nodes.push(Node {
            kind: NodeKind::Run,
            index,
            geometry: &run.geometry,
            liftable: liftable_activities(&run.properties.uses),
            backcountry_only: is_backcountry_only(&run.properties.uses),
            bounds,
        });
    }

    for (index, lift) in lifts.iter().enumerate() {
        let bounds = match geometry_bounds(&lift.geometry) {
            Some(bounds) if lift.geometry.is_valid() => bounds,
            _ => {
                warn!(
                    "[SkiAreaClustering] Lift {} has malformed geometry, excluded from clustering",
                    lift.properties.id
                );
                continue;
            }
        };
        nodes.push(Node {
            kind: NodeKind::Lift,
            index,
            geometry: &lift.geometry,
            liftable: vec![],
            backcountry_only: false,
            bounds,
        });
    }

    nodes
}

// ============================================================================
// Resolver
// ============================================================================

struct Resolver<'a> {
    nodes: Vec<Node<'a>>,
    index: SpatialIndex,
    config: &'a ClusteringConfig,
    /// Compatible nodes within the connectivity threshold, ascending.
    neighbors: Vec<Vec<usize>>,
}

impl<'a> Resolver<'a> {
    fn new(nodes: Vec<Node<'a>>, config: &'a ClusteringConfig) -> Self {
        let envelopes = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| FeatureEnvelope { index, bounds: node.bounds })
            .collect();

        let mut resolver = Self {
            nodes,
            index: SpatialIndex::new(envelopes),
            config,
            neighbors: vec![],
        };
        resolver.neighbors = resolver.compute_neighbors();
        resolver
    }

    fn neighbors_of(&self, i: usize) -> Vec<usize> {
        let node = &self.nodes[i];
        if !node.is_linkable() {
            return vec![];
        }
        let threshold = self.config.connectivity_threshold_meters;

        self.index
            .candidates(&node.bounds, threshold)
            .into_iter()
            .filter(|&j| j != i)
            .filter(|&j| node.compatible_with(&self.nodes[j]))
            .filter(|&j| geometry_distance(node.geometry, self.nodes[j].geometry) <= threshold)
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn compute_neighbors(&self) -> Vec<Vec<usize>> {
        (0..self.nodes.len()).map(|i| self.neighbors_of(i)).collect()
    }

    #[cfg(feature = "parallel")]
    fn compute_neighbors(&self) -> Vec<Vec<usize>> {
        use rayon::prelude::*;

        (0..self.nodes.len())
            .into_par_iter()
            .map(|i| self.neighbors_of(i))
            .collect()
    }

    /// Nodes directly claimed by an authoritative ski area, across all of its footprints.
    fn direct_claims(&self, merged: &MergedSkiArea) -> Vec<usize> {
        let areal = merged.is_areal();
        let tolerance = if areal {
            self.config.claim_tolerance_meters
        } else {
            self.config.point_claim_radius_meters
        };

        let mut claimed = BTreeSet::new();
        for footprint in merged.claim_footprints() {
            let bounds = match geometry_bounds(footprint) {
                Some(bounds) if footprint.is_valid() => bounds,
                _ => {
                    warn!(
                        "[SkiAreaClustering] Ski area {} has a malformed footprint, it claims nothing through it",
                        merged.ski_area.properties.id
                    );
                    continue;
                }
            };
            claimed.extend(
                self.index
                    .candidates(&bounds, tolerance)
                    .into_iter()
                    .filter(|&i| areal || !self.nodes[i].backcountry_only)
                    .filter(|&i| geometry_distance(footprint, self.nodes[i].geometry) <= tolerance),
            );
        }
        claimed.into_iter().collect()
    }

    /// Extend a claim through the connectivity graph, never entering `blocked` nodes.
    fn expand_claim(&self, claimed: &[usize], blocked: &[bool]) -> Vec<usize> {
        let mut visited: BTreeSet<usize> = claimed.iter().copied().collect();
        let mut queue: VecDeque<usize> = claimed.iter().copied().collect();

        while let Some(current) = queue.pop_front() {
            for &next in &self.neighbors[current] {
                if !blocked[next] && visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        visited.into_iter().collect()
    }

    /// Connected components of unclaimed nodes carrying `activity`.
    fn components(&self, activity: Activity, claimed: &[bool]) -> Vec<Vec<usize>> {
        let participant: Vec<bool> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| !claimed[i] && node.is_linkable() && node.carries(activity))
            .collect();

        let mut uf = UnionFind::new(self.nodes.len());
        for i in (0..self.nodes.len()).filter(|&i| participant[i]) {
            for &j in &self.neighbors[i] {
                if j > i && participant[j] {
                    uf.union(i, j);
                }
            }
        }

        uf.groups((0..self.nodes.len()).filter(|&i| participant[i]))
    }

    fn members_of(&self, nodes: &[usize], activity_filter: Option<Vec<Activity>>) -> SkiAreaMembers {
        let mut members = SkiAreaMembers { activity_filter, ..Default::default() };
        for &i in nodes {
            let node = &self.nodes[i];
            match node.kind {
                NodeKind::Run => members.runs.push(node.index),
                NodeKind::Lift => members.lifts.push(node.index),
            }
        }
        members.runs.sort_unstable();
        members.lifts.sort_unstable();
        members
    }

    fn centroid_of(&self, nodes: &[usize]) -> Option<Position> {
        compute_center(nodes.iter().flat_map(|&i| self.nodes[i].geometry.centroid_vertices()))
    }
}

/// Run convention for a ski area located at `position`.
pub fn run_convention_for(position: &Position) -> RunConvention {
    let (lng, lat) = (position.lng(), position.lat());
    if (-170.0..=-50.0).contains(&lng) && lat >= 7.0 {
        RunConvention::NorthAmerica
    } else if (122.0..=154.0).contains(&lng) && (24.0..=46.0).contains(&lat) {
        RunConvention::Japan
    } else {
        RunConvention::Europe
    }
}

/// Draw ids until one is not already in use.
fn fresh_id(ids: &mut dyn IdGenerator, used: &mut HashSet<String>) -> String {
    loop {
        let id = ids.next_id();
        if used.insert(id.clone()) {
            return id;
        }
        warn!("[SkiAreaClustering] Generated id {} collides with an existing ski area, drawing again", id);
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Resolve ski area membership for every run and lift.
///
/// Authoritative ski areas are merged first and keep their input order; generated ski
/// areas follow, downhill before nordic, each activity's components ordered by their
/// first member. A feature may belong to several ski areas.
///
/// Ski areas are ordered as above rather than by id: generated ids are random in
/// production, while this order depends only on the input. Feature `skiAreas` lists
/// follow the same order.
///
/// # Example
/// ```
/// use ski_area_clustering::{
///     ClusteringConfig, Geometry, Position, RunFeature, RunProperties, RunUse,
///     SequentialIdGenerator, clustering::resolve_membership,
/// };
///
/// let line = vec![Position::new(11.0, 47.0), Position::new(11.001, 47.001)];
/// let runs = vec![
///     RunFeature::new(Geometry::LineString(line.clone()), RunProperties::new("a", vec![RunUse::Downhill], None)),
///     RunFeature::new(Geometry::LineString(line), RunProperties::new("b", vec![RunUse::Downhill], None)),
/// ];
///
/// let mut ids = SequentialIdGenerator::new("area");
/// let membership = resolve_membership(vec![], &runs, &[], &ClusteringConfig::default(), &mut ids);
/// assert_eq!(membership.ski_areas.len(), 1);
/// assert_eq!(membership.run_ski_areas, vec![vec!["area-0".to_string()], vec!["area-0".to_string()]]);
/// ```
pub fn resolve_membership(
    ski_areas: Vec<SkiAreaFeature>,
    runs: &[RunFeature],
    lifts: &[LiftFeature],
    config: &ClusteringConfig,
    ids: &mut dyn IdGenerator,
) -> Membership {
    let start = Instant::now();

    let mut used_ids: HashSet<String> = ski_areas.iter().map(|a| a.properties.id.clone()).collect();
    let authoritative = merge_authoritative_ski_areas(ski_areas, config);

    let resolver = Resolver::new(build_nodes(runs, lifts), config);
    let node_count = resolver.nodes.len();

    // Authoritative claim pass
    let mut claims: Vec<Vec<usize>> = authoritative.iter().map(|a| resolver.direct_claims(a)).collect();

    let mut polygon_claimed = vec![false; node_count];
    for (merged, claim) in authoritative.iter().zip(&claims) {
        if merged.is_areal() {
            for &i in claim {
                polygon_claimed[i] = true;
            }
        }
    }

    if config.expand_point_claims {
        for (merged, claim) in authoritative.iter().zip(claims.iter_mut()) {
            if !merged.is_areal() && !claim.is_empty() {
                let expanded = resolver.expand_claim(claim, &polygon_claimed);
                debug!(
                    "[SkiAreaClustering] Point ski area {} claims {} features ({} direct)",
                    merged.ski_area.properties.id,
                    expanded.len(),
                    claim.len()
                );
                *claim = expanded;
            }
        }
    }

    let mut claimed = vec![false; node_count];
    for &i in claims.iter().flatten() {
        claimed[i] = true;
    }

    let mut membership = Membership::default();

    for (merged, claim) in authoritative.into_iter().zip(&claims) {
        let mut ski_area = merged.ski_area;
        let members = resolver.members_of(claim, None);

        let mut activities: BTreeSet<Activity> = ski_area.properties.activities.iter().copied().collect();
        for &run_index in &members.runs {
            activities.extend(activities_for_uses(&runs[run_index].properties.uses));
        }
        ski_area.properties.activities = activities.into_iter().collect();
        ski_area.properties.generated = false;
        if ski_area.properties.run_convention.is_none() {
            ski_area.properties.run_convention =
                compute_center(ski_area.geometry.centroid_vertices()).map(|c| run_convention_for(&c));
        }

        membership.ski_areas.push(ski_area);
        membership.members.push(members);
    }

    // Connectivity pass over unclaimed features
    for activity in LIFTABLE_ACTIVITIES {
        for component in resolver.components(activity, &claimed) {
            let has_run = component.iter().any(|&i| resolver.nodes[i].kind == NodeKind::Run);
            if !has_run {
                continue;
            }
            let Some(center) = resolver.centroid_of(&component) else {
                continue;
            };

            let id = fresh_id(ids, &mut used_ids);
            let mut properties = SkiAreaProperties::generated(id, activity);
            properties.run_convention = Some(run_convention_for(&center));

            debug!(
                "[SkiAreaClustering] Generated {:?} ski area {} with {} features",
                activity,
                properties.id,
                component.len()
            );

            membership.ski_areas.push(SkiAreaFeature::new(Geometry::Point(center), properties));
            membership.members.push(resolver.members_of(&component, Some(vec![activity])));
        }
    }

    membership.run_ski_areas = vec![vec![]; runs.len()];
    membership.lift_ski_areas = vec![vec![]; lifts.len()];
    for (ski_area, members) in membership.ski_areas.iter().zip(&membership.members) {
        for &r in &members.runs {
            membership.run_ski_areas[r].push(ski_area.properties.id.clone());
        }
        for &l in &members.lifts {
            membership.lift_ski_areas[l].push(ski_area.properties.id.clone());
        }
    }

    info!(
        "[SkiAreaClustering] Resolved {} runs and {} lifts into {} ski areas ({} generated) in {:?}",
        runs.len(),
        lifts.len(),
        membership.ski_areas.len(),
        membership.generated_count(),
        start.elapsed()
    );

    membership
}
