//! Per-ski-area statistics aggregation.
//!
//! Statistics nest as ski area → runs by activity → by difficulty, and ski area →
//! lifts by type. Every level carries the same [`Stats`] aggregate. Grouping keys
//! without members never appear, and elevation-derived fields are omitted when no
//! member carries elevation samples.
//!
//! Each feature is measured once ([`FeatureMeasure`]) and the measure is then added
//! to every grouping level it belongs to, in ascending member order, so the output
//! is reproducible for a given membership.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::activity::{activities_for_uses, DifficultyBucket};
use crate::clustering::{Membership, SkiAreaMembers};
use crate::geo_utils::{elevation_range, geometry_descent, geometry_length_km};
use crate::{Activity, Geometry, LiftFeature, LiftType, RunFeature, VerticalMode};

// ============================================================================
// Statistics Types
// ============================================================================

/// Aggregate over a set of member features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub count: u32,
    pub length_in_km: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_elevation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_elevation: Option<f64>,
    /// Summed descending elevation steps of all members that carry elevation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_elevation_change: Option<f64>,
}

impl Stats {
    pub fn add(&mut self, measure: &FeatureMeasure) {
        self.count += 1;
        self.length_in_km += measure.length_km;
        if let Some((min, max)) = measure.elevation {
            self.min_elevation = Some(self.min_elevation.map_or(min, |m| m.min(min)));
            self.max_elevation = Some(self.max_elevation.map_or(max, |m| m.max(max)));
        }
        if let Some(descent) = measure.descent {
            self.combined_elevation_change =
                Some(self.combined_elevation_change.unwrap_or(0.0) + descent);
        }
    }
}

/// Run statistics for one activity, with a breakdown by difficulty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatistics {
    #[serde(flatten)]
    pub total: Stats,
    pub by_difficulty: BTreeMap<DifficultyBucket, Stats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunsStatistics {
    pub by_activity: BTreeMap<Activity, RunStatistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_elevation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_elevation: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiftsStatistics {
    pub by_type: BTreeMap<LiftType, Stats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_elevation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_elevation: Option<f64>,
}

/// Statistics attached to every emitted ski area.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkiAreaStatistics {
    pub runs: RunsStatistics,
    pub lifts: LiftsStatistics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_elevation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_elevation: Option<f64>,
}

// ============================================================================
// Feature Measures
// ============================================================================

/// Geometry-derived quantities of a single feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMeasure {
    pub length_km: f64,
    /// (min, max) over every vertex carrying elevation.
    pub elevation: Option<(f64, f64)>,
    pub descent: Option<f64>,
}

impl FeatureMeasure {
    pub fn of(geometry: &Geometry) -> Self {
        Self {
            length_km: geometry_length_km(geometry),
            elevation: elevation_range(geometry),
            descent: geometry_descent(geometry),
        }
    }
}

/// Measures for every run and lift, computed once and shared by all ski areas.
pub struct MeasuredFeatures {
    pub runs: Vec<FeatureMeasure>,
    pub lifts: Vec<FeatureMeasure>,
}

impl MeasuredFeatures {
    pub fn new(runs: &[RunFeature], lifts: &[LiftFeature]) -> Self {
        Self {
            runs: runs.iter().map(|r| FeatureMeasure::of(&r.geometry)).collect(),
            lifts: lifts.iter().map(|l| FeatureMeasure::of(&l.geometry)).collect(),
        }
    }

    #[cfg(feature = "parallel")]
    pub fn new_parallel(runs: &[RunFeature], lifts: &[LiftFeature]) -> Self {
        use rayon::prelude::*;

        Self {
            runs: runs.par_iter().map(|r| FeatureMeasure::of(&r.geometry)).collect(),
            lifts: lifts.par_iter().map(|l| FeatureMeasure::of(&l.geometry)).collect(),
        }
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Running (min, max) accumulator.
#[derive(Debug, Clone, Copy, Default)]
struct Extremes(Option<(f64, f64)>);

impl Extremes {
    fn include(&mut self, range: Option<(f64, f64)>) {
        if let Some((min, max)) = range {
            self.0 = Some(match self.0 {
                Some((lo, hi)) => (lo.min(min), hi.max(max)),
                None => (min, max),
            });
        }
    }

    fn min(&self) -> Option<f64> {
        self.0.map(|(min, _)| min)
    }

    fn max(&self) -> Option<f64> {
        self.0.map(|(_, max)| max)
    }
}

/// Compute the statistics of one ski area from its members.
///
/// Runs count towards every activity they map to; generated ski areas restrict
/// this to their own activities. Runs that map to no counted activity (e.g. sled
/// runs) do not contribute to run statistics.
pub fn ski_area_statistics(
    members: &SkiAreaMembers,
    runs: &[RunFeature],
    lifts: &[LiftFeature],
    measures: &MeasuredFeatures,
    vertical_mode: VerticalMode,
) -> SkiAreaStatistics {
    let mut statistics = SkiAreaStatistics::default();
    let mut run_extremes = Extremes::default();
    let mut lift_extremes = Extremes::default();

    for &run_index in &members.runs {
        let run = &runs[run_index];
        let measure = &measures.runs[run_index];
        let bucket = DifficultyBucket::for_difficulty(run.properties.difficulty.as_ref());

        let activities: Vec<Activity> = activities_for_uses(&run.properties.uses)
            .into_iter()
            .filter(|a| members.activity_filter.as_ref().map_or(true, |allowed| allowed.contains(a)))
            .collect();

        for activity in &activities {
            let entry = statistics.runs.by_activity.entry(*activity).or_default();
            entry.total.add(measure);
            entry.by_difficulty.entry(bucket).or_default().add(measure);
        }
        if !activities.is_empty() {
            run_extremes.include(measure.elevation);
        }
    }

    for &lift_index in &members.lifts {
        let lift = &lifts[lift_index];
        let measure = &measures.lifts[lift_index];
        statistics
            .lifts
            .by_type
            .entry(lift.properties.lift_type.clone())
            .or_default()
            .add(measure);
        lift_extremes.include(measure.elevation);
    }

    statistics.runs.min_elevation = run_extremes.min();
    statistics.runs.max_elevation = run_extremes.max();
    statistics.lifts.min_elevation = lift_extremes.min();
    statistics.lifts.max_elevation = lift_extremes.max();

    let (min, max) = overall_extremes(run_extremes, lift_extremes, vertical_mode);
    statistics.min_elevation = min;
    statistics.max_elevation = max;

    statistics
}

fn overall_extremes(
    runs: Extremes,
    lifts: Extremes,
    vertical_mode: VerticalMode,
) -> (Option<f64>, Option<f64>) {
    if vertical_mode == VerticalMode::LiftServed {
        if let (Some((run_min, run_max)), Some((lift_min, lift_max))) = (runs.0, lifts.0) {
            let (low, high) = (run_min.max(lift_min), run_max.min(lift_max));
            if low <= high {
                return (Some(low), Some(high));
            }
        }
    }

    let mut combined = runs;
    combined.include(lifts.0);
    (combined.min(), combined.max())
}

/// Compute statistics for every ski area of the membership, in ski area order.
pub fn compute_statistics(
    membership: &Membership,
    runs: &[RunFeature],
    lifts: &[LiftFeature],
    vertical_mode: VerticalMode,
) -> Vec<SkiAreaStatistics> {
    let measures = MeasuredFeatures::new(runs, lifts);

    let statistics: Vec<SkiAreaStatistics> = membership
        .members
        .iter()
        .map(|members| ski_area_statistics(members, runs, lifts, &measures, vertical_mode))
        .collect();

    debug!("[SkiAreaStatistics] Computed statistics for {} ski areas", statistics.len());
    statistics
}

/// Compute statistics using parallel processing.
///
/// Same output as [`compute_statistics`]: ski areas are independent, and results are
/// collected back in ski area order.
#[cfg(feature = "parallel")]
pub fn compute_statistics_parallel(
    membership: &Membership,
    runs: &[RunFeature],
    lifts: &[LiftFeature],
    vertical_mode: VerticalMode,
) -> Vec<SkiAreaStatistics> {
    use rayon::prelude::*;

    let measures = MeasuredFeatures::new_parallel(runs, lifts);

    let statistics: Vec<SkiAreaStatistics> = membership
        .members
        .par_iter()
        .map(|members| ski_area_statistics(members, runs, lifts, &measures, vertical_mode))
        .collect();

    debug!("[SkiAreaStatistics] Computed statistics for {} ski areas (parallel)", statistics.len());
    statistics
}
