//! Writes resolved membership and statistics back onto the features.

use log::debug;

use crate::clustering::Membership;
use crate::statistics::SkiAreaStatistics;
use crate::{ClusterOutput, FeatureCollection, LiftFeature, RunFeature};

/// Build the three output collections.
///
/// Every run and lift gets its `skiAreas` replaced by the resolved ids (empty when
/// unassigned); every ski area gets its statistics. Geometries pass through untouched.
pub fn assemble_output(
    membership: Membership,
    statistics: Vec<SkiAreaStatistics>,
    mut runs: Vec<RunFeature>,
    mut lifts: Vec<LiftFeature>,
) -> ClusterOutput {
    let Membership { mut ski_areas, run_ski_areas, lift_ski_areas, .. } = membership;

    for (ski_area, stats) in ski_areas.iter_mut().zip(statistics) {
        ski_area.properties.statistics = Some(stats);
    }

    for (run, ids) in runs.iter_mut().zip(run_ski_areas) {
        run.properties.ski_areas = ids;
    }
    for (lift, ids) in lifts.iter_mut().zip(lift_ski_areas) {
        lift.properties.ski_areas = ids;
    }

    debug!(
        "[SkiAreaAssembly] Emitting {} ski areas, {} lifts, {} runs",
        ski_areas.len(),
        lifts.len(),
        runs.len()
    );

    ClusterOutput {
        ski_areas: FeatureCollection::new(ski_areas),
        lifts: FeatureCollection::new(lifts),
        runs: FeatureCollection::new(runs),
    }
}
