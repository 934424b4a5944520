//! Activity and difficulty classification of runs.
//!
//! Maps a run's normalized `uses` tags to ski-area [`Activity`] values and its
//! difficulty to the bucket used as a statistics grouping key. The same rules
//! decide which runs may be linked while clustering.

use serde::{Deserialize, Serialize};

use crate::{Activity, RunDifficulty, RunUse};

/// Activities served by mechanized uphill transport, in generation order.
pub const LIFTABLE_ACTIVITIES: [Activity; 2] = [Activity::Downhill, Activity::Nordic];

/// Ski-area activity a single run use contributes to, if any.
pub fn activity_for_use(run_use: &RunUse) -> Option<Activity> {
    match run_use {
        RunUse::Downhill | RunUse::SnowPark => Some(Activity::Downhill),
        RunUse::Nordic => Some(Activity::Nordic),
        RunUse::Skitour | RunUse::Hike => Some(Activity::Backcountry),
        _ => None,
    }
}

/// Sorted, deduplicated activities of a run.
pub fn activities_for_uses(uses: &[RunUse]) -> Vec<Activity> {
    let mut activities: Vec<Activity> = uses.iter().filter_map(activity_for_use).collect();
    activities.sort();
    activities.dedup();
    activities
}

pub fn is_liftable(activity: Activity) -> bool {
    LIFTABLE_ACTIVITIES.contains(&activity)
}

/// Liftable subset of a run's activities.
pub fn liftable_activities(uses: &[RunUse]) -> Vec<Activity> {
    activities_for_uses(uses)
        .into_iter()
        .filter(|a| is_liftable(*a))
        .collect()
}

/// A run whose only ski-area activity is backcountry.
///
/// These runs are never linked while clustering and are only assigned to a ski area
/// when an authoritative polygon covers them.
pub fn is_backcountry_only(uses: &[RunUse]) -> bool {
    let activities = activities_for_uses(uses);
    activities.contains(&Activity::Backcountry) && !activities.iter().any(|a| is_liftable(*a))
}

/// Difficulty grouping key used in run statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyBucket {
    Novice,
    Easy,
    Intermediate,
    Advanced,
    Expert,
    Freeride,
    Extreme,
    Other,
}

impl DifficultyBucket {
    /// Bucket for a normalized difficulty; unset or unrecognized values map to `Other`.
    pub fn for_difficulty(difficulty: Option<&RunDifficulty>) -> Self {
        match difficulty {
            Some(RunDifficulty::Novice) => DifficultyBucket::Novice,
            Some(RunDifficulty::Easy) => DifficultyBucket::Easy,
            Some(RunDifficulty::Intermediate) => DifficultyBucket::Intermediate,
            Some(RunDifficulty::Advanced) => DifficultyBucket::Advanced,
            Some(RunDifficulty::Expert) => DifficultyBucket::Expert,
            Some(RunDifficulty::Freeride) => DifficultyBucket::Freeride,
            Some(RunDifficulty::Extreme) => DifficultyBucket::Extreme,
            Some(RunDifficulty::Other(_)) | None => DifficultyBucket::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activities_for_mixed_use() {
        let uses = vec![RunUse::Skitour, RunUse::Downhill, RunUse::SnowPark];
        assert_eq!(activities_for_uses(&uses), vec![Activity::Downhill, Activity::Backcountry]);
        assert_eq!(liftable_activities(&uses), vec![Activity::Downhill]);
        assert!(!is_backcountry_only(&uses));
    }

    #[test]
    fn test_backcountry_only() {
        assert!(is_backcountry_only(&[RunUse::Skitour]));
        assert!(is_backcountry_only(&[RunUse::Skitour, RunUse::Hike]));
        assert!(!is_backcountry_only(&[RunUse::Sled]));
        assert!(!is_backcountry_only(&[RunUse::Nordic, RunUse::Hike]));
    }

    #[test]
    fn test_sled_has_no_activity() {
        assert!(activities_for_uses(&[RunUse::Sled, RunUse::Sleigh]).is_empty());
    }

    #[test]
    fn test_difficulty_bucket() {
        assert_eq!(DifficultyBucket::for_difficulty(None), DifficultyBucket::Other);
        assert_eq!(
            DifficultyBucket::for_difficulty(Some(&RunDifficulty::Easy)),
            DifficultyBucket::Easy
        );
        assert_eq!(
            DifficultyBucket::for_difficulty(Some(&RunDifficulty::from("double_black"))),
            DifficultyBucket::Other
        );
    }
}
