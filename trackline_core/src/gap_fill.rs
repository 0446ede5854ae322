//! Bounded repair of missing samples.
//!
//! Tracking drops out for a few frames at a time (occlusion, reflections).
//! Short runs are repaired locally; anything longer than the configured bound
//! is a hard [`DataQualityError`] instead of a silent guess.

use crate::error::{DataQualityError, LinearizeError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A run of consecutive missing samples, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapRun {
    pub start: usize,
    pub end: usize,
}

impl GapRun {
    /// Number of missing samples in the run.
    pub fn sample_count(&self) -> usize {
        self.end - self.start + 1
    }
}

/// A repaired series plus the runs that were filled.
#[derive(Debug, Clone, PartialEq)]
pub struct Filled<T> {
    pub values: Vec<T>,
    pub repaired: Vec<GapRun>,
}

/// Every maximal run of `None` in `values`.
pub fn find_gaps<T>(values: &[Option<T>]) -> Vec<GapRun> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;

    for (i, value) in values.iter().enumerate() {
        match (value, start) {
            (None, None) => start = Some(i),
            (Some(_), Some(s)) => {
                runs.push(GapRun { start: s, end: i - 1 });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(GapRun {
            start: s,
            end: values.len() - 1,
        });
    }

    runs
}

/// Fails when more than `max_fraction` of `values` are missing.
pub fn check_missing_fraction<T>(values: &[Option<T>], max_fraction: f64) -> Result<(), DataQualityError> {
    let total = values.len();
    let missing = values.iter().filter(|v| v.is_none()).count();
    if total > 0 && missing as f64 > max_fraction * total as f64 {
        return Err(DataQualityError::TooManyMissing {
            missing,
            total,
            max_fraction,
        });
    }
    Ok(())
}

fn check_gap_bound(runs: &[GapRun], max_gap: usize) -> Result<(), DataQualityError> {
    match runs.iter().find(|run| run.sample_count() > max_gap) {
        Some(run) => Err(DataQualityError::UnfilledGap {
            start: run.start,
            end: run.end,
            max_gap,
        }),
        None => Ok(()),
    }
}

/// Fills unassigned segment ids.
///
/// Each run is carried forward from the last assignment before it; a run at
/// the very start is carried back from the first assignment.
///
/// # Errors
/// * `DataQualityError::NoValidSamples` - nothing is assigned
/// * `DataQualityError::UnfilledGap` - a run is longer than `max_gap`
pub fn fill_segment_ids(ids: &[Option<usize>], max_gap: usize) -> Result<Filled<usize>, DataQualityError> {
    let first = ids.iter().flatten().next().copied().ok_or(DataQualityError::NoValidSamples)?;
    let repaired = find_gaps(ids);
    check_gap_bound(&repaired, max_gap)?;

    let mut values = Vec::with_capacity(ids.len());
    let mut last = first;
    for id in ids {
        if let Some(id) = id {
            last = *id;
        }
        values.push(last);
    }

    for run in &repaired {
        warn!(
            start = run.start,
            end = run.end,
            segment = values[run.start],
            "filled unassigned segment ids"
        );
    }

    Ok(Filled { values, repaired })
}

/// Fills missing linear distances using the (already filled) segment ids.
///
/// A run bounded on both sides by valid values on the sample's own segment is
/// interpolated linearly; otherwise the nearer valid value on the same
/// segment is held.
///
/// # Errors
/// * `DataQualityError::LengthMismatch` - `ids` and `values` differ in length
/// * `DataQualityError::NoValidSamples` - no value is present
/// * `DataQualityError::UnfilledGap` - a run is too long, or a missing sample
///   has no valid neighbour on its own segment
pub fn fill_linear_distance(
    values: &[Option<f64>],
    ids: &[usize],
    max_gap: usize,
) -> Result<Filled<f64>, LinearizeError> {
    if values.len() != ids.len() {
        return Err(DataQualityError::LengthMismatch {
            name: "segment_ids",
            expected: values.len(),
            actual: ids.len(),
        }
        .into());
    }
    if values.iter().all(Option::is_none) {
        return Err(DataQualityError::NoValidSamples.into());
    }

    let repaired = find_gaps(values);
    check_gap_bound(&repaired, max_gap)?;

    let mut out: Vec<f64> = values.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
    for run in &repaired {
        let before = run.start.checked_sub(1);
        let after = (run.end + 1 < values.len()).then_some(run.end + 1);

        for i in run.start..=run.end {
            let left = before.filter(|&b| ids[b] == ids[i]);
            let right = after.filter(|&a| ids[a] == ids[i]);

            out[i] = match (left, right) {
                (Some(l), Some(r)) => {
                    let w = (i - l) as f64 / (r - l) as f64;
                    out[l] + w * (out[r] - out[l])
                }
                (Some(l), None) => out[l],
                (None, Some(r)) => out[r],
                (None, None) => {
                    return Err(DataQualityError::UnfilledGap {
                        start: run.start,
                        end: run.end,
                        max_gap,
                    }
                    .into())
                }
            };
        }

        warn!(start = run.start, end = run.end, "filled missing linear distance");
    }

    Ok(Filled { values: out, repaired })
}

/// Reindexes segment ids onto a new time grid by carrying the most recent
/// source value forward ("pad").
///
/// Grid points before the first source sample take the first id when they
/// are within `max_gap_s` of it.
///
/// # Errors
/// * `DataQualityError::LengthMismatch` - `source_times` and `ids` differ
/// * `DataQualityError::NoValidSamples` - empty source
/// * `DataQualityError::UnorderedTime` - source times are not sorted
/// * `DataQualityError::StaleSegment` - nearest source sample is older (or,
///   before the start, further) than `max_gap_s`
pub fn reindex_pad(
    source_times: &[f64],
    ids: &[usize],
    target_times: &[f64],
    max_gap_s: f64,
) -> Result<Vec<usize>, DataQualityError> {
    if source_times.len() != ids.len() {
        return Err(DataQualityError::LengthMismatch {
            name: "segment_ids",
            expected: source_times.len(),
            actual: ids.len(),
        });
    }
    if source_times.is_empty() {
        return Err(DataQualityError::NoValidSamples);
    }
    if let Some(i) = source_times.windows(2).position(|w| !(w[1] >= w[0])) {
        return Err(DataQualityError::UnorderedTime { index: i + 1 });
    }

    target_times
        .iter()
        .enumerate()
        .map(|(index, &t)| {
            let after = source_times.partition_point(|&s| s <= t);
            let (source, staleness) = match after.checked_sub(1) {
                Some(k) => (k, t - source_times[k]),
                None => (0, source_times[0] - t),
            };
            if staleness > max_gap_s || staleness.is_nan() {
                return Err(DataQualityError::StaleSegment {
                    index,
                    staleness,
                    max_gap_s,
                });
            }
            Ok(ids[source])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_find_gaps() {
        let values = [None, Some(1), None, None, Some(2), None];
        assert_eq!(
            find_gaps(&values),
            vec![
                GapRun { start: 0, end: 0 },
                GapRun { start: 2, end: 3 },
                GapRun { start: 5, end: 5 },
            ]
        );
        assert!(find_gaps(&[Some(1), Some(2)]).is_empty());
    }

    #[test]
    fn test_segment_ids_forward_and_back_filled() {
        let ids = [None, None, Some(3), None, Some(4), None];
        let filled = fill_segment_ids(&ids, 2).unwrap();
        assert_eq!(filled.values, vec![3, 3, 3, 3, 4, 4]);
        assert_eq!(filled.repaired.len(), 3);
    }

    #[test]
    fn test_segment_gap_beyond_bound_fails() {
        let ids = [Some(1), None, None, None, Some(1)];
        assert_eq!(
            fill_segment_ids(&ids, 2).unwrap_err(),
            DataQualityError::UnfilledGap {
                start: 1,
                end: 3,
                max_gap: 2
            }
        );
        assert!(fill_segment_ids(&ids, 3).is_ok());
    }

    #[test]
    fn test_all_unassigned_fails() {
        assert_eq!(
            fill_segment_ids(&[None, None], 10).unwrap_err(),
            DataQualityError::NoValidSamples
        );
    }

    #[test]
    fn test_distance_interpolated_within_segment() {
        let values = [Some(2.0), None, None, Some(8.0)];
        let filled = fill_linear_distance(&values, &[0, 0, 0, 0], 5).unwrap();
        assert_relative_eq!(filled.values[1], 4.0);
        assert_relative_eq!(filled.values[2], 6.0);
    }

    #[test]
    fn test_distance_held_across_segment_change() {
        // Ids were forward filled from segment 0, so the right neighbour on
        // segment 1 must not be used
        let values = [Some(9.0), None, Some(40.0)];
        let filled = fill_linear_distance(&values, &[0, 0, 1], 5).unwrap();
        assert_eq!(filled.values, vec![9.0, 9.0, 40.0]);

        let leading = [None, Some(3.0)];
        assert_eq!(fill_linear_distance(&leading, &[2, 2], 5).unwrap().values, vec![3.0, 3.0]);
    }

    #[test]
    fn test_distance_without_same_segment_neighbour_fails() {
        let values = [Some(9.0), None, Some(40.0)];
        assert!(matches!(
            fill_linear_distance(&values, &[0, 2, 1], 5),
            Err(LinearizeError::DataQuality(DataQualityError::UnfilledGap { start: 1, end: 1, .. }))
        ));
    }

    #[test]
    fn test_missing_fraction() {
        let values = [Some(1), None, Some(1), Some(1), Some(1)];
        assert!(check_missing_fraction(&values, 0.2).is_ok());
        assert!(matches!(
            check_missing_fraction(&values, 0.1),
            Err(DataQualityError::TooManyMissing { missing: 1, total: 5, .. })
        ));
    }

    #[test]
    fn test_reindex_pad() {
        let source = [0.0, 0.1, 0.2];
        let ids = [1, 2, 3];
        let target = [-0.01, 0.0, 0.05, 0.1, 0.15, 0.25];
        assert_eq!(
            reindex_pad(&source, &ids, &target, 0.06).unwrap(),
            vec![1, 1, 1, 2, 2, 3]
        );
    }

    #[test]
    fn test_reindex_pad_stale() {
        let source = [0.0, 0.1];
        let err = reindex_pad(&source, &[0, 1], &[0.0, 0.5, 0.9], 0.2).unwrap_err();
        assert!(matches!(err, DataQualityError::StaleSegment { index: 1, .. }));

        assert_eq!(
            reindex_pad(&[0.0, 0.2, 0.1], &[0, 1, 2], &[0.0], 1.0).unwrap_err(),
            DataQualityError::UnorderedTime { index: 2 }
        );
    }
}
