//! Detector-agnostic segment primitives

use crate::segment::{Segment, TimeRange};
use chrono::{DateTime, Duration, Utc};
use sample_source::LevelSample;

/// Merge ranges whose gap is at most `max_gap`.
///
/// Input order does not matter. Output is sorted and every gap between
/// neighbours exceeds `max_gap`.
pub fn merge_ranges(ranges: Vec<TimeRange>, max_gap: Duration) -> Vec<TimeRange> {
    merge_ranges_with(ranges, max_gap, |_, _| true)
}

/// Like [`merge_ranges`], but a gap is only bridged when `should_merge`
/// accepts the pair. Overlapping or touching ranges always merge.
pub fn merge_ranges_with<F>(mut ranges: Vec<TimeRange>, max_gap: Duration, should_merge: F) -> Vec<TimeRange>
where
    F: Fn(&TimeRange, &TimeRange) -> bool,
{
    ranges.sort();
    let mut merged: Vec<TimeRange> = Vec::with_capacity(ranges.len());

    for next in ranges {
        if let Some(current) = merged.last_mut() {
            let gap = next.start - current.end;
            if gap <= Duration::zero() || (gap <= max_gap && should_merge(current, &next)) {
                current.end = current.end.max(next.end);
                continue;
            }
        }
        merged.push(next);
    }

    merged
}

/// Drop ranges shorter than `min_duration`
pub fn filter_min_duration(ranges: Vec<TimeRange>, min_duration: Duration) -> Vec<TimeRange> {
    ranges.into_iter().filter(|r| r.duration() >= min_duration).collect()
}

/// Clip ranges to `[from, to]` and build closed segments.
///
/// `started_before_range` reflects the unclipped start. Ranges left empty
/// by clipping are dropped.
pub fn clip_ranges(ranges: &[TimeRange], from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Segment> {
    clip_ranges_ongoing(ranges, from, to, false)
}

/// [`clip_ranges`], with the last range turned into an ongoing segment
/// when `last_ongoing` is set
pub fn clip_ranges_ongoing(
    ranges: &[TimeRange],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    last_ongoing: bool,
) -> Vec<Segment> {
    let last = ranges.len().saturating_sub(1);
    ranges
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            let start = r.start.max(from);
            if last_ongoing && i == last {
                (start < to).then(|| Segment::ongoing(start, to, r.start < from))
            } else {
                Segment::closed(start, r.end.min(to), r.start < from)
            }
        })
        .collect()
}

/// Build segments keeping each range's true start; ends are capped at
/// `to` and the last one becomes ongoing when `last_ongoing` is set
pub fn ranges_into_segments(
    ranges: &[TimeRange],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    last_ongoing: bool,
) -> Vec<Segment> {
    let last = ranges.len().saturating_sub(1);
    ranges
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            if last_ongoing && i == last {
                Some(Segment::ongoing(r.start, to, r.start < from))
            } else {
                Segment::closed(r.start, r.end.min(to), r.start < from)
            }
        })
        .collect()
}

/// Whether activity ending at `last_end` should still count as in
/// progress. A query whose `to` lies more than `max_gap` before `now` is
/// historical and never ongoing.
pub fn is_trailing_ongoing(
    last_end: DateTime<Utc>,
    to: DateTime<Utc>,
    now: DateTime<Utc>,
    max_gap: Duration,
) -> bool {
    to - last_end <= max_gap && now - to <= max_gap
}

/// Index of the last sample at or before `ts`
pub fn sample_at_or_before(samples: &[LevelSample], ts: DateTime<Utc>) -> Option<usize> {
    samples.partition_point(|s| s.timestamp <= ts).checked_sub(1)
}

/// First and last values inside `[start, end]`
pub fn level_first_last_in_range(
    samples: &[LevelSample],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<(f64, f64)> {
    let lo = samples.partition_point(|s| s.timestamp < start);
    let hi = samples.partition_point(|s| s.timestamp <= end);
    if lo >= hi {
        return None;
    }
    Some((samples[lo].value, samples[hi - 1].value))
}

/// Centred rolling mean; edges average over the part of the window that
/// exists
pub fn rolling_average(values: &[f64], window: usize) -> Vec<f64> {
    if values.is_empty() || window == 0 {
        return values.to_vec();
    }

    let half = window / 2;
    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0);
    for v in values {
        prefix.push(prefix[prefix.len() - 1] + v);
    }

    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}

/// Round `ts` down to a multiple of `step_seconds` since the epoch
pub fn align_down(ts: DateTime<Utc>, step_seconds: i64) -> DateTime<Utc> {
    let secs = ts.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(step_seconds), 0).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{at, secs};

    fn r(start: i64, end: i64) -> TimeRange {
        TimeRange::new(at(start), at(end))
    }

    #[test]
    fn test_merge_bridges_small_gaps() {
        let merged = merge_ranges(vec![r(200, 260), r(0, 60), r(60, 120), r(130, 150)], secs(30));
        assert_eq!(merged, vec![r(0, 150), r(200, 260)]);
    }

    #[test]
    fn test_merge_zero_gap_only_joins_touching() {
        let merged = merge_ranges(vec![r(0, 60), r(60, 120), r(121, 180)], Duration::zero());
        assert_eq!(merged, vec![r(0, 120), r(121, 180)]);
    }

    #[test]
    fn test_merge_contained_range() {
        let merged = merge_ranges(vec![r(0, 600), r(100, 200)], Duration::zero());
        assert_eq!(merged, vec![r(0, 600)]);
    }

    #[test]
    fn test_merge_predicate_blocks_gap_but_not_overlap() {
        let merged = merge_ranges_with(vec![r(0, 60), r(50, 100), r(150, 200)], secs(3600), |_, _| false);
        assert_eq!(merged, vec![r(0, 100), r(150, 200)]);
    }

    #[test]
    fn test_clip_marks_started_before_range() {
        let segments = clip_ranges(&[r(0, 100), r(150, 400), r(500, 600)], at(50), at(300));
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, at(50));
        assert!(segments[0].started_before_range);
        assert_eq!(segments[0].duration_seconds, 50);
        assert_eq!(segments[1].end, Some(at(300)));
        assert!(!segments[1].started_before_range);
    }

    #[test]
    fn test_clip_ongoing_last() {
        let segments = clip_ranges_ongoing(&[r(0, 100), r(200, 350)], at(50), at(300), true);
        assert_eq!(segments.len(), 2);
        assert!(!segments[0].is_ongoing);
        assert!(segments[1].is_ongoing);
        assert_eq!(segments[1].duration_seconds, 100);
    }

    #[test]
    fn test_ranges_into_segments_last_ongoing() {
        let segments = ranges_into_segments(&[r(-60, 100), r(200, 300)], at(0), at(400), true);
        assert!(segments[0].started_before_range);
        assert_eq!(segments[0].start, at(-60));
        assert!(segments[1].is_ongoing);
        assert_eq!(segments[1].duration_seconds, 200);
    }

    #[test]
    fn test_trailing_ongoing_requires_recent_query() {
        let gap = secs(600);
        assert!(is_trailing_ongoing(at(1000), at(1300), at(1400), gap));
        assert!(!is_trailing_ongoing(at(1000), at(1700), at(1700), gap));
        // historical query: trailing edge looks close but `to` is old
        assert!(!is_trailing_ongoing(at(1000), at(1300), at(100_000), gap));
    }

    #[test]
    fn test_sample_lookups() {
        let samples: Vec<_> = [(0, 1.0), (10, 2.0), (20, 3.0)]
            .iter()
            .map(|&(t, v)| LevelSample::new(at(t), v))
            .collect();
        assert_eq!(sample_at_or_before(&samples, at(-1)), None);
        assert_eq!(sample_at_or_before(&samples, at(10)), Some(1));
        assert_eq!(sample_at_or_before(&samples, at(15)), Some(1));
        assert_eq!(sample_at_or_before(&samples, at(99)), Some(2));

        assert_eq!(level_first_last_in_range(&samples, at(5), at(20)), Some((2.0, 3.0)));
        assert_eq!(level_first_last_in_range(&samples, at(11), at(19)), None);
    }

    #[test]
    fn test_rolling_average_centered() {
        let smoothed = rolling_average(&[0.0, 0.0, 3.0, 0.0, 0.0], 3);
        assert_eq!(smoothed, vec![0.0, 1.0, 1.0, 1.0, 0.0]);
        let flat = rolling_average(&[5.0; 20], 11);
        assert!(flat.iter().all(|v| (v - 5.0).abs() < 1e-9));
    }

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(at(59), 60), at(0));
        assert_eq!(align_down(at(60), 60), at(60));
        assert_eq!(align_down(at(-1), 60), at(-60));
    }
}
