//! Segment planning
//!
//! Splits a known total size into contiguous inclusive byte ranges. The
//! last segment absorbs the division remainder.

use sdm_common::model::DownloadSegment;

/// Plan `count` segments covering `[0, total_bytes - 1]`
///
/// `count` is clamped so no segment is empty; a non-positive total yields
/// no segments. Planned segments carry id 0 until persisted.
pub fn plan_segments(task_id: i64, total_bytes: i64, count: i64) -> Vec<DownloadSegment> {
    if total_bytes <= 0 {
        return Vec::new();
    }

    let count = count.clamp(1, total_bytes);
    let part = total_bytes / count;

    let mut segments = Vec::with_capacity(count as usize);
    let mut start = 0;
    for index in 0..count {
        let end = if index == count - 1 {
            total_bytes - 1
        } else {
            start + part - 1
        };
        segments.push(DownloadSegment::new(0, task_id, index, start, end));
        start = end + 1;
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_of(segments: &[DownloadSegment]) -> i64 {
        segments.iter().map(|s| s.len()).sum()
    }

    #[test]
    fn test_even_split() {
        let segments = plan_segments(7, 4096, 4);
        assert_eq!(segments.len(), 4);
        assert_eq!(total_of(&segments), 4096);
        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.index, i as i64);
            assert_eq!(seg.task_id, 7);
            assert_eq!(seg.len(), 1024);
        }
        assert_eq!(segments[0].start_byte, 0);
        assert_eq!(segments[3].end_byte, 4095);
    }

    #[test]
    fn test_last_segment_absorbs_remainder() {
        let segments = plan_segments(1, 4098, 4);
        assert_eq!(segments.len(), 4);
        assert_eq!(total_of(&segments), 4098);
        assert_eq!(segments[0].len(), 1024);
        assert_eq!(segments[3].len(), 1026);
        assert_eq!(segments[3].end_byte, 4097);
    }

    #[test]
    fn test_ranges_are_contiguous() {
        let segments = plan_segments(1, 1_000_003, 7);
        for pair in segments.windows(2) {
            assert_eq!(pair[1].start_byte, pair[0].end_byte + 1);
        }
    }

    #[test]
    fn test_total_smaller_than_count() {
        let segments = plan_segments(1, 3, 8);
        assert_eq!(segments.len(), 3);
        assert_eq!(total_of(&segments), 3);
        assert!(segments.iter().all(|s| s.len() == 1));
    }

    #[test]
    fn test_count_clamped_to_one() {
        let segments = plan_segments(1, 100, 0);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_byte, 0);
        assert_eq!(segments[0].end_byte, 99);
    }

    #[test]
    fn test_zero_total_plans_nothing() {
        assert!(plan_segments(1, 0, 4).is_empty());
    }
}
