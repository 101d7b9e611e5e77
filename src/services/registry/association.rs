//! Greedy nearest-neighbour association between live tracks and detections
//!
//! All candidate pairs within the distance gate are ranked by
//! (distance, track order, detection order) and accepted greedily, skipping
//! pairs whose track or detection is already bound. This is equivalent to
//! repeatedly taking the globally smallest remaining distance, with ties going
//! to the lower track id and then the earlier detection.

use crate::domain::types::Point;
use crate::services::geometry::distance;

/// One accepted track/detection pairing, by index into the input slices
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Pairing {
    pub track: usize,
    pub detection: usize,
    pub distance: f64,
}

/// Result of one association round
#[derive(Debug, Default)]
pub(crate) struct Association {
    pub pairings: Vec<Pairing>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Associate `tracks` (ordered by track id) with `detections` (input order)
pub(crate) fn greedy_match(tracks: &[Point], detections: &[Point], max_distance: f64) -> Association {
    let mut candidates: Vec<Pairing> = Vec::with_capacity(tracks.len() * detections.len());
    for (ti, &tc) in tracks.iter().enumerate() {
        for (di, &dc) in detections.iter().enumerate() {
            let d = distance(tc, dc);
            if d <= max_distance {
                candidates.push(Pairing { track: ti, detection: di, distance: d });
            }
        }
    }

    candidates.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.track.cmp(&b.track))
            .then(a.detection.cmp(&b.detection))
    });

    let mut track_used = vec![false; tracks.len()];
    let mut detection_used = vec![false; detections.len()];
    let mut pairings = Vec::with_capacity(tracks.len().min(detections.len()));

    for c in candidates {
        if track_used[c.track] || detection_used[c.detection] {
            continue;
        }
        track_used[c.track] = true;
        detection_used[c.detection] = true;
        pairings.push(c);
    }

    Association {
        pairings,
        unmatched_tracks: unused_indices(&track_used),
        unmatched_detections: unused_indices(&detection_used),
    }
}

fn unused_indices(used: &[bool]) -> Vec<usize> {
    used.iter().enumerate().filter(|(_, u)| !**u).map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(coords: &[(f64, f64)]) -> Vec<Point> {
        coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn test_nearest_pairs_win() {
        let tracks = pts(&[(0.0, 0.0), (100.0, 0.0)]);
        let dets = pts(&[(102.0, 0.0), (1.0, 0.0)]);
        let a = greedy_match(&tracks, &dets, 10.0);

        assert_eq!(a.pairings.len(), 2);
        assert_eq!((a.pairings[0].track, a.pairings[0].detection), (0, 1));
        assert_eq!((a.pairings[1].track, a.pairings[1].detection), (1, 0));
        assert!(a.unmatched_tracks.is_empty());
        assert!(a.unmatched_detections.is_empty());
    }

    #[test]
    fn test_distance_gate_is_inclusive() {
        let tracks = pts(&[(0.0, 0.0)]);
        let a = greedy_match(&tracks, &pts(&[(3.0, 4.0)]), 5.0);
        assert_eq!(a.pairings.len(), 1);

        let a = greedy_match(&tracks, &pts(&[(3.0, 4.1)]), 5.0);
        assert!(a.pairings.is_empty());
        assert_eq!(a.unmatched_tracks, vec![0]);
        assert_eq!(a.unmatched_detections, vec![0]);
    }

    #[test]
    fn test_global_minimum_taken_first() {
        // Track 0 prefers det 0 (d=3), but track 1 is closer to it (d=2).
        // Det 0 goes to track 1 and track 0 falls back to det 1 (d=4).
        let tracks = pts(&[(0.0, 0.0), (5.0, 0.0)]);
        let dets = pts(&[(3.0, 0.0), (-4.0, 0.0)]);
        let a = greedy_match(&tracks, &dets, 5.0);

        let mut pairs: Vec<(usize, usize)> =
            a.pairings.iter().map(|p| (p.track, p.detection)).collect();
        pairs.sort();
        assert_eq!(pairs, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_ties_go_to_lower_track_then_earlier_detection() {
        // Both tracks are exactly 5 from the single detection
        let tracks = pts(&[(0.0, 0.0), (10.0, 0.0)]);
        let a = greedy_match(&tracks, &pts(&[(5.0, 0.0)]), 10.0);
        assert_eq!(a.pairings.len(), 1);
        assert_eq!(a.pairings[0].track, 0);
        assert_eq!(a.unmatched_tracks, vec![1]);

        // Two detections equidistant from one track
        let a = greedy_match(&pts(&[(0.0, 0.0)]), &pts(&[(0.0, 3.0), (3.0, 0.0)]), 10.0);
        assert_eq!(a.pairings[0].detection, 0);
        assert_eq!(a.unmatched_detections, vec![1]);
    }

    #[test]
    fn test_empty_inputs() {
        let a = greedy_match(&[], &pts(&[(1.0, 1.0)]), 10.0);
        assert!(a.pairings.is_empty());
        assert_eq!(a.unmatched_detections, vec![0]);

        let a = greedy_match(&pts(&[(1.0, 1.0)]), &[], 10.0);
        assert_eq!(a.unmatched_tracks, vec![0]);
    }
}
