//! Candidate pairs for proximity edges.
//!
//! Points are bucketed into a uniform grid whose cell size equals the radius,
//! so every pair within the radius lies in the same or an adjacent cell.

use crate::store::NearPair;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub key: String,
    pub x: f64,
    pub y: f64,
}

/// All pairs with planar distance `<= radius`, directed from the smaller key
/// to the larger, sorted by `(from, to)`.
pub fn pairs_within(points: &[Point], radius: f64) -> Vec<NearPair> {
    if !(radius.is_finite() && radius > 0.0) {
        return Vec::new();
    }
    let cell = |p: &Point| ((p.x / radius).floor() as i64, (p.y / radius).floor() as i64);
    let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, p) in points.iter().enumerate() {
        grid.entry(cell(p)).or_default().push(i);
    }

    let mut pairs = Vec::new();
    for (i, a) in points.iter().enumerate() {
        let (cx, cy) = cell(a);
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(bucket) = grid.get(&(cx + dx, cy + dy)) else {
                    continue;
                };
                for &j in bucket.iter().filter(|&&j| j > i) {
                    let b = &points[j];
                    if a.key == b.key {
                        continue;
                    }
                    let distance = (a.x - b.x).hypot(a.y - b.y);
                    if distance <= radius {
                        let (from, to) = if a.key < b.key { (a, b) } else { (b, a) };
                        pairs.push(NearPair {
                            from: from.key.clone(),
                            to: to.key.clone(),
                            distance,
                        });
                    }
                }
            }
        }
    }
    pairs.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pt(key: &str, x: f64, y: f64) -> Point {
        Point {
            key: key.to_string(),
            x,
            y,
        }
    }

    #[test]
    fn direction_and_boundary() {
        let points = [pt("S2", 0.0, 0.0), pt("S1", 30.0, 40.0), pt("S3", 500.0, 0.0)];
        let pairs = pairs_within(&points, 50.0);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].from.as_str(), pairs[0].to.as_str()), ("S1", "S2"));
        approx::assert_abs_diff_eq!(pairs[0].distance, 50.0);
    }

    proptest! {
        #[test]
        fn grid_matches_brute_force(
            coords in prop::collection::vec((-500.0f64..500.0, -500.0f64..500.0), 0..40),
            radius in 1.0f64..200.0,
        ) {
            let points: Vec<Point> = coords
                .iter()
                .enumerate()
                .map(|(i, (x, y))| pt(&format!("K{i:03}"), *x, *y))
                .collect();
            let mut expected = Vec::new();
            for i in 0..points.len() {
                for j in (i + 1)..points.len() {
                    let d = (points[i].x - points[j].x).hypot(points[i].y - points[j].y);
                    if d <= radius {
                        expected.push((points[i].key.clone(), points[j].key.clone()));
                    }
                }
            }
            expected.sort();
            let got: Vec<(String, String)> = pairs_within(&points, radius)
                .into_iter()
                .map(|p| (p.from, p.to))
                .collect();
            prop_assert_eq!(got, expected);
        }
    }
}
