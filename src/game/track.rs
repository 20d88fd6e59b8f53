//! Procedural race track generation
//!
//! A track is grown from a random cloud of seed points:
//!
//! 1. convex hull of the cloud (monotone chain)
//! 2. spacing relaxation so no two hull points crowd each other
//! 3. corner sharpening: displaced midpoints on every edge
//! 4. Catmull-Rom resampling into a dense, smooth center line
//! 5. inner/outer boundaries offset by the track width
//! 6. boundary points that crowd a foreign part of the center line are dropped
//!
//! Degenerate seed sets are thrown away and regenerated from the same RNG, so a
//! seeded generation stays deterministic even when it needs several attempts.

use std::ops::Deref;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TrackConfig;
use crate::game::constants::track::INTERFERENCE_TOLERANCE;
use crate::util::interpolation::catmull_rom;
use crate::util::vec2::Vec2;

/// Reasons a seed set cannot become a track
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackError {
    #[error("need at least 3 seed points, got {0}")]
    TooFewPoints(usize),
    #[error("convex hull has only {0} distinct points")]
    DegenerateHull(usize),
    #[error("center line crosses itself")]
    SelfIntersecting,
    #[error("track boundary crosses itself")]
    SelfIntersectingBounds,
    #[error("track boundary kept only {0} points")]
    DegenerateBounds(usize),
    #[error("no valid track after {0} attempts")]
    Exhausted(usize),
}

/// Side of the center line a boundary is offset to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Inner,
    Outer,
}

impl Side {
    fn rotation(self) -> f64 {
        match self {
            Side::Inner => 90.0,
            Side::Outer => -90.0,
        }
    }
}

/// Ordered chain of points. Closed when the first and last point coincide.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outline(Vec<Vec2>);

impl Deref for Outline {
    type Target = [Vec2];

    fn deref(&self) -> &[Vec2] {
        &self.0
    }
}

impl From<Vec<Vec2>> for Outline {
    fn from(points: Vec<Vec2>) -> Self {
        Self(points)
    }
}

impl Outline {
    pub fn new(points: Vec<Vec2>) -> Self {
        Self(points)
    }

    pub fn is_closed(&self) -> bool {
        self.0.len() >= 2 && self.0.first() == self.0.last()
    }

    /// The points without the closing duplicate
    pub fn open(&self) -> &[Vec2] {
        if self.is_closed() {
            &self.0[..self.0.len() - 1]
        } else {
            &self.0
        }
    }

    /// Append the first point if the chain is not closed yet
    fn close(mut self) -> Self {
        if let Some(&first) = self.0.first() {
            if self.0.last() != Some(&first) || self.0.len() == 1 {
                self.0.push(first);
            }
        }
        self
    }

    /// Number of distinct vertices of a closed chain
    pub fn vertex_count(&self) -> usize {
        self.open().len()
    }

    /// Convex hull via Andrew's monotone chain. The result is closed.
    pub fn hull(&self) -> Result<Outline, TrackError> {
        if self.0.len() < 3 {
            return Err(TrackError::TooFewPoints(self.0.len()));
        }

        let mut sorted = self.0.clone();
        sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));

        let non_left_turn = |chain: &[Vec2], p: Vec2| {
            let u = chain[chain.len() - 1];
            let v = chain[chain.len() - 2];
            (u - v).cross(p - v) >= 0.0
        };

        let mut upper: Vec<Vec2> = Vec::with_capacity(sorted.len());
        for &p in &sorted {
            while upper.len() >= 2 && non_left_turn(&upper, p) {
                upper.pop();
            }
            upper.push(p);
        }
        upper.pop();

        let mut lower: Vec<Vec2> = Vec::with_capacity(sorted.len());
        for &p in sorted.iter().rev() {
            while lower.len() >= 2 && non_left_turn(&lower, p) {
                lower.pop();
            }
            lower.push(p);
        }
        lower.pop();

        upper.extend(lower);
        let hull = Outline(upper).close();

        let distinct = hull.vertex_count();
        if distinct < 3 {
            return Err(TrackError::DegenerateHull(distinct));
        }
        Ok(hull)
    }

    /// Push every pair of vertices closer than `min_distance` apart along their axis.
    ///
    /// Both points of a pair move half of the deficit, so a lone pair ends up exactly
    /// `min_distance` apart. Later pairs may pull earlier ones closer again, hence the
    /// generator runs several passes.
    pub fn space_apart(&self, min_distance: f64) -> Outline {
        let closed = self.is_closed();
        let mut points = self.open().to_vec();

        for i in 0..points.len() {
            for j in (i + 1)..points.len() {
                let dist = points[i].distance_to(points[j]);
                if dist >= min_distance {
                    continue;
                }

                let axis = if dist > 0.0 {
                    (points[i] - points[j]).normalize()
                } else {
                    Vec2::RIGHT
                };
                let displace = axis * ((min_distance - dist) / 2.0);

                points[i] += displace;
                points[j] -= displace;
            }
        }

        let spaced = Outline(points);
        if closed {
            spaced.close()
        } else {
            spaced
        }
    }

    /// Insert a randomly displaced midpoint on every edge of a closed chain.
    ///
    /// The displacement length is `b^difficulty * max_displacement` for a uniform `b`
    /// in a random whole-degree direction.
    pub fn sharpen_corners<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        difficulty: f64,
        max_displacement: f64,
    ) -> Outline {
        let points = &self.0;
        if points.len() < 2 {
            return self.clone();
        }

        let mut modified = Vec::with_capacity(2 * points.len() - 1);
        for edge in points.windows(2) {
            let b: f64 = rng.gen();
            let length = b.powf(difficulty) * max_displacement;
            let direction = Vec2::RIGHT.rotate(rng.gen_range(0..360) as f64);

            let midpoint = edge[0].lerp(edge[1], 0.5) + direction * length;

            modified.push(edge[0]);
            modified.push(midpoint);
        }

        Outline(modified).close()
    }

    /// Resample the chain as a Catmull-Rom spline, one sample every `step` of the
    /// curve parameter. A closed chain wraps around and stays closed.
    pub fn smoothen(&self, step: f64) -> Outline {
        let xs: Vec<f64> = self.0.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = self.0.iter().map(|p| p.y).collect();
        let cyclic = self.is_closed();

        let samples = (1.0 / step).round().max(1.0) as usize;
        let mut smooth: Vec<Vec2> = (0..=samples)
            .map(|i| {
                let k = i as f64 / samples as f64;
                Vec2::new(catmull_rom(&xs, k, cyclic), catmull_rom(&ys, k, cyclic))
            })
            .collect();

        // Pin the seam so rounding cannot leave the loop open
        if cyclic {
            if let Some(&first) = smooth.first() {
                if let Some(last) = smooth.last_mut() {
                    *last = first;
                }
            }
        }
        Outline(smooth)
    }

    /// Boundary of a closed chain displaced `width` to one side.
    ///
    /// Point `i` of the result belongs to edge `i -> i + 1` and sits next to the edge's
    /// terminal point.
    pub fn offset(&self, width: f64, side: Side) -> Outline {
        let bounds: Vec<Vec2> = self
            .0
            .windows(2)
            .map(|edge| {
                let direction = Vec2::between(edge[1], edge[0])
                    .rotate(side.rotation())
                    .normalize();
                edge[1] + direction * width
            })
            .collect();

        Outline(bounds).close()
    }

    /// Whether no two non-adjacent edges of the chain cross
    pub fn is_simple(&self) -> bool {
        let edges: Vec<(Vec2, Vec2)> = self.0.windows(2).map(|e| (e[0], e[1])).collect();
        let n = edges.len();
        let closed = self.is_closed();

        for i in 0..n {
            for j in (i + 2)..n {
                if closed && i == 0 && j == n - 1 {
                    continue;
                }
                if segments_cross(edges[i], edges[j]) {
                    return false;
                }
            }
        }
        true
    }
}

/// Proper crossing test: each segment's endpoints lie strictly on opposite sides of the other
fn segments_cross((a, b): (Vec2, Vec2), (c, d): (Vec2, Vec2)) -> bool {
    let d1 = (b - a).cross(c - a);
    let d2 = (b - a).cross(d - a);
    let d3 = (d - c).cross(a - c);
    let d4 = (d - c).cross(b - c);

    d1 * d2 < 0.0 && d3 * d4 < 0.0
}

/// The racing line and its two boundaries. Replaced wholesale, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub center: Outline,
    pub inner: Outline,
    pub outer: Outline,
}

impl Track {
    /// Generate a track from an unpredictable seed
    pub fn generate(config: &TrackConfig) -> Result<Track, TrackError> {
        let seed: u64 = rand::thread_rng().gen();
        debug!("Generating track from seed {}", seed);
        Self::generate_seeded(config, seed)
    }

    /// Generate a track deterministically from `seed`
    pub fn generate_seeded(config: &TrackConfig, seed: u64) -> Result<Track, TrackError> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::generate_with(config, &mut rng)
    }

    /// Generate a track, drawing fresh seed sets from `rng` until one survives
    pub fn generate_with<R: Rng + ?Sized>(
        config: &TrackConfig,
        rng: &mut R,
    ) -> Result<Track, TrackError> {
        for attempt in 1..=config.max_attempts {
            match Self::attempt(config, rng) {
                Ok(track) => {
                    debug!(
                        "Track ready after {} attempt(s): {} center, {} inner, {} outer points",
                        attempt,
                        track.center.len(),
                        track.inner.len(),
                        track.outer.len()
                    );
                    return Ok(track);
                }
                Err(e) => debug!("Track attempt {} rejected: {}", attempt, e),
            }
        }
        Err(TrackError::Exhausted(config.max_attempts))
    }

    fn attempt<R: Rng + ?Sized>(config: &TrackConfig, rng: &mut R) -> Result<Track, TrackError> {
        let seeds: Vec<Vec2> = (0..config.point_count)
            .map(|_| {
                Vec2::new(
                    rng.gen::<f64>() * config.max_width,
                    rng.gen::<f64>() * config.max_height,
                )
            })
            .collect();

        let mut outline = Outline::new(seeds).hull()?;
        for _ in 0..config.spacing_passes {
            outline = outline.space_apart(config.min_distance);
        }
        for _ in 0..config.sharpen_passes {
            outline = outline.sharpen_corners(rng, config.difficulty, config.max_displacement);
        }

        Self::from_center(outline.smoothen(config.spline_step), config.track_width)
    }

    /// Build the boundaries around an existing closed center line
    pub fn from_center(center: Outline, width: f64) -> Result<Track, TrackError> {
        if center.vertex_count() < 3 || !center.is_closed() {
            return Err(TrackError::DegenerateHull(center.vertex_count()));
        }
        if !center.is_simple() {
            return Err(TrackError::SelfIntersecting);
        }

        let inner = remove_interference(&center, center.offset(width, Side::Inner), width);
        let outer = remove_interference(&center, center.offset(width, Side::Outer), width);

        for bound in [&inner, &outer] {
            if bound.vertex_count() < 3 {
                return Err(TrackError::DegenerateBounds(bound.vertex_count()));
            }
            if !bound.is_simple() {
                return Err(TrackError::SelfIntersectingBounds);
            }
        }

        Ok(Track {
            center,
            inner,
            outer,
        })
    }

    /// Start line and the point the cars face on it
    pub fn start(&self) -> (Vec2, Vec2) {
        let start = self.center.first().copied().unwrap_or_default();
        let next = self.center.get(1).copied().unwrap_or(start + Vec2::RIGHT);
        (start, next)
    }

    /// Number of center-line samples progress is measured against
    pub fn sample_count(&self) -> usize {
        self.center.len()
    }
}

/// Drop boundary points that sit closer than `width` to any center point other than
/// the one they were generated from, then close the boundary again.
fn remove_interference(center: &Outline, bound: Outline, width: f64) -> Outline {
    let last = center.len() - 1;

    let kept: Vec<Vec2> = bound
        .open()
        .iter()
        .enumerate()
        .filter(|(i, p)| {
            let origin = i + 1;
            center.iter().enumerate().all(|(k, c)| {
                let own = k == origin || (origin == last && k == 0);
                own || p.distance_to(*c) + INTERFERENCE_TOLERANCE >= width
            })
        })
        .map(|(_, p)| *p)
        .collect();

    Outline(kept).close()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Vec2> {
        vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 10.0),
            Vec2::new(0.0, 10.0),
        ]
    }

    /// Closed circle sampled every `360 / n` degrees
    fn circle(radius: f64, n: usize) -> Outline {
        let points: Vec<Vec2> = (0..n)
            .map(|i| Vec2::from_angle(i as f64 * 360.0 / n as f64) * radius)
            .collect();
        Outline::new(points).close()
    }

    /// Whether `p` lies inside or on a closed convex polygon
    fn convex_contains(hull: &Outline, p: Vec2) -> bool {
        let signs: Vec<f64> = hull
            .windows(2)
            .map(|e| (e[1] - e[0]).cross(p - e[0]))
            .collect();
        signs.iter().all(|s| *s >= -1e-9) || signs.iter().all(|s| *s <= 1e-9)
    }

    #[test]
    fn test_outline_equality_is_order_sensitive() {
        let a = Outline::new(vec![Vec2::new(1.0, 1.0), Vec2::new(2.0, 2.0)]);
        let b = Outline::new(vec![Vec2::new(2.0, 2.0), Vec2::new(1.0, 1.0)]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(Outline::default(), Outline::new(Vec::new()));
    }

    #[test]
    fn test_hull_of_square_with_interior_points() {
        let mut points = square();
        points.push(Vec2::new(5.0, 5.0));
        points.push(Vec2::new(2.0, 7.0));

        let hull = Outline::new(points.clone()).hull().unwrap();

        assert!(hull.is_closed());
        assert_eq!(hull.vertex_count(), 4);
        assert!(!hull.contains(&Vec2::new(5.0, 5.0)));
        for p in points {
            assert!(convex_contains(&hull, p));
        }
    }

    #[test]
    fn test_hull_random_cloud_contains_all_points() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let points: Vec<Vec2> = (0..40)
                .map(|_| Vec2::new(rng.gen::<f64>() * 8000.0, rng.gen::<f64>() * 6000.0))
                .collect();
            let hull = Outline::new(points.clone()).hull().unwrap();
            assert!(hull.is_closed());
            for p in points {
                assert!(convex_contains(&hull, p), "{:?} outside hull", p);
            }
        }
    }

    #[test]
    fn test_hull_rejects_collinear() {
        let points = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(3.0, 3.0),
        ];
        assert!(matches!(
            Outline::new(points).hull(),
            Err(TrackError::DegenerateHull(_))
        ));
    }

    #[test]
    fn test_hull_rejects_too_few_points() {
        let points = vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0)];
        assert_eq!(
            Outline::new(points).hull(),
            Err(TrackError::TooFewPoints(2))
        );
    }

    #[test]
    fn test_space_apart_pair_reaches_minimum() {
        let outline = Outline::new(vec![Vec2::new(0.0, 0.0), Vec2::new(3.0, 4.0)]);
        let spaced = outline.space_apart(10.0);
        assert!(spaced[0].distance_to(spaced[1]) >= 10.0 - 1e-9);
    }

    #[test]
    fn test_space_apart_leaves_distant_points() {
        let outline = Outline::new(vec![Vec2::new(0.0, 0.0), Vec2::new(100.0, 0.0)]);
        assert_eq!(outline.space_apart(10.0), outline);
    }

    #[test]
    fn test_space_apart_separates_coincident_points() {
        let outline = Outline::new(vec![
            Vec2::new(5.0, 5.0),
            Vec2::new(5.0, 5.0),
            Vec2::new(100.0, 100.0),
        ]);
        let spaced = outline.space_apart(4.0);
        assert!(spaced[0].distance_to(spaced[1]) >= 4.0 - 1e-9);
    }

    #[test]
    fn test_space_apart_keeps_closure() {
        let hull = Outline::new(square()).hull().unwrap();
        let spaced = hull.space_apart(12.0);
        assert!(spaced.is_closed());
        assert_eq!(spaced.vertex_count(), 4);
    }

    #[test]
    fn test_sharpen_doubles_vertices() {
        let hull = Outline::new(square()).hull().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let sharp = hull.sharpen_corners(&mut rng, 1.0, 2.0);

        assert!(sharp.is_closed());
        assert_eq!(sharp.vertex_count(), 2 * hull.vertex_count());
        for (i, p) in hull.open().iter().enumerate() {
            assert_eq!(sharp[2 * i], *p);
        }
    }

    #[test]
    fn test_sharpen_displacement_is_bounded() {
        let hull = Outline::new(square()).hull().unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let sharp = hull.sharpen_corners(&mut rng, 2.0, 3.0);

        for (i, edge) in hull.windows(2).enumerate() {
            let mid = edge[0].lerp(edge[1], 0.5);
            assert!(sharp[2 * i + 1].distance_to(mid) <= 3.0 + 1e-9);
        }
    }

    #[test]
    fn test_smoothen_is_closed_and_dense() {
        let hull = Outline::new(square()).hull().unwrap();
        let smooth = hull.smoothen(0.005);
        assert_eq!(smooth.len(), 201);
        assert!(smooth.is_closed());
    }

    #[test]
    fn test_offset_keeps_distance() {
        let center = circle(1000.0, 100);
        for side in [Side::Inner, Side::Outer] {
            let bound = center.offset(50.0, side);
            assert!(bound.is_closed());
            for (i, p) in bound.open().iter().enumerate() {
                assert!((p.distance_to(center[i + 1]) - 50.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_offset_sides_differ_in_radius() {
        let center = circle(1000.0, 100);
        let a = center.offset(50.0, Side::Inner)[0].length();
        let b = center.offset(50.0, Side::Outer)[0].length();
        assert!((a - b).abs() > 90.0);
    }

    #[test]
    fn test_is_simple() {
        assert!(circle(10.0, 30).is_simple());

        let bowtie = Outline::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 10.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(0.0, 10.0),
        ])
        .close();
        assert!(!bowtie.is_simple());
    }

    #[test]
    fn test_from_center_rejects_self_intersection() {
        let bowtie = Outline::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1000.0, 1000.0),
            Vec2::new(1000.0, 0.0),
            Vec2::new(0.0, 1000.0),
        ])
        .close();
        assert_eq!(
            Track::from_center(bowtie, 10.0),
            Err(TrackError::SelfIntersecting)
        );
    }

    #[test]
    fn test_interference_removes_crowded_inner_points() {
        // Radius smaller than the width: the inward boundary crosses the whole loop
        let center = circle(300.0, 60);
        let inward = center.offset(400.0, Side::Inner);
        let outward = center.offset(400.0, Side::Outer);
        let (small, large) = if inward[0].length() < outward[0].length() {
            (inward, outward)
        } else {
            (outward, inward)
        };

        assert_eq!(remove_interference(&center, large.clone(), 400.0), large);
        assert!(remove_interference(&center, small, 400.0).is_empty());
    }

    #[test]
    fn test_generate_produces_valid_track() {
        let config = TrackConfig::default();
        let track = Track::generate_seeded(&config, 42).unwrap();

        assert!(track.center.is_closed());
        assert!(track.inner.is_closed());
        assert!(track.outer.is_closed());
        assert!(track.center.is_simple());
        assert_eq!(track.sample_count(), 201);
        assert!(track.inner.vertex_count() >= 3);
        assert!(track.outer.vertex_count() >= 3);
    }

    #[test]
    fn test_generate_seeded_is_deterministic() {
        let config = TrackConfig::default();
        for seed in [0, 1, 1234, u64::MAX] {
            let a = Track::generate_seeded(&config, seed).unwrap();
            let b = Track::generate_seeded(&config, seed).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_generate_differs_between_seeds() {
        let config = TrackConfig::default();
        let a = Track::generate_seeded(&config, 1).unwrap();
        let b = Track::generate_seeded(&config, 2).unwrap();
        assert_ne!(a.center, b.center);
    }

    #[test]
    fn test_generate_never_emits_invalid_tracks() {
        let config = TrackConfig::default();
        for seed in 0..300 {
            let track = Track::generate_seeded(&config, seed).unwrap();
            for outline in [&track.center, &track.inner, &track.outer] {
                assert!(outline.is_closed(), "seed {}", seed);
                assert!(outline.is_simple(), "seed {}", seed);
            }
        }
    }

    #[test]
    fn test_from_center_rejects_crossing_boundary() {
        // A slot 300 wide cut into a square. With a 200 wide track the boundary
        // running down one wall of the slot ends up beside the other wall, and
        // the walls' staggered vertices keep those points clear of interference.
        let center = Outline::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(3000.0, 0.0),
            Vec2::new(3000.0, 3000.0),
            Vec2::new(1700.0, 3000.0),
            Vec2::new(1700.0, 2400.0),
            Vec2::new(1700.0, 1800.0),
            Vec2::new(1700.0, 1200.0),
            Vec2::new(1400.0, 1200.0),
            Vec2::new(1400.0, 1500.0),
            Vec2::new(1400.0, 2100.0),
            Vec2::new(1400.0, 2700.0),
            Vec2::new(1400.0, 3000.0),
            Vec2::new(0.0, 3000.0),
        ])
        .close();
        assert!(center.is_simple());

        let crossing = remove_interference(&center, center.offset(200.0, Side::Inner), 200.0);
        assert!(crossing.vertex_count() >= 3);
        assert!(!crossing.is_simple());

        assert_eq!(
            Track::from_center(center, 200.0),
            Err(TrackError::SelfIntersectingBounds)
        );
    }

    #[test]
    fn test_smoothen_open_chain_stays_open() {
        // Same x at both ends, different y: must not wrap either coordinate
        let chain = Outline::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 5.0),
            Vec2::new(20.0, 10.0),
            Vec2::new(0.0, 20.0),
        ]);
        let smooth = chain.smoothen(0.01);
        assert!(!smooth.is_closed());
        assert_eq!(smooth[0], Vec2::new(0.0, 0.0));
        let last = smooth[smooth.len() - 1];
        assert!(last.distance_to(Vec2::new(0.0, 20.0)) < 1e-9);
    }

    #[test]
    fn test_start_faces_second_sample() {
        let track = Track::from_center(circle(1000.0, 100), 50.0).unwrap();
        let (start, next) = track.start();
        assert_eq!(start, track.center[0]);
        assert_eq!(next, track.center[1]);
    }
}
