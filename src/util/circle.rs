use serde::{Deserialize, Serialize};

use crate::util::vec2::Vec2;

/// Circle used for range checks between a car and the track samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Vec2, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Whether `p` lies inside or exactly on the circle.
    ///
    /// Cheap bounding-box reject first, exact squared distance second.
    pub fn contains(&self, p: Vec2) -> bool {
        let (left, right) = (self.center.x - self.radius, self.center.x + self.radius);
        let (bottom, top) = (self.center.y - self.radius, self.center.y + self.radius);

        if p.x < left || p.x > right || p.y < bottom || p.y > top {
            return false;
        }

        self.center.distance_sq_to(p) <= self.radius * self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_five() -> Circle {
        Circle::new(Vec2::ZERO, 5.0)
    }

    #[test]
    fn test_contains_inside() {
        assert!(unit_five().contains(Vec2::new(1.0, 1.0)));
    }

    #[test]
    fn test_contains_outside() {
        assert!(!unit_five().contains(Vec2::new(6.0, 0.0)));
    }

    #[test]
    fn test_contains_on_edge() {
        assert!(unit_five().contains(Vec2::new(5.0, 0.0)));
        assert!(unit_five().contains(Vec2::new(0.0, -5.0)));
    }

    #[test]
    fn test_contains_just_past_edge() {
        assert!(!unit_five().contains(Vec2::new(5.0 + 1e-9, 0.0)));
    }

    #[test]
    fn test_corner_of_bounding_box_is_outside() {
        assert!(!unit_five().contains(Vec2::new(4.9, 4.9)));
    }

    #[test]
    fn test_offset_center() {
        let c = Circle::new(Vec2::new(100.0, -50.0), 10.0);
        assert!(c.contains(Vec2::new(106.0, -42.0)));
        assert!(!c.contains(Vec2::new(0.0, 0.0)));
    }
}
