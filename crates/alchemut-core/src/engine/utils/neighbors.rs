use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;

/// Nearest-neighbour queries against a fixed set of reference points.
pub struct ReferenceCloud {
    tree: KdTree<f64, 3>,
    size: usize,
}

impl ReferenceCloud {
    pub fn new<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Self {
        let coords: Vec<[f64; 3]> = points.into_iter().map(|p| [p.x, p.y, p.z]).collect();
        let size = coords.len();
        let tree: KdTree<f64, 3> = (&coords).into();
        Self { tree, size }
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Distance from `point` to the closest reference point, `None` for an empty cloud.
    pub fn nearest_distance(&self, point: &Point3<f64>) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let nearest = self
            .tree
            .nearest_one::<SquaredEuclidean>(&[point.x, point.y, point.z]);
        Some(nearest.distance.sqrt())
    }

    /// Whether any reference point lies within `radius` of `point`.
    pub fn is_within(&self, point: &Point3<f64>, radius: f64) -> bool {
        self.nearest_distance(point).is_some_and(|d| d <= radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_distance_to_reference_points() {
        let points = [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let cloud = ReferenceCloud::new(points.iter());
        let d = cloud.nearest_distance(&Point3::new(0.8, 0.3, 0.0)).unwrap();
        assert!((d - (0.04f64 + 0.09).sqrt()).abs() < 1e-12);
        assert!(cloud.is_within(&Point3::new(0.8, 0.3, 0.0), 0.4));
        assert!(!cloud.is_within(&Point3::new(0.5, 2.0, 0.0), 0.4));
    }

    #[test]
    fn empty_cloud_has_no_neighbours() {
        let cloud = ReferenceCloud::new(std::iter::empty());
        assert!(cloud.is_empty());
        assert_eq!(cloud.nearest_distance(&Point3::origin()), None);
        assert!(!cloud.is_within(&Point3::origin(), 10.0));
    }
}
