use glam::{DVec2, DVec3};

/// A pixel-space coordinate.
pub type Point2D = DVec2;

/// A CAD/world-space coordinate.
pub type Point3D = DVec3;

/// An ordered sequence of points.
///
/// The order is kept for display and densification; registration does not
/// depend on it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointCloud<T> {
    points: Vec<T>,
}

impl<T> PointCloud<T> {
    /// Create a new point cloud from a vector of points.
    pub fn new(points: Vec<T>) -> Self {
        Self { points }
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    #[inline]
    pub fn points(&self) -> &[T] {
        &self.points
    }

    /// Get as mutable reference the points in the point cloud.
    #[inline]
    pub fn points_mut(&mut self) -> &mut [T] {
        &mut self.points
    }

    /// Iterate over the points.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.points.iter()
    }

    /// Consume the cloud and return the underlying vector.
    pub fn into_inner(self) -> Vec<T> {
        self.points
    }
}

impl<T> From<Vec<T>> for PointCloud<T> {
    fn from(points: Vec<T>) -> Self {
        Self::new(points)
    }
}

impl<T> FromIterator<T> for PointCloud<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T> std::ops::Deref for PointCloud<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.points
    }
}

impl<'a, T> IntoIterator for &'a PointCloud<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
