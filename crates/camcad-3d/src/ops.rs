use camcad_lie::Pose;
use glam::{DMat3, DVec3};

use crate::camera::CameraModel;
use crate::pointcloud::{Point2D, Point3D, PointCloud};

/// Rays closer than this to parallel with the plane are not intersected.
const PARALLEL_EPS: f64 = 1e-12;

/// Upper bound on the power iteration steps of the plane fit.
const PLANE_FIT_ITERATIONS: usize = 500;

/// The pixels of the points that projected, paired with their source indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectedCloud {
    /// Index of each projected pixel in the source cloud.
    pub source_indices: Vec<usize>,
    /// The projected pixels.
    pub pixels: Vec<Point2D>,
}

impl ProjectedCloud {
    /// Number of points that projected.
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Whether no point projected.
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Map every CAD point into the camera frame.
pub fn transform_cloud(points: &[Point3D], pose: &Pose) -> Vec<Point3D> {
    points.iter().map(|p| pose.transform_point(*p)).collect()
}

/// Transform CAD points by `pose` and project them with `camera`.
///
/// Points that fail to project are omitted; the original index of every
/// surviving pixel is kept in [`ProjectedCloud::source_indices`].
pub fn project_cloud<C>(points: &[Point3D], pose: &Pose, camera: &C) -> ProjectedCloud
where
    C: CameraModel + ?Sized,
{
    let mut projected = ProjectedCloud {
        source_indices: Vec::with_capacity(points.len()),
        pixels: Vec::with_capacity(points.len()),
    };
    for (i, p) in points.iter().enumerate() {
        if let Some(pixel) = camera.project(&pose.transform_point(*p)) {
            projected.source_indices.push(i);
            projected.pixels.push(pixel);
        }
    }
    projected
}

/// Arithmetic mean of a set of pixels. `None` when empty.
pub fn centroid(points: &[Point2D]) -> Option<Point2D> {
    if points.is_empty() {
        return None;
    }
    let sum = points.iter().fold(Point2D::ZERO, |acc, p| acc + *p);
    Some(sum / points.len() as f64)
}

/// Centre of the axis-aligned bounding box of a set of pixels. `None` when empty.
pub fn bounding_box_center(points: &[Point2D]) -> Option<Point2D> {
    let (min, max) = bounding_box(points)?;
    Some(min + (max - min) * 0.5)
}

fn bounding_box(points: &[Point2D]) -> Option<(Point2D, Point2D)> {
    let first = *points.first()?;
    Some(
        points
            .iter()
            .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p))),
    )
}

/// Translate every point by `offset`.
pub fn offset_points(points: &[Point2D], offset: Point2D) -> Vec<Point2D> {
    points.iter().map(|p| *p + offset).collect()
}

/// Shift the points so their bounding-box centre sits on the origin.
///
/// Returns the shifted points and the removed offset; adding the offset back
/// restores the input.
pub fn center_on_origin(points: &[Point2D]) -> (Vec<Point2D>, Point2D) {
    match bounding_box_center(points) {
        Some(center) => (offset_points(points, -center), center),
        None => (Vec::new(), Point2D::ZERO),
    }
}

/// Scale each coordinate axis independently.
pub fn scale_points(points: &[Point3D], scale: DVec3) -> Vec<Point3D> {
    points.iter().map(|p| *p * scale).collect()
}

/// CAD units per pixel along x and y.
///
/// `width` and `height` are the physical extents of the part; the pixel extents
/// are taken from the bounding box of `points`. Returns `None` when the points
/// are empty or collapse to a line along either axis.
pub fn cloud_scale(points: &[Point2D], width: f64, height: f64) -> Option<(f64, f64)> {
    let (min, max) = bounding_box(points)?;
    let extent = max - min;
    if extent.x <= 0.0 || extent.y <= 0.0 {
        return None;
    }
    Some((width / extent.x, height / extent.y))
}

/// Insert `density` evenly spaced points between consecutive vertices.
///
/// The outline is treated as closed, so the last vertex is joined back to the
/// first. Vertex order is preserved.
///
/// Example:
/// ```
/// use camcad_3d::ops::densify_points;
/// use glam::DVec2;
///
/// let square = [
///     DVec2::new(0.0, 0.0),
///     DVec2::new(2.0, 0.0),
///     DVec2::new(2.0, 2.0),
///     DVec2::new(0.0, 2.0),
/// ];
/// let dense = densify_points(&square, 1);
/// assert_eq!(dense.len(), 8);
/// assert_eq!(dense[1], DVec2::new(1.0, 0.0));
/// ```
pub fn densify_points(points: &[Point2D], density: usize) -> Vec<Point2D> {
    if points.len() < 2 || density == 0 {
        return points.to_vec();
    }

    let mut dense = Vec::with_capacity(points.len() * (density + 1));
    let step = 1.0 / (density + 1) as f64;
    for (i, start) in points.iter().enumerate() {
        let end = points[(i + 1) % points.len()];
        dense.push(*start);
        for k in 1..=density {
            dense.push(start.lerp(end, k as f64 * step));
        }
    }
    dense
}

/// Lift pixels into 3D at a constant depth `z`.
pub fn populate_cloud(points: &[Point2D], z: f64) -> PointCloud<Point3D> {
    points.iter().map(|p| p.extend(z)).collect()
}

/// Intersect the camera ray of every pixel with a plane.
///
/// The plane is given by its `normal` and a `point` on it, both expressed in
/// the camera frame. Pixels that fail to back-project, whose ray is parallel to
/// the plane, or whose intersection lies behind the camera are dropped.
pub fn back_project_to_plane<C>(
    pixels: &[Point2D],
    camera: &C,
    normal: DVec3,
    point: DVec3,
) -> Vec<Point3D>
where
    C: CameraModel + ?Sized,
{
    let offset = point.dot(normal);
    let points = pixels
        .iter()
        .filter_map(|pixel| {
            let ray = camera.back_project(pixel)?;
            let denom = ray.dot(normal);
            if denom.abs() < PARALLEL_EPS {
                return None;
            }
            let len = offset / denom;
            (len > 0.0).then_some(ray * len)
        })
        .collect::<Vec<_>>();

    if points.len() < pixels.len() {
        log::debug!(
            "back-projection dropped {} of {} pixels",
            pixels.len() - points.len(),
            pixels.len()
        );
    }
    points
}

/// Fit a plane to `points` in the least-squares sense.
///
/// Returns the unit normal and the centroid the plane passes through. The
/// normal is the eigenvector of the smallest eigenvalue of the covariance,
/// found by power iteration on the covariance shifted by its Gershgorin bound.
/// Returns `None` for fewer than 3 points or when the points are collinear.
pub fn fit_plane(points: &[Point3D]) -> Option<(DVec3, Point3D)> {
    if points.len() < 3 {
        return None;
    }
    let center = points.iter().copied().sum::<DVec3>() / points.len() as f64;
    let cov = points.iter().fold(DMat3::ZERO, |acc, p| {
        let d = *p - center;
        acc + DMat3::from_cols(d * d.x, d * d.y, d * d.z)
    });

    // rank one or less: every plane containing the line fits
    let trace = cov.x_axis.x + cov.y_axis.y + cov.z_axis.z;
    let minors = cov.x_axis.x * cov.y_axis.y - cov.y_axis.x * cov.x_axis.y
        + cov.x_axis.x * cov.z_axis.z - cov.z_axis.x * cov.x_axis.z
        + cov.y_axis.y * cov.z_axis.z - cov.z_axis.y * cov.y_axis.z;
    if minors <= 1e-12 * trace * trace {
        return None;
    }

    let bound = (0..3)
        .map(|i| {
            let row = cov.row(i);
            row.x.abs() + row.y.abs() + row.z.abs()
        })
        .fold(0.0f64, f64::max);
    let shifted = DMat3::from_diagonal(DVec3::splat(bound)) - cov;

    let iterate = |start: DVec3| -> Option<DVec3> {
        let mut v = start;
        for _ in 0..PLANE_FIT_ITERATIONS {
            let next = (shifted * v).try_normalize()?;
            let step = (next - v).length_squared();
            v = next;
            if step < 1e-30 {
                break;
            }
        }
        Some(v)
    };

    // an axis start may be orthogonal to the normal, keep the best of three
    let normal = [DVec3::X, DVec3::Y, DVec3::Z]
        .into_iter()
        .filter_map(iterate)
        .min_by(|a, b| a.dot(cov * *a).total_cmp(&b.dot(cov * *b)))?;
    normal.is_finite().then_some((normal, center))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraError, PinholeCamera};
    use approx::assert_relative_eq;
    use camcad_lie::{Perturbation, SO3};

    #[test]
    fn test_project_cloud_keeps_indices() -> Result<(), CameraError> {
        let camera = PinholeCamera::new(500.0, 500.0, 320.0, 240.0)?;
        let points = vec![
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(0.0, 0.0, -10.0),
            Point3D::new(1.0, 1.0, 0.0),
        ];
        let pose = Pose::from_translation(DVec3::new(0.0, 0.0, 5.0));
        let projected = project_cloud(&points, &pose, &camera);

        assert_eq!(projected.source_indices, vec![0, 2]);
        assert_eq!(projected.pixels[0], Point2D::new(320.0, 240.0));
        assert_eq!(projected.pixels[1], Point2D::new(420.0, 340.0));
        Ok(())
    }

    #[test]
    fn test_transform_cloud() {
        let pose = Pose::IDENTITY.compose(&Perturbation::new(
            DVec3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            DVec3::new(0.0, 0.0, 1.0),
        ));
        let out = transform_cloud(&[Point3D::new(1.0, 0.0, 0.0)], &pose);
        assert_relative_eq!(out[0].x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(out[0].y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(out[0].z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_centroid_and_center() {
        let points = [
            Point2D::new(0.0, 0.0),
            Point2D::new(4.0, 0.0),
            Point2D::new(4.0, 2.0),
            Point2D::new(0.0, 2.0),
            Point2D::new(0.0, 0.0),
        ];
        let c = centroid(&points);
        assert_eq!(c, Some(Point2D::new(1.6, 0.8)));
        assert_eq!(bounding_box_center(&points), Some(Point2D::new(2.0, 1.0)));
        assert!(centroid(&[]).is_none());
        assert!(bounding_box_center(&[]).is_none());
    }

    #[test]
    fn test_center_on_origin_restores() {
        let points = [Point2D::new(10.0, 20.0), Point2D::new(30.0, 60.0)];
        let (shifted, offset) = center_on_origin(&points);
        assert_eq!(offset, Point2D::new(20.0, 40.0));
        assert_eq!(shifted[0], Point2D::new(-10.0, -20.0));
        assert_eq!(offset_points(&shifted, offset), points.to_vec());
    }

    #[test]
    fn test_cloud_scale() {
        let points = [Point2D::new(10.0, 10.0), Point2D::new(110.0, 60.0)];
        assert_eq!(cloud_scale(&points, 50.0, 100.0), Some((0.5, 2.0)));
        assert!(cloud_scale(&[Point2D::new(1.0, 1.0)], 1.0, 1.0).is_none());

        let scaled = scale_points(&[Point3D::new(1.0, 2.0, 3.0)], DVec3::new(2.0, 0.5, 1.0));
        assert_eq!(scaled[0], Point3D::new(2.0, 1.0, 3.0));
    }

    #[test]
    fn test_densify_closed_outline() {
        let triangle = [
            Point2D::new(0.0, 0.0),
            Point2D::new(3.0, 0.0),
            Point2D::new(0.0, 3.0),
        ];
        let dense = densify_points(&triangle, 2);
        assert_eq!(dense.len(), 9);
        assert_eq!(dense[0], triangle[0]);
        assert_eq!(dense[3], triangle[1]);
        assert_eq!(dense[6], triangle[2]);
        // closing edge runs back to the first vertex
        assert_relative_eq!(dense[7].y, 2.0, epsilon = 1e-12);
        assert_relative_eq!(dense[8].y, 1.0, epsilon = 1e-12);

        assert_eq!(densify_points(&triangle, 0), triangle.to_vec());
        assert_eq!(densify_points(&triangle[..1], 4), vec![triangle[0]]);
    }

    #[test]
    fn test_populate_cloud() {
        let cloud = populate_cloud(&[Point2D::new(1.0, 2.0)], 7.0);
        assert_eq!(cloud.points(), &[Point3D::new(1.0, 2.0, 7.0)]);
    }

    #[test]
    fn test_back_project_inverts_projection() -> Result<(), CameraError> {
        let camera = PinholeCamera::new(600.0, 600.0, 320.0, 240.0)?;
        let pose = Pose::new(
            SO3::exp(DVec3::new(0.1, -0.05, 0.2)),
            DVec3::new(0.2, -0.1, 6.0),
        );
        let cad = [
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(1.0, 0.0, 0.0),
            Point3D::new(1.0, 1.0, 0.0),
            Point3D::new(-0.5, 0.7, 0.0),
        ];
        let projected = project_cloud(&cad, &pose, &camera);
        assert_eq!(projected.len(), cad.len());

        // the CAD plane z = 0 expressed in the camera frame
        let normal = pose.rotation.transform(DVec3::Z);
        let origin = pose.translation;
        let points = back_project_to_plane(&projected.pixels, &camera, normal, origin);
        let expected = transform_cloud(&cad, &pose);

        assert_eq!(points.len(), expected.len());
        for (p, e) in points.iter().zip(expected.iter()) {
            assert_relative_eq!(p.x, e.x, epsilon = 1e-9);
            assert_relative_eq!(p.y, e.y, epsilon = 1e-9);
            assert_relative_eq!(p.z, e.z, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_back_project_parallel_plane() -> Result<(), CameraError> {
        let camera = PinholeCamera::new(600.0, 600.0, 320.0, 240.0)?;
        // plane containing the optical axis: the centre ray never leaves it
        let points = back_project_to_plane(
            &[Point2D::new(320.0, 240.0)],
            &camera,
            DVec3::X,
            DVec3::new(0.0, 0.0, 0.0),
        );
        assert!(points.is_empty());
        Ok(())
    }

    #[test]
    fn test_fit_plane_tilted() {
        let expected = DVec3::new(0.5, -0.25, -1.0).normalize();
        let mut points = Vec::new();
        for i in -3..=3 {
            for j in -2..=2 {
                let (x, y) = (i as f64, j as f64);
                points.push(Point3D::new(x, y, 0.5 * x - 0.25 * y + 3.0));
            }
        }
        let Some((normal, center)) = fit_plane(&points) else {
            panic!("plane not found");
        };
        assert_relative_eq!(normal.length(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(normal.dot(expected).abs(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(center.z, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_plane_noisy_relief() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let tilt = SO3::exp(DVec3::new(0.3, -0.2, 0.1));
        let points = (0..300)
            .map(|_| {
                let local = DVec3::new(
                    rng.random_range(-50.0..50.0),
                    rng.random_range(-30.0..30.0),
                    rng.random_range(-0.5..0.5),
                );
                tilt * local + DVec3::new(1.0, 2.0, 40.0)
            })
            .collect::<Vec<_>>();

        let Some((normal, center)) = fit_plane(&points) else {
            panic!("plane not found");
        };
        let expected = tilt * DVec3::Z;
        assert!(normal.dot(expected).abs() > 0.999);
        // the centroid lies on the true plane up to the noise
        assert!(expected.dot(center - DVec3::new(1.0, 2.0, 40.0)).abs() < 0.1);
    }

    #[test]
    fn test_fit_plane_degenerate() {
        assert!(fit_plane(&[]).is_none());
        assert!(fit_plane(&[Point3D::ZERO, Point3D::X]).is_none());
        let line = (0..5).map(|i| Point3D::splat(i as f64)).collect::<Vec<_>>();
        assert!(fit_plane(&line).is_none());
        assert!(fit_plane(&[Point3D::ONE; 4]).is_none());
    }

    #[test]
    fn test_back_project_onto_fitted_plane() -> Result<(), CameraError> {
        let camera = PinholeCamera::new(500.0, 500.0, 320.0, 240.0)?;
        let cad = vec![
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(1.0, 0.0, 0.2),
            Point3D::new(1.0, 1.0, 0.2),
            Point3D::new(0.0, 1.0, 0.0),
        ];
        let pose = Pose::new(SO3::exp(DVec3::new(0.1, 0.0, 0.0)), DVec3::new(0.0, 0.0, 5.0));
        let pixels = project_cloud(&cad, &pose, &camera).pixels;

        let Some((normal, center)) = fit_plane(&cad) else {
            panic!("plane not found");
        };
        let on_plane = back_project_to_plane(
            &pixels,
            &camera,
            pose.rotation * normal,
            pose.transform_point(center),
        );
        let in_cad = transform_cloud(&on_plane, &pose.inverse());
        assert_eq!(in_cad.len(), cad.len());
        for (a, b) in in_cad.iter().zip(cad.iter()) {
            assert_relative_eq!(a.x, b.x, epsilon = 1e-9);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-9);
            assert_relative_eq!(a.z, b.z, epsilon = 1e-9);
        }
        Ok(())
    }
}
