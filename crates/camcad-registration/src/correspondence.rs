use camcad_3d::ops::{bounding_box_center, centroid};
use camcad_3d::Point2D;
use kiddo::immutable::float::kdtree::ImmutableKdTree;

use crate::options::AlignmentOffset;

/// A match between a projected point and an observed point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    /// Index into the projected point set.
    pub source_index: usize,
    /// Index into the observed point set.
    pub target_index: usize,
    /// Pixel distance between the two points.
    pub distance: f64,
}

/// Nearest-neighbour matcher over a fixed set of observed pixels.
///
/// The search tree is built once and reused by every outer iteration of a
/// registration run. Matching is many-to-one: several projected points may
/// share the same observed point.
pub struct CorrespondenceEstimator {
    targets: Vec<Point2D>,
    kdtree: Option<ImmutableKdTree<f64, u32, 2, 32>>,
}

impl CorrespondenceEstimator {
    /// Index the observed pixels.
    pub fn new(observed: &[Point2D]) -> Self {
        let kdtree = (!observed.is_empty()).then(|| {
            let points = observed.iter().map(|p| p.to_array()).collect::<Vec<_>>();
            ImmutableKdTree::new_from_slice(&points)
        });
        Self {
            targets: observed.to_vec(),
            kdtree,
        }
    }

    /// The indexed observed pixels.
    pub fn targets(&self) -> &[Point2D] {
        &self.targets
    }

    /// Match every projected pixel with its nearest observed pixel.
    ///
    /// Pairs farther apart than `max_distance` are dropped. The result is in
    /// projected-point order and is the same on every call with the same input.
    pub fn find(&self, projected: &[Point2D], max_distance: f64) -> Vec<Correspondence> {
        self.find_with_offset(projected, max_distance, AlignmentOffset::None)
    }

    /// Like [`CorrespondenceEstimator::find`], matching on a shifted copy of the projections.
    ///
    /// The shift moves the chosen reference point of the projections onto the
    /// one of the observed set. The threshold applies to the shifted distance;
    /// the reported distance is between the unshifted projection and its match.
    pub fn find_with_offset(
        &self,
        projected: &[Point2D],
        max_distance: f64,
        offset: AlignmentOffset,
    ) -> Vec<Correspondence> {
        let Some(kdtree) = &self.kdtree else {
            return Vec::new();
        };
        let shift = self.alignment_shift(projected, offset);
        let max_distance_sq = max_distance * max_distance;

        projected
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                let query = *p + shift;
                let nn = kdtree.nearest_one::<kiddo::SquaredEuclidean>(&query.to_array());
                if nn.distance > max_distance_sq {
                    return None;
                }
                let target_index = nn.item as usize;
                Some(Correspondence {
                    source_index: i,
                    target_index,
                    distance: p.distance(self.targets[target_index]),
                })
            })
            .collect()
    }

    fn alignment_shift(&self, projected: &[Point2D], offset: AlignmentOffset) -> Point2D {
        let reference: fn(&[Point2D]) -> Option<Point2D> = match offset {
            AlignmentOffset::None => return Point2D::ZERO,
            AlignmentOffset::Centroid => centroid,
            AlignmentOffset::Center => bounding_box_center,
        };
        match (reference(&self.targets), reference(projected)) {
            (Some(target), Some(source)) => target - source,
            _ => Point2D::ZERO,
        }
    }
}

/// One-shot nearest-neighbour matching of `projected` against `observed`.
///
/// An empty `observed` set yields no correspondences.
pub fn find_correspondences(
    projected: &[Point2D],
    observed: &[Point2D],
    max_distance: f64,
) -> Vec<Correspondence> {
    CorrespondenceEstimator::new(observed).find(projected, max_distance)
}
