use clipper2::{Centi, EndType, JoinType, Path, Paths, Point};
use nalgebra::Vector2;

use super::predicates::signed_area;
use crate::error::{MorphError, MorphResult};

type OffsetPath = Path<Centi>;
type OffsetPaths = Paths<Centi>;

const MITER_LIMIT: f64 = 2.0;
const MIN_AREA: f64 = 1e-6;

/// Parallel offset of a closed polygon by `distance` (positive grows,
/// negative shrinks) with square joins. When the offset splits the polygon,
/// the largest piece is kept.
pub fn offset_polygon(points: &[Vector2<f64>], distance: f64) -> MorphResult<Vec<Vector2<f64>>> {
    if !distance.is_finite() {
        return Err(MorphError::InvalidArgument(format!(
            "offset distance must be finite, got {distance}"
        )));
    }

    let path = OffsetPath::new(points.iter().map(|p| Point::new(p.x, p.y)).collect());
    let inflated = OffsetPaths::new(vec![path]).inflate(
        distance,
        JoinType::Square,
        EndType::Polygon,
        MITER_LIMIT,
    );

    let best = inflated
        .iter()
        .map(|path| {
            path.iter()
                .map(|pt| Vector2::new(pt.x(), pt.y()))
                .collect::<Vec<_>>()
        })
        .filter(|ring| ring.len() >= 3)
        .max_by(|l, r| signed_area(l).abs().total_cmp(&signed_area(r).abs()));

    match best {
        Some(ring) if signed_area(&ring).abs() > MIN_AREA => Ok(ring),
        _ => Err(MorphError::Geometry(format!(
            "offset by {distance} collapses the polygon"
        ))),
    }
}
