use std::path::Path;

use serde::Deserialize;

use super::IoError;
use crate::pointcloud::{Point2D, PointCloud};

#[derive(Deserialize)]
struct PointsDocument {
    points: Option<Vec<[i64; 2]>>,
}

/// Parse a point list document `{"points": [[x, y], ...]}`.
///
/// Coordinates are integer pixels. Other top-level keys are ignored.
pub fn parse_points_json(text: &str) -> Result<PointCloud<Point2D>, IoError> {
    let document: PointsDocument = serde_json::from_str(text)?;
    let points = document.points.ok_or(IoError::MissingPoints)?;
    Ok(points
        .iter()
        .map(|[x, y]| Point2D::new(*x as f64, *y as f64))
        .collect())
}

/// Read a point list from a JSON file. See [`parse_points_json`].
pub fn read_points_json(path: impl AsRef<Path>) -> Result<PointCloud<Point2D>, IoError> {
    let text = std::fs::read_to_string(path)?;
    let cloud = parse_points_json(&text)?;
    log::debug!("read {} points", cloud.len());
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_points() -> Result<(), IoError> {
        let cloud = parse_points_json(r#"{"label": "part", "points": [[10, 20], [30, 40]]}"#)?;
        assert_eq!(
            cloud.points(),
            &[Point2D::new(10.0, 20.0), Point2D::new(30.0, 40.0)]
        );
        Ok(())
    }

    #[test]
    fn test_parse_points_empty_list() -> Result<(), IoError> {
        assert!(parse_points_json(r#"{"points": []}"#)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_parse_points_errors() {
        assert!(matches!(
            parse_points_json(r#"{"shapes": []}"#),
            Err(IoError::MissingPoints)
        ));
        assert!(matches!(
            parse_points_json(r#"{"points": [[1, 2, 3]]}"#),
            Err(IoError::Json(_))
        ));
        assert!(matches!(
            parse_points_json(r#"{"points": [[1.5, 2]]}"#),
            Err(IoError::Json(_))
        ));
        assert!(matches!(parse_points_json("not json"), Err(IoError::Json(_))));
    }

    #[test]
    fn test_read_points_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"points": [[1, 2], [3, 4], [5, 6]]}}"#)?;
        let cloud = read_points_json(file.path())?;
        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud[2], Point2D::new(5.0, 6.0));

        assert!(matches!(
            read_points_json(file.path().with_extension("missing")),
            Err(IoError::Io(_))
        ));
        Ok(())
    }
}
