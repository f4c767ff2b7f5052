use std::path::Path;

use super::IoError;
use crate::camera::{CameraModel, PinholeCamera};

/// Read pinhole intrinsics from a JSON file `{fx, fy, cx, cy, width?, height?}`.
///
/// The loaded camera is validated before it is returned.
pub fn read_pinhole_json(path: impl AsRef<Path>) -> Result<PinholeCamera, IoError> {
    let file = std::fs::File::open(path)?;
    let camera: PinholeCamera = serde_json::from_reader(std::io::BufReader::new(file))?;
    camera.validate()?;
    Ok(camera)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_pinhole() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{"fx": 800.0, "fy": 810.0, "cx": 640.0, "cy": 480.0,
                "width": 1280, "height": 960}}"#
        )?;
        let camera = PinholeCamera::from_json_file(file.path())?;
        assert_eq!(camera.fx, 800.0);
        assert_eq!(camera.width, Some(1280));
        Ok(())
    }

    #[test]
    fn test_read_pinhole_invalid() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"fx": -1.0, "fy": 810.0, "cx": 640.0, "cy": 480.0}}"#)?;
        assert!(matches!(
            read_pinhole_json(file.path()),
            Err(IoError::Camera(_))
        ));
        Ok(())
    }
}
