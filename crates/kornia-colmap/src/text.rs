use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::camera_model::CameraModel;
use crate::error::{ColmapError, Result};
use crate::types::{ColmapCamera, ColmapImage, ColmapPoint3d};

/// File name of the cameras list.
pub const CAMERAS_TXT: &str = "cameras.txt";
/// File name of the images list.
pub const IMAGES_TXT: &str = "images.txt";
/// File name of the 3D points list.
pub const POINTS3D_TXT: &str = "points3D.txt";

const EMPTY_POINTS3D_TXT: &str = "# 3D point list with one line of data per point:\n\
#   POINT3D_ID, X, Y, Z, R, G, B, ERROR, TRACK[] as (IMAGE_ID, POINT2D_IDX)\n\
# Number of points: 0, mean track length: 0\n";

/// The cameras and images of a COLMAP text model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextModel {
    /// Cameras
    pub cameras: Vec<ColmapCamera>,
    /// Images
    pub images: Vec<ColmapImage>,
}

impl TextModel {
    /// Write `cameras.txt`, `images.txt` and `points3D.txt` into a directory.
    ///
    /// # Arguments
    ///
    /// * `dir` - The output directory. It must exist.
    /// * `points_template` - A points file copied as is. Without it an empty points file is written.
    ///
    /// # Returns
    ///
    /// The paths of the written files.
    pub fn write_to_dir(
        &self,
        dir: impl AsRef<Path>,
        points_template: Option<&Path>,
    ) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let cameras_path = dir.join(CAMERAS_TXT);
        let images_path = dir.join(IMAGES_TXT);
        let points_path = dir.join(POINTS3D_TXT);

        write_cameras_txt(&self.cameras, &cameras_path)?;
        write_images_txt(&self.images, &images_path)?;
        copy_points3d_txt(points_template, &points_path)?;

        Ok(vec![cameras_path, images_path, points_path])
    }

    /// Read `cameras.txt` and `images.txt` from a directory.
    pub fn read_from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        Ok(Self {
            cameras: read_cameras_txt(dir.join(CAMERAS_TXT))?,
            images: read_images_txt(dir.join(IMAGES_TXT))?,
        })
    }
}

/// Write the cameras.txt file.
pub fn write_cameras_txt(cameras: &[ColmapCamera], path: impl AsRef<Path>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_cameras(cameras, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Write a cameras list with one line per camera.
///
/// CAMERA_ID, MODEL, WIDTH, HEIGHT, PARAMS[]
pub fn write_cameras<W: Write>(cameras: &[ColmapCamera], writer: &mut W) -> Result<()> {
    writeln!(writer, "# Camera list with one line of data per camera:")?;
    writeln!(writer, "#   CAMERA_ID, MODEL, WIDTH, HEIGHT, PARAMS[]")?;
    writeln!(writer, "# Number of cameras: {}", cameras.len())?;

    for camera in cameras {
        camera.model.validate_params(&camera.params)?;
        write!(
            writer,
            "{} {} {} {}",
            camera.camera_id, camera.model, camera.width, camera.height
        )?;
        for param in &camera.params {
            write!(writer, " {param}")?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

/// Write the images.txt file.
pub fn write_images_txt(images: &[ColmapImage], path: impl AsRef<Path>) -> Result<()> {
    images.iter().try_for_each(check_image_name)?;
    let mut writer = BufWriter::new(File::create(path)?);
    write_images(images, &mut writer)?;
    writer.flush()?;
    Ok(())
}

fn check_image_name(image: &ColmapImage) -> Result<()> {
    if image.name.is_empty() || image.name.chars().any(char::is_whitespace) {
        return Err(ColmapError::InvalidImageName(image.name.clone()));
    }
    Ok(())
}

/// Write an images list with two lines per image.
///
/// IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME
/// POINTS2D[] as (X, Y, POINT3D_ID)
pub fn write_images<W: Write>(images: &[ColmapImage], writer: &mut W) -> Result<()> {
    let num_points2d = images.iter().map(|image| image.points2d.len()).sum::<usize>();
    let mean_observations = if images.is_empty() {
        0.0
    } else {
        num_points2d as f64 / images.len() as f64
    };

    writeln!(writer, "# Image list with two lines of data per image:")?;
    writeln!(
        writer,
        "#   IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME"
    )?;
    writeln!(writer, "#   POINTS2D[] as (X, Y, POINT3D_ID)")?;
    writeln!(
        writer,
        "# Number of images: {}, mean observations per image: {}",
        images.len(),
        mean_observations
    )?;

    images.iter().try_for_each(check_image_name)?;

    for image in images {

        let [qw, qx, qy, qz] = image.qvec;
        let [tx, ty, tz] = image.tvec;
        writeln!(
            writer,
            "{} {qw} {qx} {qy} {qz} {tx} {ty} {tz} {} {}",
            image.image_id, image.camera_id, image.name
        )?;

        let points2d = image
            .points2d
            .iter()
            .map(|(x, y, point3d_id)| format!("{x} {y} {point3d_id}"))
            .collect::<Vec<_>>();
        writeln!(writer, "{}", points2d.join(" "))?;
    }

    Ok(())
}

/// Copy a points3D.txt file, or write an empty one if there is no template.
pub fn copy_points3d_txt(template: Option<&Path>, dst: impl AsRef<Path>) -> Result<()> {
    match template {
        Some(template) => {
            std::fs::copy(template, dst)?;
        }
        None => std::fs::write(dst, EMPTY_POINTS3D_TXT)?,
    }
    Ok(())
}

/// Read the cameras.txt file and return a vector of ColmapCamera structs.
///
/// # Arguments
///
/// * `path` - The path to the cameras.txt file.
///
/// # Returns
///
/// A vector of ColmapCamera structs.
pub fn read_cameras_txt(path: impl AsRef<Path>) -> Result<Vec<ColmapCamera>> {
    read_cameras(BufReader::new(File::open(path)?))
}

/// Read a cameras list from a buffered reader.
pub fn read_cameras<R: BufRead>(reader: R) -> Result<Vec<ColmapCamera>> {
    data_lines(reader)?
        .into_iter()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_no, line)| parse_camera_line(line_no, &line))
        .collect()
}

/// Read the points3D.txt file and return a vector of ColmapPoint3d structs.
///
/// # Arguments
///
/// * `path` - The path to the points3D.txt file.
///
/// # Returns
///
/// A vector of ColmapPoint3d structs.
pub fn read_points3d_txt(path: impl AsRef<Path>) -> Result<Vec<ColmapPoint3d>> {
    read_points3d(BufReader::new(File::open(path)?))
}

/// Read a 3D points list from a buffered reader.
pub fn read_points3d<R: BufRead>(reader: R) -> Result<Vec<ColmapPoint3d>> {
    data_lines(reader)?
        .into_iter()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_no, line)| parse_point3d_line(line_no, &line))
        .collect()
}

/// Read the images.txt file and return a vector of ColmapImage structs.
///
/// # Arguments
///
/// * `path` - The path to the images.txt file.
///
/// # Returns
///
/// A vector of ColmapImage structs.
pub fn read_images_txt(path: impl AsRef<Path>) -> Result<Vec<ColmapImage>> {
    read_images(BufReader::new(File::open(path)?))
}

/// Read an images list from a buffered reader.
///
/// A missing observations line at the end of the input is read as empty.
pub fn read_images<R: BufRead>(reader: R) -> Result<Vec<ColmapImage>> {
    let mut lines = data_lines(reader)?.into_iter();
    let mut images = Vec::new();

    while let Some((line_no, line)) = lines.next() {
        // blank lines between images are not pose lines
        if line.trim().is_empty() {
            continue;
        }
        let points2d = lines.next();
        images.push(parse_image_lines(
            (line_no, &line),
            points2d.as_ref().map(|(n, l)| (*n, l.as_str())),
        )?);
    }

    Ok(images)
}

/// All the non comment lines with their 1-based line numbers.
fn data_lines<R: BufRead>(reader: R) -> Result<Vec<(usize, String)>> {
    let mut lines = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim_start().starts_with('#') {
            continue;
        }
        lines.push((i + 1, line));
    }
    Ok(lines)
}

/// Utility functions for parsing COLMAP text files
fn parse_part<T: std::str::FromStr>(s: &str, line: usize) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    s.parse::<T>().map_err(|e| ColmapError::Parse {
        line,
        message: format!("{}: {}", s, e),
    })
}

fn parse_array<T: std::str::FromStr + Copy + Default, const N: usize>(
    parts: &[&str],
    line: usize,
) -> Result<[T; N]>
where
    T::Err: std::fmt::Display,
{
    let mut out = [T::default(); N];
    for (value, s) in out.iter_mut().zip(parts) {
        *value = parse_part(s, line)?;
    }
    Ok(out)
}

fn parse_error(line: usize, message: impl Into<String>) -> ColmapError {
    ColmapError::Parse {
        line,
        message: message.into(),
    }
}

/// Parse a camera line and return a ColmapCamera struct.
/// NOTE: The number of parameters depends on the camera model.
///       CAMERA_ID, MODEL, WIDTH, HEIGHT, PARAMS[0], PARAMS[1], ...
fn parse_camera_line(line_no: usize, line: &str) -> Result<ColmapCamera> {
    // split the line into parts by whitespace
    let parts = line.split_whitespace().collect::<Vec<_>>();

    if parts.len() < 4 {
        return Err(parse_error(
            line_no,
            format!("Invalid number of parts: {}", parts.len()),
        ));
    }

    let model = CameraModel::from_name(parts[1])
        .map_err(|_| parse_error(line_no, format!("Invalid camera model: {}", parts[1])))?;

    let params = parts[4..]
        .iter()
        .map(|s| parse_part(s, line_no))
        .collect::<Result<Vec<_>>>()?;

    if params.len() != model.num_params() {
        return Err(parse_error(
            line_no,
            format!(
                "{} expects {} parameters, got {}",
                model,
                model.num_params(),
                params.len()
            ),
        ));
    }

    let width: u32 = parse_part(parts[2], line_no)?;
    let height: u32 = parse_part(parts[3], line_no)?;
    if width == 0 || height == 0 {
        return Err(parse_error(
            line_no,
            format!("Invalid camera size: {width}x{height}"),
        ));
    }

    Ok(ColmapCamera {
        camera_id: parse_part(parts[0], line_no)?,
        model,
        width,
        height,
        params,
    })
}

/// Parse a point3d line and return a ColmapPoint3d struct.
///       POINT3D_ID, X, Y, Z, R, G, B, ERROR, TRACK[0], TRACK[1], ...
fn parse_point3d_line(line_no: usize, line: &str) -> Result<ColmapPoint3d> {
    // split the line into parts by whitespace
    let parts = line.split_whitespace().collect::<Vec<_>>();

    // check if the number of parts is correct
    if parts.len() < 8 || (parts.len() - 8) % 2 != 0 {
        return Err(parse_error(
            line_no,
            format!("Invalid number of parts: {}", parts.len()),
        ));
    }

    Ok(ColmapPoint3d {
        point3d_id: parse_part(parts[0], line_no)?,
        xyz: parse_array(&parts[1..4], line_no)?,
        rgb: parse_array(&parts[4..7], line_no)?,
        error: parse_part(parts[7], line_no)?,
        track: parts[8..]
            .chunks_exact(2)
            .map(|chunk| -> Result<(u32, u32)> {
                Ok((parse_part(chunk[0], line_no)?, parse_part(chunk[1], line_no)?))
            })
            .collect::<Result<Vec<_>>>()?,
    })
}

/// Parse an image line and return a ColmapImage struct.
/// #   IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME
/// #   POINTS2D[] as (X, Y, POINT3D_ID)
fn parse_image_lines(
    (line_no, line1): (usize, &str),
    line2: Option<(usize, &str)>,
) -> Result<ColmapImage> {
    // split the line into parts by whitespace
    let parts1 = line1.split_whitespace().collect::<Vec<_>>();

    if parts1.len() != 10 {
        return Err(parse_error(
            line_no,
            format!("Expected 10 image fields, got {}", parts1.len()),
        ));
    }

    let points2d = match line2 {
        Some((line_no2, line2)) => {
            let parts2 = line2.split_whitespace().collect::<Vec<_>>();
            if parts2.len() % 3 != 0 {
                return Err(parse_error(
                    line_no2,
                    format!("Invalid number of point2d parts: {}", parts2.len()),
                ));
            }
            parts2
                .chunks_exact(3)
                .map(|chunk| -> Result<(f64, f64, i64)> {
                    Ok((
                        parse_part(chunk[0], line_no2)?,
                        parse_part(chunk[1], line_no2)?,
                        parse_part(chunk[2], line_no2)?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?
        }
        None => Vec::new(),
    };

    Ok(ColmapImage {
        image_id: parse_part(parts1[0], line_no)?,
        qvec: parse_array(&parts1[1..5], line_no)?,
        tvec: parse_array(&parts1[5..8], line_no)?,
        camera_id: parse_part(parts1[8], line_no)?,
        name: parts1[9].to_string(),
        points2d,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> TextModel {
        TextModel {
            cameras: vec![ColmapCamera {
                camera_id: 1,
                model: CameraModel::Radial,
                width: 1280,
                height: 720,
                params: vec![700.0, 640.0, 360.0, -0.05, 0.01],
            }],
            images: vec![
                ColmapImage {
                    image_id: 1,
                    name: "left_0001.jpg".to_string(),
                    camera_id: 1,
                    qvec: [1.0, 0.0, 0.0, 0.0],
                    tvec: [0.0, 0.0, 0.0],
                    points2d: vec![],
                },
                ColmapImage {
                    image_id: 2,
                    name: "left_0002.jpg".to_string(),
                    camera_id: 1,
                    qvec: [0.9238795325112867, 0.0, 0.3826834323650898, 0.0],
                    tvec: [0.1, -1.0 / 3.0, 2.5e-7],
                    points2d: vec![(10.5, 20.25, 3), (1.0, 2.0, -1)],
                },
            ],
        }
    }

    #[test]
    fn test_write_cameras_format() -> Result<()> {
        let mut out = Vec::new();
        write_cameras(&sample_model().cameras, &mut out)?;
        let text = String::from_utf8(out).expect("utf8");
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], "# Number of cameras: 1");
        assert_eq!(lines[3], "1 RADIAL 1280 720 700 640 360 -0.05 0.01");
        Ok(())
    }

    #[test]
    fn test_write_images_format() -> Result<()> {
        let mut out = Vec::new();
        write_images(&sample_model().images[..1], &mut out)?;
        let text = String::from_utf8(out).expect("utf8");
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[4], "1 1 0 0 0 0 0 0 1 left_0001.jpg");
        assert_eq!(lines[5], "");
        Ok(())
    }

    #[test]
    fn test_roundtrip_exact() -> Result<()> {
        let model = sample_model();
        let mut cameras = Vec::new();
        write_cameras(&model.cameras, &mut cameras)?;
        let mut images = Vec::new();
        write_images(&model.images, &mut images)?;

        let parsed = TextModel {
            cameras: read_cameras(cameras.as_slice())?,
            images: read_images(images.as_slice())?,
        };
        assert_eq!(parsed, model);
        Ok(())
    }

    #[test]
    fn test_export_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        std::fs::create_dir(&first)?;
        std::fs::create_dir(&second)?;

        sample_model().write_to_dir(&first, None)?;
        TextModel::read_from_dir(&first)?.write_to_dir(&second, None)?;

        for name in [CAMERAS_TXT, IMAGES_TXT, POINTS3D_TXT] {
            let a = std::fs::read(first.join(name))?;
            let b = std::fs::read(second.join(name))?;
            assert_eq!(a, b, "{name} differs");
        }
        Ok(())
    }

    #[test]
    fn test_points_template_is_copied() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let template = dir.path().join("template.txt");
        let content = "# points\n1 0.5 1.5 2.5 255 0 10 0.25 1 0 2 3\n";
        std::fs::write(&template, content)?;

        let out_dir = dir.path().join("out");
        std::fs::create_dir(&out_dir)?;
        let paths = sample_model().write_to_dir(&out_dir, Some(&template))?;
        assert_eq!(paths.len(), 3);
        assert_eq!(std::fs::read_to_string(out_dir.join(POINTS3D_TXT))?, content);

        let points = read_points3d_txt(out_dir.join(POINTS3D_TXT))?;
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].point3d_id, 1);
        assert_eq!(points[0].xyz, [0.5, 1.5, 2.5]);
        assert_eq!(points[0].rgb, [255, 0, 10]);
        assert_eq!(points[0].track, vec![(1, 0), (2, 3)]);
        Ok(())
    }

    #[test]
    fn test_empty_points_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(POINTS3D_TXT);
        copy_points3d_txt(None, &path)?;
        assert!(read_points3d_txt(&path)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_parse_errors_report_line() {
        let input = "# header\n1 RADIAL 1280 720 700 640 360 -0.05 0.01\n2 RADIAL 1280 720 700 640\n";
        match read_cameras(input.as_bytes()) {
            Err(ColmapError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {other:?}"),
        }

        let input = "# header\n1 RADIAL 0 720 700 640 360 -0.05 0.01\n";
        match read_cameras(input.as_bytes()) {
            Err(ColmapError::Parse { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("0x720"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let input = "1 UNKNOWN 1280 720 1 2 3\n";
        match read_cameras(input.as_bytes()) {
            Err(ColmapError::Parse { line, message }) => {
                assert_eq!(line, 1);
                assert!(message.contains("UNKNOWN"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let input = "# a\n# b\n1 1 0 0 0 0 0 1 left_0001.jpg\n\n";
        match read_images(input.as_bytes()) {
            Err(ColmapError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {other:?}"),
        }

        let input = "1 1 0 0 0 0 0 0 1 a.jpg\n1.0 2.0\n";
        match read_images(input.as_bytes()) {
            Err(ColmapError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {other:?}"),
        }

        let input = "1 1 0 0 x 0 0 0 1 a.jpg\n\n";
        assert!(matches!(
            read_images(input.as_bytes()),
            Err(ColmapError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_missing_last_observation_line() -> Result<()> {
        let input = "1 1 0 0 0 0 0 0 1 a.jpg\n\n2 1 0 0 0 1 2 3 1 b.jpg";
        let images = read_images(input.as_bytes())?;
        assert_eq!(images.len(), 2);
        assert_eq!(images[1].tvec, [1.0, 2.0, 3.0]);
        assert!(images[1].points2d.is_empty());
        Ok(())
    }

    #[test]
    fn test_invalid_image_name() {
        let mut model = sample_model();
        model.images[0].name = "left 0001.jpg".to_string();
        let mut out = Vec::new();
        assert!(matches!(
            write_images(&model.images, &mut out),
            Err(ColmapError::InvalidImageName(_))
        ));
    }

    #[test]
    fn test_invalid_image_name_keeps_existing_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(IMAGES_TXT);
        let model = sample_model();
        write_images_txt(&model.images, &path)?;
        let before = std::fs::read(&path)?;

        let mut broken = model.images.clone();
        broken[1].name = String::new();
        assert!(matches!(
            write_images_txt(&broken, &path),
            Err(ColmapError::InvalidImageName(_))
        ));
        assert_eq!(std::fs::read(&path)?, before);
        Ok(())
    }
}
