use argh::FromArgs;
use std::path::PathBuf;

use camcad::k3d::{self, ops, PinholeCamera};
use camcad::lie::Pose;
use camcad::registration::{Registration, SolverOptions};
use glam::DVec3;

#[derive(FromArgs)]
/// Align a CAD outline with labelled image points
struct Args {
    /// path to the CAD outline points (JSON with a `points` array)
    #[argh(option)]
    cad_points: PathBuf,

    /// path to the labelled image points (JSON with a `points` array)
    #[argh(option)]
    image_points: PathBuf,

    /// path to the camera intrinsics (JSON with fx, fy, cx, cy)
    #[argh(option)]
    intrinsics: PathBuf,

    /// path to the solver options (JSON, every field optional)
    #[argh(option)]
    config: Option<PathBuf>,

    /// path to the initial pose (JSON with `pose: [x, y, z, rx, ry, rz]`, degrees)
    #[argh(option)]
    initial_pose: Option<PathBuf>,

    /// path to the structure pose applied after the initial pose (same format)
    #[argh(option)]
    structure_pose: Option<PathBuf>,

    /// apply the pose files with inverted signs
    #[argh(switch)]
    inverted: bool,

    /// points interpolated between consecutive CAD outline vertices
    #[argh(option, default = "0")]
    densify: usize,

    /// scale applied to the CAD outline (CAD units to world units)
    #[argh(option, default = "1.0")]
    cad_scale: f64,

    /// move the CAD outline so its bounding box is centred on the origin
    #[argh(switch)]
    center_cad: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let camera = PinholeCamera::from_json_file(&args.intrinsics)?;
    let observed = k3d::io::read_points_json(&args.image_points)?;
    println!("Image points: #{}", observed.len());

    let outline = k3d::io::read_points_json(&args.cad_points)?;
    let outline = if args.center_cad {
        let (centered, offset) = ops::center_on_origin(outline.points());
        log::info!("CAD outline shifted by ({:.3}, {:.3})", -offset.x, -offset.y);
        centered
    } else {
        outline.into_inner()
    };
    let outline = ops::densify_points(&outline, args.densify);
    let cad = ops::populate_cloud(&outline, 0.0);
    let scale = DVec3::new(args.cad_scale, args.cad_scale, 1.0);
    let cad = ops::scale_points(cad.points(), scale);
    println!("CAD points: #{}", cad.len());

    let options = match &args.config {
        Some(path) => SolverOptions::from_json_file(path)?,
        None => SolverOptions::default(),
    };

    let mut registration = Registration::new(&cad, observed.points(), &camera, options)?;
    if args.initial_pose.is_some() || args.structure_pose.is_some() {
        let mut pose = Pose::IDENTITY;
        if let Some(path) = &args.initial_pose {
            pose = k3d::io::PoseFile::read(path)?.apply_initial(&pose, args.inverted);
        }
        if let Some(path) = &args.structure_pose {
            pose = k3d::io::read_transform_pose_json(path, &pose, args.inverted)?;
        }
        log::info!("initial pose: {:?}", pose);
        registration = registration.with_initial_pose(pose);
    }

    let result = registration.run();
    println!(
        "Registration {} after {} iterations, mean pixel error {:?}",
        result.state, result.outer_iterations, result.final_mean_pixel_error
    );
    println!("Pose matrix (CAD to camera): {:?}", result.matrix());
    println!(
        "Pose quaternion + translation [w, x, y, z, tx, ty, tz]: {:?}",
        result.quaternion_translation()
    );

    // back-project the image points onto the registered CAD plane
    match ops::fit_plane(&cad) {
        Some((normal, center)) => {
            let on_plane = ops::back_project_to_plane(
                observed.points(),
                &camera,
                result.pose.rotation * normal,
                result.pose.transform_point(center),
            );
            let in_cad = ops::transform_cloud(&on_plane, &result.pose.inverse());
            println!(
                "Back-projected {} of {} image points onto the CAD plane",
                in_cad.len(),
                observed.len()
            );
        }
        None => log::warn!("CAD points do not span a plane, back-projection skipped"),
    }

    if !result.is_converged() {
        log::warn!("registration did not converge: {}", result.state);
    }

    Ok(())
}
