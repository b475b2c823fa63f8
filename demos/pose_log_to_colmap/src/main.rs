use argh::FromArgs;
use std::path::PathBuf;

use kornia_colmap::{
    config::ConversionConfig,
    converter::{plan_modes, run_conversion},
    source::{PoseLog, PoseSource},
};

#[derive(FromArgs)]
/// Reads intrinsics and extrinsics from a recorded pose log and writes them in the format required by COLMAP.
struct Args {
    /// path to the pose log (.json)
    #[argh(positional)]
    filename: PathBuf,

    /// initialize COLMAP intrinsics
    #[argh(switch, short = 'i')]
    intrinsics: bool,

    /// initialize COLMAP extrinsics
    #[argh(switch, short = 'e')]
    extrinsics: bool,

    /// convert the COLMAP database to the text model (cameras.txt, images.txt, points3D.txt)
    #[argh(switch, short = 't')]
    text_model: bool,

    /// log every pose while reading frames
    #[argh(switch, short = 'v')]
    viewer: bool,

    /// path to a JSON conversion config
    #[argh(option)]
    config: Option<PathBuf>,

    /// directory receiving the text model
    #[argh(option)]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => ConversionConfig::from_json_file(path)?,
        None => ConversionConfig::default(),
    };
    if let Some(output_dir) = args.output_dir {
        config = config.with_output_dir(output_dir);
    }
    config = config.with_verbose_poses(args.viewer);

    let modes = plan_modes(args.intrinsics, args.extrinsics, args.text_model);
    if modes.is_empty() {
        log::warn!("Nothing to do. Please specify at least one of the options -i or -e or -t.");
        return Ok(());
    }

    let needs_source = modes.iter().any(|mode| mode.requires_source());
    let mut source = if needs_source {
        log::info!("Reading pose log: {}", args.filename.display());
        Some(PoseLog::from_json_file(&args.filename)?)
    } else {
        None
    };

    for mode in modes {
        let report = run_conversion(
            &config,
            mode,
            source.as_mut().map(|s| s as &mut dyn PoseSource),
        )?;
        log::info!(
            "{mode}: {} image(s) created, {} updated, {} frame(s) skipped",
            report.images_created,
            report.images_updated,
            report.frames_skipped
        );
        for path in &report.files_written {
            log::info!("Wrote {}", path.display());
        }
    }

    Ok(())
}
