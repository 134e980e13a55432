use std::path::{Path, PathBuf};

use argh::FromArgs;
use log::{error, info};

use spa_converter::{
    config::{ConverterConfig, SchemaKind},
    data::{input::FrameSource, output::write_json},
    error::ConvertError,
    Converter,
};

#[derive(FromArgs, Debug)]
/// Convert lidar/camera frames into info records and COCO-style 2d annotations.
struct Args {
    /// json file holding the list of frames to convert
    #[argh(option, short = 'm')]
    manifest: PathBuf,

    /// built-in dataset schema: spa_mvx, spa_nus or waymo
    #[argh(option, short = 's', default = "SchemaKind::SpaMvx")]
    schema: SchemaKind,

    /// json converter config, overrides --schema
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// number of worker threads
    #[argh(option, short = 'n')]
    workers: Option<usize>,

    /// where to write the info records
    #[argh(option)]
    out_info: Option<PathBuf>,

    /// where to write the COCO json
    #[argh(option)]
    out_coco: Option<PathBuf>,

    /// leave out the mono3d fields of the 2d annotations
    #[argh(switch)]
    no_mono3d: bool,
}

fn read_manifest(path: &Path) -> Result<Vec<FrameSource>, ConvertError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConvertError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => ConverterConfig::from_json_file(path)?,
        None => ConverterConfig::new(args.schema.schema()),
    };
    if let Some(workers) = args.workers {
        config.num_workers = workers;
    }
    if args.no_mono3d {
        config.mono3d = false;
    }

    let frames = read_manifest(&args.manifest)?;
    info!("{} frames, schema {}", frames.len(), config.schema.name);
    let converter = Converter::new(config);
    let mut all_failed = !frames.is_empty();

    if let Some(out_info) = &args.out_info {
        let report = converter.convert_all(&frames);
        info!("info: {} converted, {} failed", report.num_succeeded(), report.num_failed());
        all_failed &= report.num_succeeded() == 0;
        write_json(&report.into_records(), out_info)?;
    }

    if let Some(out_coco) = &args.out_coco {
        let (dataset, failures) = converter.export_coco(&frames);
        info!(
            "coco: {} images, {} annotations, {} frames failed",
            dataset.images.len(),
            dataset.annotations.len(),
            failures.len()
        );
        all_failed &= failures.len() == frames.len();
        dataset.to_json_file(out_coco)?;
    }

    if all_failed && (args.out_info.is_some() || args.out_coco.is_some()) {
        error!("every frame failed");
        std::process::exit(1);
    }
    Ok(())
}
