//! Demo binary: drives a [`zaru_pipeline::Pipeline`] over a directory of still frames, standing
//! in for a live camera feed, and prints the report lines and per-stage timings for each one.

use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;
use zaru_image::Image;
use zaru_pipeline::{Filter, Pipeline};
use zaru_utils::timer::FpsCounter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the zoo YAML file describing available pipelines.
    #[arg(long)]
    zoo: PathBuf,

    /// Name of the zoo entry to run.
    #[arg(long)]
    pipe: String,

    /// Narrows the zoo entries considered valid for `--pipe` by accelerator class.
    #[arg(long, value_enum, default_value_t = Filter::All)]
    filter: Filter,

    /// Directory of still images to feed through the pipeline in place of a camera.
    #[arg(long)]
    frames: PathBuf,

    /// Runs the pipeline in asynchronous (one-frame-latency) mode instead of synchronous.
    #[arg(long)]
    r#async: bool,

    /// Writes each frame's overlay to this directory, if given.
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .init();

    let args = Args::parse();

    let mut pipeline = Pipeline::new();
    pipeline.set_zoo(args.zoo);
    pipeline.set_pipe(args.pipe);
    pipeline.set_filter(args.filter);
    pipeline.set_async(args.r#async);

    if let Some(out_dir) = &args.out_dir {
        std::fs::create_dir_all(out_dir)?;
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(&args.frames)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    if paths.is_empty() {
        anyhow::bail!("no frames found in '{}'", args.frames.display());
    }

    let mut fps = FpsCounter::new("zaru");
    for path in &paths {
        let frame = Image::load(path)?;
        let mut out_img = args.out_dir.is_some().then(|| frame.clone());

        let lines = pipeline.process(frame.view(&frame.rect()), out_img.as_mut(), true);
        println!("{}:", path.display());
        for line in lines {
            println!("  {line}");
        }

        if let (Some(out_dir), Some(out_img)) = (&args.out_dir, &out_img) {
            let name = path.file_name().expect("filtered to files, so this has a name");
            out_img.save(out_dir.join(name))?;
        }

        fps.tick_with(pipeline.timers().into_iter());
    }

    for timer in pipeline.timers() {
        println!("{timer}");
    }

    Ok(())
}
