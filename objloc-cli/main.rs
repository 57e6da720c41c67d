use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use log::{error, info, LevelFilter};
use objloc_cli::{CliResult, ExtractorConfig, FileSystemLoader, LocalizerConfig, Pipeline, Preprocessing, RunOptions};

#[derive(Parser)]
#[command(name = "objloc")]
#[command(about = "Localize known rigid objects in test images from keypoint matches against reference views")]
#[command(version)]
struct Cli {
    /// Log per-view match counts and RANSAC results.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Localize every object in every test image of a dataset.
    Run(RunArgs),

    /// Print the effective configuration as TOML.
    DumpConfig(ConfigArgs),
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    /// Localizer configuration file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start from the YCB category thresholds instead of the defaults.
    #[arg(long)]
    ycb: bool,

    /// Worker threads.
    #[arg(long)]
    threads: Option<usize>,

    /// RANSAC seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Reference views fused for the cluster fallback.
    #[arg(long)]
    top_n: Option<usize>,

    /// Nearest-neighbour distance ratio.
    #[arg(long)]
    ratio: Option<f32>,
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Dataset root with one directory per object.
    dataset: PathBuf,

    /// Directory for rendered images and the JSON report.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory of `<test image stem>.txt` annotation files.
    #[arg(long)]
    ground_truth: Option<PathBuf>,

    /// Skip the bilateral denoising of extractor inputs.
    #[arg(long)]
    no_denoise: bool,

    /// Gaussian blur sigma applied after denoising.
    #[arg(long)]
    blur: Option<f32>,

    /// FAST intensity threshold.
    #[arg(long, default_value = "20")]
    fast_threshold: u8,

    /// Keypoints kept per image.
    #[arg(long, default_value = "1000")]
    max_features: usize,

    #[command(flatten)]
    config: ConfigArgs,
}

impl ConfigArgs {
    fn resolve(&self) -> CliResult<LocalizerConfig> {
        let mut config = match &self.config {
            Some(path) => LocalizerConfig::load_toml(path)?,
            None if self.ycb => LocalizerConfig::ycb_preset(),
            None => LocalizerConfig::default(),
        };
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(top_n) = self.top_n {
            config.top_n_views = top_n;
        }
        if let Some(ratio) = self.ratio {
            config.nndr_ratio = ratio;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    builder.filter_level(if verbose { LevelFilter::Debug } else { LevelFilter::Info });
    builder.parse_default_env();
    builder.init();
}

fn run(args: &RunArgs) -> CliResult<()> {
    let config = args.config.resolve()?;
    info!("{}", config.summary());

    let extractor_config = ExtractorConfig {
        threshold: args.fast_threshold,
        max_features: args.max_features,
        ..ExtractorConfig::default()
    };
    let pipeline = Pipeline::new(config, extractor_config)?;
    let loader = FileSystemLoader::new(&args.dataset);
    let options = RunOptions {
        output: args.output.clone(),
        ground_truth: args.ground_truth.clone(),
        preprocessing: Preprocessing {
            denoise: !args.no_denoise,
            blur_sigma: args.blur,
            ..Preprocessing::default()
        },
    };

    let t0 = Instant::now();
    let report = pipeline.runner(&loader, options).run()?;
    info!("processed {} test images in {:.2?}", report.images.len(), t0.elapsed());

    for image in &report.images {
        for outcome in &image.outcomes {
            match (outcome.present, outcome.region()) {
                (false, _) => println!("{}/{} {}: not enough matches", image.object_dir, image.image, outcome.object),
                (true, Some(region)) => {
                    let r = region.envelope();
                    println!(
                        "{}/{} {}: {} matches, {} inliers, {} box at ({:.0}, {:.0}, {:.0}x{:.0})",
                        image.object_dir,
                        image.image,
                        outcome.object,
                        outcome.match_count,
                        outcome.inlier_count,
                        outcome.strategy.map_or("no", |s| s.name()),
                        r.x,
                        r.y,
                        r.width,
                        r.height
                    );
                }
                (true, None) => println!(
                    "{}/{} {}: {} matches, no valid box",
                    image.object_dir, image.image, outcome.object, outcome.match_count
                ),
            }
        }
    }

    if args.ground_truth.is_some() {
        println!("\n{}", report.evaluation);
    }
    Ok(())
}

fn dump_config(args: &ConfigArgs) -> CliResult<()> {
    print!("{}", args.resolve()?.to_toml()?);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match &cli.command {
        Commands::Run(args) => run(args),
        Commands::DumpConfig(args) => dump_config(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
