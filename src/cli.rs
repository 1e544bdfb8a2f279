//! Command-line interface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CliOverrides;
use crate::region::BoundingBox;

/// Process exit codes
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_ARGS: i32 = 2;
    pub const INPUT_NOT_FOUND: i32 = 3;
    /// Batch finished but at least one item failed
    pub const PARTIAL_FAILURE: i32 = 4;
}

/// Brand-mark sanitization for product photographs
#[derive(Debug, Parser)]
#[command(name = "brandscrub", version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: ./brandscrub.toml, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Product manifest (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub catalog: Option<PathBuf>,

    /// Results document (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub results: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print results, no progress
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze one product by id
    Analyze(AnalyzeArgs),
    /// Analyze several products, or the whole catalog
    Batch(BatchArgs),
    /// Print the blur metric of an image
    Score(ScoreArgs),
    /// Blur rectangular regions of an image
    Blur(BlurArgs),
    /// Show stored results
    Show(ShowArgs),
    /// Show configuration and environment
    Info,
}

/// Pipeline tuning shared by `analyze` and `batch`
#[derive(Debug, Clone, Default, Args)]
pub struct PipelineArgs {
    /// Risk scores below this (with no brands) are clean
    #[arg(long, value_name = "0-100")]
    pub clean_threshold: Option<u8>,

    /// Maximum edit passes per photograph
    #[arg(long, value_name = "N")]
    pub max_passes: Option<u32>,

    /// Skip the deterministic blur after the last pass
    #[arg(long)]
    pub no_fallback_blur: bool,

    /// Report `clean` rather than `blur_applied` after a fallback blur
    #[arg(long)]
    pub fallback_blur_is_clean: bool,

    /// Directory for edited images
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Product id
    pub id: String,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Product ids (omit with --all)
    pub ids: Vec<String>,

    /// Process the whole catalog
    #[arg(long, conflicts_with = "ids")]
    pub all: bool,

    /// Pause between items in milliseconds
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Items processed at once
    #[arg(short = 'j', long, value_name = "N")]
    pub concurrency: Option<usize>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Debug, Args)]
pub struct ScoreArgs {
    /// Image file
    pub image: PathBuf,
}

#[derive(Debug, Args)]
pub struct BlurArgs {
    /// Image file
    pub image: PathBuf,

    /// Region as x,y,width,height (repeatable)
    #[arg(short, long = "region", value_name = "X,Y,W,H", value_parser = parse_region)]
    pub regions: Vec<BoundingBox>,

    /// Output file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Blur intensity (Gaussian sigma)
    #[arg(long)]
    pub intensity: Option<u32>,

    /// Skip regions smaller than this
    #[arg(long)]
    pub min_region_size: Option<u32>,

    /// Blur the whole frame when no region is usable
    #[arg(long)]
    pub full_frame: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Product id (all results when omitted)
    pub id: Option<String>,
}

impl Cli {
    /// Overrides for values given explicitly on the command line
    pub fn overrides(&self) -> CliOverrides {
        let mut overrides = CliOverrides::new();
        overrides.catalog_path = self.catalog.clone();
        overrides.results_path = self.results.clone();

        match &self.command {
            Commands::Analyze(args) => args.pipeline.apply(&mut overrides),
            Commands::Batch(args) => {
                args.pipeline.apply(&mut overrides);
                overrides.inter_item_delay_ms = args.delay_ms;
                overrides.concurrency = args.concurrency;
            }
            Commands::Blur(args) => {
                overrides.blur_intensity = args.intensity;
                overrides.min_region_size = args.min_region_size;
            }
            Commands::Score(_) | Commands::Show(_) | Commands::Info => {}
        }

        overrides
    }
}

impl PipelineArgs {
    fn apply(&self, overrides: &mut CliOverrides) {
        overrides.clean_risk_threshold = self.clean_threshold;
        overrides.max_passes = self.max_passes;
        if self.no_fallback_blur {
            overrides.fallback_blur = Some(false);
        }
        if self.fallback_blur_is_clean {
            overrides.treat_fallback_blur_as_clean = Some(true);
        }
        overrides.output_dir = self.output_dir.clone();
    }
}

/// Parse `x,y,width,height`
pub fn parse_region(s: &str) -> Result<BoundingBox, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!("expected x,y,width,height, got '{}'", s));
    }

    let mut values = [0u32; 4];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("'{}' is not a non-negative integer", part))?;
    }

    let [x, y, width, height] = values;
    if width == 0 || height == 0 {
        return Err("region width and height must be positive".into());
    }
    Ok(BoundingBox::new(x, y, width, height))
}
