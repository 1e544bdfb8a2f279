//! brandscrub - brand-mark sanitization for product photographs
//!
//! CLI entry point. Results go to stdout as JSON; logs and progress go to
//! stderr.

use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use brandscrub::{
    exit_codes, AnalysisResult, AnalysisStatus, AnalysisStore, BatchSelection, CatalogError, Cli,
    Commands, Config, ConfigError, DecodeError, FallbackMode, JsonFileStore, MaskEngine,
    Photograph, Sanitizer, ServiceError, SharpnessScorer,
};
use brandscrub::cli::{BatchArgs, BlurArgs, ScoreArgs, ShowArgs};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    };

    std::process::exit(code);
}

/// `RUST_LOG` wins; otherwise warn, raised by -v / -vv
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,brandscrub={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Analyze(args) => run_analyze(cli, &args.id),
        Commands::Batch(args) => run_batch(cli, args),
        Commands::Score(args) => run_score(args),
        Commands::Blur(args) => run_blur(cli, args),
        Commands::Show(args) => run_show(cli, args),
        Commands::Info => run_info(cli),
    }
}

/// File, then environment, then explicit flags
fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    config.apply_env();

    let config = config.merge_with_cli(&cli.overrides());
    config.validate()?;
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============ Analyze Command ============

fn run_analyze(cli: &Cli, id: &str) -> anyhow::Result<i32> {
    let config = load_config(cli)?;
    let sanitizer = Sanitizer::from_config(&config)?;

    let result = sanitizer.analyze_single(id)?;
    print_json(&result)?;

    Ok(match result.status {
        AnalysisStatus::Failed => exit_codes::GENERAL_ERROR,
        _ => exit_codes::SUCCESS,
    })
}

// ============ Batch Command ============

fn run_batch(cli: &Cli, args: &BatchArgs) -> anyhow::Result<i32> {
    let selection = if args.all {
        BatchSelection::All
    } else if !args.ids.is_empty() {
        BatchSelection::Ids(args.ids.clone())
    } else {
        eprintln!("Error: give product ids or --all");
        return Ok(exit_codes::INVALID_ARGS);
    };

    let config = load_config(cli)?;
    let sanitizer = Sanitizer::from_config(&config)?;

    let bar = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let progress = |current: usize, total: usize, result: &AnalysisResult| {
        bar.set_length(total as u64);
        bar.set_position(current as u64);
        bar.set_message(format!("{}: {}", result.product_id, result.status));
    };
    let report = sanitizer.analyze_batch(&selection, &progress)?;
    bar.finish_and_clear();

    print_json(&report)?;

    if !cli.quiet {
        let s = &report.summary;
        eprintln!(
            "{} product(s): {} clean, {} blur_applied, {} needs_review, {} failed",
            s.total, s.clean, s.blur_applied, s.needs_review, s.failed
        );
        for (id, error) in &s.failures {
            eprintln!("  {}: {}", id, error);
        }
        if report.cancelled {
            eprintln!("Batch was cancelled before completion");
        }
    }

    Ok(if report.summary.has_failures() || report.cancelled {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::SUCCESS
    })
}

// ============ Score Command ============

fn run_score(args: &ScoreArgs) -> anyhow::Result<i32> {
    if !args.image.exists() {
        return Err(DecodeError::NotFound(args.image.clone()).into());
    }

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("reading {}", args.image.display()))?;
    let metric = SharpnessScorer::score_or_worst(&bytes);

    print_json(&json!({
        "image": args.image,
        "sharpness": metric.sharpness,
        "blur_score": metric.blur_score,
    }))?;
    Ok(exit_codes::SUCCESS)
}

// ============ Blur Command ============

fn run_blur(cli: &Cli, args: &BlurArgs) -> anyhow::Result<i32> {
    let config = load_config(cli)?;
    let mut options = config.mask_options();
    if args.full_frame {
        options.fallback = FallbackMode::FullFrame;
    }

    let photo = Photograph::open(&args.image)?;
    let outcome = MaskEngine::new(options).apply_region_blur(&photo, &args.regions);
    outcome
        .photo
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    print_json(&json!({
        "output": args.output,
        "regions_applied": outcome.regions_applied,
        "regions_skipped": outcome.regions_skipped,
        "full_frame": outcome.full_frame,
    }))?;
    Ok(exit_codes::SUCCESS)
}

// ============ Show Command ============

fn run_show(cli: &Cli, args: &ShowArgs) -> anyhow::Result<i32> {
    let config = load_config(cli)?;
    let Some(path) = &config.storage.results_path else {
        bail!("no results document configured (set storage.results_path or --results)");
    };
    let store = JsonFileStore::open(path)?;

    match &args.id {
        Some(id) => match store.get(id)? {
            Some(result) => print_json(&result)?,
            None => {
                eprintln!("Error: no result stored for {}", id);
                return Ok(exit_codes::INPUT_NOT_FOUND);
            }
        },
        None => print_json(&store.list()?)?,
    }
    Ok(exit_codes::SUCCESS)
}

// ============ Info Command ============

fn run_info(cli: &Cli) -> anyhow::Result<i32> {
    println!("brandscrub v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("System Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);
    println!("  CPUs: {}", num_cpus::get());

    println!();
    println!("Config File Locations:");
    for path in Config::search_paths() {
        let marker = if path.is_file() { " (found)" } else { "" };
        println!("  {}{}", path.display(), marker);
    }

    let mut config = match load_config(cli) {
        Ok(config) => config,
        Err(e) => {
            warn!("Could not load config: {}", e);
            Config::default()
        }
    };
    for service in [&mut config.detector, &mut config.editor, &mut config.title] {
        if service.api_key.is_some() {
            service.api_key = Some("********".into());
        }
    }

    println!();
    println!("Services:");
    println!("  Detector: {}", endpoint(&config.detector.base_url));
    println!("  Editor:   {}", endpoint(&config.editor.base_url));
    println!("  Title:    {}", endpoint(&config.title.base_url));

    println!();
    println!("Effective Configuration:");
    println!("{}", config.to_toml()?);

    Ok(exit_codes::SUCCESS)
}

fn endpoint(url: &Option<String>) -> &str {
    url.as_deref().unwrap_or("not configured")
}

// ============ Exit Codes ============

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<ServiceError>() {
        return match e {
            ServiceError::UnknownProduct(_) => exit_codes::INPUT_NOT_FOUND,
            ServiceError::Catalog(CatalogError::NotFound(_)) => exit_codes::INPUT_NOT_FOUND,
            ServiceError::NoCatalog | ServiceError::Remote(_) => exit_codes::INVALID_ARGS,
            _ => exit_codes::GENERAL_ERROR,
        };
    }
    if let Some(e) = err.downcast_ref::<ConfigError>() {
        return match e {
            ConfigError::NotFound(_) => exit_codes::INPUT_NOT_FOUND,
            _ => exit_codes::INVALID_ARGS,
        };
    }
    if let Some(DecodeError::NotFound(_)) = err.downcast_ref::<DecodeError>() {
        return exit_codes::INPUT_NOT_FOUND;
    }
    if missing_path(err) {
        return exit_codes::INPUT_NOT_FOUND;
    }
    exit_codes::GENERAL_ERROR
}

fn missing_path(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound)
    })
}
