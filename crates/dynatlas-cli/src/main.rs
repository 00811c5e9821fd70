use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use dynatlas_core::{AtlasConfig, AtlasError, DynamicAtlas, PixelAtlas};
use globset::{Glob, GlobSet, GlobSetBuilder};
use image::{ImageReader, RgbaImage};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    name = "dynatlas",
    about = "Pack images into a dynamic texture atlas",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show progress bars (disable with --no-progress or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Insert every image of a folder into one dynamic atlas and write PNG + JSON
    Pack(PackArgs),
    /// Random ensure/release churn against an atlas; prints occupancy and tree stats
    Simulate(SimulateArgs),
}

#[derive(Parser, Debug, Clone)]
struct PackArgs {
    // Input/Output
    /// Input file or directory
    #[arg(help_heading = "Input/Output")]
    input: PathBuf,
    /// Output directory
    #[arg(short, long, default_value = "out", help_heading = "Input/Output")]
    out_dir: PathBuf,
    /// Atlas base name (files will be name.png/.json)
    #[arg(short, long, default_value = "atlas", help_heading = "Input/Output")]
    name: String,
    /// YAML config file path (replaces --width/--height/--capacity/--node-capacity)
    #[arg(long, help_heading = "Input/Output")]
    config: Option<PathBuf>,
    /// Include patterns (glob). If set, only files matching any pattern are considered
    #[arg(long, help_heading = "Input/Output")]
    include: Vec<String>,
    /// Exclude patterns (glob). Files matching any pattern will be ignored
    #[arg(long, help_heading = "Input/Output")]
    exclude: Vec<String>,

    // Atlas
    /// Atlas width
    #[arg(long, default_value_t = 1024, help_heading = "Atlas")]
    width: u32,
    /// Atlas height
    #[arg(long, default_value_t = 1024, help_heading = "Atlas")]
    height: u32,
    /// Max resident regions (defaults to the number of input images)
    #[arg(long, help_heading = "Atlas")]
    capacity: Option<usize>,
    /// Node arena size (defaults to a budget derived from --capacity)
    #[arg(long, help_heading = "Atlas")]
    node_capacity: Option<usize>,
    /// Insertion order: area_desc|name_asc|none
    #[arg(long, default_value = "area_desc", value_parser = ["area_desc", "name_asc", "none"], help_heading = "Atlas")]
    sort_order: String,

    // Export
    /// Metadata format: json-array | json (alias) | json-hash
    #[arg(long, default_value = "json-array", help_heading = "Export")]
    metadata: String,
    /// Print the merged configuration and exit
    #[arg(long, default_value_t = false, help_heading = "Export")]
    print_config: bool,
    /// Output format for --print-config: json|yaml
    #[arg(long, default_value = "json", value_parser = ["json", "yaml"], help_heading = "Export")]
    print_config_format: String,
    /// Dry run: place everything and print stats but do not write files
    #[arg(long, default_value_t = false, help_heading = "Export")]
    dry_run: bool,
    /// Print the allocator tree down to this depth after packing
    #[arg(long, help_heading = "Export")]
    dump_depth: Option<usize>,
}

#[derive(Parser, Debug, Clone)]
struct SimulateArgs {
    /// Atlas width
    #[arg(long, default_value_t = 1024)]
    width: u32,
    /// Atlas height
    #[arg(long, default_value_t = 1024)]
    height: u32,
    /// Max resident regions
    #[arg(long, default_value_t = 256)]
    capacity: usize,
    /// Node arena size (defaults to a budget derived from --capacity)
    #[arg(long)]
    node_capacity: Option<usize>,
    /// Number of ensure/release operations
    #[arg(long, default_value_t = 10_000)]
    steps: usize,
    /// RNG seed
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Smallest requested side
    #[arg(long, default_value_t = 8)]
    min_size: u32,
    /// Largest requested side
    #[arg(long, default_value_t = 96)]
    max_size: u32,
    /// Probability that a step releases a resident key instead of requesting one
    #[arg(long, default_value_t = 0.4)]
    release_ratio: f64,
    /// Check tree invariants after every step
    #[arg(long, default_value_t = false)]
    verify: bool,
    /// Print the allocator tree down to this depth at the end
    #[arg(long)]
    dump_depth: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Pack(args) => run_pack(args, cli.progress && !cli.quiet),
        Commands::Simulate(args) => run_simulate(args),
    }
}

fn run_pack(cli: &PackArgs, show_progress: bool) -> anyhow::Result<()> {
    let paths = gather_paths(&cli.input, &cli.include, &cli.exclude)?;

    // Config file sets the atlas options en bloc
    let cfg = if let Some(path) = &cli.config {
        let file = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_yaml::from_str::<AtlasConfig>(&file)
            .with_context(|| format!("parse config {}", path.display()))?
    } else {
        AtlasConfig {
            width: cli.width,
            height: cli.height,
            capacity: cli.capacity.unwrap_or(paths.len().max(1)),
            node_capacity: cli.node_capacity,
        }
    };

    if cli.print_config {
        match cli.print_config_format.as_str() {
            "yaml" => println!("{}", serde_yaml::to_string(&cfg)?),
            _ => println!("{}", serde_json::to_string_pretty(&cfg)?),
        }
        return Ok(());
    }
    cfg.validate()?;

    let mut inputs = load_images(&paths, show_progress)?;
    info!(count = inputs.len(), "loaded input images");
    match cli.sort_order.as_str() {
        "area_desc" => inputs.sort_by(|a, b| {
            let area = |i: &RgbaImage| (i.width() as u64) * (i.height() as u64);
            area(&b.1).cmp(&area(&a.1)).then_with(|| a.0.cmp(&b.0))
        }),
        "name_asc" => inputs.sort_by(|a, b| a.0.cmp(&b.0)),
        _ => {}
    }

    let start = Instant::now();
    let mut atlas: PixelAtlas<String> = PixelAtlas::new(&cfg)?;
    let mut skipped = 0usize;
    for (key, img) in &inputs {
        match atlas.add_image(key.clone(), img) {
            Ok(_) => {}
            Err(e @ (AtlasError::NoFit { .. } | AtlasError::InvalidRequest { .. })) => {
                warn!(key = %key, error = %e, "image not placed");
                skipped += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("placing {key}")),
        }
    }
    let dur = start.elapsed();
    let stats = atlas.atlas().stats();
    info!(
        placed = stats.resident,
        skipped,
        time = %fmt_dur(dur),
        "{}",
        stats.summary()
    );
    if let Some(depth) = cli.dump_depth {
        print!("{}", atlas.atlas().allocator().debug_string(Some(depth)));
    }

    if cli.dry_run {
        return Ok(());
    }
    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("create out_dir {}", cli.out_dir.display()))?;
    let png_path = cli.out_dir.join(format!("{}.png", cli.name));
    atlas
        .image()
        .save(&png_path)
        .with_context(|| format!("write {}", png_path.display()))?;

    let snapshot = atlas.atlas().snapshot();
    let json_value = match cli.metadata.as_str() {
        "json-array" | "json" => dynatlas_core::to_json_array(&snapshot),
        "json-hash" => dynatlas_core::to_json_hash(&snapshot),
        other => anyhow::bail!("unknown metadata format: {}", other),
    };
    let json_path = cli.out_dir.join(format!("{}.json", cli.name));
    fs::write(&json_path, serde_json::to_string_pretty(&json_value)?)
        .with_context(|| format!("write {}", json_path.display()))?;
    info!(?png_path, ?json_path, "atlas written");
    Ok(())
}

fn run_simulate(args: &SimulateArgs) -> anyhow::Result<()> {
    anyhow::ensure!(
        args.min_size >= 1 && args.min_size <= args.max_size,
        "need 1 <= min_size <= max_size"
    );
    anyhow::ensure!(
        (0.0..=1.0).contains(&args.release_ratio),
        "release_ratio must be within 0..=1"
    );
    let mut atlas: DynamicAtlas = DynamicAtlas::from_config(&AtlasConfig {
        width: args.width,
        height: args.height,
        capacity: args.capacity,
        node_capacity: args.node_capacity,
    })?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut live: Vec<u64> = Vec::new();
    let mut next_key = 0u64;
    let (mut placed, mut no_fit, mut released) = (0usize, 0usize, 0usize);

    let start = Instant::now();
    for step in 0..args.steps {
        let release = !live.is_empty() && rng.gen_bool(args.release_ratio);
        if release {
            let key = live.swap_remove(rng.gen_range(0..live.len()));
            atlas.release(&key);
            released += 1;
        } else if live.len() < args.capacity {
            let w = rng.gen_range(args.min_size..=args.max_size);
            let h = rng.gen_range(args.min_size..=args.max_size);
            match atlas.ensure_slot(next_key, w, h) {
                Ok(_) => {
                    live.push(next_key);
                    placed += 1;
                }
                Err(AtlasError::NoFit { .. }) => no_fit += 1,
                Err(e) => {
                    error!(step, error = %e, "simulation aborted");
                    return Err(e.into());
                }
            }
            next_key += 1;
        }
        if args.verify {
            atlas
                .allocator()
                .verify()
                .with_context(|| format!("invariant check after step {step}"))?;
        }
    }
    let dur = start.elapsed();

    let stats = atlas.stats();
    println!(
        "steps={} placed={} no_fit={} released={} time={}",
        args.steps,
        placed,
        no_fit,
        released,
        fmt_dur(dur)
    );
    println!("{}", stats.summary());
    if let Some(depth) = args.dump_depth {
        print!("{}", atlas.allocator().debug_string(Some(depth)));
    }
    Ok(())
}

fn fmt_dur(d: Duration) -> String {
    format!("{:.2}ms", d.as_secs_f64() * 1000.0)
}

fn glob_set(patterns: &[String]) -> anyhow::Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(Glob::new(pat).with_context(|| format!("bad glob {pat}"))?);
    }
    Ok(Some(builder.build()?))
}

/// Image files under `root` (or `root` itself), filtered by the globs and sorted.
fn gather_paths(root: &Path, include: &[String], exclude: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let include = glob_set(include)?;
    let exclude = glob_set(exclude)?;
    let wanted = |p: &Path| {
        let s = p.to_string_lossy().replace('\\', "/");
        is_image(p)
            && include.as_ref().is_none_or(|g| g.is_match(&s))
            && !exclude.as_ref().is_some_and(|g| g.is_match(&s))
    };
    let mut list: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && wanted(e.path()))
        .map(|e| e.into_path())
        .collect();
    list.sort();
    Ok(list)
}

// Matches the decoders enabled on the `image` dependency.
fn is_image(p: &Path) -> bool {
    p.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ["png", "jpg", "jpeg"].iter().any(|x| e.eq_ignore_ascii_case(x)))
}

fn load_images(paths: &[PathBuf], progress: bool) -> anyhow::Result<Vec<(String, RgbaImage)>> {
    let bar = if progress {
        ProgressBar::new(paths.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    bar.set_style(ProgressStyle::with_template(
        "{spinner:.green} loading {pos}/{len} {wide_msg}",
    )?);
    let mut list = Vec::with_capacity(paths.len());
    for p in paths {
        bar.set_message(p.display().to_string());
        match decode(p) {
            Ok(img) => list.push((p.to_string_lossy().replace('\\', "/"), img)),
            Err(e) => warn!(path = %p.display(), error = %e, "skipping unreadable image"),
        }
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(list)
}

fn decode(p: &Path) -> anyhow::Result<RgbaImage> {
    Ok(ImageReader::open(p)?.with_guessed_format()?.decode()?.to_rgba8())
}

/// `RUST_LOG` wins; otherwise -q/-v pick the level.
fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
