use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use globset::{Glob, GlobSetBuilder};
use indicatif::{ProgressBar, ProgressStyle};
use pixel_ingest_core::prelude::*;
use pixel_ingest_core::{grid_to_json, report_to_json};
use tracing::{error, info, warn};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    name = "pixel-ingest",
    about = "Decode image assets into RGBA pixel grids",
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
    /// Decode images into pixel grids and write them out as PNG + JSON report
    Decode(DecodeArgs),
    /// Read only image dimensions (metadata pass)
    Probe(ProbeArgs),
    /// Write the default YAML config if missing, otherwise validate the existing one
    InitConfig(InitConfigArgs),
}

#[derive(Parser, Debug, Clone)]
struct DecodeArgs {
    // Input/Output
    /// Input file or directory
    #[arg(help_heading = "Input/Output")]
    input: PathBuf,
    /// Output directory
    #[arg(short, long, default_value = "out", help_heading = "Input/Output")]
    out_dir: PathBuf,
    /// YAML config file path (flags below override its values)
    #[arg(long, help_heading = "Input/Output")]
    config: Option<PathBuf>,
    /// Include patterns (glob). If set, only files matching any pattern are considered
    #[arg(long, help_heading = "Input/Output")]
    include: Vec<String>,
    /// Exclude patterns (glob). Files matching any pattern will be ignored
    #[arg(long, help_heading = "Input/Output")]
    exclude: Vec<String>,

    // Decoding
    /// Grid shape: exact | square_by_height
    #[arg(long, help_heading = "Decoding")]
    grid_shape: Option<String>,
    /// Channel truncation: high_byte | low_byte
    #[arg(long, help_heading = "Decoding")]
    truncation: Option<String>,
    /// Failure policy: isolate | all_or_nothing
    #[arg(long, help_heading = "Decoding")]
    failure_policy: Option<String>,
    /// Largest accepted image side in pixels
    #[arg(long, help_heading = "Decoding")]
    max_side: Option<u32>,
    /// Decode on the rayon pool instead of one thread per image (requires core feature `parallel`)
    #[arg(long, default_value_t = false, help_heading = "Decoding")]
    parallel: bool,

    // Export
    /// Also write each grid as nested JSON rows
    #[arg(long, default_value_t = false, help_heading = "Export")]
    grid_json: bool,
    /// Print the merged configuration (after CLI/YAML) and exit
    #[arg(long, default_value_t = false, help_heading = "Export")]
    print_config: bool,
    /// Output format for --print-config: json|yaml
    #[arg(long, default_value = "json", value_parser = ["json", "yaml"], help_heading = "Export")]
    print_config_format: String,
    /// Dry run: decode and report but do not write files
    #[arg(long, default_value_t = false, help_heading = "Export")]
    dry_run: bool,
}

#[derive(Parser, Debug, Clone)]
struct ProbeArgs {
    /// Input file or directory
    input: PathBuf,
    /// Include patterns (glob)
    #[arg(long)]
    include: Vec<String>,
    /// Exclude patterns (glob)
    #[arg(long)]
    exclude: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
struct InitConfigArgs {
    /// Config file path
    #[arg(default_value = "pixel-ingest.yaml")]
    path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Decode(args) => run_decode(args, cli.progress && !cli.quiet),
        Commands::Probe(args) => run_probe(args),
        Commands::InitConfig(args) => run_init_config(&args.path),
    }
}

fn run_decode(cli: &DecodeArgs, show_progress: bool) -> anyhow::Result<()> {
    let cfg = build_config(cli)?;

    if cli.print_config {
        match cli.print_config_format.as_str() {
            "yaml" => println!("{}", serde_yaml::to_string(&cfg)?),
            _ => println!("{}", serde_json::to_string_pretty(&cfg)?),
        }
        return Ok(());
    }

    let registry = CodecRegistry::with_builtin();
    let paths = gather_paths(&cli.input, &cli.include, &cli.exclude, &registry)?;
    if paths.is_empty() {
        anyhow::bail!("no images found under {}", cli.input.display());
    }
    info!(count = paths.len(), "found input images");
    let stems = output_stems(&cli.input, &paths)?;

    let bar = if show_progress {
        let b = ProgressBar::new(paths.len() as u64);
        b.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} decoding {pos}/{len} [{elapsed_precise}] {wide_msg}",
            )
            .context("progress template")?,
        );
        Some(b)
    } else {
        None
    };

    // Sinks forward finished grids here; the join below is the only sync point.
    let (tx, rx) = mpsc::channel::<(String, PixelGrid)>();
    let mut tasks = Vec::with_capacity(paths.len());
    for p in &paths {
        let bytes = fs::read(p).with_context(|| format!("read {}", p.display()))?;
        let label = label_for(p);
        let codec = codec_for(&registry, p);
        let sink_tx = tx.clone();
        let sink_bar = bar.clone();
        let sink_label = label.clone();
        tasks.push(
            DecodeTask::new(label, bytes, codec).on_complete(move |grid| {
                if let Some(b) = &sink_bar {
                    b.set_message(sink_label.clone());
                    b.inc(1);
                }
                let _ = sink_tx.send((sink_label, grid));
            }),
        );
    }
    drop(tx);

    let start = Instant::now();
    let report = if cli.parallel {
        if !cfg!(feature = "parallel") {
            warn!("built without feature `parallel`; decoding sequentially");
        }
        decode_all(tasks, cfg.clone())?
    } else {
        dispatch(tasks, cfg.clone())?.join()
    };
    let elapsed = start.elapsed();
    if let Some(b) = &bar {
        b.finish_and_clear();
    }

    let grids: Vec<(String, PixelGrid)> = rx.iter().collect();
    let failed = report.failures().count();
    info!(
        decoded = grids.len(),
        failed,
        time = %fmt_dur(elapsed),
        "decode finished"
    );

    if !cli.dry_run {
        fs::create_dir_all(&cli.out_dir)
            .with_context(|| format!("create out_dir {}", cli.out_dir.display()))?;
        for (label, grid) in &grids {
            let stem = stems
                .get(label)
                .with_context(|| format!("no output name for {}", label))?;
            let png_path = cli.out_dir.join(format!("{}.png", stem));
            grid.to_rgba_image()
                .save(&png_path)
                .with_context(|| format!("write {}", png_path.display()))?;
            info!(?png_path, width = grid.width(), height = grid.height(), "wrote grid");
            if cli.grid_json {
                let json_path = cli.out_dir.join(format!("{}.json", stem));
                let json = serde_json::to_string(&grid_to_json(grid))?;
                fs::write(&json_path, json)
                    .with_context(|| format!("write {}", json_path.display()))?;
            }
        }
        let report_path = cli.out_dir.join("report.json");
        let json = serde_json::to_string_pretty(&report_to_json(&report))?;
        fs::write(&report_path, json)
            .with_context(|| format!("write {}", report_path.display()))?;
        info!(?report_path, "report written");
    }

    if failed > 0 {
        for t in report.failures() {
            if let Err(e) = &t.outcome {
                error!(image = %t.label, stage = ?e.stage(), error = %e, "decode failed");
            }
        }
        anyhow::bail!("{} of {} images failed to decode", failed, report.len());
    }
    Ok(())
}

fn run_probe(args: &ProbeArgs) -> anyhow::Result<()> {
    let registry = CodecRegistry::with_builtin();
    let paths = gather_paths(&args.input, &args.include, &args.exclude, &registry)?;
    let mut failed = 0usize;
    for p in &paths {
        let bytes = fs::read(p).with_context(|| format!("read {}", p.display()))?;
        let codec = codec_for(&registry, p);
        match codec.decode_metadata(Cursor::new(bytes.as_slice())) {
            Ok(dims) => println!(
                "{}\t{}x{}\t{}",
                p.display(),
                dims.width,
                dims.height,
                codec.name()
            ),
            Err(e) => {
                failed += 1;
                error!(?p, error = %e, "metadata decode failed");
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} images could not be probed", failed, paths.len());
    }
    Ok(())
}

fn run_init_config(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        let yaml = serde_yaml::to_string(&IngestConfig::default())
            .context("failed encoding default config")?;
        fs::write(path, yaml).with_context(|| format!("failed creating {}", path.display()))?;
        info!(?path, "default config written");
        return Ok(());
    }
    let cfg = load_config(path)?;
    cfg.validate()?;
    info!(?path, ?cfg, "config ok");
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<IngestConfig> {
    let file =
        fs::read_to_string(path).with_context(|| format!("error reading {}", path.display()))?;
    let cfg: IngestConfig = serde_yaml::from_str(&file)
        .with_context(|| format!("error decoding {}", path.display()))?;
    Ok(cfg)
}

/// YAML (if given) first, then explicit flags on top.
fn build_config(cli: &DecodeArgs) -> anyhow::Result<IngestConfig> {
    let mut cfg = match &cli.config {
        Some(path) => load_config(path)?,
        None => IngestConfig::default(),
    };
    if let Some(v) = &cli.grid_shape {
        cfg.grid_shape = v
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown grid shape: {}", v))?;
    }
    if let Some(v) = &cli.truncation {
        cfg.truncation = v
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown truncation: {}", v))?;
    }
    if let Some(v) = &cli.failure_policy {
        cfg.failure_policy = v
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown failure policy: {}", v))?;
    }
    if let Some(v) = cli.max_side {
        cfg.max_side = v;
    }
    if cli.parallel {
        cfg.parallel = true;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn codec_for(registry: &CodecRegistry, p: &Path) -> Arc<dyn Codec> {
    registry
        .for_path(p)
        .unwrap_or_else(|| Arc::new(GuessedCodec))
}

fn label_for(p: &Path) -> String {
    p.to_string_lossy().replace('\\', "/")
}

/// Output stem per input label. Two inputs mapping to the same stem
/// (`a.png` + `a.jpg`, `x/y.png` + `x_y.png`) would overwrite each other, so that is an error.
fn output_stems(root: &Path, paths: &[PathBuf]) -> anyhow::Result<HashMap<String, String>> {
    let mut owners: HashMap<String, &Path> = HashMap::with_capacity(paths.len());
    let mut stems = HashMap::with_capacity(paths.len());
    for p in paths {
        let stem = output_stem(root, p);
        if let Some(prev) = owners.insert(stem.clone(), p) {
            anyhow::bail!(
                "{} and {} would both be written as {}.png",
                prev.display(),
                p.display(),
                stem
            );
        }
        stems.insert(label_for(p), stem);
    }
    Ok(stems)
}

/// Flattened output name relative to the input root (`sub/dir/a.png` -> `sub_dir_a`).
fn output_stem(root: &Path, file: &Path) -> String {
    let rel = if root.is_dir() {
        file.strip_prefix(root).unwrap_or(file)
    } else {
        Path::new(file.file_name().unwrap_or(file.as_os_str()))
    };
    rel.with_extension("")
        .to_string_lossy()
        .replace(['\\', '/'], "_")
}

fn fmt_dur(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms < 1000.0 {
        format!("{:.2} ms", ms)
    } else {
        format!("{:.3} s", ms / 1000.0)
    }
}

fn gather_paths(
    path: &Path,
    include: &[String],
    exclude: &[String],
    registry: &CodecRegistry,
) -> anyhow::Result<Vec<PathBuf>> {
    // Build glob matchers
    let mut inc_set = None;
    if !include.is_empty() {
        let mut b = GlobSetBuilder::new();
        for pat in include {
            b.add(Glob::new(pat)?);
        }
        inc_set = Some(b.build()?);
    }
    let mut exc_set = None;
    if !exclude.is_empty() {
        let mut b = GlobSetBuilder::new();
        for pat in exclude {
            b.add(Glob::new(pat)?);
        }
        exc_set = Some(b.build()?);
    }
    let mut list: Vec<PathBuf> = Vec::new();
    if path.is_file() {
        // an explicitly named file is decoded even without a known extension
        if !should_skip(path, inc_set.as_ref(), exc_set.as_ref()) {
            list.push(path.to_path_buf());
        }
    } else {
        for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file()
                && !should_skip(p, inc_set.as_ref(), exc_set.as_ref())
                && registry.for_path(p).is_some()
            {
                list.push(p.to_path_buf());
            }
        }
    }
    list.sort();
    Ok(list)
}

fn should_skip(
    p: &Path,
    include: Option<&globset::GlobSet>,
    exclude: Option<&globset::GlobSet>,
) -> bool {
    let s = p.to_string_lossy().replace('\\', "/");
    if let Some(ex) = exclude {
        if ex.is_match(&s) {
            return true;
        }
    }
    if let Some(inc) = include {
        if !inc.is_match(&s) {
            return true;
        }
    }
    false
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}
