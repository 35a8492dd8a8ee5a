use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mdrip::bundle::ClassId;
use mdrip::{Bundle, Catalog, ExportEvent, ExportOptions, GameLayout, Language, RipConfig, SampleBank};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "mdrip", version, about = "Muse Dash soundtrack ripper")]
struct Cli {
    /// Log per-object detail
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export every song as a tagged audio file
    Rip {
        /// Game install folder
        #[arg(short, long, value_name = "PATH")]
        game_dir: Option<PathBuf>,
        /// Output folder
        #[arg(short, long, value_name = "PATH", default_value = "output")]
        out_dir: PathBuf,
        /// Language of titles, artists and albums
        #[arg(short, long, default_value = "English")]
        language: Language,
        /// Put all files in the output folder instead of one folder per album
        #[arg(long)]
        no_album_dirs: bool,
        /// Also save covers as PNG
        #[arg(long)]
        save_covers: bool,
        /// Also write songs.csv
        #[arg(long)]
        save_csv: bool,
        /// Folder of Vorbis setup headers, used before the built-in ones
        #[arg(long, value_name = "DIR")]
        vorbis_headers: Option<PathBuf>,
    },
    /// Print the song catalog
    List {
        #[arg(short, long, value_name = "PATH")]
        game_dir: Option<PathBuf>,
        #[arg(short, long, default_value = "English")]
        language: Language,
    },
    /// List the objects inside bundles
    Inspect {
        /// Bundle files or folders
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Descend into folders recursively
        #[arg(short, long)]
        recursive: bool,
    },
    /// List the streams of an FSB5 file or of a bundle's audio clips
    Bank {
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Command::Rip {
            game_dir,
            out_dir,
            language,
            no_album_dirs,
            save_covers,
            save_csv,
            vorbis_headers,
        } => {
            let config = RipConfig {
                game_dir: game_dir.unwrap_or_else(mdrip::default_game_dir),
                output_dir: out_dir,
                options: ExportOptions {
                    language,
                    group_by_album: !no_album_dirs,
                    export_covers: save_covers,
                    export_table: save_csv,
                    ..ExportOptions::default()
                },
                vorbis_headers,
            };
            cmd_rip(&config)
        }
        Command::List { game_dir, language } => {
            cmd_list(&game_dir.unwrap_or_else(mdrip::default_game_dir), language)
        }
        Command::Inspect { paths, recursive } => cmd_inspect(&paths, recursive),
        Command::Bank { path } => cmd_bank(&path),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ── rip ──

fn cmd_rip(config: &RipConfig) -> Result<()> {
    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })
    .context("failed to install the Ctrl-C handler")?;

    let progress = |event: &ExportEvent<'_>| match event {
        ExportEvent::TrackWritten { position, total, path } => {
            println!("[{position}/{total}] {}", path.display());
        }
        ExportEvent::Warning(warning) => eprintln!("warning: {warning}"),
        _ => {}
    };
    let summary = mdrip::rip(config, Some(&progress), Some(&*cancel))
        .with_context(|| format!("failed to rip {}", config.game_dir.display()))?;

    if summary.cancelled {
        println!("Cancelled; the remaining tracks were not written");
    }
    println!(
        "Exported {}, skipped {}, failed {}",
        summary.exported,
        summary.skipped,
        summary.failures.len()
    );
    for (index, error) in &summary.failures {
        eprintln!("error: {index}: {error}");
    }
    if let Some(error) = &summary.table_error {
        eprintln!("error: songs.csv: {error}");
    }
    if !summary.failures.is_empty() || summary.table_error.is_some() {
        std::process::exit(1);
    }
    if summary.cancelled {
        std::process::exit(130);
    }
    Ok(())
}

// ── list ──

fn cmd_list(game_dir: &Path, language: Language) -> Result<()> {
    let layout = GameLayout::open(game_dir)?;
    let catalog = Catalog::load(&layout, &[language]).context("failed to read the song tables")?;
    for row in catalog.rows() {
        println!(
            "{:>3}.{:<3} {} - {} [{}] ({})",
            row.album_number,
            row.track_number.map(|n| n.to_string()).unwrap_or_default(),
            row.artist.resolve(language),
            row.song.resolve(language),
            row.album.resolve(language),
            row.index,
        );
    }
    println!("{} songs", catalog.len());
    Ok(())
}

// ── inspect ──

fn cmd_inspect(paths: &[PathBuf], recursive: bool) -> Result<()> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
        } else if recursive {
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(std::result::Result::ok)
            {
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                .context("failed to read directory")?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect();
            entries.sort();
            files.extend(entries);
        }
    }

    for file in &files {
        let bundle = match Bundle::open(file) {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::warn!("Skipping {}: {e}", file.display());
                continue;
            }
        };
        println!("{} (UnityFS {}, {})", file.display(), bundle.format_version, bundle.engine_version);
        for object in bundle.objects() {
            println!(
                "  {:>20} {:<12} {:>10} {}",
                object.path_id,
                format!("{:?}", object.class),
                object.size,
                object.name.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}

// ── bank ──

fn cmd_bank(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.starts_with(b"FSB5") {
        print_bank(&path.display().to_string(), &SampleBank::parse(bytes)?);
        return Ok(());
    }

    let bundle = Bundle::parse(&bytes)?;
    let clips: Vec<String> = bundle
        .objects()
        .filter(|o| o.class == ClassId::AudioClip)
        .filter_map(|o| o.name)
        .collect();
    if clips.is_empty() {
        bail!("{} is neither an FSB5 bank nor a bundle with audio clips", path.display());
    }
    for name in clips {
        let clip = bundle.audio_clip(&name)?;
        print_bank(&name, &SampleBank::parse(clip.data)?);
    }
    Ok(())
}

fn print_bank(label: &str, bank: &SampleBank) {
    println!(
        "{label}: FSB5 v{}, {}, {} streams, keyed by {:?}",
        bank.version,
        bank.codec,
        bank.streams().len(),
        bank.join_key()
    );
    for (i, stream) in bank.streams().iter().enumerate() {
        let format = &stream.format;
        println!(
            "  {:>3} {:<24} {} ch {:>6} Hz {:>9} samples {:>9} bytes",
            i + 1,
            stream.name.as_deref().unwrap_or("-"),
            format.channels,
            format.frequency,
            format.samples,
            stream.len()
        );
    }
}
