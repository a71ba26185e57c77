// ============================================================================
// StickerPaint CLI: headless session bootstrap, export and recovery
// ============================================================================
//
// Usage examples:
//   stickerpaint -i scenes/*.png --output-dir out/ --touch
//   stickerpaint -i a.png b.png --save-recovery
//   stickerpaint -i a.png b.png --recovery-dir saved/
//   stickerpaint --resume saved/editor_1234.spr --output-dir out/
//   stickerpaint -i "shots/*.jpg" --session-size 8 --output-dir out/ --touch
//
// Every session (a batch of inputs or one recovery file) owns its own
// EditorSession; independent sessions run in parallel on rayon.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use rayon::prelude::*;

use crate::io::{self, SceneRecord};
use crate::project::EditorSession;
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// StickerPaint headless session tool.
#[derive(Parser, Debug)]
#[command(
    name = "stickerpaint",
    about = "StickerPaint headless layer-session tool",
    long_about = "Bootstrap editing sessions from image files, export the scenes that\n\
                  changed, and write or resume crash-recovery files without a GUI.\n\n\
                  Example:\n  \
                  stickerpaint -i scenes/*.png --output-dir out/ --touch\n  \
                  stickerpaint --resume saved/editor_1234.spr --output-dir out/"
)]
pub struct CliArgs {
    /// Input image(s), one scene each. Glob patterns accepted (e.g. "scenes/*.png").
    #[arg(short, long, num_args = 1.., required_unless_present = "resume")]
    pub input: Vec<String>,

    /// Resume from a recovery file instead of bootstrapping from images.
    #[arg(long, value_name = "FILE.spr", conflicts_with = "input")]
    pub resume: Option<PathBuf>,

    /// Canvas width for bootstrapped sessions.
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Canvas height for bootstrapped sessions.
    #[arg(long, default_value_t = 800)]
    pub height: u32,

    /// Scenes per session. Sessions are processed in parallel.
    /// When omitted, all inputs share one session.
    #[arg(long, value_name = "N")]
    pub session_size: Option<usize>,

    /// Mark every layer as edited so all scenes are exported.
    #[arg(long)]
    pub touch: bool,

    /// Export changed scenes as PNG files into this directory.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Write one recovery file per session into the platform recovery directory.
    #[arg(long)]
    pub save_recovery: bool,

    /// Write recovery files into this directory instead (implies --save-recovery).
    #[arg(long, value_name = "DIR")]
    pub recovery_dir: Option<PathBuf>,

    /// Settings file to use instead of the per-user one.
    #[arg(long, value_name = "FILE.cfg")]
    pub config: Option<PathBuf>,

    /// Print per-session progress and mirror the log to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Where a session's layers come from.
enum SessionSource {
    Scenes(Vec<PathBuf>),
    Recovery(PathBuf),
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the CLI and return an OS exit code.
/// `0` = every session succeeded, `1` = one or more failed.
pub fn run(args: CliArgs) -> ExitCode {
    let settings = match &args.config {
        Some(path) => EditorSettings::load_from(path),
        None => EditorSettings::load(),
    };

    if args.width == 0 || args.height == 0 {
        eprintln!("error: canvas dimensions must be non-zero.");
        return ExitCode::FAILURE;
    }

    let sources = match &args.resume {
        Some(path) => vec![SessionSource::Recovery(path.clone())],
        None => {
            let inputs = resolve_inputs(&args.input);
            if inputs.is_empty() {
                eprintln!("error: no input files matched the given pattern(s).");
                return ExitCode::FAILURE;
            }
            let size = args.session_size.unwrap_or(inputs.len()).max(1);
            inputs.chunks(size).map(|c| SessionSource::Scenes(c.to_vec())).collect()
        }
    };

    let total = sources.len();
    let failures: usize = sources
        .par_iter()
        .enumerate()
        .map(|(idx, source)| {
            let start = Instant::now();
            match run_one(source, &args, settings.clone()) {
                Ok(summary) => {
                    if args.verbose || total > 1 {
                        println!(
                            "[{}/{}] {} ({:.0}ms)",
                            idx + 1,
                            total,
                            summary,
                            start.elapsed().as_secs_f64() * 1000.0
                        );
                    }
                    0
                }
                Err(e) => {
                    eprintln!("[{}/{}] error: {}", idx + 1, total, e);
                    log_err!("Session {} failed: {}", idx + 1, e);
                    1
                }
            }
        })
        .sum();

    if failures > 0 { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-session pipeline
// ============================================================================

fn run_one(source: &SessionSource, args: &CliArgs, settings: EditorSettings) -> Result<String, String> {
    // -- Step 1: Open ----------------------------------------------------
    let mut session = match source {
        SessionSource::Scenes(paths) => {
            let records = load_records(paths)?;
            io::bootstrap_session(args.width, args.height, &records, settings)
        }
        SessionSource::Recovery(path) => io::load_recovery(path, settings)
            .map_err(|e| format!("recovery load failed for '{}': {}", path.display(), e))?,
    };

    if args.touch {
        for layer in &mut session.canvas.layers {
            layer.dirty = true;
        }
    }

    // -- Step 2: Recovery file -------------------------------------------
    let mut summary = format!("{} layers", session.canvas.layers.len());
    let recovery_target = match (&args.recovery_dir, args.save_recovery) {
        (Some(dir), _) => Some(dir.join(format!("editor_{}.spr", session.id))),
        (None, true) => Some(io::recovery_path(&session.id.to_string())),
        (None, false) => None,
    };
    if let Some(path) = recovery_target {
        io::save_recovery(&session, &path)
            .map_err(|e| format!("recovery save failed for '{}': {}", path.display(), e))?;
        summary.push_str(&format!(", recovery → {}", path.display()));
    }

    // -- Step 3: Export --------------------------------------------------
    if let Some(dir) = &args.output_dir {
        let written = export_session(&mut session, dir)?;
        summary.push_str(&format!(", {} scenes exported", written));
    }

    Ok(summary)
}

fn export_session(session: &mut EditorSession, dir: &Path) -> Result<usize, String> {
    io::write_exports(session, dir)
        .map(|paths| paths.len())
        .map_err(|e| format!("export to '{}' failed: {}", dir.display(), e))
}

/// Decode every input into a scene record keyed by its file stem.
fn load_records(paths: &[PathBuf]) -> Result<Vec<SceneRecord>, String> {
    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        let image = image::open(path)
            .map_err(|e| format!("load failed for '{}': {}", path.display(), e))?
            .to_rgba8();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("scene")
            .to_string();
        records.push(SceneRecord {
            external_id: stem.clone(),
            display_title: stem,
            source_image: image,
        });
    }
    Ok(records)
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}
