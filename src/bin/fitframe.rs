//! Renders a markdown note into fitted card images.

use clap::Parser;
use fitframe::{Document, ExportFormat, FitFrame, FitFrameError, Settings};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fitframe", version, about = "Fit a note onto image cards")]
struct Args {
    /// Markdown input, with optional `---` front matter.
    input: PathBuf,

    /// Directory receiving `{name}.{ext}` or `{name}_pageN.{ext}`.
    #[arg(short, long)]
    out: PathBuf,

    /// JSON settings file; flags below override it.
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// png0, png1, jpg, webp or pdf.
    #[arg(short, long)]
    format: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Cut the content into pages.
    #[arg(long)]
    split: bool,

    #[arg(long)]
    page_height: Option<f32>,

    #[arg(long)]
    overlap: Option<f32>,

    #[arg(long = "font-dir")]
    font_dirs: Vec<PathBuf>,

    /// Skip the system sans-serif/serif lookup.
    #[arg(long)]
    no_system_fonts: bool,

    /// JSONL timing log.
    #[arg(long)]
    perf_log: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "export failed");
            eprintln!("{}: {err}", err.notice());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), FitFrameError> {
    let settings = load_settings(&args)?;
    let source = std::fs::read_to_string(&args.input)?;
    let label = args
        .input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "fitframe".to_string());
    let document = Document::from_markdown(label.clone(), &source);

    let mut builder = FitFrame::builder()
        .settings(settings)
        .system_fonts(!args.no_system_fonts);
    for dir in &args.font_dirs {
        builder = builder.register_font_dir(dir);
    }
    if let Some(path) = &args.perf_log {
        builder = builder.perf_log(path);
    }
    let engine = builder.build()?;

    if engine.settings().split.enable {
        let preview = engine.preview(document.clone());
        println!("{}", preview.split_plan().summary());
    }
    for path in engine.export_to_dir(document, &label, &args.out)? {
        println!("{}", path.display());
    }
    if let Some(perf) = engine.perf() {
        perf.flush();
    }
    Ok(())
}

fn load_settings(args: &Args) -> Result<Settings, FitFrameError> {
    let mut settings = match &args.settings {
        Some(path) => Settings::from_path(path)?,
        None => Settings::default(),
    };
    if let Some(raw) = &args.format {
        settings.format = ExportFormat::parse(raw).ok_or_else(|| {
            FitFrameError::InvalidConfiguration(format!("unknown format {raw}"))
        })?;
    }
    if let Some(width) = args.width {
        settings.width = width;
    }
    if let Some(height) = args.height {
        settings.height = height;
    }
    if args.split {
        settings.split.enable = true;
    }
    if let Some(height) = args.page_height {
        settings.split.height = height;
    }
    if let Some(overlap) = args.overlap {
        settings.split.overlap = overlap;
    }
    Ok(settings)
}
