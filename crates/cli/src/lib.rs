use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc_model::PlacementDraft;
use pdf_signer_core::{SignerConfig, SigningSession};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "pdf-signer-cli")]
#[command(about = "Place signatures and annotations onto PDF pages")]
pub struct Cli {
    /// Settings file; defaults to the per-user config location.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render one page to a PNG at the display scale.
    RenderPage {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        scale: Option<f32>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Burn placements from a JSON file into a copy of the PDF.
    Sign {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "JSON")]
        placements: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => {
            let config = load_config(cli.config.as_deref())?;
            run_info(config, &file)
        }
        Commands::RenderPage { file, page, scale, output } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(scale) = scale {
                config = config.with_display_scale(scale);
            }
            run_render_page(config, &file, page, output.as_deref())
        }
        Commands::Sign { file, placements, output } => {
            let config = load_config(cli.config.as_deref())?;
            run_sign(config, &file, &placements, output.as_deref())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<SignerConfig> {
    let config = match path {
        Some(path) => SignerConfig::load(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => match SignerConfig::default_path() {
            Ok(path) => SignerConfig::load(&path)
                .with_context(|| format!("failed to read config {}", path.display()))?,
            Err(err) => {
                tracing::debug!(error = %err, "no config directory, using defaults");
                SignerConfig::default()
            }
        },
    };

    Ok(config.merge_env()?)
}

fn open_session(config: SignerConfig, file: &Path) -> Result<SigningSession> {
    ensure_pdf_exists(file)?;

    let mut session = SigningSession::new(config)?;
    session.open(file).context("failed to open PDF")?;
    Ok(session)
}

fn run_info(config: SignerConfig, file: &Path) -> Result<()> {
    let session = open_session(config, file)?;
    let document = session.document().context("document missing after open")?;

    let pages = document
        .page_sizes()
        .iter()
        .map(|size| PageSizeOutput { width: size.width_pt, height: size.height_pt })
        .collect();
    let payload =
        InfoOutput { path: file.display().to_string(), page_count: document.page_count(), pages };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_render_page(
    config: SignerConfig,
    file: &Path,
    page: u32,
    output: Option<&Path>,
) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let mut session = open_session(config, file)?;
    session.navigate(page).context("failed to render page")?;
    let rendered = session.rendered_page_image().context("render was superseded")?;

    let output = output
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| sibling_output(file, &format!("page-{page}.png")));
    write_output(&output, &rendered.png)?;

    println!("{}", output.display());
    Ok(())
}

fn run_sign(
    config: SignerConfig,
    file: &Path,
    placements: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let raw = fs::read(placements)
        .with_context(|| format!("failed to read placements {}", placements.display()))?;
    let drafts: Vec<PlacementDraft> =
        serde_json::from_slice(&raw).context("placements file is not a valid placement list")?;

    let display_scale = config.display_scale;
    let mut session = open_session(config, file)?;
    for (index, draft) in drafts.into_iter().enumerate() {
        session
            .add_placement(draft.into_record(display_scale))
            .with_context(|| format!("placement #{} is invalid", index + 1))?;
    }

    let signed = session.export().context("failed to export signed PDF")?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| sibling_output(file, "signed.pdf"));
    write_output(&output, &signed)?;

    tracing::info!(placements = session.placements().len(), output = %output.display(), "signed PDF written");
    println!("{}", output.display());
    Ok(())
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn sibling_output(file: &Path, suffix: &str) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("document");

    file.with_file_name(format!("{stem}-{suffix}"))
}
