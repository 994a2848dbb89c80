//! CLI for imageforge - serve the upload route or submit images to it.

use clap::{Args, Parser, Subcommand, ValueEnum};
use imageforge::client::DEFAULT_ENDPOINT;
use imageforge::server::ServerConfig;
use imageforge::{ImageProvider, SelectedFile, SelectionMode, UploadClient, UploadWidget};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imageforge")]
#[command(about = "Upload images with a prompt and get a generated image back")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the upload server
    Serve(ServeArgs),

    /// Submit images and a prompt to a running server
    Submit(SubmitArgs),

    /// Verify the API key and model with the generation API
    Check(CheckArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on (overrides IMAGEFORGE_ADDR)
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Directory with the page's static assets (overrides IMAGEFORGE_STATIC_DIR)
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Request body limit in bytes (overrides IMAGEFORGE_BODY_LIMIT)
    #[arg(long)]
    body_limit: Option<usize>,

    /// Gemini model to use
    #[arg(short, long, value_enum, default_value = "nano-banana")]
    model: ModelArg,

    /// Timeout for each call to the generation API, in seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

#[derive(Args)]
struct SubmitArgs {
    /// Images to upload (non-images are skipped)
    files: Vec<PathBuf>,

    /// Instructions for the model
    #[arg(short, long, default_value = "")]
    prompt: String,

    /// More images added to the selection after FILES (merged, duplicates dropped)
    #[arg(long, num_args = 1.., value_name = "FILE")]
    append: Vec<PathBuf>,

    /// Where to write the generated image
    #[arg(short, long)]
    output: PathBuf,

    /// Upload endpoint
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,
}

#[derive(Args)]
struct CheckArgs {
    /// Gemini model to check
    #[arg(short, long, value_enum, default_value = "nano-banana")]
    model: ModelArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    NanoBanana,
    NanoBananaPro,
}

#[cfg(feature = "gemini-image")]
impl From<ModelArg> for imageforge::GeminiModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::NanoBanana => imageforge::GeminiModel::NanoBanana,
            ModelArg::NanoBananaPro => imageforge::GeminiModel::NanoBananaPro,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_env("IMAGEFORGE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await?,
        Commands::Submit(args) => submit(args, cli.json).await?,
        Commands::Check(args) => check(args, cli.json).await?,
    }

    Ok(())
}

fn build_provider(model: ModelArg, timeout: Option<Duration>) -> anyhow::Result<Arc<dyn ImageProvider>> {
    #[cfg(feature = "gemini-image")]
    {
        let mut builder = imageforge::GeminiProvider::builder().model(model.into());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let provider: Arc<dyn ImageProvider> = Arc::new(builder.build()?);
        Ok(provider)
    }
    #[cfg(not(feature = "gemini-image"))]
    {
        let _ = (model, timeout);
        anyhow::bail!("Gemini provider not enabled");
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = ServerConfig::from_env()?;
    if let Some(addr) = args.addr {
        config = config.with_addr(addr);
    }
    if let Some(dir) = args.static_dir {
        config = config.with_static_dir(dir);
    }
    if let Some(limit) = args.body_limit {
        config = config.with_body_limit(limit);
    }

    let provider = build_provider(args.model, Some(Duration::from_secs(args.timeout_secs)))?;
    imageforge::server::serve(config, provider).await?;
    Ok(())
}

/// Builds the selection in two picks: FILES replace, `--append` files are merged in.
fn select_files(
    widget: &mut UploadWidget,
    files: &[PathBuf],
    append: &[PathBuf],
) -> imageforge::Result<usize> {
    let mut skipped = 0;
    for (paths, mode) in [(files, SelectionMode::Replace), (append, SelectionMode::Append)] {
        if mode == SelectionMode::Append && paths.is_empty() {
            continue;
        }
        let picked = paths
            .iter()
            .map(SelectedFile::from_path)
            .collect::<imageforge::Result<Vec<_>>>()?;
        skipped += widget.select(picked, mode)?.skipped_non_images;
    }
    Ok(skipped)
}

async fn submit(args: SubmitArgs, json_output: bool) -> anyhow::Result<()> {
    let mut widget = UploadWidget::new();
    let skipped = select_files(&mut widget, &args.files, &args.append)?;
    if skipped > 0 {
        eprintln!("Skipped {skipped} non-image file(s)");
    }
    if let Some(warning) = widget.warning() {
        eprintln!("{warning}");
    }
    widget.prompt = args.prompt;

    let client = UploadClient::builder().endpoint(args.endpoint).build()?;
    let image = widget.submit(&client).await?;
    image.save(&args.output)?;

    if json_output {
        let result = serde_json::json!({
            "type": "image",
            "success": true,
            "output": args.output.display().to_string(),
            "size_bytes": image.size(),
            "mime_type": image.mime_type,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Generated image: {} ({} bytes, {})",
            args.output.display(),
            image.size(),
            image.mime_type
        );
    }

    Ok(())
}

async fn check(args: CheckArgs, json_output: bool) -> anyhow::Result<()> {
    let provider = build_provider(args.model, Some(Duration::from_secs(30)))?;
    provider.health_check().await?;

    if json_output {
        let result = serde_json::json!({
            "ok": true,
            "provider": provider.kind().to_string(),
            "model": provider.model(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{} is reachable with model {}", provider.name(), provider.model());
    }

    Ok(())
}
