//! Command-line front end for the meme API: pick an image, set captions, save the result.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use meme_generator::client::{ApiClient, MemeForm, SelectedImage, View, DEFAULT_API_URL};

#[derive(Parser, Debug)]
#[command(name = "meme-client", about = "Caption an image with the meme generator API")]
struct Args {
    /// Image to caption (JPEG, PNG or WebP)
    image: PathBuf,

    /// Caption drawn at the top
    #[arg(short, long, default_value = "")]
    top: String,

    /// Caption drawn at the bottom
    #[arg(short, long, default_value = "")]
    bottom: String,

    /// Base URL of the API
    #[arg(long, env = "MEME_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Directory the generated meme is saved into
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let api = ApiClient::new(args.api_url);

    let image = SelectedImage::load(&args.image)
        .await
        .with_context(|| format!("read image {}", args.image.display()))?;

    let mut form = MemeForm::new();
    form.select_image(image);
    form.set_top_text(&args.top);
    form.set_bottom_text(&args.bottom);

    if let View::Preview { source, .. } = form.view() {
        tracing::info!(source = %source.display(), "submitting");
    }

    if let Err(e) = form.submit(&api).await {
        anyhow::bail!("{}", e.user_message());
    }

    let saved = form
        .download(&args.out_dir)
        .await
        .context("save generated meme")?
        .context("server returned no image")?;
    println!("{}", saved.display());

    Ok(())
}
