use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facegate", about = "facegate face registration and recognition CLI")]
struct Cli {
    /// Base URL of the facegated server
    #[arg(long, env = "FACEGATE_SERVER", default_value = "http://localhost:5000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a face image under an email
    Register {
        #[arg(short, long)]
        email: String,
        /// Image file containing one face
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Check a face image against the faces registered for an email
    Recognize {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Show server status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.server.trim_end_matches('/');

    let body = match cli.command {
        Commands::Register { email, image } => {
            upload(&client, &format!("{base}/register"), &email, &image).await?
        }
        Commands::Recognize { email, image } => {
            upload(&client, &format!("{base}/recognize"), &email, &image).await?
        }
        Commands::Status => {
            let response = client
                .get(format!("{base}/status"))
                .send()
                .await
                .with_context(|| format!("cannot reach {base}"))?;
            into_json(response).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// Post `email` and the image file as a multipart form.
async fn upload(client: &reqwest::Client, url: &str, email: &str, image: &Path) -> Result<serde_json::Value> {
    let form = build_form(email, image).await?;
    tracing::debug!(url, email, image = %image.display(), "uploading");

    let response = client
        .post(url)
        .multipart(form)
        .send()
        .await
        .with_context(|| format!("cannot reach {url}"))?;
    into_json(response).await
}

async fn build_form(email: &str, image: &Path) -> Result<Form> {
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("cannot read {}", image.display()))?;
    let file_name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "face.jpg".to_string());

    Ok(Form::new()
        .text("email", email.to_string())
        .part("image", Part::bytes(bytes).file_name(file_name)))
}

/// Parse the JSON body; a non-2xx status becomes an error carrying the
/// server's `error` message, or the raw body when it is not JSON.
async fn into_json(response: reqwest::Response) -> Result<serde_json::Value> {
    let status = response.status();
    let text = response.text().await.context("failed to read server response")?;
    if !status.is_success() {
        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|body| body.get("error").and_then(|e| e.as_str()).map(str::to_owned))
            .unwrap_or_else(|| match text.trim() {
                "" => status.canonical_reason().unwrap_or("request failed").to_string(),
                raw => raw.chars().take(200).collect(),
            });
        bail!("{message} (HTTP {})", status.as_u16());
    }
    serde_json::from_str(&text).context("server returned invalid JSON")
}
