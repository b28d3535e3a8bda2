//! Operator CLI for the document store

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use docstore::{
    AssemblyId, BackendKind, Docstore, Document, DocumentId, DocumentRepository, StoreConfig,
    ValidationId,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "docstore")]
#[command(about = "Inspect and load a content-addressed document store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a file as a new document
    Put {
        file: PathBuf,

        /// MIME type; guessed from the extension when omitted
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Print document metadata as JSON
    Show { document_id: String },

    /// Write document content to stdout
    Cat { document_id: String },

    /// Print a policy validation record as JSON
    Validation { validation_id: String },

    /// Print an assembly record as JSON
    Assembly { assembly_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "docstore=info,docstore_cli=info".to_string()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = StoreConfig::from_env().context("Failed to load store configuration")?;
    if config.backend == BackendKind::Memory {
        warn!("Memory backend selected; nothing will outlive this process");
    }
    let store = Docstore::open(&config)
        .await
        .context("Failed to open document store")?;

    match cli.command {
        Commands::Put { file, content_type } => put(&store, &file, content_type).await,
        Commands::Show { document_id } => {
            let id = DocumentId::from(document_id);
            let document = store
                .documents()
                .get(&id)
                .await?
                .with_context(|| format!("Document {} not found", id))?;
            print_json(&document)
        }
        Commands::Cat { document_id } => {
            let document = store.documents().require(&document_id.into()).await?;
            let mut stdout = tokio::io::stdout();
            if let Some(content) = document.content() {
                stdout.write_all(content).await?;
            }
            stdout.flush().await?;
            Ok(())
        }
        Commands::Validation { validation_id } => {
            let id = ValidationId::from(validation_id);
            let validation = store
                .validations()
                .get(&id)
                .await?
                .with_context(|| format!("Validation {} not found", id))?;
            print_json(&validation)
        }
        Commands::Assembly { assembly_id } => {
            let id = AssemblyId::from(assembly_id);
            let assembly = store
                .assemblies()
                .get(&id)
                .await?
                .with_context(|| format!("Assembly {} not found", id))?;
            print_json(&assembly)
        }
    }
}

async fn put(store: &Docstore, file: &Path, content_type: Option<String>) -> anyhow::Result<()> {
    let Some(filename) = file.file_name().and_then(|name| name.to_str()) else {
        bail!("Not a file path: {}", file.display());
    };
    let content = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let content_type = content_type.unwrap_or_else(|| guess_content_type(file).to_string());

    let documents = store.documents();
    let document = Document::new(documents.generate_id(), filename, content_type).with_content(content);
    let document = documents.save(document).await?;

    info!(
        "Stored {} as {} ({} bytes)",
        file.display(),
        document.document_id,
        document.size_bytes
    );
    print_json(&document)
}

fn guess_content_type(file: &Path) -> &'static str {
    let extension = file
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("html" | "htm") => "text/html",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("tif" | "tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
