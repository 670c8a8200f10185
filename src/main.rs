use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

mod config;
mod documents;
mod error;
mod formfill;
mod ingest;
mod llm;
mod ops;
mod schema;
mod store;
mod template;
#[cfg(test)]
mod testutil;

#[derive(Parser)]
#[command(name = "formpilot")]
#[command(version)]
#[command(about = "Client intake and PDF form filling assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Import clients from a JSON, CSV or Excel file
    ImportClients {
        file: PathBuf,
    },
    /// Inspect a PDF form template and its detected fields
    LoadTemplate {
        file: PathBuf,
    },
    /// Fill a PDF template with a client's data and export it
    Fill {
        /// PDF form template
        template: PathBuf,
        /// Client data file (JSON, CSV or Excel)
        clients: PathBuf,
        /// Client id to use; defaults to the first imported client
        #[arg(long)]
        client_id: Option<String>,
        /// Output directory; prompts when omitted
        #[arg(long)]
        out: Option<PathBuf>,
        /// Skip AI mapping suggestions for unrecognized fields
        #[arg(long)]
        no_ai: bool,
    },
    /// Extract a client profile from documents using AI
    Extract {
        files: Vec<PathBuf>,
    },
    /// Store the AI API key (prompts when not given)
    SetApiKey {
        key: Option<String>,
    },
    /// Show or persist the LLM endpoint settings
    ConfigureLlm {
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let app_dir = config::Config::get_app_data_dir();
    let file_appender = tracing_appender::rolling::never(app_dir, "debug.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(tracing_subscriber::EnvFilter::new("debug")),
        )
        // Errors only on stderr; detailed logs stay in debug.log
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new("error")),
        )
        .init();

    match cli.command {
        Commands::ImportClients { file } => {
            ops::run_import_clients(&file).await?;
        }
        Commands::LoadTemplate { file } => {
            ops::run_load_template(&file).await?;
        }
        Commands::Fill {
            template,
            clients,
            client_id,
            out,
            no_ai,
        } => {
            ops::run_fill(&template, &clients, client_id, out, no_ai).await?;
        }
        Commands::Extract { files } => {
            if files.is_empty() {
                anyhow::bail!("Provide at least one document to extract from");
            }
            ops::run_extract(&files).await?;
        }
        Commands::SetApiKey { key } => {
            ops::run_set_api_key(key)?;
        }
        Commands::ConfigureLlm { base_url, model } => {
            ops::run_configure_llm(base_url, model)?;
        }
    }

    drop(_guard);
    Ok(())
}
