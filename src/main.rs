use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use vitrine::config::{self, VitrineConfig};
use vitrine::enrich::{EnrichmentClient, HttpTransport};
use vitrine::imaging::RustBackend;
use vitrine::ingest::{self, IngestOptions, Ingestor, ProductHints};
use vitrine::normalize::FormatNormalizer;
use vitrine::output;
use vitrine::store::FsStore;
use vitrine::textual::TextualSizeValidator;
use vitrine::types::SourceAsset;

/// Flags for commands that call the generation service.
#[derive(clap::Args, Clone)]
struct EnrichArgs {
    /// Generation endpoint (overrides [enrichment] endpoint)
    #[arg(long, env = "VITRINE_ENDPOINT", global = true)]
    endpoint: Option<String>,
}

fn version_string() -> &'static str {
    let on_tag = env!("VITRINE_ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("VITRINE_GIT_HASH");
        let dirty = if env!("VITRINE_GIT_DIRTY") == "true" { "-dirty" } else { "" };
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}{dirty}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "vitrine")]
#[command(about = "Ingest product photos into a document store")]
#[command(long_about = "\
Ingest product photos into a document store

Every image is normalized (HEIC/HEIF/AVIF are converted to JPEG when
possible), re-encoded until it fits the byte budget, checked against the
store's field limit as a base64 data URL, and optionally enriched with a
suggested title and description from a text-generation service.

Pipeline:

  photo.heic → normalize → fit (≤ 780 KiB, ≤ 8 passes) → validate → enrich → store

Run 'vitrine gen-config' to generate a documented vitrine.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(flatten)]
    enrich: EnrichArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest images (files or directories) and store the results
    Ingest {
        /// Images or directories to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Store directory (overrides [storage] dir)
        #[arg(long)]
        store: Option<PathBuf>,
        /// Skip title/description generation
        #[arg(long)]
        no_enrich: bool,
        /// Title to store; generated only when absent or too short
        #[arg(long)]
        title: Option<String>,
        /// Description to store; generated only when absent or too short
        #[arg(long)]
        description: Option<String>,
        /// Give up on an asset that is still running this many seconds after
        /// its own ingestion started
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// Fit and validate images without storing or enriching them
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Suggest a title and description for one image
    Describe { file: PathBuf },
    /// Generate text for a prompt (retried with backoff)
    Generate { prompt: String },
    /// Rewrite a rough product description into marketing copy
    Rewrite { draft: String },
    /// Print a stock vitrine.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    let client = build_client(&cfg, cli.enrich.endpoint.as_deref())?;
    let backend = RustBackend::new();
    let ingestor = Ingestor::new(&backend, FormatNormalizer::default(), &client)
        .with_fit(cfg.fit.to_fit_config())
        .with_validator(TextualSizeValidator::new(cfg.storage.field_max));

    match cli.command {
        Command::Ingest {
            paths,
            store,
            no_enrich,
            title,
            description,
            deadline_secs,
        } => {
            init_thread_pool(&cfg.processing);
            let files = ingest::collect_inputs(&paths)?;
            let store_dir = store.unwrap_or_else(|| PathBuf::from(&cfg.storage.dir));
            let store = FsStore::open(&store_dir)?;
            let options = IngestOptions {
                deadline: None,
                timeout: deadline_secs.map(std::time::Duration::from_secs),
                enrich: !no_enrich,
                hints: ProductHints { title, description },
            };

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_ingest_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let summary = ingest::ingest_files(&ingestor, &files, &options, Some(&store), Some(tx));
            printer.join().ok();
            output::print_summary(&summary);
            println!("Store: {}", store.root().display());
            if summary.accepted() == 0 && !files.is_empty() {
                return Err("no asset was accepted".into());
            }
        }
        Command::Check { paths } => {
            let files = ingest::collect_inputs(&paths)?;
            let mut failed = 0;
            for (i, path) in files.iter().enumerate() {
                match check_one(&ingestor, i + 1, path) {
                    Ok(true) => {}
                    Ok(false) => failed += 1,
                    Err(e) => {
                        failed += 1;
                        println!("{:0>3} ({}) rejected", i + 1, path.display());
                        println!("    Reason: {e}");
                    }
                }
            }
            if failed > 0 {
                return Err(format!("{failed} of {} assets cannot be stored", files.len()).into());
            }
        }
        Command::Describe { file } => {
            require_endpoint(&client)?;
            let source = SourceAsset::from_path(&file)?;
            let result = ingestor.describe(source)?;
            output::print_description(result.title.as_deref(), result.description.as_deref());
        }
        Command::Generate { prompt } => {
            println!("{}", client.generate_text(&prompt)?);
        }
        Command::Rewrite { draft } => {
            println!("{}", client.rewrite_description(&draft)?);
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Fit and validate one file, printing the details. `Ok(false)` when its text
/// form is over the field limit.
fn check_one(
    ingestor: &Ingestor<'_, RustBackend>,
    index: usize,
    path: &Path,
) -> Result<bool, Box<dyn std::error::Error>> {
    let source = SourceAsset::from_path(path)?;
    let (normalized, encoded, check) = ingestor.check(source)?;
    output::print_check(index, &normalized, &encoded, &check);
    Ok(check.within_limit)
}

/// Enrichment client from config, with the CLI endpoint taking precedence.
fn build_client(
    cfg: &VitrineConfig,
    endpoint: Option<&str>,
) -> Result<EnrichmentClient, Box<dyn std::error::Error>> {
    let endpoint = endpoint
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .or_else(|| cfg.enrichment.endpoint());
    let Some(endpoint) = endpoint else {
        return Ok(EnrichmentClient::disabled().with_brand(&cfg.enrichment.brand));
    };
    let transport = HttpTransport::new(endpoint, cfg.enrichment.timeout())?;
    Ok(EnrichmentClient::new(Box::new(transport))
        .with_brand(&cfg.enrichment.brand)
        .with_retry(cfg.enrichment.retry.to_policy()))
}

fn require_endpoint(client: &EnrichmentClient) -> Result<(), Box<dyn std::error::Error>> {
    if client.is_configured() {
        Ok(())
    } else {
        Err("no enrichment endpoint configured (set --endpoint or VITRINE_ENDPOINT)".into())
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
