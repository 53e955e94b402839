use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use foodbundle::{
    config::{Config, LoadMode},
    extract, fetch, load, pipeline,
};
use reqwest::Client;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Build the offline OpenFoodFacts product bundle"
)]
struct Cli {
    /// YAML config; flags below override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download the raw dump.
    Fetch {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    /// Filter the raw dump into the intermediate CSV.
    Extract(ExtractArgs),
    /// Load the intermediate CSV into the database.
    Load(LoadArgs),
    /// Fresh extract followed by a load.
    Run {
        #[command(flatten)]
        extract: ExtractArgs,
        #[command(flatten)]
        load: LoadArgs,
    },
}

#[derive(Args)]
struct ExtractArgs {
    #[arg(long)]
    source: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Repeat for several countries.
    #[arg(long = "country")]
    countries: Vec<String>,
    /// Delete an existing output before extracting.
    #[arg(long)]
    fresh: bool,
}

#[derive(Args)]
struct LoadArgs {
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    database: Option<PathBuf>,
    #[arg(long)]
    schema: Option<PathBuf>,
    #[arg(long, value_enum)]
    mode: Option<LoadMode>,
    #[arg(long)]
    bundle_version: Option<String>,
    #[arg(long)]
    schema_version: Option<i64>,
}

impl ExtractArgs {
    fn apply(self, cfg: &mut Config) {
        let c = &mut cfg.extract;
        if let Some(v) = self.source {
            c.source = v;
        }
        if let Some(v) = self.output {
            // the load stage reads what extract writes
            cfg.load.input = v.clone();
            c.output = v;
        }
        if let Some(v) = self.chunk_size {
            c.chunk_size = v;
        }
        if !self.countries.is_empty() {
            c.countries = self.countries;
        }
        c.fresh |= self.fresh;
    }
}

impl LoadArgs {
    fn apply(self, cfg: &mut Config) {
        let c = &mut cfg.load;
        if let Some(v) = self.input {
            c.input = v;
        }
        if let Some(v) = self.database {
            c.database = v;
        }
        if self.schema.is_some() {
            c.schema = self.schema;
        }
        if let Some(v) = self.mode {
            c.mode = v;
        }
        if self.bundle_version.is_some() {
            c.bundle_version = self.bundle_version;
        }
        if let Some(v) = self.schema_version {
            c.schema_version = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) resolve config ───────────────────────────────────────────
    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(path) => Config::from_yaml_file(path)?,
        None => Config::default(),
    };

    // ─── 3) run the requested stage ──────────────────────────────────
    match cli.command {
        Command::Fetch { url, dest } => {
            if let Some(u) = url {
                cfg.fetch.url = u;
            }
            if let Some(d) = dest {
                cfg.fetch.dest = d;
            }
            let bytes = fetch::download_dataset(&Client::new(), &cfg.fetch).await?;
            info!(bytes, dest = %cfg.fetch.dest.display(), "fetch done");
        }
        Command::Extract(args) => {
            args.apply(&mut cfg);
            let extract_cfg = cfg.extract.clone();
            let stats = tokio::task::spawn_blocking(move || extract::run_extract(&extract_cfg))
                .await
                .context("extract task panicked")??;
            info!(
                kept = stats.rows_kept,
                output = %cfg.extract.output.display(),
                "products written"
            );
        }
        Command::Load(args) => {
            args.apply(&mut cfg);
            let load_cfg = cfg.load.clone();
            let stats = tokio::task::spawn_blocking(move || load::run_load(&load_cfg))
                .await
                .context("load task panicked")??;
            info!(
                inserted = stats.inserted,
                database = %cfg.load.database.display(),
                "products inserted"
            );
        }
        Command::Run { extract, load } => {
            extract.apply(&mut cfg);
            load.apply(&mut cfg);
            let run_cfg = cfg.clone();
            let (extracted, loaded) = tokio::task::spawn_blocking(move || pipeline::run(&run_cfg))
                .await
                .context("pipeline task panicked")??;
            info!(
                kept = extracted.rows_kept,
                inserted = loaded.inserted,
                database = %cfg.load.database.display(),
                "bundle rebuilt"
            );
        }
    }

    Ok(())
}
