mod ingest;
mod process;
mod query;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tweetmood_core::AppConfig;
use tweetmood_db::{PersistenceGateway, PgRecordStore, TableNames};

#[derive(Debug, Parser)]
#[command(name = "tweetmood")]
#[command(about = "Batch sentiment processing for scraped social posts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Classify every unprocessed record and store the results
    Process {
        /// Skip records dated before January 1 of this year
        #[arg(long)]
        cutoff_year: Option<i32>,
        /// Maximum number of unprocessed records to fetch
        #[arg(long)]
        limit: Option<usize>,
        /// Fetch and filter only; report what would be classified
        #[arg(long)]
        dry_run: bool,
        /// Skip probing the classifier backends before the run
        #[arg(long)]
        skip_warm_up: bool,
    },
    /// Show total, processed and remaining record counts
    Stats,
    /// List processed records
    Records {
        /// Maximum number of records to show
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Trigger the external ingestion workflow and watch for new records
    Ingest {
        /// Run a processing pass once polling ends
        #[arg(long)]
        process: bool,
    },
    /// Classify one text and print the result without storing it
    Classify {
        /// Text to classify
        text: String,
    },
    /// Delete every processed record so the raw set is processed again
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = tweetmood_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let Some(command) = cli.command else {
        println!("no command given; run `tweetmood --help` for usage");
        return Ok(());
    };

    match command {
        Commands::Classify { text } => process::run_classify(&config, &text).await,
        Commands::Process {
            cutoff_year,
            limit,
            dry_run,
            skip_warm_up,
        } => {
            if let Some(year) = cutoff_year {
                config.cutoff_year = year;
            }
            if let Some(limit) = limit {
                config.fetch_limit = limit.max(1);
            }
            let store = connect_store(&config).await?;
            process::run_process(&config, store, dry_run, skip_warm_up).await
        }
        Commands::Stats => query::run_stats(&connect_gateway(&config).await?).await,
        Commands::Records { limit, json } => {
            query::run_records(&connect_gateway(&config).await?, limit, json).await
        }
        Commands::Ingest { process } => {
            ingest::run_ingest(&config, connect_store(&config).await?, process).await
        }
        Commands::Reset { yes } => process::run_reset(&connect_gateway(&config).await?, yes).await,
    }
}

async fn connect_store(config: &AppConfig) -> anyhow::Result<PgRecordStore> {
    let pool_config = tweetmood_db::PoolConfig::from_app_config(config);
    let pool = tweetmood_db::connect_pool(&config.database_url, pool_config).await?;
    Ok(PgRecordStore::new(pool))
}

async fn connect_gateway(config: &AppConfig) -> anyhow::Result<PersistenceGateway<PgRecordStore>> {
    let store = connect_store(config).await?;
    Ok(PersistenceGateway::new(
        store,
        TableNames::from_app_config(config),
    ))
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: tokio_util::sync::CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping at the next chunk boundary");
            token.cancel();
        }
    });
}
