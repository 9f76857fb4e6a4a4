use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;
use wordbattle::config::GameSettings;
use wordbattle::db::WordBattleDb;
use wordbattle::game::{GameContext, Oracles, Stores};
use wordbattle::llm::{LlmConfig, OpenAiClient};
use wordbattle::manager::{self, SystemProfile};
use wordbattle::server::WordBattleServer;

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = "Word battle matchmaking server", long_about = None)]
struct Args {
    #[clap(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Segment file holding users, embeddings and battles.
    #[clap(long, default_value = "wordbattle.dat")]
    data: PathBuf,

    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    #[clap(long, env = "OPENAI_API_BASE", default_value = "https://api.openai.com/v1")]
    api_base: String,

    #[clap(long, default_value = "gpt-4o-mini")]
    chat_model: String,

    #[clap(long, default_value = "text-embedding-3-large")]
    embedding_model: String,

    /// Redundant injection checks per registration.
    #[clap(long, default_value = "2")]
    injection_votes: usize,

    /// Per-call timeout for the oracle HTTP client.
    #[clap(long, default_value = "30")]
    timeout_secs: u64,

    /// Seconds between background compactions; 0 disables them.
    #[clap(long, default_value = "600")]
    compact_interval_secs: u64,
}

fn main() -> ExitCode {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,wordbattle=info");
    }
    tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_target(false)
    .with_level(true)
    .init();

    let args = Args::parse();
    let profile = SystemProfile::detect();

    println!("--- [Word Battle] ---");
    println!("Detected Cores: {}", profile.logical_cores);
    println!("Worker Threads: {}", profile.worker_threads);
    println!("Durability Mode: {}", if profile.strict_durability { "Strict (Fsync)" } else { "High Throughput (Async)" });
    println!("---------------------");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
    .worker_threads(profile.worker_threads)
    .enable_all()
    .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(args, profile)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn async_main(args: Args, profile: SystemProfile) -> wordbattle::Result<()> {
    let db = Arc::new(WordBattleDb::open(&args.data, profile.strict_durability)?);
    if args.compact_interval_secs > 0 {
        manager::start_compaction_thread(db.clone(), Duration::from_secs(args.compact_interval_secs));
    }

    let client = Arc::new(OpenAiClient::new(LlmConfig {
        api_base: args.api_base,
        api_key: args.api_key,
        chat_model: args.chat_model,
        embedding_model: args.embedding_model,
        timeout_secs: args.timeout_secs,
    })?);

    let settings = GameSettings { injection_votes: args.injection_votes, ..GameSettings::default() };
    let ctx = Arc::new(GameContext::new(Stores::from_db(db), Oracles::shared(client), settings)?);

    let server = WordBattleServer::new(ctx);
    let addr = args.addr;
    tokio::spawn(async move {
        server.run(addr).await;
    });
    println!("Word Battle API listening on {}", addr);

    tokio::signal::ctrl_c().await?;
    println!("Shutting down.");
    Ok(())
}
