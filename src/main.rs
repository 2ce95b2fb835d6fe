use clap::Parser;
use tracing::{error, info};
use wechat_robot::config::Config;
use wechat_robot::{logging, runtime};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(
    name = "wechat-robot",
    version = VERSION,
    about = "WeChat public account auto-reply robot"
)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging targets come from the config, so a load failure is reported on stderr.
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config missing/invalid: {e}");
            std::process::exit(1);
        }
    };
    let level = config.app.mode.default_log_level();
    match config.app.log_dir {
        Some(ref dir) => logging::init_logging(dir, level)?,
        None => logging::init_console_logging(level),
    }
    info!("Starting wechat-robot v{VERSION}...");

    if let Err(e) = runtime::run(config).await {
        error!("wechat-robot stopped: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
