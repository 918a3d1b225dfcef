use std::{env, path::PathBuf, process, str::FromStr};

use chrono::Local;
use clap::{ArgAction, Parser, Subcommand};
use fern::colors::{Color, ColoredLevelConfig};
use log::error;
use solana_native_token::LAMPORTS_PER_SOL;
use solforge_types::{
    DEFAULT_FAUCET_KEYPAIR_PATH, DEFAULT_FAUCET_TARGET_LAMPORTS, DEFAULT_MAINNET_RPC_URL,
    DEFAULT_MAX_AIRDROP_LAMPORTS, DEFAULT_NETWORK_HOST, DEFAULT_RPC_PORT, DEFAULT_SLOT_TIME_MS,
    DEFAULT_WS_PORT, FaucetConfig, NodeConfig, RpcConfig, StoreConfig,
};

mod node;

pub const DEFAULT_LOG_DIR: &str = ".solforge/logs";
const DEFAULT_FAUCET_TARGET_SOL: u64 = DEFAULT_FAUCET_TARGET_LAMPORTS / LAMPORTS_PER_SOL;
const DEFAULT_AIRDROP_CAP_SOL: u64 = DEFAULT_MAX_AIRDROP_LAMPORTS / LAMPORTS_PER_SOL;

/// Gets the user's home directory, accounting for the Snap confinement environment.
pub fn get_home_dir() -> String {
    if let Ok(real_home) = env::var("SNAP_REAL_HOME") {
        return real_home;
    }
    dirs::home_dir()
        .map(|home| home.display().to_string())
        .unwrap_or_else(|| ".".to_string())
}

/// Resolves a path, expanding the `~` to the user's home directory if present.
pub fn resolve_path(path: &str) -> PathBuf {
    match path.strip_prefix("~") {
        Some(stripped) => PathBuf::from(format!("{}{}", get_home_dir(), stripped)),
        None => PathBuf::from(path),
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None, name = "solforge", bin_name = "solforge")]
struct Opts {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Start a local node
    #[clap(name = "start", bin_name = "start", aliases = &["localnet"])]
    Start(StartNode),
}

#[derive(Parser, PartialEq, Clone, Debug)]
pub struct StartNode {
    /// Set the RPC port
    #[arg(long = "port", short = 'p', default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,
    /// Set the WebSocket port
    #[arg(long = "ws-port", short = 'w', default_value_t = DEFAULT_WS_PORT)]
    pub ws_port: u16,
    /// Set the host to bind both servers to
    #[arg(long = "host", short = 'o', default_value = DEFAULT_NETWORK_HOST)]
    pub network_host: String,
    /// Set the slot time, in milliseconds
    #[arg(long = "slot-time", short = 't', default_value_t = DEFAULT_SLOT_TIME_MS)]
    pub slot_time: u64,
    /// Path of the SQLite index. The index stays in memory when omitted
    #[arg(long = "db")]
    pub db: Option<String>,
    /// Path of the faucet keypair, created when missing
    #[arg(long = "faucet-keypair", short = 'k', default_value = DEFAULT_FAUCET_KEYPAIR_PATH)]
    pub faucet_keypair_path: String,
    /// Balance the faucet is topped up to at startup, in SOL
    #[arg(long = "faucet-target-sol", default_value_t = DEFAULT_FAUCET_TARGET_SOL)]
    pub faucet_target_sol: u64,
    /// Largest amount the engine credits in a single funding call, in SOL
    #[arg(long = "airdrop-cap-sol", default_value_t = DEFAULT_AIRDROP_CAP_SOL)]
    pub airdrop_cap_sol: u64,
    /// Remote endpoint used by the clone methods
    #[arg(
        long = "rpc-url",
        short = 'u',
        env = "SOLFORGE_RPC_URL",
        default_value = DEFAULT_MAINNET_RPC_URL
    )]
    pub rpc_url: String,
    /// Set the log level (none, error, warn, info, debug, trace)
    #[arg(long = "log-level", short = 'l', default_value = "info")]
    pub log_level: String,
    /// Directory the log files are written to
    #[arg(long = "log-dir", default_value = DEFAULT_LOG_DIR)]
    pub log_dir: String,
    /// Only write logs to the log file
    #[clap(long = "no-stdout", action = ArgAction::SetTrue, default_value = "false")]
    pub no_stdout: bool,
}

impl StartNode {
    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            rpc: RpcConfig {
                bind_host: self.network_host.clone(),
                bind_port: self.rpc_port,
                ws_port: self.ws_port,
            },
            faucet: FaucetConfig {
                keypair_path: resolve_path(&self.faucet_keypair_path),
                target_lamports: self.faucet_target_sol.saturating_mul(LAMPORTS_PER_SOL),
                max_airdrop_lamports: self.airdrop_cap_sol.saturating_mul(LAMPORTS_PER_SOL),
                ..FaucetConfig::default()
            },
            store: StoreConfig {
                db_path: self.db.clone(),
            },
            slot_time_ms: self.slot_time,
            remote_rpc_url: self.rpc_url.clone(),
        }
    }
}

pub fn main() {
    let opts: Opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            process::exit(e.exit_code());
        }
    };

    if let Err(e) = handle_command(opts) {
        error!("{e}");
        eprintln!("Error: {e}");
        std::thread::sleep(std::time::Duration::from_millis(500));
        process::exit(1);
    }
}

fn handle_command(opts: Opts) -> Result<(), String> {
    match opts.command {
        Command::Start(cmd) => {
            if !cmd.log_level.eq_ignore_ascii_case("none") {
                setup_logger(&cmd.log_dir, "localnet", &cmd.log_level, !cmd.no_stdout)?;
            }
            hiro_system_kit::nestable_block_on(node::handle_start_node_command(cmd))
        }
    }
}

pub fn setup_logger(
    log_dir: &str,
    filename: &str,
    log_filter: &str,
    log_to_stdout: bool,
) -> Result<(), String> {
    let log_dir = resolve_path(log_dir);
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| format!("Failed to create log directory {}: {}", log_dir.display(), e))?;
    let timestamp = Local::now().format("%Y-%m-%d--%H-%M-%S").to_string();
    let log_location = log_dir.join(format!("{}_{}.log", filename, timestamp));

    let log_filter = log::LevelFilter::from_str(log_filter)
        .map_err(|_| format!("Unknown log level '{}'", log_filter))?;

    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::Blue)
        .trace(Color::White);

    // File branch: full format, no filtering
    let file_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d--%H-%M-%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .chain(
            fern::log_file(&log_location)
                .map_err(|e| format!("Failed to create log file: {}", e))?,
        );

    // Stdout branch: solforge targets only, minimal colored format
    let stdout_config = fern::Dispatch::new()
        .filter(|metadata| metadata.target().starts_with("solforge"))
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} {} {}",
                Local::now().format("%b %d %H:%M:%S%.3f"),
                colors.color(record.level()),
                message
            ))
        })
        .chain(std::io::stdout());

    let mut builder = fern::Dispatch::new().level(log_filter).chain(file_config);

    if log_to_stdout {
        builder = builder.chain(stdout_config)
    }

    builder
        .apply()
        .map_err(|e| format!("Failed to initialize logger: {}", e))?;
    Ok(())
}
