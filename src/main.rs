use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use lsp_tap::{config, config::Config, inject, proxy};

#[derive(Parser)]
#[command(name = "lsp-tap")]
#[command(about = "Transparent tap proxy between an editor and a language server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as a proxy between the editor (on stdio) and a server command
    Serve {
        /// Listen socket for injected requests
        #[arg(long)]
        inject_socket: Option<PathBuf>,
        /// Observer socket to push symbol and completion events to
        #[arg(long)]
        observer_socket: Option<PathBuf>,
        /// Observer probe period in milliseconds
        #[arg(long, default_value_t = 1000)]
        probe_interval_ms: u64,
        /// Log file; stdio stays clean for protocol traffic
        #[arg(long)]
        log_file: Option<PathBuf>,
        /// Language server command line, after `--`
        #[arg(required = true, last = true)]
        server: Vec<String>,
    },
    /// Send one request to a running proxy's inject socket
    Inject {
        /// Socket path of the running proxy
        #[arg(long)]
        socket: Option<PathBuf>,
        /// Request method name
        #[arg(long)]
        method: String,
        /// Request params as a JSON document
        #[arg(long)]
        params: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            inject_socket,
            observer_socket,
            probe_interval_ms,
            log_file,
            server,
        } => {
            init_tracing(&log_file.unwrap_or_else(config::default_log_file));
            let mut cfg = Config::new(server);
            if let Some(path) = inject_socket {
                cfg.inject_socket = path;
            }
            if let Some(path) = observer_socket {
                cfg.observer_socket = path;
            }
            cfg.probe_interval = Duration::from_millis(probe_interval_ms);
            match proxy::run(cfg).await {
                // The proxy's exit code mirrors the language server's.
                Ok(code) => std::process::exit(code),
                Err(e) => Err(e),
            }
        }
        Commands::Inject { socket, method, params } => {
            let socket = socket.unwrap_or_else(config::default_inject_socket);
            inject::run(socket, method, params).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Logging goes to a file; stdout carries protocol frames and stderr the
/// child's own diagnostics. An unopenable log file means no logging.
fn init_tracing(path: &std::path::Path) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(log_file) = std::fs::File::create(path) else {
        return;
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lsp_tap=info".parse().unwrap()),
        )
        .with_writer(log_file)
        .with_ansi(true)
        .with_target(false)
        .pretty()
        .init();
}
