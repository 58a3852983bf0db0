use clap::Parser;
use socksd::config::Config;
use socksd::server::SocksServer;
use socksd::utils::logging::build_env_filter;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

const DEFAULT_PORT: u16 = 1080;

#[derive(Parser, Debug)]
#[command(name = "socksd")]
#[command(about = "SOCKS4/SOCKS4a/SOCKS5 proxy server", long_about = None)]
#[command(version)]
struct Args {
    /// Bind address (default: all interfaces)
    #[arg(short = 'b', long, value_name = "ADDRESS")]
    bind: Option<String>,

    /// Port to listen on
    #[arg(value_parser = parse_port)]
    port: Option<u16>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write an example configuration file and exit
    #[arg(long, value_name = "FILE")]
    generate_config: Option<PathBuf>,

    /// Log level (debug, info, warning, error, critical, fatal)
    #[arg(short = 'l', long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn parse_port(raw: &str) -> Result<u16, String> {
    let port: u32 = raw.parse().map_err(|_| format!("invalid port: {}", raw))?;
    if port == 0 || port > 65535 {
        return Err(format!("port must be in [1, 65535], got {}", port));
    }
    Ok(port as u16)
}

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    let args = Args::parse();

    if let Some(config_path) = args.generate_config {
        if let Err(err) = Config::create_example(&config_path) {
            eprintln!("socksd: error: {}", err);
            return 1;
        }
        println!("wrote example configuration to {}", config_path.display());
        return 0;
    }

    tracing_subscriber::registry()
        .with(build_env_filter(args.log_level.as_deref()))
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(socksd::utils::logging::BracketedFormatter)
                .with_ansi(false),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("socksd: error: {}", err);
                return 1;
            }
        },
        None => Config::default(),
    };

    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = args.port {
        config.server.bind_port = port;
    }
    if config.server.bind_port == 0 {
        config.server.bind_port = DEFAULT_PORT;
    }

    let ip: IpAddr = config
        .server
        .bind_address
        .parse()
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let addr = std::net::SocketAddr::new(ip, config.server.bind_port);

    let server = match SocksServer::bind(addr).await {
        Ok(server) => server,
        Err(err) => {
            eprintln!("socksd: error: {}", err);
            return 1;
        }
    };

    info!(addr = %server.local_addr(), "socksd starting");

    tokio::select! {
        result = server.run() => {
            if let Err(err) = result {
                error!(error = %err, "server stopped unexpectedly");
                return 1;
            }
            0
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
            130
        }
    }
}
