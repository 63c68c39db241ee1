//! CFT 클라이언트 (수신자) - Chunked File Transfer
//!
//! 서버 파일 목록 조회 및 다운로드
//! - 받은 청크마다 ACK
//! - 누락 청크가 있으면 저장하지 않고 목록 출력
//!
//! 사용법:
//!   cargo run --release --bin cft-client -- [OPTIONS] <COMMAND>
//!
//! 예시:
//!   # 파일 목록
//!   cargo run --release --bin cft-client -- --server 127.0.0.1:3000 list
//!
//!   # 다운로드
//!   cargo run --release --bin cft-client -- -s 127.0.0.1:3000 get report.pdf -o received/report.pdf
//!
//!   # ACK 20% 유실 시뮬레이션
//!   cargo run --release --bin cft-client -- get report.pdf --ack-drop-rate 0.2

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cft::{Config, Receiver};

#[derive(Parser, Debug)]
#[command(name = "cft-client")]
#[command(about = "Chunked File Transfer client", long_about = None)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    server: SocketAddr,

    /// Local bind address
    #[arg(short, long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    /// Overall transfer timeout (ms)
    #[arg(short, long, default_value_t = 30_000)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List files available on the server
    List,

    /// Download one file
    Get {
        /// File name on the server
        name: String,

        /// Output path (default: ./received/<name>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fraction of ACKs to drop on purpose (0.0 ~ 1.0)
        #[arg(long, default_value_t = 0.0)]
        ack_drop_rate: f64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = Config {
        transfer_timeout_ms: cli.timeout,
        ..Config::default()
    };

    match cli.command {
        Command::List => {
            let receiver = Receiver::connect(config, cli.bind, cli.server).await?;
            let names = receiver.list_files().await?;
            info!("{} files on {}", names.len(), cli.server);
            for name in names {
                println!("{}", name);
            }
        }

        Command::Get {
            name,
            output,
            ack_drop_rate,
        } => {
            let receiver = Receiver::connect(config, cli.bind, cli.server)
                .await?
                .with_ack_drop_rate(ack_drop_rate);

            let start = Instant::now();
            let download = receiver.download(&name).await?;

            if let Some(summary) = &download.summary {
                if !summary.is_success() {
                    warn!("Server gave up on chunks: {:?}", summary.failed);
                }
            }

            let missing = download.missing_parts();
            if !missing.is_empty() {
                warn!("Missing {} chunks: {:?}", missing.len(), missing);
            }

            let data = download.into_bytes()?;
            let output = output.unwrap_or_else(|| PathBuf::from("received").join(&name));
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&output, &data)?;

            let elapsed = start.elapsed();
            info!("Received {} ({} bytes) in {:.2}s", name, data.len(), elapsed.as_secs_f64());
            info!("Saved to {:?}", output);
        }
    }

    Ok(())
}
