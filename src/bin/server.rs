//! CFT 서버 (송신자) - Chunked File Transfer
//!
//! 디렉터리 하나의 파일을 UDP로 청크 전송
//! - 청크별 ACK + 주기적 재전송
//! - 재시도 상한 도달 시 실패 청크를 Complete 요약으로 보고
//!
//! 사용법:
//!   cargo run --release --bin cft-server -- [OPTIONS]
//!
//! 예시:
//!   # ./files 디렉터리를 3000 포트로 제공
//!   cargo run --release --bin cft-server -- --dir ./files
//!
//!   # 불안정 네트워크 프리셋 + 재시도 5회
//!   cargo run --release --bin cft-server -- -d ./files --preset unstable --max-retries 5

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cft::{Config, DirectoryStore, Server, DEFAULT_PORT};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Default,
    LowLatency,
    Unstable,
}

#[derive(Parser, Debug)]
#[command(name = "cft-server")]
#[command(about = "Chunked File Transfer server (UDP, per-chunk ACK)", long_about = None)]
struct Cli {
    /// Listen ip
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Listen port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory with the files to serve
    #[arg(short, long, default_value = "files")]
    dir: PathBuf,

    /// Tuning preset
    #[arg(long, value_enum, default_value_t = Preset::Default)]
    preset: Preset,

    /// Max chunk size in bytes (overrides preset)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Retransmission interval in ms (overrides preset)
    #[arg(long)]
    retry_interval: Option<u64>,

    /// Max send attempts per chunk (overrides preset)
    #[arg(long)]
    max_retries: Option<u32>,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = match self.preset {
            Preset::Default => Config::default(),
            Preset::LowLatency => Config::low_latency(),
            Preset::Unstable => Config::unstable_network(),
        };
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(retry_interval) = self.retry_interval {
            config.retry_interval_ms = retry_interval;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = cli.config();
    config.validate()?;

    let store = DirectoryStore::new(&cli.dir);

    info!("CFT Server starting...");
    info!("Directory: {:?}", store.root());
    info!("Chunk size: {} bytes", config.chunk_size);
    info!("Retry interval: {} ms", config.retry_interval_ms);
    info!("Max retries: {}", config.max_retries);

    let bind_addr = SocketAddr::new(cli.bind, cli.port);
    let server = Server::bind(config, bind_addr, store).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            server.stop();
            info!("Shutting down: {}", server.get_stats().summary());
        }
    }

    Ok(())
}
