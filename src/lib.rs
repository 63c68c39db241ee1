//! # CFT (Chunked File Transfer)
//!
//! UDP 기반 ACK 청크 전송 프로토콜
//!
//! ## 핵심 특징
//! - **청크 분할**: 파일을 고정 최대 크기의 청크로 분할, 각 청크는 자기 기술적(self-describing)
//! - **청크별 ACK**: 클라이언트는 받은 청크마다 ACK 전송
//! - **주기적 재전송**: ACK 없는 청크를 일정 간격으로 재전송, 재시도 상한 도달 시 실패 처리
//! - **세션 격리**: 클라이언트 주소별 세션, 새 요청은 이전 세션을 완전히 대체
//! - **항상 수렴**: 모든 청크가 ACK 되거나 재시도가 소진되면 `Complete` 한 번 전송 후 종료

pub mod ack;
pub mod chunk;
pub mod config;
pub mod error;
pub mod message;
pub mod receiver;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod stats;
pub mod store;
pub mod transport;

pub use ack::{AckOutcome, AckTracker};
pub use chunk::{Chunk, ChunkAssembler, ChunkEncoder, PartIndex};
pub use config::Config;
pub use error::{Error, Result};
pub use message::{CompletionSummary, Envelope, MessageKind};
pub use receiver::{Download, Receiver};
pub use scheduler::RetransmissionScheduler;
pub use server::Server;
pub use session::{ClientId, OutstandingChunk, Session, SessionRegistry, TransferReport};
pub use stats::{SharedStats, TransferStats};
pub use store::{DirectoryStore, FileSource};
pub use transport::Transport;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 1400;

/// 기본 재전송 간격 (밀리초)
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;

/// 청크당 최대 전송 시도 횟수
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// 기본 서버 포트
pub const DEFAULT_PORT: u16 = 3000;

/// UDP 데이터그램 최대 페이로드 (IPv4)
pub const MAX_DATAGRAM_SIZE: usize = 65507;
