//! 에러 타입 정의

use thiserror::Error;

/// CFT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("base64 디코딩 에러: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("잘못된 메시지: {0}")]
    MalformedEnvelope(String),

    #[error("파일 없음: {name}")]
    FileNotFound { name: String },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("청크 누락: {missing_count}/{total_chunks}개 미수신")]
    ChunksMissing {
        missing_count: usize,
        total_chunks: u32,
    },

    #[error("메시지 타입 불일치: expected {expected}, got {got}")]
    MessageTypeMismatch { expected: String, got: String },

    #[error("서버 에러 응답: {0}")]
    Remote(String),

    #[error("응답 타임아웃: {waited_ms}ms")]
    Timeout { waited_ms: u64 },
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
