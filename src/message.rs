//! 프로토콜 메시지 정의
//!
//! 모든 데이터그램은 JSON 봉투(Envelope) 하나.
//! 청크 바이트는 base64 문자열로 `payload`에 담김.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, PartIndex};
use crate::{Error, Result};

/// 메시지 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    /// 파일 목록 요청 (클라이언트 → 서버)
    ListFiles,

    /// 파일 전송 요청, payload = 파일 이름 (클라이언트 → 서버)
    FileRequest,

    /// 청크 수신 확인, payload = 파일 이름 또는 빈 문자열 (클라이언트 → 서버)
    Ack,

    /// 파일 목록 응답, payload = JSON 이름 배열
    FileList,

    /// 전송 시작 알림, totalCount = 청크 수
    FileHeader,

    /// 청크 데이터, payload = base64
    ChunkData,

    /// 전송 종료, payload = JSON `CompletionSummary`
    Complete,

    /// 에러 응답, payload = 사람이 읽는 메시지
    Error,
}

/// 와이어 봉투
///
/// 봉투 하나만으로 의미가 완결됨 (전송 순서에 의존하지 않음)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub kind: MessageKind,

    /// 청크 인덱스 (ChunkData / Ack), 그 외 0
    #[serde(default)]
    pub part: PartIndex,

    /// 청크 수 (FileHeader / ChunkData / Complete) 또는 목록 길이 (FileList)
    #[serde(default)]
    pub total_count: u32,

    #[serde(default)]
    pub payload: String,
}

/// 전송 종료 요약 (Complete payload)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    pub file_name: String,
    pub total_chunks: u32,
    /// ACK 받은 청크 수
    pub delivered: u32,
    /// 재시도 소진된 청크 인덱스
    pub failed: Vec<PartIndex>,
}

impl CompletionSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Envelope {
    fn new(kind: MessageKind, part: PartIndex, total_count: u32, payload: String) -> Self {
        Self {
            kind,
            part,
            total_count,
            payload,
        }
    }

    pub fn list_files() -> Self {
        Self::new(MessageKind::ListFiles, 0, 0, String::new())
    }

    pub fn file_request(file_name: &str) -> Self {
        Self::new(MessageKind::FileRequest, 0, 0, file_name.to_string())
    }

    pub fn ack(part: PartIndex, file_name: &str) -> Self {
        Self::new(MessageKind::Ack, part, 0, file_name.to_string())
    }

    pub fn file_list(names: &[String]) -> Self {
        let payload = serde_json::to_string(names).unwrap_or_else(|_| "[]".into());
        Self::new(MessageKind::FileList, 0, names.len() as u32, payload)
    }

    pub fn file_header(file_name: &str, total_chunks: u32) -> Self {
        Self::new(MessageKind::FileHeader, 0, total_chunks, file_name.to_string())
    }

    pub fn chunk_data(chunk: &Chunk, total_chunks: u32) -> Self {
        Self::new(
            MessageKind::ChunkData,
            chunk.index,
            total_chunks,
            STANDARD.encode(&chunk.data),
        )
    }

    pub fn complete(summary: &CompletionSummary) -> Self {
        let payload = serde_json::to_string(summary).unwrap_or_default();
        Self::new(MessageKind::Complete, 0, summary.total_chunks, payload)
    }

    pub fn error(message: &str) -> Self {
        Self::new(MessageKind::Error, 0, 0, message.to_string())
    }

    /// 바이트로 직렬화
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// 바이트에서 역직렬화
    ///
    /// 실패는 호출측에서 메시지 폐기로 처리해야 함
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::MalformedEnvelope("빈 데이터그램".into()));
        }

        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|e| Error::MalformedEnvelope(e.to_string()))?;

        match envelope.kind {
            MessageKind::FileRequest if envelope.payload.is_empty() => {
                Err(Error::MalformedEnvelope("파일 이름 없는 전송 요청".into()))
            }
            MessageKind::ChunkData if envelope.part >= envelope.total_count => {
                Err(Error::MalformedEnvelope(format!(
                    "청크 인덱스 범위 초과: part={}, totalCount={}",
                    envelope.part, envelope.total_count
                )))
            }
            _ => Ok(envelope),
        }
    }

    fn expect_kind(&self, expected: MessageKind) -> Result<()> {
        if self.kind != expected {
            return Err(Error::MessageTypeMismatch {
                expected: format!("{:?}", expected),
                got: format!("{:?}", self.kind),
            });
        }
        Ok(())
    }

    /// ChunkData의 청크 바이트
    pub fn chunk_bytes(&self) -> Result<Bytes> {
        self.expect_kind(MessageKind::ChunkData)?;
        Ok(Bytes::from(STANDARD.decode(&self.payload)?))
    }

    /// FileList의 파일 이름 목록
    pub fn file_names(&self) -> Result<Vec<String>> {
        self.expect_kind(MessageKind::FileList)?;
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// Complete의 전송 요약
    pub fn completion_summary(&self) -> Result<CompletionSummary> {
        self.expect_kind(MessageKind::Complete)?;
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// Ack가 가리키는 파일 이름 (없으면 None)
    pub fn acked_file_name(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Ack if !self.payload.is_empty() => Some(&self.payload),
            _ => None,
        }
    }
}
