//! 전송 세션
//!
//! - OutstandingChunk: 청크별 전송/ACK 상태
//! - Session: 클라이언트 하나에 대한 파일 하나의 전송 상태
//! - SessionRegistry: 모든 세션의 단독 소유자

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::mapref::one::{Ref, RefMut};
use dashmap::DashMap;
use tracing::debug;

use crate::ack::AckOutcome;
use crate::chunk::{Chunk, ChunkEncoder, PartIndex};
use crate::message::CompletionSummary;

/// 클라이언트 식별자 (원격 주소)
pub type ClientId = SocketAddr;

/// 청크별 전달 상태
#[derive(Debug, Clone)]
pub struct OutstandingChunk {
    /// 원본 청크
    pub chunk: Chunk,

    /// 전송 시도 횟수 (최초 전송 포함)
    pub attempts: u32,

    /// 마지막 전송 시각 (아직 안 보냈으면 None)
    pub last_sent_at: Option<Instant>,

    /// ACK 수신 여부. 한 번 true가 되면 되돌리지 않음
    pub acknowledged: bool,
}

impl OutstandingChunk {
    fn new(chunk: Chunk) -> Self {
        Self {
            chunk,
            attempts: 0,
            last_sent_at: None,
            acknowledged: false,
        }
    }

    /// 재시도 예산 소진 여부
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        !self.acknowledged && self.attempts >= max_retries
    }

    /// 지금 (재)전송해야 하는지
    fn is_due(&self, now: Instant, retry_interval: Duration, max_retries: u32) -> bool {
        if self.acknowledged || self.attempts >= max_retries {
            return false;
        }
        // 최초 전송 전인 청크는 burst 담당
        match self.last_sent_at {
            Some(sent) => now.saturating_duration_since(sent) >= retry_interval,
            None => false,
        }
    }

    fn mark_sent(&mut self, now: Instant) {
        self.attempts += 1;
        self.last_sent_at = Some(now);
    }
}

/// 전송 세션
#[derive(Debug)]
pub struct Session {
    client: ClientId,
    file_name: String,
    total_chunks: u32,

    /// 인덱스 → 청크 상태. 활성 동안 키는 정확히 `0..total_chunks`
    outstanding: BTreeMap<PartIndex, OutstandingChunk>,

    /// 전체 파일 크기
    file_size: usize,

    /// 최초 burst 커서: 이 인덱스부터 아직 안 보냄
    next_unsent: PartIndex,

    created_at: Instant,
}

impl Session {
    pub fn new(client: ClientId, file_name: &str, chunks: Vec<Chunk>, created_at: Instant) -> Self {
        let file_size = chunks.iter().map(Chunk::len).sum();
        let outstanding: BTreeMap<_, _> = chunks
            .into_iter()
            .map(|chunk| (chunk.index, OutstandingChunk::new(chunk)))
            .collect();

        Self {
            client,
            file_name: file_name.to_string(),
            total_chunks: outstanding.len() as u32,
            outstanding,
            file_size,
            next_unsent: 0,
            created_at,
        }
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn file_size(&self) -> usize {
        self.file_size
    }

    pub fn outstanding(&self, part: PartIndex) -> Option<&OutstandingChunk> {
        self.outstanding.get(&part)
    }

    /// 최초 burst가 남았는지
    pub fn has_unsent(&self) -> bool {
        self.next_unsent < self.total_chunks
    }

    /// 아직 한 번도 보내지 않은 청크를 최대 `limit`개 전송 처리하고 반환 (최초 burst용)
    pub fn take_unsent(&mut self, now: Instant, limit: usize) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for (&index, oc) in self.outstanding.range_mut(self.next_unsent..) {
            if chunks.len() >= limit {
                break;
            }
            self.next_unsent = index + 1;
            if oc.acknowledged || oc.last_sent_at.is_some() {
                continue;
            }
            oc.mark_sent(now);
            chunks.push(oc.chunk.clone());
        }
        chunks
    }

    /// 재전송 시점이 된 청크를 전송 처리하고 반환
    ///
    /// 시도 횟수는 실제 송신 결과와 무관하게 여기서 소모됨
    pub fn take_due(&mut self, now: Instant, retry_interval: Duration, max_retries: u32) -> Vec<Chunk> {
        self.outstanding
            .values_mut()
            .filter(|oc| oc.is_due(now, retry_interval, max_retries))
            .map(|oc| {
                oc.mark_sent(now);
                oc.chunk.clone()
            })
            .collect()
    }

    /// ACK 적용 (멱등)
    pub fn acknowledge(&mut self, part: PartIndex) -> AckOutcome {
        match self.outstanding.get_mut(&part) {
            None => AckOutcome::UnknownPart,
            Some(oc) if oc.acknowledged => AckOutcome::Duplicate,
            Some(oc) => {
                oc.acknowledged = true;
                AckOutcome::Recorded
            }
        }
    }

    pub fn acked_count(&self) -> u32 {
        self.outstanding.values().filter(|oc| oc.acknowledged).count() as u32
    }

    pub fn is_all_acked(&self) -> bool {
        self.outstanding.values().all(|oc| oc.acknowledged)
    }

    /// 미확인 청크가 모두 재시도 상한에 도달했는지
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.outstanding
            .values()
            .filter(|oc| !oc.acknowledged)
            .all(|oc| oc.attempts >= max_retries)
    }

    /// 종료 조건: 모두 ACK 되었거나, 이번 패스에 재전송이 없고 더 보낼 청크도 없음
    pub fn is_terminal(&self, max_retries: u32, resent_this_pass: bool) -> bool {
        self.is_all_acked() || (!resent_this_pass && self.is_exhausted(max_retries))
    }

    /// 현재 상태 보고서
    pub fn report(&self, max_retries: u32) -> TransferReport {
        let (delivered, pending): (Vec<_>, Vec<_>) = self
            .outstanding
            .values()
            .partition(|oc| oc.acknowledged);

        TransferReport {
            client: self.client,
            file_name: self.file_name.clone(),
            total_chunks: self.total_chunks,
            delivered: delivered.iter().map(|oc| oc.chunk.index).collect(),
            failed: pending
                .iter()
                .filter(|oc| oc.is_exhausted(max_retries))
                .map(|oc| oc.chunk.index)
                .collect(),
            attempts: self.outstanding.values().map(|oc| oc.attempts as u64).sum(),
            elapsed: self.created_at.elapsed(),
        }
    }
}

/// 세션 종료 보고서
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub client: ClientId,
    pub file_name: String,
    pub total_chunks: u32,

    /// ACK 받은 청크 인덱스
    pub delivered: Vec<PartIndex>,

    /// 재시도 소진으로 실패한 청크 인덱스
    pub failed: Vec<PartIndex>,

    /// 전체 전송 시도 횟수
    pub attempts: u64,

    pub elapsed: Duration,
}

impl TransferReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.delivered.len() as u32 == self.total_chunks
    }

    pub fn summary(&self) -> CompletionSummary {
        CompletionSummary {
            file_name: self.file_name.clone(),
            total_chunks: self.total_chunks,
            delivered: self.delivered.len() as u32,
            failed: self.failed.clone(),
        }
    }
}

/// 세션 레지스트리
///
/// 클라이언트당 세션 하나. 새 전송 요청은 이전 세션을 통째로 대체함
pub struct SessionRegistry {
    encoder: ChunkEncoder,
    sessions: DashMap<ClientId, Session>,
}

impl SessionRegistry {
    pub fn new(encoder: ChunkEncoder) -> Self {
        Self {
            encoder,
            sessions: DashMap::new(),
        }
    }

    /// 세션 시작. 기존 세션은 먼저 폐기. 청크 수 반환
    pub fn start(&self, client: ClientId, file_name: &str, data: Bytes, now: Instant) -> u32 {
        if let Some(previous) = self.remove(&client) {
            debug!(
                "{}의 이전 세션 폐기: {} ({}/{} ACK)",
                client,
                previous.file_name(),
                previous.acked_count(),
                previous.total_chunks()
            );
        }

        let chunks = self.encoder.split(&data);
        let session = Session::new(client, file_name, chunks, now);
        let total_chunks = session.total_chunks();
        self.sessions.insert(client, session);
        total_chunks
    }

    pub fn get(&self, client: &ClientId) -> Option<Ref<'_, ClientId, Session>> {
        self.sessions.get(client)
    }

    pub fn get_mut(&self, client: &ClientId) -> Option<RefMut<'_, ClientId, Session>> {
        self.sessions.get_mut(client)
    }

    /// 무조건 폐기
    pub fn remove(&self, client: &ClientId) -> Option<Session> {
        self.sessions.remove(client).map(|(_, session)| session)
    }

    /// 최초 burst가 남은 세션이 하나라도 있는지
    pub fn has_unsent(&self) -> bool {
        self.sessions.iter().any(|entry| entry.has_unsent())
    }

    /// 활성 세션의 클라이언트 목록 (스냅샷)
    pub fn clients(&self) -> Vec<ClientId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
