//! 재전송 스케줄러
//!
//! - 세션 시작 시 모든 청크를 한 번씩 전송 (burst). 서버 루프 한 바퀴에 일부만
//!   보내서 burst 중에도 ACK 수신과 tick이 계속 돌아감
//! - tick마다 ACK 없는 청크 중 간격이 지난 것만 재전송
//! - 청크당 전송은 `max_retries`회까지
//! - 종료 조건 도달 시 `Complete` 한 번 전송 후 세션 폐기
//!
//! 판단 근거는 세션에 기록된 `last_sent_at` 뿐이고, 송신 실패도 시도로 계산되어
//! 로컬 송신이 계속 실패해도 세션은 유한 시간 안에 끝난다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::message::Envelope;
use crate::session::{ClientId, SessionRegistry, TransferReport};
use crate::stats::SharedStats;
use crate::transport::Transport;
use crate::Config;

/// 청크 간격이 0일 때 루프 한 바퀴에 세션당 보내는 최대 청크 수
pub const BURST_BATCH: usize = 32;

/// 재전송 스케줄러
pub struct RetransmissionScheduler {
    registry: Arc<SessionRegistry>,
    retry_interval: Duration,
    max_retries: u32,
    chunk_interval: Duration,
    stats: SharedStats,
}

impl RetransmissionScheduler {
    pub fn new(registry: Arc<SessionRegistry>, config: &Config, stats: SharedStats) -> Self {
        Self {
            registry,
            retry_interval: config.retry_interval(),
            max_retries: config.max_retries,
            chunk_interval: config.chunk_interval(),
            stats,
        }
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// burst 청크 간격
    pub fn chunk_interval(&self) -> Duration {
        self.chunk_interval
    }

    /// 최초 burst가 남은 세션이 있는지
    pub fn has_unsent(&self) -> bool {
        self.registry.has_unsent()
    }

    /// 전송 시작: 세션 생성(기존 세션 대체), FileHeader 전송
    ///
    /// 청크 burst는 `send_unsent`가 나눠서 보냄. 청크 수 반환
    pub async fn start_transfer<T: Transport>(
        &self,
        transport: &T,
        client: ClientId,
        file_name: &str,
        data: Bytes,
        now: Instant,
    ) -> u32 {
        let file_size = data.len();
        let total_chunks = self.registry.start(client, file_name, data, now);

        {
            let mut stats = self.stats.write();
            stats.sessions_started += 1;
            stats.total_bytes += file_size as u64;
        }

        info!(
            "전송 시작: {} -> {} ({} bytes, {} 청크)",
            file_name, client, file_size, total_chunks
        );

        let header = Envelope::file_header(file_name, total_chunks);
        if let Err(e) = transport.send_to(&header.encode(), client).await {
            warn!("FileHeader 전송 실패 ({}): {}", client, e);
        }

        // 빈 파일은 보낼 청크 없이 바로 종료
        if total_chunks == 0 {
            self.finish(transport, client).await;
            return 0;
        }

        total_chunks
    }

    /// 세션마다 아직 안 보낸 청크를 한 묶음씩 전송. 보낸 청크 수 반환
    ///
    /// 청크 간격이 있으면 호출당 세션별 한 개, 없으면 `BURST_BATCH`개까지
    pub async fn send_unsent<T: Transport>(&self, transport: &T, now: Instant) -> usize {
        let limit = if self.chunk_interval.is_zero() {
            BURST_BATCH
        } else {
            1
        };
        let mut sent = 0;

        for client in self.registry.clients() {
            let (chunks, total_chunks, file_size, done) = match self.registry.get_mut(&client) {
                Some(mut session) => {
                    let chunks = session.take_unsent(now, limit);
                    (chunks, session.total_chunks(), session.file_size(), !session.has_unsent())
                }
                None => continue,
            };

            for chunk in &chunks {
                self.transmit(transport, client, chunk, total_chunks).await;
            }
            sent += chunks.len();

            if done && !chunks.is_empty() {
                debug!("{}: 최초 burst 완료 ({} 청크, {} bytes)", client, total_chunks, file_size);
            }
        }

        sent
    }

    /// 한 번의 tick: 재전송 패스 후 종료 조건 평가
    ///
    /// 이번 tick에 종료된 세션의 보고서 반환
    pub async fn tick<T: Transport>(&self, transport: &T, now: Instant) -> Vec<TransferReport> {
        let mut finished = Vec::new();

        for client in self.registry.clients() {
            // 락은 await 전에 해제
            let (due, total_chunks) = match self.registry.get_mut(&client) {
                Some(mut session) => {
                    let due = session.take_due(now, self.retry_interval, self.max_retries);
                    (due, session.total_chunks())
                }
                None => continue,
            };

            for chunk in &due {
                debug!("청크 {} 재전송 -> {}", chunk.index, client);
                self.transmit(transport, client, chunk, total_chunks).await;
            }

            if !due.is_empty() {
                self.stats.write().retransmitted_chunks += due.len() as u64;
            }

            let terminal = self
                .registry
                .get(&client)
                .map(|session| session.is_terminal(self.max_retries, !due.is_empty()))
                .unwrap_or(false);

            if terminal {
                if let Some(report) = self.finish(transport, client).await {
                    finished.push(report);
                }
            }
        }

        finished
    }

    /// 세션 폐기 후 Complete 전송
    async fn finish<T: Transport>(&self, transport: &T, client: ClientId) -> Option<TransferReport> {
        let session = self.registry.remove(&client)?;
        let report = session.report(self.max_retries);
        self.stats.write().record_report(&report);

        let complete = Envelope::complete(&report.summary());
        if let Err(e) = transport.send_to(&complete.encode(), client).await {
            warn!("Complete 전송 실패 ({}): {}", client, e);
        }

        if report.is_success() {
            info!(
                "전송 완료: {} -> {} ({} 청크, {} 시도, {:.2}s)",
                report.file_name,
                client,
                report.total_chunks,
                report.attempts,
                report.elapsed.as_secs_f64()
            );
        } else {
            warn!(
                "전송 종료 (재시도 소진): {} -> {}, 실패 청크 {:?} ({}/{} 전달)",
                report.file_name,
                client,
                report.failed,
                report.delivered.len(),
                report.total_chunks
            );
        }

        Some(report)
    }

    /// 청크 하나 송신. 실패는 기록만 (시도는 이미 소모됨)
    async fn transmit<T: Transport>(
        &self,
        transport: &T,
        client: ClientId,
        chunk: &Chunk,
        total_chunks: u32,
    ) {
        let envelope = Envelope::chunk_data(chunk, total_chunks);
        let result = transport.send_to(&envelope.encode(), client).await;

        let mut stats = self.stats.write();
        stats.chunks_sent += 1;
        if let Err(e) = result {
            stats.send_failures += 1;
            warn!("청크 {} 전송 실패 ({}): {}", chunk.index, client, e);
        }
    }
}
