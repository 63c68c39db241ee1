//! 전송 통계

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::session::TransferReport;

/// 스케줄러/ACK 추적기/서버가 공유하는 통계 핸들
pub type SharedStats = Arc<RwLock<TransferStats>>;

/// 서버 전체 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 시작된 세션 수
    pub sessions_started: u64,

    /// 모든 청크가 전달된 세션 수
    pub sessions_completed: u64,

    /// 실패 청크가 남은 채 종료된 세션 수
    pub sessions_failed: u64,

    /// 전송 요청된 파일 바이트 합계
    pub total_bytes: u64,

    /// 송신 청크 수 (재전송 포함)
    pub chunks_sent: u64,

    /// 재전송 청크 수
    pub retransmitted_chunks: u64,

    /// 재시도 소진된 청크 수
    pub failed_chunks: u64,

    /// 송신 실패 수 (시도 횟수로는 소모됨)
    pub send_failures: u64,

    /// 새로 기록된 ACK 수
    pub acks_recorded: u64,

    /// 중복 ACK 수
    pub duplicate_acks: u64,

    /// 무시된 ACK 수 (세션/청크 없음, 다른 파일)
    pub ignored_acks: u64,

    /// 파싱 실패로 폐기된 메시지 수
    pub dropped_messages: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            sessions_started: 0,
            sessions_completed: 0,
            sessions_failed: 0,
            total_bytes: 0,
            chunks_sent: 0,
            retransmitted_chunks: 0,
            failed_chunks: 0,
            send_failures: 0,
            acks_recorded: 0,
            duplicate_acks: 0,
            ignored_acks: 0,
            dropped_messages: 0,
        }
    }

    pub fn shared() -> SharedStats {
        Arc::new(RwLock::new(Self::new()))
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 세션 종료 반영
    pub fn record_report(&mut self, report: &TransferReport) {
        if report.is_success() {
            self.sessions_completed += 1;
        } else {
            self.sessions_failed += 1;
        }
        self.failed_chunks += report.failed.len() as u64;
    }

    /// 재전송 비율 (재전송 / 전체 송신)
    pub fn retransmit_ratio(&self) -> f64 {
        if self.chunks_sent == 0 {
            return 0.0;
        }
        self.retransmitted_chunks as f64 / self.chunks_sent as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Sessions: {} ok / {} failed / {} started | Bytes: {} | Chunks: {} (retx {:.1}%) | Failed chunks: {} | ACKs: {} (+{} dup, {} ignored) | Dropped: {}",
            self.elapsed().as_secs_f64(),
            self.sessions_completed,
            self.sessions_failed,
            self.sessions_started,
            self.total_bytes,
            self.chunks_sent,
            self.retransmit_ratio() * 100.0,
            self.failed_chunks,
            self.acks_recorded,
            self.duplicate_acks,
            self.ignored_acks,
            self.dropped_messages,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}
