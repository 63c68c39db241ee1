//! ACK 처리
//!
//! 알 수 없는 세션/청크에 대한 ACK는 조용히 무시 (에러 없음, 응답 없음)

use std::sync::Arc;

use tracing::debug;

use crate::chunk::PartIndex;
use crate::session::{ClientId, SessionRegistry};
use crate::stats::SharedStats;

/// ACK 적용 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// 새로 확인됨
    Recorded,

    /// 이미 확인된 청크
    Duplicate,

    /// 해당 클라이언트의 세션 없음 (종료되었거나 대체됨)
    UnknownSession,

    /// 세션은 있으나 청크 인덱스가 범위 밖
    UnknownPart,

    /// 다른 파일에 대한 ACK (이전 전송의 잔여 ACK)
    StaleTransfer,
}

/// ACK 추적기
pub struct AckTracker {
    registry: Arc<SessionRegistry>,
    stats: SharedStats,
}

impl AckTracker {
    pub fn new(registry: Arc<SessionRegistry>, stats: SharedStats) -> Self {
        Self { registry, stats }
    }

    /// ACK 기록
    ///
    /// `file_name`이 주어지면 현재 세션의 파일과 일치할 때만 적용
    pub fn record_ack(
        &self,
        client: ClientId,
        part: PartIndex,
        file_name: Option<&str>,
    ) -> AckOutcome {
        let outcome = match self.registry.get_mut(&client) {
            None => AckOutcome::UnknownSession,
            Some(session) if file_name.is_some_and(|name| name != session.file_name()) => {
                AckOutcome::StaleTransfer
            }
            Some(mut session) => session.acknowledge(part),
        };

        {
            let mut stats = self.stats.write();
            match outcome {
                AckOutcome::Recorded => stats.acks_recorded += 1,
                AckOutcome::Duplicate => stats.duplicate_acks += 1,
                _ => stats.ignored_acks += 1,
            }
        }

        if outcome != AckOutcome::Recorded {
            debug!("ACK 무시: client={}, part={}, {:?}", client, part, outcome);
        }

        outcome
    }
}
