//! 프로토콜 설정

use std::time::Duration;

use crate::{
    Error, Result, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL_MS,
    MAX_DATAGRAM_SIZE,
};

/// 봉투(JSON 필드, 종류, 인덱스) 오버헤드 여유분
const ENVELOPE_OVERHEAD: usize = 128;

/// CFT 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 청크 최대 크기 (바이트)
    pub chunk_size: usize,

    /// 재전송 간격이자 스케줄러 tick 주기 (밀리초)
    pub retry_interval_ms: u64,

    /// 청크당 최대 전송 시도 횟수 (최초 전송 포함)
    pub max_retries: u32,

    /// 최초 burst 전송 시 청크 간격 (마이크로초)
    /// 0이면 양보(yield)만 하고 바로 다음 청크 전송
    pub chunk_interval_us: u64,

    /// 수신 버퍼 크기
    pub recv_buffer_size: usize,

    /// 클라이언트: 데이터그램 하나를 기다리는 시간 (밀리초)
    pub receive_timeout_ms: u64,

    /// 클라이언트: 전체 전송 대기 상한 (밀리초)
    pub transfer_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            chunk_interval_us: 0,
            recv_buffer_size: 65535,
            receive_timeout_ms: 1000,
            transfer_timeout_ms: 30_000,
        }
    }
}

impl Config {
    /// 재전송 간격
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// burst 청크 간격
    pub fn chunk_interval(&self) -> Duration {
        Duration::from_micros(self.chunk_interval_us)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    /// 청크 하나를 담은 봉투의 최대 크기 추정
    pub fn max_envelope_size(&self) -> usize {
        // base64는 3바이트를 4문자로
        self.chunk_size.div_ceil(3) * 4 + ENVELOPE_OVERHEAD
    }

    /// 설정 검증 (서버 시작 전 호출)
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size는 0보다 커야 함".into()));
        }
        if self.max_envelope_size() > MAX_DATAGRAM_SIZE {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {}는 UDP 데이터그램({} bytes)에 담을 수 없음",
                self.chunk_size, MAX_DATAGRAM_SIZE
            )));
        }
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig("max_retries는 1 이상이어야 함".into()));
        }
        if self.retry_interval_ms == 0 {
            return Err(Error::InvalidConfig("retry_interval_ms는 0보다 커야 함".into()));
        }
        if self.recv_buffer_size < self.max_envelope_size() {
            return Err(Error::InvalidConfig(format!(
                "recv_buffer_size {}가 최대 봉투 크기 {}보다 작음",
                self.recv_buffer_size,
                self.max_envelope_size()
            )));
        }
        Ok(())
    }

    /// 저지연 LAN용 설정
    pub fn low_latency() -> Self {
        Self {
            chunk_size: 1400,
            retry_interval_ms: 200,           // 200ms
            max_retries: 5,
            chunk_interval_us: 0,             // 최대 속도
            recv_buffer_size: 65535,
            receive_timeout_ms: 200,
            transfer_timeout_ms: 10_000,
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            chunk_size: 600,                  // 작은 청크
            retry_interval_ms: 1500,
            max_retries: 6,
            chunk_interval_us: 200,           // 약간의 간격
            recv_buffer_size: 65535,
            receive_timeout_ms: 2000,
            transfer_timeout_ms: 60_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::low_latency().validate().is_ok());
        assert!(Config::unstable_network().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let config = Config {
            chunk_size: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_chunk_larger_than_datagram() {
        let config = Config {
            chunk_size: 60_000,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_retries_and_interval() {
        let config = Config {
            max_retries: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            retry_interval_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
