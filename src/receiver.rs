//! 수신자 (클라이언트측)
//!
//! - 파일 목록 / 파일 전송 요청
//! - 받은 청크마다 ACK (중복 포함, 이전 ACK가 유실됐을 수 있음)
//! - `Complete` 수신 또는 전체 타임아웃까지 조립

use std::net::SocketAddr;

use bytes::Bytes;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::chunk::ChunkAssembler;
use crate::message::{CompletionSummary, Envelope, MessageKind};
use crate::{Config, Error, Result};

/// 다운로드 결과
#[derive(Debug)]
pub struct Download {
    pub file_name: String,

    /// 수신한 청크 (FileHeader/ChunkData를 하나도 못 받았으면 None)
    assembler: Option<ChunkAssembler>,

    /// 서버가 보낸 종료 요약 (타임아웃이면 None)
    pub summary: Option<CompletionSummary>,
}

impl Download {
    pub fn total_chunks(&self) -> Option<u32> {
        self.assembler.as_ref().map(ChunkAssembler::total_chunks)
    }

    pub fn is_complete(&self) -> bool {
        self.assembler.as_ref().is_some_and(ChunkAssembler::is_complete)
    }

    pub fn missing_parts(&self) -> Vec<u32> {
        self.assembler
            .as_ref()
            .map(ChunkAssembler::missing_parts)
            .unwrap_or_default()
    }

    /// 조립된 파일 데이터
    pub fn into_bytes(self) -> Result<Bytes> {
        match self.assembler {
            Some(assembler) => assembler.into_bytes(),
            None => Err(Error::Timeout { waited_ms: 0 }),
        }
    }
}

/// 파일 수신 클라이언트
pub struct Receiver {
    config: Config,
    socket: UdpSocket,
    server_addr: SocketAddr,

    /// ACK를 일부러 버리는 비율 (손실 시뮬레이션, 0.0 ~ 1.0)
    ack_drop_rate: f64,
}

impl Receiver {
    /// 로컬 소켓 바인딩
    pub async fn connect(config: Config, bind_addr: SocketAddr, server_addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        info!("CFT Receiver bound on {}, server: {}", socket.local_addr()?, server_addr);

        Ok(Self {
            config,
            socket,
            server_addr,
            ack_drop_rate: 0.0,
        })
    }

    pub fn with_ack_drop_rate(mut self, rate: f64) -> Self {
        self.ack_drop_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    async fn send(&self, envelope: &Envelope) -> Result<()> {
        self.socket.send_to(&envelope.encode(), self.server_addr).await?;
        Ok(())
    }

    /// 서버로부터 봉투 하나 수신. 다른 주소/깨진 메시지는 건너뜀
    async fn recv_until(&self, buf: &mut [u8], deadline: Instant) -> Result<Option<Envelope>> {
        loop {
            let (len, addr) = match tokio::time::timeout_at(deadline, self.socket.recv_from(buf)).await {
                Ok(result) => result?,
                Err(_) => return Ok(None),
            };

            if addr != self.server_addr {
                debug!("알 수 없는 주소에서 온 데이터그램 무시: {}", addr);
                continue;
            }

            match Envelope::decode(&buf[..len]) {
                Ok(envelope) => return Ok(Some(envelope)),
                Err(e) => debug!("잘못된 메시지 무시: {}", e),
            }
        }
    }

    /// 파일 목록 요청 (응답 없으면 `max_retries`회까지 재요청)
    pub async fn list_files(&self) -> Result<Vec<String>> {
        let mut buf = vec![0u8; self.config.recv_buffer_size];

        for attempt in 1..=self.config.max_retries {
            self.send(&Envelope::list_files()).await?;
            let deadline = Instant::now() + self.config.receive_timeout();

            while let Some(envelope) = self.recv_until(&mut buf, deadline).await? {
                match envelope.kind {
                    MessageKind::FileList => return envelope.file_names(),
                    MessageKind::Error => return Err(Error::Remote(envelope.payload)),
                    other => debug!("목록 대기 중 {:?} 무시", other),
                }
            }

            debug!("파일 목록 응답 없음 (시도 {}/{})", attempt, self.config.max_retries);
        }

        Err(Error::Timeout {
            waited_ms: self.config.receive_timeout_ms * self.config.max_retries as u64,
        })
    }

    /// 파일 다운로드
    ///
    /// 서버 에러 응답은 `Error::Remote`, 헤더조차 못 받으면 `Error::Timeout`
    pub async fn download(&self, file_name: &str) -> Result<Download> {
        let mut buf = vec![0u8; self.config.recv_buffer_size];
        let started = Instant::now();
        let deadline = started + self.config.transfer_timeout();

        self.send(&Envelope::file_request(file_name)).await?;

        let mut assembler: Option<ChunkAssembler> = None;
        let mut summary = None;

        while let Some(envelope) = self.recv_until(&mut buf, deadline).await? {
            match envelope.kind {
                MessageKind::Error => return Err(Error::Remote(envelope.payload)),

                MessageKind::FileHeader => {
                    if envelope.payload != file_name {
                        debug!("다른 파일의 헤더 무시: {}", envelope.payload);
                        continue;
                    }
                    info!("수신 시작: {} ({} 청크)", file_name, envelope.total_count);
                    assembler.get_or_insert_with(|| ChunkAssembler::new(envelope.total_count));
                }

                MessageKind::ChunkData => {
                    let data = match envelope.chunk_bytes() {
                        Ok(data) => data,
                        Err(e) => {
                            debug!("청크 {} 디코딩 실패: {}", envelope.part, e);
                            continue;
                        }
                    };

                    // 헤더보다 청크가 먼저 와도 청크 자체의 totalCount로 시작
                    let assembler = assembler
                        .get_or_insert_with(|| ChunkAssembler::new(envelope.total_count));
                    if assembler.insert(envelope.part, data) {
                        debug!(
                            "청크 수신: {}/{}",
                            assembler.received_count(),
                            assembler.total_chunks()
                        );
                    }

                    self.send_ack(envelope.part, file_name).await;
                }

                MessageKind::Complete => {
                    match envelope.completion_summary() {
                        Ok(s) if s.file_name == file_name => summary = Some(s),
                        Ok(s) => {
                            debug!("다른 파일의 Complete 무시: {}", s.file_name);
                            continue;
                        }
                        Err(e) => warn!("Complete 요약 파싱 실패: {}", e),
                    }
                    break;
                }

                other => debug!("수신 중 {:?} 무시", other),
            }
        }

        if assembler.is_none() {
            return Err(Error::Timeout {
                waited_ms: started.elapsed().as_millis() as u64,
            });
        }

        if summary.is_none() {
            warn!("{}: Complete 없이 타임아웃", file_name);
        }

        Ok(Download {
            file_name: file_name.to_string(),
            assembler,
            summary,
        })
    }

    async fn send_ack(&self, part: u32, file_name: &str) {
        if self.ack_drop_rate > 0.0 && rand::thread_rng().gen_bool(self.ack_drop_rate) {
            debug!("ACK {} 드롭 (시뮬레이션)", part);
            return;
        }

        if let Err(e) = self.send(&Envelope::ack(part, file_name)).await {
            warn!("ACK 전송 실패: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::server::{Server, FILE_NOT_FOUND_MESSAGE};
    use crate::store::DirectoryStore;

    fn fast_config() -> Config {
        Config {
            chunk_size: 1000,
            retry_interval_ms: 20,
            max_retries: 3,
            receive_timeout_ms: 500,
            transfer_timeout_ms: 5_000,
            ..Config::default()
        }
    }

    async fn spawn_server(
        dir: &tempfile::TempDir,
    ) -> (Arc<Server<UdpSocket, DirectoryStore>>, SocketAddr) {
        let server = Server::bind(
            fast_config(),
            "127.0.0.1:0".parse().unwrap(),
            DirectoryStore::new(dir.path()),
        )
        .await
        .unwrap();
        let server = Arc::new(server);
        let addr = server.local_addr().unwrap();

        let running = server.clone();
        tokio::spawn(async move { running.run().await });
        (server, addr)
    }

    async fn receiver(server_addr: SocketAddr) -> Receiver {
        Receiver::connect(fast_config(), "127.0.0.1:0".parse().unwrap(), server_addr)
            .await
            .unwrap()
    }

    fn sample_data() -> Vec<u8> {
        (0..3000u32).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_loopback_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), sample_data()).unwrap();
        let (server, addr) = spawn_server(&dir).await;

        let client = receiver(addr).await;
        let download = client.download("data.bin").await.unwrap();

        assert_eq!(download.total_chunks(), Some(3));
        assert!(download.is_complete());
        let summary = download.summary.clone().unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.delivered, 3);
        assert_eq!(download.into_bytes().unwrap().as_ref(), sample_data().as_slice());

        assert_eq!(server.active_sessions(), 0);
        server.stop();
    }

    #[tokio::test]
    async fn test_loopback_list_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let (server, addr) = spawn_server(&dir).await;

        let client = receiver(addr).await;
        assert_eq!(client.list_files().await.unwrap(), vec!["a.txt", "b.txt"]);
        server.stop();
    }

    #[tokio::test]
    async fn test_loopback_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (server, addr) = spawn_server(&dir).await;

        let client = receiver(addr).await;
        match client.download("ghost.bin").await {
            Err(Error::Remote(message)) => assert_eq!(message, FILE_NOT_FOUND_MESSAGE),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(server.active_sessions(), 0);
        server.stop();
    }

    #[tokio::test]
    async fn test_loopback_lost_acks_reported_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), sample_data()).unwrap();
        let (server, addr) = spawn_server(&dir).await;

        // ACK가 전부 유실되면 데이터는 받지만 서버는 모든 청크를 실패로 보고
        let client = receiver(addr).await.with_ack_drop_rate(1.0);
        let download = client.download("data.bin").await.unwrap();

        let summary = download.summary.clone().unwrap();
        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.failed, vec![0, 1, 2]);
        assert!(download.is_complete());

        let stats = server.get_stats();
        assert_eq!(stats.chunks_sent, 9);
        assert_eq!(stats.sessions_failed, 1);
        server.stop();
    }

    #[tokio::test]
    async fn test_empty_file_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.txt"), b"").unwrap();
        let (server, addr) = spawn_server(&dir).await;

        let client = receiver(addr).await;
        let download = client.download("empty.txt").await.unwrap();

        assert_eq!(download.total_chunks(), Some(0));
        assert!(download.summary.as_ref().unwrap().is_success());
        assert!(download.into_bytes().unwrap().is_empty());
        server.stop();
    }
}
