//! 서버 (송신측)
//!
//! 단일 태스크에서 수신 데이터그램 처리, 재전송 tick, 최초 burst 묶음 전송을 번갈아 수행.
//! 세션 상태는 클라이언트별로 분리되어 있어 서로 간섭하지 않음.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::ack::AckTracker;
use crate::chunk::ChunkEncoder;
use crate::message::{Envelope, MessageKind};
use crate::scheduler::RetransmissionScheduler;
use crate::session::{ClientId, SessionRegistry};
use crate::stats::{SharedStats, TransferStats};
use crate::store::FileSource;
use crate::transport::Transport;
use crate::{Config, Error, Result};

/// 파일 없음 응답 메시지
pub const FILE_NOT_FOUND_MESSAGE: &str = "File not found";

/// 읽기 실패 응답 메시지
pub const FILE_UNAVAILABLE_MESSAGE: &str = "File unavailable";

/// 파일 전송 서버
pub struct Server<T: Transport, S: FileSource> {
    /// 설정
    config: Config,

    /// 데이터그램 transport
    transport: Arc<T>,

    /// 파일 제공자
    store: S,

    /// 세션 레지스트리
    registry: Arc<SessionRegistry>,

    /// ACK 추적기
    acks: AckTracker,

    /// 재전송 스케줄러
    scheduler: RetransmissionScheduler,

    /// 전송 통계
    stats: SharedStats,

    /// 실행 중 플래그
    running: AtomicBool,
}

impl<S: FileSource> Server<UdpSocket, S> {
    /// UDP 소켓 바인딩 후 서버 생성
    pub async fn bind(config: Config, bind_addr: SocketAddr, store: S) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(bind_addr).await?;
        Self::new(config, Arc::new(socket), store)
    }
}

impl<T: Transport, S: FileSource> Server<T, S> {
    /// 새 서버 생성
    pub fn new(config: Config, transport: Arc<T>, store: S) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(SessionRegistry::new(ChunkEncoder::new(config.chunk_size)?));
        let stats = TransferStats::shared();

        Ok(Self {
            acks: AckTracker::new(registry.clone(), stats.clone()),
            scheduler: RetransmissionScheduler::new(registry.clone(), &config, stats.clone()),
            registry,
            stats,
            config,
            transport,
            store,
            running: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    /// 서버 루프 실행 (stop() 호출 전까지)
    pub async fn run(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!("CFT Server started on {}", self.local_addr()?);

        let mut ticker = tokio::time::interval(self.scheduler.retry_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // 청크 간격이 0이면 pacer 없이 양보만
        let chunk_interval = self.scheduler.chunk_interval();
        let mut pacer = (!chunk_interval.is_zero()).then(|| {
            let mut pacer = tokio::time::interval(chunk_interval);
            pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            pacer
        });

        let mut buf = vec![0u8; self.config.recv_buffer_size];

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                result = self.transport.recv_from(&mut buf) => {
                    match result {
                        Ok((len, addr)) => {
                            if let Err(e) = self.handle_datagram(&buf[..len], addr).await {
                                warn!("메시지 처리 에러 ({}): {}", addr, e);
                            }
                        }
                        Err(e) => {
                            warn!("수신 에러: {}", e);
                        }
                    }
                }
                _ = ticker.tick() => {
                    for report in self.scheduler.tick(&*self.transport, Instant::now()).await {
                        debug!("세션 종료 {}: {}", report.client, self.stats.read().summary());
                    }
                }
                _ = pace(&mut pacer), if self.scheduler.has_unsent() => {
                    self.scheduler.send_unsent(&*self.transport, Instant::now()).await;
                }
            }
        }

        info!("CFT Server stopped: {}", self.stats.read().summary());
        Ok(())
    }

    /// 데이터그램 하나 처리
    ///
    /// 파싱 실패는 폐기, 어떤 에러도 루프를 멈추지 않음
    pub async fn handle_datagram(&self, data: &[u8], addr: ClientId) -> Result<()> {
        let envelope = match Envelope::decode(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.write().dropped_messages += 1;
                debug!("잘못된 메시지 폐기 ({}): {}", addr, e);
                return Ok(());
            }
        };

        match envelope.kind {
            MessageKind::ListFiles => self.handle_list_files(addr).await,
            MessageKind::FileRequest => self.handle_file_request(&envelope.payload, addr).await,
            MessageKind::Ack => {
                self.acks
                    .record_ack(addr, envelope.part, envelope.acked_file_name());
                Ok(())
            }
            other => {
                debug!("서버로 온 {:?} 메시지 무시 ({})", other, addr);
                Ok(())
            }
        }
    }

    async fn handle_list_files(&self, addr: ClientId) -> Result<()> {
        let response = match self.store.list_files() {
            Ok(names) => Envelope::file_list(&names),
            Err(e) => {
                warn!("파일 목록 조회 실패: {}", e);
                Envelope::error(FILE_UNAVAILABLE_MESSAGE)
            }
        };
        self.transport.send_to(&response.encode(), addr).await?;
        Ok(())
    }

    async fn handle_file_request(&self, file_name: &str, addr: ClientId) -> Result<()> {
        let data = match self.store.read_file(file_name) {
            Ok(data) => data,
            Err(Error::FileNotFound { name }) => {
                info!("파일 없음: {} (요청: {})", name, addr);
                let response = Envelope::error(FILE_NOT_FOUND_MESSAGE);
                self.transport.send_to(&response.encode(), addr).await?;
                return Ok(());
            }
            Err(e) => {
                warn!("파일 읽기 실패 {}: {}", file_name, e);
                let response = Envelope::error(FILE_UNAVAILABLE_MESSAGE);
                self.transport.send_to(&response.encode(), addr).await?;
                return Ok(());
            }
        };

        self.scheduler
            .start_transfer(&*self.transport, addr, file_name, data, Instant::now())
            .await;
        Ok(())
    }

    /// 정지
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 통계 반환
    pub fn get_stats(&self) -> TransferStats {
        self.stats.read().clone()
    }

    /// 활성 세션 수
    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

/// 다음 burst 묶음까지 대기
async fn pace(pacer: &mut Option<Interval>) {
    match pacer {
        Some(pacer) => {
            pacer.tick().await;
        }
        None => tokio::task::yield_now().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::DirectoryStore;
    use crate::transport::testing::RecordingTransport;

    fn server_with_files() -> (tempfile::TempDir, Server<RecordingTransport, DirectoryStore>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("three.bin"), vec![5u8; 3000]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

        let config = Config {
            chunk_size: 1000,
            ..Config::default()
        };
        let server = Server::new(
            config,
            Arc::new(RecordingTransport::new()),
            DirectoryStore::new(dir.path()),
        )
        .unwrap();
        (dir, server)
    }

    fn peer() -> ClientId {
        "127.0.0.1:7000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_list_files_reply() {
        let (_dir, server) = server_with_files();
        server
            .handle_datagram(&Envelope::list_files().encode(), peer())
            .await
            .unwrap();

        let sent = server.transport.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, peer());
        assert_eq!(sent[0].1.kind, MessageKind::FileList);
        assert_eq!(sent[0].1.file_names().unwrap(), vec!["notes.txt", "three.bin"]);
    }

    #[tokio::test]
    async fn test_file_request_starts_session() {
        let (_dir, server) = server_with_files();
        server
            .handle_datagram(&Envelope::file_request("three.bin").encode(), peer())
            .await
            .unwrap();

        // 요청 처리 자체는 헤더만 보내고, 청크는 루프의 burst 묶음으로 나감
        assert_eq!(server.transport.take_kinds(), vec![(MessageKind::FileHeader, 0)]);
        assert_eq!(server.active_sessions(), 1);

        let sent = server
            .scheduler
            .send_unsent(&*server.transport, Instant::now())
            .await;
        assert_eq!(sent, 3);
        assert_eq!(server.transport.take_kinds().len(), 3);

        server
            .handle_datagram(&Envelope::ack(1, "three.bin").encode(), peer())
            .await
            .unwrap();
        let session = server.registry().get(&peer()).unwrap();
        assert!(session.outstanding(1).unwrap().acknowledged);
        assert!(server.transport.take().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_gets_single_error() {
        let (_dir, server) = server_with_files();
        server
            .handle_datagram(&Envelope::file_request("nope.txt").encode(), peer())
            .await
            .unwrap();

        let sent = server.transport.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.kind, MessageKind::Error);
        assert_eq!(sent[0].1.payload, FILE_NOT_FOUND_MESSAGE);
        assert_eq!(server.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_malformed_and_stale_messages_are_silent() {
        let (_dir, server) = server_with_files();

        server.handle_datagram(b"", peer()).await.unwrap();
        server.handle_datagram(b"{garbage", peer()).await.unwrap();
        // 세션 없는 ACK
        server
            .handle_datagram(&Envelope::ack(5, "").encode(), peer())
            .await
            .unwrap();

        assert!(server.transport.take().is_empty());
        assert_eq!(server.active_sessions(), 0);
        let stats = server.get_stats();
        assert_eq!(stats.dropped_messages, 2);
        assert_eq!(stats.ignored_acks, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = Config {
            chunk_size: 0,
            ..Config::default()
        };
        let result = Server::new(
            config,
            Arc::new(RecordingTransport::new()),
            DirectoryStore::new("."),
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_run_serves_acks_and_other_clients_during_paced_burst() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.bin"), vec![7u8; 5000]).unwrap();

        // 50 청크 x 20ms: burst 하나에 약 1초
        let config = Config {
            chunk_size: 100,
            chunk_interval_us: 20_000,
            retry_interval_ms: 1000,
            ..Config::default()
        };
        let server = Server::bind(
            config,
            "127.0.0.1:0".parse().unwrap(),
            DirectoryStore::new(dir.path()),
        )
        .await
        .unwrap();
        let server = Arc::new(server);
        let server_addr = server.local_addr().unwrap();
        let running = server.clone();
        tokio::spawn(async move { running.run().await });

        let downloader = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let lister = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let downloader_addr = downloader.local_addr().unwrap();

        downloader
            .send_to(&Envelope::file_request("big.bin").encode(), server_addr)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let asked_at = Instant::now();
        downloader
            .send_to(&Envelope::ack(0, "big.bin").encode(), server_addr)
            .await
            .unwrap();
        lister
            .send_to(&Envelope::list_files().encode(), server_addr)
            .await
            .unwrap();

        let mut buf = vec![0u8; 65535];
        let (len, _) = tokio::time::timeout(Duration::from_millis(500), lister.recv_from(&mut buf))
            .await
            .expect("list reply while burst is running")
            .unwrap();
        assert!(asked_at.elapsed() < Duration::from_millis(500));
        let reply = Envelope::decode(&buf[..len]).unwrap();
        assert_eq!(reply.kind, MessageKind::FileList);
        assert_eq!(reply.file_names().unwrap(), vec!["big.bin"]);

        // ACK는 목록 요청보다 먼저 도착했으므로 이미 반영됨. burst는 아직 진행 중
        assert!(server.is_running());
        {
            let session = server.registry().get(&downloader_addr).unwrap();
            assert!(session.outstanding(0).unwrap().acknowledged);
            assert!(session.has_unsent());
        }
        assert_eq!(server.get_stats().acks_recorded, 1);

        server.stop();
    }
}
