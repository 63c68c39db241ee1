//! 데이터그램 전송 추상화
//!
//! 서버 루프가 소유. 코어는 이 trait으로만 송수신함

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// 비연결형 데이터그램 송수신
pub trait Transport: Send + Sync {
    /// 데이터그램 하나 송신. 완료 결과는 기록용으로만 사용
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send;

    /// 데이터그램 하나 수신
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Transport for UdpSocket {
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send {
        UdpSocket::send_to(self, buf, target)
    }

    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send {
        UdpSocket::recv_from(self, buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! 테스트용 기록 transport

    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::message::{Envelope, MessageKind};

    /// 보낸 데이터그램을 기록. `fail_sends`가 켜지면 모든 송신 실패
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
        fail_sends: AtomicBool,
    }

    impl RecordingTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn set_failing(&self, failing: bool) {
            self.fail_sends.store(failing, Ordering::SeqCst);
        }

        /// 기록된 봉투를 꺼냄 (기록 비움)
        pub(crate) fn take(&self) -> Vec<(SocketAddr, Envelope)> {
            self.sent
                .lock()
                .drain(..)
                .map(|(addr, bytes)| (addr, Envelope::decode(&bytes).unwrap()))
                .collect()
        }

        pub(crate) fn take_kinds(&self) -> Vec<(MessageKind, u32)> {
            self.take()
                .into_iter()
                .map(|(_, envelope)| (envelope.kind, envelope.part))
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn send_to(
            &self,
            buf: &[u8],
            target: SocketAddr,
        ) -> impl Future<Output = io::Result<usize>> + Send {
            let result = if self.fail_sends.load(Ordering::SeqCst) {
                Err(io::Error::new(io::ErrorKind::Other, "send disabled"))
            } else {
                self.sent.lock().push((target, buf.to_vec()));
                Ok(buf.len())
            };
            std::future::ready(result)
        }

        fn recv_from(
            &self,
            _buf: &mut [u8],
        ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send {
            std::future::pending()
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
        }
    }
}
