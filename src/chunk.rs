//! 청크 정의
//!
//! - Chunk: 파일 바이트의 불변 조각 (최대 `chunk_size` 바이트)
//! - ChunkEncoder: 송신측 분할기
//! - ChunkAssembler: 수신측 조립기

use bytes::{Bytes, BytesMut};

use crate::{Error, Result};

/// 청크 인덱스 (파일 내 순서, 0부터)
pub type PartIndex = u32;

/// 청크 (송신 단위)
///
/// 원본 파일 `Bytes`의 슬라이스이므로 복제 비용이 낮음
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 청크 인덱스
    pub index: PartIndex,

    /// 실제 데이터
    pub data: Bytes,
}

impl Chunk {
    pub fn new(index: PartIndex, data: Bytes) -> Self {
        Self { index, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 청크 분할기 (송신측)
#[derive(Debug, Clone)]
pub struct ChunkEncoder {
    chunk_size: usize,
}

impl ChunkEncoder {
    /// `chunk_size`는 0보다 커야 함
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size는 0보다 커야 함".into()));
        }
        Ok(Self { chunk_size })
    }

    /// 파일 크기에 대한 청크 수 (`ceil(len / chunk_size)`)
    pub fn total_chunks(&self, len: usize) -> u32 {
        len.div_ceil(self.chunk_size) as u32
    }

    /// 데이터를 순서대로 청크 분할
    ///
    /// 같은 입력에 대해 항상 같은 청크를 만든다. 빈 입력은 빈 목록.
    pub fn split(&self, data: &Bytes) -> Vec<Chunk> {
        (0..data.len())
            .step_by(self.chunk_size)
            .enumerate()
            .map(|(idx, offset)| {
                let end = (offset + self.chunk_size).min(data.len());
                Chunk::new(idx as PartIndex, data.slice(offset..end))
            })
            .collect()
    }
}

/// 청크 조립기 (수신측)
#[derive(Debug)]
pub struct ChunkAssembler {
    /// 인덱스별 수신 데이터
    parts: Vec<Option<Bytes>>,

    /// 수신된 청크 수
    received_count: u32,

    /// 중복 수신 청크 수
    pub duplicate_count: u32,
}

impl ChunkAssembler {
    pub fn new(total_chunks: u32) -> Self {
        Self {
            parts: vec![None; total_chunks as usize],
            received_count: 0,
            duplicate_count: 0,
        }
    }

    pub fn total_chunks(&self) -> u32 {
        self.parts.len() as u32
    }

    pub fn received_count(&self) -> u32 {
        self.received_count
    }

    /// 청크 삽입. 새 청크면 true
    pub fn insert(&mut self, index: PartIndex, data: Bytes) -> bool {
        let slot = match self.parts.get_mut(index as usize) {
            Some(slot) => slot,
            None => return false,
        };

        // 이미 받은 청크면 무시
        if slot.is_some() {
            self.duplicate_count += 1;
            return false;
        }

        *slot = Some(data);
        self.received_count += 1;
        true
    }

    /// 완료 여부 확인
    pub fn is_complete(&self) -> bool {
        self.received_count as usize == self.parts.len()
    }

    /// 누락된 청크 인덱스 목록
    pub fn missing_parts(&self) -> Vec<PartIndex> {
        self.parts
            .iter()
            .enumerate()
            .filter(|(_, part)| part.is_none())
            .map(|(idx, _)| idx as PartIndex)
            .collect()
    }

    /// 인덱스 순서로 이어붙인 데이터. 누락이 있으면 에러
    pub fn into_bytes(self) -> Result<Bytes> {
        if !self.is_complete() {
            return Err(Error::ChunksMissing {
                missing_count: self.parts.len() - self.received_count as usize,
                total_chunks: self.total_chunks(),
            });
        }

        let total_len = self.parts.iter().flatten().map(Bytes::len).sum();
        let mut data = BytesMut::with_capacity(total_len);
        for part in self.parts.into_iter().flatten() {
            data.extend_from_slice(&part);
        }
        Ok(data.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_counts() {
        let encoder = ChunkEncoder::new(1000).unwrap();

        for (size, expected) in [(0usize, 0u32), (1, 1), (999, 1), (1000, 1), (1001, 2), (3000, 3)] {
            let data = Bytes::from(vec![7u8; size]);
            let chunks = encoder.split(&data);
            assert_eq!(chunks.len() as u32, expected, "size {}", size);
            assert_eq!(encoder.total_chunks(size), expected);
        }
    }

    #[test]
    fn test_last_chunk_is_short() {
        let encoder = ChunkEncoder::new(100).unwrap();
        let data: Bytes = (0..250u32).map(|i| i as u8).collect::<Vec<_>>().into();
        let chunks = encoder.split(&data);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[2].len(), 50);
        assert_eq!(chunks[2].index, 2);
    }

    #[test]
    fn test_split_is_deterministic() {
        let encoder = ChunkEncoder::new(64).unwrap();
        let data = Bytes::from((0..1000u32).map(|i| (i * 31 % 251) as u8).collect::<Vec<_>>());

        assert_eq!(encoder.split(&data), encoder.split(&data));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(ChunkEncoder::new(0).is_err());
    }

    #[test]
    fn test_reassembly_out_of_order() {
        let encoder = ChunkEncoder::new(7).unwrap();
        let data = Bytes::from_static(b"the quick brown fox jumps over the lazy dog");
        let chunks = encoder.split(&data);

        let mut assembler = ChunkAssembler::new(chunks.len() as u32);
        for chunk in chunks.iter().rev() {
            assert!(assembler.insert(chunk.index, chunk.data.clone()));
        }
        // 중복
        assert!(!assembler.insert(0, chunks[0].data.clone()));
        assert_eq!(assembler.duplicate_count, 1);

        assert!(assembler.is_complete());
        assert_eq!(assembler.into_bytes().unwrap(), data);
    }

    #[test]
    fn test_missing_parts_reported() {
        let mut assembler = ChunkAssembler::new(3);
        assembler.insert(0, Bytes::from_static(b"a"));
        assembler.insert(2, Bytes::from_static(b"c"));
        assert!(!assembler.insert(3, Bytes::from_static(b"d")));

        assert_eq!(assembler.missing_parts(), vec![1]);
        match assembler.into_bytes() {
            Err(Error::ChunksMissing {
                missing_count,
                total_chunks,
            }) => {
                assert_eq!(missing_count, 1);
                assert_eq!(total_chunks, 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_empty_assembler_is_complete() {
        let assembler = ChunkAssembler::new(0);
        assert!(assembler.is_complete());
        assert!(assembler.into_bytes().unwrap().is_empty());
    }
}
