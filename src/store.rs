//! 파일 저장소
//!
//! 코어가 쓰는 외부 협력자: 목록 조회와 파일 내용 읽기 (동기)

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::{Error, Result};

/// 전송 가능한 파일 제공자
pub trait FileSource: Send + Sync {
    /// 이름순 파일 목록
    fn list_files(&self) -> Result<Vec<String>>;

    /// 파일 내용. 없으면 `Error::FileNotFound`
    fn read_file(&self, name: &str) -> Result<Bytes>;
}

/// 디렉터리 하나를 노출하는 저장소 (하위 디렉터리 제외)
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 루트 밖을 가리키거나 경로 구분자가 있는 이름은 거부
    fn is_plain_name(name: &str) -> bool {
        !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0'])
    }
}

impl FileSource for DirectoryStore {
    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_file(&self, name: &str) -> Result<Bytes> {
        let not_found = || Error::FileNotFound {
            name: name.to_string(),
        };

        if !Self::is_plain_name(name) {
            return Err(not_found());
        }

        let path = self.root.join(name);
        if !path.is_file() {
            return Err(not_found());
        }

        match std::fs::read(&path) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(e.into()),
        }
    }
}
