use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::Result;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use cfbs_core::module::is_commit_hash;
use cfbs_core::CfbsError;

const CHUNK_SIZE: usize = 512 * 1024;

enum Hasher {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl Hasher {
    /// Picks the algorithm from the length of the expected digest.
    fn for_checksum(checksum: Option<&str>) -> Result<Self, CfbsError> {
        match checksum {
            None => Ok(Self::Sha1(Sha1::new())),
            Some(c) if is_commit_hash(c) && c.len() == 40 => Ok(Self::Sha1(Sha1::new())),
            Some(c) if is_commit_hash(c) => Ok(Self::Sha256(Sha256::new())),
            Some(c) => Err(CfbsError::Fetch(format!(
                "Invalid checksum or unsupported checksum algorithm: '{c}'"
            ))),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    fn finish(self) -> String {
        match self {
            Self::Sha1(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

fn open_source(url: &str) -> Result<Box<dyn Read + Send + Sync>, CfbsError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        let response = ureq::get(url)
            .call()
            .map_err(|e| CfbsError::Fetch(format!("Failed to fetch '{url}': {e}")))?;
        return Ok(response.into_reader());
    }
    let path = url.strip_prefix("file://").unwrap_or(url);
    let file = File::open(path)
        .map_err(|e| CfbsError::Fetch(format!("Failed to fetch '{url}': {e}")))?;
    Ok(Box::new(file))
}

fn copy_hashed(url: &str, target: &Path, hasher: &mut Hasher) -> Result<(), CfbsError> {
    let mut source = open_source(url)?;
    let io_error =
        |e: std::io::Error| CfbsError::Fetch(format!("Failed to fetch '{url}' to '{}': {e}", target.display()));
    let mut out = File::create(target).map_err(io_error)?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = source.read(&mut buffer).map_err(io_error)?;
        if read == 0 {
            break;
        }
        out.write_all(&buffer[..read]).map_err(io_error)?;
        hasher.update(&buffer[..read]);
    }
    Ok(())
}

/// Downloads `url` to `target` and returns the hex digest of the content.
///
/// With a `checksum`, the digest must match it or the file is removed and a
/// [`CfbsError::Fetch`] is returned.
#[instrument(skip(target))]
pub fn fetch_url(url: &str, target: &Path, checksum: Option<&str>) -> Result<String> {
    let mut hasher = Hasher::for_checksum(checksum)?;
    if let Err(e) = copy_hashed(url, target, &mut hasher) {
        let _ = std::fs::remove_file(target);
        return Err(e.into());
    }
    let digest = hasher.finish();
    debug!("fetched {url} with digest {digest}");

    match checksum {
        Some(expected) if expected != digest => {
            let _ = std::fs::remove_file(target);
            Err(CfbsError::Fetch(format!(
                "Checksum mismatch in fetched '{url}': {digest} != {expected}"
            ))
            .into())
        }
        _ => Ok(digest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Digests of the bytes "hello\n".
    const HELLO_SHA1: &str = "f572d396fae9206628714fb2ce00f72e94f2258f";
    const HELLO_SHA256: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    fn source() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, "hello\n").unwrap();
        let url = format!("file://{}", path.display());
        (dir, url)
    }

    #[test]
    fn defaults_to_sha1() {
        let (dir, url) = source();
        let target = dir.path().join("copy");
        assert_eq!(fetch_url(&url, &target, None).unwrap(), HELLO_SHA1);
        assert_eq!(std::fs::read_to_string(target).unwrap(), "hello\n");
    }

    #[test]
    fn verifies_sha256_checksums() {
        let (dir, url) = source();
        let target = dir.path().join("copy");
        assert_eq!(
            fetch_url(&url, &target, Some(HELLO_SHA256)).unwrap(),
            HELLO_SHA256
        );
    }

    #[test]
    fn mismatch_removes_the_download() {
        let (dir, url) = source();
        let target = dir.path().join("copy");
        let err = fetch_url(&url, &target, Some(&"0".repeat(40))).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
        assert!(!target.exists());
    }

    #[test]
    fn rejects_malformed_checksums() {
        let (dir, url) = source();
        let err = fetch_url(&url, &dir.path().join("copy"), Some("abc")).unwrap_err();
        assert!(err.to_string().contains("unsupported checksum algorithm"));
    }

    #[test]
    fn missing_source_is_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("copy");
        let err = fetch_url("file:///does/not/exist", &target, None).unwrap_err();
        assert!(matches!(err.downcast_ref::<CfbsError>(), Some(CfbsError::Fetch(_))));
        assert!(!target.exists());
    }
}
