use md5::{Digest, Md5};
use sha2::Sha256;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::Result;

/// Content hashes for one file. sha256 is the library's dedup key;
/// md5 is kept for interoperability with external tooling.
#[derive(Debug, Clone)]
pub struct HashResult {
    pub md5: String,
    pub sha256: String,
}

/// Stream the file once through both hashers.
pub fn calculate_hashes(path: &Path) -> Result<HashResult> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut md5_hasher = Md5::new();
    let mut sha256_hasher = Sha256::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        md5_hasher.update(&buffer[..bytes_read]);
        sha256_hasher.update(&buffer[..bytes_read]);
    }

    Ok(HashResult {
        md5: format!("{:x}", md5_hasher.finalize()),
        sha256: format!("{:x}", sha256_hasher.finalize()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn identical_content_hashes_identically() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let c = dir.path().join("c.bin");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();
        std::fs::write(&c, b"other bytes").unwrap();

        let ha = calculate_hashes(&a).unwrap();
        let hb = calculate_hashes(&b).unwrap();
        let hc = calculate_hashes(&c).unwrap();

        assert_eq!(ha.sha256, hb.sha256);
        assert_eq!(ha.md5, hb.md5);
        assert_ne!(ha.sha256, hc.sha256);
        assert_eq!(ha.sha256.len(), 64);
        assert_eq!(ha.md5.len(), 32);
    }
}
