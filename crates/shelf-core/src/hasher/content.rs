use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

const READ_CHUNK: usize = 64 * 1024;

/// Hex MD5 of a file's full content, read in chunks.
pub fn content_hash(file: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(file)?);
    let mut hasher = Md5::new();

    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let count = reader.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hash_depends_on_content_only() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("renamed.bin");
        File::create(&a).unwrap().write_all(b"same bytes").unwrap();
        File::create(&b).unwrap().write_all(b"same bytes").unwrap();

        let ha = content_hash(&a).unwrap();
        assert_eq!(ha, content_hash(&b).unwrap());
        assert_eq!(ha.len(), 32);
    }

    #[test]
    fn empty_file_has_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty");
        File::create(&empty).unwrap();
        assert_eq!(content_hash(&empty).unwrap(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(content_hash(Path::new("/definitely/not/here.bin")).is_err());
    }
}
