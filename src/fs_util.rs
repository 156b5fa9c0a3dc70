use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use tempfile::Builder;

use crate::error::PrepError;

pub fn write_bytes_atomic(path: &Path, content: &[u8]) -> Result<(), PrepError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|err| PrepError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".sra-prep")
        .tempfile_in(&parent)
        .map_err(|err| PrepError::Filesystem(err.to_string()))?;
    io::Write::write_all(&mut temp, content)
        .map_err(|err| PrepError::Filesystem(format!("write {}: {err}", path.display())))?;
    temp.persist(path)
        .map_err(|err| PrepError::Filesystem(format!("persist {}: {err}", path.display())))?;
    Ok(())
}

/// Streams a gzip file (including multi-member bgzip output) to the end.
pub fn validate_gzip(path: &Path) -> Result<u64, PrepError> {
    let file = fs::File::open(path)
        .map_err(|err| PrepError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(file));
    io::copy(&mut decoder, &mut io::sink())
        .map_err(|err| PrepError::Filesystem(format!("{}: {err}", path.display())))
}

/// Lists regular files under `root`; descends into subdirectories when `recursive`.
pub fn list_files(root: &Path, recursive: bool) -> Result<Vec<PathBuf>, PrepError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path)
            .map_err(|err| PrepError::Filesystem(format!("read {}: {err}", path.display())))?;
        for entry in entries {
            let entry = entry.map_err(|err| PrepError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                if recursive {
                    stack.push(path);
                }
            } else {
                items.push(path);
            }
        }
    }
    items.sort();
    Ok(items)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    #[test]
    fn atomic_write_creates_parent() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("out").join("table.txt");
        write_bytes_atomic(&path, b"a\tb\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\tb\n");
    }

    #[test]
    fn gzip_validation_detects_truncation() {
        let temp = tempfile::tempdir().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(b"@r1\nACGT\n+\nIIII\n".repeat(200).as_slice())
            .unwrap();
        let bytes = encoder.finish().unwrap();

        let good = temp.path().join("good.fastq.gz");
        fs::write(&good, &bytes).unwrap();
        assert!(validate_gzip(&good).unwrap() > 0);

        let bad = temp.path().join("bad.fastq.gz");
        fs::write(&bad, &bytes[..bytes.len() / 2]).unwrap();
        assert!(validate_gzip(&bad).is_err());
    }

    #[test]
    fn list_files_respects_recursion() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("nested")).unwrap();
        fs::write(temp.path().join("a.fastq"), b"").unwrap();
        fs::write(temp.path().join("nested").join("b.fastq"), b"").unwrap();

        assert_eq!(list_files(temp.path(), false).unwrap().len(), 1);
        assert_eq!(list_files(temp.path(), true).unwrap().len(), 2);
    }
}
