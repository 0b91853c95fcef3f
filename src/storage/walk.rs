use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// Sums the sizes of all regular files under `root`.
///
/// Iterative: directories waiting to be visited live on an explicit stack.
///
/// Entries that vanish mid-walk count as 0.
/// A missing `root` is 0 bytes. Symlinks are not followed.
pub fn dir_size(root: &Path) -> io::Result<u64> {
    let meta = match fs::symlink_metadata(root) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    if meta.is_file() {
        return Ok(meta.len());
    }
    if !meta.is_dir() {
        return Ok(0);
    }

    let mut total = 0u64;
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        for entry in entries {
            let entry = entry?;
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };

            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                match entry.metadata() {
                    Ok(meta) => total += meta.len(),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a").join("b").join("c");
        fs::create_dir_all(&deep).unwrap();
        fs::write(dir.path().join("top.json"), [0u8; 10]).unwrap();
        fs::write(deep.join("leaf.json"), [0u8; 32]).unwrap();
        fs::write(dir.path().join("a").join("mid.json"), [0u8; 5]).unwrap();

        assert_eq!(dir_size(dir.path()).unwrap(), 47);
        assert_eq!(dir_size(&dir.path().join("a")).unwrap(), 37);
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(dir_size(&dir.path().join("nope")).unwrap(), 0);
    }

    #[test]
    fn plain_file_root_is_its_length() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("one.json");
        fs::write(&file, b"{}").unwrap();
        assert_eq!(dir_size(&file).unwrap(), 2);
    }
}
