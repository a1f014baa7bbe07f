use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use chrono::{DateTime, Local};

use crate::error::ListError;

/// Classification of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Executable,
}

/// Lifecycle of an entry's (possibly aggregated) size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeState {
    /// Size not requested yet (directories before the first footer request)
    Unknown,
    /// A background computation is in flight
    Calculating,
    /// Size is known and trusted
    Known,
    /// Computation hit a permission error; size is a lower bound
    Error,
}

/// One row of a panel listing. Recreated on every navigation.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
    pub size_state: SizeState,
    pub modified: DateTime<Local>,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// List the immediate children of `path`.
///
/// Symlinks are resolved for kind classification but listed under the link
/// name, and never followed further. Executables are non-directories with an
/// execute permission bit set. Ordering is directories first, then
/// case-insensitive alphabetical.
pub fn list(path: &Path) -> Result<Vec<Entry>, ListError> {
    // read_dir reports NotADirectory as a raw OS error on some platforms,
    // so classify explicitly before attempting the read.
    match fs::metadata(path) {
        Ok(meta) if !meta.is_dir() => {
            return Err(ListError::NotADirectory(path.to_path_buf()));
        }
        Err(e) => return Err(ListError::from_io(path, e)),
        _ => {}
    }

    let read = fs::read_dir(path).map_err(|e| ListError::from_io(path, e))?;

    let mut entries: Vec<Entry> = read
        .filter_map(|e| e.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            // fs::metadata follows symlinks, so a link to a directory
            // classifies as Directory while keeping the link name.
            let metadata = match fs::metadata(entry.path()) {
                Ok(m) => m,
                // Broken symlink: fall back to the link's own metadata
                Err(_) => fs::symlink_metadata(entry.path()).ok()?,
            };

            let kind = classify(&metadata);
            let size = if kind == EntryKind::Directory {
                None
            } else {
                Some(metadata.len())
            };
            let modified = metadata
                .modified()
                .ok()
                .map(DateTime::<Local>::from)
                .unwrap_or_else(Local::now);

            Some(Entry {
                name,
                kind,
                size,
                size_state: if kind == EntryKind::Directory {
                    SizeState::Unknown
                } else {
                    SizeState::Known
                },
                modified,
            })
        })
        .collect();

    entries.sort_by(compare_entries);
    Ok(entries)
}

fn classify(metadata: &fs::Metadata) -> EntryKind {
    if metadata.is_dir() {
        return EntryKind::Directory;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 != 0 {
            return EntryKind::Executable;
        }
    }

    EntryKind::File
}

/// Directories first, then case-insensitive by name.
fn compare_entries(a: &Entry, b: &Entry) -> Ordering {
    match (a.is_dir(), b.is_dir()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn touch(path: &Path, contents: &[u8]) {
        let mut f = File::create(path).unwrap();
        f.write_all(contents).unwrap();
    }

    #[test]
    fn test_list_orders_directories_first() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("zebra.txt"), b"z");
        touch(&dir.path().join("Apple.txt"), b"a");
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::create_dir(dir.path().join("Another")).unwrap();

        let entries = list(dir.path()).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Another", "sub", "Apple.txt", "zebra.txt"]);
    }

    #[test]
    fn test_list_file_sizes_known() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("bar.txt"), &[0u8; 120]);

        let entries = list(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, Some(120));
        assert_eq!(entries[0].size_state, SizeState::Known);
        assert_eq!(entries[0].kind, EntryKind::File);
    }

    #[test]
    fn test_list_directory_size_unknown() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let entries = list(dir.path()).unwrap();
        assert_eq!(entries[0].size, None);
        assert_eq!(entries[0].size_state, SizeState::Unknown);
    }

    #[test]
    fn test_list_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(list(&missing), Err(ListError::NotFound(_))));
    }

    #[test]
    fn test_list_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        touch(&file, b"x");
        assert!(matches!(list(&file), Err(ListError::NotADirectory(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_list_classifies_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        touch(&script, b"#!/bin/sh\n");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let entries = list(dir.path()).unwrap();
        assert_eq!(entries[0].kind, EntryKind::Executable);
    }

    #[cfg(unix)]
    #[test]
    fn test_list_symlink_keeps_link_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();

        let entries = list(dir.path()).unwrap();
        let alias = entries.iter().find(|e| e.name == "alias").unwrap();
        assert_eq!(alias.kind, EntryKind::Directory);
    }
}
