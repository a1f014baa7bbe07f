use std::path::PathBuf;
use thiserror::Error;

/// Errors from listing a directory's immediate children.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("No such directory: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("IO error on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ListError {
    /// Map an `io::Error` from read_dir/metadata onto the listing taxonomy.
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

/// Errors from requesting or running an external transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("No items selected")]
    NoSources,

    #[error("Destination {} is inside source {}", .dest.display(), .source_path.display())]
    InvalidTarget { source_path: PathBuf, dest: PathBuf },

    #[error("A transfer is already running")]
    Busy,

    #[error("Failed to launch {tool}: {source}")]
    LaunchFailed {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}
