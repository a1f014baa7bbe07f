use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::SystemTime;

use tracing::{debug, warn};

/// Completed size computation, pushed to the main loop's channel.
#[derive(Debug, Clone)]
pub struct SizeUpdate {
    pub path: PathBuf,
    pub size: u64,
    /// True when a permission error cut the walk short; `size` is a lower bound.
    pub partial: bool,
}

/// Result of asking the aggregator for a directory size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeLookup {
    /// Fresh cache hit. The flag marks a partial (lower-bound) result.
    Known(u64, bool),
    /// A background computation is in flight (scheduled now or earlier).
    Calculating,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    size: u64,
    partial: bool,
    source_mtime: Option<SystemTime>,
    #[allow(dead_code)] // kept for diagnostics
    computed_at: SystemTime,
}

enum Slot {
    InFlight,
    Done(CacheEntry),
}

/// Process-wide recursive directory size cache.
///
/// Reads happen from the main loop; writes happen only on worker threads,
/// both through one mutex. A path has at most one in-flight computation;
/// further requests for it observe [`SizeLookup::Calculating`] instead of
/// duplicating work. Entries go stale when the directory's own mtime moves
/// past the mtime captured at computation time.
pub struct SizeCache {
    slots: Arc<Mutex<HashMap<PathBuf, Slot>>>,
    tx: Sender<SizeUpdate>,
}

impl SizeCache {
    /// Create the cache plus the receiver the main loop drains for updates.
    pub fn new() -> (Self, Receiver<SizeUpdate>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                slots: Arc::new(Mutex::new(HashMap::new())),
                tx,
            },
            rx,
        )
    }

    /// Request the recursive size of `path`, scheduling a background
    /// computation when no fresh entry exists.
    pub fn request(&self, path: &Path) -> SizeLookup {
        let mtime = dir_mtime(path);

        {
            let mut slots = match self.slots.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            match slots.get(path) {
                Some(Slot::InFlight) => return SizeLookup::Calculating,
                Some(Slot::Done(entry)) if is_fresh(entry, mtime) => {
                    return SizeLookup::Known(entry.size, entry.partial);
                }
                _ => {}
            }
            slots.insert(path.to_path_buf(), Slot::InFlight);
        }

        self.spawn_worker(path.to_path_buf(), mtime);
        SizeLookup::Calculating
    }

    fn spawn_worker(&self, path: PathBuf, source_mtime: Option<SystemTime>) {
        let slots = Arc::clone(&self.slots);
        let tx = self.tx.clone();

        thread::spawn(move || {
            debug!(path = %path.display(), "size computation started");
            let (size, partial) = walk_tree(&path);
            if partial {
                warn!(path = %path.display(), size, "size computation was cut short");
            } else {
                debug!(path = %path.display(), size, "size computation finished");
            }

            {
                let mut slots = match slots.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                slots.insert(
                    path.clone(),
                    Slot::Done(CacheEntry {
                        size,
                        partial,
                        source_mtime,
                        computed_at: SystemTime::now(),
                    }),
                );
            }

            // Receiver gone means the app is shutting down
            let _ = tx.send(SizeUpdate {
                path,
                size,
                partial,
            });
        });
    }
}

fn dir_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn is_fresh(entry: &CacheEntry, current_mtime: Option<SystemTime>) -> bool {
    match (entry.source_mtime, current_mtime) {
        (Some(recorded), Some(current)) => current <= recorded,
        // Without mtimes to compare, recompute
        _ => false,
    }
}

/// Depth-first recursive size, never following symlinks. Unreadable
/// subdirectories flip the partial flag; the sum so far is retained.
fn walk_tree(path: &Path) -> (u64, bool) {
    let mut total: u64 = 0;
    let mut partial = false;

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(_) => return (0, true),
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let Ok(metadata) = fs::symlink_metadata(entry.path()) else {
            partial = true;
            continue;
        };

        if metadata.is_symlink() {
            // Symlinks are counted as zero to avoid cycles and double counting
            continue;
        } else if metadata.is_dir() {
            let (sub_total, sub_partial) = walk_tree(&entry.path());
            total += sub_total;
            partial |= sub_partial;
        } else {
            total += metadata.len();
        }
    }

    (total, partial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::time::Duration;

    fn write_file(path: &Path, len: usize) {
        let mut f = File::create(path).unwrap();
        f.write_all(&vec![0u8; len]).unwrap();
    }

    fn build_tree(root: &Path) -> u64 {
        fs::create_dir(root.join("a")).unwrap();
        fs::create_dir(root.join("a/b")).unwrap();
        write_file(&root.join("top.bin"), 100);
        write_file(&root.join("a/mid.bin"), 250);
        write_file(&root.join("a/b/deep.bin"), 12);
        362
    }

    #[test]
    fn test_walk_tree_sums_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let expected = build_tree(dir.path());
        let (size, partial) = walk_tree(dir.path());
        assert_eq!(size, expected);
        assert!(!partial);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_tree_skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let expected = build_tree(dir.path());
        // A cycle back to the root must not loop or add size
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();
        let (size, partial) = walk_tree(dir.path());
        assert_eq!(size, expected);
        assert!(!partial);
    }

    #[test]
    fn test_request_calculates_then_caches() {
        let dir = tempfile::tempdir().unwrap();
        let expected = build_tree(dir.path());

        let (cache, rx) = SizeCache::new();
        assert_eq!(cache.request(dir.path()), SizeLookup::Calculating);

        let update = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(update.size, expected);
        assert!(!update.partial);

        // Idempotent from here on: same known value, no recomputation
        assert_eq!(cache.request(dir.path()), SizeLookup::Known(expected, false));
        assert_eq!(cache.request(dir.path()), SizeLookup::Known(expected, false));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_requests_coalesce() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());

        let (cache, rx) = SizeCache::new();
        assert_eq!(cache.request(dir.path()), SizeLookup::Calculating);
        // Second request while in flight observes the first computation
        assert_eq!(cache.request(dir.path()), SizeLookup::Calculating);

        // Exactly one update arrives
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_mtime_change_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let expected = build_tree(dir.path());

        let (cache, rx) = SizeCache::new();
        cache.request(dir.path());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(cache.request(dir.path()), SizeLookup::Known(expected, false));

        // Grow the tree; the directory mtime moves forward
        std::thread::sleep(Duration::from_millis(50));
        write_file(&dir.path().join("new.bin"), 40);

        assert_eq!(cache.request(dir.path()), SizeLookup::Calculating);
        let update = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(update.size, expected + 40);
    }

}
