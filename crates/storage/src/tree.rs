//! Primitive recursive filesystem operations.
//!
//! [`TreeOps`] is a stateless collaborator that the storage strategy owns and
//! passes around explicitly. Every operation is async (`tokio::fs`), and is
//! atomic only at single-file granularity: tree-level integrity is
//! approximated by comparing source and destination after a copy.

use crate::error::{ErrorKind, Result};
use crate::ignore::{self, IgnoreOptions};
use async_stream::stream;
use futures::{Stream, TryStreamExt};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tracing::instrument;
use uuid::Uuid;

const TEMP_PATH: &str = "temp-res";
const TEMP_PREFIX: &str = "h5p-";

type EntryStream = Pin<Box<dyn Stream<Item = Result<Entry>> + Send>>;
type FileStream = Pin<Box<dyn Stream<Item = Result<PathBuf>> + Send>>;

/// A node discovered while walking a tree, relative to the walk root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Entry {
    Dir(PathBuf),
    File(PathBuf),
}

/// Recursive filesystem primitives: existence, delete, verified copy,
/// filtered copy, listing and leaf I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeOps;
impl TreeOps {
    pub fn new() -> Self {
        Self
    }

    /// Reports whether anything exists at `path`. A missing path is `false`,
    /// never an error.
    pub async fn exists(&self, path: &Path) -> Result<bool> {
        let path = absolute(path)?;
        Ok(fs::try_exists(&path).await.map_err(|e| ErrorKind::io(e, &path))?)
    }

    /// Recursively removes whatever is at `path`. Succeeds silently when
    /// there is nothing to remove, so calling it twice is harmless.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn delete(&self, path: &Path) -> Result<()> {
        let path = absolute(path)?;
        let metadata = match fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => exn::bail!(ErrorKind::io(e, &path)),
        };
        let removed = match metadata.is_dir() {
            true => fs::remove_dir_all(&path).await,
            false => fs::remove_file(&path).await,
        };
        match removed {
            Ok(()) => Ok(()),
            // Somebody else got there first; the end state is what we wanted.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => exn::bail!(ErrorKind::io(e, &path)),
        }
    }

    /// Recursively copies `from` into `to`, creating `to` and any
    /// intermediate directories.
    ///
    /// With `verify`, the destination is compared against the source
    /// afterwards and the result says whether they are identical (same
    /// directories, same files, same bytes). Without it the result is always
    /// `true` once the copy completes.
    ///
    /// The first I/O failure aborts the copy and is returned as an error.
    /// Whatever was already written stays in place; cleaning up is the
    /// caller's decision.
    #[instrument(skip_all, fields(from = %from.display(), to = %to.display()))]
    pub async fn copy(&self, from: &Path, to: &Path, verify: bool) -> Result<bool> {
        let (from, to) = (absolute(from)?, absolute(to)?);
        let metadata = fs::metadata(&from).await.map_err(|e| ErrorKind::io(e, &from))?;
        if metadata.is_file() {
            self.copy_file(&from, &to).await?;
        } else {
            fs::create_dir_all(&to).await.map_err(|e| ErrorKind::io(e, &to))?;
            let mut entries = Self::entries(from.clone());
            let mut files = 0usize;
            while let Some(entry) = entries.try_next().await? {
                match entry {
                    Entry::Dir(relative) => {
                        let target = to.join(relative);
                        fs::create_dir_all(&target).await.map_err(|e| ErrorKind::io(e, &target))?;
                    },
                    Entry::File(relative) => {
                        self.copy_file(&from.join(&relative), &to.join(&relative)).await?;
                        files += 1;
                    },
                }
            }
            tracing::debug!(files, "Copied tree");
        }
        match verify {
            true => self.identical(&from, &to).await,
            false => Ok(true),
        }
    }

    /// Copies only the files under `from` that survive the ignore filter,
    /// preserving their relative paths, then checks that the set of files
    /// under `to` is exactly the allowed set.
    ///
    /// A missing source cannot be copied intact and reports `false`.
    #[instrument(skip_all, fields(from = %from.display(), to = %to.display()))]
    pub async fn filtered_copy(&self, from: &Path, to: &Path, options: &IgnoreOptions) -> Result<bool> {
        let (from, to) = (absolute(from)?, absolute(to)?);
        if !self.exists(&from).await? {
            tracing::warn!("Source of filtered copy does not exist");
            return Ok(false);
        }
        let filtered = ignore::compute_allowed(self, &from, options).await?;
        fs::create_dir_all(&to).await.map_err(|e| ErrorKind::io(e, &to))?;
        for relative in &filtered.allowed {
            self.copy_file(&from.join(relative), &to.join(relative)).await?;
        }

        let expected: HashSet<&PathBuf> = filtered.allowed.iter().collect();
        let present = self.list_files_recursive(&to).await?;
        let matches = present.len() == expected.len() && present.iter().all(|p| expected.contains(p));
        if !matches {
            tracing::warn!(expected = expected.len(), present = present.len(), "Filtered copy does not match allowed files");
        }
        Ok(matches)
    }

    /// Idempotent recursive directory creation.
    pub async fn ensure_dir(&self, path: &Path) -> Result<()> {
        Ok(fs::create_dir_all(path).await.map_err(|e| ErrorKind::io(e, path))?)
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path).await.map_err(|e| ErrorKind::io(e, path))?)
    }

    /// Reads a UTF-8 text file.
    pub async fn read_text(&self, path: &Path) -> Result<String> {
        let bytes = self.read(path).await?;
        Ok(String::from_utf8(bytes).map_err(|e| ErrorKind::Encoding(format!("{}: {e}", path.display())))?)
    }

    /// Writes `data` to `path`, creating parent directories as needed.
    pub async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::io(e, parent))?;
        }
        Ok(fs::write(path, data).await.map_err(|e| ErrorKind::io(e, path))?)
    }

    pub async fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        self.write(path, content.as_bytes()).await
    }

    /// Copies a single file, creating the destination's parent directories.
    pub async fn copy_file(&self, source: &Path, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::io(e, parent))?;
        }
        if let Err(e) = fs::copy(source, target).await {
            // fs::copy doesn't say which end failed; blame the target only
            // when the source is readable.
            let path = match fs::File::open(source).await {
                Ok(_) => target,
                Err(_) => source,
            };
            exn::bail!(ErrorKind::io(e, path));
        }
        Ok(())
    }

    /// Streams every file under `root` as a path relative to `root`.
    /// Directories are walked but not yielded; a missing root yields nothing.
    pub fn walk(&self, root: impl Into<PathBuf>) -> FileStream {
        let mut entries = Self::entries(root.into());
        Box::pin(stream! {
            while let Some(entry) = entries.try_next().await.transpose() {
                match entry {
                    Ok(Entry::File(relative)) => yield Ok(relative),
                    Ok(Entry::Dir(_)) => {},
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    /// Every file under `root`, relative to `root`, sorted.
    pub async fn list_files_recursive(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = self.walk(root).try_collect().await?;
        files.sort();
        Ok(files)
    }

    /// `<base>/temp-res/h5p-/<unique token>`. The directory is not created.
    pub fn temp_path(&self, base: &Path) -> PathBuf {
        base.join(TEMP_PATH).join(TEMP_PREFIX).join(Uuid::new_v4().to_string())
    }

    /// Whether a file can be created inside the directory at `path`.
    pub async fn is_writable(&self, path: &Path) -> bool {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || tempfile::Builder::new().prefix(".writable-").tempfile_in(&path).is_ok())
            .await
            .unwrap_or(false)
    }

    /// Compares two trees: same directories and files by relative path, and
    /// for every file the same size and BLAKE3 digest.
    async fn identical(&self, left: &Path, right: &Path) -> Result<bool> {
        if fs::metadata(left).await.map_err(|e| ErrorKind::io(e, left))?.is_file() {
            return Self::same_file(left, right).await;
        }
        let left_entries: BTreeSet<Entry> = Self::entries(left.to_path_buf()).try_collect().await?;
        let right_entries: BTreeSet<Entry> = Self::entries(right.to_path_buf()).try_collect().await?;
        if left_entries != right_entries {
            tracing::warn!(
                source = left_entries.len(),
                destination = right_entries.len(),
                "Copied tree structure differs from source"
            );
            return Ok(false);
        }
        for entry in &left_entries {
            if let Entry::File(relative) = entry
                && !Self::same_file(&left.join(relative), &right.join(relative)).await?
            {
                tracing::warn!(file = %relative.display(), "Copied file differs from source");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn same_file(left: &Path, right: &Path) -> Result<bool> {
        let left_size = fs::metadata(left).await.map_err(|e| ErrorKind::io(e, left))?.len();
        let right_size = match fs::metadata(right).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => exn::bail!(ErrorKind::io(e, right)),
        };
        if left_size != right_size {
            return Ok(false);
        }
        Ok(digest(left).await? == digest(right).await?)
    }

    fn entries(root: PathBuf) -> EntryStream {
        let mut stack = vec![root.clone()];
        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // Listing a directory that doesn't exist is an empty
                    // listing, not an error.
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue 'dirs,
                    Err(e) => {
                        yield Err(exn::Exn::from(ErrorKind::io(e, &current)));
                        continue 'dirs;
                    },
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(ErrorKind::io(e, &current))); continue 'entries; },
                    };
                    match Self::process_entry(&root, entry.path()).await {
                        Ok(Some(Entry::Dir(relative))) => {
                            stack.push(root.join(&relative));
                            yield Ok(Entry::Dir(relative));
                        },
                        Ok(Some(file)) => yield Ok(file),
                        Ok(None) => {},
                        Err(e) => yield Err(e),
                    }
                }
            }
        })
    }

    async fn process_entry(root: &Path, path: PathBuf) -> Result<Option<Entry>> {
        // Follows symlinks, so linked files are copied by content.
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            // Most likely a broken symlink: nothing to copy.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => exn::bail!(ErrorKind::io(e, &path)),
        };
        let relative = match path.strip_prefix(root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => exn::bail!(ErrorKind::InvalidPath(path)),
        };
        Ok(match (metadata.is_dir(), metadata.is_file()) {
            (true, _) => Some(Entry::Dir(relative)),
            (_, true) => Some(Entry::File(relative)),
            _ => None,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path).map_err(|e| ErrorKind::io(e, path))?)
}

async fn digest(path: &Path) -> Result<blake3::Hash> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<blake3::Hash> {
        let mut file = std::fs::File::open(&path).map_err(|e| ErrorKind::io(e, &path))?;
        let mut hasher = blake3::Hasher::new();
        hasher.update_reader(&mut file).map_err(|e| ErrorKind::io(e, &path))?;
        Ok(hasher.finalize())
    })
    .await
    .map_err(|e| ErrorKind::Io(e.into()))?
}
