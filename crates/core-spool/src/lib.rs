//! Input acquisition.
//!
//! A pager session reads either a regular file or an unbounded stdin stream
//! spooled through a cache file. Spooling copies in 64 KiB chunks on a
//! blocking task and raises a watch-channel "finished" signal when stdin
//! closes; the cache file is removed on shutdown unless an explicit output
//! path was requested.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SPOOL_CHUNK: usize = 64 * 1024;

/// Input-shape errors, reported before the UI starts.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("{}: No such file or directory", .0.display())]
    NotFound(PathBuf),
    #[error("{}: Permission denied", .0.display())]
    PermissionDenied(PathBuf),
    #[error("{} is a directory", .0.display())]
    IsDirectory(PathBuf),
    #[error("{} is not a regular file", .0.display())]
    NotRegular(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Rejects anything but a readable regular file.
pub fn validate_regular_file(path: &Path) -> Result<(), InputError> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(InputError::NotFound(path.to_owned()));
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(InputError::PermissionDenied(path.to_owned()));
        }
        Err(e) => return Err(e.into()),
    };
    if meta.is_dir() {
        return Err(InputError::IsDirectory(path.to_owned()));
    }
    if !meta.is_file() {
        return Err(InputError::NotRegular(path.to_owned()));
    }
    Ok(())
}

/// Tells readers whether the byte source may still be growing behind them.
/// For regular files this is always "no"; for spooled stdin it flips once
/// the spooler observes EOF.
#[derive(Clone, Debug)]
pub struct GrowthHandle {
    finished: Option<watch::Receiver<bool>>,
}

impl GrowthHandle {
    /// Handle for a regular file: not a stream, nothing pending.
    pub fn fixed() -> Self {
        Self { finished: None }
    }

    pub fn is_stream(&self) -> bool {
        self.finished.is_some()
    }

    /// True once the stream's source closed. Always false for files, where
    /// "stdin finished" has no meaning.
    pub fn is_finished(&self) -> bool {
        self.finished.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// A stream whose source has not closed yet: a partial line at EOF must
    /// not be trusted.
    pub fn still_growing(&self) -> bool {
        self.finished.as_ref().is_some_and(|rx| !*rx.borrow())
    }
}

enum CacheFile {
    /// Unlinked when the session shuts down.
    Temp(tempfile::TempPath),
    /// User-requested location, preserved on exit.
    Explicit(PathBuf),
}

/// One pager input: the readable source plus the spooling machinery when the
/// input is stdin.
pub struct Session {
    path: PathBuf,
    growth: GrowthHandle,
    cache: Option<CacheFile>,
    spool_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Session {
    /// Opens a regular file as the byte source.
    pub fn from_file(path: &Path) -> Result<Session, InputError> {
        validate_regular_file(path)?;
        // Readability check up front so the error surfaces before the UI.
        match File::open(path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(InputError::PermissionDenied(path.to_owned()));
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Session {
            path: path.to_owned(),
            growth: GrowthHandle::fixed(),
            cache: None,
            spool_task: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Spools stdin into a cache file and opens that file as the byte
    /// source. With `out_path` the cache lands at the given location and is
    /// preserved; otherwise a temp file is used and removed on shutdown.
    pub fn from_stdin(
        out_path: Option<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<Session, InputError> {
        let (write_handle, cache) = match out_path {
            Some(path) => (open_rewrite(&path)?, CacheFile::Explicit(path)),
            None => {
                let file = tempfile::Builder::new().prefix("slit_").tempfile()?;
                let (file, temp_path) = file.into_parts();
                (file, CacheFile::Temp(temp_path))
            }
        };
        let path = match &cache {
            CacheFile::Temp(p) => p.to_path_buf(),
            CacheFile::Explicit(p) => p.clone(),
        };

        let (finished_tx, finished_rx) = watch::channel(false);
        let spool_cancel = cancel.clone();
        let spool_task = tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            let copied = spool(stdin.lock(), write_handle, &spool_cancel);
            match copied {
                Ok(bytes) => {
                    tracing::debug!(target: "spool", bytes, "stdin spool finished");
                }
                Err(e) => {
                    tracing::error!(target: "spool", error = %e, "stdin spool failed");
                }
            }
            // Raised on every exit path so readers stop waiting for growth.
            let _ = finished_tx.send(true);
        });

        Ok(Session {
            path,
            growth: GrowthHandle {
                finished: Some(finished_rx),
            },
            cache: Some(cache),
            spool_task: Some(spool_task),
            cancel,
        })
    }

    /// A fresh read handle on the byte source. The fetcher owns its handle
    /// exclusively; status queries open their own.
    pub fn reader(&self) -> io::Result<File> {
        File::open(&self.path)
    }

    pub fn growth(&self) -> GrowthHandle {
        self.growth.clone()
    }

    pub fn source_path(&self) -> &Path {
        &self.path
    }

    /// Stops the spooler and removes the cache file (when temporary). A
    /// spooler blocked on a quiet-but-open pipe is detached rather than
    /// awaited; the unlinked cache file disappears with the process.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.spool_task.take() {
            let waited =
                tokio::time::timeout(std::time::Duration::from_millis(200), task).await;
            if waited.is_err() {
                tracing::debug!(target: "spool", "spooler still blocked on stdin, detaching");
            }
        }
        drop(self.cache.take());
    }
}

/// Copies `src` to `dst` in 64 KiB chunks, checking for cancellation between
/// chunks. Returns the number of bytes copied.
fn spool(
    mut src: impl Read,
    mut dst: impl Write,
    cancel: &CancellationToken,
) -> io::Result<u64> {
    let mut buf = vec![0u8; SPOOL_CHUNK];
    let mut total = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Ok(total);
        }
        let n = match src.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        dst.write_all(&buf[..n])?;
        total += n as u64;
    }
}

/// Creates `path` fresh, replacing a leftover file from a previous run.
fn open_rewrite(path: &Path) -> io::Result<File> {
    let create = || {
        fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
    };
    match create() {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            fs::remove_file(path)?;
            create()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn validate_rejects_missing_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate_regular_file(&dir.path().join("absent")),
            Err(InputError::NotFound(_))
        ));
        assert!(matches!(
            validate_regular_file(dir.path()),
            Err(InputError::IsDirectory(_))
        ));
    }

    #[test]
    fn validate_accepts_regular_files() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(validate_regular_file(file.path()).is_ok());
    }

    #[test]
    fn spool_copies_everything_in_chunks() {
        let src = vec![7u8; SPOOL_CHUNK * 2 + 17];
        let mut dst = Vec::new();
        let copied = spool(Cursor::new(&src), &mut dst, &CancellationToken::new()).unwrap();
        assert_eq!(copied, src.len() as u64);
        assert_eq!(dst, src);
    }

    #[test]
    fn spool_stops_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut dst = Vec::new();
        let copied = spool(Cursor::new(vec![1u8; 128]), &mut dst, &cancel).unwrap();
        assert_eq!(copied, 0);
        assert!(dst.is_empty());
    }

    #[test]
    fn open_rewrite_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");
        fs::write(&path, b"stale").unwrap();
        let f = open_rewrite(&path).unwrap();
        drop(f);
        assert_eq!(fs::read(&path).unwrap(), b"");
    }

    #[tokio::test]
    async fn file_session_reports_fixed_growth() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), b"a\nb\n").unwrap();
        let session = Session::from_file(file.path()).unwrap();
        let growth = session.growth();
        assert!(!growth.is_stream());
        assert!(!growth.is_finished());
        assert!(!growth.still_growing());
        let mut text = String::new();
        session.reader().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "a\nb\n");
        session.shutdown().await;
    }
}
