//! Primary-layer snapshots
//!
//! A snapshot is a zip archive with one `name.class` entry per unit. The
//! exporter writes snapshots on a background thread so that edits never
//! wait on disk I/O. Only the latest request matters: a request that
//! arrives while another is queued replaces it.

use crate::layer::{load_path, LayerKind, ResourceLayer};
use crate::unit::Unit;
use crate::{Error, Result};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Default snapshot location: `<tmp>/jarscope/primary.jar`
pub fn default_snapshot_path() -> PathBuf {
    std::env::temp_dir().join("jarscope").join("primary.jar")
}

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated)
}

fn write_entries<W: Write + Seek>(
    out: W,
    units: &[Unit],
    resources: &[(String, Vec<u8>)],
) -> Result<W> {
    let mut zip = ZipWriter::new(out);
    let mut sorted: Vec<&Unit> = units.iter().collect();
    sorted.sort_by(|a, b| a.name().cmp(b.name()));
    for unit in sorted {
        zip.start_file(unit.entry_name(), options())?;
        zip.write_all(unit.bytes())?;
    }
    for (name, bytes) in resources {
        zip.start_file(name.as_str(), options())?;
        zip.write_all(bytes)?;
    }
    Ok(zip.finish()?)
}

/// Build an in-memory archive of units and extra resource entries
pub fn archive_bytes(units: &[Unit], resources: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let cursor = write_entries(Cursor::new(Vec::new()), units, resources)?;
    Ok(cursor.into_inner())
}

/// Write units to `path` atomically (temp file in the same directory, then rename)
pub fn write_archive(path: &Path, units: &[Unit]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    write_entries(tmp.as_file_mut(), units, &[])?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Load a snapshot back as a layer
pub fn read_archive(path: &Path) -> Result<ResourceLayer> {
    load_path(path, LayerKind::Primary)
}

/// Content hash over a unit map, independent of iteration order
pub fn fingerprint(units: &[Unit]) -> blake3::Hash {
    let mut sorted: Vec<&Unit> = units.iter().collect();
    sorted.sort_by(|a, b| a.name().cmp(b.name()));
    let mut hasher = blake3::Hasher::new();
    for unit in sorted {
        hasher.update(unit.name().as_bytes());
        hasher.update(&[0]);
        hasher.update(unit.fingerprint().as_bytes());
    }
    hasher.finalize()
}

// ========== Background exporter ==========

struct Job {
    generation: u64,
    path: PathBuf,
    units: Vec<Unit>,
}

#[derive(Default)]
struct ExportState {
    pending: Option<Job>,
    requested: u64,
    completed: u64,
    written: u64,
    last: Option<(PathBuf, blake3::Hash)>,
    last_error: Option<String>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<ExportState>,
    idle: Condvar,
}

/// Writes snapshots on a dedicated thread, one at a time.
///
/// The thread is started on the first request. Dropping the exporter lets
/// the thread finish the queued job and exit.
pub struct SnapshotExporter {
    path: PathBuf,
    shared: Arc<Shared>,
    wake: Mutex<Option<Sender<()>>>,
}

impl SnapshotExporter {
    /// Create a new exporter targeting `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            shared: Arc::new(Shared::default()),
            wake: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
    }

    /// Queue an export of `units`, replacing any queued request
    pub fn request(&self, units: Vec<Unit>) {
        {
            let mut state = self.shared.state.lock();
            state.requested += 1;
            let generation = state.requested;
            if state.pending.is_some() {
                tracing::debug!("Superseding queued snapshot with request #{}", generation);
            }
            state.pending = Some(Job {
                generation,
                path: self.path.clone(),
                units,
            });
        }

        let mut wake = self.wake.lock();
        if wake.is_none() {
            match spawn_worker(Arc::clone(&self.shared)) {
                Ok(sender) => *wake = Some(sender),
                Err(e) => {
                    self.abandon(Error::Snapshot(format!("failed to start snapshot thread: {}", e)));
                    return;
                }
            }
        }
        if let Some(sender) = wake.as_ref() {
            // A full channel means the worker is already due to wake up.
            if let Err(TrySendError::Disconnected(_)) = sender.try_send(()) {
                *wake = None;
                self.abandon(Error::Snapshot("snapshot thread is gone".to_string()));
            }
        }
    }

    /// Drop queued work that no thread will pick up, so waiters return
    fn abandon(&self, error: Error) {
        tracing::error!("Snapshot request dropped: {}", error);
        let mut state = self.shared.state.lock();
        state.pending = None;
        state.completed = state.requested;
        state.last_error = Some(error.to_string());
        self.shared.idle.notify_all();
    }

    /// Block until every request so far has been handled.
    ///
    /// Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.completed < state.requested {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.completed >= state.requested;
            }
        }
        true
    }

    /// Number of archives actually written (unchanged content is skipped)
    pub fn write_count(&self) -> u64 {
        self.shared.state.lock().written
    }

    /// Message of the most recent failed export, if the last export failed
    pub fn last_error(&self) -> Option<String> {
        self.shared.state.lock().last_error.clone()
    }
}

impl std::fmt::Debug for SnapshotExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotExporter").field("path", &self.path).finish()
    }
}

fn spawn_worker(shared: Arc<Shared>) -> std::io::Result<Sender<()>> {
    let (tx, rx) = channel::bounded::<()>(1);
    thread::Builder::new()
        .name("jarscope-snapshot".to_string())
        .spawn(move || run_worker(shared, rx))?;
    Ok(tx)
}

fn run_worker(shared: Arc<Shared>, wake: Receiver<()>) {
    for () in wake {
        loop {
            let (job, last) = {
                let mut state = shared.state.lock();
                match state.pending.take() {
                    Some(job) => (job, state.last.clone()),
                    None => break,
                }
            };

            let hash = fingerprint(&job.units);
            let unchanged = last
                .as_ref()
                .is_some_and(|(path, prev)| *path == job.path && *prev == hash && job.path.exists());

            let outcome = if unchanged {
                tracing::debug!("Snapshot unchanged, skipping write to {}", job.path.display());
                Ok(false)
            } else {
                write_archive(&job.path, &job.units).map(|()| true)
            };

            let mut state = shared.state.lock();
            match outcome {
                Ok(wrote) => {
                    if wrote {
                        state.written += 1;
                        tracing::info!("Wrote snapshot of {} units to {}", job.units.len(), job.path.display());
                    }
                    state.last = Some((job.path, hash));
                    state.last_error = None;
                }
                Err(e) => {
                    let error = Error::Snapshot(format!("{}: {}", job.path.display(), e));
                    tracing::error!("{}", error);
                    state.last_error = Some(error.to_string());
                }
            }
            state.completed = state.completed.max(job.generation);
            shared.idle.notify_all();
        }
    }
    tracing::debug!("Snapshot thread exiting");
}
