//! Replay files on disk: a small versioned bincode blob of the sample
//! sequence, checkpoint times and lap time.
//!
//! Saving happens on a worker thread so disk I/O never blocks the next
//! frame's simulation step. The caller hands over a clone of the replay;
//! the worker only ever touches its private copy, so no locking is needed.
//! In-flight saves are not cancelled: if an even better lap supersedes one,
//! both get written and whichever finishes last wins on disk. The in-memory
//! best replay stays authoritative for the session either way.

use crate::replay::Replay;
use anyhow::{Context, Result, ensure};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

const REPLAY_FILE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct ReplayFile {
    version: u32,
    replay: Replay,
}

pub fn save_replay(path: &Path, replay: &Replay) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Creating replay directory {}", parent.display()))?;
    }

    let file = File::create(path).with_context(|| format!("Creating replay file {}", path.display()))?;
    bincode::serialize_into(
        BufWriter::new(file),
        &ReplayFile {
            version: REPLAY_FILE_VERSION,
            replay: replay.clone(),
        },
    )
    .with_context(|| format!("Serializing replay to {}", path.display()))?;

    debug!("Saved replay ({} samples) to {}", replay.samples().len(), path.display());
    Ok(())
}

pub fn load_replay(path: &Path) -> Result<Replay> {
    let file = File::open(path).with_context(|| format!("Opening replay file {}", path.display()))?;
    let parsed: ReplayFile = bincode::deserialize_from(BufReader::new(file))
        .with_context(|| format!("Deserializing replay from {}", path.display()))?;

    ensure!(
        parsed.version == REPLAY_FILE_VERSION,
        "Unsupported replay file version {} in {}",
        parsed.version,
        path.display()
    );

    Ok(parsed.replay)
}

/// Write `replay` to `path` on a worker thread. I/O errors are logged and
/// dropped; the next completed best lap will retry. The handle is returned
/// so tests (and teardown) can join, callers may drop it.
pub fn save_replay_async(path: PathBuf, replay: Replay) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("replay-save".into())
        .spawn(move || {
            if let Err(cause) = save_replay(&path, &replay) {
                error!("Failed to save replay to {}: {:#}", path.display(), cause);
            }
        })
        .expect("Spawning replay save thread")
}
