//! Capture sinks for a child's output streams.
//!
//! Each stream is drained on its own task so that a child writing more
//! than a pipe buffer's worth of output never blocks while the runner is
//! waiting on its exit. Bytes are published as they are read, so a sink
//! that has to be abandoned still yields everything captured so far.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

const READ_CHUNK: usize = 8 * 1024;

/// Bytes collected from one stream.
#[derive(Debug, Default)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// True if output beyond the cap was discarded.
    pub truncated: bool,
}

impl Captured {
    pub fn into_string(self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// A running drain task and the buffer it appends to.
#[derive(Debug)]
pub struct Sink {
    shared: Arc<Mutex<Captured>>,
    task: JoinHandle<()>,
}

impl Sink {
    /// Waits for EOF and returns everything read.
    pub async fn finish(mut self) -> Captured {
        if let Err(e) = (&mut self.task).await {
            warn!("Capture task failed: {e}");
        }
        self.take()
    }

    /// Waits for EOF until `cutoff`. Past it the task is abandoned and the
    /// bytes read so far are returned.
    pub async fn finish_by(mut self, cutoff: Instant, stream: &str) -> Captured {
        match tokio::time::timeout_at(cutoff, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{stream} capture task failed: {e}"),
            Err(_) => {
                // A descendant outside the process group kept the pipe open
                warn!("{stream} still open at cutoff, keeping partial capture");
                self.task.abort();
            }
        }
        self.take()
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    fn take(&self) -> Captured {
        std::mem::take(&mut *lock(&self.shared))
    }
}

fn lock(shared: &Mutex<Captured>) -> MutexGuard<'_, Captured> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Spawns a task draining `stream` until EOF.
///
/// At most `limit` bytes are kept; anything beyond is read and dropped.
/// A missing stream yields an empty capture.
pub fn spawn_sink<R>(stream: Option<R>, limit: Option<usize>) -> Sink
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let shared = Arc::new(Mutex::new(Captured::default()));
    let task = {
        let shared = shared.clone();
        tokio::spawn(async move {
            if let Some(stream) = stream {
                drain(stream, limit, &shared).await;
            }
        })
    };
    Sink { shared, task }
}

async fn drain<R: AsyncRead + Unpin>(mut stream: R, limit: Option<usize>, shared: &Mutex<Captured>) {
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("Output stream read failed: {e}");
                break;
            }
        };

        let mut captured = lock(shared);
        let keep = match limit {
            Some(max) => n.min(max.saturating_sub(captured.bytes.len())),
            None => n,
        };
        captured.bytes.extend_from_slice(&chunk[..keep]);
        if keep < n {
            captured.truncated = true;
        }
    }
}
