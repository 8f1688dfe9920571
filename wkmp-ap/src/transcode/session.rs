//! The coordination object per active fingerprint: owns the encoder driver
//! and the cache file, pumps encoded bytes from one into the other, and
//! wakes attached clients on progress.
//!
//! Grounded in `original_source/src/libs/av/impl/CachingTranscoderSession.cpp`:
//! the pump loop below is the async-recursive `keepReading()` there,
//! rendered as a single `tokio::spawn`ed loop per §9's design note.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex as AsyncMutex, Notify};

use super::encoder::EncoderDriver;
use super::fingerprint::{Fingerprint, InputParams, OutputParams};
use super::registry::SessionRegistry;
use crate::error::Result;

/// Pump read buffer / cache-file streaming chunk size.
pub const CHUNK_SIZE: usize = 256 * 1024;

/// A sentinel meaning "not yet set" for `final_bytes`, which is otherwise a
/// plain byte count and can never legitimately equal `u64::MAX`.
const UNSET: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Working,
    Done,
    Errored,
}

/// The session's side of a per-client wakeup channel. Shared between the
/// session's client list and the client adapter's wait loop; neither side
/// holds a strong reference to the other's adapter state, only to this.
pub(crate) struct ClientShared {
    dead: std::sync::atomic::AtomicBool,
    notify: Notify,
}

impl ClientShared {
    fn new() -> Arc<Self> {
        Arc::new(ClientShared {
            dead: std::sync::atomic::AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    pub(crate) fn mark_dead(&self) {
        self.dead.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    pub(crate) async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// `⌊bitrate / 8 · max(duration − offset, 0) / 1s⌋`. A constant-bitrate
/// approximation; see the design notes for why this is the one length the
/// core can commit to before encoding completes.
pub(crate) fn estimate_content_length(input: &InputParams, output: &OutputParams) -> u64 {
    let remaining = input.duration.saturating_sub(input.offset);
    let bytes_per_second = output.bitrate as f64 / 8.0;
    (bytes_per_second * remaining.as_secs_f64()).floor() as u64
}

pub struct Session {
    fingerprint: Fingerprint,
    cache_path: PathBuf,
    mime_type: &'static str,
    estimated_total: u64,
    file: AsyncMutex<tokio::fs::File>,
    produced_bytes: AtomicU64,
    final_bytes: AtomicU64,
    status: StdMutex<SessionStatus>,
    clients: StdMutex<Vec<Arc<ClientShared>>>,
    registry: Arc<SessionRegistry>,
}

impl Session {
    /// Opens the (already truncated-empty) cache file, spawns the encoder,
    /// and launches the pump task. Errors here are a constructor failure in
    /// spec terms: the caller is expected to fall back to non-caching
    /// transcoding and must not leave a session registered.
    pub(crate) async fn create_and_spawn(
        fingerprint: Fingerprint,
        cache_path: PathBuf,
        input: InputParams,
        output: OutputParams,
        encoder_path: &str,
        registry: Arc<SessionRegistry>,
    ) -> Result<Arc<Session>> {
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&cache_path)
            .await?;

        let estimated_total = estimate_content_length(&input, &output);
        let mime_type = output.format.mime_type();
        let encoder = EncoderDriver::spawn(encoder_path, &input, &output)?;

        let session = Arc::new(Session {
            fingerprint,
            cache_path,
            mime_type,
            estimated_total,
            file: AsyncMutex::new(file),
            produced_bytes: AtomicU64::new(0),
            final_bytes: AtomicU64::new(UNSET),
            status: StdMutex::new(SessionStatus::Working),
            clients: StdMutex::new(Vec::new()),
            registry,
        });

        let pump_session = Arc::clone(&session);
        tokio::spawn(async move { pump_session.pump(encoder).await });

        Ok(session)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn cache_path(&self) -> &std::path::Path {
        &self.cache_path
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn estimated_total(&self) -> u64 {
        self.estimated_total
    }

    pub fn produced_bytes(&self) -> u64 {
        self.produced_bytes.load(Ordering::Acquire)
    }

    pub fn final_bytes(&self) -> Option<u64> {
        match self.final_bytes.load(Ordering::Acquire) {
            UNSET => None,
            n => Some(n),
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap()
    }

    /// Attaches a new client, unless the session has already reached a
    /// terminal state (a race with its own removal from the registry). The
    /// dispatcher treats `None` as "retry dispatch", since a terminal
    /// session means a cache file now exists (or, on error, did and was
    /// removed, in which case a fresh session should be created).
    pub(crate) fn attach_client(self: &Arc<Self>) -> Option<Arc<ClientShared>> {
        if self.status() != SessionStatus::Working {
            return None;
        }
        let handle = ClientShared::new();
        self.clients.lock().unwrap().push(Arc::clone(&handle));
        Some(handle)
    }

    /// Reads up to `min(max_len, CHUNK_SIZE)` bytes starting at `offset`,
    /// under the file-mutex, and returns them as an owned buffer. An empty
    /// result means either `max_len == 0` or `offset >= produced_bytes`;
    /// callers that need to distinguish those should check `produced_bytes`
    /// themselves first.
    pub async fn serve(&self, offset: u64, max_len: u64) -> std::io::Result<Bytes> {
        if max_len == 0 || offset >= self.produced_bytes() {
            return Ok(Bytes::new());
        }
        let want = std::cmp::min(max_len, CHUNK_SIZE as u64) as usize;
        let mut buf = vec![0u8; want];

        let filled = {
            let mut file = self.file.lock().await;
            file.seek(std::io::SeekFrom::Start(offset)).await?;
            let mut filled = 0usize;
            while filled < buf.len() {
                let n = file.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            filled
        };
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    async fn pump(self: Arc<Self>, mut encoder: EncoderDriver) {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            if encoder.finished() {
                self.transition_done();
                break;
            }

            match encoder.read(&mut buf).await {
                Ok(n) => {
                    if n > 0 {
                        if let Err(e) = self.write_chunk(&buf[..n]).await {
                            tracing::warn!(fingerprint = %self.fingerprint.to_hex(), error = %e, "cache write failed, session errored");
                            self.transition_errored().await;
                            break;
                        }
                    }
                    self.notify_progress();
                }
                Err(e) => {
                    tracing::warn!(fingerprint = %self.fingerprint.to_hex(), error = %e, "encoder read failed, session errored");
                    self.transition_errored().await;
                    break;
                }
            }
        }
    }

    async fn write_chunk(&self, chunk: &[u8]) -> std::io::Result<()> {
        let offset = self.produced_bytes.load(Ordering::Relaxed);
        {
            let mut file = self.file.lock().await;
            file.seek(std::io::SeekFrom::Start(offset)).await?;
            file.write_all(chunk).await?;
            file.flush().await?;
        }
        self.produced_bytes
            .store(offset + chunk.len() as u64, Ordering::Release);
        Ok(())
    }

    fn transition_done(&self) {
        *self.status.lock().unwrap() = SessionStatus::Done;
        self.final_bytes
            .store(self.produced_bytes(), Ordering::Release);
        tracing::info!(fingerprint = %self.fingerprint.to_hex(), bytes = self.produced_bytes(), "session done");
        self.notify_terminal();
        self.registry.remove(self.fingerprint);
    }

    async fn transition_errored(&self) {
        *self.status.lock().unwrap() = SessionStatus::Errored;
        self.notify_terminal();
        self.registry.remove(self.fingerprint);
        // Delete the partial file so a later request with the same
        // fingerprint doesn't find it and mistake it for a complete hit.
        if let Err(e) = tokio::fs::remove_file(&self.cache_path).await {
            tracing::warn!(path = %self.cache_path.display(), error = %e, "failed to remove partial cache file");
        }
    }

    fn notify_progress(&self) {
        let mut clients = self.clients.lock().unwrap();
        clients.retain(|c| !c.is_dead());
        for c in clients.iter() {
            c.notify.notify_waiters();
        }
    }

    fn notify_terminal(&self) {
        let mut clients = self.clients.lock().unwrap();
        for c in clients.iter() {
            c.notify.notify_waiters();
        }
        clients.clear();
    }
}
