//! Process-wide session registry and the dispatcher that sits in front of
//! it.
//!
//! Grounded in `original_source`'s static `jobs` map guarded by a single
//! `jobMutex` in `CachingTranscoderSession.cpp`. The registry here adds one
//! thing the C++ didn't need: a placeholder slot for "a session is being
//! created", so the single critical section of spec step 3-6 can be
//! expressed without holding a std mutex across an `.await` (spawning the
//! encoder and opening the cache file are both async).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use super::fingerprint::{Fingerprint, InputParams, OutputParams, RequestedOutputParams};
use super::session::Session;
use crate::config::Config;
use crate::error::Result;

enum Slot {
    Live(Arc<Session>),
    Creating(Arc<Notify>),
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<u64, Slot>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(SessionRegistry {
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn remove(&self, fingerprint: Fingerprint) {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.remove(&fingerprint.0) {
            Some(Slot::Live(_)) => {}
            Some(Slot::Creating(_)) => {
                tracing::warn!(fingerprint = %fingerprint.to_hex(), "session removed while still in Creating state");
            }
            None => {
                tracing::debug!(fingerprint = %fingerprint.to_hex(), "remove: session already absent");
            }
        }
    }
}

/// Derives the sharded cache path for a fingerprint (spec §6.3):
/// `<cache-root>/<first-hex-char>/<16-hex-chars>`.
pub fn cache_path_for(cache_root: &Path, fingerprint: Fingerprint) -> PathBuf {
    let hex = fingerprint.to_hex();
    let shard = &hex[0..1];
    cache_root.join(shard).join(hex)
}

/// What the dispatcher decided to hand back to the HTTP layer.
pub enum Dispatch {
    /// Cache hit: `path` is a complete, regular file; `mime_type` is its
    /// advertised content type.
    CachedFile { path: PathBuf, mime_type: &'static str },
    /// Cache miss, live or newly-created session: the caller should build
    /// a [`super::client::ClientAdapter`] from the returned handle.
    Live(Arc<Session>, Arc<super::session::ClientShared>),
    /// Cache-path preparation or encoder spawn failed (spec §4.1 step 7):
    /// stream directly from a fresh, uncached encoder invocation instead.
    Fallback,
}

/// Outcome of one attempt at the registry's critical section. `Retry`
/// means the attempt lost a benign race (an attach against a session that
/// was transitioning out, or a wakeup from someone else's `Creating`
/// slot) and the whole dispatch should be attempted again.
enum Attempt {
    Done(Dispatch),
    Retry,
}

pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SessionRegistry>, config: Arc<Config>) -> Self {
        Dispatcher { registry, config }
    }

    /// Spec §4.1 steps 1-7, including the retry loop implied by step 4's
    /// race with step 7's teardown.
    pub async fn dispatch(
        &self,
        input: InputParams,
        requested: RequestedOutputParams,
    ) -> Result<Dispatch> {
        let output = OutputParams::snap(requested, &self.config.allowed_bitrates)?;
        let fingerprint = Fingerprint::compute(&input, &output);

        loop {
            match self.try_dispatch(&input, &output, fingerprint).await? {
                Attempt::Done(dispatch) => return Ok(dispatch),
                Attempt::Retry => continue,
            }
        }
    }

    async fn try_dispatch(
        &self,
        input: &InputParams,
        output: &OutputParams,
        fingerprint: Fingerprint,
    ) -> Result<Attempt> {
        enum Action {
            Attach(Arc<Session>),
            Wait(Arc<Notify>),
            Create,
        }

        let action = {
            let mut sessions = self.registry.sessions.lock().unwrap();
            match sessions.get(&fingerprint.0) {
                Some(Slot::Live(session)) => Action::Attach(Arc::clone(session)),
                Some(Slot::Creating(notify)) => Action::Wait(Arc::clone(notify)),
                None => {
                    sessions.insert(fingerprint.0, Slot::Creating(Arc::new(Notify::new())));
                    Action::Create
                }
            }
        };

        match action {
            Action::Attach(session) => match session.attach_client() {
                Some(handle) => Ok(Attempt::Done(Dispatch::Live(session, handle))),
                None => Ok(Attempt::Retry),
            },
            Action::Wait(notify) => {
                notify.notified().await;
                Ok(Attempt::Retry)
            }
            Action::Create => self.create(input, output, fingerprint).await,
        }
    }

    /// Resolves the `Creating` placeholder this dispatcher call inserted:
    /// either into a `Live` slot (success) or by removing it (cache hit
    /// found, or creation failed and the fallback path was taken). Either
    /// way, anyone else who started waiting on the placeholder is woken.
    async fn create(
        &self,
        input: &InputParams,
        output: &OutputParams,
        fingerprint: Fingerprint,
    ) -> Result<Attempt> {
        let cache_path = cache_path_for(&self.config.cache_root, fingerprint);
        let outcome = self.try_create(input, output, fingerprint, &cache_path).await?;

        let mut sessions = self.registry.sessions.lock().unwrap();
        let notify = match sessions.remove(&fingerprint.0) {
            Some(Slot::Creating(notify)) => Some(notify),
            other => {
                // Nothing else removes a Creating slot; restore on the
                // unexpected case rather than silently drop state.
                if let Some(slot) = other {
                    sessions.insert(fingerprint.0, slot);
                }
                None
            }
        };
        if let Attempt::Done(Dispatch::Live(ref session, _)) = outcome {
            sessions.insert(fingerprint.0, Slot::Live(Arc::clone(session)));
        }
        drop(sessions);
        if let Some(notify) = notify {
            notify.notify_waiters();
        }

        Ok(outcome)
    }

    async fn try_create(
        &self,
        input: &InputParams,
        output: &OutputParams,
        fingerprint: Fingerprint,
        cache_path: &Path,
    ) -> Result<Attempt> {
        if let Some(parent) = cache_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!(error = %e, "cache directory preparation failed, falling back");
                return Ok(Attempt::Done(Dispatch::Fallback));
            }
        }

        if let Ok(metadata) = tokio::fs::metadata(cache_path).await {
            if metadata.is_file() {
                if let Err(e) = touch_mtime(cache_path).await {
                    tracing::warn!(path = %cache_path.display(), error = %e, "failed to touch cache file mtime");
                }
                return Ok(Attempt::Done(Dispatch::CachedFile {
                    path: cache_path.to_path_buf(),
                    mime_type: output.format.mime_type(),
                }));
            }
        }

        match Session::create_and_spawn(
            fingerprint,
            cache_path.to_path_buf(),
            input.clone(),
            output.clone(),
            &self.config.encoder_path,
            Arc::clone(&self.registry),
        )
        .await
        {
            Ok(session) => {
                let handle = session
                    .attach_client()
                    .expect("freshly created session is always Working");
                Ok(Attempt::Done(Dispatch::Live(session, handle)))
            }
            Err(e) => {
                tracing::warn!(error = %e, "encoder spawn failed, falling back to non-caching transcode");
                Ok(Attempt::Done(Dispatch::Fallback))
            }
        }
    }
}

/// Sets a file's modification time to now; used on cache hits (spec
/// §4.1 step 5, §6.3: mtime doubles as last-access time for the
/// out-of-scope janitor).
async fn touch_mtime(path: &Path) -> std::io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::OpenOptions::new().write(true).open(&path)?;
        file.set_modified(std::time::SystemTime::now())
    })
    .await
    .expect("blocking task panicked")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_is_sharded_by_first_hex_char() {
        let path = cache_path_for(Path::new("/cache"), Fingerprint(0xDEAD_BEEF_0BAD_F00D));
        assert_eq!(path, PathBuf::from("/cache/D/DEADBEEF0BADF00D"));
    }
}
