//! Dispatcher-level integration tests exercising spec §8's end-to-end
//! scenarios S1, S2, S4, S5 directly against [`wkmp_ap::transcode`],
//! without going through the HTTP router. A small shell-script stand-in
//! plays the role of ffmpeg (spec §8: "a real ffmpeg binary is not
//! assumed to be present").

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use wkmp_ap::config::Config;
use wkmp_ap::transcode::fingerprint::{InputParams, OutputFormat, RequestedOutputParams};
use wkmp_ap::transcode::registry::{Dispatch, Dispatcher, SessionRegistry};
use wkmp_ap::transcode::session::SessionStatus;

fn fixture(name: &str) -> String {
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/").to_string() + name
}

fn test_config(cache_root: PathBuf, encoder: &str) -> Arc<Config> {
    Arc::new(Config {
        cache_root,
        port: 0,
        encoder_path: fixture(encoder),
        allowed_bitrates: vec![320_000, 256_000, 192_000, 160_000, 128_000, 96_000, 64_000, 32_000],
        client_wait_timeout_seconds: 5,
    })
}

fn input(track: &str) -> InputParams {
    InputParams {
        track_path: PathBuf::from(track),
        duration: Duration::from_secs(60),
        offset: Duration::ZERO,
    }
}

fn requested(bitrate: u32) -> RequestedOutputParams {
    RequestedOutputParams {
        format: OutputFormat::Mp3,
        bitrate,
        stream: None,
        strip_metadata: false,
    }
}

/// S1: first request for a fingerprint with no cache file and no live
/// session creates a session, produces bytes, and leaves a cache file
/// behind whose size is the session's final byte count.
#[tokio::test]
async fn s1_first_request_creates_session_and_populates_cache() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().to_path_buf(), "fake_encoder.sh");
    let registry = SessionRegistry::new();
    let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&config));

    let dispatch = dispatcher
        .dispatch(input("/music/s1.flac"), requested(128_000))
        .await
        .unwrap();

    let session = match dispatch {
        Dispatch::Live(session, _client) => session,
        _ => panic!("expected a live session on cache miss"),
    };

    let cache_path = session.cache_path().to_path_buf();
    for _ in 0..100 {
        if session.status() != SessionStatus::Working {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(session.status(), SessionStatus::Done);
    let final_bytes = session.final_bytes().expect("done session has final_bytes");
    assert_eq!(final_bytes, "WKMPFAKEENCODEROUTPUTBYTES0123456789".len() as u64);
    let on_disk = tokio::fs::metadata(&cache_path).await.unwrap().len();
    assert_eq!(on_disk, final_bytes);
}

/// S2: a second dispatch for the same fingerprint while the first
/// session is still working attaches to it instead of spawning another
/// encoder (I3: at most one session per fingerprint).
#[tokio::test]
async fn s2_concurrent_request_attaches_to_live_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().to_path_buf(), "slow_encoder.sh");
    let registry = SessionRegistry::new();
    let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&config));

    let first = dispatcher
        .dispatch(input("/music/s2.flac"), requested(128_000))
        .await
        .unwrap();
    let first_session = match first {
        Dispatch::Live(session, _client) => session,
        _ => panic!("expected a live session on cache miss"),
    };
    assert_eq!(first_session.status(), SessionStatus::Working);

    // The slow encoder sleeps 200ms before writing; well within that
    // window, a second request for the same fingerprint must attach.
    let second = dispatcher
        .dispatch(input("/music/s2.flac"), requested(128_000))
        .await
        .unwrap();
    let second_session = match second {
        Dispatch::Live(session, _client) => session,
        _ => panic!("expected the second request to attach to the live session"),
    };

    assert!(Arc::ptr_eq(&first_session, &second_session), "both requests must share one session");
}

/// S4: once a session finishes, a later request for the same fingerprint
/// is served from the cache file directly and no new session is created.
#[tokio::test]
async fn s4_cache_hit_after_completion_serves_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().to_path_buf(), "fake_encoder.sh");
    let registry = SessionRegistry::new();
    let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&config));

    let first = dispatcher
        .dispatch(input("/music/s4.flac"), requested(128_000))
        .await
        .unwrap();
    let session = match first {
        Dispatch::Live(session, _client) => session,
        _ => panic!("expected a live session on cache miss"),
    };
    for _ in 0..100 {
        if session.status() != SessionStatus::Working {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(session.status(), SessionStatus::Done);

    // Give the session a moment to remove itself from the registry
    // (spec I5: removal happens on the terminal transition).
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = dispatcher
        .dispatch(input("/music/s4.flac"), requested(128_000))
        .await
        .unwrap();
    match second {
        Dispatch::CachedFile { path, mime_type } => {
            assert_eq!(path, session.cache_path());
            assert_eq!(mime_type, "audio/mpeg");
        }
        _ => panic!("expected a cache hit for a completed fingerprint"),
    }
}

/// S5: bitrate snapping collapses distinct requested bitrates onto the
/// same fingerprint, so 200000 and 230000 (both snapping to the 192000
/// rung) land on one session.
#[tokio::test]
async fn s5_bitrate_snapping_shares_one_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().to_path_buf(), "slow_encoder.sh");
    let registry = SessionRegistry::new();
    let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&config));

    let first = dispatcher
        .dispatch(input("/music/s5.flac"), requested(200_000))
        .await
        .unwrap();
    let first_session = match first {
        Dispatch::Live(session, _client) => session,
        _ => panic!("expected a live session on cache miss"),
    };

    let second = dispatcher
        .dispatch(input("/music/s5.flac"), requested(230_000))
        .await
        .unwrap();
    let second_session = match second {
        Dispatch::Live(session, _client) => session,
        _ => panic!("expected attach to the same snapped-fingerprint session"),
    };

    assert!(Arc::ptr_eq(&first_session, &second_session));
}
