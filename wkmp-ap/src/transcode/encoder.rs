//! Thin async wrapper around the spawned encoder child process.
//!
//! Grounded in `original_source/src/libs/av/impl/Transcoder.cpp`: builds
//! the exact ffmpeg argument list of spec §6.1, spawns it with stdin
//! closed and stderr discarded, and exposes an async read over stdout.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use super::fingerprint::{InputParams, OutputFormat, OutputParams};
use crate::error::{Error, Result};

/// Build the ffmpeg argument list for the given input/output parameters,
/// in the exact order spec §6.1 specifies. Pure and spawn-free so it can
/// be unit tested without an ffmpeg binary present.
pub fn build_args(input: &InputParams, output: &OutputParams) -> Vec<String> {
    let mut args = vec!["-loglevel".to_string(), "quiet".to_string(), "-nostdin".to_string()];

    args.push("-ss".to_string());
    args.push(format!("{:.3}", input.offset.as_secs_f64()));

    args.push("-i".to_string());
    args.push(input.track_path.to_string_lossy().into_owned());

    if let Some(stream) = output.stream {
        args.push("-map".to_string());
        args.push(format!("0:{stream}"));
    }

    if output.strip_metadata {
        args.push("-map_metadata".to_string());
        args.push("-1".to_string());
    }

    args.push("-vn".to_string());

    args.push("-b:a".to_string());
    args.push(output.bitrate.to_string());

    let (codec_flags, muxer_flag): (&[&str], &str) = match output.format {
        OutputFormat::Mp3 => (&[], "mp3"),
        OutputFormat::OggOpus => (&["-acodec", "libopus"], "ogg"),
        OutputFormat::MatroskaOpus => (&["-acodec", "libopus"], "matroska"),
        OutputFormat::OggVorbis => (&["-acodec", "libvorbis"], "ogg"),
        OutputFormat::WebmVorbis => (&["-acodec", "libvorbis"], "webm"),
    };
    args.extend(codec_flags.iter().map(|s| s.to_string()));
    args.push("-f".to_string());
    args.push(muxer_flag.to_string());

    args.push("pipe:1".to_string());
    args
}

/// A running encoder child process. `stdout` is piped; `stdin` is closed;
/// `stderr` is discarded, so a chatty encoder can never block on a full
/// pipe it has no reader for.
pub struct EncoderDriver {
    child: Child,
    stdout: ChildStdout,
    eof_reached: bool,
}

impl EncoderDriver {
    /// Spawn the encoder. Errors here are caught by the dispatcher (spec
    /// §4.1 step 7) and cause a fallback to non-caching transcoding.
    pub fn spawn(encoder_path: &str, input: &InputParams, output: &OutputParams) -> Result<Self> {
        let args = build_args(input, output);

        let mut child = Command::new(encoder_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(Error::EncoderSpawn)?;

        let stdout = child.stdout.take().expect("stdout was piped at spawn");

        Ok(EncoderDriver {
            child,
            stdout,
            eof_reached: false,
        })
    }

    /// Read up to `buf.len()` bytes. `Ok(0)` means EOF — the encoder has
    /// no more data and has, or is about to, exit.
    pub async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.stdout.read(buf).await?;
        if n == 0 {
            self.eof_reached = true;
        }
        Ok(n)
    }

    /// True once stdout has reported EOF. Matches spec §4.4: "`finished()`
    /// returns true once the child has exited and no buffered bytes remain."
    pub fn finished(&self) -> bool {
        self.eof_reached
    }
}
