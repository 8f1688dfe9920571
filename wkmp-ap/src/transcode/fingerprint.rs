//! Input/output parameters, bitrate-ladder snapping, and fingerprinting.
//!
//! A [`Fingerprint`] is a stable 64-bit digest of the combination of input
//! parameters (canonical path, duration, start offset) and *snapped*
//! output parameters (format, bitrate, strip-metadata, stream selection).
//! Equal fingerprints imply byte-identical encoder output (spec §3).

use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Output container/codec combination. See spec §6.1 for the ffmpeg
/// argument mapping and MIME types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Mp3,
    OggOpus,
    MatroskaOpus,
    OggVorbis,
    WebmVorbis,
}

impl OutputFormat {
    /// Canonical MIME type advertised on the HTTP response.
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "audio/mpeg",
            OutputFormat::OggOpus => "audio/ogg",
            OutputFormat::MatroskaOpus => "audio/x-matroska",
            OutputFormat::OggVorbis => "audio/ogg",
            OutputFormat::WebmVorbis => "audio/webm",
        }
    }

    fn discriminant(self) -> u8 {
        match self {
            OutputFormat::Mp3 => 0,
            OutputFormat::OggOpus => 1,
            OutputFormat::MatroskaOpus => 2,
            OutputFormat::OggVorbis => 3,
            OutputFormat::WebmVorbis => 4,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ();

    /// Parses the `format` query parameter of `GET /transcode` (spec §6.2).
    /// Names mirror the codec/muxer pair they select (spec §6.1's table),
    /// not container file extensions alone, since opus and vorbis both use
    /// ogg as a muxer.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mp3" => Ok(OutputFormat::Mp3),
            "opus-ogg" => Ok(OutputFormat::OggOpus),
            "opus-mka" => Ok(OutputFormat::MatroskaOpus),
            "vorbis-ogg" => Ok(OutputFormat::OggVorbis),
            "vorbis-webm" => Ok(OutputFormat::WebmVorbis),
            _ => Err(()),
        }
    }
}

/// Input parameters: the track being transcoded and the window of it
/// being requested. Duration/properties come from the (out-of-scope)
/// audio-metadata parser; this core just receives them.
#[derive(Debug, Clone)]
pub struct InputParams {
    /// Canonical absolute path of the source file.
    pub track_path: PathBuf,
    /// Full duration of the source track.
    pub duration: Duration,
    /// Start offset within the track (`-ss`).
    pub offset: Duration,
}

/// Output parameters as requested by the client, before snapping.
#[derive(Debug, Clone)]
pub struct RequestedOutputParams {
    pub format: OutputFormat,
    pub bitrate: u32,
    pub stream: Option<usize>,
    pub strip_metadata: bool,
}

/// Output parameters after snapping onto the bitrate ladder (spec §3).
/// Equality of two `OutputParams` plus `InputParams` implies the same
/// [`Fingerprint`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputParams {
    pub format: OutputFormat,
    pub bitrate: u32,
    pub stream: Option<usize>,
    pub strip_metadata: bool,
}

impl OutputParams {
    /// Snap `requested.bitrate` onto the highest rung of `ladder` that is
    /// less than or equal to it; raise to the lowest rung if it undercuts
    /// the whole ladder. `ladder` need not be sorted; it is sorted
    /// descending internally. A bitrate of zero is a programmer error
    /// (spec §4.1) and is rejected rather than silently raised.
    ///
    /// Snapping is idempotent: `snap(snap(x).bitrate) == snap(x).bitrate`.
    pub fn snap(requested: RequestedOutputParams, ladder: &[u32]) -> Result<Self> {
        if requested.bitrate == 0 {
            return Err(Error::InvalidOutputParams(
                "bitrate must be positive".to_string(),
            ));
        }
        if ladder.is_empty() {
            return Err(Error::InvalidOutputParams(
                "bitrate ladder must not be empty".to_string(),
            ));
        }

        let mut sorted_ladder = ladder.to_vec();
        sorted_ladder.sort_unstable_by(|a, b| b.cmp(a));

        let snapped_bitrate = sorted_ladder
            .iter()
            .copied()
            .find(|&rung| rung <= requested.bitrate)
            .unwrap_or(*sorted_ladder.last().unwrap());

        Ok(OutputParams {
            format: requested.format,
            bitrate: snapped_bitrate,
            stream: requested.stream,
            strip_metadata: requested.strip_metadata,
        })
    }
}

/// Stable 64-bit digest of an (input, snapped-output) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn compute(input: &InputParams, output: &OutputParams) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(input.track_path.as_os_str().as_encoded_bytes());
        hasher.update(input.duration.as_millis().to_be_bytes());
        hasher.update(input.offset.as_millis().to_be_bytes());
        hasher.update([output.format.discriminant()]);
        hasher.update(output.bitrate.to_be_bytes());
        hasher.update([output.strip_metadata as u8]);
        match output.stream {
            Some(idx) => {
                hasher.update([1u8]);
                hasher.update((idx as u64).to_be_bytes());
            }
            None => hasher.update([0u8]),
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[0..8]);
        Fingerprint(u64::from_be_bytes(bytes))
    }

    /// Uppercase 16-hex-digit representation used for the cache filename
    /// (spec §6.3).
    pub fn to_hex(self) -> String {
        format!("{:016X}", self.0)
    }
}
