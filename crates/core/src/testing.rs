//! In-memory decoder for tests.
//!
//! Understands `loop:<secs>` (a silent mono clip at [`FAKE_RATE`]) and
//! `loop:<secs>@<rate>`. The uri `video` has no audio track; anything else is
//! an invalid source.

use synced_decode::{AudioSource, DecodeError, DecodeFuture, DecodedClip, MediaDecoder};
use synced_transport::AudioArc;

pub const FAKE_RATE: u32 = 1000;

#[derive(Debug, Default)]
pub struct FakeDecoder;

impl MediaDecoder for FakeDecoder {
    fn decode<'a>(&'a self, source: &'a AudioSource) -> DecodeFuture<'a> {
        Box::pin(async move { fake_clip(source) })
    }
}

fn fake_clip(source: &AudioSource) -> Result<DecodedClip, DecodeError> {
    let invalid = || DecodeError::InvalidSource(format!("unknown source {source}"));

    let uri = source.uri.as_deref().ok_or_else(invalid)?;
    if uri == "video" {
        return Err(DecodeError::NoAudioTrack);
    }

    let descriptor = uri.strip_prefix("loop:").ok_or_else(invalid)?;
    let (secs, rate) = match descriptor.split_once('@') {
        Some((secs, rate)) => (secs, rate.parse::<u32>().map_err(|_| invalid())?),
        None => (descriptor, FAKE_RATE),
    };
    let secs: f64 = secs.parse().map_err(|_| invalid())?;
    let frames = (secs * rate as f64).round() as usize;

    Ok(DecodedClip {
        audio: AudioArc::silence(frames, rate, 1),
    })
}
