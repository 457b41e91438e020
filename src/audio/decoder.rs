//! Audio file decoding via symphonia
//!
//! Accepts either a path on the host or the raw bytes of a file sent over
//! the wire, and produces interleaved f32 samples.

use std::fs::File;
use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::AudioClip;
use crate::error::AudioError;
use crate::protocol::AudioSource;

/// Decode a source into a clip
pub fn decode_source(source: &AudioSource) -> Result<AudioClip, AudioError> {
    let mut hint = Hint::new();

    let media: Box<dyn MediaSource> = match source {
        AudioSource::Path(path) => {
            if !path.is_file() {
                return Err(AudioError::FileNotFound(path.display().to_string()));
            }
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                hint.with_extension(ext);
            }
            let file = File::open(path)
                .map_err(|e| AudioError::FileNotFound(format!("{}: {}", path.display(), e)))?;
            Box::new(file)
        }
        AudioSource::Bytes(bytes) => Box::new(Cursor::new(bytes.clone())),
    };

    let clip = decode_stream(media, &hint)?;
    tracing::debug!(
        "Decoded {}: {} Hz, {} channels, {:.2}s",
        source.describe(),
        clip.sample_rate,
        clip.channels,
        clip.duration_secs()
    );
    Ok(clip)
}

fn decode_stream(media: Box<dyn MediaSource>, hint: &Hint) -> Result<AudioClip, AudioError> {
    let mss = MediaSourceStream::new(media, Default::default());

    let probed = symphonia::default::get_probe()
        .format(hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioError::DecodeFailed(e.to_string()))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| AudioError::DecodeFailed("no default track".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::DecodeFailed(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(AudioError::DecodeFailed(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count() as u16);

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // Skip corrupt packets
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(AudioError::DecodeFailed(e.to_string())),
        }
    }

    let sample_rate =
        sample_rate.ok_or_else(|| AudioError::DecodeFailed("unknown sample rate".to_string()))?;
    let channels = channels
        .filter(|&c| c > 0)
        .ok_or_else(|| AudioError::DecodeFailed("unknown channel count".to_string()))?;

    Ok(AudioClip::new(samples, sample_rate, channels))
}

/// Encode interleaved f32 samples as a 16-bit PCM WAV file
///
/// Used to build test fixtures and by the control client's `tone` command.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let block_align = channels * 2;
    let byte_rate = sample_rate * block_align as u32;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
