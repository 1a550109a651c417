//! Audio file decoding into the engine's internal format
//!
//! Every sound is decoded completely into memory on the control side and
//! normalized to interleaved stereo `f32` at the device rate. The result is an
//! immutable [`SoundAsset`] that voices read from without further conversion.
//!
//! ```ignore
//! let mut cache = SoundCache::new(48000);
//! let airhorn = cache.load("sounds/airhorn.mp3")?;
//! commands.trigger(&airhorn, 1.0, OverlapPolicy::Independent)?;
//! ```

mod cache;
mod format;
mod resample;

pub use cache::{SharedAsset, SoundCache};
pub use format::SoundFormat;
pub use resample::{expected_output_frames, resample_stereo};

use std::io::Cursor;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::types::{frames_to_secs, AssetId, StereoBuffer, StereoSample};

/// Errors that can occur while loading a sound
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to read audio file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt audio data: {0}")]
    Corrupt(String),

    #[error("No audio frames could be decoded")]
    Empty,

    #[error("Resampling failed: {0}")]
    Resample(String),
}

/// Result type for decoding operations
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Output of the decoder before it is registered as an asset
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Stereo frames at `sample_rate`
    pub frames: StereoBuffer,
    pub sample_rate: u32,
    pub source_sample_rate: u32,
    pub source_channels: u16,
    pub format: SoundFormat,
}

/// An immutable decoded sound
///
/// Shared between the cache and any number of voices through
/// [`SharedAsset`]. Never modified after construction.
#[derive(Debug, Clone)]
pub struct SoundAsset {
    pub id: AssetId,
    /// Display name (file stem for loaded files)
    pub name: String,
    pub path: Option<PathBuf>,
    pub frames: StereoBuffer,
    pub sample_rate: u32,
    pub source_sample_rate: u32,
    pub source_channels: u16,
    /// `None` for sounds built in memory
    pub format: Option<SoundFormat>,
}

impl SoundAsset {
    /// Build an asset from frames already at the engine rate
    pub fn from_frames(id: AssetId, name: impl Into<String>, frames: StereoBuffer, sample_rate: u32) -> Self {
        Self {
            id,
            name: name.into(),
            path: None,
            frames,
            sample_rate,
            source_sample_rate: sample_rate,
            source_channels: 2,
            format: None,
        }
    }

    fn from_decoded(id: AssetId, name: String, path: PathBuf, decoded: DecodedAudio) -> Self {
        Self {
            id,
            name,
            path: Some(path),
            frames: decoded.frames,
            sample_rate: decoded.sample_rate,
            source_sample_rate: decoded.source_sample_rate,
            source_channels: decoded.source_channels,
            format: Some(decoded.format),
        }
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn duration_secs(&self) -> f64 {
        frames_to_secs(self.frames.len(), self.sample_rate)
    }
}

/// Decode a file and convert it to stereo at `target_rate`
pub fn decode_file(path: &Path, target_rate: u32) -> DecodeResult<DecodedAudio> {
    let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_bytes(bytes, target_rate)
}

/// Decode an in-memory file and convert it to stereo at `target_rate`
pub fn decode_bytes(bytes: Vec<u8>, target_rate: u32) -> DecodeResult<DecodedAudio> {
    let format = SoundFormat::sniff(&bytes).ok_or_else(|| {
        DecodeError::UnsupportedFormat("unrecognized file signature".to_string())
    })?;

    let (interleaved, source_rate, channels) = decode_interleaved(bytes, format)?;
    let stereo = to_stereo(&interleaved, channels);
    if stereo.is_empty() {
        return Err(DecodeError::Empty);
    }

    let frames = resample_stereo(&stereo, source_rate, target_rate)?;

    log::debug!(
        "Decoded {} ({} ch @ {} Hz) into {} frames @ {} Hz",
        format,
        channels,
        source_rate,
        frames.len(),
        target_rate
    );

    Ok(DecodedAudio {
        frames,
        sample_rate: target_rate,
        source_sample_rate: source_rate,
        source_channels: channels as u16,
        format,
    })
}

/// Run symphonia over the whole stream
///
/// Returns interleaved samples, the source rate and the channel count.
fn decode_interleaved(bytes: Vec<u8>, format: SoundFormat) -> DecodeResult<(Vec<f32>, u32, usize)> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::Corrupt(e.to_string()))?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::UnsupportedFormat("no audio track found".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut buf_frames = 0u64;

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                log::warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count());

        let capacity = decoded.capacity() as u64;
        if sample_buf.is_none() || capacity > buf_frames {
            sample_buf = Some(SampleBuffer::new(capacity, spec));
            buf_frames = capacity;
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    let sample_rate =
        sample_rate.ok_or_else(|| DecodeError::Corrupt("unknown sample rate".to_string()))?;
    let channels = channels.unwrap_or(0);
    if samples.is_empty() || channels == 0 {
        return Err(DecodeError::Empty);
    }

    Ok((samples, sample_rate, channels))
}

/// Map any channel layout onto stereo
///
/// Mono is duplicated, extra channels beyond the first two are dropped.
fn to_stereo(interleaved: &[f32], channels: usize) -> StereoBuffer {
    match channels {
        0 => StereoBuffer::default(),
        1 => StereoBuffer::from_vec(interleaved.iter().map(|&s| StereoSample::mono(s)).collect()),
        2 => StereoBuffer::from_interleaved(interleaved),
        n => StereoBuffer::from_vec(
            interleaved
                .chunks_exact(n)
                .map(|frame| StereoSample::new(frame[0], frame[1]))
                .collect(),
        ),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::f32::consts::TAU;
    use tempfile::TempDir;

    /// Write a 16-bit PCM sine WAV fixture
    pub(crate) fn write_wav(dir: &Path, name: &str, rate: u32, channels: u16, frames: usize) -> PathBuf {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..frames {
            let value = (TAU * 440.0 * i as f32 / rate as f32).sin() * 0.5;
            for ch in 0..channels {
                // Put a distinct level on each channel so layout bugs show up
                let scaled = value * (1.0 - ch as f32 * 0.25);
                writer.write_sample((scaled * i16::MAX as f32) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    /// Build a silent MPEG-1 Layer III stream (128 kbps, 44.1 kHz, stereo)
    ///
    /// Every frame carries zeroed side info and main data, which decodes to
    /// 1152 frames of silence.
    fn silent_mp3(frames: usize) -> Vec<u8> {
        const FRAME_LEN: usize = 417;
        let mut bytes = Vec::with_capacity(frames * FRAME_LEN);
        for _ in 0..frames {
            bytes.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
            bytes.resize(bytes.len() + FRAME_LEN - 4, 0);
        }
        bytes
    }

    /// LSB-first bit packer for Vorbis setup headers
    #[derive(Default)]
    struct BitPacker {
        bytes: Vec<u8>,
        used: u32,
    }

    impl BitPacker {
        fn put(&mut self, value: u32, bits: u32) {
            for i in 0..bits {
                if self.used % 8 == 0 {
                    self.bytes.push(0);
                }
                if (value >> i) & 1 == 1 {
                    *self.bytes.last_mut().unwrap() |= 1 << (self.used % 8);
                }
                self.used += 1;
            }
        }
    }

    fn vorbis_header(kind: u8) -> Vec<u8> {
        let mut packet = vec![kind];
        packet.extend_from_slice(b"vorbis");
        packet
    }

    /// The smallest valid Vorbis setup: one two-entry codebook, one unused
    /// floor 1, one residue 1 and a single short-block mode
    fn vorbis_setup() -> Vec<u8> {
        let mut bits = BitPacker::default();
        // codebooks
        bits.put(0, 8);
        bits.put(0x564342, 24);
        bits.put(1, 16);
        bits.put(2, 24);
        bits.put(0, 1);
        bits.put(0, 1);
        bits.put(0, 5);
        bits.put(0, 5);
        bits.put(0, 4);
        // time domain transforms
        bits.put(0, 6);
        bits.put(0, 16);
        // floors
        bits.put(0, 6);
        bits.put(1, 16);
        bits.put(0, 5);
        bits.put(0, 2);
        bits.put(8, 4);
        // residues
        bits.put(0, 6);
        bits.put(1, 16);
        bits.put(0, 24);
        bits.put(128, 24);
        bits.put(31, 24);
        bits.put(0, 6);
        bits.put(0, 8);
        bits.put(0, 3);
        bits.put(0, 1);
        // mappings
        bits.put(0, 6);
        bits.put(0, 16);
        bits.put(0, 1);
        bits.put(0, 1);
        bits.put(0, 2);
        bits.put(0, 8);
        bits.put(0, 8);
        bits.put(0, 8);
        // modes
        bits.put(0, 6);
        bits.put(0, 1);
        bits.put(0, 16);
        bits.put(0, 16);
        bits.put(0, 8);
        // framing
        bits.put(1, 1);

        let mut packet = vorbis_header(5);
        packet.extend_from_slice(&bits.bytes);
        packet
    }

    fn ogg_page(flags: u8, granule: u64, sequence: u32, packets: &[Vec<u8>]) -> Vec<u8> {
        use symphonia::core::checksum::Crc32;
        use symphonia::core::io::Monitor;

        let mut lacing = Vec::new();
        for packet in packets {
            lacing.extend(std::iter::repeat(255u8).take(packet.len() / 255));
            lacing.push((packet.len() % 255) as u8);
        }
        assert!(lacing.len() <= 255);

        let mut page = b"OggS".to_vec();
        page.push(0);
        page.push(flags);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&0x5EED_u32.to_le_bytes());
        page.extend_from_slice(&sequence.to_le_bytes());
        page.extend_from_slice(&[0; 4]);
        page.push(lacing.len() as u8);
        page.extend_from_slice(&lacing);
        for packet in packets {
            page.extend_from_slice(packet);
        }

        let mut crc = Crc32::new(0);
        crc.process_buf_bytes(&page);
        page[22..26].copy_from_slice(&crc.crc().to_le_bytes());
        page
    }

    /// Build a silent stereo 44.1 kHz Ogg Vorbis stream of `packets` audio
    /// packets
    ///
    /// Blocks are 256 samples, so every packet after the first adds 128
    /// frames of silence.
    fn silent_ogg_vorbis(packets: usize) -> Vec<u8> {
        let mut ident = vorbis_header(1);
        ident.extend_from_slice(&0u32.to_le_bytes());
        ident.push(2);
        ident.extend_from_slice(&44100u32.to_le_bytes());
        ident.extend_from_slice(&[0; 12]);
        ident.push(0x88);
        ident.push(1);

        let mut comment = vorbis_header(3);
        let vendor = b"soundboard tests";
        comment.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        comment.extend_from_slice(vendor);
        comment.extend_from_slice(&0u32.to_le_bytes());
        comment.push(1);

        let audio = vec![vec![0u8]; packets];
        let granule = (packets.saturating_sub(1) * 128) as u64;

        let mut bytes = ogg_page(0x02, 0, 0, &[ident]);
        bytes.extend(ogg_page(0x00, 0, 1, &[comment, vorbis_setup()]));
        bytes.extend(ogg_page(0x04, granule, 2, &audio));
        bytes
    }

    #[test]
    fn test_decode_mp3_frames() {
        let decoded = decode_bytes(silent_mp3(10), 44100).unwrap();
        assert_eq!(decoded.format, SoundFormat::Mp3);
        assert_eq!(decoded.source_channels, 2);
        assert_eq!(decoded.source_sample_rate, 44100);
        assert_eq!(decoded.frames.len(), 10 * 1152);
        assert!(decoded.frames.iter().all(|s| s.left.abs() < 1e-6 && s.right.abs() < 1e-6));
    }

    #[test]
    fn test_decode_mp3_resampled_to_engine_rate() {
        let decoded = decode_bytes(silent_mp3(10), 48000).unwrap();
        assert_eq!(decoded.sample_rate, 48000);
        assert_eq!(decoded.source_sample_rate, 44100);
        assert_eq!(decoded.frames.len(), expected_output_frames(10 * 1152, 44100, 48000));
    }

    #[test]
    fn test_decode_ogg_vorbis_packets() {
        let decoded = decode_bytes(silent_ogg_vorbis(40), 44100).unwrap();
        assert_eq!(decoded.format, SoundFormat::OggVorbis);
        assert_eq!(decoded.source_channels, 2);
        assert_eq!(decoded.source_sample_rate, 44100);

        // The first packet only primes the overlap window
        let len = decoded.frames.len();
        assert_eq!(len % 128, 0, "odd length {}", len);
        assert!((38 * 128..=40 * 128).contains(&len), "decoded {} frames", len);
        assert!(decoded.frames.iter().all(|s| s.left.abs() < 1e-6 && s.right.abs() < 1e-6));
    }

    #[test]
    fn test_corrupt_ogg_page_is_an_error() {
        let mut bytes = silent_ogg_vorbis(4);
        // Break the checksum of the identification page
        bytes[22] ^= 0xFF;
        assert!(decode_bytes(bytes, 48000).is_err());
    }

    #[test]
    fn test_decode_stereo_wav_at_engine_rate() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(dir.path(), "tone.wav", 48000, 2, 48000);

        let decoded = decode_file(&path, 48000).unwrap();
        assert_eq!(decoded.format, SoundFormat::Wav);
        assert_eq!(decoded.source_channels, 2);
        assert_eq!(decoded.frames.len(), 48000);

        // Right channel was written at 75% of the left
        let s = decoded.frames[100];
        assert!((s.right - s.left * 0.75).abs() < 1e-3);
    }

    #[test]
    fn test_decode_mono_is_duplicated() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(dir.path(), "mono.wav", 48000, 1, 4800);

        let decoded = decode_file(&path, 48000).unwrap();
        assert_eq!(decoded.source_channels, 1);
        assert!(decoded.frames.iter().all(|s| s.left == s.right));
    }

    #[test]
    fn test_surround_keeps_front_pair() {
        let interleaved = [0.1, 0.2, 0.9, 0.9, 0.3, 0.4, 0.9, 0.9];
        let stereo = to_stereo(&interleaved, 4);
        assert_eq!(stereo.len(), 2);
        assert_eq!(stereo[0], StereoSample::new(0.1, 0.2));
        assert_eq!(stereo[1], StereoSample::new(0.3, 0.4));
        assert!(to_stereo(&interleaved, 0).is_empty());
    }

    #[test]
    fn test_decoded_duration_matches_source() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(dir.path(), "cd.wav", 44100, 2, 44100);

        let decoded = decode_file(&path, 48000).unwrap();
        let asset = SoundAsset::from_decoded(AssetId(1), "cd".into(), path, decoded);
        assert_eq!(asset.frame_count(), 48000);
        assert!((asset.duration_secs() - 1.0).abs() < 512.0 / 48000.0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = decode_file(Path::new("/nonexistent/boom.wav"), 48000).unwrap_err();
        assert!(matches!(err, DecodeError::Io { .. }));
    }

    #[test]
    fn test_unknown_signature_is_rejected() {
        let err = decode_bytes(b"just some text, not audio".to_vec(), 48000).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_truncated_wav_is_not_a_panic() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(dir.path(), "cut.wav", 48000, 2, 100);
        let bytes = std::fs::read(&path).unwrap();

        // Header only, no sample data
        let result = decode_bytes(bytes[..44].to_vec(), 48000);
        assert!(result.is_err());
    }
}
