//! Container/codec detection by file signature
//!
//! The set of formats is closed: a file either matches one of the known
//! signatures or it is rejected before any decoder is created.

/// Audio formats the decoder accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundFormat {
    /// RIFF/WAVE (PCM or IEEE float)
    Wav,
    /// Free Lossless Audio Codec
    Flac,
    /// Vorbis in an Ogg container
    OggVorbis,
    /// MPEG-1/2 Layer III, with or without an ID3v2 tag
    Mp3,
}

impl SoundFormat {
    /// All supported formats
    pub const ALL: [SoundFormat; 4] = [
        SoundFormat::Wav,
        SoundFormat::Flac,
        SoundFormat::OggVorbis,
        SoundFormat::Mp3,
    ];

    /// Detect the format from the first bytes of a file
    ///
    /// Needs at most 12 bytes. Returns `None` for anything unrecognized.
    pub fn sniff(header: &[u8]) -> Option<Self> {
        if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE" {
            return Some(SoundFormat::Wav);
        }
        if header.starts_with(b"fLaC") {
            return Some(SoundFormat::Flac);
        }
        if header.starts_with(b"OggS") {
            return Some(SoundFormat::OggVorbis);
        }
        if header.starts_with(b"ID3") || is_mpeg_frame_sync(header) {
            return Some(SoundFormat::Mp3);
        }
        None
    }

    /// File extension passed to symphonia as a format hint
    pub fn extension(&self) -> &'static str {
        match self {
            SoundFormat::Wav => "wav",
            SoundFormat::Flac => "flac",
            SoundFormat::OggVorbis => "ogg",
            SoundFormat::Mp3 => "mp3",
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            SoundFormat::Wav => "WAV",
            SoundFormat::Flac => "FLAC",
            SoundFormat::OggVorbis => "Ogg Vorbis",
            SoundFormat::Mp3 => "MP3",
        }
    }

    /// Whether the codec is lossless
    pub fn is_lossless(&self) -> bool {
        matches!(self, SoundFormat::Wav | SoundFormat::Flac)
    }

    /// Guess the format from a file extension (used when scanning folders)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Some(SoundFormat::Wav),
            "flac" => Some(SoundFormat::Flac),
            "ogg" | "oga" => Some(SoundFormat::OggVorbis),
            "mp3" => Some(SoundFormat::Mp3),
            _ => None,
        }
    }
}

impl std::fmt::Display for SoundFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// MPEG audio frame header: 11 sync bits, then non-reserved version and layer
fn is_mpeg_frame_sync(header: &[u8]) -> bool {
    if header.len() < 2 || header[0] != 0xFF || header[1] & 0xE0 != 0xE0 {
        return false;
    }
    let version = (header[1] >> 3) & 0b11;
    let layer = (header[1] >> 1) & 0b11;
    version != 0b01 && layer != 0b00
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_known_signatures() {
        assert_eq!(
            SoundFormat::sniff(b"RIFF\x24\x00\x00\x00WAVEfmt "),
            Some(SoundFormat::Wav)
        );
        assert_eq!(SoundFormat::sniff(b"fLaC\x00\x00\x00\x22"), Some(SoundFormat::Flac));
        assert_eq!(SoundFormat::sniff(b"OggS\x00\x02"), Some(SoundFormat::OggVorbis));
        assert_eq!(SoundFormat::sniff(b"ID3\x04\x00"), Some(SoundFormat::Mp3));
        // MPEG-1 Layer III frame header without a tag
        assert_eq!(SoundFormat::sniff(&[0xFF, 0xFB, 0x90, 0x64]), Some(SoundFormat::Mp3));
    }

    #[test]
    fn test_sniff_rejects_unknown() {
        assert_eq!(SoundFormat::sniff(b""), None);
        assert_eq!(SoundFormat::sniff(b"RIFF\x24\x00\x00\x00AVI "), None);
        assert_eq!(SoundFormat::sniff(b"%PDF-1.7"), None);
        // Sync bits with a reserved layer
        assert_eq!(SoundFormat::sniff(&[0xFF, 0xF9]), None);
    }

    #[test]
    fn test_lossless_and_lossy_are_both_covered() {
        assert!(SoundFormat::ALL.iter().any(|f| f.is_lossless()));
        assert!(SoundFormat::ALL.iter().any(|f| !f.is_lossless()));
        assert_eq!(SoundFormat::from_extension("MP3"), Some(SoundFormat::Mp3));
        assert_eq!(SoundFormat::from_extension("txt"), None);
    }
}
