use anyhow::{Context, Result};
use std::io::Cursor;
use tracing::debug;

/// Encoding used when none of the preferred MIME types is supported.
pub const DEFAULT_SEGMENT_MIME: &str = "audio/wav";

/// MIME types the built-in encoder can actually produce.
const SUPPORTED_MIME_TYPES: &[&str] = &["audio/wav", "audio/x-wav", "audio/wave", "audio/vnd.wave"];

/// Whether a MIME type (optionally carrying codec parameters) is supported.
pub fn is_mime_supported(mime: &str) -> bool {
    let base = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    SUPPORTED_MIME_TYPES.contains(&base.as_str())
}

/// Probe an ordered preference list and return the first supported MIME type.
///
/// Returns `None` when nothing matches; callers fall back to
/// [`DEFAULT_SEGMENT_MIME`] rather than failing the session.
pub fn negotiate_segment_mime(preferred: &[String]) -> Option<String> {
    for mime in preferred {
        if is_mime_supported(mime) {
            debug!(%mime, "negotiated segment MIME type");
            return Some(mime.clone());
        }
    }
    None
}

/// Encode interleaved i16 PCM into an in-memory WAV container.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("failed to create WAV writer")?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .context("failed to write sample to WAV buffer")?;
        }
        writer.finalize().context("failed to finalize WAV buffer")?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_picks_first_supported_type() {
        let preferred = vec![
            "audio/webm;codecs=opus".to_string(),
            "audio/wav;codecs=pcm_s16le".to_string(),
            "audio/wav".to_string(),
        ];
        assert_eq!(
            negotiate_segment_mime(&preferred),
            Some("audio/wav;codecs=pcm_s16le".to_string())
        );
    }

    #[test]
    fn negotiation_returns_none_when_nothing_matches() {
        let preferred = vec!["audio/webm".to_string(), "audio/mp4".to_string()];
        assert_eq!(negotiate_segment_mime(&preferred), None);
    }

    #[test]
    fn mime_check_ignores_codec_parameters_and_case() {
        assert!(is_mime_supported("AUDIO/WAV"));
        assert!(is_mime_supported("audio/x-wav; codecs=1"));
        assert!(!is_mime_supported("audio/ogg;codecs=opus"));
    }

    #[test]
    fn encoded_wav_carries_riff_header_and_data() {
        let bytes = encode_wav(&[0, 100, -100, 32000], 16000, 1).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 44-byte canonical header + 4 samples * 2 bytes
        assert_eq!(bytes.len(), 44 + 8);
    }
}
