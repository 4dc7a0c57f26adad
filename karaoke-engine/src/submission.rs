use anyhow::Context;
use karaoke_audio::resample::resample_mono_f32;
use karaoke_audio::wav::encode_wav_pcm16;
use karaoke_core::calibration::{Offset, apply_offset};
use karaoke_core::types::LyricLine;
use karaoke_providers::backend::EvaluationRequest;
use karaoke_providers::multipart::AudioFile;

use crate::traits::RecordedAudio;

pub const PERFORMANCE_FILENAME: &str = "performance.wav";
pub const PERFORMANCE_MIME: &str = "audio/wav";

/// Everything besides the audio that goes into one scoring request.
#[derive(Debug, Clone)]
pub struct SubmissionContext<'a> {
    /// Raw lyric timeline as resolved; the offset is applied here, not by the caller.
    pub lyrics: &'a [LyricLine],
    pub offset: Offset,
    pub personality: &'a str,
    pub reference_audio_path: Option<&'a str>,
    pub target_sample_rate_hz: u32,
}

/// Packages a finished take into a scoring request.
///
/// The offset must be the one in effect when the performance finished, so that lyrics the user
/// re-synced mid-song are judged against the timing they actually sang to.
pub fn assemble_evaluation_request(
    audio: &RecordedAudio,
    ctx: &SubmissionContext<'_>,
) -> anyhow::Result<EvaluationRequest> {
    let (samples, rate) = if audio.samples.is_empty() || audio.sample_rate_hz == 0 {
        (Vec::new(), ctx.target_sample_rate_hz)
    } else if audio.sample_rate_hz != ctx.target_sample_rate_hz {
        let resampled =
            resample_mono_f32(&audio.samples, audio.sample_rate_hz, ctx.target_sample_rate_hz)
                .context("resample performance audio")?;
        (resampled, ctx.target_sample_rate_hz)
    } else {
        (audio.samples.clone(), audio.sample_rate_hz)
    };

    let bytes = encode_wav_pcm16(&samples, rate).context("encode performance audio")?;
    log::debug!(
        "assembled take: {} samples @ {} Hz, {} bytes",
        samples.len(),
        rate,
        bytes.len()
    );

    Ok(EvaluationRequest {
        audio: AudioFile {
            filename: PERFORMANCE_FILENAME.into(),
            mime_type: PERFORMANCE_MIME.into(),
            bytes,
        },
        personality: ctx.personality.to_string(),
        reference_lyrics: apply_offset(ctx.lyrics, ctx.offset),
        offset: ctx.offset,
        reference_audio_path: ctx
            .reference_audio_path
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lyrics() -> Vec<LyricLine> {
        vec![
            LyricLine::new("one", 0.0),
            LyricLine::new("two", 2.0),
            LyricLine::new("three", 5.0),
        ]
    }

    #[test]
    fn applies_current_offset_and_keeps_it_for_the_form() {
        let lines = lyrics();
        let audio = RecordedAudio {
            sample_rate_hz: 16_000,
            samples: vec![0.0; 160],
        };
        let req = assemble_evaluation_request(
            &audio,
            &SubmissionContext {
                lyrics: &lines,
                offset: Offset(-2.0),
                personality: "friendly",
                reference_audio_path: Some("songs/a.mp4"),
                target_sample_rate_hz: 16_000,
            },
        )
        .unwrap();

        let ts: Vec<f64> = req.reference_lyrics.iter().map(|l| l.timestamp).collect();
        assert_eq!(ts, vec![2.0, 4.0, 7.0]);
        assert_eq!(req.offset, Offset(-2.0));
        assert_eq!(req.personality, "friendly");
        assert_eq!(req.reference_audio_path.as_deref(), Some("songs/a.mp4"));
        assert_eq!(req.audio.filename, "performance.wav");
        assert_eq!(req.audio.mime_type, "audio/wav");
        assert_eq!(req.audio.bytes.len(), 44 + 160 * 2);
    }

    #[test]
    fn empty_take_still_produces_a_request() {
        let req = assemble_evaluation_request(
            &RecordedAudio {
                sample_rate_hz: 0,
                samples: vec![],
            },
            &SubmissionContext {
                lyrics: &[],
                offset: Offset::ZERO,
                personality: "strict_judge",
                reference_audio_path: Some("  "),
                target_sample_rate_hz: 16_000,
            },
        )
        .unwrap();
        assert_eq!(req.audio.bytes.len(), 44);
        assert!(req.reference_lyrics.is_empty());
        assert_eq!(req.reference_audio_path, None);
    }

    #[test]
    fn resamples_to_target_rate() {
        let audio = RecordedAudio {
            sample_rate_hz: 48_000,
            samples: vec![0.0; 4800],
        };
        let lines = lyrics();
        let req = assemble_evaluation_request(
            &audio,
            &SubmissionContext {
                lyrics: &lines,
                offset: Offset::ZERO,
                personality: "friendly",
                reference_audio_path: None,
                target_sample_rate_hz: 16_000,
            },
        )
        .unwrap();
        // Sample rate field of the canonical header.
        let rate = u32::from_le_bytes([
            req.audio.bytes[24],
            req.audio.bytes[25],
            req.audio.bytes[26],
            req.audio.bytes[27],
        ]);
        assert_eq!(rate, 16_000);
    }
}
