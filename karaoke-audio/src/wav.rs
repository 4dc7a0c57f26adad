use anyhow::Context;
use hound::{WavSpec, WavWriter};
use std::io::Cursor;

/// Encodes mono f32 samples as a 16-bit PCM WAV file in memory.
///
/// Samples outside [-1, 1] are clamped rather than wrapped.
pub fn encode_wav_pcm16(samples: &[f32], sample_rate_hz: u32) -> anyhow::Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).context("create wav writer")?;
        for &s in samples {
            writer
                .write_sample(to_i16(s))
                .context("write wav sample")?;
        }
        writer.finalize().context("finalize wav")?;
    }

    Ok(cursor.into_inner())
}

fn to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
