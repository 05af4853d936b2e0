use std::{io::Cursor, path::Path};

const I16_MAX_F32: f32 = i16::MAX as f32;

fn pcm16_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

#[inline]
fn to_i16(s: f32) -> i16 {
    (s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16
}

/// Encode mono f32 samples as a 16-bit PCM WAV file held in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    // WAV header (44 bytes) + samples (2 bytes per sample)
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, pcm16_spec(sample_rate))?;
        for &s in samples {
            writer.write_sample(to_i16(s))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Same encoding as [`encode_wav`], written straight to `path`.
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    samples: &[f32],
    sample_rate: u32,
) -> Result<(), hound::Error> {
    let mut writer = hound::WavWriter::create(path, pcm16_spec(sample_rate))?;
    for &s in samples {
        writer.write_sample(to_i16(s))?;
    }
    writer.finalize()
}

pub fn duration_secs(sample_count: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    sample_count as f64 / sample_rate as f64
}
