// WAV output for synthesized audio

use std::path::Path;

use anyhow::Context;
use hound::{SampleFormat, WavSpec, WavWriter};

/// Write mono 16-bit PCM to `path`, creating parent directories as
/// needed.
pub fn write_wav_i16(path: &Path, samples: &[i16], sample_rate: u32) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("creating WAV file {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
