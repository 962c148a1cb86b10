// PCM normalization: canonical 16-bit signed mono samples

use crate::codec::{AudioPayload, PcmData};
use crate::config::{PcmPolicy, RatePolicy, DEFAULT_SAMPLE_RATE};

/// One contiguous run of normalized samples, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioSegment {
    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Converts decoded audio payloads into int16 segments. Holds the
/// leading-sample trim state, which spans chunk boundaries and is
/// disabled for the rest of the session once consumed.
#[derive(Debug)]
pub struct PcmNormalizer {
    policy: PcmPolicy,
    trim_remaining: usize,
}

impl PcmNormalizer {
    pub fn new(policy: PcmPolicy) -> Self {
        Self {
            trim_remaining: policy.trim_samples,
            policy,
        }
    }

    /// Normalize one payload, or return `None` when it carries no
    /// usable samples (missing field, empty buffer, fully trimmed).
    pub fn normalize(&mut self, payload: &AudioPayload) -> Option<AudioSegment> {
        let mut samples = extract_samples(payload)?;
        if samples.is_empty() {
            return None;
        }

        if self.trim_remaining > 0 {
            if samples.len() <= self.trim_remaining {
                self.trim_remaining -= samples.len();
                return None;
            }
            samples.drain(..self.trim_remaining);
            self.trim_remaining = 0;
        }

        let sample_rate = match self.policy.rate {
            RatePolicy::Forced => DEFAULT_SAMPLE_RATE,
            RatePolicy::Reported => payload.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
        };

        Some(AudioSegment {
            samples,
            sample_rate,
        })
    }
}

/// Probe the candidate payload fields in priority order and take the
/// first present one.
fn extract_samples(payload: &AudioPayload) -> Option<Vec<i16>> {
    if let Some(pcm) = &payload.pcm {
        return Some(to_i16(pcm));
    }
    if let Some(data) = &payload.data {
        return Some(to_i16(data));
    }
    if let Some(pcm_i16) = &payload.pcm_i16 {
        return Some(pcm_i16.clone());
    }
    if let Some(pcm_f32) = &payload.pcm_f32 {
        return Some(floats_to_i16(pcm_f32));
    }
    if let Some(samples) = &payload.samples {
        return Some(to_i16(samples));
    }
    None
}

fn to_i16(data: &PcmData) -> Vec<i16> {
    match data {
        // Integer payloads are assumed range-correct already.
        PcmData::Int(samples) => samples.clone(),
        PcmData::Float(samples) => floats_to_i16(samples),
    }
}

fn floats_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0).round() as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_with_pcm(data: PcmData) -> AudioPayload {
        AudioPayload {
            pcm: Some(data),
            ..Default::default()
        }
    }

    #[test]
    fn test_int16_passthrough_is_identity() {
        let mut norm = PcmNormalizer::new(PcmPolicy::default());
        let input = vec![0i16, 100, -100, i16::MAX, i16::MIN];
        let seg = norm
            .normalize(&payload_with_pcm(PcmData::Int(input.clone())))
            .unwrap();
        assert_eq!(seg.samples, input);
    }

    #[test]
    fn test_float_normalization_is_range_safe() {
        let mut norm = PcmNormalizer::new(PcmPolicy::default());
        let input = vec![0.0f32, 1.0, -1.0, 1.5, -1.5, 0.5];
        let seg = norm
            .normalize(&payload_with_pcm(PcmData::Float(input.clone())))
            .unwrap();
        let expected: Vec<i16> = input
            .iter()
            .map(|&x| (x.clamp(-1.0, 1.0) * 32767.0).round() as i16)
            .collect();
        assert_eq!(seg.samples, expected);
        for &s in &seg.samples {
            assert!((-32768..=32767).contains(&(s as i32)));
        }
    }

    #[test]
    fn test_probe_order_prefers_pcm() {
        let mut norm = PcmNormalizer::new(PcmPolicy::default());
        let payload = AudioPayload {
            pcm: Some(PcmData::Int(vec![1, 2])),
            data: Some(PcmData::Int(vec![9, 9, 9])),
            ..Default::default()
        };
        let seg = norm.normalize(&payload).unwrap();
        assert_eq!(seg.samples, vec![1, 2]);
    }

    #[test]
    fn test_explicit_field_names() {
        let mut norm = PcmNormalizer::new(PcmPolicy::default());
        let payload = AudioPayload {
            pcm_f32: Some(vec![0.5]),
            ..Default::default()
        };
        let seg = norm.normalize(&payload).unwrap();
        assert_eq!(seg.samples, vec![16384]);

        let payload = AudioPayload {
            samples: Some(PcmData::Int(vec![7])),
            ..Default::default()
        };
        let seg = norm.normalize(&payload).unwrap();
        assert_eq!(seg.samples, vec![7]);
    }

    #[test]
    fn test_empty_or_missing_payload() {
        let mut norm = PcmNormalizer::new(PcmPolicy::default());
        assert!(norm.normalize(&AudioPayload::default()).is_none());
        assert!(norm
            .normalize(&payload_with_pcm(PcmData::Int(vec![])))
            .is_none());
    }

    #[test]
    fn test_trim_spans_chunks_then_disables() {
        let mut norm = PcmNormalizer::new(PcmPolicy {
            rate: RatePolicy::Reported,
            trim_samples: 5,
        });
        // First chunk consumed entirely by the trim.
        assert!(norm
            .normalize(&payload_with_pcm(PcmData::Int(vec![1, 2, 3])))
            .is_none());
        // Second chunk loses the remaining two samples.
        let seg = norm
            .normalize(&payload_with_pcm(PcmData::Int(vec![4, 5, 6, 7])))
            .unwrap();
        assert_eq!(seg.samples, vec![6, 7]);
        // Trim is permanently disabled afterwards.
        let seg = norm
            .normalize(&payload_with_pcm(PcmData::Int(vec![8, 9])))
            .unwrap();
        assert_eq!(seg.samples, vec![8, 9]);
    }

    #[test]
    fn test_rate_policy() {
        let mut reported = PcmNormalizer::new(PcmPolicy::default());
        let mut payload = payload_with_pcm(PcmData::Int(vec![1]));
        payload.sample_rate = Some(16000);
        assert_eq!(reported.normalize(&payload).unwrap().sample_rate, 16000);

        let mut forced = PcmNormalizer::new(PcmPolicy {
            rate: RatePolicy::Forced,
            trim_samples: 0,
        });
        assert_eq!(
            forced.normalize(&payload).unwrap().sample_rate,
            DEFAULT_SAMPLE_RATE
        );

        // Missing rate falls back to the model's fixed operating rate.
        let mut payload = payload_with_pcm(PcmData::Int(vec![1]));
        payload.sample_rate = None;
        assert_eq!(
            reported.normalize(&payload).unwrap().sample_rate,
            DEFAULT_SAMPLE_RATE
        );
    }
}
