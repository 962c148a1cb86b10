// Wire frame codec: MessagePack maps with a "type" discriminator

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Frames sent to the server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingFrame {
    Text { text: String },
    Eos,
}

/// Frames received from the server. Servers differ on the exact
/// discriminator spelling; aliases fold the known variants into one
/// kind each, and anything unrecognized lands in `Other` so newer
/// server message types are ignored rather than rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum IncomingFrame {
    #[serde(
        alias = "Pcm",
        alias = "AudioPcm",
        alias = "AudioChunk",
        alias = "AudioF32",
        alias = "AudioI16"
    )]
    Audio(AudioPayload),

    #[serde(alias = "Final", alias = "Done", alias = "Marker")]
    End {},

    Error {
        #[serde(default)]
        message: Option<String>,
    },

    #[serde(other)]
    Other,
}

/// Audio frame body. The payload may arrive under any of several
/// field names depending on the server build; all candidates are kept
/// so the normalizer can probe them in priority order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioPayload {
    #[serde(default)]
    pub pcm: Option<PcmData>,
    #[serde(default)]
    pub data: Option<PcmData>,
    #[serde(default)]
    pub pcm_i16: Option<Vec<i16>>,
    #[serde(default)]
    pub pcm_f32: Option<Vec<f32>>,
    #[serde(default)]
    pub samples: Option<PcmData>,
    #[serde(default, alias = "sr")]
    pub sample_rate: Option<u32>,
}

/// A sample buffer whose numeric representation is only known at
/// decode time. Integer arrays must be tried first: serde's float
/// impls accept integer values, so the reverse order would swallow
/// int16 payloads as floats.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PcmData {
    Int(Vec<i16>),
    Float(Vec<f32>),
}

pub fn encode(frame: &OutgoingFrame) -> Result<Vec<u8>, ClientError> {
    Ok(rmp_serde::to_vec_named(frame)?)
}

pub fn decode(bytes: &[u8]) -> Result<IncomingFrame, ClientError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pack(value: &serde_json::Value) -> Vec<u8> {
        rmp_serde::to_vec_named(value).unwrap()
    }

    #[test]
    fn test_encode_text_frame() {
        let bytes = encode(&OutgoingFrame::Text {
            text: " hello there".to_string(),
        })
        .unwrap();
        let value: serde_json::Value = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "Text");
        assert_eq!(value["text"], " hello there");
    }

    #[test]
    fn test_encode_eos_frame() {
        let bytes = encode(&OutgoingFrame::Eos).unwrap();
        let value: serde_json::Value = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "Eos");
    }

    #[test]
    fn test_decode_audio_aliases() {
        for kind in ["Audio", "Pcm", "AudioPcm", "AudioChunk", "AudioF32", "AudioI16"] {
            let bytes = pack(&json!({ "type": kind, "pcm": [0.0, 0.5] }));
            match decode(&bytes).unwrap() {
                IncomingFrame::Audio(payload) => {
                    assert!(payload.pcm.is_some(), "kind {kind}");
                }
                other => panic!("kind {kind} decoded to {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_int_payload_stays_int() {
        let bytes = pack(&json!({ "type": "Audio", "pcm_i16": [1, -2, 3], "sample_rate": 24000 }));
        match decode(&bytes).unwrap() {
            IncomingFrame::Audio(payload) => {
                assert_eq!(payload.pcm_i16.as_deref(), Some(&[1i16, -2, 3][..]));
                assert_eq!(payload.sample_rate, Some(24000));
            }
            other => panic!("decoded to {other:?}"),
        }
    }

    #[test]
    fn test_decode_untagged_pcm_discriminates() {
        let bytes = pack(&json!({ "type": "Audio", "data": [1, 2, 3] }));
        match decode(&bytes).unwrap() {
            IncomingFrame::Audio(payload) => {
                assert!(matches!(payload.data, Some(PcmData::Int(_))));
            }
            other => panic!("decoded to {other:?}"),
        }

        let bytes = pack(&json!({ "type": "Audio", "data": [0.25, -0.5] }));
        match decode(&bytes).unwrap() {
            IncomingFrame::Audio(payload) => {
                assert!(matches!(payload.data, Some(PcmData::Float(_))));
            }
            other => panic!("decoded to {other:?}"),
        }
    }

    #[test]
    fn test_decode_sr_alias() {
        let bytes = pack(&json!({ "type": "Audio", "pcm": [0.0], "sr": 16000 }));
        match decode(&bytes).unwrap() {
            IncomingFrame::Audio(payload) => assert_eq!(payload.sample_rate, Some(16000)),
            other => panic!("decoded to {other:?}"),
        }
    }

    #[test]
    fn test_decode_end_aliases() {
        for kind in ["End", "Final", "Done", "Marker"] {
            let bytes = pack(&json!({ "type": kind }));
            assert!(
                matches!(decode(&bytes).unwrap(), IncomingFrame::End {}),
                "kind {kind}"
            );
        }
    }

    #[test]
    fn test_decode_error_frame() {
        let bytes = pack(&json!({ "type": "Error", "message": "out of capacity" }));
        match decode(&bytes).unwrap() {
            IncomingFrame::Error { message } => {
                assert_eq!(message.as_deref(), Some("out of capacity"));
            }
            other => panic!("decoded to {other:?}"),
        }
    }

    #[test]
    fn test_unknown_discriminator_is_other() {
        let bytes = pack(&json!({ "type": "Ready" }));
        assert!(matches!(decode(&bytes).unwrap(), IncomingFrame::Other));

        // Future message kinds with payloads must be ignored too.
        let bytes = pack(&json!({ "type": "WordTimestamps", "text": "hi", "start_s": 0.0 }));
        assert!(matches!(decode(&bytes).unwrap(), IncomingFrame::Other));
    }

    #[test]
    fn test_malformed_record_is_protocol_error() {
        let err = decode(&[0xc1, 0x00, 0xff]).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}
