// Session configuration and environment resolution

use std::time::Duration;

use url::Url;

use crate::error::ClientError;

/// Fixed operating rate of the synthesis model.
pub const DEFAULT_SAMPLE_RATE: u32 = 24000;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "kyutai-api-key";

/// Well-known placeholder token accepted by public deployments.
pub const DEFAULT_API_KEY: &str = "public_token";

pub const SERVER_ENV: &str = "YAP_TTS_SERVER";
pub const VOICE_ENV: &str = "YAP_TTS_VOICE";
pub const API_KEY_ENV: &str = "KYUTAI_API_KEY";

/// Resolve a setting from (explicit argument, environment variable,
/// hardcoded default), in that order.
pub fn resolve(explicit: Option<String>, env_key: &str, default: &str) -> String {
    resolve_opt(explicit, env_key)
        .unwrap_or_else(|| default.to_string())
}

/// Same fallback chain but without a default.
pub fn resolve_opt(explicit: Option<String>, env_key: &str) -> Option<String> {
    explicit
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(env_key).ok().filter(|s| !s.trim().is_empty()))
}

/// How the text prompt is split into streamed fragments.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPolicy {
    /// Approximate token budget per fragment.
    pub target_tokens: usize,
    /// Prefix every chunk with a space instead of only non-first chunks.
    /// Some tokenizer alignments want the first fragment spaced too.
    pub space_every_chunk: bool,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            target_tokens: 8,
            space_every_chunk: false,
        }
    }
}

/// Whether the sample rate reported by the server is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatePolicy {
    /// Use the rate from the audio frame, falling back to 24 kHz.
    Reported,
    /// Always force 24 kHz; the underlying codec only operates there.
    Forced,
}

/// Audio normalization policy.
#[derive(Debug, Clone, Copy)]
pub struct PcmPolicy {
    pub rate: RatePolicy,
    /// Leading samples to drop once per session (voice-priming echo).
    pub trim_samples: usize,
}

impl Default for PcmPolicy {
    fn default() -> Self {
        Self {
            rate: RatePolicy::Reported,
            trim_samples: 0,
        }
    }
}

/// Immutable per-session configuration. Built once from caller input
/// before any session starts.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// `host:port` or a full `ws://` / `wss://` URL.
    pub server: String,
    /// Reference voice path understood by the server.
    pub voice: Option<String>,
    pub api_key: String,
    /// Sampling parameters, passed through opaquely.
    pub max_seq_len: Option<u32>,
    pub temperature: Option<f64>,
    pub seed: Option<u64>,
    pub chunk: ChunkPolicy,
    pub pcm: PcmPolicy,
    /// Bounded wait for an immediate handshake/metadata frame.
    pub handshake_wait: Duration,
}

impl SessionConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            voice: None,
            api_key: DEFAULT_API_KEY.to_string(),
            max_seq_len: None,
            temperature: None,
            seed: None,
            chunk: ChunkPolicy::default(),
            pcm: PcmPolicy::default(),
            handshake_wait: Duration::from_millis(300),
        }
    }

    /// Build the streaming endpoint URL: base server address, fixed API
    /// path and query parameters. Absent parameters mean server defaults.
    pub fn endpoint_url(&self) -> Result<Url, ClientError> {
        let base = normalize_server(&self.server);
        let mut url = Url::parse(&base)?;

        let path = if url.path().ends_with("/api/tts_streaming") {
            url.path().to_string()
        } else {
            format!("{}/api/tts_streaming", url.path().trim_end_matches('/'))
        };
        url.set_path(&path);

        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("format", "PcmMessagePack");
            if let Some(voice) = &self.voice {
                qp.append_pair("voice", voice);
            }
            if let Some(max_seq_len) = self.max_seq_len {
                qp.append_pair("max_seq_len", &max_seq_len.to_string());
            }
            if let Some(temp) = self.temperature {
                qp.append_pair("temp", &temp.to_string());
            }
            if let Some(seed) = self.seed {
                qp.append_pair("seed", &seed.to_string());
            }
        }

        Ok(url)
    }
}

/// Prefix a bare `host:port` with a scheme. Proxy hosts under
/// runpod.net terminate TLS, so they get `wss://` automatically.
fn normalize_server(server: &str) -> String {
    let s = server.trim().trim_end_matches('/');
    if s.starts_with("ws://") || s.starts_with("wss://") {
        return s.to_string();
    }
    let host = s.split(':').next().unwrap_or(s).to_ascii_lowercase();
    if host.ends_with("runpod.net") {
        format!("wss://{s}")
    } else {
        format!("ws://{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_basic() {
        let cfg = SessionConfig::new("127.0.0.1:8089");
        let url = cfg.endpoint_url().unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/api/tts_streaming");
        assert!(url.query().unwrap().contains("format=PcmMessagePack"));
    }

    #[test]
    fn test_endpoint_url_params() {
        let mut cfg = SessionConfig::new("ws://localhost:8089");
        cfg.voice = Some("ears/p004/freeform_speech_01.wav".to_string());
        cfg.max_seq_len = Some(768);
        cfg.temperature = Some(0.2);
        cfg.seed = Some(42);
        let url = cfg.endpoint_url().unwrap();
        let q = url.query().unwrap();
        assert!(q.contains("voice=ears%2Fp004%2Ffreeform_speech_01.wav"));
        assert!(q.contains("max_seq_len=768"));
        assert!(q.contains("temp=0.2"));
        assert!(q.contains("seed=42"));
    }

    #[test]
    fn test_endpoint_url_keeps_existing_path() {
        let cfg = SessionConfig::new("wss://example.com/api/tts_streaming");
        let url = cfg.endpoint_url().unwrap();
        assert_eq!(url.path(), "/api/tts_streaming");
        assert_eq!(url.scheme(), "wss");
    }

    #[test]
    fn test_runpod_proxy_auto_tls() {
        let cfg = SessionConfig::new("abc123-8089.proxy.runpod.net");
        let url = cfg.endpoint_url().unwrap();
        assert_eq!(url.scheme(), "wss");
    }

    #[test]
    fn test_resolve_prefers_explicit() {
        std::env::set_var("TTS_CLIENT_TEST_RESOLVE", "from-env");
        assert_eq!(
            resolve(Some("explicit".into()), "TTS_CLIENT_TEST_RESOLVE", "dflt"),
            "explicit"
        );
        assert_eq!(
            resolve(None, "TTS_CLIENT_TEST_RESOLVE", "dflt"),
            "from-env"
        );
        std::env::remove_var("TTS_CLIENT_TEST_RESOLVE");
        assert_eq!(resolve(None, "TTS_CLIENT_TEST_RESOLVE", "dflt"), "dflt");
    }

    #[test]
    fn test_resolve_ignores_blank_explicit() {
        std::env::remove_var("TTS_CLIENT_TEST_BLANK");
        assert_eq!(resolve(Some("  ".into()), "TTS_CLIENT_TEST_BLANK", "dflt"), "dflt");
    }
}
