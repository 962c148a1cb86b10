// One synthesis session: duplex streaming over a single connection

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::chunker::chunk_text;
use crate::codec::{self, IncomingFrame, OutgoingFrame};
use crate::config::{SessionConfig, DEFAULT_SAMPLE_RATE};
use crate::error::ClientError;
use crate::pcm::{AudioSegment, PcmNormalizer};
use crate::transport::{Connector, FrameSink, FrameSource};

/// How long a finished receiver waits for outstanding sender work.
/// The sender's outcome is not required for a clean close.
const FINALIZE_WAIT: Duration = Duration::from_secs(5);

/// Latency and throughput figures for one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetrics {
    /// Wall-clock time from connection open to close.
    pub wall_s: f64,
    /// Total synthesized audio duration.
    pub audio_s: f64,
    /// Time from connection open to first non-empty audio.
    pub ttfb_s: Option<f64>,
    /// Time from first chunk dispatch to first non-empty audio.
    pub server_ttfb_s: Option<f64>,
    /// Real-time factor: wall / audio. 1.0 keeps pace with playback.
    pub rtf: Option<f64>,
    /// Speed factor: audio / wall.
    pub xrt: f64,
    pub sample_rate: u32,
    /// Non-fatal conditions observed during the session.
    pub warning: Option<String>,
}

/// Result of a successfully closed session. A session that produced
/// zero audio still closes successfully; the empty buffer is the
/// caller's signal.
#[derive(Debug)]
pub struct SessionOutcome {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub metrics: SessionMetrics,
}

/// Run one session: connect, stream the prompt while consuming audio,
/// and report metrics. Transport, protocol and server errors abort
/// the session; retries are the caller's concern.
pub async fn run_session(
    config: &SessionConfig,
    text: &str,
    connector: &dyn Connector,
) -> Result<SessionOutcome, ClientError> {
    debug!(state = "connecting", server = %config.server);
    let connected_at = Instant::now();
    let (mut sink, mut source) = connector.connect(config).await?;

    // Some servers emit a metadata frame right after the handshake.
    // A timeout here only means no early frame existed.
    let early = match tokio::time::timeout(config.handshake_wait, source.next_binary()).await {
        Ok(result) => result?,
        Err(_) => None,
    };

    debug!(state = "streaming");
    let chunks = chunk_text(text, &config.chunk);
    let space_every_chunk = config.chunk.space_every_chunk;

    // Written exactly once by the sender, read by the receiver.
    let dispatched_at: Arc<OnceLock<Instant>> = Arc::new(OnceLock::new());
    let sender_mark = Arc::clone(&dispatched_at);

    let mut sender = tokio::spawn(async move {
        for chunk in &chunks {
            let frame = OutgoingFrame::Text {
                text: chunk.wire_text(space_every_chunk),
            };
            let _ = sender_mark.set(Instant::now());
            sink.send(codec::encode(&frame)?).await?;
            // Yield after every frame so the receiver is never starved
            // on a single-threaded scheduler.
            tokio::task::yield_now().await;
        }
        // Eos goes out even when the prompt produced no chunks.
        sink.send(codec::encode(&OutgoingFrame::Eos)?).await?;
        Ok::<(), ClientError>(())
    });

    let mut receiver = Receiver::new(config, connected_at, dispatched_at);
    let streamed: Result<(), ClientError> = async {
        if let Some(bytes) = early {
            if receiver.handle(&bytes)? == Flow::Done {
                return Ok(());
            }
        }
        loop {
            match source.next_binary().await? {
                Some(bytes) => {
                    if receiver.handle(&bytes)? == Flow::Done {
                        return Ok(());
                    }
                }
                None => {
                    return Err(ClientError::Transport(
                        "connection closed before end of stream".to_string(),
                    ))
                }
            }
        }
    }
    .await;

    match streamed {
        Ok(()) => {
            // Wall time ends at end-of-stream, not after the bounded
            // sender wait below.
            let wall = connected_at.elapsed();
            debug!(state = "finalizing");
            if tokio::time::timeout(FINALIZE_WAIT, &mut sender).await.is_err() {
                // A sender still blocked past end-of-stream would
                // otherwise outlive the session and keep the sink open.
                sender.abort();
            }
            let outcome = receiver.close(wall);
            debug!(
                state = "closed",
                wall_s = outcome.metrics.wall_s,
                audio_s = outcome.metrics.audio_s
            );
            Ok(outcome)
        }
        Err(e) => {
            // Tear both halves down together; no partial success.
            sender.abort();
            debug!(state = "closed", error = %e);
            Err(e)
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Done,
}

/// Receiver-side session state: the ordered segment list, observed
/// sample rates and the first-audio timestamps.
struct Receiver {
    normalizer: PcmNormalizer,
    segments: Vec<AudioSegment>,
    observed_rates: Vec<u32>,
    connected_at: Instant,
    dispatched_at: Arc<OnceLock<Instant>>,
    ttfb: Option<Duration>,
    server_ttfb: Option<Duration>,
}

impl Receiver {
    fn new(
        config: &SessionConfig,
        connected_at: Instant,
        dispatched_at: Arc<OnceLock<Instant>>,
    ) -> Self {
        Self {
            normalizer: PcmNormalizer::new(config.pcm),
            segments: Vec::new(),
            observed_rates: Vec::new(),
            connected_at,
            dispatched_at,
            ttfb: None,
            server_ttfb: None,
        }
    }

    fn handle(&mut self, bytes: &[u8]) -> Result<Flow, ClientError> {
        match codec::decode(bytes)? {
            IncomingFrame::Audio(payload) => {
                if let Some(segment) = self.normalizer.normalize(&payload) {
                    if self.ttfb.is_none() {
                        let now = Instant::now();
                        self.ttfb = Some(now.duration_since(self.connected_at));
                        if let Some(mark) = self.dispatched_at.get() {
                            self.server_ttfb = Some(now.saturating_duration_since(*mark));
                        }
                    }
                    if !self.observed_rates.contains(&segment.sample_rate) {
                        if !self.observed_rates.is_empty() {
                            warn!(
                                previous = self.observed_rates[0],
                                observed = segment.sample_rate,
                                "sample rate changed mid-session"
                            );
                        }
                        self.observed_rates.push(segment.sample_rate);
                    }
                    self.segments.push(segment);
                }
                Ok(Flow::Continue)
            }
            IncomingFrame::End {} => Ok(Flow::Done),
            IncomingFrame::Error { message } => Err(ClientError::Server(
                message.unwrap_or_else(|| "unspecified server error".to_string()),
            )),
            IncomingFrame::Other => Ok(Flow::Continue),
        }
    }

    fn close(self, wall: Duration) -> SessionOutcome {
        let sample_rate = self
            .observed_rates
            .first()
            .copied()
            .unwrap_or(DEFAULT_SAMPLE_RATE);
        let audio_s: f64 = self.segments.iter().map(AudioSegment::duration_s).sum();
        let wall_s = wall.as_secs_f64();

        let warning = if self.observed_rates.len() > 1 {
            Some(format!(
                "inconsistent sample rates observed: {:?}",
                self.observed_rates
            ))
        } else {
            None
        };

        let metrics = SessionMetrics {
            wall_s,
            audio_s,
            ttfb_s: self.ttfb.map(|d| d.as_secs_f64()),
            server_ttfb_s: self.server_ttfb.map(|d| d.as_secs_f64()),
            rtf: (audio_s > 0.0).then(|| wall_s / audio_s),
            xrt: if wall_s > 0.0 { audio_s / wall_s } else { 0.0 },
            sample_rate,
            warning,
        };

        let mut samples = Vec::with_capacity(self.segments.iter().map(|s| s.samples.len()).sum());
        for segment in self.segments {
            samples.extend_from_slice(&segment.samples);
        }

        SessionOutcome {
            samples,
            sample_rate,
            metrics,
        }
    }
}
