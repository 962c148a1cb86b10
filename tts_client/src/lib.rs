//! Streaming TTS client: one WebSocket session per prompt, text
//! chunks out while PCM frames come back, with latency and throughput
//! metrics per session and pooled batch execution on top.

pub mod chunker;
pub mod codec;
pub mod config;
pub mod error;
pub mod pcm;
pub mod pool;
pub mod session;
pub mod stats;
pub mod transport;
pub mod wav;

pub use chunker::{chunk_text, TextChunk};
pub use config::{ChunkPolicy, PcmPolicy, RatePolicy, SessionConfig};
pub use error::ClientError;
pub use pool::{run_pool, PoolOutcome, SessionFailure};
pub use session::{run_session, SessionMetrics, SessionOutcome};
pub use stats::{StatLine, Summary};
pub use transport::{Connector, FrameSink, FrameSource, WsConnector};
