//! Load generator for a streaming TTS server: runs a batch of
//! concurrent synthesis sessions, saves the audio and per-session
//! metrics, and prints a latency/throughput summary.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use tts_client::config::{
    self, DEFAULT_API_KEY, API_KEY_ENV, SERVER_ENV, VOICE_ENV,
};
use tts_client::stats::Summary;
use tts_client::{
    run_pool, run_session, wav, ChunkPolicy, PcmPolicy, RatePolicy, SessionConfig,
    SessionFailure, SessionMetrics, WsConnector,
};

const DEFAULT_TEXT: &str = "This is a test of the streaming text to speech system. \
     The quick brown fox jumps over the lazy dog while the audio \
     pipeline keeps every sample in order from the first word to the last.";

#[derive(Debug, Parser)]
#[command(name = "tts-bench", about = "Streaming TTS benchmark client")]
struct Args {
    /// Server address: host:port or a full ws:// / wss:// URL.
    #[arg(long)]
    server: Option<String>,

    /// Number of synthesis requests in the batch.
    #[arg(short = 'n', long, default_value_t = 1)]
    requests: usize,

    /// Maximum sessions in flight at once.
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Reference voice path understood by the server.
    #[arg(long)]
    voice: Option<String>,

    /// Prompt text; repeat the flag to cycle through several prompts.
    #[arg(long = "text")]
    texts: Vec<String>,

    #[arg(long)]
    api_key: Option<String>,

    /// Directory for WAV files, metrics and error logs.
    #[arg(long, default_value = "bench_out")]
    out_dir: PathBuf,

    /// Approximate tokens per streamed text fragment.
    #[arg(long, default_value_t = 8)]
    target_tokens: usize,

    /// Space-prefix every fragment, not just the non-first ones.
    #[arg(long, default_value_t = false)]
    space_every_chunk: bool,

    /// Ignore server-reported sample rates and force 24 kHz.
    #[arg(long, default_value_t = false)]
    force_sample_rate: bool,

    /// Leading samples to drop once per session.
    #[arg(long, default_value_t = 0)]
    trim_samples: usize,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    temperature: Option<f64>,

    #[arg(long)]
    max_seq_len: Option<u32>,

    /// Run one unrecorded session first to warm server caches.
    #[arg(long, default_value_t = false)]
    warmup: bool,
}

/// One JSONL record per successful session.
#[derive(Debug, Serialize)]
struct MetricsRecord<'a> {
    index: usize,
    #[serde(flatten)]
    metrics: &'a SessionMetrics,
    wav: String,
}

fn session_config(args: &Args) -> SessionConfig {
    let server = config::resolve(args.server.clone(), SERVER_ENV, "127.0.0.1:8089");
    let mut cfg = SessionConfig::new(server);
    cfg.voice = config::resolve_opt(args.voice.clone(), VOICE_ENV);
    cfg.api_key = config::resolve(args.api_key.clone(), API_KEY_ENV, DEFAULT_API_KEY);
    cfg.max_seq_len = args.max_seq_len;
    cfg.temperature = args.temperature;
    cfg.seed = args.seed;
    cfg.chunk = ChunkPolicy {
        target_tokens: args.target_tokens,
        space_every_chunk: args.space_every_chunk,
    };
    cfg.pcm = PcmPolicy {
        rate: if args.force_sample_rate {
            RatePolicy::Forced
        } else {
            RatePolicy::Reported
        },
        trim_samples: args.trim_samples,
    };
    cfg
}

fn append_failures(path: &Path, failures: &[SessionFailure]) -> anyhow::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    for failure in failures {
        writeln!(
            file,
            "{} request {} failed: {}",
            chrono::Utc::now().to_rfc3339(),
            failure.index,
            failure.message
        )?;
    }
    Ok(())
}

fn stat_row(label: &str, line: &Option<tts_client::StatLine>, unit: &str) {
    match line {
        Some(s) => println!(
            "  {label:<14} avg {:.3}{unit}  p50 {:.3}{unit}  p95 {:.3}{unit}",
            s.avg, s.p50, s.p95
        ),
        None => println!("  {label:<14} n/a"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    let args = Args::parse();
    let cfg = session_config(&args);
    let texts = if args.texts.is_empty() {
        vec![DEFAULT_TEXT.to_string()]
    } else {
        args.texts.clone()
    };

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating output directory {}", args.out_dir.display()))?;
    let run_id = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

    info!(
        server = %cfg.server,
        requests = args.requests,
        concurrency = args.concurrency,
        "starting benchmark"
    );

    let connector = Arc::new(WsConnector);

    if args.warmup {
        info!("running warmup session (excluded from results)");
        match run_session(&cfg, &texts[0], connector.as_ref()).await {
            Ok(outcome) => info!(
                audio_s = outcome.metrics.audio_s,
                wall_s = outcome.metrics.wall_s,
                "warmup complete"
            ),
            Err(e) => warn!(error = %e, "warmup session failed, continuing"),
        }
        // Give the server a moment to release the warmup slot.
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let outcome = run_pool(
        cfg,
        texts,
        args.requests,
        args.concurrency,
        connector,
    )
    .await;

    let metrics_path = args.out_dir.join(format!("bench_{run_id}_metrics.jsonl"));
    let mut metrics_file = fs::File::create(&metrics_path)
        .with_context(|| format!("creating {}", metrics_path.display()))?;

    for (index, session) in &outcome.results {
        let wav_name = format!("bench_{run_id}_{index:05}.wav");
        let wav_path = args.out_dir.join(&wav_name);
        wav::write_wav_i16(&wav_path, &session.samples, session.sample_rate)?;

        let record = MetricsRecord {
            index: *index,
            metrics: &session.metrics,
            wav: wav_name,
        };
        serde_json::to_writer(&mut metrics_file, &record)?;
        metrics_file.write_all(b"\n")?;

        if let Some(warning) = &session.metrics.warning {
            warn!(index, warning, "session completed with warning");
        }
    }

    if !outcome.failures.is_empty() {
        // One log per output directory, accumulating across runs.
        let errors_path = args.out_dir.join("bench_errors.log");
        append_failures(&errors_path, &outcome.failures)?;
        warn!(
            count = outcome.failures.len(),
            path = %errors_path.display(),
            "some requests failed"
        );
    }

    let metrics: Vec<&SessionMetrics> = outcome
        .results
        .iter()
        .map(|(_, session)| &session.metrics)
        .collect();
    let summary = Summary::compute(&metrics, outcome.failures.len(), outcome.elapsed_s);

    println!();
    println!("=== benchmark summary ===");
    println!("  {:<14} {} ok, {} failed", "sessions", summary.n, summary.failures);
    stat_row("wall", &summary.wall_s, "s");
    stat_row("ttfb", &summary.ttfb_s, "s");
    stat_row("server ttfb", &summary.server_ttfb_s, "s");
    stat_row("rtf", &summary.rtf, "");
    println!("  {:<14} {:.3}s", "audio avg", summary.avg_audio_s);
    println!("  {:<14} {:.3}x", "xrt avg", summary.avg_xrt);
    println!("  {:<14} {:.3}s", "audio total", summary.total_audio_s);
    println!("  {:<14} {:.3}s", "elapsed", summary.elapsed_s);
    println!(
        "  {:<14} {:.3}x realtime across the batch",
        "throughput", summary.throughput
    );
    println!("  results in {}", args.out_dir.display());

    if summary.n == 0 && summary.failures > 0 {
        anyhow::bail!("all {} requests failed", summary.failures);
    }
    Ok(())
}
