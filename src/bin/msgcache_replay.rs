use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use log::{info, warn};

use msgcache::api;
use msgcache::{BackpressurePolicy, CacheConfig, MessageCache, OrderingStrategy};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OrderArg {
    Lazy,
    Tree,
}

#[derive(Parser, Debug)]
#[command(name = "msgcache-replay")]
#[command(about = "Feed JSON-lines messages through an in-memory cache and print a listing")]
struct Cli {
    /// JSON-lines input, one {"ts": <int>, "msg": <string>} per line (stdin if omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Cache config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the ingestion queue capacity
    #[arg(long)]
    capacity: Option<usize>,

    /// Reject immediately when the queue is full instead of waiting
    #[arg(long)]
    fail_fast: bool,

    /// Override the timestamp ordering strategy
    #[arg(long, value_enum)]
    ordering: Option<OrderArg>,

    /// Number of concurrent producer threads
    #[arg(short, long, default_value_t = 4)]
    producers: usize,

    /// Print the newest N messages (default 100)
    #[arg(long, conflicts_with = "ts")]
    last: Option<String>,

    /// Print every message with this timestamp
    #[arg(long)]
    ts: Option<i64>,

    /// Seconds to wait for the queue to drain before listing
    #[arg(long, default_value_t = 30)]
    drain_timeout_secs: u64,

    /// Print an enqueue latency histogram to stderr
    #[arg(long)]
    latency: bool,

    /// CPU core to pin the ingest consumer to
    #[arg(long)]
    core_id: Option<usize>,
}

struct ProducerReport {
    accepted: u64,
    refused: u64,
    latency: Histogram<u64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CacheConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CacheConfig::default(),
    };
    if let Some(capacity) = cli.capacity {
        config.queue_capacity = capacity;
    }
    if cli.fail_fast {
        config.backpressure = BackpressurePolicy::FailFast;
    }
    if let Some(ordering) = cli.ordering {
        config.ordering = match ordering {
            OrderArg::Lazy => OrderingStrategy::LazySort,
            OrderArg::Tree => OrderingStrategy::Tree,
        };
    }
    if let Some(core_id) = cli.core_id {
        config.consumer_core = Some(core_id);
    }

    let lines = read_lines(cli.input.as_ref())?;
    info!(
        "Replaying {} lines with {} producers (queue capacity {})",
        lines.len(),
        cli.producers,
        config.queue_capacity
    );

    let cache = MessageCache::new(config).context("failed to start message cache")?;
    let reports = replay(&cache, &lines, cli.producers.max(1))?;

    if !cache.sync(Duration::from_secs(cli.drain_timeout_secs)) {
        warn!("queue did not drain within {}s", cli.drain_timeout_secs);
    }

    let mut latency = Histogram::<u64>::new(3)
        .map_err(|err| anyhow::anyhow!("failed to create histogram: {err:?}"))?;
    let (mut accepted, mut refused) = (0, 0);
    for report in &reports {
        accepted += report.accepted;
        refused += report.refused;
        latency
            .add(&report.latency)
            .map_err(|err| anyhow::anyhow!("failed to merge latency histograms: {err:?}"))?;
    }
    let stats = cache.stats();
    info!(
        "Accepted {} messages, refused {}, stored {}, {} distinct timestamps",
        accepted, refused, stats.stored, stats.distinct_timestamps
    );

    if cli.latency && !latency.is_empty() {
        eprintln!("enqueue latency (ns) over {} calls:", latency.len());
        for quantile in [0.5, 0.9, 0.99, 0.999, 1.0] {
            eprintln!("  p{:<6} {}", quantile * 100.0, latency.value_at_quantile(quantile));
        }
    }

    let response = match cli.ts {
        Some(ts) => api::by_timestamp(&cache, ts),
        None => api::list(&cache, cli.last.as_deref()),
    };
    println!("{}", response.to_json());
    cache.shutdown();

    if !response.is_ok() {
        anyhow::bail!("listing request rejected");
    }
    Ok(())
}

fn read_lines(input: Option<&PathBuf>) -> Result<Vec<String>> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.context("failed to read input")?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

fn replay(cache: &MessageCache, lines: &[String], producers: usize) -> Result<Vec<ProducerReport>> {
    if lines.is_empty() {
        return Ok(Vec::new());
    }
    let chunk_size = lines.len().div_ceil(producers);
    let clock = quanta::Clock::new();

    thread::scope(|scope| {
        let handles: Vec<_> = lines
            .chunks(chunk_size)
            .enumerate()
            .map(|(producer, chunk)| {
                let ingestor = cache.ingestor();
                let clock = clock.clone();
                scope.spawn(move || -> Result<ProducerReport> {
                    let mut report = ProducerReport {
                        accepted: 0,
                        refused: 0,
                        latency: Histogram::new(3)
                            .map_err(|err| anyhow::anyhow!("failed to create histogram: {err:?}"))?,
                    };
                    for (offset, line) in chunk.iter().enumerate() {
                        let start = clock.now();
                        let response = api::submit(&ingestor, line);
                        let elapsed = clock.now().duration_since(start);
                        report.latency.saturating_record(elapsed.as_nanos() as u64);
                        if response.is_ok() {
                            report.accepted += 1;
                        } else {
                            report.refused += 1;
                            let line_no = producer * chunk_size + offset + 1;
                            eprintln!("line {line_no}: {}", response.to_json());
                        }
                    }
                    Ok(report)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| anyhow::anyhow!("producer thread panicked"))?
            })
            .collect()
    })
}
