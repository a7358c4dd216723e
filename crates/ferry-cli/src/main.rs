//! ferry - ローカル実行用のパイプラインランナー
//!
//! インメモリのブローカーを立ち上げ、入力 topic に JSON Lines を投入し、
//! パイプラインを起動して出力 topic を stdout に流します。
//! パイプラインが止まるか Ctrl-C を受けるまでブロックします。

mod logging;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use ferry_core::app::PipelineBuilder;
use ferry_core::config::{LoopConfig, PipelineConfig, ReaderConfig, WriterConfig};
use ferry_core::domain::{Header, QueueMessage};
use ferry_core::impls::InMemoryBroker;
use ferry_core::ports::Broker;

use crate::logging::LogFormat;

const TAIL_GROUP: &str = "ferry-cli-tail";

#[derive(Debug, Parser)]
#[command(name = "ferry")]
#[command(about = "Consume, handle, forward and commit queue messages")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Broker addresses; the local broker listens on the first one
    #[arg(long, env = "FERRY_BROKERS", value_delimiter = ',', default_value = "localhost:9092")]
    brokers: Vec<String>,

    #[arg(long, env = "FERRY_INPUT_TOPIC", default_value = "income")]
    input_topic: String,

    #[arg(long, env = "FERRY_OUTPUT_TOPIC", default_value = "outcome")]
    output_topic: String,

    #[arg(long, env = "FERRY_GROUP", default_value = "consumer-group-id-1")]
    group: String,

    #[arg(long, env = "FERRY_PARTITION", default_value_t = 0)]
    partition: u32,

    /// Number of partitions to create on the output topic
    #[arg(long, env = "FERRY_OUTPUT_PARTITIONS", default_value_t = 1)]
    output_partitions: u32,

    #[arg(long, default_value_t = 10_000)]
    min_batch_bytes: usize,

    #[arg(long, default_value_t = 10_000_000)]
    max_batch_bytes: usize,

    /// Schema name of the handler (info.v1, first_message.v1)
    #[arg(long, env = "FERRY_HANDLER", default_value = "info.v1")]
    handler: String,

    #[arg(long, default_value_t = 1_000)]
    poll_interval_ms: u64,

    #[arg(long, default_value_t = 1_000)]
    read_timeout_ms: u64,

    #[arg(long, default_value_t = 2_000)]
    write_timeout_ms: u64,

    #[arg(long, default_value_t = 1_000)]
    commit_timeout_ms: u64,

    /// Header attached to every forwarded message
    #[arg(long, default_value = "my-header")]
    header_key: String,

    #[arg(long, default_value = "my-value")]
    header_value: String,

    /// JSON Lines file of `{"key": "...", "value": {...}}` records to publish first
    #[arg(long)]
    seed: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            reader: ReaderConfig {
                brokers: self.brokers.clone(),
                topic: self.input_topic.clone(),
                consumer_group: self.group.clone(),
                partition: self.partition,
                min_batch_bytes: self.min_batch_bytes,
                max_batch_bytes: self.max_batch_bytes,
            },
            writer: WriterConfig {
                brokers: self.brokers.clone(),
                topic: self.output_topic.clone(),
                ..WriterConfig::default()
            },
            poll: LoopConfig {
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                read_timeout: Duration::from_millis(self.read_timeout_ms),
                write_timeout: Duration::from_millis(self.write_timeout_ms),
                commit_timeout: Duration::from_millis(self.commit_timeout_ms),
                forward_header: Header::new(
                    self.header_key.clone(),
                    self.header_value.clone().into_bytes(),
                ),
            },
            handler: self.handler.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SeedRecord {
    key: String,
    value: serde_json::Value,
}

/// Publish every non-empty line of `path` to the input partition.
fn seed(broker: &InMemoryBroker, reader: &ReaderConfig, path: &Path) -> anyhow::Result<usize> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    let mut published = 0;
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: SeedRecord = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid seed record", path.display(), lineno + 1))?;
        let value = serde_json::to_vec(&record.value)?;
        broker.publish(&reader.topic, reader.partition, record.key, value, vec![])?;
        published += 1;
    }
    Ok(published)
}

/// One stdout line per forwarded record. Non-JSON values print as strings.
fn render_record(message: &QueueMessage) -> serde_json::Value {
    let value = serde_json::from_slice::<serde_json::Value>(message.value()).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(message.value()).into_owned())
    });
    let headers: serde_json::Map<String, serde_json::Value> = message
        .headers()
        .iter()
        .map(|h| {
            (
                h.key.clone(),
                serde_json::Value::String(String::from_utf8_lossy(&h.value).into_owned()),
            )
        })
        .collect();
    serde_json::json!({
        "partition": message.partition(),
        "offset": message.offset(),
        "key": String::from_utf8_lossy(message.key()),
        "headers": headers,
        "value": value,
    })
}

/// Print each forwarded record as one JSON line on stdout.
async fn spawn_tails(
    broker: &InMemoryBroker,
    config: &PipelineConfig,
    partitions: u32,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let mut tails = Vec::new();
    for partition in 0..partitions {
        let tail_config = ReaderConfig {
            brokers: config.writer.brokers.clone(),
            topic: config.writer.topic.clone(),
            consumer_group: TAIL_GROUP.to_string(),
            partition,
            ..config.reader.clone()
        };
        let mut reader = broker
            .connect_reader(&tail_config)
            .await
            .with_context(|| format!("tailing {}/{partition}", tail_config.topic))?;
        tails.push(tokio::spawn(async move {
            loop {
                let message = match reader.read_message().await {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(partition, error = %err, "output tail stopped");
                        break;
                    }
                };
                println!("{}", render_record(&message));
                if let Err(err) = reader.commit(&message).await {
                    warn!(partition, error = %err, "output tail commit failed");
                }
            }
        }));
    }
    Ok(tails)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let config = cli.pipeline_config();
    let address = config
        .reader
        .brokers
        .first()
        .cloned()
        .context("at least one broker address is required")?;

    let broker = InMemoryBroker::new(address);
    info!(address = %broker.address(), "in-memory broker started");
    broker.create_topic(config.reader.topic.clone(), config.reader.partition + 1);
    broker.create_topic(config.writer.topic.clone(), cli.output_partitions.max(1));

    if let Some(path) = &cli.seed {
        let published = seed(&broker, &config.reader, path)?;
        info!(published, topic = %config.reader.topic, "seeded input topic");
    }

    let pipeline = PipelineBuilder::new(config)
        .with_builtin_handlers()?
        .build()?;
    let tails = spawn_tails(&broker, pipeline.config(), cli.output_partitions.max(1)).await?;
    let handle = pipeline
        .start(&broker)
        .await
        .context("connecting pipeline")?;
    let states = handle.state_receiver();

    let result = tokio::select! {
        stopped = handle.wait() => Some(stopped),
        interrupted = tokio::signal::ctrl_c() => {
            interrupted.context("listening for Ctrl-C")?;
            None
        }
    };
    for tail in tails {
        tail.abort();
    }

    match result {
        Some(stopped) => {
            let reason = stopped?;
            error!(%reason, "pipeline stopped");
            bail!("pipeline stopped: {reason}");
        }
        // 外部から止める手段はないので、ハンドルは runtime 終了時の Drop で解放される
        None => {
            let state = *states.borrow();
            info!(?state, "interrupted; shutting down");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cli_defaults_match_core_defaults() {
        let cli = Cli::try_parse_from(["ferry"]).unwrap();
        assert_eq!(cli.pipeline_config(), PipelineConfig::default());
    }

    #[test]
    fn brokers_split_on_commas() {
        let cli = Cli::try_parse_from(["ferry", "--brokers", "a:1,b:2", "--handler", "first_message.v1"])
            .unwrap();
        let config = cli.pipeline_config();
        assert_eq!(config.reader.brokers, vec!["a:1", "b:2"]);
        assert_eq!(config.writer.brokers, vec!["a:1", "b:2"]);
        assert_eq!(config.handler, "first_message.v1");
    }

    #[test]
    fn seed_publishes_each_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.jsonl");
        fs::write(
            &path,
            "{\"key\":\"k1\",\"value\":{\"id\":\"1\",\"message\":\"hi\",\"count\":1}}\n\n{\"key\":\"k2\",\"value\":{\"id\":\"2\",\"message\":\"yo\",\"count\":2}}\n",
        )
        .unwrap();

        let broker = InMemoryBroker::new("localhost:9092");
        broker.create_topic("income", 1);
        let published = seed(&broker, &ReaderConfig::default(), &path).unwrap();
        assert_eq!(published, 2);
        let records = broker.records("income", 0);
        assert_eq!(records[1].key(), b"k2");
    }

    #[test]
    fn seed_reports_the_bad_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"key\":\"k1\",\"value\":{{}}}}").unwrap();
        writeln!(file, "not json").unwrap();

        let broker = InMemoryBroker::new("localhost:9092");
        broker.create_topic("income", 1);
        let err = seed(&broker, &ReaderConfig::default(), file.path()).unwrap_err();
        assert!(err.to_string().ends_with(":2: invalid seed record"), "{err}");
    }

    #[test]
    fn rendered_record_carries_headers_and_json_value() {
        let message = QueueMessage::new(
            "outcome",
            1,
            4,
            b"k1".to_vec(),
            br#"{"id":"7","ok":true}"#.to_vec(),
            vec![Header::new("my-header", b"my-value".to_vec())],
        );
        assert_eq!(
            render_record(&message),
            serde_json::json!({
                "partition": 1,
                "offset": 4,
                "key": "k1",
                "headers": { "my-header": "my-value" },
                "value": { "id": "7", "ok": true },
            })
        );
    }

    #[test]
    fn non_json_value_renders_as_string() {
        let message = QueueMessage::new("outcome", 0, 0, b"k".to_vec(), b"plain".to_vec(), vec![]);
        assert_eq!(render_record(&message)["value"], "plain");
    }
}
