//! PollLoop - read → handle → forward → commit の繰り返し
//!
//! # フロー（1 サイクル）
//! 1. `poll_interval` 待つ
//! 2. Polling: 期限付きで 1 件読む（timeout → 次のサイクル / その他 → 停止）
//! 3. Handling: handler を呼ぶ（エラー → commit せずに停止）
//! 4. Forwarding: 入力の key を再利用して期限付きで書く（timeout → commit へ進む / その他 → 停止）
//! 5. Committing: 期限付きで commit（timeout → 次のサイクル / その他 → 停止）
//!
//! 停止したら connection を close してから termination signal を 1 回だけ送ります。
//! 外部から止める手段はありません。

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::connection::Connection;
use super::signal::{SignalError, TerminationWaiter, termination_signal};
use crate::config::LoopConfig;
use crate::domain::{
    ErrorKind, LoopOutcome, LoopState, OutgoingMessage, QueueError, Stage, StopReason,
};
use crate::typed::MessageHandler;

/// Counters shared between the loop task and its observers.
#[derive(Debug, Default)]
pub struct LoopStats {
    cycles: AtomicU64,
    read: AtomicU64,
    handled: AtomicU64,
    forwarded: AtomicU64,
    committed: AtomicU64,
    read_timeouts: AtomicU64,
    write_timeouts: AtomicU64,
    commit_timeouts: AtomicU64,
}

/// Point-in-time copy of [`LoopStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub read: u64,
    pub handled: u64,
    pub forwarded: u64,
    pub committed: u64,
    pub read_timeouts: u64,
    pub write_timeouts: u64,
    pub commit_timeouts: u64,
}

impl LoopStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            read: self.read.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
            write_timeouts: self.write_timeouts.load(Ordering::Relaxed),
            commit_timeouts: self.commit_timeouts.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Run `call` under its own deadline; expiry becomes `QueueError::Timeout`.
async fn with_deadline<T, F>(stage: Stage, deadline: Duration, call: F) -> Result<T, QueueError>
where
    F: Future<Output = Result<T, QueueError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_elapsed) => Err(QueueError::Timeout {
            stage,
            after: deadline,
        }),
    }
}

pub struct PollLoop {
    connection: Connection,
    handler: Arc<dyn MessageHandler>,
    config: LoopConfig,
    stats: Arc<LoopStats>,
    state_tx: watch::Sender<LoopState>,
    outcome_tx: watch::Sender<LoopOutcome>,
}

impl PollLoop {
    pub fn new(connection: Connection, handler: Arc<dyn MessageHandler>, config: LoopConfig) -> Self {
        let (state_tx, _state_rx) = watch::channel(LoopState::Idle);
        let (outcome_tx, _outcome_rx) = watch::channel(LoopOutcome::Running);
        Self {
            connection,
            handler,
            config,
            stats: Arc::new(LoopStats::default()),
            state_tx,
            outcome_tx,
        }
    }

    pub fn stats(&self) -> Arc<LoopStats> {
        Arc::clone(&self.stats)
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state_tx.subscribe()
    }

    pub fn outcome(&self) -> LoopOutcome {
        *self.outcome_tx.borrow()
    }

    /// Receiver that sees `Stopped` once the loop gives up.
    pub fn subscribe_outcome(&self) -> watch::Receiver<LoopOutcome> {
        self.outcome_tx.subscribe()
    }

    fn transition(&self, state: LoopState) {
        self.state_tx.send_replace(state);
    }

    /// Run until a fatal classification, then close the connection.
    pub async fn run(mut self) -> StopReason {
        info!(handler = %self.handler.schema(), interval = ?self.config.poll_interval, "poll loop started");
        let reason = loop {
            tokio::time::sleep(self.config.poll_interval).await;
            if let Some(reason) = self.run_cycle().await {
                break reason;
            }
            self.transition(LoopState::Idle);
        };

        self.outcome_tx.send_replace(LoopOutcome::Stopped(reason));
        self.transition(LoopState::Terminated);
        self.connection.close().await;
        let stats = self.stats.snapshot();
        error!(%reason, cycles = stats.cycles, committed = stats.committed, "poll loop terminated");
        reason
    }

    /// Run on its own task. The handle resolves exactly once, after the
    /// connection has been closed.
    pub fn spawn(self) -> PollLoopHandle {
        let (notifier, waiter) = termination_signal();
        let stats = self.stats();
        let state = self.subscribe();
        let outcome = self.subscribe_outcome();
        let join = tokio::spawn(async move {
            let reason = self.run().await;
            notifier.notify(reason);
            reason
        });
        PollLoopHandle {
            waiter,
            stats,
            state,
            outcome,
            join,
        }
    }

    /// One read → handle → forward → commit pass. `Some` means terminate.
    async fn run_cycle(&mut self) -> Option<StopReason> {
        bump(&self.stats.cycles);

        // Polling
        self.transition(LoopState::Polling);
        debug!("polling");
        let read_timeout = self.config.read_timeout;
        let read = with_deadline(
            Stage::Read,
            read_timeout,
            self.connection.reader_mut().read_message(),
        )
        .await;
        let message = match read {
            Ok(message) => message,
            Err(err) => {
                return match err.kind() {
                    ErrorKind::Timeout => {
                        bump(&self.stats.read_timeouts);
                        info!(error = %err, "nothing to read; polling again");
                        None
                    }
                    ErrorKind::Fatal => {
                        error!(error = %err, "read failed");
                        Some(StopReason::FatalRead)
                    }
                };
            }
        };
        bump(&self.stats.read);

        // Handling
        self.transition(LoopState::Handling);
        let response = match self.handler.handle(message.key(), message.value()) {
            Ok(response) => response,
            Err(err) => {
                error!(record = %message, error = %err, "handler failed; offset left uncommitted");
                return Some(StopReason::HandlerError);
            }
        };
        bump(&self.stats.handled);

        // Forwarding: 入力の key を返信の key に使う（別 topic での突き合わせ用）
        self.transition(LoopState::Forwarding);
        let outgoing = OutgoingMessage::new(message.key(), response)
            .with_header(self.config.forward_header.clone());
        let write_timeout = self.config.write_timeout;
        let written = with_deadline(
            Stage::Write,
            write_timeout,
            self.connection.writer_mut().write_message(outgoing),
        )
        .await;
        match written {
            Ok(()) => bump(&self.stats.forwarded),
            Err(err) if err.is_timeout() => {
                bump(&self.stats.write_timeouts);
                warn!(record = %message, error = %err, "forward timed out; committing anyway");
            }
            Err(err) => {
                error!(record = %message, error = %err, "forward failed; offset left uncommitted");
                return Some(StopReason::FatalWrite);
            }
        }

        // Committing
        self.transition(LoopState::Committing);
        let commit_timeout = self.config.commit_timeout;
        let committed = with_deadline(
            Stage::Commit,
            commit_timeout,
            self.connection.reader_mut().commit(&message),
        )
        .await;
        match committed {
            Ok(()) => bump(&self.stats.committed),
            Err(err) if err.is_timeout() => {
                bump(&self.stats.commit_timeouts);
                info!(record = %message, error = %err, "commit timed out; message may be redelivered");
            }
            Err(err) => {
                error!(record = %message, error = %err, "commit failed");
                return Some(StopReason::FatalCommit);
            }
        }
        None
    }
}

/// Caller's side of a spawned poll loop.
pub struct PollLoopHandle {
    waiter: TerminationWaiter,
    stats: Arc<LoopStats>,
    state: watch::Receiver<LoopState>,
    outcome: watch::Receiver<LoopOutcome>,
    join: JoinHandle<StopReason>,
}

impl PollLoopHandle {
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<LoopState> {
        self.state.clone()
    }

    /// `Stopped` is published before the connection is closed.
    pub fn outcome(&self) -> LoopOutcome {
        *self.outcome.borrow()
    }

    /// Block until the loop has stopped and released its connection.
    pub async fn wait(self) -> Result<StopReason, SignalError> {
        let signalled = self.waiter.wait().await;
        if let Err(join_err) = self.join.await {
            error!(error = %join_err, "poll loop task failed");
        }
        signalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Header, InfoMessage, QueueMessage};
    use crate::impls::InfoHandler;
    use crate::ports::{MessageReader, MessageWriter, SystemClock, UlidGenerator};
    use crate::typed::JsonHandler;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const GOOD: &[u8] = br#"{"id":"42","message":"hi","count":3}"#;
    const MALFORMED: &[u8] = br#"{"id":"#;

    /// What the doubles observed, in call order.
    #[derive(Debug, Default)]
    struct Trace {
        reads: usize,
        writes: Vec<OutgoingMessage>,
        commits: Vec<u64>,
        reader_closed: bool,
        writer_closed: bool,
    }

    type SharedTrace = Arc<Mutex<Trace>>;

    enum Step {
        Message(QueueMessage),
        Ok,
        Hang,
        Fail(QueueError),
    }

    struct ScriptedReader {
        reads: VecDeque<Step>,
        commits: VecDeque<Step>,
        /// Behavior once `reads` is drained.
        hang_when_drained: bool,
        trace: SharedTrace,
    }

    #[async_trait]
    impl MessageReader for ScriptedReader {
        async fn read_message(&mut self) -> Result<QueueMessage, QueueError> {
            self.trace.lock().unwrap().reads += 1;
            match self.reads.pop_front() {
                Some(Step::Message(m)) => Ok(m),
                Some(Step::Hang) => std::future::pending().await,
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Ok) => unreachable!("reads are scripted with messages"),
                None if self.hang_when_drained => std::future::pending().await,
                None => Err(QueueError::Closed),
            }
        }

        async fn commit(&mut self, message: &QueueMessage) -> Result<(), QueueError> {
            match self.commits.pop_front() {
                None | Some(Step::Ok) => {
                    self.trace.lock().unwrap().commits.push(message.offset());
                    Ok(())
                }
                Some(Step::Hang) => std::future::pending().await,
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Message(_)) => unreachable!(),
            }
        }

        async fn close(&mut self) -> Result<(), QueueError> {
            self.trace.lock().unwrap().reader_closed = true;
            Ok(())
        }
    }

    struct ScriptedWriter {
        writes: VecDeque<Step>,
        trace: SharedTrace,
    }

    #[async_trait]
    impl MessageWriter for ScriptedWriter {
        async fn write_message(&mut self, message: OutgoingMessage) -> Result<(), QueueError> {
            match self.writes.pop_front() {
                None | Some(Step::Ok) => {
                    self.trace.lock().unwrap().writes.push(message);
                    Ok(())
                }
                Some(Step::Hang) => std::future::pending().await,
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Message(_)) => unreachable!(),
            }
        }

        async fn close(&mut self) -> Result<(), QueueError> {
            self.trace.lock().unwrap().writer_closed = true;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Script {
        reads: Vec<Step>,
        writes: Vec<Step>,
        commits: Vec<Step>,
        hang_when_drained: bool,
    }

    fn msg(offset: u64, value: &[u8]) -> Step {
        Step::Message(QueueMessage::new(
            "income",
            0,
            offset,
            format!("k{offset}"),
            value.to_vec(),
            vec![],
        ))
    }

    fn build(script: Script) -> (PollLoop, SharedTrace) {
        let trace = SharedTrace::default();
        let reader = ScriptedReader {
            reads: script.reads.into(),
            commits: script.commits.into(),
            hang_when_drained: script.hang_when_drained,
            trace: Arc::clone(&trace),
        };
        let writer = ScriptedWriter {
            writes: script.writes.into(),
            trace: Arc::clone(&trace),
        };
        let handler = Arc::new(JsonHandler::<InfoMessage, _>::new(InfoHandler::new(Arc::new(
            UlidGenerator::new(SystemClock),
        ))));
        let poll_loop = PollLoop::new(
            Connection::new(Box::new(reader), Box::new(writer)),
            handler,
            LoopConfig::default(),
        );
        (poll_loop, trace)
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_then_commits_each_message() {
        let (poll_loop, trace) = build(Script {
            reads: vec![msg(0, GOOD), msg(1, GOOD)],
            ..Script::default()
        });
        let handle = poll_loop.spawn();
        assert_eq!(handle.wait().await, Ok(StopReason::FatalRead));

        let trace = trace.lock().unwrap();
        assert_eq!(trace.commits, vec![0, 1]);
        assert_eq!(trace.writes.len(), 2);
        let first = &trace.writes[0];
        assert_eq!(first.key, b"k0");
        assert_eq!(first.headers, vec![Header::new("my-header", b"my-value".to_vec())]);
        let reply: InfoMessage = serde_json::from_slice(&first.value).unwrap();
        assert!(reply.message.contains("kafka_id: k0"));
        assert!(trace.reader_closed && trace.writer_closed);
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeouts_keep_the_loop_cycling() {
        let (poll_loop, trace) = build(Script {
            reads: vec![Step::Hang, Step::Hang, msg(5, GOOD)],
            ..Script::default()
        });
        let stats = poll_loop.stats();
        assert_eq!(poll_loop.run().await, StopReason::FatalRead);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.read_timeouts, 2);
        assert_eq!(snapshot.cycles, 4);
        assert_eq!(trace.lock().unwrap().commits, vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_queue_never_terminates() {
        let (poll_loop, trace) = build(Script {
            hang_when_drained: true,
            ..Script::default()
        });
        let handle = poll_loop.spawn();

        tokio::time::sleep(Duration::from_millis(60_500)).await;
        let snapshot = handle.stats();
        assert!(snapshot.cycles >= 10, "cycles = {}", snapshot.cycles);
        // 読み取り中のサイクルが 1 つ残っていることはある
        assert!(snapshot.cycles - snapshot.read_timeouts <= 1);
        assert_eq!(snapshot.read, 0);
        assert_ne!(handle.state(), LoopState::Terminated);
        assert!(!trace.lock().unwrap().reader_closed);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_read_stops_reading_and_signals_once() {
        let (poll_loop, trace) = build(Script {
            reads: vec![
                Step::Fail(QueueError::Unreachable("localhost:9092".into())),
                msg(0, GOOD),
            ],
            ..Script::default()
        });
        let handle = poll_loop.spawn();
        assert_eq!(handle.wait().await, Ok(StopReason::FatalRead));

        let trace = trace.lock().unwrap();
        assert_eq!(trace.reads, 1);
        assert!(trace.commits.is_empty());
        assert!(trace.reader_closed);
    }

    #[tokio::test(start_paused = true)]
    async fn handler_error_terminates_without_commit() {
        let (poll_loop, trace) = build(Script {
            reads: vec![msg(0, MALFORMED), msg(1, GOOD)],
            ..Script::default()
        });
        let handle = poll_loop.spawn();
        assert_eq!(handle.wait().await, Ok(StopReason::HandlerError));

        let trace = trace.lock().unwrap();
        assert_eq!(trace.reads, 1);
        assert!(trace.writes.is_empty());
        assert!(trace.commits.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn commits_only_messages_the_handler_accepted() {
        let (poll_loop, trace) = build(Script {
            reads: vec![msg(0, GOOD), msg(1, GOOD), msg(2, MALFORMED), msg(3, GOOD)],
            ..Script::default()
        });
        assert_eq!(poll_loop.run().await, StopReason::HandlerError);

        let trace = trace.lock().unwrap();
        assert_eq!(trace.commits, vec![0, 1]);
        assert_eq!(trace.reads, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn forward_timeout_still_commits() {
        let (poll_loop, trace) = build(Script {
            reads: vec![msg(0, GOOD)],
            writes: vec![Step::Hang],
            ..Script::default()
        });
        let stats = poll_loop.stats();
        assert_eq!(poll_loop.run().await, StopReason::FatalRead);

        let trace = trace.lock().unwrap();
        assert!(trace.writes.is_empty());
        assert_eq!(trace.commits, vec![0]);
        assert_eq!(stats.snapshot().write_timeouts, 1);
        assert_eq!(stats.snapshot().forwarded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_write_leaves_offset_uncommitted() {
        let (poll_loop, trace) = build(Script {
            reads: vec![msg(0, GOOD)],
            writes: vec![Step::Fail(QueueError::Other("leader not available".into()))],
            ..Script::default()
        });
        assert_eq!(poll_loop.run().await, StopReason::FatalWrite);
        assert!(trace.lock().unwrap().commits.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn commit_timeout_moves_on_to_next_message() {
        let (poll_loop, trace) = build(Script {
            reads: vec![msg(0, GOOD), msg(1, GOOD)],
            commits: vec![Step::Hang],
            ..Script::default()
        });
        let stats = poll_loop.stats();
        assert_eq!(poll_loop.run().await, StopReason::FatalRead);

        assert_eq!(trace.lock().unwrap().commits, vec![1]);
        assert_eq!(stats.snapshot().commit_timeouts, 1);
        assert_eq!(stats.snapshot().forwarded, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_commit_terminates() {
        let (poll_loop, trace) = build(Script {
            reads: vec![msg(0, GOOD), msg(1, GOOD)],
            commits: vec![Step::Fail(QueueError::Closed)],
            ..Script::default()
        });
        assert_eq!(poll_loop.run().await, StopReason::FatalCommit);
        let trace = trace.lock().unwrap();
        assert_eq!(trace.reads, 1);
        assert_eq!(trace.writes.len(), 1);
    }

    fn port_timeout(stage: Stage) -> Step {
        Step::Fail(QueueError::Timeout {
            stage,
            after: Duration::from_millis(500),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeout_reported_by_reader_keeps_cycling() {
        let (poll_loop, trace) = build(Script {
            reads: vec![port_timeout(Stage::Read), msg(1, GOOD)],
            ..Script::default()
        });
        let stats = poll_loop.stats();
        assert_eq!(poll_loop.run().await, StopReason::FatalRead);

        assert_eq!(stats.snapshot().read_timeouts, 1);
        let trace = trace.lock().unwrap();
        assert_eq!(trace.reads, 3);
        assert_eq!(trace.commits, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn write_timeout_reported_by_writer_still_commits() {
        let (poll_loop, trace) = build(Script {
            reads: vec![msg(0, GOOD), msg(1, GOOD)],
            writes: vec![Step::Ok, port_timeout(Stage::Write)],
            ..Script::default()
        });
        let stats = poll_loop.stats();
        assert_eq!(poll_loop.run().await, StopReason::FatalRead);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.forwarded, 1);
        assert_eq!(snapshot.write_timeouts, 1);
        let trace = trace.lock().unwrap();
        assert_eq!(trace.writes.len(), 1);
        assert_eq!(trace.commits, vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn commit_timeout_reported_by_reader_moves_on() {
        let (poll_loop, trace) = build(Script {
            reads: vec![msg(0, GOOD), msg(1, GOOD), msg(2, GOOD)],
            commits: vec![Step::Ok, port_timeout(Stage::Commit)],
            ..Script::default()
        });
        let stats = poll_loop.stats();
        assert_eq!(poll_loop.run().await, StopReason::FatalRead);

        assert_eq!(stats.snapshot().commit_timeouts, 1);
        assert_eq!(trace.lock().unwrap().commits, vec![0, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn outcome_is_published_when_the_loop_stops() {
        let (poll_loop, _trace) = build(Script {
            reads: vec![msg(0, MALFORMED)],
            ..Script::default()
        });
        assert_eq!(poll_loop.outcome(), LoopOutcome::Running);
        let outcomes = poll_loop.subscribe_outcome();
        let handle = poll_loop.spawn();
        assert!(!handle.outcome().is_terminal());

        assert_eq!(handle.wait().await, Ok(StopReason::HandlerError));
        let outcome = *outcomes.borrow();
        assert_eq!(outcome, LoopOutcome::Stopped(StopReason::HandlerError));
        assert_eq!(outcome.reason(), Some(StopReason::HandlerError));
    }

    #[tokio::test(start_paused = true)]
    async fn state_receiver_follows_the_loop() {
        let (poll_loop, _trace) = build(Script::default());
        let handle = poll_loop.spawn();
        let mut states = handle.state_receiver();
        states
            .wait_for(|state| *state == LoopState::Terminated)
            .await
            .unwrap();
        assert_eq!(handle.outcome(), LoopOutcome::Stopped(StopReason::FatalRead));
        assert_eq!(handle.wait().await, Ok(StopReason::FatalRead));
    }

    #[tokio::test(start_paused = true)]
    async fn state_ends_terminated() {
        let (poll_loop, _trace) = build(Script::default());
        let mut states = poll_loop.subscribe();
        let handle = poll_loop.spawn();
        assert_eq!(handle.wait().await, Ok(StopReason::FatalRead));
        assert_eq!(*states.borrow_and_update(), LoopState::Terminated);
    }

    #[tokio::test]
    async fn deadline_maps_elapsed_to_timeout() {
        let err = with_deadline::<(), _>(Stage::Write, Duration::from_millis(10), std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Timeout { stage: Stage::Write, .. }));
    }
}
