//! Parallel test execution
//!
//! Leaves of a suite are distributed over a fixed pool of worker processes.
//! Each slot of the pool owns at most one child process and feeds it one test
//! at a time; the parent replays every returned outcome into its own
//! collector so handlers see the same lifecycle as in a sequential run.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use super::worker::{WorkReply, WorkRequest};
use crate::error::{EngineError, WorkerError};
use crate::models::{Outcome, TestId, TestItem, TestSuite};
use crate::result::ResultCollector;
use crate::utils::timer::Timer;

/// Callback applied to every worker command before it is spawned
pub type Initializer = Arc<dyn Fn(&mut Command) + Send + Sync>;

/// How to launch a worker process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The running executable re-invoked with its `worker` subcommand.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?).arg("worker"))
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

/// Everything a pool slot needs to start a fresh worker
struct Spawner {
    command: WorkerCommand,
    initializer: Option<Initializer>,
    grace: Duration,
}

impl Spawner {
    async fn spawn(&self) -> Result<WorkerProcess, WorkerError> {
        let mut command = self.command.command();
        if let Some(initializer) = &self.initializer {
            initializer(&mut command);
        }
        let mut child = command.spawn().map_err(|source| WorkerError::Spawn {
            program: self.command.program.display().to_string(),
            source,
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(WorkerError::Exited("worker pipes unavailable".to_string()));
        };
        debug!("Spawned worker pid {:?}", child.id());

        Ok(WorkerProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            served: 0,
            grace: self.grace,
        })
    }
}

/// One live worker child process
struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    served: usize,
    grace: Duration,
}

impl WorkerProcess {
    async fn run(&mut self, test: &TestId) -> Result<Vec<Outcome>, WorkerError> {
        let mut request = serde_json::to_string(&WorkRequest { test: test.clone() })?;
        request.push('\n');
        self.stdin.write_all(request.as_bytes()).await?;
        self.stdin.flush().await?;

        while let Some(line) = self.stdout.next_line().await? {
            let Some(reply) = WorkReply::from_line(&line) else {
                debug!("Ignoring worker output: {line}");
                continue;
            };
            let reply = reply?;
            if reply.test != *test {
                return Err(WorkerError::Mismatch {
                    expected: test.clone(),
                    got: reply.test,
                });
            }
            self.served += 1;
            return Ok(reply.outcomes);
        }

        let status = match timeout(self.grace, self.child.wait()).await {
            Ok(Ok(status)) => status.to_string(),
            _ => "stdout closed".to_string(),
        };
        Err(WorkerError::Exited(status))
    }

    /// Close stdin and give the worker `grace` to exit before killing it.
    async fn shutdown(self) {
        let WorkerProcess {
            mut child,
            stdin,
            served,
            grace,
            ..
        } = self;
        drop(stdin);
        if timeout(grace, child.wait()).await.is_err() {
            warn!("Worker pid {:?} did not exit, killing it", child.id());
            if let Err(e) = child.kill().await {
                error!("Failed to kill worker: {}", e);
            }
        }
        debug!("Worker retired after {served} tests");
    }
}

/// Message from a pool slot to the parent
enum SlotMessage {
    Batch(Vec<Outcome>),
    Crashed { test: TestId, reason: String },
    SpawnFailed(WorkerError),
}

/// Process-pool executor
pub struct ParallelExecutor {
    command: WorkerCommand,
    process_count: usize,
    max_tasks_per_worker: Option<usize>,
    initializer: Option<Initializer>,
    poll_interval: Duration,
    shutdown_grace: Duration,
}

impl ParallelExecutor {
    pub fn new(command: WorkerCommand, process_count: usize) -> Self {
        Self {
            command,
            process_count: process_count.max(1),
            max_tasks_per_worker: None,
            initializer: None,
            poll_interval: Duration::from_millis(100),
            shutdown_grace: Duration::from_secs(2),
        }
    }

    /// Recycle a worker process after it has run `tasks` tests.
    pub fn with_max_tasks_per_worker(mut self, tasks: Option<usize>) -> Self {
        self.max_tasks_per_worker = tasks.filter(|&tasks| tasks > 0);
        self
    }

    pub fn with_initializer<F>(mut self, initializer: F) -> Self
    where
        F: Fn(&mut Command) + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(initializer));
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn process_count(&self) -> usize {
        self.process_count
    }

    /// Run `suite` on the pool, replaying every outcome into `collector`.
    pub async fn run<'c>(
        &self,
        suite: &TestSuite,
        collector: &'c mut ResultCollector,
    ) -> Result<&'c mut ResultCollector, EngineError> {
        let timer = Timer::start("parallel run");
        let (placeholders, work): (Vec<&TestItem>, Vec<&TestItem>) = suite
            .leaves()
            .into_iter()
            .partition(|item| item.is_placeholder());
        info!(
            "Running {} tests on {} worker processes ({} collection errors)",
            work.len(),
            self.process_count,
            placeholders.len()
        );

        collector.start_run();
        let result = self.run_pool(&placeholders, &work, collector).await;
        collector.stop_run();

        info!(
            "Parallel run finished: {} run in {}ms",
            collector.tests_run(),
            timer.stop().as_millis()
        );
        result.map(|()| collector)
    }

    async fn run_pool(
        &self,
        placeholders: &[&TestItem],
        work: &[&TestItem],
        collector: &mut ResultCollector,
    ) -> Result<(), EngineError> {
        for placeholder in placeholders {
            if collector.should_stop() {
                return Ok(());
            }
            placeholder.run(collector)?;
        }
        if work.is_empty() || collector.should_stop() {
            return Ok(());
        }

        let spawner = Arc::new(Spawner {
            command: self.command.clone(),
            initializer: self.initializer.clone(),
            grace: self.shutdown_grace,
        });
        let stop = Arc::new(AtomicBool::new(false));
        let submitted = Arc::new(AtomicUsize::new(0));

        let (job_tx, job_rx) = mpsc::channel::<TestId>(self.process_count);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        let mut handles = Vec::with_capacity(self.process_count + 1);
        for slot in 0..self.process_count {
            handles.push(tokio::spawn(worker_slot(
                slot,
                spawner.clone(),
                self.max_tasks_per_worker,
                job_rx.clone(),
                result_tx.clone(),
            )));
        }
        drop(job_rx);
        drop(result_tx);

        let ids: Vec<TestId> = work.iter().map(|item| item.id().clone()).collect();
        handles.push(tokio::spawn(submit(
            ids,
            job_tx,
            stop.clone(),
            submitted.clone(),
        )));

        let mut received = 0;
        let mut pool_error = None;
        let outcome = loop {
            let message = match timeout(self.poll_interval, result_rx.recv()).await {
                Ok(Some(message)) => message,
                Ok(None) => break Ok(()),
                Err(_) => {
                    debug!(
                        "Waiting on {} outstanding tests",
                        submitted.load(Ordering::SeqCst).saturating_sub(received)
                    );
                    continue;
                }
            };
            received += 1;

            let replayed = match message {
                SlotMessage::Batch(outcomes) => {
                    replay(collector, outcomes);
                    Ok(())
                }
                SlotMessage::Crashed { test, reason } => {
                    TestItem::error_placeholder(test, reason).run(collector)
                }
                SlotMessage::SpawnFailed(err) => {
                    error!("Worker pool cannot start workers: {}", err);
                    stop.store(true, Ordering::SeqCst);
                    pool_error.get_or_insert(err);
                    Ok(())
                }
            };
            if let Err(err) = replayed {
                break Err(err);
            }
            if collector.should_stop() {
                stop.store(true, Ordering::SeqCst);
            }
        };

        stop.store(true, Ordering::SeqCst);
        drop(result_rx);
        shutdown(handles, self.shutdown_grace, self.poll_interval).await;

        outcome?;
        match pool_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

/// Feed the bounded job queue until every test is queued or the run stops.
async fn submit(
    ids: Vec<TestId>,
    jobs: mpsc::Sender<TestId>,
    stop: Arc<AtomicBool>,
    submitted: Arc<AtomicUsize>,
) {
    for id in ids {
        if stop.load(Ordering::SeqCst) {
            debug!("Submission stopped before {id}");
            break;
        }
        if jobs.send(id).await.is_err() {
            break;
        }
        submitted.fetch_add(1, Ordering::SeqCst);
    }
}

async fn worker_slot(
    slot: usize,
    spawner: Arc<Spawner>,
    max_tasks: Option<usize>,
    jobs: Arc<Mutex<mpsc::Receiver<TestId>>>,
    results: mpsc::UnboundedSender<SlotMessage>,
) {
    let mut worker: Option<WorkerProcess> = None;

    loop {
        let next = jobs.lock().await.recv().await;
        let Some(test) = next else {
            break;
        };

        let mut process = match worker.take() {
            Some(process) => process,
            None => match spawner.spawn().await {
                Ok(process) => process,
                Err(err) => {
                    let _ = results.send(SlotMessage::SpawnFailed(err));
                    break;
                }
            },
        };

        let message = match process.run(&test).await {
            Ok(outcomes) => {
                if max_tasks.is_some_and(|max| process.served >= max) {
                    debug!("Slot {slot} recycling worker");
                    process.shutdown().await;
                } else {
                    worker = Some(process);
                }
                SlotMessage::Batch(outcomes)
            }
            Err(err) => {
                warn!("Worker in slot {slot} crashed running {test}: {err}");
                process.shutdown().await;
                SlotMessage::Crashed {
                    reason: format!("Worker crashed while running {test}: {err}"),
                    test,
                }
            }
        };
        if results.send(message).is_err() {
            break;
        }
    }

    if let Some(process) = worker {
        process.shutdown().await;
    }
}

/// Replay a worker batch so handlers see start, outcome and stop in order.
fn replay(collector: &mut ResultCollector, outcomes: Vec<Outcome>) {
    for outcome in outcomes {
        let test = outcome.test.clone();
        collector.start_test(&test, Some(outcome.started_at));
        collector.add_outcome(outcome);
        collector.stop_test(&test);
    }
}

/// Give pool tasks `grace` to finish on their own, then abort the rest.
async fn shutdown(handles: Vec<JoinHandle<()>>, grace: Duration, poll: Duration) {
    let deadline = Instant::now() + grace;
    while handles.iter().any(|handle| !handle.is_finished()) {
        if Instant::now() >= deadline {
            let pending = handles.iter().filter(|h| !h.is_finished()).count();
            warn!("Aborting {} pool tasks after {:?}", pending, grace);
            for handle in &handles {
                handle.abort();
            }
            break;
        }
        sleep(poll.min(Duration::from_millis(50))).await;
    }

    for result in join_all(handles).await {
        if let Err(err) = result {
            if !err.is_cancelled() {
                error!("Pool task failed: {}", WorkerError::from(err));
            }
        }
    }
}
