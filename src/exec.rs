use std::io::{self, BufRead, BufReader};
use std::process::{Child, Command as Process, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::mpsc::SyncSender;
use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::jobs::{JobId, JobRegistry};
use crate::logs::{LogLine, Stream};
use crate::model::Command;

pub const SPAWN_FAILED_CODE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Exited(i32),
    Terminated,
    SpawnFailed,
}

impl JobOutcome {
    pub fn success(&self) -> bool {
        matches!(self, JobOutcome::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            JobOutcome::Exited(code) => Some(*code),
            JobOutcome::SpawnFailed => Some(SPAWN_FAILED_CODE),
            JobOutcome::Terminated => None,
        }
    }

    fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => JobOutcome::Exited(code),
            None => JobOutcome::Terminated,
        }
    }
}

#[derive(Debug, Clone)]
pub enum JobEvent {
    Started { job: JobId, label: String },
    Line { job: JobId, stream: Stream, line: LogLine },
    Finished { job: JobId, label: String, outcome: JobOutcome },
}

pub struct Executor<E> {
    registry: Arc<JobRegistry>,
    events: SyncSender<E>,
}

impl<E> Executor<E>
where
    E: From<JobEvent> + Send + 'static,
{
    pub fn new(registry: Arc<JobRegistry>, events: SyncSender<E>) -> Self {
        Self { registry, events }
    }

    pub fn spawn(&self, command: &Command) -> JobId {
        let job = self.registry.register();
        let command = command.clone();
        let registry = Arc::clone(&self.registry);
        let events = self.events.clone();

        info!(%job, label = %command.label, program = %command.program, "spawning job");
        let worker = thread::Builder::new()
            .name(format!("{job}"))
            .spawn(move || run_job(job, &command, &events, &registry));

        if let Err(err) = worker {
            warn!(%job, error = %err, "failed to start job worker");
            self.registry.mark_finished(job);
        }
        job
    }
}

fn run_job<E>(job: JobId, command: &Command, events: &SyncSender<E>, registry: &JobRegistry)
where
    E: From<JobEvent> + Send + 'static,
{
    let send = |event: JobEvent| {
        let _ = events.send(E::from(event));
    };

    send(JobEvent::Started {
        job,
        label: command.label.clone(),
    });

    let outcome = match run_process(job, command, events) {
        Ok(outcome) => outcome,
        Err(err) => {
            let message = format!("error running command: {err:#}");
            warn!(%job, label = %command.label, error = %message, "job failed to run");
            send(JobEvent::Line {
                job,
                stream: Stream::Stderr,
                line: LogLine::now(message),
            });
            JobOutcome::SpawnFailed
        }
    };

    info!(%job, label = %command.label, ?outcome, "job finished");
    registry.mark_finished(job);
    send(JobEvent::Finished {
        job,
        label: command.label.clone(),
        outcome,
    });
}

fn run_process<E>(job: JobId, command: &Command, events: &SyncSender<E>) -> Result<JobOutcome>
where
    E: From<JobEvent> + Send + 'static,
{
    let mut process = Process::new(&command.program);
    process.args(&command.args);
    process.envs(command.env.iter().map(|(key, value)| (key, value)));
    if let Some(dir) = &command.working_dir {
        process.current_dir(dir);
    }

    process.stdin(Stdio::null());
    process.stdout(Stdio::piped());
    process.stderr(Stdio::piped());

    let mut child = process
        .spawn()
        .with_context(|| format!("failed to start {}", command.program))?;
    debug!(%job, pid = child.id(), "child process started");

    let stdout = child
        .stdout
        .take()
        .context("failed to capture stdout from command process")?;
    let stderr = child
        .stderr
        .take()
        .context("failed to capture stderr from command process")?;

    let stdout_reader = match spawn_stream_reader(stdout, job, Stream::Stdout, events.clone()) {
        Ok(handle) => handle,
        Err(err) => return Err(abandon_child(job, &mut child, err)),
    };
    let stderr_reader = match spawn_stream_reader(stderr, job, Stream::Stderr, events.clone()) {
        Ok(handle) => handle,
        // The stdout reader is left detached; it stops once the killed child's pipe closes.
        Err(err) => return Err(abandon_child(job, &mut child, err)),
    };

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for {}", command.program))?;

    // Drain both pipes before reporting completion so no line lands after the exit code.
    let _ = stdout_reader.join();
    let _ = stderr_reader.join();

    Ok(JobOutcome::from_status(status))
}

fn abandon_child(job: JobId, child: &mut Child, err: io::Error) -> anyhow::Error {
    if let Err(kill_err) = child.kill() {
        debug!(%job, error = %kill_err, "child already gone");
    }
    let _ = child.wait();
    anyhow::Error::new(err).context("failed to start output reader thread")
}

fn spawn_stream_reader<R, E>(
    reader: R,
    job: JobId,
    stream: Stream,
    events: SyncSender<E>,
) -> io::Result<thread::JoinHandle<()>>
where
    R: io::Read + Send + 'static,
    E: From<JobEvent> + Send + 'static,
{
    let name = format!("{job}-{}", stream.title());
    thread::Builder::new().name(name).spawn(move || {
        let mut buffered = BufReader::new(reader);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match buffered.read_until(b'\n', &mut raw) {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&raw)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    let event = JobEvent::Line {
                        job,
                        stream,
                        line: LogLine::now(text),
                    };
                    if events.send(E::from(event)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}
