//! # Session Pipeline
//!
//! Dedicated thread that owns the `WorkoutSession` and the consumer side of the
//! sample stream. User commands and stream events are handled one at a time on
//! this thread, so transitions never interleave with sample processing.
//!
//! Before a command runs, every event already queued on the stream is processed.
//! An `end_set` therefore sees all samples the transport delivered before it.

use crate::error::SessionError;
use crate::gateway::{SetId, WorkoutId};
use crate::rep_writer::RepWriterStats;
use crate::session::{SessionSnapshot, SetSummary, WorkoutSession};
use crate::stream::{LinkStatus, SampleStream, StreamItem};
use crossbeam_channel::{never, select, unbounded, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    StartWorkout(Reply<WorkoutId>),
    EndWorkout(Reply<WorkoutId>),
    StartSet {
        exercise_type: String,
        weight: f32,
        reply: Reply<SetId>,
    },
    EndSet(Reply<SetSummary>),
    RetryPendingSaves(Reply<usize>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

/// Handle for issuing commands to the pipeline thread
pub struct PipelineHandle {
    commands: Option<Sender<Command>>,
    thread: Option<JoinHandle<WorkoutSession>>,
}

/// Start the pipeline thread
///
/// Session transitions are driven with `runtime.block_on`, so `runtime` must
/// belong to a multi-threaded runtime that outlives the pipeline.
pub fn spawn(
    session: WorkoutSession,
    stream: SampleStream,
    runtime: Handle,
) -> std::io::Result<PipelineHandle> {
    let (commands, command_rx) = unbounded();
    let thread = thread::Builder::new()
        .name("session-pipeline".to_string())
        .spawn(move || run(session, stream, command_rx, runtime))?;

    Ok(PipelineHandle {
        commands: Some(commands),
        thread: Some(thread),
    })
}

fn run(
    mut session: WorkoutSession,
    mut stream: SampleStream,
    commands: Receiver<Command>,
    runtime: Handle,
) -> WorkoutSession {
    log::debug!("Pipeline: started");
    let events = stream.events();
    let closed = never();
    let mut stream_open = true;

    loop {
        let source = if stream_open { &events } else { &closed };
        select! {
            recv(source) -> event => match event {
                Ok(event) => {
                    if let Some(item) = stream.accept(event) {
                        handle_item(&mut session, item);
                    }
                }
                Err(_) => {
                    log::info!("Pipeline: sample stream closed");
                    stream_open = false;
                }
            },
            recv(commands) -> command => match command {
                Ok(command) => {
                    drain(&mut session, &mut stream);
                    execute(&mut session, command, &runtime);
                }
                Err(_) => break,
            },
        }
    }

    drain(&mut session, &mut stream);
    if stream.dropped_frames() > 0 {
        log::warn!("Pipeline: {} undecodable frame(s) dropped", stream.dropped_frames());
    }
    log::debug!("Pipeline: command channel closed, shutting down");
    session
}

fn drain(session: &mut WorkoutSession, stream: &mut SampleStream) {
    while let Some(item) = stream.try_next_item() {
        handle_item(session, item);
    }
}

fn handle_item(session: &mut WorkoutSession, item: StreamItem) {
    match item {
        StreamItem::Sample(sample) => {
            session.ingest(sample);
        }
        StreamItem::Link(LinkStatus::Connected) => log::info!("Sensor connected"),
        StreamItem::Link(LinkStatus::Disconnected) => {
            log::info!("Sensor disconnected");
            session.link_lost();
        }
    }
}

fn execute(session: &mut WorkoutSession, command: Command, runtime: &Handle) {
    // A dropped reply receiver means the caller stopped waiting
    match command {
        Command::StartWorkout(reply) => {
            let _ = reply.send(runtime.block_on(session.start_workout()));
        }
        Command::EndWorkout(reply) => {
            let _ = reply.send(runtime.block_on(session.end_workout()));
        }
        Command::StartSet {
            exercise_type,
            weight,
            reply,
        } => {
            let _ = reply.send(runtime.block_on(session.start_set(&exercise_type, weight)));
        }
        Command::EndSet(reply) => {
            let _ = reply.send(runtime.block_on(session.end_set()));
        }
        Command::RetryPendingSaves(reply) => {
            let _ = reply.send(runtime.block_on(session.retry_pending_saves()));
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(session.snapshot());
        }
    }
}

impl PipelineHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let commands = self.commands.as_ref().ok_or(SessionError::PipelineClosed)?;
        let (reply, response) = oneshot::channel();
        commands
            .send(command(reply))
            .map_err(|_| SessionError::PipelineClosed)?;
        response.await.map_err(|_| SessionError::PipelineClosed)
    }

    pub async fn start_workout(&self) -> Result<WorkoutId, SessionError> {
        self.request(Command::StartWorkout).await?
    }

    pub async fn end_workout(&self) -> Result<WorkoutId, SessionError> {
        self.request(Command::EndWorkout).await?
    }

    pub async fn start_set(&self, exercise_type: &str, weight: f32) -> Result<SetId, SessionError> {
        let exercise_type = exercise_type.to_string();
        self.request(|reply| Command::StartSet {
            exercise_type,
            weight,
            reply,
        })
        .await?
    }

    pub async fn end_set(&self) -> Result<SetSummary, SessionError> {
        self.request(Command::EndSet).await?
    }

    pub async fn retry_pending_saves(&self) -> Result<usize, SessionError> {
        self.request(Command::RetryPendingSaves).await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(Command::Snapshot).await
    }

    /// Stop the pipeline thread and wait for queued rep saves
    pub async fn shutdown(mut self) -> Result<RepWriterStats, SessionError> {
        self.commands.take();
        let thread = self.thread.take().ok_or(SessionError::PipelineClosed)?;

        let joined = tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|_| SessionError::PipelineClosed)?;
        let session = joined.map_err(|_| {
            log::error!("Pipeline thread panicked");
            SessionError::PipelineClosed
        })?;

        Ok(session.close().await)
    }
}
