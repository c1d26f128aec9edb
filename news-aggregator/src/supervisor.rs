use crate::job::Job;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Commands accepted by the supervisor loop.
pub enum SupervisorCommand {
    /// Spawn the job and track it until shutdown.
    Launch(Job),
    /// Report the labels of the jobs still running.
    Running { respond_to: oneshot::Sender<Vec<String>> },
}

struct RunningJob {
    label: String,
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns every running job. All changes to the job set go through its
/// command channel, so the set itself needs no lock.
pub struct JobSupervisor {
    running: HashMap<Uuid, RunningJob>,
    command_receiver: mpsc::UnboundedReceiver<SupervisorCommand>,
    shutdown_token: CancellationToken,
}

/// Cheap, cloneable way to talk to a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::UnboundedSender<SupervisorCommand>,
    shutdown_token: CancellationToken,
}

impl SupervisorHandle {
    /// Hand a job over to the supervisor. Returns false once the supervisor
    /// has shut down, in which case the job is dropped without running.
    pub fn launch(&self, job: Job) -> bool {
        let label = job.label().to_string();
        match self.commands.send(SupervisorCommand::Launch(job)) {
            Ok(()) => true,
            Err(_) => {
                warn!("Job `{}` not started - supervisor is shut down", label);
                false
            }
        }
    }

    pub async fn running_jobs(&self) -> Vec<String> {
        let (respond_to, response) = oneshot::channel();
        if self.commands.send(SupervisorCommand::Running { respond_to }).is_err() {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    /// Ask every job to stop. Returns immediately.
    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }
}

impl JobSupervisor {
    pub fn new() -> (Self, SupervisorHandle) {
        let (commands, command_receiver) = mpsc::unbounded_channel();
        let shutdown_token = CancellationToken::new();

        let supervisor = Self {
            running: HashMap::new(),
            command_receiver,
            shutdown_token: shutdown_token.clone(),
        };
        let handle = SupervisorHandle {
            commands,
            shutdown_token,
        };
        (supervisor, handle)
    }

    /// Main supervisor loop.
    ///
    /// Returns the task handles of the jobs that were still running at
    /// shutdown, after their stop tokens have been cancelled.
    pub async fn run(mut self) -> Vec<JoinHandle<()>> {
        debug!("Job supervisor started");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_token.cancelled() => break,
                command = self.command_receiver.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        // Nothing queued behind the shutdown gets started
        self.command_receiver.close();

        info!("Stopping {} jobs", self.running.len());
        self.running
            .into_values()
            .map(|job| {
                debug!("Signalling job `{}` to stop", job.label);
                job.stop.cancel();
                job.handle
            })
            .collect()
    }

    fn handle_command(&mut self, command: SupervisorCommand) {
        self.reap_finished();

        match command {
            SupervisorCommand::Launch(job) => {
                let id = job.id();
                let label = job.label().to_string();
                let stop = job.stop_token();
                let handle = tokio::spawn(job.run());

                debug!("Launched job `{}` ({})", label, id);
                self.running.insert(id, RunningJob { label, stop, handle });
            }
            SupervisorCommand::Running { respond_to } => {
                let mut labels: Vec<String> = self.running.values().map(|job| job.label.clone()).collect();
                labels.sort();
                let _ = respond_to.send(labels);
            }
        }
    }

    fn reap_finished(&mut self) {
        self.running.retain(|id, job| {
            let finished = job.handle.is_finished();
            if finished {
                debug!("Job `{}` ({}) has exited", job.label, id);
            }
            !finished
        });
    }
}
