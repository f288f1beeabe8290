use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::summary::ProgressSnapshot;
use crate::models::Session;

/// Messages accepted by the coordinator.
#[derive(Debug)]
pub(crate) enum Command {
    AddSessions(Vec<Session>),
    Cancel,
    Progress(oneshot::Sender<ProgressSnapshot>),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The coordinator finished or was dropped.
    #[error("scheduler has stopped")]
    Stopped,
    #[error("scheduler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Cheap, cloneable handle for talking to a running scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    /// Queue more sessions. Requests already known to the run are not repeated.
    pub fn add_sessions(&self, sessions: Vec<Session>) -> Result<(), SchedulerError> {
        self.send(Command::AddSessions(sessions))
    }

    /// Stop submitting. Requests already dispatched are allowed to finish.
    pub fn cancel(&self) -> Result<(), SchedulerError> {
        self.send(Command::Cancel)
    }

    /// Current progress counters.
    pub async fn progress(&self) -> Result<ProgressSnapshot, SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Progress(tx))?;
        rx.await.map_err(|_| SchedulerError::Stopped)
    }

    fn send(&self, cmd: Command) -> Result<(), SchedulerError> {
        self.tx.send(cmd).map_err(|_| SchedulerError::Stopped)
    }
}
