use crate::call::coordinator::{CallCoordinator, CallDeps};
use crate::call::event::{CallCommand, CallEvent};
use crate::config::CallConfig;
use crate::media::TrackKind;
use callkit_core::{CallError, CallSnapshot, CallStatus};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// A running call. Commands are queued to the call's event loop; state is read from
/// the published [`CallSnapshot`].
pub struct CallHandle {
    commands: mpsc::UnboundedSender<CallEvent>,
    snapshot: watch::Receiver<CallSnapshot>,
    errors: broadcast::Sender<CallError>,
    task: JoinHandle<()>,
}

impl CallHandle {
    pub fn spawn(deps: CallDeps, config: CallConfig) -> Self {
        let (coordinator, inbox) = CallCoordinator::new(deps, config);
        let commands = coordinator.inbox();
        let snapshot = coordinator.watch();
        let errors = coordinator.errors_sender();
        let task = tokio::spawn(coordinator.run(inbox));

        Self {
            commands,
            snapshot,
            errors,
            task,
        }
    }

    fn send(&self, command: CallCommand) {
        if self.commands.send(command.clone().into()).is_err() {
            debug!("Call loop finished; {:?} ignored", command);
        }
    }

    pub fn start(&self) {
        self.send(CallCommand::Start);
    }

    /// Tear the call down. Calling it again, or after the call ended, does nothing.
    pub fn leave(&self) {
        self.send(CallCommand::Leave {
            complete_session: false,
        });
    }

    /// Leave and mark the interview session completed.
    pub fn finish(&self) {
        self.send(CallCommand::Leave {
            complete_session: true,
        });
    }

    pub fn toggle_screen_share(&self) {
        self.send(CallCommand::ToggleScreenShare);
    }

    pub fn set_track_enabled(&self, kind: TrackKind, enabled: bool) {
        self.send(CallCommand::SetTrackEnabled { kind, enabled });
    }

    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> CallStatus {
        self.snapshot.borrow().status
    }

    pub fn watch(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot.clone()
    }

    /// Error events from now on. Errors raised before subscribing are not replayed.
    pub fn errors(&self) -> broadcast::Receiver<CallError> {
        self.errors.subscribe()
    }

    /// Resolve once a published snapshot satisfies `predicate`, or `None` if the call
    /// loop finished without one doing so.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&CallSnapshot) -> bool,
    ) -> Option<CallSnapshot> {
        let mut snapshot = self.snapshot.clone();
        let found = snapshot.wait_for(predicate).await.ok().map(|s| s.clone());
        found
    }

    pub async fn wait_for_status(&self, status: CallStatus) -> Option<CallSnapshot> {
        self.wait_for(|s| s.status == status).await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
