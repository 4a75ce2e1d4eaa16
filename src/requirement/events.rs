//! Requirement change notifications.
//!
//! The detector that notices a requirement should be installed or removed
//! holds a [`RequirementEvents`] emitter; the orchestrator owns the receiving
//! end. Emitting never waits for the resulting job.

use tokio::sync::mpsc;

use super::Requirement;
use crate::error::PaketError;
use crate::job::JobType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementEvent {
    Installing(Requirement),
    Uninstalling(Requirement),
}

impl RequirementEvent {
    pub fn job_type(&self) -> JobType {
        match self {
            RequirementEvent::Installing(_) => JobType::Install,
            RequirementEvent::Uninstalling(_) => JobType::Uninstall,
        }
    }

    pub fn requirement(&self) -> &Requirement {
        match self {
            RequirementEvent::Installing(req) | RequirementEvent::Uninstalling(req) => req,
        }
    }

    pub fn into_requirement(self) -> Requirement {
        match self {
            RequirementEvent::Installing(req) | RequirementEvent::Uninstalling(req) => req,
        }
    }
}

/// Cloneable sending half of the requirement event channel.
#[derive(Debug, Clone)]
pub struct RequirementEvents {
    tx: mpsc::UnboundedSender<RequirementEvent>,
}

impl RequirementEvents {
    pub fn installing(&self, requirement: Requirement) -> Result<(), PaketError> {
        self.emit(RequirementEvent::Installing(requirement))
    }

    pub fn uninstalling(&self, requirement: Requirement) -> Result<(), PaketError> {
        self.emit(RequirementEvent::Uninstalling(requirement))
    }

    pub fn emit(&self, event: RequirementEvent) -> Result<(), PaketError> {
        self.tx.send(event).map_err(|_| PaketError::ChannelClosed)
    }
}

/// Creates a connected emitter/receiver pair.
pub fn channel() -> (RequirementEvents, mpsc::UnboundedReceiver<RequirementEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RequirementEvents { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> Requirement {
        Requirement::new("acme/widget", "^1.0").unwrap()
    }

    #[test]
    fn event_maps_to_job_type() {
        assert_eq!(
            RequirementEvent::Installing(widget()).job_type(),
            JobType::Install
        );
        assert_eq!(
            RequirementEvent::Uninstalling(widget()).job_type(),
            JobType::Uninstall
        );
    }

    #[tokio::test]
    async fn emitted_events_arrive_in_order() {
        let (events, mut rx) = channel();
        events.installing(widget()).unwrap();
        events.clone().uninstalling(widget()).unwrap();
        drop(events);

        assert_eq!(rx.recv().await, Some(RequirementEvent::Installing(widget())));
        assert_eq!(
            rx.recv().await,
            Some(RequirementEvent::Uninstalling(widget()))
        );
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn emit_fails_once_receiver_is_gone() {
        let (events, rx) = channel();
        drop(rx);
        assert!(matches!(
            events.installing(widget()),
            Err(PaketError::ChannelClosed)
        ));
    }
}
