use crate::crawler::frontier::{Target, TargetId};
use crate::state::TargetState;
use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use url::Url;

/// A target entered a new state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub target: TargetId,
    pub url: Url,
    pub state: TargetState,
}

pub type ProgressReceiver = UnboundedReceiver<ProgressEvent>;

/// Creates the outbound progress feed for an orchestrator
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = unbounded_channel();
    (ProgressSender(Some(tx)), rx)
}

/// Sending half of the progress feed; a no-op when nobody listens
#[derive(Debug, Clone, Default)]
pub struct ProgressSender(Option<UnboundedSender<ProgressEvent>>);

impl ProgressSender {
    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn emit(&self, target: &Target, state: TargetState) {
        if let Some(tx) = &self.0 {
            // a dropped receiver just means nobody is watching anymore
            let _ = tx.send(ProgressEvent {
                target: target.id,
                url: target.url.clone(),
                state,
            });
        }
    }
}

impl From<UnboundedSender<ProgressEvent>> for ProgressSender {
    fn from(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self(Some(tx))
    }
}
