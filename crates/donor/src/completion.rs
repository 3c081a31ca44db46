use std::future::IntoFuture;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;

use crate::error::DonorError;

/// Final result of a donor instance run.
pub type DonorOutcome = Result<(), Arc<DonorError>>;

/// Producer side of a [`CompletionFuture`]. Only the first `resolve` counts.
pub(crate) struct Completion {
    tx: watch::Sender<Option<DonorOutcome>>,
}

impl Completion {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub(crate) fn resolve(&self, outcome: std::result::Result<(), DonorError>) -> bool {
        let mut outcome = Some(outcome.map_err(Arc::new));
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = outcome.take();
            true
        })
    }

    pub(crate) fn future(&self) -> CompletionFuture {
        CompletionFuture {
            rx: self.tx.subscribe(),
        }
    }
}

/// Handle on an instance's outcome. Clone freely; each clone observes the
/// same single result, whether it attached before or after resolution.
#[derive(Clone)]
pub struct CompletionFuture {
    rx: watch::Receiver<Option<DonorOutcome>>,
}

impl CompletionFuture {
    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn try_get(&self) -> Option<DonorOutcome> {
        self.rx.borrow().clone()
    }

    pub async fn wait(mut self) -> DonorOutcome {
        let resolved = match self.rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        resolved.unwrap_or_else(|| Err(Arc::new(DonorError::Abandoned)))
    }
}

impl IntoFuture for CompletionFuture {
    type Output = DonorOutcome;
    type IntoFuture = BoxFuture<'static, DonorOutcome>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait().boxed()
    }
}

impl std::fmt::Debug for CompletionFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionFuture")
            .field("ready", &self.is_ready())
            .finish()
    }
}
