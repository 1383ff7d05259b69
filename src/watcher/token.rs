//! Cancellation of superseded resolutions and settling of deferred candidates.
//!
//! Every resolution started by the watcher owns a [`CancellationToken`]. Starting a newer
//! resolution for the same container aborts the older token; the older chain then stops at its
//! next suspension point and its result is dropped.
//!
//! A resolution moves through [`ResolutionPhase`]:
//!
//! ```text
//! Idle ──start──▶ Pending ──terminal candidate──▶ Settled
//!                    │
//!                    └──token aborted──▶ Aborted
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::debug;

use crate::{
    candidate::{CandidateKind, DisplayCandidate},
    dataprod_errors::DataProdError,
};

/// Shared abort flag of one resolution.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    aborted: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// `Err(DataProdError::Aborted)` once the token has been aborted.
    pub fn check(&self) -> Result<(), DataProdError> {
        if self.is_aborted() {
            Err(DataProdError::Aborted)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResolutionPhase {
    #[default]
    Idle,
    /// A deferred candidate is outstanding.
    Pending,
    /// A terminal candidate was produced.
    Settled(DisplayCandidate),
    /// The token was aborted before the chain completed.
    Aborted,
}

impl ResolutionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResolutionPhase::Settled(_) | ResolutionPhase::Aborted)
    }
}

/// Follow a chain of deferred candidates until a terminal one.
///
/// The token is checked before each step and after each wait, so a result arriving after
/// [`CancellationToken::abort`] is never returned.
///
/// Arguments
/// -----------------
/// * `first`: The candidate returned by a converter entry point.
/// * `token`: Abort flag of the resolution.
/// * `on_pending`: Called with the working message to publish while each deferred step runs.
///
/// Return
/// ----------
/// * [`ResolutionPhase::Settled`] with the terminal candidate, or [`ResolutionPhase::Aborted`].
pub async fn settle(
    first: DisplayCandidate,
    token: &CancellationToken,
    mut on_pending: impl FnMut(DisplayCandidate),
) -> ResolutionPhase {
    let mut current = first;
    loop {
        if token.is_aborted() {
            debug!("resolution aborted before settling");
            return ResolutionPhase::Aborted;
        }
        let deferred = match current.kind {
            CandidateKind::Deferred(d) => d,
            _ => return ResolutionPhase::Settled(current),
        };
        on_pending(DisplayCandidate::working_message(
            deferred.message.clone(),
            deferred.request.as_ref(),
        ));
        current = deferred.pending.wait().await;
    }
}
