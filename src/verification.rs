//! Verification controller: advisory "is this DSL acceptable?" feedback.
//! Never gates a run and never touches the draft.

use log::{debug, info, warn};

use crate::error::WorkbenchError;
use crate::sequencer::{RequestSequencer, Resolution, Ticket};

pub const VERIFY_FALLBACK_REASON: &str = "Verification failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Idle,
    Pending,
    Valid,
    Invalid { reason: String },
}

/// Snapshot of the draft text sent to the validation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    pub ticket: Ticket,
    pub dsl: String,
}

#[derive(Debug, Default)]
pub struct VerificationController {
    settled: Option<VerificationOutcome>,
    sequencer: RequestSequencer,
}

impl VerificationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(&self) -> VerificationOutcome {
        if self.sequencer.has_pending() {
            return VerificationOutcome::Pending;
        }
        self.settled.clone().unwrap_or(VerificationOutcome::Idle)
    }

    pub fn is_pending(&self) -> bool {
        self.sequencer.has_pending()
    }

    pub fn begin(&mut self, draft_text: &str) -> VerifyRequest {
        let ticket = self.sequencer.issue();
        debug!("verify #{ticket} issued ({} bytes)", draft_text.len());
        VerifyRequest { ticket, dsl: draft_text.to_owned() }
    }

    pub fn resolve(
        &mut self,
        ticket: Ticket,
        result: Result<(), WorkbenchError>,
    ) -> Resolution {
        if self.sequencer.accept(ticket) == Resolution::Stale {
            warn!("verify #{ticket} resolved after a newer request or an edit; discarded");
            return Resolution::Stale;
        }
        self.settled = Some(match result {
            Ok(()) => {
                info!("verify #{ticket}: valid");
                VerificationOutcome::Valid
            }
            Err(err) => {
                let reason = err
                    .reason()
                    .unwrap_or_else(|| VERIFY_FALLBACK_REASON.to_owned());
                info!("verify #{ticket}: invalid ({reason})");
                VerificationOutcome::Invalid { reason }
            }
        });
        Resolution::Applied
    }

    /// The draft text changed: drop the verdict and ignore anything in flight.
    pub fn rearm(&mut self) {
        self.settled = None;
        self.sequencer.invalidate();
    }
}
