//! Request tickets for the verify / run controllers.
//!
//! Every outgoing request gets a monotonically increasing ticket. A response
//! is applied only when its ticket is newer than the last applied one, so an
//! older request that resolves late can never overwrite a newer result.

/// Monotonic request number, starting at 1.
pub type Ticket = u64;

/// Whether a resolved response made it into controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    Stale,
}

#[derive(Debug, Default, Clone)]
pub struct RequestSequencer {
    issued: Ticket,
    applied: Ticket,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> Ticket {
        self.issued += 1;
        self.issued
    }

    /// Gate a resolved response. Unknown (never issued) tickets are stale too.
    pub fn accept(&mut self, ticket: Ticket) -> Resolution {
        if ticket > self.applied && ticket <= self.issued {
            self.applied = ticket;
            Resolution::Applied
        } else {
            Resolution::Stale
        }
    }

    /// Mark everything issued so far as stale.
    pub fn invalidate(&mut self) {
        self.applied = self.issued;
    }

    /// A request newer than the last applied one is still outstanding.
    pub fn has_pending(&self) -> bool {
        self.applied < self.issued
    }

    pub fn latest_issued(&self) -> Ticket {
        self.issued
    }
}
