use std::sync::atomic::{AtomicU64, Ordering};

/// Drops results of searches that were superseded while in flight.
///
/// Every search takes a ticket from [`begin`](Self::begin); when it completes,
/// [`accept`](Self::accept) only lets the result through if no newer search
/// has started since.
#[derive(Debug, Default)]
pub struct SearchGate {
    generation: AtomicU64,
}

/// Generation number handed to one search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTicket(u64);

impl SearchGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> SearchTicket {
        SearchTicket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: SearchTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    pub fn accept<T>(&self, ticket: SearchTicket, result: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(result)
        } else {
            tracing::debug!(ticket = ticket.0, "Discarding stale search result");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_search_wins() {
        let gate = SearchGate::new();
        let old = gate.begin();
        let new = gate.begin();

        assert_eq!(gate.accept(old, "stale"), None);
        assert_eq!(gate.accept(new, "fresh"), Some("fresh"));
    }

    #[test]
    fn test_single_search_is_accepted() {
        let gate = SearchGate::new();
        let ticket = gate.begin();
        assert!(gate.is_current(ticket));
        assert_eq!(gate.accept(ticket, 1), Some(1));
    }
}
