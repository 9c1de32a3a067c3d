/// Guards against out-of-order backend responses
///
/// Every stylize/background request for a photo takes a ticket. Starting a
/// new request of the same kind for the same photo supersedes the previous
/// one: only the response carrying the newest ticket is applied, older
/// ones are dropped when they arrive. A change of base image supersedes
/// the other kind as well, since its response was computed from stale pixels.

use std::collections::HashMap;

use tracing::debug;

use super::data::PhotoId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Stylize,
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    pub photo: PhotoId,
    pub kind: RequestKind,
    generation: u64,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    in_flight: bool,
}

#[derive(Debug, Default)]
pub struct RequestTracker {
    slots: HashMap<(PhotoId, RequestKind), Slot>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, photo: PhotoId, kind: RequestKind) -> RequestTicket {
        let slot = self.slots.entry((photo, kind)).or_default();
        slot.generation += 1;
        slot.in_flight = true;
        RequestTicket { photo, kind, generation: slot.generation }
    }

    /// Settle a response. Returns whether it is the latest and should be applied.
    pub fn finish(&mut self, ticket: RequestTicket) -> bool {
        match self.slots.get_mut(&(ticket.photo, ticket.kind)) {
            Some(slot) if slot.generation == ticket.generation => {
                slot.in_flight = false;
                true
            }
            _ => {
                debug!(photo = ticket.photo.0, kind = ?ticket.kind, "dropping stale response");
                false
            }
        }
    }

    /// Make any outstanding ticket of this kind stale without issuing a new one
    pub fn supersede(&mut self, photo: PhotoId, kind: RequestKind) {
        if let Some(slot) = self.slots.get_mut(&(photo, kind)) {
            if slot.in_flight {
                debug!(photo = photo.0, ?kind, "superseding in-flight request");
            }
            slot.generation += 1;
            slot.in_flight = false;
        }
    }

    pub fn is_loading(&self, photo: PhotoId) -> bool {
        self.slots.iter().any(|((p, _), s)| *p == photo && s.in_flight)
    }

    pub fn any_loading(&self, kind: RequestKind) -> bool {
        self.slots.iter().any(|((_, k), s)| *k == kind && s.in_flight)
    }

    /// Forget everything; responses for tickets issued before this are stale
    pub fn reset(&mut self) {
        for slot in self.slots.values_mut() {
            slot.generation += 1;
            slot.in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: PhotoId = PhotoId(1);

    #[test]
    fn last_request_wins() {
        let mut t = RequestTracker::new();
        let first = t.begin(P, RequestKind::Stylize);
        let second = t.begin(P, RequestKind::Stylize);

        assert!(!t.finish(first));
        assert!(t.is_loading(P));
        assert!(t.finish(second));
        assert!(!t.is_loading(P));
    }

    #[test]
    fn kinds_and_photos_are_independent() {
        let mut t = RequestTracker::new();
        let style = t.begin(P, RequestKind::Stylize);
        let bg = t.begin(P, RequestKind::Background);
        let other = t.begin(PhotoId(2), RequestKind::Stylize);

        assert!(t.finish(bg));
        assert!(t.any_loading(RequestKind::Stylize));
        assert!(t.finish(style));
        assert!(t.finish(other));
        assert!(!t.any_loading(RequestKind::Stylize));
    }

    #[test]
    fn superseded_tickets_are_stale() {
        let mut t = RequestTracker::new();
        let bg = t.begin(P, RequestKind::Background);
        t.supersede(P, RequestKind::Background);
        assert!(!t.is_loading(P));
        assert!(!t.finish(bg));

        // Nothing issued yet: nothing to supersede, later tickets still apply
        t.supersede(PhotoId(2), RequestKind::Stylize);
        let style = t.begin(PhotoId(2), RequestKind::Stylize);
        assert!(t.finish(style));
    }

    #[test]
    fn reset_invalidates_outstanding_tickets() {
        let mut t = RequestTracker::new();
        let ticket = t.begin(P, RequestKind::Background);
        t.reset();
        assert!(!t.is_loading(P));
        assert!(!t.finish(ticket));
    }
}
