/// Single-result modal dialogs (crop, text editor, color picker)
///
/// A dialog is opened with a request and settles exactly once, with a
/// result or a cancellation. While one is pending a second `open` is
/// rejected instead of replacing it.

use crate::error::{EditorError, EditorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModalTicket(u64);

#[derive(Debug)]
pub struct ModalSlot<Req> {
    pending: Option<(ModalTicket, Req)>,
    next: u64,
}

impl<Req> Default for ModalSlot<Req> {
    fn default() -> Self {
        Self { pending: None, next: 0 }
    }
}

impl<Req> ModalSlot<Req> {
    pub fn open(&mut self, request: Req) -> EditorResult<ModalTicket> {
        if self.pending.is_some() {
            return Err(EditorError::ModalBusy);
        }
        self.next += 1;
        let ticket = ModalTicket(self.next);
        self.pending = Some((ticket, request));
        Ok(ticket)
    }

    pub fn request(&self) -> Option<&Req> {
        self.pending.as_ref().map(|(_, r)| r)
    }

    pub fn is_open(&self) -> bool {
        self.pending.is_some()
    }

    /// Close the dialog, pairing `result` with the original request.
    /// `None` for a ticket that is not the pending one.
    pub fn resolve<Res>(&mut self, ticket: ModalTicket, result: Option<Res>) -> Option<(Req, Option<Res>)> {
        match &self.pending {
            Some((t, _)) if *t == ticket => self.pending.take().map(|(_, req)| (req, result)),
            _ => None,
        }
    }

    pub fn cancel(&mut self) -> Option<Req> {
        self.pending.take().map(|(_, req)| req)
    }
}
