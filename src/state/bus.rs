/// Typed events from the review session to the app shell
///
/// The session publishes; the iced update loop drains after every message
/// and turns events into toasts, screen switches and redraws.

use std::collections::VecDeque;

use super::decoration::DecorationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Import,
    Review,
    Result,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Toast { level: ToastLevel, message: String },
    ScreenChanged(Screen),
    /// The composed preview of a photo changed
    PreviewInvalidated { index: usize },
    /// Photo order or content changed; the thumbnail strip must rebuild
    ThumbnailsInvalidated,
    SelectionChanged(Option<DecorationId>),
    /// Finalize aborted; the finalize control is usable again
    FinalizeFailed(String),
}

impl AppEvent {
    pub fn info(message: impl Into<String>) -> Self {
        AppEvent::Toast { level: ToastLevel::Info, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        AppEvent::Toast { level: ToastLevel::Error, message: message.into() }
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    queue: VecDeque<AppEvent>,
}

impl EventBus {
    pub fn publish(&mut self, event: AppEvent) {
        self.queue.push_back(event);
    }

    /// Take every pending event, oldest first
    pub fn drain(&mut self) -> Vec<AppEvent> {
        self.queue.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_order_and_empties() {
        let mut bus = EventBus::default();
        bus.publish(AppEvent::ThumbnailsInvalidated);
        bus.publish(AppEvent::error("Stylization failed"));

        let events = bus.drain();
        assert_eq!(events[0], AppEvent::ThumbnailsInvalidated);
        assert!(matches!(&events[1], AppEvent::Toast { level: ToastLevel::Error, .. }));
        assert!(bus.drain().is_empty());
    }
}
