/// State management module
///
/// This module handles all session state:
/// - Shared data structures (data.rs)
/// - Non-destructive edit layers (edit.rs)
/// - The per-photo transform pipeline and its caches (transform.rs)
/// - Stickers and text boxes (decoration.rs)
/// - Stale-response guarding for backend requests (requests.rs)
/// - Typed app events (bus.rs) and single-result dialogs (modal.rs)
/// - The local catalog of finished sessions (library.rs)

pub mod bus;
pub mod data;
pub mod decoration;
pub mod edit;
pub mod library;
pub mod modal;
pub mod requests;
pub mod transform;
