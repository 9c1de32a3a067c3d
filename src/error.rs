/// Error type shared by the edit pipeline, the backend client and the catalog

pub type EditorResult<T> = Result<T, EditorError>;

#[derive(thiserror::Error, Debug)]
pub enum EditorError {
    /// The backend answered with a non-success status
    #[error("backend error ({status}): {detail}")]
    Backend { status: u16, detail: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    /// Invalid user input, caught before any network call
    #[error("validation error: {0}")]
    Validation(String),

    #[error("photo index {index} out of range (have {len})")]
    InvalidIndex { index: usize, len: usize },

    #[error("a dialog is already open")]
    ModalBusy,

    /// Preview or session state is not ready for the requested action
    #[error("not ready: {0}")]
    NotReady(String),
}

impl EditorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    pub fn backend(status: u16, detail: impl Into<String>) -> Self {
        Self::Backend {
            status,
            detail: detail.into(),
        }
    }

    /// Failures the user can retry without losing state
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::Http(_) | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(EditorError::validation("x")
            .to_string()
            .contains("validation error:"));
        assert!(EditorError::not_ready("x").to_string().contains("not ready:"));
        assert_eq!(
            EditorError::backend(500, "boom").to_string(),
            "backend error (500): boom"
        );
        assert_eq!(
            EditorError::InvalidIndex { index: 4, len: 3 }.to_string(),
            "photo index 4 out of range (have 3)"
        );
    }

    #[test]
    fn io_errors_convert_and_are_transient() {
        let err: EditorError = std::io::Error::other("disk").into();
        assert!(err.is_transient());
        assert!(!EditorError::ModalBusy.is_transient());
    }
}
