//! Data status shared by screens that fetch remote content.

/// Remote data status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Content is available
    Data,
    /// First fetch in flight
    #[default]
    Loading,
    /// Last fetch failed; `is_loading` while a retry is in flight
    Error { is_loading: bool },
}

impl Status {
    pub fn is_loading(&self) -> bool {
        matches!(self, Status::Loading | Status::Error { is_loading: true })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error { .. })
    }
}
