/// The externally visible state of the sync engine. Exactly one value at a
/// time, published through a watch channel. Errors are cleared by the next
/// successful cycle.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Idle,
    Loading,
    Error(String),
    /// The remote reported no further pages; the local store holds the full
    /// history.
    LoadedAll,
}

impl SyncState {
    pub fn is_error(&self) -> bool {
        return matches!(self, SyncState::Error(_));
    }
}
