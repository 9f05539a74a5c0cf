//! Error types for console stream wiring

use sandbox_vfs::{Fd, FsError};

/// Errors that can occur while wiring the guest's standard streams
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to {action}: {source}")]
    Setup {
        action: String,
        #[source]
        source: FsError,
    },

    #[error("Descriptor {expected} was reopened as {actual}")]
    DescriptorMismatch { expected: Fd, actual: Fd },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach the failed wiring step to a filesystem error
pub(crate) fn setup_step(action: impl Into<String>) -> impl FnOnce(FsError) -> Error {
    let action = action.into();
    move |source| Error::Setup { action, source }
}
