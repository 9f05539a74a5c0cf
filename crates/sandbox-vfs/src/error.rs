//! Error types for the sandbox virtual filesystem

use std::io;

/// Core filesystem error type
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("access denied")]
    AccessDenied,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("name not allowed")]
    InvalidName,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("bad file descriptor")]
    BadDescriptor,
    #[error("too many open files")]
    TooManyOpenFiles,
    #[error("too many levels of symbolic links")]
    TooManyLinks,
    #[error("no such device")]
    NoDevice,
    #[error("resource temporarily unavailable")]
    WouldBlock,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type FsResult<T> = Result<T, FsError>;
