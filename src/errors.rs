//! Per-subsystem error types.
//!
//! Plain `Copy` enums with a `Display` impl for the serial logger, the way
//! a `no_std` kernel without `alloc` reports errors: no `core::error::Error`
//! (no blanket object-safety need without `alloc`).

use core::fmt;

/// Errors raised by the filesystem image reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsError {
    /// A name or index did not resolve to a directory entry.
    NotFound,
    /// The boot block or an inode's fields are out of range for the image.
    CorruptImage,
    /// An argument (e.g. a negative offset) is not valid for this operation.
    InvalidArgument,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such file or directory"),
            Self::CorruptImage => write!(f, "filesystem image is corrupt"),
            Self::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

/// Errors raised while loading and launching a new process image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecError {
    /// The named file does not exist or is not executable.
    NotFound,
    /// The file exists but fails the ELF magic-number check.
    NotExecutable,
    /// No pid slot is free in the 6-slot bitmap.
    ResourceExhausted,
    /// The command line could not be parsed (e.g. empty).
    InvalidArgument,
    /// The image is truncated or otherwise unreadable.
    CorruptImage,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such file or directory"),
            Self::NotExecutable => write!(f, "file is not executable"),
            Self::ResourceExhausted => write!(f, "maximum number of processes reached"),
            Self::InvalidArgument => write!(f, "invalid command"),
            Self::CorruptImage => write!(f, "executable image is corrupt"),
        }
    }
}

/// Errors raised by the syscall dispatcher, returned to user space as `-1`
/// on the syscall ABI but logged here with their cause.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyscallError {
    /// The file descriptor index is out of range or not currently open.
    BadFileDescriptor,
    /// The operation is not supported for this open file's type.
    Unsupported,
    /// An argument failed validation (null buffer, negative length, ...).
    InvalidArgument,
    /// No free slot was available (FD table full, no pid free, ...).
    ResourceExhausted,
    /// The underlying filesystem or exec operation failed.
    Fs(FsError),
    /// The underlying exec operation failed.
    Exec(ExecError),
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadFileDescriptor => write!(f, "bad file descriptor"),
            Self::Unsupported => write!(f, "operation not supported"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::ResourceExhausted => write!(f, "resource exhausted"),
            Self::Fs(inner) => write!(f, "{inner}"),
            Self::Exec(inner) => write!(f, "{inner}"),
        }
    }
}

impl From<FsError> for SyscallError {
    fn from(inner: FsError) -> Self {
        Self::Fs(inner)
    }
}

impl From<ExecError> for SyscallError {
    fn from(inner: ExecError) -> Self {
        Self::Exec(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn fs_error_converts_into_syscall_error() {
        let err: SyscallError = FsError::NotFound.into();
        assert_eq!(err, SyscallError::Fs(FsError::NotFound));
    }

    #[test_case]
    fn exec_error_converts_into_syscall_error() {
        let err: SyscallError = ExecError::ResourceExhausted.into();
        assert_eq!(err, SyscallError::Exec(ExecError::ResourceExhausted));
    }
}
