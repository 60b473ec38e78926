//! Unified error handling for the genus registry
//!
//! Every layer owns a `thiserror` enum: policy rejections from the capacity
//! registry, lifecycle errors from the process table, and configuration
//! loading failures. At the syscall surface all of them collapse to `-1`.

use crate::core::models::{GenusId, Pid};
use std::fmt;
use thiserror::Error;

/// Policy rejections reported by [`CapacityRegistry::acquire`](crate::registry::CapacityRegistry::acquire).
///
/// A rejected request never leaves partial state behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenusError {
    /// Requested capacity is not positive or exceeds the whole budget
    #[error("invalid capacity request: {requested} (allowed range 1..={max})")]
    InvalidAmount { requested: i64, max: u32 },

    /// Caller already carries a genus, self-acquired or inherited
    #[error("process {pid} already belongs to genus {genus}")]
    AlreadyOwnsGenus { pid: Pid, genus: GenusId },

    /// Caller acquired once already in its lifetime, even if that genus is gone
    #[error("process {pid} already acquired a genus during its lifetime")]
    AlreadyAcquired { pid: Pid },

    /// Individually valid request that would overflow the budget
    #[error("capacity pool exhausted: requested {requested}, reserved {reserved}/{total}")]
    PoolExhausted {
        requested: u32,
        reserved: u32,
        total: u32,
    },

    /// The id counter left the range user code can tell apart from `-1`
    #[error("genus id space exhausted at {next}")]
    IdSpaceExhausted { next: u64 },
}

/// Sub-kind of a [`GenusError`], for callers that want to branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenusErrorKind {
    InvalidAmount,
    AlreadyOwnsGenus,
    PoolExhausted,
}

impl GenusError {
    /// Failure value shared by every rejection at the syscall surface.
    pub const SYSCALL_FAILURE: i64 = -1;

    pub fn kind(&self) -> GenusErrorKind {
        match self {
            GenusError::InvalidAmount { .. } => GenusErrorKind::InvalidAmount,
            GenusError::AlreadyOwnsGenus { .. } | GenusError::AlreadyAcquired { .. } => {
                GenusErrorKind::AlreadyOwnsGenus
            }
            GenusError::PoolExhausted { .. } | GenusError::IdSpaceExhausted { .. } => {
                GenusErrorKind::PoolExhausted
            }
        }
    }
}

impl GenusErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenusErrorKind::InvalidAmount => "invalid_amount",
            GenusErrorKind::AlreadyOwnsGenus => "already_owns_genus",
            GenusErrorKind::PoolExhausted => "pool_exhausted",
        }
    }
}

impl fmt::Display for GenusErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle errors from the process table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("no such process: {0}")]
    NoSuchProcess(Pid),
    #[error("process {0} is not running")]
    NotRunning(Pid),
    #[error("process {0} has no children")]
    NoChildren(Pid),
    #[error("init process cannot exit")]
    InitCannotExit,
    #[error("genus error: {0}")]
    Genus(#[from] GenusError),
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: String },
    #[error("total_budget must be positive, got {value}")]
    InvalidBudget { value: u32 },
    #[error("id_origin {value} does not fit the signed id range")]
    InvalidIdOrigin { value: u64 },
    #[error("Config source error: {0}")]
    Source(#[from] ::config::ConfigError),
}

/// Result type alias for convenience
pub type GenusResult<T> = Result<T, GenusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let invalid = GenusError::InvalidAmount {
            requested: 0,
            max: 90,
        };
        let owned = GenusError::AlreadyOwnsGenus {
            pid: Pid::from_raw(3),
            genus: GenusId::from_raw(1),
        };
        let exhausted = GenusError::PoolExhausted {
            requested: 1,
            reserved: 90,
            total: 90,
        };

        assert_eq!(invalid.kind(), GenusErrorKind::InvalidAmount);
        assert_eq!(owned.kind(), GenusErrorKind::AlreadyOwnsGenus);
        assert_eq!(exhausted.kind(), GenusErrorKind::PoolExhausted);
        assert_eq!(exhausted.kind().to_string(), "pool_exhausted");
    }

    #[test]
    fn test_lifetime_and_id_space_errors_keep_their_kind() {
        let once = GenusError::AlreadyAcquired {
            pid: Pid::from_raw(5),
        };
        let ids = GenusError::IdSpaceExhausted {
            next: i64::MAX as u64 + 1,
        };

        assert_eq!(once.kind(), GenusErrorKind::AlreadyOwnsGenus);
        assert_eq!(ids.kind(), GenusErrorKind::PoolExhausted);
        assert!(once.to_string().contains("during its lifetime"));
    }

    #[test]
    fn test_error_messages() {
        let err = GenusError::PoolExhausted {
            requested: 5,
            reserved: 88,
            total: 90,
        };
        assert_eq!(
            err.to_string(),
            "capacity pool exhausted: requested 5, reserved 88/90"
        );

        let err = GenusError::AlreadyOwnsGenus {
            pid: Pid::from_raw(4),
            genus: GenusId::from_raw(2),
        };
        assert!(err.to_string().contains("already belongs to genus 2"));
    }

    #[test]
    fn test_process_error_wraps_genus_error() {
        let err: ProcessError = GenusError::InvalidAmount {
            requested: -10,
            max: 90,
        }
        .into();
        assert!(matches!(err, ProcessError::Genus(_)));
        assert!(err.to_string().contains("-10"));
    }
}
