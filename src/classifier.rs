//! Failure classification for data-store errors.
//!
//! One pure function decides whether a failure is a connectivity outage
//! and/or transient. The retry executor and the availability tracker both
//! consult this module and nothing else, so their policies cannot drift
//! apart: a failure retried as "transient connectivity" here is the same
//! failure that flips the tracker into degraded mode.

use crate::error::{StoreError, StoreErrorKind};

/// SQLSTATE-style codes that indicate the store itself is unreachable or
/// refusing connections.
const CONNECTIVITY_CODES: &[&str] = &[
    "08000", // connection_exception
    "08001", // sqlclient_unable_to_establish_sqlconnection
    "08003", // connection_does_not_exist
    "08004", // sqlserver_rejected_establishment_of_sqlconnection
    "08006", // connection_failure
    "53300", // too_many_connections
    "57P01", // admin_shutdown
    "57P02", // crash_shutdown
    "57P03", // cannot_connect_now
];

/// Codes worth retrying that are not connectivity outages: conflicts the
/// store resolves on its own once the competing work settles.
const CONTENTION_CODES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
    "57014", // query_canceled (statement timeout)
];

const CONNECTIVITY_MESSAGE_INDICATORS: &[&str] = &["could not connect", "connection refused"];

const TRANSIENT_MESSAGE_INDICATORS: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection closed",
    "connection terminated",
    "database is locked",
    "could not serialize access",
    "deadlock detected",
    "restart transaction",
];

/// Verdict for one failure. `is_connectivity` implies `is_transient`;
/// the converse does not hold (a deadlock is transient but the store is
/// perfectly reachable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_connectivity: bool,
    pub is_transient: bool,
}

impl Classification {
    /// Neither transient nor a connectivity outage: surface immediately.
    pub fn is_fatal(&self) -> bool {
        !self.is_transient
    }
}

/// Classify a data-store failure.
///
/// Precedence: error kind first (initialization and protocol breakage are
/// always connectivity outages), then the fixed code tables, then message
/// substring heuristics for drivers that only surface text.
pub fn classify(error: &StoreError) -> Classification {
    let is_connectivity = is_connectivity_failure(error);
    Classification {
        is_connectivity,
        is_transient: is_connectivity || is_contention_failure(error),
    }
}

fn is_connectivity_failure(error: &StoreError) -> bool {
    match error.kind() {
        StoreErrorKind::Initialization | StoreErrorKind::Protocol => return true,
        StoreErrorKind::Request | StoreErrorKind::Other => {}
    }
    if let Some(code) = error.code() {
        if CONNECTIVITY_CODES.contains(&code) {
            return true;
        }
    }
    let message = error.message().to_lowercase();
    CONNECTIVITY_MESSAGE_INDICATORS
        .iter()
        .any(|indicator| message.contains(indicator))
}

fn is_contention_failure(error: &StoreError) -> bool {
    if let Some(code) = error.code() {
        if CONTENTION_CODES.contains(&code) {
            return true;
        }
    }
    let message = error.message().to_lowercase();
    if message.is_empty() {
        return false;
    }
    TRANSIENT_MESSAGE_INDICATORS
        .iter()
        .any(|indicator| message.contains(indicator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_initialization_failure_is_connectivity() {
        let c = classify(&StoreError::initialization("pool exhausted during startup"));
        assert!(c.is_connectivity);
        assert!(c.is_transient);
    }

    #[test]
    fn test_connectivity_code() {
        let c = classify(&StoreError::request("08006", "server closed the connection"));
        assert!(c.is_connectivity);
        assert!(c.is_transient);
    }

    #[test]
    fn test_deadlock_is_transient_but_not_connectivity() {
        let c = classify(&StoreError::request("40P01", "deadlock detected"));
        assert!(!c.is_connectivity);
        assert!(c.is_transient);
        assert!(!c.is_fatal());
    }

    #[test]
    fn test_serialization_conflict_is_transient() {
        let c = classify(&StoreError::request(
            "40001",
            "could not serialize access due to concurrent update",
        ));
        assert!(!c.is_connectivity);
        assert!(c.is_transient);
    }

    #[test]
    fn test_message_heuristics() {
        let c = classify(&StoreError::other("statement timed out after 5000ms"));
        assert!(c.is_transient);

        let c = classify(&StoreError::other("database is locked"));
        assert!(c.is_transient);
        assert!(!c.is_connectivity);

        let c = classify(&StoreError::other("connection refused (os error 111)"));
        assert!(c.is_connectivity);
    }

    #[test]
    fn test_constraint_violation_is_fatal() {
        let c = classify(&StoreError::request("23505", "duplicate key value"));
        assert!(!c.is_connectivity);
        assert!(!c.is_transient);
        assert!(c.is_fatal());
    }

    #[test]
    fn test_connectivity_always_implies_transient() {
        for code in super::CONNECTIVITY_CODES {
            let c = classify(&StoreError::request(*code, "failure"));
            assert!(c.is_transient, "code {} must be transient", code);
        }
    }
}
