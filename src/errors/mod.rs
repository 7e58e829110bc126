use crate::concurrency::transaction::TxnId;

/// Reasons a transaction gets aborted by the lock manager.
/// The wounded/violating transaction is moved to the ABORTED state
/// before any of these surfaces to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    LockOnShrinking,
    UnlockOnShrinking,
    LockSharedOnReadUncommitted,
    UpgradeConflict,
    Deadlock,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::LockOnShrinking => write!(f, "lock requested in the shrinking phase"),
            AbortReason::UnlockOnShrinking => write!(f, "unlock outside the shrinking phase"),
            AbortReason::LockSharedOnReadUncommitted => {
                write!(f, "shared lock requested under READ_UNCOMMITTED")
            }
            AbortReason::UpgradeConflict => write!(f, "another transaction is already upgrading"),
            AbortReason::Deadlock => write!(f, "wounded by an older transaction"),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Error {
    Internal(String),
    TableExists(String),
    TableNotFound(String),
    TupleExists,
    TupleNotFound,
    TupleTooBig(usize, usize),
    TransactionAborted(TxnId, AbortReason),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Internal(context) => write!(f, "Internal Error: {context}."),
            Error::TableExists(table) => write!(f, "Table {table} already exists."),
            Error::TableNotFound(table) => write!(f, "Table {table} does not exist."),
            Error::TupleExists => write!(f, "Tuple already exists"),
            Error::TupleNotFound => write!(f, "Tuple does not exist"),
            Error::TupleTooBig(max, actual) => {
                write!(f, "Tuple of size {actual} exceeds the limit of {max} bytes.")
            }
            Error::TransactionAborted(txn_id, reason) => {
                write!(f, "Transaction {txn_id} aborted: {reason}.")
            }
        }
    }
}
