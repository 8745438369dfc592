//! The contract between this crate and whatever executes query text on a remote store.
//!
//! Executing is the only step that leaves the process. Errors from it are opaque here and are handed
//! back to the caller unchanged; nothing in this crate retries or cancels an execution.

use crate::lower::QueryText;
use crate::sql_value::SqlValue;

/// one row as returned by the remote store: positional values, in the store's column order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub items: Vec<SqlValue>,
}

impl RawRow {
    pub fn new(items: Vec<SqlValue>) -> RawRow {
        RawRow { items }
    }
}

#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct RemoteError(#[from] anyhow::Error);

impl RemoteError {
    pub fn new<E>(e: E) -> RemoteError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RemoteError(anyhow::Error::new(e))
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.0
    }
}

/// yields raw rows in the order the remote store produced them.
pub type RowSource = Box<dyn Iterator<Item = Result<RawRow, RemoteError>> + Send>;

pub trait ExecutionSurface {
    fn execute(&self, query: &QueryText) -> Result<RowSource, RemoteError>;
}

#[test]
fn test_remote_error_is_passed_through() {
    let e = RemoteError::from(anyhow::anyhow!("connection reset"));
    assert_eq!(e.to_string(), "connection reset");
    let io = RemoteError::new(std::io::Error::new(std::io::ErrorKind::Other, "broken pipe"));
    assert!(io.into_inner().downcast_ref::<std::io::Error>().is_some());
}
