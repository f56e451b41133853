//! Record of the requests a server answered.

use parking_lot::Mutex;

/// One answered request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedRequest {
    /// Method name, e.g. `"PUT"`.
    pub method: String,
    /// Unencoded path, e.g. `"/db/doc"`.
    pub path: String,
    /// Response status.
    pub status: u16,
}

/// Thread-safe request log.
///
/// Tests use it to assert that an operation did or did not reach the server.
#[derive(Debug, Default)]
pub struct RequestLog {
    entries: Mutex<Vec<LoggedRequest>>,
}

impl RequestLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, method: &str, path: String, status: u16) {
        self.entries.lock().push(LoggedRequest {
            method: method.to_string(),
            path,
            status,
        });
    }

    /// Number of requests answered so far.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if no request was answered yet.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of requests with the given method and path.
    pub fn count(&self, method: &str, path: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.method == method && e.path == path)
            .count()
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<LoggedRequest> {
        self.entries.lock().clone()
    }

    /// The most recent entry.
    pub fn last(&self) -> Option<LoggedRequest> {
        self.entries.lock().last().cloned()
    }

    /// Forgets all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
