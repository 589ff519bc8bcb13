//! Per-session scroll state.

/// State owned by one scroll session and passed by `&mut` into every page
/// request of that session.
///
/// Drivers keep their working data here (running totals, content cached by
/// backends without native paging) and call [`ScrollContext::stop`] once the
/// backend is drained. Stopping is one-way.
#[derive(Debug, Default)]
pub struct ScrollContext {
    stopped: bool,
    fetched: u64,
    cached: Option<Vec<serde_json::Value>>,
}

impl ScrollContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Rows requested so far in this session.
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    /// Count-based stop rule: add this page's limit to the running total and
    /// stop once it reaches the backend's reported total.
    pub fn advance(&mut self, page_limit: u64, total: u64) {
        self.fetched = self.fetched.saturating_add(page_limit);
        if self.fetched >= total {
            self.stop();
        }
    }

    /// Full content cached by the first page of the session.
    pub fn cached_rows(&self) -> Option<&[serde_json::Value]> {
        self.cached.as_deref()
    }

    pub fn cache_rows(&mut self, rows: Vec<serde_json::Value>) {
        self.cached = Some(rows);
    }
}
