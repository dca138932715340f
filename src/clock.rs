//! Source of "now" for aggregation windows, model creation dates and the
//! prediction target month. Local wall-clock time, matching how measurement
//! timestamps are stored.

use chrono::{Local, NaiveDateTime};
use std::sync::Arc;

#[derive(Clone)]
pub struct Clock(Arc<dyn Fn() -> NaiveDateTime + Send + Sync>);

impl Clock {
    pub fn system() -> Self {
        Clock(Arc::new(|| Local::now().naive_local()))
    }

    /// A clock frozen at `at`.
    pub fn fixed(at: NaiveDateTime) -> Self {
        Clock(Arc::new(move || at))
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.0)()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::system()
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Clock").field(&self.now()).finish()
    }
}
