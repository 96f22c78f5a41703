use tokio::runtime::Handle;

/// The runtimes auction work is scheduled on. Bidding pipelines run on
/// `background`, short fire-and-forget work such as reporting on
/// `lightweight`.
#[derive(Debug, Clone)]
pub struct Executors {
    pub lightweight: Handle,
    pub background: Handle,
}

impl Executors {
    /// Schedules everything on the runtime of the caller.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn current() -> Self {
        let handle = Handle::current();
        Self {
            lightweight: handle.clone(),
            background: handle,
        }
    }
}
