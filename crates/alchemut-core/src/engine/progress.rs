use tracing::Dispatch;

#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

/// Observability handed to one pipeline invocation.
///
/// Progress events go to the reporter. Tracing events emitted while the pipeline
/// runs go to `dispatch` when one is given, otherwise to the caller's current
/// default subscriber.
#[derive(Default)]
pub struct PipelineObserver<'a> {
    reporter: ProgressReporter<'a>,
    dispatch: Option<Dispatch>,
}

impl<'a> PipelineObserver<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reporter(mut self, reporter: ProgressReporter<'a>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn reporter(&self) -> &ProgressReporter<'a> {
        &self.reporter
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        self.reporter.report(event);
    }

    /// Runs `f` with this observer's dispatch as the default subscriber.
    pub fn scoped<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn reporter_forwards_events_to_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = ProgressReporter::with_callback(Box::new(move |event| {
            if let Progress::PhaseStart { name } = event {
                sink.lock().unwrap().push(name);
            }
        }));
        reporter.report(Progress::PhaseStart { name: "Mapping" });
        reporter.report(Progress::PhaseFinish);
        assert_eq!(*seen.lock().unwrap(), vec!["Mapping"]);
    }

    #[test]
    fn scoped_runs_closure_without_dispatch() {
        let observer = PipelineObserver::new();
        assert_eq!(observer.scoped(|| 41 + 1), 42);
    }

    #[test]
    fn scoped_installs_dispatch_only_for_the_closure() {
        let observer = PipelineObserver::new().with_dispatch(Dispatch::new(tracing_subscriber::registry()));
        let inside = observer.scoped(|| tracing::dispatcher::get_default(|d| d.is::<tracing_subscriber::Registry>()));
        assert!(inside);
        let outside = tracing::dispatcher::get_default(|d| d.is::<tracing_subscriber::Registry>());
        assert!(!outside);
    }
}
