//! Background-refreshed views: a parameter change queues a fetch for the view's
//! worker thread while readers keep seeing the last good data.
//!
//! Each view owns one worker. Requests that pile up while a fetch is in flight
//! collapse to the newest one, so a burst of parameter changes costs at most one
//! extra fetch.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, info, warn};

use crate::view::{RequestTicket, ViewSnapshot, ViewState};

type Loader<Q, T> = dyn Fn(&Q) -> Result<T, String> + Send + Sync;

struct LiveInner<Q, T> {
    query: Option<Q>,
    state: ViewState<T>,
}

struct FetchJob<Q> {
    query: Q,
    ticket: RequestTicket,
}

/// Cloning shares the state and the worker; the worker exits once every clone is dropped.
pub struct LiveView<Q, T> {
    name: &'static str,
    inner: Arc<Mutex<LiveInner<Q, T>>>,
    jobs: Option<Sender<FetchJob<Q>>>,
}

impl<Q, T> Clone for LiveView<Q, T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: Arc::clone(&self.inner),
            jobs: self.jobs.clone(),
        }
    }
}

impl<Q, T> LiveView<Q, T>
where
    Q: Clone + PartialEq + Send + 'static,
    T: Send + Sync + 'static,
{
    pub fn new(
        name: &'static str,
        loader: impl Fn(&Q) -> Result<T, String> + Send + Sync + 'static,
    ) -> Self {
        let inner = Arc::new(Mutex::new(LiveInner {
            query: None,
            state: ViewState::default(),
        }));
        let loader: Arc<Loader<Q, T>> = Arc::new(loader);
        let (tx, rx) = mpsc::channel();

        let worker_inner = Arc::clone(&inner);
        let spawned = thread::Builder::new()
            .name(format!("{name}-fetch"))
            .spawn(move || run_worker(name, worker_inner, loader, rx));

        let jobs = match spawned {
            Ok(_) => Some(tx),
            Err(err) => {
                warn!(
                    component = "live",
                    event = "live.worker.spawn_failed",
                    view = name,
                    error = %err
                );
                None
            }
        };

        Self { name, inner, jobs }
    }

    /// Queues a fetch when `query` differs from the last requested one.
    /// Repeating the same query is a no-op, including after an error.
    pub fn request(&self, query: Q) -> bool {
        let ticket = {
            let mut inner = self.lock();
            if inner.query.as_ref() == Some(&query) {
                return false;
            }
            inner.query = Some(query.clone());
            inner.state.begin()
        };

        self.enqueue(FetchJob { query, ticket });
        true
    }

    /// Re-runs the current query unconditionally.
    pub fn refresh(&self) -> bool {
        let (query, ticket) = {
            let mut inner = self.lock();
            let Some(query) = inner.query.clone() else {
                return false;
            };
            let ticket = inner.state.begin();
            (query, ticket)
        };

        self.enqueue(FetchJob { query, ticket });
        true
    }

    pub fn current_query(&self) -> Option<Q> {
        self.lock().query.clone()
    }

    pub fn snapshot(&self) -> ViewSnapshot<Arc<T>> {
        self.lock().state.snapshot()
    }

    fn enqueue(&self, job: FetchJob<Q>) {
        let ticket = job.ticket;
        debug!(
            component = "live",
            event = "live.fetch.queued",
            view = self.name,
            ticket = ticket.id()
        );

        let sent = match &self.jobs {
            Some(jobs) => jobs.send(job).is_ok(),
            None => false,
        };

        if !sent {
            let message = format!("{} fetch worker is not running", self.name);
            warn!(
                component = "live",
                event = "live.fetch.worker_unavailable",
                view = self.name,
                ticket = ticket.id()
            );
            self.lock().state.complete(ticket, Err(message));
        }
    }

    fn lock(&self) -> MutexGuard<'_, LiveInner<Q, T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_worker<Q, T>(
    name: &'static str,
    inner: Arc<Mutex<LiveInner<Q, T>>>,
    loader: Arc<Loader<Q, T>>,
    jobs: Receiver<FetchJob<Q>>,
) {
    while let Ok(mut job) = jobs.recv() {
        let mut superseded = 0usize;
        while let Ok(newer) = jobs.try_recv() {
            job = newer;
            superseded += 1;
        }
        if superseded > 0 {
            debug!(
                component = "live",
                event = "live.fetch.coalesced",
                view = name,
                superseded,
                ticket = job.ticket.id()
            );
        }

        debug!(
            component = "live",
            event = "live.fetch.start",
            view = name,
            ticket = job.ticket.id()
        );
        let result = loader(&job.query);
        let failed = result.is_err();
        let applied = inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
            .complete(job.ticket, result);
        record_completion(name, job.ticket, applied, failed);
    }
}

fn record_completion(name: &'static str, ticket: RequestTicket, applied: bool, failed: bool) {
    if !applied {
        debug!(
            component = "live",
            event = "live.fetch.stale_dropped",
            view = name,
            ticket = ticket.id()
        );
    } else if failed {
        warn!(
            component = "live",
            event = "live.fetch.error",
            view = name,
            ticket = ticket.id()
        );
    } else {
        info!(
            component = "live",
            event = "live.fetch.applied",
            view = name,
            ticket = ticket.id()
        );
    }
}
