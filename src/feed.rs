//! Live event lists.
//!
//! A subscription re-runs its status query whenever anything in the
//! `events` collection changes and hands the whole normalized list to the
//! callback. Events without a usable start time never appear.

use crate::events::{self, COLLECTION};
use crate::models::{Event, EventStatus};
use crate::store::{Store, StoreError};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Callback = Box<dyn FnMut(Vec<Event>) + Send>;

thread_local! {
    // Address of the subscription whose callback is running on this thread.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

struct Shared {
    // `None` once detached. The callback only runs while this lock is held.
    callback: Mutex<Option<Callback>>,
    closed: AtomicBool,
}

impl Shared {
    fn key(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }
}

struct DeliveringGuard(usize);

impl DeliveringGuard {
    fn enter(key: usize) -> Self {
        DELIVERING.with(|d| DeliveringGuard(d.replace(key)))
    }
}

impl Drop for DeliveringGuard {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(self.0));
    }
}

/// Handle for a live query. Detaches on `unsubscribe` or drop.
pub struct Subscription {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }

    fn detach(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.task.abort();
        // From inside our own callback the lock is already held on this
        // thread; the task drops the callback once it returns.
        if DELIVERING.with(Cell::get) == self.shared.key() {
            return;
        }
        if let Ok(mut callback) = self.shared.callback.lock() {
            callback.take();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

pub async fn upcoming_events(
    store: &Store,
    statuses: &[EventStatus],
) -> Result<Vec<Event>, StoreError> {
    let mut events: Vec<Event> = events::query_by_status(store, statuses)
        .await?
        .into_iter()
        .filter(|e| e.start.is_some())
        .collect();
    events.sort_by_key(|e| e.start);
    Ok(events)
}

/// Must be called from within a Tokio runtime. Once `unsubscribe` returns
/// the callback is not running and will not run again; the callback may
/// itself drop its own `Subscription`.
pub fn subscribe_upcoming_events<F>(store: &Store, statuses: &[EventStatus], callback: F) -> Subscription
where
    F: FnMut(Vec<Event>) + Send + 'static,
{
    let boxed: Callback = Box::new(callback);
    let shared = Arc::new(Shared {
        callback: Mutex::new(Some(boxed)),
        closed: AtomicBool::new(false),
    });
    // Subscribe before the first query so no change slips between the two.
    let mut changes = store.watch();
    let store = store.clone();
    let statuses = statuses.to_vec();
    let deliver_to = Arc::clone(&shared);

    let task = tokio::spawn(async move {
        loop {
            match upcoming_events(&store, &statuses).await {
                Ok(events) => {
                    let Ok(mut guard) = deliver_to.callback.lock() else {
                        return;
                    };
                    if deliver_to.closed.load(Ordering::SeqCst) {
                        guard.take();
                        return;
                    }
                    let Some(deliver) = guard.as_mut() else {
                        return;
                    };
                    {
                        let _delivering = DeliveringGuard::enter(deliver_to.key());
                        deliver(events);
                    }
                    if deliver_to.closed.load(Ordering::SeqCst) {
                        guard.take();
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "event feed query failed"),
            }

            loop {
                match changes.recv().await {
                    Ok(change) if change.collection == COLLECTION => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, "event feed lagged, refreshing");
                        break;
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        }
    });

    Subscription { shared, task }
}
