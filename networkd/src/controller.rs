use crate::errors::Error;
use crate::errors::Result;
use crate::informer::NetworkCache;
use crate::queue::WorkQueue;
use crate::reconciler::Reconciler;
use crate::translator::EventTranslator;

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/* how long a worker pauses after a reconciliation panicked */
const PANIC_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
pub struct ControllerSettings {

    /*
     * Give up on a key once that many retries failed too, panics
     * included. None retries forever.
     */
    pub max_retries: Option<u32>,

    /*
     * On shutdown, keep working until the queue is empty instead of only
     * finishing the keys already being processed.
     */
    pub drain_on_shutdown: bool,
}

/*
 * Controller owns the work queue and the worker pool. Workers only
 * coordinate through the queue: it never hands the same key to two of
 * them.
 */
pub struct Controller {
    queue: WorkQueue,
    cache: Arc<dyn NetworkCache>,
    reconciler: Arc<Reconciler>,
    settings: ControllerSettings,
}

struct Worker {
    id: usize,
    queue: WorkQueue,
    reconciler: Arc<Reconciler>,
    settings: ControllerSettings,
}

impl Worker {

    async fn run(self) {
	log::debug!("worker {} started", self.id);
	while self.process_next_item().await {}
	log::debug!("worker {} stopped", self.id);
    }

    /*
     * Processes one key, returns false once the queue is shut down.
     */
    async fn process_next_item(&self) -> bool {
	let key = match self.queue.get().await {
	    Some(key) => key,
	    None => return false,
	};

	let result = AssertUnwindSafe(self.reconciler.sync(&key)).catch_unwind().await;
	let panicked = result.is_err();
	if panicked {
	    log::error!("worker {} panicked while syncing '{}'", self.id, key);
	}

	self.handle_result(&key, result.unwrap_or(Err(Error::Panicked)));
	self.queue.done(&key);
	if panicked {
	    tokio::time::sleep(PANIC_BACKOFF).await;
	}
	true
    }

    fn handle_result(&self, key: &str, result: Result<()>) {
	let err = match result {
	    Ok(()) => {
		self.queue.forget(key);
		log::info!("Successfully synced '{}'", key);
		return;
	    },
	    Err(err) => err,
	};

	if !err.is_retryable() {
	    self.queue.forget(key);
	    log::error!("Dropping '{}': {}", key, err);
	    return;
	}

	let failures = self.queue.record_failure(key);
	if let Some(max) = self.settings.max_retries {
	    if failures > max {
		self.queue.forget(key);
		log::error!("Dropping '{}' after {} retries: {}", key, max, err);
		return;
	    }
	}

	log::error!("error syncing '{}': {}, requeuing", key, err);
	self.queue.add_rate_limited(key);
    }
}

impl Controller {

    pub fn new(queue: WorkQueue, cache: Arc<dyn NetworkCache>, reconciler: Reconciler, settings: ControllerSettings) -> Self {
	Self{
	    queue: queue,
	    cache: cache,
	    reconciler: Arc::new(reconciler),
	    settings: settings,
	}
    }

    /*
     * The informer subscription feeding this controller's queue.
     */
    pub fn translator(&self) -> EventTranslator {
	EventTranslator::new(self.queue.clone())
    }

    pub fn queue(&self) -> &WorkQueue {
	&self.queue
    }

    /*
     * Waits for the cache to sync, then runs `workers` workers until
     * `stop` completes. Keys being processed when that happens are
     * finished before returning.
     */
    pub async fn run<F: Future<Output = ()>>(&self, workers: usize, stop: F) -> Result<()> {
	let mut stop = std::pin::pin!(stop);

	log::info!("Starting {} control loop", self.queue.name());
	log::info!("Waiting for informer caches to sync");
	tokio::select! {
	    synced = self.cache.wait_for_sync() => {
		if let Err(err) = synced {
		    self.queue.shut_down_now();
		    return Err(err);
		}
	    },
	    _ = &mut stop => {
		self.queue.shut_down_now();
		return Err(Error::CacheSync);
	    },
	}

	log::info!("Starting {} workers", workers);
	let handles: Vec<_> = (0..workers).map(|id| {
	    let worker = Worker{
		id: id,
		queue: self.queue.clone(),
		reconciler: self.reconciler.clone(),
		settings: self.settings.clone(),
	    };
	    tokio::spawn(worker.run())
	}).collect();
	log::info!("Started workers");

	stop.await;
	log::info!("Shutting down workers");
	if self.settings.drain_on_shutdown {
	    self.queue.shut_down();
	} else {
	    self.queue.shut_down_now();
	}

	for handle in handles {
	    if let Err(err) = handle.await {
		log::error!("worker terminated abnormally: {}", err);
	    }
	}
	log::info!("Workers stopped");
	Ok(())
    }
}
