use crate::ratelimit::RateLimiter;

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/*
 * Queue bookkeeping, all of it protected by a single lock:
 *
 *  - queue: keys ready to be handed out, in order.
 *  - dirty: keys that need processing. A key is queued only if it's dirty
 *    and nobody is processing it.
 *  - processing: keys currently owned by a worker. A key added while it is
 *    being processed only becomes dirty; done() puts it back in the queue.
 *  - waiting: keys scheduled by add_after(), with the earliest time they
 *    are due.
 *  - failures: failed attempts per key since the last forget(). Unlike the
 *    limiter's requeue count, enqueues that weren't failures don't count.
 */
#[derive(Default)]
struct State {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    waiting: HashMap<String, Instant>,
    failures: HashMap<String, u32>,
    shutting_down: bool,
}

struct Shared {
    name: String,
    state: Mutex<State>,
    ready: Notify,
    limiter: Box<dyn RateLimiter>,
}

/*
 * WorkQueue is a deduplicating, rate limited queue of object keys. It
 * guarantees a key is never handed to two workers at the same time.
 * Clones share the same queue.
 */
#[derive(Clone)]
pub struct WorkQueue {
    shared: Arc<Shared>,
}

impl WorkQueue {

    pub fn new(name: &str, limiter: Box<dyn RateLimiter>) -> Self {
	Self{
	    shared: Arc::new(Shared{
		name: name.to_string(),
		state: Mutex::new(State::default()),
		ready: Notify::new(),
		limiter: limiter,
	    }),
	}
    }

    fn state(&self) -> MutexGuard<'_, State> {
	self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
	&self.shared.name
    }

    /*
     * Marks `key` as needing processing. No-op when the key is already
     * queued, or when the queue is shutting down.
     */
    pub fn add(&self, key: &str) {
	{
	    let mut state = self.state();
	    if state.shutting_down || state.dirty.contains(key) {
		return;
	    }

	    state.dirty.insert(key.to_string());
	    if state.processing.contains(key) {
		// done() requeues it
		return;
	    }
	    state.queue.push_back(key.to_string());
	}
	self.shared.ready.notify_one();
    }

    /*
     * Adds `key` once `delay` has passed. If the key is already waiting
     * the earliest deadline wins.
     */
    pub fn add_after(&self, key: &str, delay: Duration) {
	if delay.is_zero() {
	    self.add(key);
	    return;
	}

	let ready_at = Instant::now() + delay;
	{
	    let mut state = self.state();
	    if state.shutting_down {
		return;
	    }
	    if matches!(state.waiting.get(key), Some(at) if *at <= ready_at) {
		return;
	    }
	    state.waiting.insert(key.to_string(), ready_at);
	}

	let queue = self.clone();
	let key = key.to_string();
	tokio::spawn(async move {
	    tokio::time::sleep_until(ready_at).await;

	    let due = {
		let mut state = queue.state();
		// rescheduled earlier: that timer owns the key now
		let mine = matches!(state.waiting.get(&key), Some(at) if *at == ready_at);
		if mine {
		    state.waiting.remove(&key);
		}
		mine
	    };
	    if due {
		queue.add(&key);
	    }
	});
    }

    /*
     * Adds `key` after the delay the rate limiter computes from its
     * failure history.
     */
    pub fn add_rate_limited(&self, key: &str) {
	let delay = self.shared.limiter.when(key);
	log::trace!("{}: requeueing '{}' in {:?}", self.shared.name, key, delay);
	self.add_after(key, delay);
    }

    /*
     * Waits for the next key and marks it as processing. Returns None once
     * the queue is shut down and there is nothing left to hand out.
     */
    pub async fn get(&self) -> Option<String> {
	loop {
	    // register interest before looking, so a concurrent add() or
	    // shut_down() can't slip in between the check and the wait
	    let notified = self.shared.ready.notified();
	    {
		let mut state = self.state();
		if let Some(key) = state.queue.pop_front() {
		    state.dirty.remove(&key);
		    state.processing.insert(key.clone());
		    let more = !state.queue.is_empty();
		    drop(state);

		    if more {
			self.shared.ready.notify_one();
		    }
		    return Some(key);
		}
		if state.shutting_down {
		    return None;
		}
	    }
	    notified.await;
	}
    }

    /*
     * Marks `key` as no longer processing. If it was added in the
     * meantime it's queued again right away.
     */
    pub fn done(&self, key: &str) {
	let requeued = {
	    let mut state = self.state();
	    state.processing.remove(key);
	    if state.dirty.contains(key) {
		state.queue.push_back(key.to_string());
		true
	    } else {
		false
	    }
	};

	if requeued {
	    self.shared.ready.notify_one();
	}
    }

    /* resets the failure history of `key` */
    pub fn forget(&self, key: &str) {
	self.shared.limiter.forget(key);
	self.state().failures.remove(key);
    }

    /*
     * Counts one more failed attempt for `key`, returns how many it had
     * since the last forget().
     */
    pub fn record_failure(&self, key: &str) -> u32 {
	let mut state = self.state();
	let count = state.failures.entry(key.to_string()).or_insert(0);
	*count = count.saturating_add(1);
	*count
    }

    pub fn num_requeues(&self, key: &str) -> u32 {
	self.shared.limiter.num_requeues(key)
    }

    /* number of keys ready to be handed out */
    pub fn len(&self) -> usize {
	self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
	self.len() == 0
    }

    /*
     * Stops accepting new keys and wakes up every blocked get(). Keys
     * already queued are still handed out until the queue is empty.
     */
    pub fn shut_down(&self) {
	{
	    let mut state = self.state();
	    state.shutting_down = true;
	    state.waiting.clear();
	}
	self.shared.ready.notify_waiters();
    }

    /*
     * Like shut_down(), but keys still queued are discarded: get() returns
     * None right away and done() no longer requeues anything. Keys being
     * processed are left alone.
     */
    pub fn shut_down_now(&self) {
	{
	    let mut state = self.state();
	    state.shutting_down = true;
	    state.waiting.clear();
	    state.queue.clear();
	    state.dirty.clear();
	}
	self.shared.ready.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
	self.state().shutting_down
    }
}
