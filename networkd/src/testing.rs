/*
 * In-memory stand-ins for the cache, the backend and the recorder.
 */
use crate::backend::NetworkBackend;
use crate::errors::Error;
use crate::errors::Result;
use crate::informer::NetworkCache;
use crate::recorder::EventRecorder;
use crate::recorder::Severity;
use network_api as api;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::Notify;

pub fn network(namespace: &str, name: &str, rv: &str) -> api::Network {
    api::network::new(namespace, name, rv, api::NetworkSpec::new("10.0.0.0/24", "10.0.0.1"))
}

#[derive(Default)]
pub struct FakeCache {
    objects: Mutex<HashMap<String, Arc<api::Network>>>,
    failing: Mutex<HashSet<String>>,
    synced: AtomicBool,
    synced_notify: Notify,
}

impl FakeCache {

    pub fn synced() -> Arc<Self> {
	let cache = Arc::new(Self::default());
	cache.mark_synced();
	cache
    }

    pub fn insert(&self, network: api::Network) {
	let key = crate::key::key_for(&network).unwrap();
	self.objects.lock().unwrap().insert(key, Arc::new(network));
    }

    pub fn remove(&self, key: &str) {
	self.objects.lock().unwrap().remove(key);
    }

    /* lookups of `key` fail until heal() is called */
    pub fn break_lookups(&self, key: &str) {
	self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn heal(&self, key: &str) {
	self.failing.lock().unwrap().remove(key);
    }

    pub fn mark_synced(&self) {
	self.synced.store(true, Ordering::SeqCst);
	self.synced_notify.notify_waiters();
    }
}

#[async_trait]
impl NetworkCache for FakeCache {

    fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<Arc<api::Network>>> {
	let key = match namespace {
	    Some(ns) => format!("{}/{}", ns, name),
	    None => name.to_string(),
	};
	if self.failing.lock().unwrap().contains(&key) {
	    return Err(Error::Lookup(key));
	}
	Ok(self.objects.lock().unwrap().get(&key).cloned())
    }

    async fn wait_for_sync(&self) -> Result<()> {
	loop {
	    let notified = self.synced_notify.notified();
	    if self.synced.load(Ordering::SeqCst) {
		return Ok(());
	    }
	    notified.await;
	}
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Ensure(String, api::NetworkSpec),
    Teardown(String),
}

/*
 * Backend that records its calls, can be told to fail, and checks that
 * the same key is never worked on concurrently.
 */
#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    failures_left: Mutex<HashMap<String, usize>>,
    panicking: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    in_flight: Mutex<HashSet<String>>,
    overlaps: AtomicUsize,
}

impl FakeBackend {

    pub fn new() -> Arc<Self> {
	Arc::new(Self::default())
    }

    /* the next `times` calls for `key` fail */
    pub fn fail(&self, key: &str, times: usize) {
	self.failures_left.lock().unwrap().insert(key.to_string(), times);
    }

    /* every call for `key` panics */
    pub fn panic_on(&self, key: &str) {
	self.panicking.lock().unwrap().insert(key.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
	*self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<Call> {
	self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, key: &str) -> Vec<Call> {
	self.calls().into_iter().filter(|call| match call {
	    Call::Ensure(k, _) | Call::Teardown(k) => k == key,
	}).collect()
    }

    pub fn overlaps(&self) -> usize {
	self.overlaps.load(Ordering::SeqCst)
    }

    async fn call(&self, key: &str, call: Call) -> Result<()> {
	if !self.in_flight.lock().unwrap().insert(key.to_string()) {
	    self.overlaps.fetch_add(1, Ordering::SeqCst);
	}
	let delay = *self.delay.lock().unwrap();
	if !delay.is_zero() {
	    tokio::time::sleep(delay).await;
	}
	self.in_flight.lock().unwrap().remove(key);
	self.calls.lock().unwrap().push(call);

	if self.panicking.lock().unwrap().contains(key) {
	    panic!("injected panic for {}", key);
	}

	let mut failures = self.failures_left.lock().unwrap();
	match failures.get_mut(key) {
	    Some(left) if *left > 0 => {
		*left -= 1;
		Err(Error::Backend(format!("injected failure for {}", key)))
	    },
	    _ => Ok(()),
	}
    }
}

#[async_trait]
impl NetworkBackend for FakeBackend {

    async fn ensure(&self, key: &str, spec: &api::NetworkSpec) -> Result<()> {
	self.call(key, Call::Ensure(key.to_string(), spec.clone())).await
    }

    async fn teardown(&self, key: &str) -> Result<()> {
	self.call(key, Call::Teardown(key.to_string())).await
    }
}

#[derive(Default)]
pub struct FakeRecorder {
    events: Mutex<Vec<(String, Severity, String)>>,
}

impl FakeRecorder {

    pub fn new() -> Arc<Self> {
	Arc::new(Self::default())
    }

    /* (object name, severity, reason) of every recorded event */
    pub fn events(&self) -> Vec<(String, Severity, String)> {
	self.events.lock().unwrap().clone()
    }
}

impl EventRecorder for FakeRecorder {

    fn record(&self, reference: &ObjectReference, severity: Severity, reason: &str, _message: &str) {
	let name = reference.name.clone().unwrap_or_default();
	self.events.lock().unwrap().push((name, severity, reason.to_string()));
    }
}
