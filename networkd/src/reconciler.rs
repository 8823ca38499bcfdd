use crate::backend::NetworkBackend;
use crate::errors::Result;
use crate::informer::NetworkCache;
use crate::key;
use crate::recorder;
use crate::recorder::EventRecorder;
use crate::recorder::Severity;

use kube::Resource;
use std::sync::Arc;

/*
 * Reconciler drives the network backend towards what the Network object
 * behind a key declares, or tears the network down when the object is
 * gone. It always works from the current content of the cache, never from
 * a snapshot taken when the key was queued.
 *
 * The work queue guarantees a key is never synced by two workers at once,
 * so nothing here needs to care about concurrency.
 */
pub struct Reconciler {
    cache: Arc<dyn NetworkCache>,
    backend: Arc<dyn NetworkBackend>,
    recorder: Arc<dyn EventRecorder>,
}

impl Reconciler {

    pub fn new(cache: Arc<dyn NetworkCache>, backend: Arc<dyn NetworkBackend>, recorder: Arc<dyn EventRecorder>) -> Self {
	Self{
	    cache: cache,
	    backend: backend,
	    recorder: recorder,
	}
    }

    pub async fn sync(&self, key: &str) -> Result<()> {
	let (namespace, name) = key::split_key(key)?;

	let network = match self.cache.get(namespace.as_deref(), &name)? {
	    Some(network) => network,
	    None => {
		log::warn!("Network {} does not exist in local cache, will delete it from the backend ...", key);
		self.backend.teardown(key).await?;
		log::info!("Network {} deleted", key);
		return Ok(());
	    }
	};

	log::debug!("Trying to process network {}: {:?}", key, network.spec);
	let reference = network.object_ref(&());

	if let Err(err) = self.backend.ensure(key, &network.spec).await {
	    let message = format!("Failed to sync network: {}", err);
	    self.recorder.record(&reference, Severity::Warning, recorder::reasons::SYNC_FAILED, &message);
	    return Err(err);
	}

	self.recorder.record(&reference, Severity::Normal, recorder::reasons::SYNCED, recorder::MESSAGE_RESOURCE_SYNCED);
	Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::testing::Call;
    use crate::testing::FakeBackend;
    use crate::testing::FakeCache;
    use crate::testing::FakeRecorder;
    use crate::testing::network;
    use network_api as api;

    fn reconciler(cache: &Arc<FakeCache>, backend: &Arc<FakeBackend>, recorder: &Arc<FakeRecorder>) -> Reconciler {
	Reconciler::new(cache.clone(), backend.clone(), recorder.clone())
    }

    #[tokio::test]
    async fn present_object_is_ensured_and_reported() {
	let (cache, backend, recorder) = (FakeCache::synced(), FakeBackend::new(), FakeRecorder::new());
	cache.insert(network("ns", "foo", "1"));

	reconciler(&cache, &backend, &recorder).sync("ns/foo").await.unwrap();

	assert_eq!(backend.calls(), vec![
	    Call::Ensure("ns/foo".to_string(), api::NetworkSpec::new("10.0.0.0/24", "10.0.0.1")),
	]);
	assert_eq!(recorder.events(), vec![("foo".to_string(), Severity::Normal, "Synced".to_string())]);
    }

    #[tokio::test]
    async fn syncing_twice_converges_to_the_same_state() {
	let (cache, backend, recorder) = (FakeCache::synced(), FakeBackend::new(), FakeRecorder::new());
	let inmemory = Arc::new(crate::backend::InMemoryBackend::new());
	cache.insert(network("ns", "foo", "1"));

	let reconciler = Reconciler::new(cache.clone(), inmemory.clone(), recorder.clone());
	reconciler.sync("ns/foo").await.unwrap();
	let first = inmemory.get("ns/foo");
	reconciler.sync("ns/foo").await.unwrap();

	assert_eq!(inmemory.get("ns/foo"), first);
	assert_eq!(inmemory.len(), 1);
	assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn absent_object_is_torn_down_exactly_once() {
	let (cache, backend, recorder) = (FakeCache::synced(), FakeBackend::new(), FakeRecorder::new());

	reconciler(&cache, &backend, &recorder).sync("ns/foo").await.unwrap();

	assert_eq!(backend.calls(), vec![Call::Teardown("ns/foo".to_string())]);
	assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn malformed_key_never_reaches_the_backend() {
	let (cache, backend, recorder) = (FakeCache::synced(), FakeBackend::new(), FakeRecorder::new());

	let err = reconciler(&cache, &backend, &recorder).sync("a/b/c").await.unwrap_err();

	assert!(matches!(err, Error::InvalidKey(_)));
	assert!(!err.is_retryable());
	assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn cache_failure_is_retryable_and_touches_nothing() {
	let (cache, backend, recorder) = (FakeCache::synced(), FakeBackend::new(), FakeRecorder::new());
	cache.insert(network("ns", "foo", "1"));
	cache.break_lookups("ns/foo");

	let err = reconciler(&cache, &backend, &recorder).sync("ns/foo").await.unwrap_err();

	assert!(matches!(err, Error::Lookup(_)));
	assert!(err.is_retryable());
	assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn backend_failure_is_reported_and_returned() {
	let (cache, backend, recorder) = (FakeCache::synced(), FakeBackend::new(), FakeRecorder::new());
	cache.insert(network("ns", "foo", "1"));
	backend.fail("ns/foo", 1);

	let err = reconciler(&cache, &backend, &recorder).sync("ns/foo").await.unwrap_err();

	assert!(matches!(err, Error::Backend(_)));
	assert_eq!(recorder.events(), vec![("foo".to_string(), Severity::Warning, "SyncFailed".to_string())]);
    }
}
