use crate::errors::Error;
use crate::errors::Result;
use crate::key;
use network_api as api;

use async_trait::async_trait;
use futures::StreamExt;
use kube::Api as KubeApi;
use kube::runtime::WatchStreamExt;
use kube::runtime::reflector as kube_reflector;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::reflector::Store;
use kube::runtime::reflector::store::Writer;
use kube::runtime::watcher as kube_watcher;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/*
 * What's left of an object once it's gone from the cluster.
 *
 * FinalStateUnknown is used when the deletion itself was never observed
 * (the watch was behind and the object simply vanished from a relist): all
 * we have is its key and whatever copy the cache still had.
 */
#[derive(Debug, Clone)]
pub enum DeletedObject<K> {
    Object(Arc<K>),
    FinalStateUnknown {
	key: String,
	last_known: Option<Arc<K>>,
    },
}

/*
 * Subscription to the changes observed by an informer.
 */
pub trait EventHandler<K>: Send + Sync {

    fn on_add(&self, obj: &K);

    fn on_update(&self, old: &K, new: &K);

    fn on_delete(&self, obj: &DeletedObject<K>);
}

/*
 * The read side of the informer, as seen by the reconciler.
 */
#[async_trait]
pub trait NetworkCache: Send + Sync {

    /*
     * Point lookup. Ok(None) means the object doesn't exist (anymore),
     * Err(Error::Lookup) means the cache couldn't tell right now.
     */
    fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<Arc<api::Network>>>;

    /*
     * Resolves once the initial listing has been observed.
     */
    async fn wait_for_sync(&self) -> Result<()>;
}

/*
 * NetworkCache backed by a kube reflector store.
 */
#[derive(Clone)]
pub struct StoreCache {
    store: Store<api::Network>,
}

#[async_trait]
impl NetworkCache for StoreCache {

    fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<Arc<api::Network>>> {
	let mut obj_ref = ObjectRef::new(name);
	if let Some(ns) = namespace {
	    obj_ref = obj_ref.within(ns);
	}

	Ok(self.store.get(&obj_ref))
    }

    async fn wait_for_sync(&self) -> Result<()> {
	self.store.wait_until_ready().await.map_err(|_| Error::CacheSync)
    }
}

/*
 * NetworkInformer keeps a local replica of every Network object in the
 * cluster and tells an EventHandler about every change it observes.
 */
pub struct NetworkInformer {
    api: KubeApi<api::Network>,
    reader: Store<api::Network>,
    writer: Writer<api::Network>,
    resync_period: Duration,

    /* keys present before the current relist started */
    relist_seen: HashSet<String>,

    /* objects of the current relist, with their previous copy */
    relist_pending: Vec<(Option<Arc<api::Network>>, api::Network)>,
}

fn notify_applied<H: EventHandler<api::Network>>(handler: &H, old: Option<Arc<api::Network>>, new: &api::Network) {
    match old {
	Some(old) => handler.on_update(&old, new),
	None => handler.on_add(new),
    }
}

impl NetworkInformer {

    pub fn new(api: KubeApi<api::Network>, resync_period: Duration) -> Self {
	let (reader, writer) = kube_reflector::store();

	Self{
	    api: api,
	    reader: reader,
	    writer: writer,
	    resync_period: resync_period,
	    relist_seen: HashSet::new(),
	    relist_pending: Vec::new(),
	}
    }

    pub fn cache(&self) -> StoreCache {
	StoreCache{
	    store: self.reader.clone(),
	}
    }

    /*
     * Watches Network objects until the returned future is dropped. Watch
     * errors are logged and retried with kube's default backoff.
     */
    pub async fn run<H: EventHandler<api::Network>>(mut self, handler: H) {
	let mut events = kube_watcher(self.api.clone(), kube_watcher::Config::default())
	    .default_backoff()
	    .boxed();

	let mut resync = tokio::time::interval(self.resync_period);
	// the first tick completes immediately, there is nothing to resync yet
	resync.tick().await;

	loop {
	    tokio::select! {
		event = events.next() => match event {
		    Some(Ok(event)) => self.dispatch(event, &handler),
		    Some(Err(err)) => {
			log::warn!("Network watch failed, will retry: {}", err);
		    },
		    None => {
			log::warn!("Network watch stream ended");
			return;
		    },
		},
		_ = resync.tick() => self.resync(&handler),
	    }
	}
    }

    fn lookup(&self, obj: &api::Network) -> Option<Arc<api::Network>> {
	self.reader.get(&ObjectRef::from_obj(obj))
    }

    /*
     * Applies a watch event to the store and notifies the handler. The
     * store is updated first, so a worker woken up by the notification
     * reads the new state.
     */
    fn dispatch<H: EventHandler<api::Network>>(&mut self, event: kube_watcher::Event<api::Network>, handler: &H) {
	match &event {
	    kube_watcher::Event::Apply(obj) => {
		let old = self.lookup(obj);
		self.writer.apply_watcher_event(&event);
		notify_applied(handler, old, obj);
	    },
	    kube_watcher::Event::InitApply(obj) => {
		// the store only switches to the new listing on InitDone,
		// notifications wait until then
		if let Ok(key) = key::key_for(obj) {
		    self.relist_seen.remove(&key);
		}
		let old = self.lookup(obj);
		self.relist_pending.push((old, obj.clone()));
		self.writer.apply_watcher_event(&event);
	    },
	    kube_watcher::Event::Delete(obj) => {
		self.writer.apply_watcher_event(&event);
		handler.on_delete(&DeletedObject::Object(Arc::new(obj.clone())));
	    },
	    kube_watcher::Event::Init => {
		log::debug!("Network relist started");
		self.relist_seen = self.known_objects().into_keys().collect();
		self.relist_pending.clear();
		self.writer.apply_watcher_event(&event);
	    },
	    kube_watcher::Event::InitDone => {
		let mut known = self.known_objects();
		let vanished: Vec<String> = self.relist_seen.drain().collect();
		let listed: Vec<_> = self.relist_pending.drain(..).collect();

		self.writer.apply_watcher_event(&event);
		log::debug!("Network relist done, {} object(s) listed, {} vanished meanwhile", listed.len(), vanished.len());

		for (old, obj) in listed {
		    notify_applied(handler, old, &obj);
		}
		for key in vanished {
		    let last_known = known.remove(&key);
		    handler.on_delete(&DeletedObject::FinalStateUnknown{
			key: key,
			last_known: last_known,
		    });
		}
	    },
	}
    }

    fn known_objects(&self) -> HashMap<String, Arc<api::Network>> {
	self.reader.state()
	    .into_iter()
	    .filter_map(|obj| key::key_for::<api::Network>(&obj).ok().map(|key| (key, obj)))
	    .collect()
    }

    /*
     * Republishes every cached object as an unchanged update, giving the
     * handler a chance to catch anything it may have missed.
     */
    fn resync<H: EventHandler<api::Network>>(&self, handler: &H) {
	let objects = self.reader.state();
	log::debug!("Resyncing {} Network object(s)", objects.len());

	for obj in objects {
	    handler.on_update(&obj, &obj);
	}
    }
}
