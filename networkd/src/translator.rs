use crate::informer::DeletedObject;
use crate::informer::EventHandler;
use crate::key;
use crate::queue::WorkQueue;

use kube::Resource;

/*
 * EventTranslator turns informer notifications into queue keys.
 */
pub struct EventTranslator {
    queue: WorkQueue,
}

impl EventTranslator {

    pub fn new(queue: WorkQueue) -> Self {
	Self{
	    queue: queue,
	}
    }

    fn enqueue<K: Resource>(&self, obj: &K) {
	match key::key_for(obj) {
	    Ok(key) => self.queue.add_rate_limited(&key),
	    Err(err) => log::error!("Dropping notification: {}", err),
	}
    }
}

impl<K: Resource + Send + Sync> EventHandler<K> for EventTranslator {

    fn on_add(&self, obj: &K) {
	self.enqueue(obj);
    }

    /*
     * Periodic resyncs republish objects that didn't change at all, there
     * is no point in reconciling those again.
     */
    fn on_update(&self, old: &K, new: &K) {
	if old.meta().resource_version == new.meta().resource_version {
	    return;
	}
	self.enqueue(new);
    }

    fn on_delete(&self, obj: &DeletedObject<K>) {
	match obj {
	    DeletedObject::Object(obj) => self.enqueue::<K>(obj),
	    DeletedObject::FinalStateUnknown{ key, last_known } => {
		let version = last_known.as_ref().and_then(|obj| obj.meta().resource_version.clone());
		log::debug!("{} vanished while the watch was behind, last known version {:?}", key, version);
		self.queue.add_rate_limited(key);
	    },
	}
    }
}
