use crate::errors::Result;
use network_api as api;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

/*
 * The network backend the controller provisions into. Both operations
 * have to be idempotent: they may be called any number of times for the
 * same key.
 */
#[async_trait]
pub trait NetworkBackend: Send + Sync {

    /* create the network named by `key`, or update it to match `spec` */
    async fn ensure(&self, key: &str, spec: &api::NetworkSpec) -> Result<()>;

    /* delete the network named by `key`, if it exists */
    async fn teardown(&self, key: &str) -> Result<()>;
}

/*
 * A backend that keeps its networks in memory. Good enough to dry-run the
 * controller against a cluster and see which decisions it takes.
 */
#[derive(Default)]
pub struct InMemoryBackend {
    networks: Mutex<HashMap<String, api::NetworkSpec>>,
}

impl InMemoryBackend {

    pub fn new() -> Self {
	Self::default()
    }

    pub fn get(&self, key: &str) -> Option<api::NetworkSpec> {
	self.networks.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    pub fn len(&self) -> usize {
	self.networks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl NetworkBackend for InMemoryBackend {

    async fn ensure(&self, key: &str, spec: &api::NetworkSpec) -> Result<()> {
	let mut networks = self.networks.lock().unwrap_or_else(PoisonError::into_inner);

	match networks.get(key) {
	    Some(current) if current == spec => {
		log::debug!("[backend] network {} is up to date", key);
	    },
	    Some(_) => {
		log::info!("[backend] updating network {}: cidr={} gateway={}", key, spec.cidr, spec.gateway);
		networks.insert(key.to_string(), spec.clone());
	    },
	    None => {
		log::info!("[backend] creating network {}: cidr={} gateway={}", key, spec.cidr, spec.gateway);
		networks.insert(key.to_string(), spec.clone());
	    },
	}
	Ok(())
    }

    async fn teardown(&self, key: &str) -> Result<()> {
	let mut networks = self.networks.lock().unwrap_or_else(PoisonError::into_inner);

	if networks.remove(key).is_some() {
	    log::info!("[backend] deleting network {}", key);
	} else {
	    log::debug!("[backend] network {} is already gone", key);
	}
	Ok(())
    }
}
