use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {

    /* encapsulate a kube-rust error */
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    /* the kubeconfig file could not be read or understood */
    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("unable to infer kube config: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    /* the object identity can't be turned into (or back from) a key */
    #[error("invalid resource key: {0}")]
    InvalidKey(String),

    /* the local cache couldn't answer, it is worth asking again later */
    #[error("failed to look up {0} in the local cache")]
    Lookup(String),

    /* the network backend refused or failed to apply the change */
    #[error("network backend error: {0}")]
    Backend(String),

    /* the stop signal arrived before the informer cache was filled */
    #[error("failed to wait for caches to sync")]
    CacheSync,

    /* the reconciler panicked while syncing the key */
    #[error("reconciliation panicked")]
    Panicked,
}

impl Error {

    /*
     * Whether a failed sync should go back to the queue with backoff.
     * Malformed keys never get better by retrying them.
     */
    pub fn is_retryable(&self) -> bool {
	!matches!(self, Error::InvalidKey(_) | Error::Config(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_keys_are_permanent() {
	assert!(!Error::InvalidKey("a/b/c".to_string()).is_retryable());
    }

    #[test]
    fn backend_and_lookup_failures_are_retried() {
	assert!(Error::Backend("timeout".to_string()).is_retryable());
	assert!(Error::Lookup("ns/foo".to_string()).is_retryable());
	assert!(Error::Panicked.is_retryable());
    }
}
