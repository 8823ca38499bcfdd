use crate::controller::ControllerSettings;
use crate::errors::Error;
use crate::errors::Result;
use crate::ratelimit::Backoff;

use clap::Parser;
use kube::Client as KubeClient;
use kube::Config as KubeConfig;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use std::path::PathBuf;
use std::time::Duration;

/// Keeps a network backend in sync with the Network objects of a cluster.
#[derive(Parser, Debug, Clone)]
#[command(name = "networkd", version)]
pub struct Args {

    /// Path to a kubeconfig. Only required if out-of-cluster.
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// The address of the Kubernetes API server. Overrides any value in kubeconfig.
    #[arg(long)]
    pub master: Option<String>,

    /// Number of workers reconciling Network objects concurrently.
    #[arg(long, default_value_t = 2)]
    pub workers: usize,

    /// How often every cached Network is republished to the controller.
    #[arg(long, default_value_t = 30)]
    pub resync_period_secs: u64,

    /// Initial delay before retrying a failed Network.
    #[arg(long, default_value_t = 5)]
    pub base_delay_ms: u64,

    /// Upper bound of the per Network retry delay.
    #[arg(long, default_value_t = 1000)]
    pub max_delay_secs: u64,

    /// Overall requeue rate allowed across all Networks.
    #[arg(long, default_value_t = 10.0)]
    pub qps: f64,

    /// Requeues allowed in a burst above --qps.
    #[arg(long, default_value_t = 100)]
    pub burst: u32,

    /// Stop retrying a Network after that many failures (retries forever if unset).
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// On shutdown, process every queued Network before exiting.
    #[arg(long)]
    pub drain_on_shutdown: bool,

    /// Print the Network CustomResourceDefinition as JSON and exit.
    #[arg(long)]
    pub print_crd: bool,
}

impl Args {

    pub fn validate(&self) -> Result<()> {
	if self.workers == 0 {
	    return Err(Error::Config(String::from("--workers must be at least 1")));
	}
	if !(self.qps > 0.0) {
	    return Err(Error::Config(format!("--qps must be positive, got {}", self.qps)));
	}
	if self.resync_period_secs == 0 {
	    return Err(Error::Config(String::from("--resync-period-secs must be at least 1")));
	}
	if self.burst == 0 {
	    return Err(Error::Config(String::from("--burst must be at least 1")));
	}
	if self.base_delay_ms == 0 || Duration::from_millis(self.base_delay_ms) > self.max_delay() {
	    return Err(Error::Config(String::from("--base-delay-ms must be positive and below --max-delay-secs")));
	}
	Ok(())
    }

    pub fn resync_period(&self) -> Duration {
	Duration::from_secs(self.resync_period_secs)
    }

    fn max_delay(&self) -> Duration {
	Duration::from_secs(self.max_delay_secs)
    }

    pub fn backoff(&self) -> Backoff {
	Backoff{
	    base_delay: Duration::from_millis(self.base_delay_ms),
	    max_delay: self.max_delay(),
	    qps: self.qps,
	    burst: self.burst,
	}
    }

    pub fn settings(&self) -> ControllerSettings {
	ControllerSettings{
	    max_retries: self.max_retries,
	    drain_on_shutdown: self.drain_on_shutdown,
	}
    }

    /*
     * Builds the kube client out of --kubeconfig / --master, falling back
     * to the in-cluster or default configuration.
     */
    pub async fn kube_client(&self) -> Result<KubeClient> {
	let mut config = match &self.kubeconfig {
	    Some(path) => {
		let kubeconfig = Kubeconfig::read_from(path)?;
		KubeConfig::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
	    },
	    None => KubeConfig::infer().await?,
	};

	if let Some(master) = &self.master {
	    config.cluster_url = master.parse()
		.map_err(|err| Error::Config(format!("invalid --master {:?}: {}", master, err)))?;
	}

	Ok(KubeClient::try_from(config)?)
    }
}
