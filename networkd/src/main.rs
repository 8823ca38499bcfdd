use network_api as api;
use networkd::backend::InMemoryBackend;
use networkd::config::Args;
use networkd::controller::Controller;
use networkd::errors::Error;
use networkd::informer::NetworkInformer;
use networkd::queue::WorkQueue;
use networkd::ratelimit;
use networkd::reconciler::Reconciler;
use networkd::recorder::EventBroadcaster;

use clap::Parser;
use gethostname::gethostname;
use kube::Api as KubeApi;
use kube::CustomResourceExt;
use std::sync::Arc;
use std::time::Duration;

const CONTROLLER_AGENT_NAME: &str = "network-controller";

/* how long pending events get to reach the API server on exit */
const EVENT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

fn print_crd() -> Result<(), Error> {
    let crd = serde_json::to_string_pretty(&api::Network::crd())?;
    println!("{}", crd);
    Ok(())
}

/*
 * Program design:
 *
 *  1. Watch every Network object in the cluster, keep them in a local cache.
 *  2. Queue the key of every Network that changed.
 *  3. Workers pull keys and make the network backend match the cache.
 *  4. On CTRL^C, stop pulling keys and let the in-flight ones finish.
 */
#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let args = Args::parse();
    if args.print_crd {
	return print_crd();
    }
    args.validate()?;

    let kube_client = args.kube_client().await?;
    let instance = gethostname().into_string().ok();

    log::debug!("Creating event broadcaster");
    let (broadcaster, recorder) = EventBroadcaster::new(CONTROLLER_AGENT_NAME);
    let events = tokio::spawn(broadcaster.with_sink(kube_client.clone(), instance).run());

    let informer = NetworkInformer::new(KubeApi::all(kube_client), args.resync_period());
    let cache = Arc::new(informer.cache());
    let limiter = ratelimit::controller_rate_limiter(&args.backoff());
    let queue = WorkQueue::new("Networks", Box::new(limiter));
    let reconciler = Reconciler::new(cache.clone(), Arc::new(InMemoryBackend::new()), Arc::new(recorder));
    let controller = Controller::new(queue, cache, reconciler, args.settings());

    log::info!("Setting up event handlers");
    let watch = tokio::spawn(informer.run(controller.translator()));

    // handle CTRL^C as gracefully as we can.
    let stop = async {
	if let Err(err) = tokio::signal::ctrl_c().await {
	    log::error!("Unable to listen for CTRL^C: {}", err);
	}
    };
    let result = controller.run(args.workers, stop).await;
    if let Err(err) = &result {
	log::error!("Error running controller: {}", err);
    }

    watch.abort();
    // the last recorder goes away with the controller, letting the
    // broadcaster flush and return
    drop(controller);
    if tokio::time::timeout(EVENT_FLUSH_TIMEOUT, events).await.is_err() {
	log::warn!("Gave up flushing pending events");
    }

    result
}
