use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client as KubeClient;
use kube::runtime::events::Event as KubeEvent;
use kube::runtime::events::EventType as KubeEventType;
use kube::runtime::events::Recorder as KubeRecorder;
use kube::runtime::events::Reporter as KubeReporter;
use tokio::sync::mpsc;

/* reasons shown in the REASON column of `kubectl get events` */
pub mod reasons {
    pub const SYNCED: &str = "Synced";
    pub const SYNC_FAILED: &str = "SyncFailed";
}

pub const MESSAGE_RESOURCE_SYNCED: &str = "Network synced successfully";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Warning,
}

impl From<Severity> for KubeEventType {
    fn from(severity: Severity) -> Self {
	match severity {
	    Severity::Normal => KubeEventType::Normal,
	    Severity::Warning => KubeEventType::Warning,
	}
    }
}

/*
 * Records operator visible events against an object. Recording never
 * blocks and never fails from the caller's point of view.
 */
pub trait EventRecorder: Send + Sync {

    fn record(&self, reference: &ObjectReference, severity: Severity, reason: &str, message: &str);
}

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub reference: ObjectReference,
    pub severity: Severity,
    pub reason: String,
    pub message: String,
}

/*
 * The recorder handed out to the controller, it only queues the events
 * for the broadcaster.
 */
#[derive(Clone)]
pub struct BroadcastRecorder {
    tx: mpsc::UnboundedSender<RecordedEvent>,
}

impl EventRecorder for BroadcastRecorder {

    fn record(&self, reference: &ObjectReference, severity: Severity, reason: &str, message: &str) {
	let event = RecordedEvent{
	    reference: reference.clone(),
	    severity: severity,
	    reason: reason.to_string(),
	    message: message.to_string(),
	};

	if self.tx.send(event).is_err() {
	    log::debug!("Event broadcaster is gone, dropping event {}", reason);
	}
    }
}

/*
 * EventBroadcaster logs every recorded event and, once a sink is attached,
 * publishes it to the cluster as well.
 */
pub struct EventBroadcaster {
    component: String,
    rx: mpsc::UnboundedReceiver<RecordedEvent>,
    sink: Option<KubeRecorder>,
}

impl EventBroadcaster {

    pub fn new(component: &str) -> (Self, BroadcastRecorder) {
	let (tx, rx) = mpsc::unbounded_channel();

	let broadcaster = Self{
	    component: component.to_string(),
	    rx: rx,
	    sink: None,
	};
	(broadcaster, BroadcastRecorder{ tx: tx })
    }

    /*
     * Publishes events through the cluster's events API, reported by
     * `instance` of our component.
     */
    pub fn with_sink(mut self, client: KubeClient, instance: Option<String>) -> Self {
	let reporter = KubeReporter{
	    controller: self.component.clone(),
	    instance: instance,
	};
	self.sink = Some(KubeRecorder::new(client, reporter));
	self
    }

    /*
     * Runs until every recorder has been dropped and all pending events
     * have been flushed.
     */
    pub async fn run(mut self) {
	while let Some(event) = self.rx.recv().await {
	    let object = match (&event.reference.namespace, &event.reference.name) {
		(Some(ns), Some(name)) => format!("{}/{}", ns, name),
		(None, Some(name)) => name.clone(),
		_ => String::from("<unknown>"),
	    };

	    match event.severity {
		Severity::Normal => log::info!("Event({}): {} {}: {}", self.component, object, event.reason, event.message),
		Severity::Warning => log::warn!("Event({}): {} {}: {}", self.component, object, event.reason, event.message),
	    }

	    if let Some(sink) = &self.sink {
		let kube_event = KubeEvent{
		    type_: event.severity.into(),
		    reason: event.reason.clone(),
		    note: Some(event.message.clone()),
		    action: String::from("Reconcile"),
		    secondary: None,
		};
		if let Err(err) = sink.publish(&kube_event, &event.reference).await {
		    log::warn!("Unable to publish event {} for {}: {}", event.reason, object, err);
		}
	    }
	}
	log::debug!("Event broadcaster for {} stopped", self.component);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> ObjectReference {
	ObjectReference{
	    namespace: Some("ns".to_string()),
	    name: Some("foo".to_string()),
	    ..ObjectReference::default()
	}
    }

    #[tokio::test]
    async fn broadcaster_stops_after_flushing_when_recorders_are_gone() {
	let (broadcaster, recorder) = EventBroadcaster::new("network-controller");

	recorder.record(&reference(), Severity::Normal, reasons::SYNCED, MESSAGE_RESOURCE_SYNCED);
	recorder.clone().record(&reference(), Severity::Warning, reasons::SYNC_FAILED, "boom");
	drop(recorder);

	tokio::time::timeout(std::time::Duration::from_secs(1), broadcaster.run()).await.unwrap();
    }

    #[test]
    fn recording_without_broadcaster_does_not_panic() {
	let (broadcaster, recorder) = EventBroadcaster::new("network-controller");
	drop(broadcaster);

	recorder.record(&reference(), Severity::Normal, reasons::SYNCED, MESSAGE_RESOURCE_SYNCED);
    }

    #[test]
    fn severity_maps_to_kube_event_type() {
	assert!(matches!(KubeEventType::from(Severity::Normal), KubeEventType::Normal));
	assert!(matches!(KubeEventType::from(Severity::Warning), KubeEventType::Warning));
    }
}
