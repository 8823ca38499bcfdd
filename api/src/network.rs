use kube::api::ObjectMeta;
use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[kube(group = "samplecrd.k8s.io", version = "v1", kind = "Network", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {

    /* The address block of the network, e.g. 10.0.0.0/24 */
    pub cidr: String,

    /* The gateway address handed out to the network members */
    pub gateway: String,
}

impl NetworkSpec {

    pub fn new(cidr: &str, gateway: &str) -> Self {
	Self{
	    cidr: cidr.to_string(),
	    gateway: gateway.to_string(),
	}
    }
}

/*
 * Builds a Network object the same way the API server would hand it out:
 * namespaced, named and stamped with a resource version.
 */
pub fn new(namespace: &str, name: &str, resource_version: &str, spec: NetworkSpec) -> Network {
    let mut metadata = ObjectMeta::default();
    metadata.name = Some(name.to_string());
    metadata.namespace = Some(namespace.to_string());
    metadata.resource_version = Some(resource_version.to_string());

    Network{
	metadata: metadata,
	spec: spec,
    }
}
