use crate::errors::Error;
use crate::errors::Result;

use kube::Resource;
use kube::ResourceExt;

/*
 * Returns the queue key of an object: "<namespace>/<name>" for namespaced
 * objects and "<name>" for cluster scoped ones.
 */
pub fn key_for<K: Resource>(obj: &K) -> Result<String> {
    let name = match &obj.meta().name {
	Some(name) if !name.is_empty() => name.clone(),
	_ => {
	    let errmsg = format!("object has no name: {:?}", obj.meta());
	    return Err(Error::InvalidKey(errmsg));
	}
    };

    let key = match obj.namespace() {
	Some(namespace) if !namespace.is_empty() => format!("{}/{}", namespace, name),
	_ => name,
    };

    Ok(key)
}

/*
 * The inverse of key_for(): splits a key into its namespace (if any) and
 * name.
 */
pub fn split_key(key: &str) -> Result<(Option<String>, String)> {
    let parts: Vec<&str> = key.split('/').collect();

    match parts.as_slice() {
	[name] if !name.is_empty() => Ok((None, name.to_string())),
	[namespace, name] if !namespace.is_empty() && !name.is_empty() => {
	    Ok((Some(namespace.to_string()), name.to_string()))
	},
	_ => Err(Error::InvalidKey(format!("unexpected key format: {:?}", key))),
    }
}
