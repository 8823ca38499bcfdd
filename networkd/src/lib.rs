/*
 * networkd - keeps a network backend in sync with the Network objects
 * of a cluster.
 *
 * Informer notifications become keys in a rate limited work queue; a
 * fixed pool of workers pulls the keys and hands them to the reconciler,
 * which re-reads the cached object and ensures (or tears down) the
 * matching network.
 */

pub mod backend;
pub mod config;
pub mod controller;
pub mod errors;
pub mod informer;
pub mod key;
pub mod queue;
pub mod ratelimit;
pub mod reconciler;
pub mod recorder;
pub mod translator;

#[cfg(test)]
mod testing;
