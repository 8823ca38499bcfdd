/*
 * network/api - defines the Network CRD shared by the controller and
 * anything else that needs to read or write Network objects.
 */

pub mod network;
pub use network::Network;
pub use network::NetworkSpec;
