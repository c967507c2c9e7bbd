//! HTTP transport for the meshdb graph store.
//!
//! Library target so integration tests can build the router and start a
//! server exactly the way the binary does.

pub mod routes;
pub mod server;
