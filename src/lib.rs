//! vxfabric compiles a declarative VXLAN EVPN fabric topology and a host
//! inventory into per-host configuration variables. Scarce resources
//! (VNIs, CLAG ids, subnets, NAT rules) are allocated once and kept stable
//! across runs through an allocation store.

pub mod allocator;
pub mod config;
pub mod db;
pub mod errors;
pub mod inventory;
pub mod links;
pub mod models;
pub mod pipeline;
pub mod utils;

pub use errors::{FabricError, Result};
pub use pipeline::{Pipeline, VIEWS};
