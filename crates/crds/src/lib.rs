//! DCops CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the DCops operator.

pub mod dcops_config;
pub mod netbox_sync_instance;
pub mod references;

pub use dcops_config::*;
pub use netbox_sync_instance::*;
pub use references::*;
