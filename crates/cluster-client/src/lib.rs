//! Cluster client for the DCops operator
//!
//! The operator never talks to `kube::Api` directly. Every read, write,
//! delete, list and discovery call goes through [`ClusterClientTrait`] so the
//! reconcilers can be exercised against [`MockClusterClient`] in unit tests.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, KubeClusterClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::try_default().await?;
//! match client.server_resources_for_group_version("apps.openshift.io/v1").await {
//!     Ok(resources) => println!("served: {:?}", resources),
//!     Err(e) if e.is_not_found() => println!("not served"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::MockClusterClient;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "dcops-operator";
