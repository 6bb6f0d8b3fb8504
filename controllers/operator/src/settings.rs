//! Operator settings read from the process environment at start-up.

use crate::error::ControllerError;
use std::env;
use std::net::SocketAddr;

/// Default name of the managed-domains ConfigMap mounted into the controllers
pub const DEFAULT_MANAGED_DOMAINS_CONFIGMAP: &str = "managed-domains";

/// Default page size when listing legacy instances
pub const DEFAULT_DECOMMISSION_PAGE_SIZE: u32 = 500;

/// Default bound on full decommissioning passes
pub const DEFAULT_DECOMMISSION_MAX_PASSES: usize = 50;

/// Default listen address of the probe server
pub const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8081";

const PULL_POLICIES: [&str; 3] = ["Always", "IfNotPresent", "Never"];

/// Process-level overrides and tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorSettings {
    /// Controllers image override (`DCOPS_OPERATOR_IMAGE`)
    pub image: Option<String>,
    /// Pull policy override (`DCOPS_IMAGE_PULL_POLICY`)
    pub image_pull_policy: Option<String>,
    /// DNS servers passed through to the controllers (`ZONE_CHECK_DNS_SERVERS`)
    pub dns_servers: Option<String>,
    /// Managed-domains ConfigMap name (`MANAGED_DOMAINS_CONFIGMAP`)
    pub managed_domains_configmap: String,
    /// Page size for legacy instance listing (`DECOMMISSION_PAGE_SIZE`)
    pub decommission_page_size: u32,
    /// Maximum full passes before decommissioning gives up (`DECOMMISSION_MAX_PASSES`)
    pub decommission_max_passes: usize,
    /// Probe server address (`PROBE_ADDR`)
    pub probe_addr: SocketAddr,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            image: None,
            image_pull_policy: None,
            dns_servers: None,
            managed_domains_configmap: DEFAULT_MANAGED_DOMAINS_CONFIGMAP.to_string(),
            decommission_page_size: DEFAULT_DECOMMISSION_PAGE_SIZE,
            decommission_max_passes: DEFAULT_DECOMMISSION_MAX_PASSES,
            probe_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
        }
    }
}

impl OperatorSettings {
    /// Load settings from environment variables.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through an arbitrary lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let image_pull_policy = get("DCOPS_IMAGE_PULL_POLICY");
        if let Some(policy) = &image_pull_policy {
            if !PULL_POLICIES.contains(&policy.as_str()) {
                return Err(ControllerError::InvalidConfig(format!(
                    "DCOPS_IMAGE_PULL_POLICY must be one of {}, got {:?}",
                    PULL_POLICIES.join(", "),
                    policy
                )));
            }
        }

        let decommission_page_size = match get("DECOMMISSION_PAGE_SIZE") {
            Some(raw) => parse_positive::<u32>("DECOMMISSION_PAGE_SIZE", &raw)?,
            None => DEFAULT_DECOMMISSION_PAGE_SIZE,
        };
        let decommission_max_passes = match get("DECOMMISSION_MAX_PASSES") {
            Some(raw) => parse_positive::<usize>("DECOMMISSION_MAX_PASSES", &raw)?,
            None => DEFAULT_DECOMMISSION_MAX_PASSES,
        };
        let probe_addr = get("PROBE_ADDR")
            .unwrap_or_else(|| DEFAULT_PROBE_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ControllerError::InvalidConfig(format!("PROBE_ADDR: {}", e)))?;

        Ok(Self {
            image: get("DCOPS_OPERATOR_IMAGE"),
            image_pull_policy,
            dns_servers: get("ZONE_CHECK_DNS_SERVERS"),
            managed_domains_configmap: get("MANAGED_DOMAINS_CONFIGMAP")
                .unwrap_or_else(|| DEFAULT_MANAGED_DOMAINS_CONFIGMAP.to_string()),
            decommission_page_size,
            decommission_max_passes,
            probe_addr,
        })
    }
}

fn parse_positive<T>(key: &str, raw: &str) -> Result<T, ControllerError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value = raw
        .trim()
        .parse::<T>()
        .map_err(|e| ControllerError::InvalidConfig(format!("{}: {}", key, e)))?;
    if value <= T::default() {
        return Err(ControllerError::InvalidConfig(format!(
            "{} must be greater than zero",
            key
        )));
    }
    Ok(value)
}
