//! Prints the CRDs served by DCops as a multi-document YAML stream.
//!
//! The deprecated `NetBoxSyncInstance` CRD is intentionally not printed.

use crds::DCopsConfig;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&DCopsConfig::crd())?);
    Ok(())
}
