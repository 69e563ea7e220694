//! # CRD Generator
//!
//! Prints the `ManilaDriver` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > deploy/crd/maniladriver.yaml
//! ```

use kube::core::CustomResourceExt;
use manila_csi_driver_operator::crd::ManilaDriver;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&ManilaDriver::crd())?);
    Ok(())
}
