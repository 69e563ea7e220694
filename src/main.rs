//! # Manila CSI Driver Operator
//!
//! Installs and reconciles the Manila CSI driver. Settings come from the
//! environment; the flags below override the most common ones.

use anyhow::Result;
use clap::Parser;
use manila_csi_driver_operator::config::{OperatorConfig, ServerConfig};
use manila_csi_driver_operator::runtime;

/// Manila CSI Driver Operator
#[derive(Parser, Debug)]
#[command(name = "manila-csi-driver-operator", version, about, long_about = None)]
struct Args {
    /// Namespace the driver is installed into
    #[arg(long, env = "OPERAND_NAMESPACE")]
    operand_namespace: Option<String>,

    /// Periodic resync interval in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    resync_interval_secs: Option<u64>,

    /// Port for metrics and health probes
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Log level (ERROR, WARN, INFO, DEBUG, TRACE)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    log_format: Option<String>,
}

impl Args {
    fn apply(self, config: &mut OperatorConfig, server_config: &mut ServerConfig) {
        if let Some(namespace) = self.operand_namespace.filter(|ns| !ns.is_empty()) {
            config.operand_namespace = namespace;
        }
        if let Some(secs) = self.resync_interval_secs {
            config.resync_interval_secs = secs;
        }
        if let Some(port) = self.metrics_port {
            server_config.metrics_port = port;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = OperatorConfig::from_env();
    let mut server_config = ServerConfig::from_env();
    Args::parse().apply(&mut config, &mut server_config);

    // The operator runs until it fails; every return is an error exit
    match runtime::run(config, server_config).await? {}
}
