//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Name of the operand (the driver this operator installs)
pub const OPERAND_NAME: &str = "manila-csi-driver";

/// Name of the operator, used as field manager and user agent
pub const OPERATOR_NAME: &str = "manila-csi-driver-operator";

/// Namespace the driver is installed into
pub const DEFAULT_OPERAND_NAMESPACE: &str = "openshift-manila-csi-driver";

/// Namespace holding the cluster-wide cloud provider config
pub const DEFAULT_CLOUD_CONFIG_NAMESPACE: &str = "openshift-config";

/// Name of the cloud provider ConfigMap (source and destination)
pub const DEFAULT_CLOUD_CONFIG_NAME: &str = "cloud-provider-config";

/// Secret written by the cloud credential operator for our CredentialsRequest
pub const CLOUD_CREDENTIALS_SECRET_NAME: &str = "manila-cloud-credentials";

/// Key of the clouds.yaml document inside the credentials secret
pub const CLOUDS_YAML_KEY: &str = "clouds.yaml";

/// Name of the cloud entry inside clouds.yaml
pub const CLOUD_NAME: &str = "openstack";

/// Secret consumed by the driver pods
pub const DRIVER_SECRET_NAME: &str = "csi-manila-secrets";

/// CSIDriver object registered by the driver (matches `assets/csidriver.yaml`)
pub const CSI_DRIVER_NAME: &str = "manila.csi.openstack.org";

/// Namespace the cloud credential operator reads CredentialsRequests from
pub const CREDENTIALS_REQUEST_NAMESPACE: &str = "openshift-cloud-credential-operator";

/// Name of the singleton operator resource
pub const OPERATOR_RESOURCE_NAME: &str = "cluster";

/// Environment variable carrying the NFS node plugin image
pub const NFS_DRIVER_IMAGE_ENV: &str = "NFS_DRIVER_IMAGE";

/// Environment variable carrying the Manila driver image
pub const DRIVER_IMAGE_ENV: &str = "DRIVER_IMAGE";

/// Environment variable carrying the external-provisioner sidecar image
pub const PROVISIONER_IMAGE_ENV: &str = "PROVISIONER_IMAGE";

/// Environment variable carrying the external-snapshotter sidecar image
pub const SNAPSHOTTER_IMAGE_ENV: &str = "SNAPSHOTTER_IMAGE";

/// Environment variable carrying the node-driver-registrar sidecar image
pub const NODE_DRIVER_REGISTRAR_IMAGE_ENV: &str = "NODE_DRIVER_REGISTRAR_IMAGE";

/// Environment variable carrying the livenessprobe sidecar image
pub const LIVENESS_PROBE_IMAGE_ENV: &str = "LIVENESS_PROBE_IMAGE";

/// Environment variable carrying the operand namespace into manifests
pub const OPERAND_NAMESPACE_ENV: &str = "OPERAND_NAMESPACE";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default periodic resync interval (20 minutes)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 20 * 60;

/// Default time runnables get to stop after cancellation
pub const DEFAULT_SHUTDOWN_GRACE_PERIOD_SECS: u64 = 30;

/// Default time to wait for informers to finish their initial list
pub const DEFAULT_INFORMER_SYNC_TIMEOUT_SECS: u64 = 60;

/// Default deadline for a single cluster store call
pub const DEFAULT_STORE_CALL_TIMEOUT_SECS: u64 = 30;

/// Default Fibonacci backoff floor after a failed pass (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default Fibonacci backoff ceiling after a failed pass (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;
