//! # Secret Sync
//!
//! The cloud credential operator answers our CredentialsRequest with a secret
//! holding an OpenStack `clouds.yaml`. The Manila driver expects flat
//! `os-*` keys instead, so every pass translates the former into the
//! driver's secret.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::catalog::DesiredObject;
use crate::constants::{
    CLOUDS_YAML_KEY, CLOUD_CREDENTIALS_SECRET_NAME, CLOUD_NAME, DRIVER_SECRET_NAME,
};
use crate::controller::runnable::SyncController;
use crate::reconciler::ObjectReconciler;
use crate::store::ObjectIdentity;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Failed to parse clouds.yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("clouds.yaml has no cloud named {0}")]
    MissingCloud(String),
    #[error("clouds.yaml cloud {0} has no auth_url")]
    MissingAuthUrl(String),
}

#[derive(Debug, Deserialize)]
struct CloudsFile {
    #[serde(default)]
    clouds: BTreeMap<String, Cloud>,
}

#[derive(Debug, Deserialize)]
struct Cloud {
    #[serde(default)]
    auth: CloudAuth,
    region_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CloudAuth {
    auth_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    project_id: Option<String>,
    project_name: Option<String>,
    domain_id: Option<String>,
    domain_name: Option<String>,
    user_domain_id: Option<String>,
    user_domain_name: Option<String>,
    project_domain_id: Option<String>,
    project_domain_name: Option<String>,
    application_credential_id: Option<String>,
    application_credential_name: Option<String>,
    application_credential_secret: Option<String>,
}

/// Translate one cloud of a `clouds.yaml` into the driver's secret keys
///
/// Only keys with a non-empty value are emitted.
///
/// # Errors
///
/// Returns `TranslateError` if the document does not parse, lacks the cloud
/// or the cloud has no auth URL.
pub fn translate_clouds_yaml(
    clouds_yaml: &[u8],
    cloud_name: &str,
) -> Result<BTreeMap<String, String>, TranslateError> {
    let mut file: CloudsFile = serde_yaml::from_slice(clouds_yaml)?;
    let cloud = file
        .clouds
        .remove(cloud_name)
        .ok_or_else(|| TranslateError::MissingCloud(cloud_name.to_string()))?;
    let auth = cloud.auth;
    if auth.auth_url.as_deref().unwrap_or_default().is_empty() {
        return Err(TranslateError::MissingAuthUrl(cloud_name.to_string()));
    }

    let pairs = [
        ("os-authURL", auth.auth_url),
        ("os-region", cloud.region_name),
        ("os-userName", auth.username),
        ("os-password", auth.password),
        ("os-projectID", auth.project_id),
        ("os-projectName", auth.project_name),
        ("os-domainID", auth.domain_id),
        ("os-domainName", auth.domain_name),
        ("os-userDomainID", auth.user_domain_id),
        ("os-userDomainName", auth.user_domain_name),
        ("os-projectDomainID", auth.project_domain_id),
        ("os-projectDomainName", auth.project_domain_name),
        ("os-applicationCredentialID", auth.application_credential_id),
        ("os-applicationCredentialName", auth.application_credential_name),
        (
            "os-applicationCredentialSecret",
            auth.application_credential_secret,
        ),
    ];
    Ok(pairs
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .filter(|value| !value.is_empty())
                .map(|value| (key.to_string(), value))
        })
        .collect())
}

/// Keeps `csi-manila-secrets` in step with the cloud credentials
#[derive(Debug, Clone)]
pub struct SecretSyncController {
    namespace: String,
    reconciler: ObjectReconciler,
}

impl SecretSyncController {
    #[must_use]
    pub fn new(namespace: &str, reconciler: ObjectReconciler) -> Self {
        Self {
            namespace: namespace.to_string(),
            reconciler,
        }
    }

    fn source(&self) -> ObjectIdentity {
        ObjectIdentity::of::<Secret>(Some(&self.namespace), CLOUD_CREDENTIALS_SECRET_NAME)
    }

    /// Driver secret built from the translated keys
    ///
    /// # Errors
    ///
    /// Returns an error if the secret cannot be converted to a desired object.
    pub fn driver_secret(&self, keys: BTreeMap<String, String>) -> Result<DesiredObject> {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(DRIVER_SECRET_NAME.to_string()),
                namespace: Some(self.namespace.clone()),
                ..ObjectMeta::default()
            },
            data: Some(
                keys.into_iter()
                    .map(|(key, value)| (key, ByteString(value.into_bytes())))
                    .collect(),
            ),
            type_: Some("Opaque".to_string()),
            ..Secret::default()
        };
        Ok(DesiredObject::from_typed(&secret)?)
    }
}

#[async_trait]
impl SyncController for SecretSyncController {
    fn name(&self) -> &str {
        "SecretSync"
    }

    async fn sync(&self) -> Result<()> {
        let source = self.source();
        let Some(object) = self.reconciler.fetch(&source).await? else {
            info!(source = %source, "Cloud credentials not available yet, waiting");
            return Ok(());
        };
        let secret: Secret = serde_json::from_value(serde_json::to_value(&object)?)
            .with_context(|| format!("Malformed secret {source}"))?;
        let clouds_yaml = secret
            .data
            .as_ref()
            .and_then(|data| data.get(CLOUDS_YAML_KEY))
            .with_context(|| format!("{source} has no {CLOUDS_YAML_KEY} key"))?;

        let keys = translate_clouds_yaml(&clouds_yaml.0, CLOUD_NAME)
            .with_context(|| format!("Cannot translate {source}"))?;
        let desired = self.driver_secret(keys)?;
        self.reconciler.reconcile(&desired).await?;
        Ok(())
    }
}
