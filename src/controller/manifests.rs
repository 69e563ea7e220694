//! # Manifest Controllers
//!
//! Controllers that apply a fixed set of catalog objects in order: static
//! resources, the driver workloads, the NFS node plugin and the credentials
//! request.

use anyhow::Result;
use async_trait::async_trait;

use crate::catalog::{Catalog, CatalogError, DesiredObject};
use crate::controller::runnable::SyncController;
use crate::reconciler::{summarize, ObjectReconciler};

/// Which slice of the catalog a controller owns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestSet {
    StaticResources,
    Driver,
    NfsDriver,
    Credentials,
}

impl ManifestSet {
    pub const ALL: [ManifestSet; 4] = [
        ManifestSet::StaticResources,
        ManifestSet::Driver,
        ManifestSet::NfsDriver,
        ManifestSet::Credentials,
    ];

    #[must_use]
    pub fn controller_name(&self) -> &'static str {
        match self {
            ManifestSet::StaticResources => "ManilaDriverStaticResources",
            ManifestSet::Driver => "ManilaDriverController",
            ManifestSet::NfsDriver => "NFSDriverController",
            ManifestSet::Credentials => "ManilaDriverCredentials",
        }
    }

    /// Desired objects of this set, in apply order
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if a manifest is missing or malformed.
    pub fn build(&self, catalog: &Catalog) -> Result<Vec<DesiredObject>, CatalogError> {
        match self {
            ManifestSet::StaticResources => catalog.static_resources(),
            ManifestSet::Driver => catalog.driver_manifests(),
            ManifestSet::NfsDriver => catalog.nfs_driver_manifests(),
            ManifestSet::Credentials => catalog.credentials_manifests(),
        }
    }
}

/// Applies one manifest set per pass
#[derive(Debug, Clone)]
pub struct ManifestController {
    set: ManifestSet,
    catalog: Catalog,
    reconciler: ObjectReconciler,
}

impl ManifestController {
    #[must_use]
    pub fn new(set: ManifestSet, catalog: Catalog, reconciler: ObjectReconciler) -> Self {
        Self {
            set,
            catalog,
            reconciler,
        }
    }

    #[must_use]
    pub fn set(&self) -> ManifestSet {
        self.set
    }
}

#[async_trait]
impl SyncController for ManifestController {
    fn name(&self) -> &str {
        self.set.controller_name()
    }

    async fn sync(&self) -> Result<()> {
        let objects = self.set.build(&self.catalog)?;
        let outcomes = self.reconciler.reconcile_all(&objects).await;
        summarize(&outcomes)
    }
}
