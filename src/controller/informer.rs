//! # Informers
//!
//! Watch-based event sources. An informer lists and watches one resource type
//! and wakes every interested sync loop when something changes after the
//! initial list.

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::{pin_mut, StreamExt};
use kube::api::{ApiResource, DynamicObject};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use kube_runtime::watcher;
use kube_runtime::WatchStreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::observability::metrics;

/// Background source of change notifications
#[async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;

    /// Watch until `cancel` fires
    async fn run(&self, cancel: CancellationToken) -> Result<()>;

    /// Resolves once the initial list has completed
    async fn synced(&self);
}

/// Informer over one resource type, optionally limited to a namespace
pub struct KubeInformer<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    name: String,
    plural: String,
    api: Api<K>,
    config: watcher::Config,
    triggers: Vec<Arc<Notify>>,
    synced: watch::Sender<bool>,
}

impl<K> std::fmt::Debug for KubeInformer<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeInformer")
            .field("name", &self.name)
            .field("triggers", &self.triggers.len())
            .finish_non_exhaustive()
    }
}

impl<K> KubeInformer<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    /// Informer over `K` objects in `namespace`
    #[must_use]
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        let (synced, _) = watch::channel(false);
        let plural = K::plural(&()).to_string();
        Self {
            name: format!("{namespace}/{plural}"),
            plural,
            api: Api::namespaced(client, namespace),
            config: watcher::Config::default(),
            triggers: Vec::new(),
            synced,
        }
    }
}

impl<K> KubeInformer<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// Informer over every `K` object in the cluster
    #[must_use]
    pub fn all(client: Client) -> Self {
        let (synced, _) = watch::channel(false);
        let plural = K::plural(&()).to_string();
        Self {
            name: plural.clone(),
            plural,
            api: Api::all(client),
            config: watcher::Config::default(),
            triggers: Vec::new(),
            synced,
        }
    }
}

impl KubeInformer<DynamicObject> {
    /// Informer over objects of a kind without a Rust type, in `namespace`
    #[must_use]
    pub fn dynamic(client: Client, resource: &ApiResource, namespace: &str) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            name: format!("{namespace}/{}", resource.plural),
            plural: resource.plural.clone(),
            api: Api::namespaced_with(client, namespace, resource),
            config: watcher::Config::default(),
            triggers: Vec::new(),
            synced,
        }
    }
}

impl<K> KubeInformer<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// Plural resource name, e.g. `daemonsets`
    #[must_use]
    pub fn plural(&self) -> &str {
        &self.plural
    }

    /// Only watch objects matching a field selector, e.g. `metadata.name=foo`
    #[must_use]
    pub fn with_field_selector(mut self, selector: &str) -> Self {
        self.config = self.config.fields(selector);
        self
    }

    /// Wake `trigger` on every change
    #[must_use]
    pub fn notify(mut self, trigger: Arc<Notify>) -> Self {
        self.triggers.push(trigger);
        self
    }

    fn fire(&self) {
        metrics::increment_informer_events(&self.name);
        for trigger in &self.triggers {
            trigger.notify_one();
        }
    }

    fn handle(&self, event: watcher::Event<K>) {
        match event {
            watcher::Event::Apply(object) | watcher::Event::Delete(object) => {
                debug!(
                    informer = %self.name,
                    object = object.meta().name.as_deref().unwrap_or("<unnamed>"),
                    "Watch event"
                );
                self.fire();
            }
            watcher::Event::InitDone => {
                // a relist after a watch desync may have missed changes
                let was_synced = self.synced.send_replace(true);
                if was_synced {
                    self.fire();
                } else {
                    info!(informer = %self.name, "Informer synced");
                }
            }
            watcher::Event::Init | watcher::Event::InitApply(_) => {}
        }
    }
}

#[async_trait]
impl<K> EventSource for KubeInformer<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let stream = watcher(self.api.clone(), self.config.clone()).default_backoff();
        pin_mut!(stream);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                event = stream.next() => match event {
                    Some(Ok(event)) => self.handle(event),
                    Some(Err(e)) => warn!(informer = %self.name, error = %e, "Watch error"),
                    None => bail!("Watch stream for {} ended", self.name),
                },
            }
        }
    }

    async fn synced(&self) {
        let mut synced = self.synced.subscribe();
        // the sender lives in self, so waiting cannot fail while self exists
        let _ = synced.wait_for(|synced| *synced).await;
    }
}
