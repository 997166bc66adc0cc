//! The provider registry.
//!
//! A [`Registry`] is built once at startup: it owns the shared storage
//! backend, the invalidation queue and the user directory, builds one provider
//! per vote domain, and wires each provider's deletion handler onto the
//! content domains it rates. After the registration phase it is shared
//! read-only (typically as `Arc<Registry>`).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use recommends_core::{Domain, Error, Result, StorageBackend, create_storage_backend};

use crate::config::RecommendsConfig;
use crate::provider::{
    DynProvider, PrecomputeReport, ProviderContext, ProviderSettings, RecommendationProvider,
    Registered,
};
use crate::signals::{DeletionEvent, EventSource, SignalBus, handler};
use crate::tasks::{TaskQueue, WorkerPool};
use crate::users::UserDirectory;

/// Catalog of providers by vote domain and by content domain.
pub struct Registry {
    storage: Arc<dyn StorageBackend>,
    tasks: Arc<dyn TaskQueue>,
    users: Arc<dyn UserDirectory>,
    settings: ProviderSettings,
    vote_providers: BTreeMap<Domain, Arc<dyn DynProvider>>,
    content_providers: BTreeMap<Domain, Arc<dyn DynProvider>>,
    signals: SignalBus,
}

impl Registry {
    /// Create an empty registry with default provider settings.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        tasks: Arc<dyn TaskQueue>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            storage,
            tasks,
            users,
            settings: ProviderSettings::default(),
            vote_providers: BTreeMap::new(),
            content_providers: BTreeMap::new(),
            signals: SignalBus::new(),
        }
    }

    /// Use `settings` for providers registered from now on.
    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the storage backend, a worker pool and the settings from
    /// `config`.
    ///
    /// Fails with [`Error::TaskQueue`] outside a tokio runtime.
    pub fn from_config(config: &RecommendsConfig, users: Arc<dyn UserDirectory>) -> Result<Self> {
        let storage = create_storage_backend(&config.storage)?;
        let settings = ProviderSettings::from_config(config)?;
        let tasks = Arc::new(WorkerPool::new(&config.tasks)?);
        log::info!(
            "Recommends registry using '{}' storage and {} workers",
            storage.name(),
            config.tasks.workers
        );
        Ok(Self::new(storage, tasks, users).with_settings(settings))
    }

    /// A fresh context for a provider of `vote_domain`.
    pub fn context_for(&self, vote_domain: Domain) -> ProviderContext {
        ProviderContext::new(
            vote_domain,
            Arc::clone(&self.storage),
            Arc::clone(&self.tasks),
            Arc::clone(&self.users),
            self.settings.clone(),
        )
    }

    /// Build the provider for `vote_domain` and index it under the vote domain
    /// and every content domain.
    ///
    /// `factory` runs exactly once. Registering a domain again replaces the
    /// previous provider and its deletion handlers.
    pub fn register<P, F, I>(&mut self, vote_domain: Domain, content_domains: I, factory: F) -> Arc<P>
    where
        P: RecommendationProvider,
        F: FnOnce(ProviderContext) -> P,
        I: IntoIterator<Item = Domain>,
    {
        let provider = Arc::new(factory(self.context_for(vote_domain.clone())));
        let entry: Arc<dyn DynProvider> = Arc::new(Registered(Arc::clone(&provider)));

        if self
            .vote_providers
            .insert(vote_domain.clone(), Arc::clone(&entry))
            .is_some()
        {
            log::warn!("Replacing provider for vote domain '{vote_domain}'");
            self.content_providers
                .retain(|_, existing| existing.domain() != &vote_domain);
        }
        self.signals.disconnect_key(vote_domain.as_str());

        let sources = provider.rate_signals();
        for content_domain in content_domains {
            if let Some(previous) = self
                .content_providers
                .insert(content_domain.clone(), Arc::clone(&entry))
            {
                log::warn!(
                    "Content domain '{content_domain}' moves from '{}' to '{vote_domain}'",
                    previous.domain()
                );
            }
            for source in &sources {
                let target = Arc::clone(&entry);
                self.signals.connect(
                    source.clone(),
                    content_domain.clone(),
                    vote_domain.as_str(),
                    handler(move |event| target.on_source_deleted(event)),
                );
            }
        }

        log::debug!("Registered provider '{}' for '{vote_domain}'", provider.name());
        provider
    }

    /// Provider registered for `domain` as a vote domain.
    pub fn provider_for_vote(&self, domain: &Domain) -> Result<Arc<dyn DynProvider>> {
        self.vote_providers
            .get(domain)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no provider for vote domain '{domain}'")))
    }

    /// Provider registered for `domain` as a content domain.
    pub fn provider_for_content(&self, domain: &Domain) -> Result<Arc<dyn DynProvider>> {
        self.content_providers
            .get(domain)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no provider for content domain '{domain}'")))
    }

    /// Every vote provider, ordered by domain.
    pub fn vote_providers(&self) -> impl Iterator<Item = &Arc<dyn DynProvider>> {
        self.vote_providers.values()
    }

    /// The deletion signal table.
    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    /// The shared invalidation queue.
    pub fn tasks(&self) -> &Arc<dyn TaskQueue> {
        &self.tasks
    }

    /// Report that `object_id` in `domain` is being deleted.
    ///
    /// Returns how many providers scheduled invalidation.
    pub fn notify_deleted(
        &self,
        source: EventSource,
        domain: Domain,
        object_id: impl Into<String>,
    ) -> Result<usize> {
        let event = DeletionEvent::new(source, domain, object_id);
        log::debug!("Dispatching {:?} for {}", event.source, event.item());
        self.signals.send(&event)
    }

    /// Run `precompute(None)` on every vote provider in domain order.
    ///
    /// Stops at the first failure.
    pub async fn precompute_all(&self) -> Result<Vec<PrecomputeReport>> {
        let mut reports = Vec::with_capacity(self.vote_providers.len());
        for provider in self.vote_providers.values() {
            reports.push(provider.precompute(None).await?);
        }
        Ok(reports)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("storage", &self.storage.name())
            .field("tasks", &self.tasks.name())
            .field("vote_domains", &self.vote_providers.keys().collect::<Vec<_>>())
            .field(
                "content_domains",
                &self.content_providers.keys().collect::<Vec<_>>(),
            )
            .field("signals", &self.signals)
            .finish()
    }
}
