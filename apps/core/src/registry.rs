use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::api::PublicApi;
use crate::manifest::ManifestError;
use crate::model::{ProviderMetadata, QueryInput};
use crate::provider::{InitContext, ProviderPair};
use crate::save::{SaveError, Saver};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("provider path does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("no provider source can load '{}'", .0.display())]
    Unsupported(PathBuf),
    #[error("provider id already registered: {0}")]
    DuplicateId(String),
    #[error("action keyword '{keyword}' is already used by provider '{owner}'")]
    KeywordInUse { keyword: String, owner: String },
    #[error("provider '{id}' failed to initialize: {message}")]
    Init { id: String, message: String },
}

#[derive(Debug, Default)]
pub struct DiscoveredProviders {
    pub providers: Vec<ProviderPair>,
    pub warnings: Vec<String>,
}

pub trait ProviderSource: Send + Sync {
    fn discover(&self) -> DiscoveredProviders;

    fn load(&self, directory: &Path) -> Result<ProviderPair, RegistryError> {
        Err(RegistryError::Unsupported(directory.to_path_buf()))
    }
}

pub struct StaticSource {
    providers: Vec<ProviderPair>,
}

impl StaticSource {
    pub fn new(providers: Vec<ProviderPair>) -> Self {
        Self { providers }
    }
}

impl ProviderSource for StaticSource {
    fn discover(&self) -> DiscoveredProviders {
        DiscoveredProviders {
            providers: self.providers.clone(),
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    providers: Vec<ProviderPair>,
    keyword_index: HashMap<String, usize>,
    warnings: Vec<String>,
}

impl RegistrySnapshot {
    pub fn build(generation: u64, discovered: DiscoveredProviders) -> Self {
        let mut warnings = discovered.warnings;
        let mut seen_ids = HashSet::new();
        let mut providers = Vec::with_capacity(discovered.providers.len());
        let mut keyword_index = HashMap::new();

        for mut pair in discovered.providers {
            if !seen_ids.insert(pair.metadata.id.clone()) {
                warnings.push(format!("duplicate provider id '{}' skipped", pair.metadata.id));
                continue;
            }

            if !pair.metadata.disabled && !pair.metadata.is_global() {
                let keyword = pair.metadata.action_keyword.clone();
                if let Some(&owner) = keyword_index.get(&keyword) {
                    let owner: &ProviderPair = &providers[owner];
                    warnings.push(format!(
                        "provider '{}' disabled: action keyword '{keyword}' already used by '{}'",
                        pair.metadata.id, owner.metadata.id
                    ));
                    pair.metadata.disabled = true;
                } else {
                    keyword_index.insert(keyword, providers.len());
                }
            }

            providers.push(pair);
        }

        Self {
            generation,
            providers,
            keyword_index,
            warnings,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn rebuild_keyword_index(&mut self) {
        self.keyword_index.clear();
        for (index, pair) in self.providers.iter().enumerate() {
            if pair.metadata.disabled || pair.metadata.is_global() {
                continue;
            }
            self.keyword_index
                .entry(pair.metadata.action_keyword.clone())
                .or_insert(index);
        }
    }

    pub fn providers(&self) -> &[ProviderPair] {
        &self.providers
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ProviderPair> {
        self.providers.iter().filter(|pair| !pair.metadata.disabled)
    }

    pub fn global_providers(&self) -> impl Iterator<Item = &ProviderPair> {
        self.enabled().filter(|pair| pair.metadata.is_global())
    }

    pub fn by_keyword(&self, keyword: &str) -> Option<&ProviderPair> {
        self.keyword_index
            .get(keyword)
            .map(|&index| &self.providers[index])
    }

    pub fn by_id(&self, id: &str) -> Option<&ProviderPair> {
        self.providers.iter().find(|pair| pair.metadata.id == id)
    }

    pub fn is_action_keyword(&self, keyword: &str) -> bool {
        self.keyword_index.contains_key(keyword)
    }

    pub fn parse_query(&self, raw: &str) -> QueryInput {
        QueryInput::parse(raw, |keyword| self.is_action_keyword(keyword))
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

thread_local! {
    static IN_PROVIDER_INIT: Cell<bool> = const { Cell::new(false) };
}

// Marks the current thread as running provider inits until dropped.
struct InitScope {
    outer: bool,
}

impl InitScope {
    fn enter() -> Self {
        Self {
            outer: IN_PROVIDER_INIT.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for InitScope {
    fn drop(&mut self) {
        IN_PROVIDER_INIT.with(|flag| flag.set(self.outer));
    }
}

fn in_provider_init() -> bool {
    IN_PROVIDER_INIT.with(Cell::get)
}

// Readers load the current snapshot without locking. Writers reserve a
// generation and build under the writer lock, run provider inits with the
// lock released, then publish unless a newer generation got there first.
pub struct ProviderRegistry {
    current: ArcSwap<RegistrySnapshot>,
    sources: Vec<Box<dyn ProviderSource>>,
    installed: Mutex<Vec<ProviderPair>>,
    // Last reserved generation.
    writer: Mutex<u64>,
    api: OnceLock<Weak<dyn PublicApi>>,
}

impl ProviderRegistry {
    pub fn new(sources: Vec<Box<dyn ProviderSource>>) -> Self {
        let registry = Self {
            current: ArcSwap::from_pointee(RegistrySnapshot::default()),
            sources,
            installed: Mutex::new(Vec::new()),
            writer: Mutex::new(0),
            api: OnceLock::new(),
        };
        registry.reload();
        registry
    }

    pub fn from_providers(providers: Vec<ProviderPair>) -> Self {
        Self::new(vec![Box::new(StaticSource::new(providers))])
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn initialize(&self, api: &Arc<dyn PublicApi>) {
        if self.api.set(Arc::downgrade(api)).is_err() {
            return;
        }
        self.reload();
    }

    /// A reload requested from inside a provider's `init` returns the current
    /// snapshot; the pass already running will publish fresh providers.
    pub fn reload(&self) -> Arc<RegistrySnapshot> {
        if in_provider_init() {
            debug!("reload requested during provider init ignored");
            return self.snapshot();
        }

        let mut snapshot = {
            let mut reserved = self.writer.lock();
            *reserved += 1;
            RegistrySnapshot::build(*reserved, self.discover_all())
        };

        self.init_all(&mut snapshot);
        for warning in snapshot.warnings() {
            warn!("{warning}");
        }

        let snapshot = self.publish(snapshot);
        info!(
            generation = snapshot.generation(),
            providers = snapshot.len(),
            "provider registry reloaded"
        );
        snapshot
    }

    fn discover_all(&self) -> DiscoveredProviders {
        let mut discovered = DiscoveredProviders::default();
        for source in &self.sources {
            let found = source.discover();
            discovered.providers.extend(found.providers);
            discovered.warnings.extend(found.warnings);
        }
        discovered
            .providers
            .extend(self.installed.lock().iter().cloned());
        discovered
    }

    pub fn install(&self, path: &Path) -> Result<ProviderMetadata, RegistryError> {
        if !path.exists() {
            return Err(RegistryError::NotFound(path.to_path_buf()));
        }

        let pair = self.load_from_sources(path)?;
        Self::check_conflicts(&self.snapshot(), &pair)?;
        if let Err(message) = self.init_provider(&pair) {
            return Err(RegistryError::Init {
                id: pair.metadata.id.clone(),
                message,
            });
        }

        let mut reserved = self.writer.lock();
        // Re-checked: another writer may have published while init ran.
        let current = self.snapshot();
        Self::check_conflicts(&current, &pair)?;

        *reserved += 1;
        self.installed.lock().push(pair.clone());
        let mut providers = current.providers().to_vec();
        providers.push(pair.clone());
        let snapshot = RegistrySnapshot::build(
            *reserved,
            DiscoveredProviders {
                providers,
                warnings: current.warnings().to_vec(),
            },
        );
        self.current.store(Arc::new(snapshot));
        drop(reserved);

        info!(provider = %pair.metadata.id, path = %path.display(), "provider installed");
        Ok(pair.metadata)
    }

    fn check_conflicts(current: &RegistrySnapshot, pair: &ProviderPair) -> Result<(), RegistryError> {
        if current.by_id(&pair.metadata.id).is_some() {
            return Err(RegistryError::DuplicateId(pair.metadata.id.clone()));
        }
        if !pair.metadata.disabled && !pair.metadata.is_global() {
            if let Some(owner) = current.by_keyword(&pair.metadata.action_keyword) {
                return Err(RegistryError::KeywordInUse {
                    keyword: pair.metadata.action_keyword.clone(),
                    owner: owner.metadata.id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn all_providers(&self) -> Vec<ProviderPair> {
        self.snapshot().providers().to_vec()
    }

    fn load_from_sources(&self, path: &Path) -> Result<ProviderPair, RegistryError> {
        let mut last_error = RegistryError::Unsupported(path.to_path_buf());
        for source in &self.sources {
            match source.load(path) {
                Ok(pair) => return Ok(pair),
                Err(RegistryError::Unsupported(_)) => {}
                Err(error) => last_error = error,
            }
        }
        Err(last_error)
    }

    fn init_all(&self, snapshot: &mut RegistrySnapshot) {
        for index in 0..snapshot.providers.len() {
            let pair = &snapshot.providers[index];
            if pair.metadata.disabled {
                continue;
            }
            if let Err(message) = self.init_provider(pair) {
                let id = pair.metadata.id.clone();
                warn!(provider = %id, "provider init failed: {message}");
                snapshot
                    .warnings
                    .push(format!("provider '{id}' disabled: {message}"));
                snapshot.providers[index].metadata.disabled = true;
            }
        }
        snapshot.rebuild_keyword_index();
    }

    // A snapshot older than the published one is dropped.
    fn publish(&self, snapshot: RegistrySnapshot) -> Arc<RegistrySnapshot> {
        let _reserved = self.writer.lock();
        let current = self.snapshot();
        if current.generation() > snapshot.generation() {
            debug!(
                stale = snapshot.generation(),
                current = current.generation(),
                "stale registry snapshot dropped"
            );
            return current;
        }
        let snapshot = Arc::new(snapshot);
        self.current.store(Arc::clone(&snapshot));
        snapshot
    }

    fn init_provider(&self, pair: &ProviderPair) -> Result<(), String> {
        let Some(api) = self.api.get().and_then(Weak::upgrade) else {
            return Ok(());
        };
        let context = InitContext {
            metadata: pair.metadata.clone(),
            api,
        };
        let _scope = InitScope::enter();
        match catch_unwind(AssertUnwindSafe(|| pair.provider.init(&context))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(error.to_string()),
            Err(_) => Err("init panicked".to_string()),
        }
    }
}

impl Saver for ProviderRegistry {
    fn save(&self) -> Result<(), SaveError> {
        let snapshot = self.snapshot();
        let mut failures = Vec::new();
        for pair in snapshot.providers() {
            let outcome = catch_unwind(AssertUnwindSafe(|| pair.provider.save()));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(error)) => failures.push(format!("{}: {error}", pair.metadata.id)),
                Err(_) => failures.push(format!("{}: save panicked", pair.metadata.id)),
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SaveError::Failed(failures.join("; ")))
        }
    }
}
