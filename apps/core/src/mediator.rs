use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{ApiError, ApiOperation, Completion, Dispatch, PublicApi};
use crate::fuzzy::{self, MatchResult};
use crate::host::{HostError, Restarter, UpdateStatus, Updater};
use crate::i18n::{format_template, Translator, INSTALL_FAILED_TITLE, INSTALL_PROMPT};
use crate::input_hook::{InputHookBridge, KeyboardHandler, SubscriptionId};
use crate::model::{ProviderMetadata, QueryInput, ResultEntry};
use crate::presentation::{Message, PresentationQueue, ResultBatch, UiCommand, UiTask, WindowKind};
use crate::provider::ProviderPair;
use crate::registry::ProviderRegistry;
use crate::save::{SaveReport, SaveSet};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PushStats {
    pub dispatched: u64,
    pub delivered: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct PushCounters {
    dispatched: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

pub struct MediatorBuilder {
    queue: PresentationQueue,
    registry: Arc<ProviderRegistry>,
    translator: Option<Arc<dyn Translator>>,
    savers: SaveSet,
    updater: Option<Arc<dyn Updater>>,
    restarter: Option<Arc<dyn Restarter>>,
    bridge: Option<Arc<InputHookBridge>>,
}

impl MediatorBuilder {
    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn savers(mut self, savers: SaveSet) -> Self {
        self.savers = savers;
        self
    }

    pub fn updater(mut self, updater: Arc<dyn Updater>) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn restarter(mut self, restarter: Arc<dyn Restarter>) -> Self {
        self.restarter = Some(restarter);
        self
    }

    pub fn bridge(mut self, bridge: Arc<InputHookBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn build(self) -> Arc<ApiMediator> {
        let mediator = Arc::new(ApiMediator {
            queue: self.queue,
            registry: self.registry,
            translator: self
                .translator
                .unwrap_or_else(|| Arc::new(crate::i18n::TranslationTable::english())),
            savers: self.savers,
            updater: self
                .updater
                .unwrap_or_else(|| Arc::new(crate::host::DisabledUpdater)),
            restarter: self.restarter,
            bridge: self.bridge.unwrap_or_default(),
            push: Arc::new(PushCounters::default()),
        });
        let api: Arc<dyn PublicApi> = mediator.clone();
        mediator.registry.initialize(&api);
        mediator
    }
}

pub struct ApiMediator {
    queue: PresentationQueue,
    registry: Arc<ProviderRegistry>,
    translator: Arc<dyn Translator>,
    savers: SaveSet,
    updater: Arc<dyn Updater>,
    restarter: Option<Arc<dyn Restarter>>,
    bridge: Arc<InputHookBridge>,
    push: Arc<PushCounters>,
}

impl ApiMediator {
    pub fn builder(queue: PresentationQueue, registry: Arc<ProviderRegistry>) -> MediatorBuilder {
        MediatorBuilder {
            queue,
            registry,
            translator: None,
            savers: SaveSet::new(),
            updater: None,
            restarter: None,
            bridge: None,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn bridge(&self) -> &Arc<InputHookBridge> {
        &self.bridge
    }

    pub fn translator(&self) -> &Arc<dyn Translator> {
        &self.translator
    }

    pub fn push_stats(&self) -> PushStats {
        PushStats {
            dispatched: self.push.dispatched.load(Ordering::Relaxed),
            delivered: self.push.delivered.load(Ordering::Relaxed),
            dropped: self.push.dropped.load(Ordering::Relaxed),
        }
    }

    fn marshal(&self, operation: ApiOperation, command: UiCommand) -> Result<(), ApiError> {
        debug_assert_eq!(operation.dispatch(), Dispatch::Presentation);
        self.queue.enqueue(command).map_err(|error| {
            warn!(?operation, "marshal failed: {error}");
            ApiError::from(error)
        })
    }
}

impl PublicApi for ApiMediator {
    fn change_query(&self, query: &str, requery: bool) -> Result<(), ApiError> {
        self.marshal(
            ApiOperation::ChangeQuery,
            UiCommand::ChangeQuery {
                text: query.to_string(),
                requery,
            },
        )
    }

    fn restart_app(&self) -> Result<(), ApiError> {
        if let Err(error) = self.hide_app() {
            warn!("restart could not hide the window: {error}");
        }

        // Restarting replaces the process without a graceful shutdown.
        let report = self.save_all();
        if !report.is_complete() {
            warn!(failed = report.failed.len(), "restarting with unsaved state");
        }

        let restarter = self
            .restarter
            .as_ref()
            .ok_or_else(|| HostError::Restart("no restarter configured".to_string()))?;
        restarter.restart()?;
        Ok(())
    }

    fn check_for_update(&self) -> Completion<UpdateStatus> {
        let (completer, completion) = Completion::pending();
        let updater = Arc::clone(&self.updater);
        let spawned = std::thread::Builder::new()
            .name("update-check".to_string())
            .spawn(move || {
                let result = updater.check().map_err(ApiError::from);
                if let Err(error) = &result {
                    warn!("{error}");
                }
                completer.complete(result);
            });
        match spawned {
            Ok(_) => completion,
            Err(error) => Completion::ready(Err(ApiError::from(HostError::Update(format!(
                "failed to spawn update check: {error}"
            ))))),
        }
    }

    fn save_all(&self) -> SaveReport {
        self.savers.save_all()
    }

    fn reload_all_providers(&self) -> usize {
        self.registry.reload().len()
    }

    fn show_msg(
        &self,
        title: &str,
        subtitle: &str,
        icon_path: &str,
        use_main_window_as_owner: bool,
    ) -> Result<(), ApiError> {
        self.marshal(
            ApiOperation::ShowMessage,
            UiCommand::ShowMessage(Message {
                title: title.to_string(),
                subtitle: subtitle.to_string(),
                icon_path: icon_path.to_string(),
                owned_by_main_window: use_main_window_as_owner,
            }),
        )
    }

    fn open_setting_dialog(&self) -> Result<(), ApiError> {
        self.marshal(
            ApiOperation::OpenSettings,
            UiCommand::OpenWindow(WindowKind::Settings),
        )
    }

    fn start_loading_bar(&self) -> Result<(), ApiError> {
        self.marshal(ApiOperation::StartLoadingBar, UiCommand::SetBusy(true))
    }

    fn stop_loading_bar(&self) -> Result<(), ApiError> {
        self.marshal(ApiOperation::StopLoadingBar, UiCommand::SetBusy(false))
    }

    fn show_app(&self) -> Result<(), ApiError> {
        self.marshal(ApiOperation::ShowApp, UiCommand::SetVisible(true))
    }

    fn hide_app(&self) -> Result<(), ApiError> {
        self.marshal(ApiOperation::HideApp, UiCommand::SetVisible(false))
    }

    fn install_provider(&self, path: &Path) -> Completion<ProviderMetadata> {
        let (completer, completion) = Completion::pending();
        let registry = Arc::clone(&self.registry);
        let translator = Arc::clone(&self.translator);
        let path = path.to_path_buf();

        let task: UiTask = Box::new(move |surface| {
            let display = path.display().to_string();
            let prompt = format_template(&translator.translate(INSTALL_PROMPT), &[&display]);
            if !surface.confirm(&prompt) {
                completer.complete(Err(ApiError::Declined));
                return;
            }

            let result = registry.install(&path).map_err(ApiError::from);
            match &result {
                Ok(metadata) => info!(provider = %metadata.id, "install accepted"),
                Err(error) => surface.show_message(&Message {
                    title: translator.translate(INSTALL_FAILED_TITLE),
                    subtitle: error.to_string(),
                    icon_path: String::new(),
                    owned_by_main_window: true,
                }),
            }
            completer.complete(result);
        });

        match self.marshal(ApiOperation::InstallProvider, UiCommand::Invoke(task)) {
            Ok(()) => completion,
            Err(error) => Completion::ready(Err(error)),
        }
    }

    fn get_translation(&self, key: &str) -> String {
        self.translator.translate(key)
    }

    fn get_all_providers(&self) -> Vec<ProviderPair> {
        self.registry.all_providers()
    }

    fn push_results(
        &self,
        query: &QueryInput,
        provider: &ProviderMetadata,
        mut results: Vec<ResultEntry>,
    ) {
        for result in &mut results {
            result.provider_id = Some(provider.id.clone());
            result.provider_directory = Some(provider.provider_directory.clone());
            result.origin_query = Some(query.clone());
        }
        let batch = ResultBatch {
            provider_id: provider.id.clone(),
            query: query.clone(),
            results,
        };
        self.push.dispatched.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = mpsc::sync_channel::<ResultBatch>(1);
        if tx.try_send(batch).is_err() {
            self.push.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        drop(tx);

        let queue = self.queue.clone();
        let counters = Arc::clone(&self.push);
        let provider_id = provider.id.clone();
        let spawned = std::thread::Builder::new()
            .name("result-push".to_string())
            .spawn(move || {
                for batch in rx {
                    match queue.enqueue(UiCommand::UpdateResults(batch)) {
                        Ok(()) => {
                            counters.delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(error) => {
                            counters.dropped.fetch_add(1, Ordering::Relaxed);
                            warn!(provider = %provider_id, "pushed results dropped: {error}");
                        }
                    }
                }
            });
        if let Err(error) = spawned {
            self.push.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(provider = %provider.id, "failed to spawn result push: {error}");
        }
    }

    fn fuzzy_search(&self, query: &str, candidate: &str) -> MatchResult {
        fuzzy::score(query, candidate)
    }

    fn subscribe_keyboard(&self, handler: KeyboardHandler) -> SubscriptionId {
        self.bridge.subscribe(handler)
    }

    fn unsubscribe_keyboard(&self, id: SubscriptionId) -> bool {
        self.bridge.unsubscribe(id)
    }
}
