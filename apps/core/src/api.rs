use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

use crate::fuzzy::MatchResult;
use crate::host::{HostError, UpdateStatus};
use crate::input_hook::{KeyboardHandler, SubscriptionId};
use crate::model::{ProviderMetadata, QueryInput, ResultEntry};
use crate::presentation::QueueError;
use crate::provider::ProviderPair;
use crate::registry::RegistryError;
use crate::save::SaveReport;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("state was not fully saved: {0}")]
    Save(String),
    #[error("declined by user")]
    Declined,
    #[error("operation did not complete in time")]
    Timeout,
    #[error("operation was dropped before completing")]
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Inline,
    Presentation,
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOperation {
    ChangeQuery,
    RestartApp,
    CheckForUpdate,
    SaveAll,
    ReloadProviders,
    ShowMessage,
    OpenSettings,
    StartLoadingBar,
    StopLoadingBar,
    ShowApp,
    HideApp,
    InstallProvider,
    GetTranslation,
    GetAllProviders,
    PushResults,
    FuzzySearch,
    SubscribeKeyboard,
}

impl ApiOperation {
    pub fn dispatch(self) -> Dispatch {
        match self {
            Self::ChangeQuery
            | Self::ShowMessage
            | Self::OpenSettings
            | Self::StartLoadingBar
            | Self::StopLoadingBar
            | Self::ShowApp
            | Self::HideApp
            | Self::InstallProvider => Dispatch::Presentation,
            Self::CheckForUpdate | Self::PushResults => Dispatch::Background,
            Self::RestartApp
            | Self::SaveAll
            | Self::ReloadProviders
            | Self::GetTranslation
            | Self::GetAllProviders
            | Self::FuzzySearch
            | Self::SubscribeKeyboard => Dispatch::Inline,
        }
    }
}

pub struct Completion<T> {
    rx: Receiver<Result<T, ApiError>>,
}

pub(crate) struct Completer<T> {
    tx: SyncSender<Result<T, ApiError>>,
}

impl<T> Completer<T> {
    pub(crate) fn complete(self, result: Result<T, ApiError>) {
        let _ = self.tx.send(result);
    }
}

impl<T> Completion<T> {
    pub(crate) fn pending() -> (Completer<T>, Self) {
        let (tx, rx) = mpsc::sync_channel(1);
        (Completer { tx }, Self { rx })
    }

    pub fn ready(result: Result<T, ApiError>) -> Self {
        let (completer, completion) = Self::pending();
        completer.complete(result);
        completion
    }

    pub fn wait(self, timeout: Duration) -> Result<T, ApiError> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ApiError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(ApiError::Abandoned),
        }
    }
}

pub trait PublicApi: Send + Sync {
    fn change_query(&self, query: &str, requery: bool) -> Result<(), ApiError>;

    fn restart_app(&self) -> Result<(), ApiError>;

    fn check_for_update(&self) -> Completion<UpdateStatus>;

    fn save_all(&self) -> SaveReport;

    fn reload_all_providers(&self) -> usize;

    fn show_msg(
        &self,
        title: &str,
        subtitle: &str,
        icon_path: &str,
        use_main_window_as_owner: bool,
    ) -> Result<(), ApiError>;

    fn open_setting_dialog(&self) -> Result<(), ApiError>;

    fn start_loading_bar(&self) -> Result<(), ApiError>;

    fn stop_loading_bar(&self) -> Result<(), ApiError>;

    fn show_app(&self) -> Result<(), ApiError>;

    fn hide_app(&self) -> Result<(), ApiError>;

    fn install_provider(&self, path: &Path) -> Completion<ProviderMetadata>;

    fn get_translation(&self, key: &str) -> String;

    fn get_all_providers(&self) -> Vec<ProviderPair>;

    #[deprecated(note = "return results from `Provider::query` instead")]
    fn push_results(&self, query: &QueryInput, provider: &ProviderMetadata, results: Vec<ResultEntry>);

    fn fuzzy_search(&self, query: &str, candidate: &str) -> MatchResult;

    fn subscribe_keyboard(&self, handler: KeyboardHandler) -> SubscriptionId;

    fn unsubscribe_keyboard(&self, id: SubscriptionId) -> bool;
}
