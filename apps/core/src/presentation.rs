use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};

use tracing::{debug, error};

use crate::history_store::{QueryHistory, SharedHistory};
use crate::model::{QueryInput, ResultEntry};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub title: String,
    pub subtitle: String,
    pub icon_path: String,
    pub owned_by_main_window: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowActivation {
    Created,
    Activated,
}

#[derive(Debug, Clone)]
pub struct ResultBatch {
    pub provider_id: String,
    pub query: QueryInput,
    pub results: Vec<ResultEntry>,
}

pub type UiTask = Box<dyn FnOnce(&mut dyn PresentationSurface) + Send>;

pub enum UiCommand {
    ChangeQuery { text: String, requery: bool },
    ShowMessage(Message),
    SetBusy(bool),
    SetVisible(bool),
    OpenWindow(WindowKind),
    UpdateResults(ResultBatch),
    Invoke(UiTask),
    Shutdown,
}

impl UiCommand {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ChangeQuery { .. } => "change_query",
            Self::ShowMessage(_) => "show_message",
            Self::SetBusy(_) => "set_busy",
            Self::SetVisible(_) => "set_visible",
            Self::OpenWindow(_) => "open_window",
            Self::UpdateResults(_) => "update_results",
            Self::Invoke(_) => "invoke",
            Self::Shutdown => "shutdown",
        }
    }
}

pub trait PresentationSurface {
    fn set_query(&mut self, text: &str, requery: bool);
    fn show_message(&mut self, message: &Message);
    fn set_busy(&mut self, busy: bool);
    fn set_visible(&mut self, visible: bool);
    fn open_window(&mut self, kind: WindowKind) -> WindowActivation;
    fn update_results(&mut self, batch: ResultBatch);
    fn confirm(&mut self, prompt: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("presentation queue is full")]
    Full,
    #[error("presentation loop has stopped")]
    Disconnected,
}

#[derive(Clone)]
pub struct PresentationQueue {
    tx: SyncSender<UiCommand>,
    capacity: usize,
}

impl PresentationQueue {
    /// Never blocks: a full queue is reported as `QueueError::Full`.
    pub fn enqueue(&self, command: UiCommand) -> Result<(), QueueError> {
        let label = command.label();
        self.tx.try_send(command).map_err(|error| match error {
            TrySendError::Full(_) => {
                debug!(command = label, "presentation queue full");
                QueueError::Full
            }
            TrySendError::Disconnected(_) => QueueError::Disconnected,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn shutdown(&self) -> Result<(), QueueError> {
        self.enqueue(UiCommand::Shutdown)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub executed: u64,
    pub faulted: u64,
}

pub struct PresentationLoop {
    rx: Receiver<UiCommand>,
    stats: LoopStats,
    stopped: bool,
}

pub fn channel(capacity: usize) -> (PresentationQueue, PresentationLoop) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::sync_channel(capacity);
    (
        PresentationQueue { tx, capacity },
        PresentationLoop {
            rx,
            stats: LoopStats::default(),
            stopped: false,
        },
    )
}

impl PresentationLoop {
    /// Blocks the calling thread, which becomes the presentation thread, until
    /// `Shutdown` arrives or every queue handle is dropped.
    pub fn run(&mut self, surface: &mut dyn PresentationSurface) -> LoopStats {
        while !self.stopped {
            match self.rx.recv() {
                Ok(command) => self.execute(surface, command),
                Err(_) => self.stopped = true,
            }
        }
        self.stats
    }

    pub fn drain(&mut self, surface: &mut dyn PresentationSurface) -> usize {
        let mut count = 0;
        while !self.stopped {
            match self.rx.try_recv() {
                Ok(command) => {
                    self.execute(surface, command);
                    count += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.stopped = true,
            }
        }
        count
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn execute(&mut self, surface: &mut dyn PresentationSurface, command: UiCommand) {
        let label = command.label();
        if matches!(command, UiCommand::Shutdown) {
            self.stopped = true;
            return;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| apply(surface, command)));
        self.stats.executed += 1;
        if outcome.is_err() {
            self.stats.faulted += 1;
            error!(command = label, "presentation command panicked");
        }
    }
}

fn apply(surface: &mut dyn PresentationSurface, command: UiCommand) {
    match command {
        UiCommand::ChangeQuery { text, requery } => surface.set_query(&text, requery),
        UiCommand::ShowMessage(message) => surface.show_message(&message),
        UiCommand::SetBusy(busy) => surface.set_busy(busy),
        UiCommand::SetVisible(visible) => surface.set_visible(visible),
        UiCommand::OpenWindow(kind) => {
            let activation = surface.open_window(kind);
            debug!(?kind, ?activation, "window opened");
        }
        UiCommand::UpdateResults(batch) => surface.update_results(batch),
        UiCommand::Invoke(task) => task(surface),
        UiCommand::Shutdown => {}
    }
}

#[derive(Debug, Default, Clone)]
pub struct SingletonWindows {
    open: HashMap<WindowKind, u32>,
}

impl SingletonWindows {
    pub fn open(&mut self, kind: WindowKind) -> WindowActivation {
        match self.open.get_mut(&kind) {
            Some(activations) => {
                *activations += 1;
                WindowActivation::Activated
            }
            None => {
                self.open.insert(kind, 0);
                WindowActivation::Created
            }
        }
    }

    pub fn close(&mut self, kind: WindowKind) -> bool {
        self.open.remove(&kind).is_some()
    }

    pub fn is_open(&self, kind: WindowKind) -> bool {
        self.open.contains_key(&kind)
    }

    pub fn activations(&self, kind: WindowKind) -> u32 {
        self.open.get(&kind).copied().unwrap_or(0)
    }

    pub fn instance_count(&self) -> usize {
        self.open.len()
    }
}

pub struct HeadlessSurface {
    query_text: String,
    requery_count: u64,
    history: SharedHistory,
    busy: bool,
    visible: bool,
    messages: Vec<Message>,
    windows: SingletonWindows,
    result_batches: Vec<ResultBatch>,
    approve_prompts: bool,
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self::new(SharedHistory::new(parking_lot::Mutex::new(QueryHistory::default())))
    }
}

impl HeadlessSurface {
    pub fn new(history: SharedHistory) -> Self {
        Self {
            query_text: String::new(),
            requery_count: 0,
            history,
            busy: false,
            visible: false,
            messages: Vec::new(),
            windows: SingletonWindows::default(),
            result_batches: Vec::new(),
            approve_prompts: true,
        }
    }

    pub fn set_approve_prompts(&mut self, approve: bool) {
        self.approve_prompts = approve;
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn requery_count(&self) -> u64 {
        self.requery_count
    }

    pub fn history(&self) -> SharedHistory {
        SharedHistory::clone(&self.history)
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn windows(&self) -> &SingletonWindows {
        &self.windows
    }

    pub fn result_batches(&self) -> &[ResultBatch] {
        &self.result_batches
    }
}

impl PresentationSurface for HeadlessSurface {
    fn set_query(&mut self, text: &str, requery: bool) {
        self.query_text = text.to_string();
        if requery {
            self.requery_count += 1;
            self.history.lock().record(text);
        }
    }

    fn show_message(&mut self, message: &Message) {
        self.messages.push(message.clone());
    }

    fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn open_window(&mut self, kind: WindowKind) -> WindowActivation {
        self.windows.open(kind)
    }

    fn update_results(&mut self, batch: ResultBatch) {
        self.result_batches.push(batch);
    }

    fn confirm(&mut self, _prompt: &str) -> bool {
        self.approve_prompts
    }
}

#[cfg(test)]
mod tests {
    use super::{SingletonWindows, WindowActivation, WindowKind};

    #[test]
    fn second_open_activates_existing_window() {
        let mut windows = SingletonWindows::default();
        assert_eq!(windows.open(WindowKind::Settings), WindowActivation::Created);
        assert_eq!(windows.open(WindowKind::Settings), WindowActivation::Activated);
        assert_eq!(windows.instance_count(), 1);
        assert_eq!(windows.activations(WindowKind::Settings), 1);
    }

    #[test]
    fn closed_window_is_created_again() {
        let mut windows = SingletonWindows::default();
        windows.open(WindowKind::Settings);
        assert!(windows.close(WindowKind::Settings));
        assert_eq!(windows.open(WindowKind::Settings), WindowActivation::Created);
    }
}
