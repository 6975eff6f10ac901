use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::api::PublicApi;
use crate::config::{self, Config, ConfigError, SettingsSaver, SharedConfig};
use crate::history_store::{self, HistorySaver, SharedHistory, StoreError, DEFAULT_HISTORY_CAPACITY};
use crate::host::ProcessRestarter;
use crate::i18n::{TranslationTable, Translator};
use crate::input_hook::InputHookBridge;
use crate::keyboard_hook::{self, HookError};
use crate::logging;
use crate::manifest::ManifestSource;
use crate::mediator::ApiMediator;
use crate::model::{ActionContext, ModifierState, ResultEntry};
use crate::presentation::{self, HeadlessSurface, PresentationLoop, PresentationQueue, QueueError};
use crate::registry::ProviderRegistry;
use crate::router::QueryRouter;
use crate::save::{NoopSaver, SaveReport, SaveSet, SaveTarget};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("{0}")]
    Usage(String),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("logging setup failed: {0}")]
    Logging(#[source] std::io::Error),
    #[error("history store error: {0}")]
    Store(#[from] StoreError),
    #[error("keyboard hook error: {0}")]
    Hook(#[from] HookError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub config_path: Option<PathBuf>,
    pub query: Option<String>,
    pub background: bool,
}

pub fn parse_cli_args(args: &[String]) -> Result<RuntimeOptions, RuntimeError> {
    let mut options = RuntimeOptions::default();
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| RuntimeError::Usage("--config requires a path".to_string()))?;
                options.config_path = Some(PathBuf::from(value));
            }
            "--query" => {
                let value = args
                    .next()
                    .ok_or_else(|| RuntimeError::Usage("--query requires text".to_string()))?;
                options.query = Some(value.clone());
            }
            "--background" => options.background = true,
            other => {
                return Err(RuntimeError::Usage(format!(
                    "unknown argument '{other}' (usage: waypoint-core [--config PATH] [--query TEXT] [--background])"
                )))
            }
        }
    }
    Ok(options)
}

pub struct Runtime {
    config: SharedConfig,
    queue: PresentationQueue,
    mediator: Arc<ApiMediator>,
    router: QueryRouter,
    history: SharedHistory,
}

impl Runtime {
    pub fn assemble(
        config: Config,
        restart_args: Vec<String>,
    ) -> Result<(Self, PresentationLoop), RuntimeError> {
        let precision = config.search_precision;
        let source = ManifestSource::new(config.provider_dirs.clone(), precision);
        let registry = Arc::new(ProviderRegistry::new(vec![Box::new(source)]));
        let (queue, presentation) = presentation::channel(config.presentation_queue_capacity);
        let history = history_store::load_shared(&config.history_db_path, DEFAULT_HISTORY_CAPACITY)?;
        let translator: Arc<dyn Translator> =
            Arc::new(TranslationTable::with_overrides(&config.language, &config.translations));
        let settings = config::shared(config.clone());

        let savers = SaveSet::new()
            .with(
                SaveTarget::PresentationState,
                Arc::new(HistorySaver::new(
                    SharedHistory::clone(&history),
                    config.history_db_path.clone(),
                )),
            )
            .with(SaveTarget::Settings, Arc::new(SettingsSaver::new(SharedConfig::clone(&settings))))
            .with(SaveTarget::ProviderRegistry, registry.clone())
            .with(SaveTarget::IconCache, Arc::new(NoopSaver))
            .with(SaveTarget::InputMethod, Arc::new(NoopSaver));

        let mediator = ApiMediator::builder(queue.clone(), Arc::clone(&registry))
            .translator(Arc::clone(&translator))
            .savers(savers)
            .restarter(Arc::new(ProcessRestarter::new(restart_args)))
            .bridge(Arc::new(InputHookBridge::new(config.keyboard_fan_out)))
            .build();

        let router = QueryRouter::new(
            registry,
            translator,
            precision,
            usize::from(config.max_results),
        );

        Ok((
            Self {
                config: settings,
                queue,
                mediator,
                router,
                history,
            },
            presentation,
        ))
    }

    pub fn settings(&self) -> &SharedConfig {
        &self.config
    }

    pub fn mediator(&self) -> &Arc<ApiMediator> {
        &self.mediator
    }

    pub fn history(&self) -> SharedHistory {
        SharedHistory::clone(&self.history)
    }

    pub fn router(&self) -> &QueryRouter {
        &self.router
    }

    pub fn query(&self, text: &str) -> Vec<ResultEntry> {
        let query = self.router.parse(text);
        self.router.dispatch(&query)
    }

    pub fn select(&self, results: &[ResultEntry], index: usize) -> Option<bool> {
        let entry = results.get(index)?;
        let context = ActionContext {
            api: self.mediator.as_ref(),
            modifiers: ModifierState::default(),
        };
        Some(entry.invoke(&context))
    }

    pub fn handle_line(&self, line: &str, current: &mut Vec<ResultEntry>) -> bool {
        let line = line.trim_end_matches(['\r', '\n']);
        match line.trim() {
            ":quit" => return false,
            ":reload" => {
                let count = self.mediator.reload_all_providers();
                println!("[waypoint-core] reloaded providers={count}");
            }
            ":save" => print_save_report(&self.mediator.save_all()),
            ":providers" => {
                for pair in self.mediator.get_all_providers() {
                    match serde_json::to_string(&pair.summary()) {
                        Ok(json) => println!("{json}"),
                        Err(error) => warn!(provider = %pair.metadata.id, "metadata not printable: {error}"),
                    }
                }
            }
            command if command.starts_with(":select") => {
                let index = command[":select".len()..].trim().parse::<usize>();
                match index.ok().and_then(|index| self.select(current, index)) {
                    Some(true) => {
                        if let Err(error) = self.mediator.hide_app() {
                            warn!("could not hide after selection: {error}");
                        }
                        println!("[waypoint-core] action completed");
                    }
                    Some(false) => println!("[waypoint-core] action kept window open"),
                    None => println!("[waypoint-core] no result at that index"),
                }
            }
            _ => {
                if let Err(error) = self.mediator.change_query(line, true) {
                    warn!("query not forwarded to presentation: {error}");
                }
                *current = self.query(line);
                print_results(current);
            }
        }
        true
    }
}

pub fn run_with_options(options: RuntimeOptions) -> Result<(), RuntimeError> {
    let config = config::load(options.config_path.as_deref())?;
    if !config.config_path.exists() {
        config::save(&config)?;
        println!(
            "[waypoint-core] wrote default config to {}",
            config.config_path.display()
        );
    }
    logging::init(&config).map_err(RuntimeError::Logging)?;
    info!(
        config_path = %config.config_path.display(),
        provider_dirs = config.provider_dirs.len(),
        precision = ?config.search_precision,
        "startup"
    );

    let restart_args: Vec<String> = std::env::args().skip(1).collect();
    let (runtime, presentation) = Runtime::assemble(config, restart_args)?;
    info!(
        indicator = %runtime.router().indicator_title(),
        providers = runtime.mediator().registry().snapshot().len(),
        "providers loaded"
    );

    if let Some(text) = options.query.as_deref() {
        print_results(&runtime.query(text));
        return Ok(());
    }

    run_interactive(Arc::new(runtime), presentation, options.background)
}

fn run_interactive(
    runtime: Arc<Runtime>,
    mut presentation: PresentationLoop,
    background: bool,
) -> Result<(), RuntimeError> {
    let mut hook = keyboard_hook::default_keyboard_hook();
    let bridge = Arc::clone(runtime.mediator.bridge());
    bridge.arm(hook.as_mut())?;

    if !background {
        if let Err(error) = runtime.mediator.show_app() {
            warn!("could not show window: {error}");
        }
    }

    let reader_runtime = Arc::clone(&runtime);
    std::thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            let mut current = Vec::new();
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if !reader_runtime.handle_line(&line, &mut current) {
                    break;
                }
            }
            request_shutdown(&reader_runtime.queue);
        })?;

    println!("[waypoint-core] event loop running (headless)");
    let mut surface = HeadlessSurface::new(runtime.history());
    let stats = presentation.run(&mut surface);
    info!(
        executed = stats.executed,
        faulted = stats.faulted,
        "presentation loop stopped"
    );

    if let Err(error) = bridge.disarm(hook.as_mut()) {
        warn!("keyboard hook did not uninstall cleanly: {error}");
    }
    print_save_report(&runtime.mediator.save_all());
    Ok(())
}

fn request_shutdown(queue: &PresentationQueue) {
    loop {
        match queue.shutdown() {
            Ok(()) | Err(QueueError::Disconnected) => return,
            Err(QueueError::Full) => std::thread::sleep(Duration::from_millis(10)),
        }
    }
}

fn print_results(results: &[ResultEntry]) {
    if results.is_empty() {
        println!("[waypoint-core] no results");
        return;
    }
    for (index, entry) in results.iter().enumerate() {
        println!(
            "{index:>3}  [{score:>3}] {title}  {subtitle}",
            score = entry.score,
            title = entry.title,
            subtitle = entry.subtitle
        );
    }
}

fn print_save_report(report: &SaveReport) {
    println!("[waypoint-core] saved={}", report.saved.len());
    for (target, reason) in &report.failed {
        println!("[waypoint-core] save failed target={target}: {reason}");
    }
}
