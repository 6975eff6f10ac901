use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::fuzzy::{self, SearchPrecision};
use crate::i18n::{
    format_template, Translator, INDICATOR_PROVIDER_DESCRIPTION, INDICATOR_PROVIDER_NAME,
    INDICATOR_RESULT_SUBTITLE,
};
use crate::model::{QueryInput, ResultEntry, TERM_SEPARATOR};
use crate::provider::ProviderPair;
use crate::registry::{ProviderRegistry, RegistrySnapshot};

pub const INDICATOR_SCORE: i32 = 100;

pub struct QueryRouter {
    registry: Arc<ProviderRegistry>,
    translator: Arc<dyn Translator>,
    precision: SearchPrecision,
    max_results: usize,
}

impl QueryRouter {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        translator: Arc<dyn Translator>,
        precision: SearchPrecision,
        max_results: usize,
    ) -> Self {
        Self {
            registry,
            translator,
            precision,
            max_results: max_results.max(1),
        }
    }

    pub fn indicator_title(&self) -> String {
        self.translator.translate(INDICATOR_PROVIDER_NAME)
    }

    pub fn indicator_description(&self) -> String {
        self.translator.translate(INDICATOR_PROVIDER_DESCRIPTION)
    }

    pub fn parse(&self, raw: &str) -> QueryInput {
        self.registry.snapshot().parse_query(raw)
    }

    pub fn resolve(&self, query: &QueryInput) -> Vec<ResultEntry> {
        let snapshot = self.registry.snapshot();
        self.resolve_in(&snapshot, query)
    }

    pub fn dispatch(&self, query: &QueryInput) -> Vec<ResultEntry> {
        let snapshot = self.registry.snapshot();

        let mut results = match query.action_keyword() {
            Some(keyword) => match snapshot.by_keyword(keyword) {
                Some(pair) => query_provider(pair, query),
                None => Vec::new(),
            },
            None => {
                let mut results = self.resolve_in(&snapshot, query);
                for pair in snapshot.global_providers() {
                    results.extend(query_provider(pair, query));
                }
                results
            }
        };

        results.sort_by(|a, b| b.score.cmp(&a.score));
        results.truncate(self.max_results);
        results
    }

    fn resolve_in(&self, snapshot: &RegistrySnapshot, query: &QueryInput) -> Vec<ResultEntry> {
        let search = query.search();
        let template = self.translator.translate(INDICATOR_RESULT_SUBTITLE);

        snapshot
            .enabled()
            .filter(|pair| !pair.metadata.is_global())
            .filter(|pair| {
                search.is_empty()
                    || fuzzy::score(search, &pair.metadata.action_keyword).meets(self.precision)
                    || fuzzy::score(search, &pair.metadata.name).meets(self.precision)
            })
            .map(|pair| {
                let keyword = pair.metadata.action_keyword.clone();
                let namespace = format!("{keyword}{TERM_SEPARATOR}");
                let mut entry = ResultEntry::new(
                    &keyword,
                    &format_template(&template, &[&pair.metadata.name]),
                    INDICATOR_SCORE,
                );
                entry.icon_path = pair.metadata.icon_path.clone();
                entry.auto_complete_text = Some(namespace.clone());
                entry.with_action(move |context| {
                    if let Err(error) = context.api.change_query(&namespace, false) {
                        warn!(keyword = %namespace.trim_end(), "indicator could not change query: {error}");
                    }
                    false
                })
            })
            .collect()
    }
}

fn query_provider(pair: &ProviderPair, query: &QueryInput) -> Vec<ResultEntry> {
    match catch_unwind(AssertUnwindSafe(|| pair.provider.query(query))) {
        Ok(results) => results,
        Err(_) => {
            warn!(provider = %pair.metadata.id, "provider query panicked");
            Vec::new()
        }
    }
}
