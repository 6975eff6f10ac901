use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use waypoint_core::fuzzy::SearchPrecision;
use waypoint_core::i18n::TranslationTable;
use waypoint_core::mediator::ApiMediator;
use waypoint_core::model::{ActionContext, ModifierState, ProviderMetadata, QueryInput, ResultEntry};
use waypoint_core::presentation::{self, HeadlessSurface};
use waypoint_core::provider::{Provider, ProviderPair};
use waypoint_core::registry::{DiscoveredProviders, ProviderRegistry, ProviderSource};
use waypoint_core::router::{QueryRouter, INDICATOR_SCORE};

struct Answer {
    label: &'static str,
    score: i32,
}

impl Provider for Answer {
    fn query(&self, query: &QueryInput) -> Vec<ResultEntry> {
        vec![ResultEntry::new(
            &format!("{}: {}", self.label, query.search()),
            "",
            self.score,
        )]
    }
}

fn pair(id: &str, name: &str, keyword: &str, disabled: bool) -> ProviderPair {
    let mut metadata = ProviderMetadata::new(id, name, keyword);
    metadata.disabled = disabled;
    metadata.icon_path = format!("{id}.png");
    ProviderPair::new(
        metadata,
        Arc::new(Answer {
            label: "answer",
            score: 10,
        }),
    )
}

fn sample_registry() -> Arc<ProviderRegistry> {
    Arc::new(ProviderRegistry::from_providers(vec![
        pair("calc", "Calculator", "calc", false),
        pair("github", "GitHub", "gh", true),
        pair("weather", "Weather Forecast", "wt", false),
        pair("files", "Files", "*", false),
    ]))
}

fn router(registry: Arc<ProviderRegistry>) -> QueryRouter {
    QueryRouter::new(
        registry,
        Arc::new(TranslationTable::english()),
        SearchPrecision::Regular,
        20,
    )
}

#[test]
fn empty_query_lists_every_enabled_provider_once_in_registry_order() {
    let router = router(sample_registry());

    let results = router.resolve(&QueryInput::new(""));

    let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["calc", "wt"]);
    assert!(results.iter().all(|r| r.score == INDICATOR_SCORE));
}

#[test]
fn keyword_match_yields_templated_indicator_entry() {
    let router = router(sample_registry());

    let results = router.resolve(&QueryInput::new("calc"));

    assert_eq!(results.len(), 1);
    let entry = &results[0];
    assert_eq!(entry.title, "calc");
    assert_eq!(entry.subtitle, "Activate Calculator provider");
    assert_eq!(entry.score, 100);
    assert_eq!(entry.icon_path, "calc.png");
    assert_eq!(entry.auto_complete_text.as_deref(), Some("calc "));
    assert!(entry.provider_id.is_none());
}

#[test]
fn display_name_match_includes_provider() {
    let router = router(sample_registry());

    let results = router.resolve(&QueryInput::new("weather"));

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "wt");
}

#[test]
fn disabled_provider_is_excluded_even_on_exact_match() {
    let router = router(sample_registry());

    assert!(router.resolve(&QueryInput::new("gh")).is_empty());
    assert!(router.resolve(&QueryInput::new("github")).is_empty());
}

#[test]
fn no_match_and_empty_registry_yield_empty_results() {
    let router_with_providers = router(sample_registry());
    assert!(router_with_providers
        .resolve(&QueryInput::new("zzzz"))
        .is_empty());

    let empty = router(Arc::new(ProviderRegistry::from_providers(Vec::new())));
    assert!(empty.resolve(&QueryInput::new("")).is_empty());
    assert!(empty.resolve(&QueryInput::new("calc")).is_empty());
}

#[test]
fn indicator_action_drills_into_namespace_without_closing() {
    let registry = sample_registry();
    let (queue, mut presentation) = presentation::channel(16);
    let mediator = ApiMediator::builder(queue, Arc::clone(&registry)).build();
    let router = router(registry);
    let mut surface = HeadlessSurface::default();

    let results = router.resolve(&QueryInput::new("calc"));
    let context = ActionContext {
        api: mediator.as_ref(),
        modifiers: ModifierState::default(),
    };

    assert!(!results[0].invoke(&context));
    assert_eq!(presentation.drain(&mut surface), 1);
    assert_eq!(surface.query_text(), "calc ");
    assert_eq!(surface.requery_count(), 0);
    assert!(surface.history().lock().is_empty());
}

#[test]
fn keyword_namespace_routes_only_to_its_provider() {
    let router = router(sample_registry());

    let query = router.parse("calc 1+2");
    assert_eq!(query.action_keyword(), Some("calc"));

    let results = router.dispatch(&query);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "answer: 1+2");
}

#[test]
fn disabled_keyword_does_not_open_a_namespace() {
    let router = router(sample_registry());

    let query = router.parse("gh issues");
    assert_eq!(query.action_keyword(), None);

    let results = router.dispatch(&query);
    let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["answer: gh issues"]);
}

#[test]
fn global_query_ranks_indicators_ahead_of_global_results() {
    let router = router(sample_registry());

    let results = router.dispatch(&router.parse("calc"));

    let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["calc", "answer: calc"]);
    assert!(results.iter().all(|r| r.provider_id.is_none()));
}

#[test]
fn dispatch_truncates_to_max_results() {
    let providers: Vec<ProviderPair> = (0..30)
        .map(|i| pair(&format!("p{i}"), &format!("Provider {i}"), &format!("k{i}"), false))
        .collect();
    let router = QueryRouter::new(
        Arc::new(ProviderRegistry::from_providers(providers)),
        Arc::new(TranslationTable::english()),
        SearchPrecision::Regular,
        5,
    );

    let results = router.dispatch(&router.parse(""));
    let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["k0", "k1", "k2", "k3", "k4"]);
}

#[test]
fn indicator_describes_itself_through_translator() {
    let router = router(sample_registry());
    assert_eq!(router.indicator_title(), "Provider Indicator");
    assert!(router.indicator_description().contains("action keywords"));
}

struct Tagged {
    batch: u64,
}

impl Provider for Tagged {
    fn query(&self, _query: &QueryInput) -> Vec<ResultEntry> {
        vec![ResultEntry::new(&format!("batch-{}", self.batch), "", 10)]
    }
}

// Each discovery pass names every provider after the same batch number.
struct BatchSource {
    batch: AtomicU64,
}

impl ProviderSource for BatchSource {
    fn discover(&self) -> DiscoveredProviders {
        let batch = self.batch.fetch_add(1, Ordering::SeqCst);
        let mut providers: Vec<ProviderPair> = (0..6)
            .map(|i| {
                ProviderPair::new(
                    ProviderMetadata::new(&format!("p{i}"), &format!("batch-{batch}"), &format!("k{i}")),
                    Arc::new(Tagged { batch }),
                )
            })
            .collect();
        providers.push(ProviderPair::new(
            ProviderMetadata::new("everywhere", "Everywhere", "*"),
            Arc::new(Tagged { batch }),
        ));
        DiscoveredProviders {
            providers,
            warnings: Vec::new(),
        }
    }
}

fn batch_tag(entry: &ResultEntry) -> String {
    if entry.score == INDICATOR_SCORE {
        entry
            .subtitle
            .trim_start_matches("Activate ")
            .trim_end_matches(" provider")
            .to_string()
    } else {
        entry.title.clone()
    }
}

#[test]
fn dispatch_during_reloads_answers_from_one_generation() {
    let registry = Arc::new(ProviderRegistry::new(vec![Box::new(BatchSource {
        batch: AtomicU64::new(0),
    })]));
    let router = Arc::new(router(Arc::clone(&registry)));
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let router = Arc::clone(&router);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let mut checked = 0_u64;
                while !done.load(Ordering::SeqCst) || checked == 0 {
                    let results = router.dispatch(&QueryInput::new(""));
                    assert_eq!(results.len(), 7);
                    let first = batch_tag(&results[0]);
                    assert!(first.starts_with("batch-"));
                    assert!(results.iter().all(|entry| batch_tag(entry) == first));
                    checked += 1;
                }
                checked
            })
        })
        .collect();

    for _ in 0..50 {
        registry.reload();
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
}
