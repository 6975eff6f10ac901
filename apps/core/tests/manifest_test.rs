use std::path::Path;
use std::sync::Arc;

use waypoint_core::api::PublicApi;
use waypoint_core::fuzzy::SearchPrecision;
use waypoint_core::manifest::{discover_manifest_paths, load_manifest, ManifestError, ManifestSource};
use waypoint_core::mediator::ApiMediator;
use waypoint_core::model::{ActionContext, ModifierState, QueryInput};
use waypoint_core::presentation::{self, HeadlessSurface};
use waypoint_core::registry::{ProviderRegistry, ProviderSource};

const BOOKMARKS: &str = r#"{
  // JSON5: comments, unquoted keys and trailing commas are fine
  id: "bookmarks",
  name: "Bookmarks",
  action_keyword: "bm",
  icon_path: "icon.png",
  author: "waypoint",
  version: "1.2.0",
  items: [
    { title: "Rust Documentation", subtitle: "doc.rust-lang.org", open: "https://doc.rust-lang.org" },
    { title: "Crates Registry", subtitle: "crates.io", open: "https://crates.io" },
    { title: "   ", open: "ignored" },
  ],
}"#;

fn write_provider(root: &Path, dir: &str, body: &str) -> std::path::PathBuf {
    let dir = root.join(dir);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("plugin.json");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn loads_json5_manifest_with_items() {
    let root = tempfile::tempdir().unwrap();
    let path = write_provider(root.path(), "bookmarks", BOOKMARKS);

    let pair = load_manifest(&path, SearchPrecision::Regular).unwrap();

    assert_eq!(pair.metadata.id, "bookmarks");
    assert_eq!(pair.metadata.action_keyword, "bm");
    assert_eq!(pair.metadata.version, "1.2.0");
    assert_eq!(pair.metadata.provider_directory, root.path().join("bookmarks"));
    assert!(pair.metadata.icon_path.ends_with("icon.png"));
    assert!(Path::new(&pair.metadata.icon_path).is_absolute());
}

#[test]
fn manifest_provider_filters_items_by_search() {
    let root = tempfile::tempdir().unwrap();
    let path = write_provider(root.path(), "bookmarks", BOOKMARKS);
    let pair = load_manifest(&path, SearchPrecision::Regular).unwrap();

    let everything = pair
        .provider
        .query(&QueryInput::parse("bm ", |k| k == "bm"));
    assert_eq!(everything.len(), 2);

    let rust = pair
        .provider
        .query(&QueryInput::parse("bm rust", |k| k == "bm"));
    assert_eq!(rust.len(), 1);
    assert_eq!(rust[0].title, "Rust Documentation");
    assert!(rust[0].action.is_some());
}

#[test]
fn missing_keyword_defaults_to_global() {
    let root = tempfile::tempdir().unwrap();
    let path = write_provider(root.path(), "apps", r#"{ id: "apps", name: "Apps" }"#);

    let pair = load_manifest(&path, SearchPrecision::Regular).unwrap();

    assert!(pair.metadata.is_global());
}

#[test]
fn manifest_without_id_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let path = write_provider(root.path(), "nameless", r#"{ name: "Nameless" }"#);

    assert!(matches!(
        load_manifest(&path, SearchPrecision::Regular),
        Err(ManifestError::MissingField { field: "id", .. })
    ));
}

#[test]
fn malformed_manifest_is_a_parse_error() {
    let root = tempfile::tempdir().unwrap();
    let path = write_provider(root.path(), "broken", "{ id: ");

    assert!(matches!(
        load_manifest(&path, SearchPrecision::Regular),
        Err(ManifestError::Parse { .. })
    ));
}

#[test]
fn discovery_finds_manifests_one_level_down() {
    let root = tempfile::tempdir().unwrap();
    write_provider(root.path(), "b", r#"{ id: "b" }"#);
    write_provider(root.path(), "a", r#"{ id: "a" }"#);
    write_provider(&root.path().join("deep").join("er"), "c", r#"{ id: "c" }"#);

    let paths = discover_manifest_paths(root.path());

    assert_eq!(paths.len(), 2);
    assert!(paths[0].ends_with("a/plugin.json"));
    assert!(paths[1].ends_with("b/plugin.json"));
    assert!(discover_manifest_paths(&root.path().join("absent")).is_empty());
}

#[test]
fn source_reports_bad_manifests_as_warnings() {
    let root = tempfile::tempdir().unwrap();
    write_provider(root.path(), "bookmarks", BOOKMARKS);
    write_provider(root.path(), "broken", "not json");

    let source = ManifestSource::new(vec![root.path().to_path_buf()], SearchPrecision::Regular);
    let discovered = source.discover();

    assert_eq!(discovered.providers.len(), 1);
    assert_eq!(discovered.warnings.len(), 1);

    let registry = ProviderRegistry::new(vec![Box::new(source)]);
    let snapshot = registry.snapshot();
    assert!(snapshot.by_keyword("bm").is_some());
    assert_eq!(snapshot.warnings().len(), 1);
}

#[test]
fn failed_item_action_survives_a_full_queue() {
    let root = tempfile::tempdir().unwrap();
    let missing = root.path().join("nowhere").display().to_string().replace('\\', "/");
    let body = format!(r#"{{ id: "files", action_keyword: "f", items: [{{ title: "Gone", open: "{missing}" }}] }}"#);
    let path = write_provider(root.path(), "files", &body);
    let pair = load_manifest(&path, SearchPrecision::Regular).unwrap();
    let results = pair.provider.query(&QueryInput::parse("f gone", |k| k == "f"));
    assert_eq!(results.len(), 1);

    let (queue, mut presentation) = presentation::channel(1);
    let mediator = ApiMediator::builder(queue, Arc::new(ProviderRegistry::from_providers(Vec::new()))).build();
    mediator.show_app().unwrap();

    let context = ActionContext {
        api: &*mediator,
        modifiers: ModifierState::default(),
    };
    assert!(!results[0].invoke(&context));

    let mut surface = HeadlessSurface::default();
    assert_eq!(presentation.drain(&mut surface), 1);
    assert!(surface.messages().is_empty());
}
