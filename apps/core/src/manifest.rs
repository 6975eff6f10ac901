use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::fuzzy::{self, SearchPrecision};
use crate::model::{ActionContext, ProviderMetadata, QueryInput, ResultEntry};
use crate::provider::{Provider, ProviderPair};
use crate::registry::{DiscoveredProviders, ProviderSource, RegistryError};

pub const MANIFEST_FILE_NAME: &str = "plugin.json";
const ITEM_BASE_SCORE: i32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("read failed for '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("manifest '{}' is missing required field '{field}'", path.display())]
    MissingField { path: PathBuf, field: &'static str },
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ProviderManifest {
    id: String,
    name: String,
    action_keyword: String,
    disabled: bool,
    icon_path: String,
    description: String,
    author: String,
    version: String,
    items: Vec<ManifestItem>,
}

impl Default for ProviderManifest {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            action_keyword: crate::model::GLOBAL_ACTION_KEYWORD.to_string(),
            disabled: false,
            icon_path: String::new(),
            description: String::new(),
            author: String::new(),
            version: String::new(),
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct ManifestItem {
    title: String,
    subtitle: String,
    icon_path: String,
    #[serde(rename = "type")]
    action_type: String,
    open: String,
    command: String,
    args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemActionKind {
    OpenPath { path: String },
    Command { command: String, args: Vec<String> },
}

#[derive(Debug, Clone)]
struct StaticItem {
    title: String,
    subtitle: String,
    icon_path: String,
    kind: ItemActionKind,
}

pub struct ManifestProvider {
    items: Vec<StaticItem>,
    precision: SearchPrecision,
}

impl ManifestProvider {
    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

impl Provider for ManifestProvider {
    fn query(&self, query: &QueryInput) -> Vec<ResultEntry> {
        let search = query.search();
        self.items
            .iter()
            .filter_map(|item| {
                let score = if search.is_empty() {
                    ITEM_BASE_SCORE
                } else {
                    let title = fuzzy::score(search, &item.title);
                    let subtitle = fuzzy::score(search, &item.subtitle);
                    let best = title.score.max(subtitle.score);
                    if !(title.meets(self.precision) || subtitle.meets(self.precision)) {
                        return None;
                    }
                    best as i32
                };
                let kind = item.kind.clone();
                let title = item.title.clone();
                let mut entry = ResultEntry::new(&item.title, &item.subtitle, score)
                    .with_action(move |context| run_item_action(context, &title, &kind));
                entry.icon_path = item.icon_path.clone();
                Some(entry)
            })
            .collect()
    }
}

fn run_item_action(context: &ActionContext<'_>, title: &str, kind: &ItemActionKind) -> bool {
    let spawned = match kind {
        ItemActionKind::OpenPath { path } => open_path(path),
        ItemActionKind::Command { command, args } => Command::new(command)
            .args(args)
            .spawn()
            .map(|_| ())
            .map_err(|error| format!("failed to run '{command}': {error}")),
    };

    match spawned {
        Ok(()) => true,
        Err(message) => {
            warn!(item = title, "item action failed: {message}");
            if let Err(error) = context.api.show_msg(title, &message, "", true) {
                warn!(item = title, "item failure not shown: {error}");
            }
            false
        }
    }
}

fn open_path(path: &str) -> Result<(), String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err("empty path".to_string());
    }
    if !trimmed.contains("://") && !Path::new(trimmed).exists() {
        return Err(format!("path does not exist: {trimmed}"));
    }

    #[cfg(target_os = "windows")]
    let mut command = {
        let mut command = Command::new("cmd");
        command.arg("/C").arg("start").arg("").arg(trimmed);
        command
    };
    #[cfg(target_os = "macos")]
    let mut command = {
        let mut command = Command::new("open");
        command.arg(trimmed);
        command
    };
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let mut command = {
        let mut command = Command::new("xdg-open");
        command.arg(trimmed);
        command
    };

    command
        .spawn()
        .map(|_| ())
        .map_err(|error| format!("failed to open '{trimmed}': {error}"))
}

pub fn load_manifest(
    path: &Path,
    precision: SearchPrecision,
) -> Result<ProviderPair, ManifestError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest: ProviderManifest =
        json5::from_str(&raw).map_err(|error| ManifestError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;

    let id = manifest.id.trim();
    if id.is_empty() {
        return Err(ManifestError::MissingField {
            path: path.to_path_buf(),
            field: "id",
        });
    }
    let name = if manifest.name.trim().is_empty() {
        id.to_string()
    } else {
        manifest.name.trim().to_string()
    };

    let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let metadata = ProviderMetadata {
        id: id.to_string(),
        name,
        action_keyword: manifest.action_keyword.trim().to_string(),
        disabled: manifest.disabled,
        icon_path: resolve_icon(&directory, &manifest.icon_path),
        provider_directory: directory.clone(),
        description: manifest.description,
        author: manifest.author,
        version: manifest.version,
    };

    let items = manifest
        .items
        .into_iter()
        .filter_map(|item| static_item(&directory, item))
        .collect();

    Ok(ProviderPair::new(
        metadata,
        Arc::new(ManifestProvider { items, precision }),
    ))
}

fn static_item(directory: &Path, item: ManifestItem) -> Option<StaticItem> {
    let title = item.title.trim();
    if title.is_empty() {
        return None;
    }
    Some(StaticItem {
        title: title.to_string(),
        subtitle: item.subtitle.trim().to_string(),
        icon_path: resolve_icon(directory, &item.icon_path),
        kind: parse_action_kind(&item),
    })
}

fn parse_action_kind(item: &ManifestItem) -> ItemActionKind {
    if item.action_type.trim().eq_ignore_ascii_case("command") {
        return ItemActionKind::Command {
            command: item.command.trim().to_string(),
            args: item.args.clone(),
        };
    }
    ItemActionKind::OpenPath {
        path: item.open.trim().to_string(),
    }
}

fn resolve_icon(directory: &Path, icon: &str) -> String {
    let icon = icon.trim();
    if icon.is_empty() || icon.contains("://") || Path::new(icon).is_absolute() {
        return icon.to_string();
    }
    directory.join(icon).to_string_lossy().into_owned()
}

pub fn discover_manifest_paths(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    if !root.is_dir() {
        return Vec::new();
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(2)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE_NAME)
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();
    paths
}

pub struct ManifestSource {
    roots: Vec<PathBuf>,
    precision: SearchPrecision,
}

impl ManifestSource {
    pub fn new(roots: Vec<PathBuf>, precision: SearchPrecision) -> Self {
        Self { roots, precision }
    }
}

impl ProviderSource for ManifestSource {
    fn discover(&self) -> DiscoveredProviders {
        let mut discovered = DiscoveredProviders::default();
        for root in &self.roots {
            for manifest_path in discover_manifest_paths(root) {
                match load_manifest(&manifest_path, self.precision) {
                    Ok(pair) => {
                        debug!(provider = %pair.metadata.id, path = %manifest_path.display(), "manifest loaded");
                        discovered.providers.push(pair);
                    }
                    Err(error) => discovered.warnings.push(error.to_string()),
                }
            }
        }
        discovered
    }

    fn load(&self, directory: &Path) -> Result<ProviderPair, RegistryError> {
        let manifest_path = if directory.is_file() {
            directory.to_path_buf()
        } else {
            directory.join(MANIFEST_FILE_NAME)
        };
        load_manifest(&manifest_path, self.precision).map_err(RegistryError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_action_kind, ItemActionKind, ManifestItem};

    #[test]
    fn parses_command_action_kind() {
        let item = ManifestItem {
            action_type: "command".to_string(),
            command: "cmd".to_string(),
            args: vec!["/C".to_string(), "echo".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            parse_action_kind(&item),
            ItemActionKind::Command { .. }
        ));
    }

    #[test]
    fn defaults_to_open_path() {
        let item = ManifestItem {
            open: " https://example.com ".to_string(),
            ..Default::default()
        };
        assert_eq!(
            parse_action_kind(&item),
            ItemActionKind::OpenPath {
                path: "https://example.com".to_string()
            }
        );
    }
}
