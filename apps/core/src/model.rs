use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::PublicApi;

pub const TERM_SEPARATOR: &str = " ";
pub const GLOBAL_ACTION_KEYWORD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub id: String,
    pub name: String,
    pub action_keyword: String,
    pub disabled: bool,
    pub icon_path: String,
    pub provider_directory: PathBuf,
    pub description: String,
    pub author: String,
    pub version: String,
}

impl ProviderMetadata {
    pub fn new(id: &str, name: &str, action_keyword: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            action_keyword: action_keyword.to_string(),
            disabled: false,
            icon_path: String::new(),
            provider_directory: PathBuf::new(),
            description: String::new(),
            author: String::new(),
            version: String::new(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.action_keyword.trim().is_empty() || self.action_keyword == GLOBAL_ACTION_KEYWORD
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryInput {
    raw: String,
    action_keyword: Option<String>,
    search: String,
    terms: Vec<String>,
}

impl QueryInput {
    pub fn new(raw: &str) -> Self {
        let terms = split_terms(raw);
        Self {
            raw: raw.to_string(),
            action_keyword: None,
            search: raw.trim().to_string(),
            terms,
        }
    }

    /// Splits off the first term as an action keyword when `is_keyword` accepts it
    /// and the separator follows it. A bare keyword stays a global query.
    pub fn parse(raw: &str, is_keyword: impl Fn(&str) -> bool) -> Self {
        let trimmed_start = raw.trim_start();
        let Some((first, rest)) = trimmed_start.split_once(TERM_SEPARATOR) else {
            return Self::new(raw);
        };
        if first.is_empty() || !is_keyword(first) {
            return Self::new(raw);
        }

        Self {
            raw: raw.to_string(),
            action_keyword: Some(first.to_string()),
            search: rest.trim().to_string(),
            terms: split_terms(raw),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn action_keyword(&self) -> Option<&str> {
        self.action_keyword.as_deref()
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.search.is_empty()
    }
}

fn split_terms(raw: &str) -> Vec<String> {
    raw.split(TERM_SEPARATOR)
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct ActionContext<'a> {
    pub api: &'a dyn PublicApi,
    pub modifiers: ModifierState,
}

pub type ResultAction = Arc<dyn Fn(&ActionContext<'_>) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct ResultEntry {
    pub title: String,
    pub subtitle: String,
    pub score: i32,
    pub icon_path: String,
    pub auto_complete_text: Option<String>,
    pub action: Option<ResultAction>,
    pub provider_id: Option<String>,
    pub provider_directory: Option<PathBuf>,
    pub origin_query: Option<QueryInput>,
}

impl ResultEntry {
    pub fn new(title: &str, subtitle: &str, score: i32) -> Self {
        Self {
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            score,
            ..Default::default()
        }
    }

    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&ActionContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn invoke(&self, context: &ActionContext<'_>) -> bool {
        match &self.action {
            Some(action) => action(context),
            None => false,
        }
    }
}

impl fmt::Debug for ResultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultEntry")
            .field("title", &self.title)
            .field("subtitle", &self.subtitle)
            .field("score", &self.score)
            .field("icon_path", &self.icon_path)
            .field("auto_complete_text", &self.auto_complete_text)
            .field("has_action", &self.action.is_some())
            .field("provider_id", &self.provider_id)
            .field("provider_directory", &self.provider_directory)
            .field("origin_query", &self.origin_query.as_ref().map(QueryInput::raw))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTransition {
    KeyDown,
    KeyUp,
    SysKeyDown,
    SysKeyUp,
}

impl KeyTransition {
    pub fn from_message(message: u32) -> Option<Self> {
        match message {
            0x0100 => Some(Self::KeyDown),
            0x0101 => Some(Self::KeyUp),
            0x0104 => Some(Self::SysKeyDown),
            0x0105 => Some(Self::SysKeyUp),
            _ => None,
        }
    }

    pub fn message(self) -> u32 {
        match self {
            Self::KeyDown => 0x0100,
            Self::KeyUp => 0x0101,
            Self::SysKeyDown => 0x0104,
            Self::SysKeyUp => 0x0105,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ModifierState {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub win: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub transition: KeyTransition,
    pub key_code: u32,
    pub modifiers: ModifierState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Swallow,
}

impl Verdict {
    pub fn from_allow(allow: bool) -> Self {
        if allow {
            Self::Allow
        } else {
            Self::Swallow
        }
    }

    pub fn allows(self) -> bool {
        self == Self::Allow
    }
}

pub fn normalize_for_search(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}
