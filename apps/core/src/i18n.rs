use std::collections::HashMap;

use tracing::warn;

pub const INDICATOR_RESULT_SUBTITLE: &str = "indicator_result_subtitle";
pub const INDICATOR_PROVIDER_NAME: &str = "indicator_provider_name";
pub const INDICATOR_PROVIDER_DESCRIPTION: &str = "indicator_provider_description";
pub const INSTALL_PROMPT: &str = "install_provider_prompt";
pub const INSTALL_FAILED_TITLE: &str = "install_provider_failed";

const ENGLISH: &[(&str, &str)] = &[
    (INDICATOR_RESULT_SUBTITLE, "Activate {0} provider"),
    (INDICATOR_PROVIDER_NAME, "Provider Indicator"),
    (
        INDICATOR_PROVIDER_DESCRIPTION,
        "Lists the action keywords of every enabled provider",
    ),
    (INSTALL_PROMPT, "Install provider {0}?"),
    (INSTALL_FAILED_TITLE, "Provider install failed"),
];

const GERMAN: &[(&str, &str)] = &[
    (INDICATOR_RESULT_SUBTITLE, "Anbieter {0} aktivieren"),
    (INDICATOR_PROVIDER_NAME, "Anbieter-Indikator"),
    (
        INDICATOR_PROVIDER_DESCRIPTION,
        "Listet die Schlüsselwörter aller aktiven Anbieter auf",
    ),
    (INSTALL_PROMPT, "Anbieter {0} installieren?"),
    (INSTALL_FAILED_TITLE, "Installation des Anbieters fehlgeschlagen"),
];

fn builtin(language: &str) -> Option<&'static [(&'static str, &'static str)]> {
    match language.trim().to_ascii_lowercase().as_str() {
        "en" => Some(ENGLISH),
        "de" => Some(GERMAN),
        _ => None,
    }
}

pub trait Translator: Send + Sync {
    fn translate(&self, key: &str) -> String;
}

#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    entries: HashMap<String, String>,
}

impl TranslationTable {
    pub fn english() -> Self {
        Self {
            entries: ENGLISH
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    pub fn with_overrides(language: &str, overrides: &HashMap<String, String>) -> Self {
        let mut table = Self::english();
        match builtin(language) {
            Some(entries) => table.layer(entries),
            None => warn!(language, "no built-in translations, using English"),
        }
        for (key, value) in overrides {
            table.entries.insert(key.clone(), value.clone());
        }
        table
    }

    fn layer(&mut self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.entries.insert(key.to_string(), value.to_string());
        }
    }
}

impl Translator for TranslationTable {
    fn translate(&self, key: &str) -> String {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| format!("No translation for key {key}"))
    }
}

// Placeholders inside arguments are not expanded.
pub fn format_template(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let arg = tail.find('}').and_then(|close| {
            let index = tail[..close].parse::<usize>().ok()?;
            Some((close, *args.get(index)?))
        });
        match arg {
            Some((close, arg)) => {
                out.push_str(arg);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}
