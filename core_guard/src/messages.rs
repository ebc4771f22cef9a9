//! Localised player-facing strings.

use std::collections::HashMap;

use thiserror::Error;

pub const BUILTIN_LANG: &str = include_str!("data/lang.json");

const SUPPORTED_LANGUAGES: &[&str] = &["en", "de"];
const FALLBACK_LANGUAGE: &str = "en";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse language catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Message table for one language.
///
/// Lookups that miss return the caller-supplied default, so a stale language
/// file degrades to English text instead of failing.
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    language: String,
    messages: HashMap<String, String>,
}

impl MessageCatalog {
    pub fn builtin(language: &str) -> Self {
        Self::from_json_str(BUILTIN_LANG, language).expect("builtin language catalog should parse")
    }

    pub fn from_json_str(json: &str, language: &str) -> Result<Self, CatalogError> {
        let mut tables: HashMap<String, HashMap<String, String>> = serde_json::from_str(json)?;
        let language = resolve_language(language);
        let messages = tables.remove(&language).unwrap_or_default();
        Ok(Self { language, messages })
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Raw message, color codes included.
    pub fn message(&self, path: &str, default: &str) -> String {
        self.messages
            .get(path)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Message with `{KEY}` placeholders substituted.
    pub fn render(&self, path: &str, default: &str, args: &[(&str, String)]) -> String {
        let mut text = self.message(path, default);
        for (key, value) in args {
            text = text.replace(&format!("{{{key}}}"), value);
        }
        text
    }

    /// Message stripped of color codes, for the server log.
    pub fn plain(&self, path: &str, default: &str, args: &[(&str, String)]) -> String {
        strip_color(&self.render(path, default, args))
    }

    /// The multi-line restart notice shown after configuration drift.
    pub fn restart_notice(&self) -> Vec<String> {
        const DEFAULTS: [&str; 6] = [
            "&c⚠══════════════════════════════════════⚠",
            "&6⚡ &ePerformance settings have been changed!",
            "&f➤ &7A &cserver restart &7is required",
            "&f➤ &7Do not just use &e/reload",
            "&f➤ &7Changes will only take effect after restart",
            "&c⚠══════════════════════════════════════⚠",
        ];
        DEFAULTS
            .iter()
            .enumerate()
            .map(|(idx, default)| self.message(&format!("config.broadcast.line{}", idx + 1), default))
            .collect()
    }
}

fn resolve_language(requested: &str) -> String {
    let requested = requested.trim().to_ascii_lowercase();
    if requested.is_empty() {
        return FALLBACK_LANGUAGE.to_string();
    }
    if SUPPORTED_LANGUAGES.contains(&requested.as_str()) {
        requested
    } else {
        tracing::warn!(
            target: "tick_guard::config",
            language = %requested,
            "language.unsupported=fallback_en"
        );
        FALLBACK_LANGUAGE.to_string()
    }
}

/// Remove `&x` color codes.
pub fn strip_color(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut chars = message.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '&' {
            if let Some(&code) = chars.peek() {
                if is_color_code(code) {
                    chars.next();
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

fn is_color_code(code: char) -> bool {
    matches!(code, '0'..='9' | 'a'..='f' | 'k'..='o' | 'r')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_serves_both_languages() {
        let en = MessageCatalog::builtin("en");
        let de = MessageCatalog::builtin("DE");
        assert_eq!(de.language(), "de");
        assert_ne!(
            en.message("cleanup.countdown.started", ""),
            de.message("cleanup.countdown.started", "")
        );
    }

    #[test]
    fn unsupported_language_falls_back_to_english() {
        let catalog = MessageCatalog::builtin("fr");
        assert_eq!(catalog.language(), "en");
        assert!(catalog
            .message("emergency.broadcast-warning", "")
            .contains("Server performance critical"));
    }

    #[test]
    fn missing_path_uses_default() {
        let catalog = MessageCatalog::builtin("en");
        assert_eq!(catalog.message("nope.nothing", "&cfallback"), "&cfallback");
    }

    #[test]
    fn render_substitutes_placeholders() {
        let catalog = MessageCatalog::default();
        let text = catalog.render(
            "cleanup.completed",
            "{ITEMS} items, {ORBS} orbs",
            &[("ITEMS", "4".to_string()), ("ORBS", "2".to_string())],
        );
        assert_eq!(text, "4 items, 2 orbs");
    }

    #[test]
    fn strip_color_only_drops_valid_codes() {
        assert_eq!(strip_color("&c⚠ &6Warning &z&"), "⚠ Warning &z&");
        assert_eq!(strip_color("&lBold&r plain"), "Bold plain");
    }

    #[test]
    fn restart_notice_has_six_lines() {
        let notice = MessageCatalog::builtin("de").restart_notice();
        assert_eq!(notice.len(), 6);
        assert!(notice[2].contains("Neustart"));
    }
}
