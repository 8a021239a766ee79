//! Dérivation des noms depuis les tags (`name`, `name:<lang>`, `alt_name`, `old_name`)

use std::fmt;
use std::sync::OnceLock;

use osmhist::Tags;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::config::PrimaryLanguage;

/// Nature d'un nom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameKind {
    Official,
    Alternate,
    Historical,
}

impl NameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NameKind::Official => "official",
            NameKind::Alternate => "alternate",
            NameKind::Historical => "historical",
        }
    }
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Langue indéterminée (ISO 639-3)
pub const UNDETERMINED: &str = "und";
const DEFAULT_SCRIPT: &str = "Latn";

/// Suffixe de tag → (code ISO 639-3, écriture ISO 15924)
const LANGUAGES: &[(&str, &str, &str)] = &[
    ("uk", "ukr", "Cyrl"),
    ("ru", "rus", "Cyrl"),
    ("en", "eng", "Latn"),
    ("de", "deu", "Latn"),
    ("pl", "pol", "Latn"),
    ("fr", "fra", "Latn"),
    ("el", "ell", "Grek"),
    ("be", "bel", "Cyrl"),
    ("crh", "crh", "Latn"),
];

/// Nom prêt à être chargé
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedName {
    pub text: String,
    pub normalized: String,
    pub language: String,
    pub script: String,
    pub kind: NameKind,
    /// Clé OSM d'origine
    pub tag_key: String,
}

fn name_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(name|alt_name|old_name)(?::([a-z]{2,3}))?$").expect("static regex")
    })
}

/// Analyse une clé de tag: nature du nom et suffixe de langue éventuel
pub fn parse_name_key(key: &str) -> Option<(NameKind, Option<&str>)> {
    let caps = name_key_pattern().captures(key)?;
    let kind = match caps.get(1)?.as_str() {
        "name" => NameKind::Official,
        "alt_name" => NameKind::Alternate,
        _ => NameKind::Historical,
    };
    Some((kind, caps.get(2).map(|m| m.as_str())))
}

/// Langue et écriture d'un suffixe (`und`/`Latn` si inconnu)
pub fn language_for_suffix(suffix: &str) -> (&'static str, &'static str) {
    LANGUAGES
        .iter()
        .find(|(s, _, _)| *s == suffix)
        .map(|(_, lang, script)| (*lang, *script))
        .unwrap_or((UNDETERMINED, DEFAULT_SCRIPT))
}

/// Langue d'un `name` sans suffixe.
///
/// Pour une zone ukrainophone, un texte portant des lettres propres au russe
/// et aucune lettre propre à l'ukrainien est attribué au russe.
fn language_for_plain(text: &str, primary: &PrimaryLanguage) -> (String, String) {
    if primary.language == "ukr" {
        let lower = text.to_lowercase();
        let russian_only = lower.chars().any(|c| matches!(c, 'ы' | 'э' | 'ъ' | 'ё'));
        let ukrainian_only = lower.chars().any(|c| matches!(c, 'і' | 'ї' | 'є' | 'ґ'));
        if russian_only && !ukrainian_only {
            return ("rus".into(), "Cyrl".into());
        }
    }
    (primary.language.clone(), primary.script.clone())
}

/// Forme de recherche: NFKC, minuscules, espaces compactés
pub fn normalize_name(value: &str) -> String {
    value
        .nfkc()
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extrait les noms d'un jeu de tags.
///
/// Un seul nom par couple (langue, nature): une clé suffixée l'emporte sur
/// `name` seul, puis l'ordre alphabétique des clés départage.
pub fn derive_names(tags: &Tags, primary: &PrimaryLanguage) -> Vec<DerivedName> {
    let mut names: Vec<(bool, DerivedName)> = Vec::new();

    for (key, value) in tags {
        let Some((kind, suffix)) = parse_name_key(key) else {
            continue;
        };
        let text = value.trim();
        if text.is_empty() {
            continue;
        }

        let (language, script) = match suffix {
            Some(suffix) => {
                let (lang, script) = language_for_suffix(suffix);
                (lang.to_string(), script.to_string())
            }
            None => language_for_plain(text, primary),
        };

        names.push((
            suffix.is_none(),
            DerivedName {
                text: text.to_string(),
                normalized: normalize_name(text),
                language,
                script,
                kind,
                tag_key: key.clone(),
            },
        ));
    }

    names.sort_by(|(a_plain, a), (b_plain, b)| {
        (a.kind, &a.language, a_plain).cmp(&(b.kind, &b.language, b_plain))
    });
    names.dedup_by(|(_, later), (_, kept)| later.kind == kept.kind && later.language == kept.language);
    names.into_iter().map(|(_, name)| name).collect()
}

/// Vrai si les tags portent au moins un nom exploitable
pub fn has_name(tags: &Tags) -> bool {
    tags.iter()
        .any(|(k, v)| !v.trim().is_empty() && parse_name_key(k).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_name_key() {
        assert_eq!(parse_name_key("name"), Some((NameKind::Official, None)));
        assert_eq!(parse_name_key("name:uk"), Some((NameKind::Official, Some("uk"))));
        assert_eq!(parse_name_key("alt_name:ru"), Some((NameKind::Alternate, Some("ru"))));
        assert_eq!(parse_name_key("old_name"), Some((NameKind::Historical, None)));
        assert_eq!(parse_name_key("name:etymology"), None);
        assert_eq!(parse_name_key("short_name"), None);
        assert_eq!(parse_name_key("highway"), None);
    }

    #[test]
    fn test_language_table() {
        assert_eq!(language_for_suffix("uk"), ("ukr", "Cyrl"));
        assert_eq!(language_for_suffix("ru"), ("rus", "Cyrl"));
        assert_eq!(language_for_suffix("en"), ("eng", "Latn"));
        assert_eq!(language_for_suffix("ka"), (UNDETERMINED, "Latn"));
    }

    #[test]
    fn test_plain_name_uses_primary_language() {
        let names = derive_names(&tags(&[("name", "Foo")]), &PrimaryLanguage::default());
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].language, "ukr");
        assert_eq!(names[0].script, "Cyrl");
        assert_eq!(names[0].kind, NameKind::Official);
        assert_eq!(names[0].tag_key, "name");
    }

    #[test]
    fn test_plain_name_russian_letters() {
        let primary = PrimaryLanguage::default();

        let russian = derive_names(&tags(&[("name", "Театральный сквер")]), &primary);
        assert_eq!(russian[0].language, "rus");

        let ukrainian = derive_names(&tags(&[("name", "Театральний сквер")]), &primary);
        assert_eq!(ukrainian[0].language, "ukr");

        let mixed = derive_names(&tags(&[("name", "Київський бульвар ы")]), &primary);
        assert_eq!(mixed[0].language, "ukr");
    }

    #[test]
    fn test_suffixed_key_wins_over_plain() {
        let names = derive_names(
            &tags(&[
                ("name", "Маріуполь"),
                ("name:uk", "Маріуполь (uk)"),
                ("name:ru", "Мариуполь"),
                ("name:en", "Mariupol"),
                ("old_name", "Жданов"),
                ("name:note", "ignored"),
                ("alt_name:en", "  "),
            ]),
            &PrimaryLanguage::default(),
        );

        let summary: Vec<(&str, &str, &str)> = names
            .iter()
            .map(|n| (n.kind.as_str(), n.language.as_str(), n.text.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("official", "eng", "Mariupol"),
                ("official", "rus", "Мариуполь"),
                ("official", "ukr", "Маріуполь (uk)"),
                ("historical", "ukr", "Жданов"),
            ]
        );
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Проспект   Миру "), "проспект миру");
        assert_eq!(normalize_name("ﬁeld\tstreet"), "field street");
    }

    #[test]
    fn test_has_name() {
        assert!(has_name(&tags(&[("name:en", "Foo")])));
        assert!(!has_name(&tags(&[("name", " ")])));
        assert!(!has_name(&tags(&[("highway", "primary")])));
    }
}
