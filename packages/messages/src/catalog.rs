//! Embedded translation catalogs.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::Deserialize;

use crate::{Locale, Message};

const JA_TOML: &str = include_str!("../i18n/ja.toml");

#[derive(Debug, Default, Deserialize)]
struct Catalog {
    #[serde(default)]
    messages: BTreeMap<String, String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

static JA: LazyLock<Catalog> = LazyLock::new(|| {
    toml::de::from_str(JA_TOML).unwrap_or_else(|e| {
        log::error!("Failed to parse embedded ja catalog: {e}");
        Catalog::default()
    })
});

fn catalog(locale: Locale) -> Option<&'static Catalog> {
    match locale {
        Locale::En => None,
        Locale::Ja => Some(&*JA),
    }
}

pub fn message(locale: Locale, message: Message) -> Option<&'static str> {
    catalog(locale)?
        .messages
        .get(message.key())
        .map(String::as_str)
}

pub fn label(locale: Locale, text: &str) -> Option<&'static str> {
    catalog(locale)?.labels.get(text).map(String::as_str)
}
