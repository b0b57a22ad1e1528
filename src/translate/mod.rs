// src/translate/mod.rs
//! Translation gateway: a capability trait with a network-backed OpenAI
//! implementation and a no-op passthrough used when credentials are absent.
//! The choice is made once at construction time so availability checks do
//! not leak into the pipeline.

pub mod openai;

use std::sync::Arc;

use tracing::info;

pub use openai::OpenAiTranslator;

/// Contract: return `(title_cn, summary_cn)`. A field for which an existing,
/// non-empty, distinct-from-source translation is supplied must be returned
/// unchanged without a remote call (per-field short-circuit). On any failure
/// the source text comes back, never an error.
#[async_trait::async_trait]
pub trait Translator: Send + Sync {
    async fn translate_news(
        &self,
        title: &str,
        summary: &str,
        existing_title_cn: Option<&str>,
        existing_summary_cn: Option<&str>,
    ) -> (String, String);

    fn name(&self) -> &'static str;
}

pub type DynTranslator = Arc<dyn Translator>;

/// A translation counts as usable only when non-empty and actually different
/// from its source text. Anything else is treated as "not translated yet".
pub fn usable_translation(source: &str, existing: Option<&str>) -> Option<String> {
    match existing {
        Some(t) if !t.trim().is_empty() && t != source => Some(t.to_string()),
        _ => None,
    }
}

/// Returns source text untouched (honoring the per-field short-circuit).
/// Selected when no API key is configured.
pub struct PassthroughTranslator;

#[async_trait::async_trait]
impl Translator for PassthroughTranslator {
    async fn translate_news(
        &self,
        title: &str,
        summary: &str,
        existing_title_cn: Option<&str>,
        existing_summary_cn: Option<&str>,
    ) -> (String, String) {
        let title_cn =
            usable_translation(title, existing_title_cn).unwrap_or_else(|| title.to_string());
        let summary_cn =
            usable_translation(summary, existing_summary_cn).unwrap_or_else(|| summary.to_string());
        (title_cn, summary_cn)
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

/// Deterministic translator for tests: prefixes the source text.
pub struct FixedTranslator {
    pub prefix: &'static str,
}

#[async_trait::async_trait]
impl Translator for FixedTranslator {
    async fn translate_news(
        &self,
        title: &str,
        summary: &str,
        existing_title_cn: Option<&str>,
        existing_summary_cn: Option<&str>,
    ) -> (String, String) {
        let title_cn = usable_translation(title, existing_title_cn)
            .unwrap_or_else(|| format!("{}{}", self.prefix, title));
        let summary_cn = usable_translation(summary, existing_summary_cn)
            .unwrap_or_else(|| format!("{}{}", self.prefix, summary));
        (title_cn, summary_cn)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Factory: network-backed translator when `OPENAI_API_KEY` is present,
/// passthrough otherwise.
pub fn build_translator(api_key: Option<String>) -> DynTranslator {
    match api_key.filter(|k| !k.trim().is_empty()) {
        Some(key) => {
            info!("translator: openai");
            Arc::new(OpenAiTranslator::new(key, None))
        }
        None => {
            info!("translator: passthrough (no OPENAI_API_KEY)");
            Arc::new(PassthroughTranslator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_translation_rejects_empty_and_source_echo() {
        assert_eq!(usable_translation("Title", None), None);
        assert_eq!(usable_translation("Title", Some("")), None);
        assert_eq!(usable_translation("Title", Some("   ")), None);
        assert_eq!(usable_translation("Title", Some("Title")), None);
        assert_eq!(
            usable_translation("Title", Some("標題")),
            Some("標題".to_string())
        );
    }

    #[tokio::test]
    async fn passthrough_honors_existing_translations() {
        let t = PassthroughTranslator;
        let (tc, sc) = t
            .translate_news("Title", "Summary", Some("標題"), None)
            .await;
        assert_eq!(tc, "標題");
        assert_eq!(sc, "Summary");
    }

    #[tokio::test]
    async fn fixed_translator_translates_missing_fields_only() {
        let t = FixedTranslator { prefix: "CN:" };
        let (tc, sc) = t
            .translate_news("Title", "Summary", None, Some("摘要"))
            .await;
        assert_eq!(tc, "CN:Title");
        assert_eq!(sc, "摘要");
    }
}
