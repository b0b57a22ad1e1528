// src/translate/openai.rs
//! OpenAI-backed news translation (Traditional Chinese). The model is asked
//! for a JSON object so partial prompts (title-only / summary-only) stay
//! unambiguous; any parse or transport failure falls back to source text.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{usable_translation, Translator};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_BOTH: &str = "你是一個專業金融新聞翻譯員。請將以下英文新聞翻譯成繁體中文。\n請以JSON格式輸出：{\"title_cn\": \"翻譯後標題\", \"summary_cn\": \"翻譯後摘要\"}\n只輸出JSON，不要其他內容。";
const SYSTEM_TITLE_ONLY: &str = "你是一個專業金融新聞翻譯員。請將以下英文標題翻譯成繁體中文。\n請以JSON格式輸出：{\"title_cn\": \"翻譯後標題\"}\n只輸出JSON，不要其他內容。";
const SYSTEM_SUMMARY_ONLY: &str = "你是一個專業金融新聞翻譯員。請將以下英文摘要翻譯成繁體中文。\n請以JSON格式輸出：{\"summary_cn\": \"翻譯後摘要\"}\n只輸出JSON，不要其他內容。";

pub struct OpenAiTranslator {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiTranslator {
    /// `model_override`: pass Some("gpt-4o") to override; defaults to gpt-4o-mini.
    pub fn new(api_key: String, model_override: Option<&str>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: model_override.unwrap_or(DEFAULT_MODEL).to_string(),
        }
    }

    async fn chat(&self, system: &str, user: &str) -> Option<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.3,
            max_tokens: 1500,
        };

        let resp = self
            .http
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "translation call rejected");
            return None;
        }
        let body: Resp = resp.json().await.ok()?;
        body.choices.into_iter().next().map(|c| c.message.content)
    }
}

/// Pull the first JSON object out of a model reply that may carry stray
/// prose or code fences around it.
fn extract_json(reply: &str) -> Option<serde_json::Value> {
    static RE: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re = RE.get_or_init(|| regex::Regex::new(r"(?s)\{.*\}").unwrap());
    let m = re.find(reply)?;
    serde_json::from_str(m.as_str()).ok()
}

#[async_trait::async_trait]
impl Translator for OpenAiTranslator {
    async fn translate_news(
        &self,
        title: &str,
        summary: &str,
        existing_title_cn: Option<&str>,
        existing_summary_cn: Option<&str>,
    ) -> (String, String) {
        let have_title = usable_translation(title, existing_title_cn);
        let have_summary = usable_translation(summary, existing_summary_cn);

        // Both already translated: no call at all.
        if let (Some(t), Some(s)) = (&have_title, &have_summary) {
            return (t.clone(), s.clone());
        }

        let (system, user) = match (&have_title, &have_summary) {
            (Some(_), None) => (SYSTEM_SUMMARY_ONLY, format!("摘要: {summary}")),
            (None, Some(_)) => (SYSTEM_TITLE_ONLY, format!("標題: {title}")),
            _ => (SYSTEM_BOTH, format!("標題: {title}\n\n摘要: {summary}")),
        };

        let parsed = match self.chat(system, &user).await {
            Some(reply) => extract_json(&reply),
            None => None,
        };

        let field = |parsed: &Option<serde_json::Value>, key: &str, fallback: &str| {
            parsed
                .as_ref()
                .and_then(|v| v.get(key))
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| fallback.to_string())
        };

        let title_cn = have_title.unwrap_or_else(|| field(&parsed, "title_cn", title));
        let summary_cn = have_summary.unwrap_or_else(|| field(&parsed, "summary_cn", summary));
        (title_cn, summary_cn)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_tolerates_fenced_replies() {
        let reply = "```json\n{\"title_cn\": \"標題\", \"summary_cn\": \"摘要\"}\n```";
        let v = extract_json(reply).expect("json inside fences");
        assert_eq!(v["title_cn"], "標題");
    }

    #[test]
    fn extract_json_none_on_prose() {
        assert!(extract_json("sorry, I cannot do that").is_none());
    }
}
