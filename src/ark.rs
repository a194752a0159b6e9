//! Doubao chat client (Volcengine Ark, OpenAI-compatible) that cleans up a
//! transcript, summarizes it and proposes a title.

use crate::config::ArkConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

const CORRECT_PROMPT: &str = "你是一个专业的中文文字校对助手。请对以下语音转写文字进行纠错：修正错别字、同音字和不通顺的语句。保持原意和风格，只做必要的修改。直接输出纠正后的文字，不要添加任何说明。";
const SUMMARY_PROMPT: &str = "你是一个内容摘要助手。请为以下文字写一段简洁的摘要，条理清晰地概括核心要点，控制在 200 字以内。直接输出摘要内容，不要加任何前缀。";
const TITLE_PROMPT: &str = "你是一个标题生成助手。请根据以下文字内容生成一个简洁准确的中文标题，10 到 25 个字，概括核心主题，不要加书名号或引号。直接输出标题。";
const CONTINUE_PROMPT: &str = "继续，从中断处接着输出，不要重复已经输出的内容。";

const TITLE_INPUT_CHARS: usize = 2000;
const TITLE_QUOTES: &[char] = &['"', '\'', '“', '”', '‘', '’', '《', '》', '【', '】'];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request to chat service failed: {0}")]
    Request(#[from] minreq::Error),
    #[error("chat service returned HTTP {status}: {body}")]
    StatusNotOk { status: i32, body: String },
    #[error("chat service error: {0}")]
    Api(String),
    #[error("chat service returned no text")]
    NoTextInResponse,
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub corrected_text: String,
    pub summary: String,
    /// Empty when title generation failed; the rest of the result still stands.
    pub title: String,
}

pub struct ArkClient {
    config: ArkConfig,
}

impl ArkClient {
    pub fn new(config: ArkConfig) -> Self {
        Self { config }
    }

    /// Corrects the transcript, summarizes the corrected text and titles it.
    pub fn process(&self, raw_text: &str) -> Result<Processed> {
        let corrected_text = self.correct(raw_text)?;
        let summary = self.summarize(&corrected_text)?;
        let title = self.generate_title(&corrected_text).unwrap_or_else(|e| {
            warn!(error = %e, "title generation failed");
            String::new()
        });

        info!(
            raw_chars = raw_text.chars().count(),
            corrected_chars = corrected_text.chars().count(),
            summary_chars = summary.chars().count(),
            "transcript processed"
        );
        Ok(Processed { corrected_text, summary, title })
    }

    pub fn correct(&self, raw_text: &str) -> Result<String> {
        self.chat(CORRECT_PROMPT, raw_text, 4096)
    }

    pub fn summarize(&self, text: &str) -> Result<String> {
        self.chat(SUMMARY_PROMPT, text, 10000)
    }

    pub fn generate_title(&self, text: &str) -> Result<String> {
        let head: String = text.chars().take(TITLE_INPUT_CHARS).collect();
        let title = self.chat(TITLE_PROMPT, &head, 100)?;
        Ok(title.trim().trim_matches(TITLE_QUOTES).trim().to_string())
    }

    /// One chat exchange. A reply cut off by the token limit is extended with
    /// continuation turns, up to `max_continuations` extra calls.
    fn chat(&self, system_prompt: &str, user_content: &str, max_tokens: u32) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut messages = vec![
            Message { role: "system", content: system_prompt.to_string() },
            Message { role: "user", content: user_content.to_string() },
        ];

        let mut accumulated = String::new();
        let mut turns = 0u32;
        loop {
            turns += 1;
            let body = json!({
                "model": self.config.model,
                "messages": messages,
                "max_tokens": max_tokens,
            });

            let response = minreq::post(&url)
                .with_header("Authorization", format!("Bearer {}", self.config.api_key))
                .with_timeout(self.config.timeout_secs)
                .with_json(&body)?
                .send()?;

            if response.status_code < 200 || response.status_code > 299 {
                let body = response.as_str().unwrap_or("").to_string();
                error!(status = response.status_code, body = %body, "chat request failed");
                return Err(Error::StatusNotOk { status: response.status_code, body });
            }

            let reply: ChatResponse = response.json()?;
            if let Some(err) = reply.error {
                return Err(Error::Api(err.to_string()));
            }

            let choice = reply.choices.into_iter().next().ok_or(Error::NoTextInResponse)?;
            let chunk = choice
                .message
                .and_then(|m| m.content)
                .filter(|s| !s.trim().is_empty())
                .ok_or(Error::NoTextInResponse)?;
            accumulated.push_str(&chunk);

            let truncated = choice.finish_reason.as_deref() == Some("length");
            if !truncated || turns > self.config.max_continuations {
                break;
            }

            messages.push(Message { role: "assistant", content: chunk });
            messages.push(Message { role: "user", content: CONTINUE_PROMPT.to_string() });
        }

        Ok(accumulated.trim().to_string())
    }
}
