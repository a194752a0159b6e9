//! Volcengine "audio/video caption" speech-to-text client.
//!
//! A job is submitted with the media URL, then queried in blocking mode. If the
//! service still reports the job as running, it is polled until the configured
//! timeout runs out.

use crate::config::VolcConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};

const CODE_PROCESSING: i64 = 2000;
const SUBMIT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request to speech service failed: {0}")]
    Request(#[from] minreq::Error),
    #[error("speech service returned HTTP {status}: {body}")]
    StatusNotOk { status: i32, body: String },
    #[error("submitting transcription job failed: {0}")]
    Submit(String),
    #[error("transcription failed ({code}): {message}")]
    Failed { code: i64, message: String },
    #[error("transcription did not finish within {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub end_time: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub duration: f64,
    pub utterances: Vec<Utterance>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    code: Option<Value>,
    message: Option<String>,
    id: Option<String>,
}

#[derive(Deserialize)]
struct QueryResponse {
    code: Option<Value>,
    message: Option<String>,
    #[serde(default)]
    utterances: Vec<Utterance>,
    duration: Option<f64>,
}

/// The service answers with the code either as a number or a string.
fn code_of(code: &Option<Value>) -> i64 {
    match code {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(-1),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(-1),
        _ => -1,
    }
}

pub struct Transcriber {
    config: VolcConfig,
}

impl Transcriber {
    pub fn new(config: VolcConfig) -> Self {
        Self { config }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn authorization(&self) -> String {
        format!("Bearer; {}", self.config.access_token)
    }

    pub fn transcribe(&self, audio_url: &str) -> Result<Transcript> {
        let job_id = self.submit(audio_url)?;

        info!(job_id = %job_id, "waiting for transcription");
        let mut result = self.query(&job_id, true)?;

        let started = Instant::now();
        while code_of(&result.code) == CODE_PROCESSING {
            if started.elapsed() >= self.config.timeout {
                error!(job_id = %job_id, "transcription timed out");
                return Err(Error::Timeout(self.config.timeout));
            }
            thread::sleep(self.config.poll_interval);
            info!(job_id = %job_id, "transcription still running");
            result = self.query(&job_id, false)?;
        }

        let code = code_of(&result.code);
        if code != 0 {
            let message = result.message.unwrap_or_else(|| "unknown error".into());
            error!(code, message = %message, "transcription failed");
            return Err(Error::Failed { code, message });
        }

        let text: String = result.utterances.iter().map(|u| u.text.as_str()).collect();
        let duration = result.duration.unwrap_or(0.0);
        info!(
            utterances = result.utterances.len(),
            duration,
            chars = text.chars().count(),
            "transcription finished"
        );

        Ok(Transcript {
            text,
            duration,
            utterances: result.utterances,
        })
    }

    fn submit(&self, audio_url: &str) -> Result<String> {
        let response = minreq::post(format!("{}/submit", self.base_url()))
            .with_param("appid", &self.config.app_id)
            .with_param("language", "zh-CN")
            .with_param("use_itn", "True")
            .with_param("use_capitalize", "True")
            .with_param("use_punc", "True")
            .with_param("caption_type", "speech")
            .with_param("max_lines", "1")
            .with_param("words_per_line", "40")
            .with_header("Authorization", self.authorization())
            .with_timeout(SUBMIT_TIMEOUT_SECS)
            .with_json(&json!({ "url": audio_url }))?
            .send()?;

        if response.status_code != 200 {
            let body = response.as_str().unwrap_or("").to_string();
            error!(status = response.status_code, body = %body, "submit request failed");
            return Err(Error::StatusNotOk { status: response.status_code, body });
        }

        let reply: SubmitResponse = response.json()?;
        if code_of(&reply.code) != 0 {
            let message = reply.message.unwrap_or_else(|| "unknown error".into());
            error!(message = %message, "submit rejected");
            return Err(Error::Submit(message));
        }

        let job_id = reply
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Submit("response carries no job id".into()))?;
        info!(job_id = %job_id, "transcription job submitted");
        Ok(job_id)
    }

    fn query(&self, job_id: &str, blocking: bool) -> Result<QueryResponse> {
        let timeout = self.config.timeout.as_secs().max(1);
        let response = minreq::get(format!("{}/query", self.base_url()))
            .with_param("appid", &self.config.app_id)
            .with_param("id", job_id)
            .with_param("blocking", if blocking { "1" } else { "0" })
            .with_header("Authorization", self.authorization())
            .with_timeout(timeout)
            .send()?;

        if response.status_code != 200 {
            let body = response.as_str().unwrap_or("").to_string();
            error!(status = response.status_code, "query request failed");
            return Err(Error::StatusNotOk { status: response.status_code, body });
        }

        Ok(response.json()?)
    }
}
