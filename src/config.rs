use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SHARE_BASE: &str = "https://www.iesdouyin.com";
pub const DEFAULT_VOLC_BASE_URL: &str = "https://openspeech.bytedance.com/api/v1/vc";
pub const DEFAULT_ARK_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";
pub const DEFAULT_ARK_MODEL: &str = "doubao-seed-2-0-mini-260215";

/// Process configuration, read once at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    pub ip: String,
    pub port: u16,
    pub workers: usize,
    pub douyin: DouyinConfig,
    /// `None` unless both Volcengine credentials are set.
    pub volc: Option<VolcConfig>,
    /// `None` unless `ARK_API_KEY` is set.
    pub ark: Option<ArkConfig>,
}

#[derive(Debug, Clone)]
pub struct DouyinConfig {
    pub share_base: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct VolcConfig {
    pub app_id: String,
    pub access_token: String,
    pub base_url: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ArkConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_continuations: u32,
}

impl ArkConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_ARK_MODEL.to_string(),
            base_url: DEFAULT_ARK_BASE_URL.to_string(),
            timeout_secs: 60,
            max_continuations: 2,
        }
    }
}

impl Default for DouyinConfig {
    fn default() -> Self {
        Self {
            share_base: DEFAULT_SHARE_BASE.to_string(),
            timeout_secs: 15,
        }
    }
}

impl VolcConfig {
    pub fn new(app_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            access_token: access_token.into(),
            base_url: DEFAULT_VOLC_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(3),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup, so callers can
    /// feed a map instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let douyin = DouyinConfig {
            share_base: get("DOUYIN_SHARE_BASE").unwrap_or_else(|| DEFAULT_SHARE_BASE.into()),
            timeout_secs: parse_or(get("DOUYIN_TIMEOUT_SECS"), 15),
        };

        let volc = match (get("VOLC_APP_ID"), get("VOLC_ACCESS_TOKEN")) {
            (Some(app_id), Some(token)) => {
                let mut volc = VolcConfig::new(app_id, token);
                if let Some(base) = get("VOLC_BASE_URL") {
                    volc.base_url = base;
                }
                volc.timeout = Duration::from_secs(parse_or(get("VOLC_TIMEOUT_SECS"), 120));
                Some(volc)
            }
            _ => None,
        };

        let ark = get("ARK_API_KEY").map(|key| {
            let mut ark = ArkConfig::new(key);
            if let Some(model) = get("ARK_MODEL") {
                ark.model = model;
            }
            if let Some(base) = get("ARK_BASE_URL") {
                ark.base_url = base;
            }
            ark.timeout_secs = parse_or(get("ARK_TIMEOUT_SECS"), 60);
            ark
        });

        Self {
            ip: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(get("PORT"), 8080),
            workers: parse_or::<usize>(get("WORKERS"), 4).max(1),
            douyin,
            volc,
            ark,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn transcribe_enabled(&self) -> bool {
        self.volc.is_some()
    }

    pub fn summarize_enabled(&self) -> bool {
        self.ark.is_some()
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|s| s.parse().ok()).unwrap_or(default)
}
