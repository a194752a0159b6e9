use crate::config::DouyinConfig;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 8.0.0; SM-G955U Build/R16NW) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Mobile Safari/537.36";
const DOUYIN_REFERER: &str = "https://www.douyin.com/?is_from_mobile_home=1&recommend=1";
const PLAY_URL_BASE: &str = "https://www.douyin.com/aweme/v1/play/";
const SHORT_LINK_HOST: &str = "v.douyin.com";
const VIDEO_PAGE_KEY: &str = "video_(id)/page";

static SHARE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:v\.douyin\.com|(?:www|m)\.douyin\.com|(?:www\.)?iesdouyin\.com)/\S+")
        .expect("share url pattern")
});
static AWEME_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:video|note)/(\d+)").expect("aweme id pattern"));
static ROUTER_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)window\._ROUTER_DATA\s*=\s*(.*?)</script>").expect("router data pattern")
});

/// Full-width punctuation that share texts glue onto the end of a link.
const TRAILING_PUNCTUATION: &[char] = &['。', '，', '！', '？', '、', '）', '》', '」', '】'];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("input is empty")]
    EmptyInput,
    #[error("no Douyin link found in input")]
    NoLinkFound,
    #[error("could not extract a video id from {0}")]
    NoVideoId(String),
    #[error("request to Douyin failed: {0}")]
    Request(#[from] minreq::Error),
    #[error("Douyin share page returned HTTP {0}")]
    UpstreamStatus(i32),
    #[error("share page has no _ROUTER_DATA payload")]
    MissingRouterData,
    #[error("malformed share page data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("video was filtered by Douyin: {0}")]
    Filtered(String),
    #[error("share page lists no video")]
    EmptyItemList,
    #[error("video has no play address")]
    NoPlayAddress,
}

impl Error {
    /// True when the caller's input was at fault rather than the platform.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Error::EmptyInput | Error::NoLinkFound | Error::NoVideoId(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVideo {
    pub aweme_id: String,
    pub play_url: String,
    pub duration_seconds: f64,
    pub title: String,
    pub author: String,
    pub cover_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouterData {
    #[serde(default)]
    loader_data: HashMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoPage {
    video_info_res: Option<VideoInfoRes>,
}

#[derive(Deserialize)]
struct VideoInfoRes {
    item_list: Option<Vec<Item>>,
    filter_list: Option<Vec<FilterEntry>>,
}

#[derive(Deserialize)]
struct FilterEntry {
    filter_reason: Option<String>,
}

#[derive(Deserialize)]
struct Item {
    desc: Option<String>,
    author: Option<Author>,
    video: Option<Video>,
}

#[derive(Deserialize)]
struct Author {
    nickname: Option<String>,
}

#[derive(Deserialize)]
struct Video {
    play_addr: Option<PlayAddr>,
    duration: Option<f64>,
    cover: Option<UrlList>,
}

#[derive(Deserialize)]
struct PlayAddr {
    uri: Option<String>,
}

#[derive(Deserialize)]
struct UrlList {
    #[serde(default)]
    url_list: Vec<String>,
}

/// Pulls the first Douyin link out of pasted share text.
pub fn extract_url_from_text(text: &str) -> Option<String> {
    SHARE_URL_RE
        .find(text)
        .map(|m| m.as_str().trim_end_matches(TRAILING_PUNCTUATION).to_string())
}

pub fn is_plain_url(input: &str) -> bool {
    let trimmed = input.trim();
    trimmed.starts_with("http") && !trimmed.contains(char::is_whitespace)
}

pub fn extract_aweme_id(video_url: &str) -> Option<String> {
    if let Some(caps) = AWEME_ID_RE.captures(video_url) {
        return Some(caps[1].to_string());
    }

    let parsed = url::Url::parse(video_url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, v)| k == "modal_id" && !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()))
        .map(|(_, v)| v.into_owned())
}

pub fn is_short_link(video_url: &str) -> bool {
    url::Url::parse(video_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == SHORT_LINK_HOST))
        .unwrap_or(false)
}

pub fn play_url_for(uri: &str) -> String {
    if uri.contains("mp3") {
        uri.to_string()
    } else {
        format!("{}?video_id={}", PLAY_URL_BASE, uri)
    }
}

/// Reads the `_ROUTER_DATA` blob embedded in an iesdouyin share page.
pub fn parse_share_page(aweme_id: &str, html: &str) -> Result<ResolvedVideo> {
    let payload = ROUTER_DATA_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().trim_end_matches(';'))
        .ok_or(Error::MissingRouterData)?;

    let router: RouterData = serde_json::from_str(payload)?;
    let page_value = router
        .loader_data
        .get(VIDEO_PAGE_KEY)
        .or_else(|| {
            router.loader_data.iter().find_map(|(key, value)| {
                let is_page = key.ends_with("/page") && (key.starts_with("video_") || key.starts_with("note_"));
                is_page.then_some(value)
            })
        })
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    let info = if page_value.is_null() {
        None
    } else {
        serde_json::from_value::<VideoPage>(page_value)?.video_info_res
    };
    let info = info.ok_or(Error::EmptyItemList)?;

    let item = match info.item_list.and_then(|items| items.into_iter().next()) {
        Some(item) => item,
        None => {
            let reason = info
                .filter_list
                .and_then(|list| list.into_iter().next())
                .map(|f| f.filter_reason.unwrap_or_else(|| "unknown".into()));
            return Err(match reason {
                Some(reason) => Error::Filtered(reason),
                None => Error::EmptyItemList,
            });
        }
    };

    let video = item.video.ok_or(Error::NoPlayAddress)?;
    let uri = video
        .play_addr
        .and_then(|p| p.uri)
        .filter(|u| !u.is_empty())
        .ok_or(Error::NoPlayAddress)?;

    Ok(ResolvedVideo {
        aweme_id: aweme_id.to_string(),
        play_url: play_url_for(&uri),
        duration_seconds: video.duration.unwrap_or(0.0) / 1000.0,
        title: item.desc.unwrap_or_default().trim().to_string(),
        author: item
            .author
            .and_then(|a| a.nickname)
            .unwrap_or_default()
            .trim()
            .to_string(),
        cover_url: video
            .cover
            .and_then(|c| c.url_list.into_iter().next())
            .unwrap_or_default(),
    })
}

/// Blocking client for the iesdouyin mobile share pages.
#[derive(Debug, Clone)]
pub struct DouyinClient {
    share_base: String,
    timeout_secs: u64,
}

impl DouyinClient {
    pub fn new(config: &DouyinConfig) -> Self {
        Self {
            share_base: config.share_base.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
        }
    }

    pub fn resolve(&self, input: &str) -> Result<ResolvedVideo> {
        let aweme_id = self.normalize(input)?;
        self.fetch(&aweme_id)
    }

    /// Turns a link, short link or share text into an aweme id.
    pub fn normalize(&self, input: &str) -> Result<String> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::EmptyInput);
        }

        let url = extract_url_from_text(input).ok_or(Error::NoLinkFound)?;
        if is_plain_url(input) {
            // a bare link must itself be a Douyin link, not merely carry one
            if !input.starts_with(url.as_str()) {
                warn!(input, "link is not on a Douyin host");
                return Err(Error::NoLinkFound);
            }
        } else {
            debug!(url = %url, "extracted link from share text");
        }

        if let Some(id) = extract_aweme_id(&url) {
            return Ok(id);
        }

        if is_short_link(&url) {
            info!(url = %url, "following short link");
            let target = self.follow_redirects(&url)?;
            if let Some(id) = extract_aweme_id(&target) {
                return Ok(id);
            }
        }

        warn!(url = %url, "no aweme id in link");
        Err(Error::NoVideoId(url))
    }

    /// Follows the redirect chain of a short link and returns the final URL.
    pub fn follow_redirects(&self, short_url: &str) -> Result<String> {
        let response = minreq::head(short_url)
            .with_header("User-Agent", USER_AGENT)
            .with_header("Referer", DOUYIN_REFERER)
            .with_timeout(self.timeout_secs)
            .send()?;

        info!(from = %short_url, to = %response.url, "short link redirected");
        Ok(response.url)
    }

    pub fn fetch(&self, aweme_id: &str) -> Result<ResolvedVideo> {
        let share_url = format!("{}/share/video/{}/", self.share_base, aweme_id);
        let response = minreq::get(&share_url)
            .with_header("User-Agent", USER_AGENT)
            .with_header("Referer", DOUYIN_REFERER)
            .with_timeout(self.timeout_secs)
            .send()?;

        if response.status_code != 200 {
            warn!(aweme_id, status = response.status_code, "share page request failed");
            return Err(Error::UpstreamStatus(response.status_code));
        }

        let video = parse_share_page(aweme_id, response.as_str()?)?;
        info!(
            aweme_id,
            title = %video.title,
            author = %video.author,
            duration = video.duration_seconds,
            "video resolved"
        );
        Ok(video)
    }
}
