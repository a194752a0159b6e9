#![allow(dead_code)]

use douyin_resolver::config::{ArkConfig, Config, DouyinConfig, VolcConfig};
use douyin_resolver::server::{serve, App};
use serde_json::json;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

pub const AWEME_ID: &str = "7606346524510997787";

pub const SHARE_TEXT: &str = "3.05 复制打开抖音，看看【量子位的作品】大模型又有新进展 # AI https://www.douyin.com/video/7606346524510997787 NwF:/ 12/01 E@u.Fh";

/// A trimmed-down iesdouyin share page carrying one video item.
pub fn share_page_html() -> String {
    let router_data = json!({
        "loaderData": {
            "video_layout": { "commonContext": { "isSpider": false } },
            "video_(id)/page": {
                "videoInfoRes": {
                    "status_code": 0,
                    "item_list": [{
                        "aweme_id": AWEME_ID,
                        "desc": "大模型又有新进展 #AI ",
                        "author": { "nickname": "量子位", "unique_id": "qbitai" },
                        "video": {
                            "play_addr": {
                                "uri": "v0d00fg10000cuqfa1nog65h2q3vbkpg",
                                "url_list": ["https://aweme.snssdk.com/aweme/v1/playwm/?video_id=v0d00fg10000cuqfa1nog65h2q3vbkpg"]
                            },
                            "cover": { "url_list": ["https://p3-sign.douyinpic.com/cover.jpeg"] },
                            "duration": 83456
                        }
                    }],
                    "filter_list": []
                }
            }
        }
    });
    format!(
        "<!DOCTYPE html><html><head><title>抖音</title></head><body><div id=\"root\"></div>\
         <script>window._ROUTER_DATA = {}</script><script src=\"/app.js\"></script></body></html>",
        router_data
    )
}

pub fn douyin_config(share_base: String) -> DouyinConfig {
    DouyinConfig { share_base, timeout_secs: 5 }
}

pub fn volc_config(base_url: String) -> VolcConfig {
    let mut volc = VolcConfig::new("app-1", "token-1");
    volc.base_url = base_url;
    volc
}

pub fn ark_config(base_url: String) -> ArkConfig {
    let mut ark = ArkConfig::new("ark-key");
    ark.base_url = base_url;
    ark.timeout_secs = 5;
    ark
}

/// Starts the HTTP server on an ephemeral port and returns its base URL.
pub fn start_server(douyin: DouyinConfig, volc: Option<VolcConfig>) -> String {
    start_server_with(Config {
        ip: "127.0.0.1".into(),
        port: 0,
        workers: 2,
        douyin,
        volc,
        ark: None,
    })
}

pub fn start_server_with(config: Config) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    let app = Arc::new(App::new(&config));
    thread::spawn(move || serve(listener, app, config.workers));
    format!("http://{}", addr)
}
