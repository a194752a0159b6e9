mod common;

use common::{douyin_config, share_page_html, AWEME_ID, SHARE_TEXT};
use douyin_resolver::douyin::{extract_aweme_id, DouyinClient, Error, ResolvedVideo};
use httpmock::prelude::*;

fn expected_video() -> ResolvedVideo {
    ResolvedVideo {
        aweme_id: AWEME_ID.into(),
        play_url: "https://www.douyin.com/aweme/v1/play/?video_id=v0d00fg10000cuqfa1nog65h2q3vbkpg".into(),
        duration_seconds: 83.456,
        title: "大模型又有新进展 #AI".into(),
        author: "量子位".into(),
        cover_url: "https://p3-sign.douyinpic.com/cover.jpeg".into(),
    }
}

#[test]
fn resolves_share_text_against_share_page() {
    let server = MockServer::start();
    let page = server.mock(|when, then| {
        when.method(GET)
            .path(format!("/share/video/{}/", AWEME_ID))
            .header_exists("User-Agent")
            .header("Referer", "https://www.douyin.com/?is_from_mobile_home=1&recommend=1");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(share_page_html());
    });

    let client = DouyinClient::new(&douyin_config(server.base_url()));
    let first = client.resolve(SHARE_TEXT).expect("resolved");
    let second = client
        .resolve(&format!("https://www.douyin.com/video/{}?previous_page=app_code_link", AWEME_ID))
        .expect("resolved");

    assert_eq!(first, expected_video());
    assert_eq!(first, second);
    page.assert_hits(2);
}

#[test]
fn upstream_failure_is_reported() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/share/video/1/");
        then.status(500).body("busy");
    });

    let client = DouyinClient::new(&douyin_config(server.base_url()));
    let err = client.resolve("https://www.douyin.com/video/1").unwrap_err();
    assert!(matches!(err, Error::UpstreamStatus(500)));
    assert!(!err.is_input_error());
}

#[test]
fn captcha_page_without_router_data() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/share/video/2/");
        then.status(200).body("<html><body>验证码中间页</body></html>");
    });

    let client = DouyinClient::new(&douyin_config(server.base_url()));
    assert!(matches!(client.fetch("2"), Err(Error::MissingRouterData)));
}

#[test]
fn no_link_never_reaches_upstream() {
    let server = MockServer::start();
    let page = server.mock(|when, then| {
        when.any_request();
        then.status(200).body(share_page_html());
    });

    let client = DouyinClient::new(&douyin_config(server.base_url()));
    assert!(matches!(client.resolve("复制打开抖音，看看【作品】"), Err(Error::NoLinkFound)));
    assert!(matches!(client.resolve("see https://example.com/video/1"), Err(Error::NoLinkFound)));
    page.assert_hits(0);
}

#[test]
fn bare_links_on_other_hosts_never_reach_upstream() {
    let server = MockServer::start();
    let page = server.mock(|when, then| {
        when.any_request();
        then.status(200).body(share_page_html());
    });

    let client = DouyinClient::new(&douyin_config(server.base_url()));
    assert!(matches!(
        client.resolve("https://www.youtube.com/watch?v=abc"),
        Err(Error::NoLinkFound)
    ));
    assert!(matches!(
        client.resolve(&format!("https://evil.example.com/video/{}", AWEME_ID)),
        Err(Error::NoLinkFound)
    ));
    page.assert_hits(0);
}

#[test]
fn bare_link_with_glued_punctuation_resolves() {
    let server = MockServer::start();
    let page = server.mock(|when, then| {
        when.method(GET).path(format!("/share/video/{}/", AWEME_ID));
        then.status(200).body(share_page_html());
    });

    let client = DouyinClient::new(&douyin_config(server.base_url()));
    let video = client
        .resolve(&format!("https://www.douyin.com/video/{}】。", AWEME_ID))
        .expect("resolved");
    assert_eq!(video.aweme_id, AWEME_ID);
    page.assert();
}

#[test]
fn short_link_redirect_is_followed() {
    let server = MockServer::start();
    let target = server.url(format!("/video/{}/?region=CN&mid=1", AWEME_ID));
    let short = server.mock(|when, then| {
        when.path("/pblL5pmtw_4/");
        then.status(302).header("Location", target.as_str());
    });
    let landing = server.mock(|when, then| {
        when.path(format!("/video/{}/", AWEME_ID));
        then.status(200);
    });

    let client = DouyinClient::new(&douyin_config(server.base_url()));
    let final_url = client
        .follow_redirects(&server.url("/pblL5pmtw_4/"))
        .expect("redirect followed");

    assert_eq!(extract_aweme_id(&final_url).as_deref(), Some(AWEME_ID));
    short.assert();
    landing.assert();
}
