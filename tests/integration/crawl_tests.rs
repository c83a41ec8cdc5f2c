//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the mirrored site and run the
//! full crawl cycle end-to-end with the HTTP runtime.

use spa_mirror::config::{parse_config, Config};
use spa_mirror::crawler::Coordinator;
use spa_mirror::runtime::HttpBrowser;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration for the mock server
fn create_test_config(base_url: &str, out_dir: &Path, extra: &str) -> Config {
    let toml = format!(
        r#"
[site]
base-url = "{base_url}"

[session]
pool-size = 2
rerender-timeout = 0
login-wait-timeout = 5000
form-stabilize-timeout = 2000

[crawler]
max-concurrent-pages = 4
navigation-timeout = 5000
network-idle-timeout = 100

[output]
out-dir = "{out_dir}"

{extra}
"#,
        out_dir = out_dir.display()
    );
    parse_config(&toml).expect("valid test config")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head><title>t</title></head><body>{}</body></html>", body).into_bytes(),
        "text/html",
    )
}

fn redirect(to: &str) -> ResponseTemplate {
    ResponseTemplate::new(302).insert_header("location", to)
}

async fn run_crawl(config: Config) -> spa_mirror::output::CrawlStatistics {
    let browser = Arc::new(HttpBrowser::new("spa-mirror-test"));
    let mut coordinator = Coordinator::new(config, browser).expect("Failed to create coordinator");
    coordinator.run().await.expect("Crawl failed")
}

#[tokio::test]
async fn test_links_and_hydration_state_are_followed() {
    let mock_server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/a">A</a>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html(r#"<a href="/b/">B</a> <a href="relative/ignored">x</a>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html(
            r#"<div id="__next"></div>
            <script id="__NEXT_DATA__" type="application/json">{"props":{"next":"/c"}}</script>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(html("<p>leaf</p>"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), out.path(), "");
    let stats = run_crawl(config).await;

    for page in ["pages/index.html", "pages/a/index.html", "pages/b/index.html", "pages/c/index.html"] {
        assert!(out.path().join(page).is_file(), "missing {}", page);
    }
    assert!(!out.path().join("pages/a/relative").exists());
    assert_eq!(stats.pages_written, 4);
    assert_eq!(stats.failed, 0);

    let saved = std::fs::read_to_string(out.path().join("pages/c/index.html")).unwrap();
    assert!(saved.contains("leaf"));
}

#[tokio::test]
async fn test_assets_are_captured_with_query_variants() {
    let mock_server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<img src="/img/logo.png?v=1">
            <script src="/static/app.js"></script>
            <script src="/static/missing.js"></script>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/img/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/static/app.js"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"console.log(1)".to_vec(), "application/javascript"),
        )
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), out.path(), "");
    let stats = run_crawl(config).await;

    let logo = out.path().join("assets_q/img/logo.png/v=1");
    assert_eq!(std::fs::read(&logo).unwrap(), vec![0x89, b'P', b'N', b'G']);
    assert_eq!(
        std::fs::read_to_string(out.path().join("assets/static/app.js")).unwrap(),
        "console.log(1)"
    );
    assert!(!out.path().join("assets/static/missing.js").exists());
    assert!(!out.path().join("assets/img/logo.png").exists());
    assert!(stats.assets_written >= 2);
}

#[tokio::test]
async fn test_empty_asset_bodies_are_not_written() {
    let mock_server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<link rel="stylesheet" href="/static/empty.css">
            <script src="/static/app.js"></script>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/static/empty.css"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(Vec::new(), "text/css"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/static/app.js"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"console.log(1)".to_vec(), "application/javascript"),
        )
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), out.path(), "");
    let stats = run_crawl(config).await;

    assert!(!out.path().join("assets/static/empty.css").exists());
    assert!(out.path().join("assets/static/app.js").is_file());
    assert!(stats.skipped >= 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_next_data_responses_are_mined() {
    let mock_server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<link rel="prefetch" href="/_next/data/build1/index.json">"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/_next/data/build1/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            br#"{"pageProps":{"items":[{"href":"/docs/intro"}]}}"#.to_vec(),
            "application/json",
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/docs/intro"))
        .respond_with(html("<h1>Intro</h1>"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), out.path(), "");
    run_crawl(config).await;

    assert!(out.path().join("assets/_next/data/build1/index.json").is_file());
    assert!(out.path().join("pages/docs/intro/index.html").is_file());
}

#[tokio::test]
async fn test_login_then_crawl_with_session_cookie() {
    let mock_server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    // Logged-in visitors are sent away from the login page
    Mock::given(method("GET"))
        .and(path("/login"))
        .and(header("cookie", "session=ok"))
        .respond_with(redirect("/home"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(html(
            r#"<form method="post" action="/login">
                <input name="login" type="text">
                <input name="password" type="password">
            </form>"#,
        ))
        .mount(&mock_server)
        .await;

    // Only the first slot fills the form; the second reuses its cookie
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("login=alice"))
        .and(body_string_contains("password=secret"))
        .respond_with(redirect("/home").insert_header("set-cookie", "session=ok; Path=/"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/home"))
        .and(header("cookie", "session=ok"))
        .respond_with(html("<p>welcome</p>"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("cookie", "session=ok"))
        .respond_with(html(r#"<a href="/reports">Reports</a> <a href="/login">Log in</a>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/reports"))
        .and(header("cookie", "session=ok"))
        .respond_with(html("<table>secret numbers</table>"))
        .mount(&mock_server)
        .await;

    // Anything else without a session goes to the login page
    Mock::given(method("GET"))
        .respond_with(redirect("/login"))
        .mount(&mock_server)
        .await;

    let login = r#"
[login]
required = true
username = "alice"
password = "secret"
typing-delay = 0
"#;
    let config = create_test_config(&mock_server.uri(), out.path(), login);
    let stats = run_crawl(config).await;

    let reports = std::fs::read_to_string(out.path().join("pages/reports/index.html")).unwrap();
    assert!(reports.contains("secret numbers"));
    assert!(out.path().join("pages/index.html").is_file());
    assert!(!out.path().join("pages/login").exists());
    assert_eq!(stats.invalidations, 0);
}

#[tokio::test]
async fn test_rejected_credentials_abort_crawl() {
    let mock_server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(html(
            r#"<form method="post" action="/login">
                <input name="login"><input name="password" type="password">
            </form>"#,
        ))
        .mount(&mock_server)
        .await;

    // The site answers every submission with the form again
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(redirect("/login?error=1"))
        .mount(&mock_server)
        .await;

    let login = r#"
[login]
required = true
username = "alice"
password = "wrong"
typing-delay = 0

[session]
login-attempts = 1
login-wait-timeout = 200
"#;
    // The second [session] table would clash, so build it without the shared template
    let toml = format!(
        r#"
[site]
base-url = "{}"

[output]
out-dir = "{}"
{}
"#,
        mock_server.uri(),
        out.path().display(),
        login
    );
    let config = parse_config(&toml).unwrap();

    let browser = Arc::new(HttpBrowser::new("spa-mirror-test"));
    let mut coordinator = Coordinator::new(config, browser).unwrap();
    let err = coordinator.run().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(!out.path().join("pages").exists());
}
