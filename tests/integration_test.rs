use std::time::Duration;

use job_snapshot::browser::ChromeDriver;
use job_snapshot::config::{resolve_config, PartialRunConfig};
use job_snapshot::infrastructure::{PageSession, SessionDriver, SessionOptions};
use job_snapshot::services::{ReadinessDetector, ReadinessSettings};
use job_snapshot::{utils, App, Config};

#[tokio::test]
#[ignore] // 默认忽略，需要本机 Chrome：cargo test -- --ignored
async fn test_launch_and_release_browser() {
    utils::init();

    let config = resolve_config(PartialRunConfig::default()).expect("默认配置应该合法");
    let options = SessionOptions::from_run_config(&config);

    let mut session = ChromeDriver.acquire(&options).await.expect("启动浏览器失败");

    session
        .navigate("https://example.com", Duration::from_secs(30))
        .await
        .expect("导航失败");
    assert!(session.is_attached("h1").await.expect("探测元素失败"));
    assert!(session.html().await.expect("读取文档失败").contains("Example Domain"));

    session.release().await.expect("关闭浏览器失败");
    // 重复释放无副作用
    session.release().await.expect("重复关闭应该成功");
}

#[tokio::test]
#[ignore]
async fn test_readiness_on_real_page() {
    utils::init();

    let partial = PartialRunConfig {
        selectors: None,
        readiness_timeout_ms: Some(10_000),
        ..PartialRunConfig::default()
    };
    let mut config = resolve_config(partial).expect("配置应该合法");
    config.selectors.container = "body".to_string();

    let mut session = ChromeDriver
        .acquire(&SessionOptions::from_run_config(&config))
        .await
        .expect("启动浏览器失败");
    session
        .navigate("https://example.com", config.navigation_timeout)
        .await
        .expect("导航失败");

    let detector = ReadinessDetector::new(ReadinessSettings::from_run_config(&config));
    let result = detector.await_ready(&session).await;
    session.release().await.expect("关闭浏览器失败");

    assert!(result.is_ok(), "页面应该就绪: {:?}", result.err());
}

#[tokio::test]
#[ignore] // 需要 QINIU_* 环境变量以及可访问的招聘站点
async fn test_full_run() {
    utils::init();

    let config = Config::from_env().expect("加载配置失败");
    let mut app = App::initialize(config).expect("初始化失败");

    let outcome = app.run().await;

    assert!(outcome.is_ok(), "运行应该成功: {:?}", outcome.err());
}
