use std::time::Duration;

use bytes::Bytes;
use chrono::{TimeDelta, Utc};
use url::Url;

use spectura_backend::config::{AppConfig, CacheConfig, DecapConfig, ImageConfig, SigningConfig};
use spectura_backend::features::cache::CacheEntry;
use spectura_backend::features::capture::HostConfMap;
use spectura_backend::features::capture::cropper::{
    OG_IMAGE_HEIGHT, OG_IMAGE_WIDTH, encode_empty_png,
};
use spectura_backend::state::AppState;

/// 存储语义测试用的应用状态：Decap 指向不存在的地址（刷新任务只会
/// 记日志放弃），签名与兜底图加载关闭。
fn test_state(ttl: &str, schedule_interval: &str) -> AppState {
    let config = AppConfig {
        cache: CacheConfig {
            ttl: ttl.into(),
            schedule_interval: schedule_interval.into(),
            auto_refresh_after: "6h".into(),
            refresh_task_delay: "10ms".into(),
            bg_rate_limit_time: "3h".into(),
            ..CacheConfig::default()
        },
        decap: DecapConfig {
            url: "http://127.0.0.1:9".into(),
        },
        signing: SigningConfig {
            enabled: false,
            key: String::new(),
            secret: String::new(),
            unique_name: "jix_spectura".into(),
        },
        image: ImageConfig {
            conf_path: "unused".into(),
            fallback_url: String::new(),
        },
        ..AppConfig::default()
    };
    AppState::build(&config, HostConfMap::default())
}

fn target(url: &str) -> Url {
    Url::parse(url).expect("url")
}

fn entry_with_image(url: &str, image: &'static [u8], score: i32) -> CacheEntry {
    CacheEntry {
        url: Some(target(url)),
        image: Some(Bytes::from_static(image)),
        score,
        signature: "sig".into(),
        expire: Some(Utc::now() + TimeDelta::hours(2)),
        ..CacheEntry::default()
    }
}

#[tokio::test]
async fn read_returns_zero_entry_on_miss() {
    let state = test_state("48h", "5m");
    let entry = state.cache.read("https://missing.example.com/").await;
    assert!(entry.is_empty());
}

#[tokio::test]
async fn write_then_read_round_trips() {
    let state = test_state("48h", "5m");
    let url = "https://example.com/job/1";
    state
        .cache
        .write(entry_with_image(url, b"png-bytes", 10))
        .await;

    let stored = state.cache.read(&target(url).to_string()).await;
    assert_eq!(stored.image, Some(Bytes::from_static(b"png-bytes")));
    assert_eq!(stored.score, 10);
    assert!(stored.entry_created.is_some());
    assert_eq!(stored.entry_created, stored.image_created);
}

#[tokio::test]
async fn failed_entry_reads_substitute_fallback_without_mutation() {
    let state = test_state("48h", "5m");
    let url = "https://example.com/broken";
    state
        .cache
        .write_metadata(CacheEntry {
            url: Some(target(url)),
            signature: "sig".into(),
            ..CacheEntry::default()
        })
        .await;

    let key = target(url).to_string();
    let read = state.cache.read(&key).await;
    // 读取回复里失败条目的 image 被替换成兜底图（启动时的空 PNG）
    assert_eq!(
        read.image,
        Some(Bytes::from(encode_empty_png(OG_IMAGE_WIDTH, OG_IMAGE_HEIGHT)))
    );

    // 存储本身不变：全量快照里 image 仍为空
    let all = state.cache.read_all().await;
    let stored = all
        .iter()
        .find(|e| e.url.as_ref().map(|u| u.as_str()) == Some(key.as_str()))
        .expect("entry present");
    assert!(stored.image.is_none());
    assert!(stored.is_failed_image());
}

#[tokio::test]
async fn write_metadata_does_not_clobber_good_image() {
    let state = test_state("48h", "5m");
    let url = "https://example.com/job/2";
    state
        .cache
        .write(entry_with_image(url, b"good-image", 50))
        .await;

    let mut meta = CacheEntry {
        url: Some(target(url)),
        last_refresh_attempt: Some(Utc::now()),
        ..CacheEntry::default()
    };
    // write_metadata 清空入参里的 image，这里带上脏数据验证
    meta.image = Some(Bytes::from_static(b"should-not-land"));
    state.cache.write_metadata(meta).await;

    let stored = state.cache.read(&target(url).to_string()).await;
    assert_eq!(stored.image, Some(Bytes::from_static(b"good-image")));
    assert!(stored.last_refresh_attempt.is_some());
}

#[tokio::test]
async fn merge_preserves_url_and_expire_of_stored_entry() {
    let state = test_state("48h", "5m");
    let url = "https://example.com/job/3";
    let original = entry_with_image(url, b"v1", 20);
    let original_expire = original.expire;
    state.cache.write(original).await;

    let mut update = entry_with_image(url, b"v2", 25);
    update.expire = Some(Utc::now() + TimeDelta::hours(99));
    state.cache.write(update).await;

    let stored = state.cache.read(&target(url).to_string()).await;
    assert_eq!(stored.image, Some(Bytes::from_static(b"v2")));
    assert_eq!(stored.expire, original_expire);
    assert_eq!(stored.url, Some(target(url)));
}

#[tokio::test]
async fn merge_density_guard_keeps_better_image() {
    let state = test_state("48h", "5m");
    let url = "https://example.com/job/4";
    state.cache.write(entry_with_image(url, b"dense", 100)).await;

    // 分值腰斩的刷新图被拒绝
    state.cache.write(entry_with_image(url, b"sparse", 40)).await;
    let stored = state.cache.read(&target(url).to_string()).await;
    assert_eq!(stored.image, Some(Bytes::from_static(b"dense")));
    assert_eq!(stored.score, 100);

    // 分值相当的不同图被接受
    state.cache.write(entry_with_image(url, b"fresh", 95)).await;
    let stored = state.cache.read(&target(url).to_string()).await;
    assert_eq!(stored.image, Some(Bytes::from_static(b"fresh")));
    assert_eq!(stored.score, 95);
}

#[tokio::test]
async fn scheduler_tick_evicts_expired_entries() {
    let state = test_state("150ms", "100ms");
    let url = "https://example.com/ttl";
    // last_refresh_attempt 置为当前时刻，避免同一次 tick 的自动刷新
    // 扫描把刚清理的条目又以元数据形式写回
    let mut entry = entry_with_image(url, b"png", 1);
    entry.last_refresh_attempt = Some(Utc::now());
    state.cache.write(entry).await;
    assert_eq!(state.cache.read_all().await.len(), 1);

    // 等待 TTL 过期 + 至少一次调度 tick
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(state.cache.read_all().await.is_empty());
}

#[tokio::test]
async fn fresh_entries_survive_scheduler_tick() {
    let state = test_state("48h", "100ms");
    let url = "https://example.com/fresh";
    state.cache.write(entry_with_image(url, b"png", 1)).await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(state.cache.read_all().await.len(), 1);
}

#[tokio::test]
async fn replace_fallback_applies_to_subsequent_reads() {
    let state = test_state("48h", "5m");
    let url = "https://example.com/failed";
    state
        .cache
        .write_metadata(CacheEntry {
            url: Some(target(url)),
            signature: "sig".into(),
            ..CacheEntry::default()
        })
        .await;

    state
        .cache
        .replace_fallback(Bytes::from_static(b"branded-fallback"))
        .await;

    let read = state.cache.read(&target(url).to_string()).await;
    assert_eq!(read.image, Some(Bytes::from_static(b"branded-fallback")));
}
