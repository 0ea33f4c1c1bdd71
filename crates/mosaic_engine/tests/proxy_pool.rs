use std::collections::HashSet;
use std::fs;

use mosaic_core::ProviderType;
use mosaic_engine::{proxy_file_name, ProxyPool, ProxyRecord, ProxyValidity};
use tempfile::TempDir;

fn record(ip: &str, port: u16) -> ProxyRecord {
    ProxyRecord::new(ip, port, ProviderType::Anime)
}

#[test]
fn save_then_load_has_no_duplicates() {
    let temp = TempDir::new().unwrap();
    let pool = ProxyPool::load(temp.path()).unwrap();

    let added = pool
        .add(
            ProviderType::Anime,
            "gogoanime",
            [record("1.1.1.1", 80), record("1.1.1.1", 80), record("2.2.2.2", 3128)],
        )
        .unwrap();
    assert_eq!(added, 2);
    assert_eq!(
        pool.add(ProviderType::Anime, "gogoanime", [record("2.2.2.2", 3128)]).unwrap(),
        0
    );
    pool.save(ProviderType::Anime).unwrap();

    let reloaded = ProxyPool::load(temp.path()).unwrap();
    let records = reloaded.proxies_for(ProviderType::Anime, "gogoanime");
    let keys: HashSet<String> = records.iter().map(ProxyRecord::key).collect();
    assert_eq!(records.len(), 2);
    assert_eq!(keys.len(), 2);
}

#[test]
fn duplicated_documents_are_cleaned_on_load() {
    let temp = TempDir::new().unwrap();
    let document = r#"{
        "zoro": [
            { "ip": "3.3.3.3", "port": 8080, "providerType": "ANIME" },
            { "ip": "3.3.3.3", "port": 8080, "providerType": "ANIME", "validity": "valid" },
            { "ip": "4.4.4.4", "port": 8080, "providerType": "ANIME" }
        ]
    }"#;
    fs::write(temp.path().join(proxy_file_name(ProviderType::Anime)), document).unwrap();

    let pool = ProxyPool::load(temp.path()).unwrap();
    let records = pool.proxies_for(ProviderType::Anime, "zoro");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].validity, ProxyValidity::Unknown);
    assert_eq!(records[1].ip, "4.4.4.4");
}

#[test]
fn every_mutation_rewrites_the_category_document() {
    let temp = TempDir::new().unwrap();
    let pool = ProxyPool::load(temp.path()).unwrap();
    let path = temp.path().join("manga_proxies.json");

    pool.add(
        ProviderType::Manga,
        "mangadex",
        [
            ProxyRecord::new("5.5.5.5", 80, ProviderType::Manga),
            ProxyRecord::new("6.6.6.6", 80, ProviderType::Manga),
        ],
    )
    .unwrap();
    assert!(path.exists());

    assert!(pool.remove(ProviderType::Manga, "mangadex", "http://5.5.5.5:80").unwrap());
    assert!(!pool.remove(ProviderType::Manga, "mangadex", "http://5.5.5.5:80").unwrap());
    assert!(pool.mark_checked(ProviderType::Manga, "mangadex", "6.6.6.6:80", true).unwrap());

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let entries = json["mangadex"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["ip"], "6.6.6.6");
    assert_eq!(entries[0]["providerType"], "MANGA");
    assert_eq!(entries[0]["validity"], "valid");
    assert!(entries[0]["lastChecked"].is_string());
}

#[test]
fn random_draws_only_from_the_requested_provider() {
    let pool = ProxyPool::in_memory();
    pool.add(ProviderType::Anime, "zoro", [record("7.7.7.7", 80)]).unwrap();
    pool.add(ProviderType::Anime, "animepahe", [record("8.8.8.8", 80)]).unwrap();

    for _ in 0..20 {
        assert_eq!(
            pool.random(ProviderType::Anime, "zoro").as_deref(),
            Some("http://7.7.7.7:80")
        );
    }
    assert_eq!(pool.random(ProviderType::Manga, "zoro"), None);
    assert_eq!(pool.random(ProviderType::Anime, "unknown"), None);
}

#[test]
fn load_rejects_malformed_documents() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("meta_proxies.json"), "[not json").unwrap();
    assert!(ProxyPool::load(temp.path()).is_err());
}
