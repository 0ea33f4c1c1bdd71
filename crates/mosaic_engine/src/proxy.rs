use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use mosaic_core::ProviderType;
use mosaic_logging::{mosaic_debug, mosaic_info, mosaic_warn};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyValidity {
    Valid,
    Invalid,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRecord {
    pub ip: String,
    pub port: u16,
    pub provider_type: ProviderType,
    #[serde(default)]
    pub validity: ProxyValidity,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

impl ProxyRecord {
    pub fn new(ip: impl Into<String>, port: u16, provider_type: ProviderType) -> Self {
        Self {
            ip: ip.into(),
            port,
            provider_type,
            validity: ProxyValidity::Unknown,
            last_checked: None,
        }
    }

    /// Parse `ip:port`, optionally prefixed with `http://` or `https://`.
    pub fn parse(url: &str, provider_type: ProviderType) -> Option<Self> {
        let bare = url
            .trim()
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_end_matches('/');
        let (ip, port) = bare.rsplit_once(':')?;
        if ip.is_empty() {
            return None;
        }
        Some(Self::new(ip, port.parse().ok()?, provider_type))
    }

    /// Identity of a proxy within a pool.
    pub fn key(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

type CategoryDocument = BTreeMap<String, Vec<ProxyRecord>>;

/// Per-category, per-provider proxy lists, persisted as one JSON document per category.
///
/// Mutations are serialized through `write_lock`; the pool lock itself is only held
/// while the in-memory map changes, never during file IO. [`ProxyPool::evict`] skips
/// `write_lock` on the caller's side and leaves the rewrite to the blocking pool.
#[derive(Debug)]
pub struct ProxyPool {
    writer: Option<AtomicFileWriter>,
    pools: Mutex<HashMap<ProviderType, CategoryDocument>>,
    write_lock: Mutex<()>,
}

impl ProxyPool {
    pub fn in_memory() -> Self {
        Self {
            writer: None,
            pools: Mutex::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Load every category document from `dir`. Missing documents start empty.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        let mut pools = HashMap::new();
        for provider_type in ProviderType::ALL {
            let path = dir.join(file_name(provider_type));
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            let mut document: CategoryDocument =
                serde_json::from_str(&text).map_err(|err| PersistError::Malformed {
                    path: path.display().to_string(),
                    message: err.to_string(),
                })?;
            for records in document.values_mut() {
                for record in records.iter_mut() {
                    record.provider_type = provider_type;
                }
                dedupe(records);
            }
            let total: usize = document.values().map(Vec::len).sum();
            mosaic_info!("Loaded {} {} proxies from {:?}", total, provider_type, path);
            pools.insert(provider_type, document);
        }
        Ok(Self {
            writer: Some(AtomicFileWriter::new(dir)),
            pools: Mutex::new(pools),
            write_lock: Mutex::new(()),
        })
    }

    /// Add proxies for a provider, skipping ones already present. Returns how many were new.
    pub fn add(
        &self,
        provider_type: ProviderType,
        provider_id: &str,
        records: impl IntoIterator<Item = ProxyRecord>,
    ) -> Result<usize, PersistError> {
        let records: Vec<ProxyRecord> = records.into_iter().collect();
        self.mutate(provider_type, |document| {
            let entry = document.entry(provider_id.to_string()).or_default();
            let before = entry.len();
            entry.extend(records.into_iter().map(|mut record| {
                record.provider_type = provider_type;
                record
            }));
            dedupe(entry);
            entry.len() - before
        })
    }

    /// Remove a proxy (given as URL or `ip:port`). Returns whether it was present.
    pub fn remove(
        &self,
        provider_type: ProviderType,
        provider_id: &str,
        proxy: &str,
    ) -> Result<bool, PersistError> {
        let Some(target) = ProxyRecord::parse(proxy, provider_type) else {
            return Ok(false);
        };
        let key = target.key();
        let removed = self.mutate(provider_type, |document| drop_key(document, provider_id, &key))?;
        if removed {
            mosaic_debug!("Evicted proxy {} for {} {}", key, provider_type, provider_id);
        }
        Ok(removed)
    }

    /// Remove a proxy from memory right away and rewrite the category document on the
    /// blocking pool. Each rewrite snapshots the latest state, so the last one wins.
    ///
    /// Outside a tokio runtime the document is written inline.
    pub fn evict(self: &Arc<Self>, provider_type: ProviderType, provider_id: &str, proxy: &str) -> bool {
        let Some(target) = ProxyRecord::parse(proxy, provider_type) else {
            return false;
        };
        let key = target.key();
        let (removed, _) = self.change_in_memory(provider_type, |document| drop_key(document, provider_id, &key));
        if !removed {
            return false;
        }
        mosaic_debug!("Evicted proxy {} for {} {}", key, provider_type, provider_id);
        if self.writer.is_none() {
            return true;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let pool = Arc::clone(self);
                runtime.spawn_blocking(move || {
                    if let Err(err) = pool.save(provider_type) {
                        mosaic_warn!("Could not persist eviction of {}: {}", key, err);
                    }
                });
            }
            Err(_) => {
                if let Err(err) = self.save(provider_type) {
                    mosaic_warn!("Could not persist eviction of {}: {}", key, err);
                }
            }
        }
        true
    }

    /// Record a health-check verdict for a proxy.
    pub fn mark_checked(
        &self,
        provider_type: ProviderType,
        provider_id: &str,
        proxy: &str,
        valid: bool,
    ) -> Result<bool, PersistError> {
        let Some(target) = ProxyRecord::parse(proxy, provider_type) else {
            return Ok(false);
        };
        let key = target.key();
        let now = Utc::now();
        self.mutate(provider_type, |document| {
            let Some(record) = document
                .get_mut(provider_id)
                .and_then(|entry| entry.iter_mut().find(|record| record.key() == key))
            else {
                return false;
            };
            record.validity = if valid {
                ProxyValidity::Valid
            } else {
                ProxyValidity::Invalid
            };
            record.last_checked = Some(now);
            true
        })
    }

    /// A uniformly random proxy URL not known to be invalid.
    pub fn random(&self, provider_type: ProviderType, provider_id: &str) -> Option<String> {
        let pools = self.pools();
        let usable: Vec<&ProxyRecord> = pools
            .get(&provider_type)?
            .get(provider_id)?
            .iter()
            .filter(|record| record.validity != ProxyValidity::Invalid)
            .collect();
        usable.choose(&mut rand::rng()).map(|record| record.url())
    }

    pub fn proxies_for(&self, provider_type: ProviderType, provider_id: &str) -> Vec<ProxyRecord> {
        self.pools()
            .get(&provider_type)
            .and_then(|document| document.get(provider_id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn len_for(&self, provider_type: ProviderType, provider_id: &str) -> usize {
        self.pools()
            .get(&provider_type)
            .and_then(|document| document.get(provider_id))
            .map_or(0, Vec::len)
    }

    /// Write the current category document to disk.
    pub fn save(&self, provider_type: ProviderType) -> Result<(), PersistError> {
        self.mutate(provider_type, |_| ())
    }

    fn pools(&self) -> MutexGuard<'_, HashMap<ProviderType, CategoryDocument>> {
        self.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<T>(
        &self,
        provider_type: ProviderType,
        change: impl FnOnce(&mut CategoryDocument) -> T,
    ) -> Result<T, PersistError> {
        let _write = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (outcome, snapshot) = self.change_in_memory(provider_type, change);
        if let Some(document) = snapshot {
            self.write_document(provider_type, &document)?;
        }
        Ok(outcome)
    }

    fn change_in_memory<T>(
        &self,
        provider_type: ProviderType,
        change: impl FnOnce(&mut CategoryDocument) -> T,
    ) -> (T, Option<CategoryDocument>) {
        let mut pools = self.pools();
        let document = pools.entry(provider_type).or_default();
        let outcome = change(document);
        (outcome, self.writer.as_ref().map(|_| document.clone()))
    }

    fn write_document(&self, provider_type: ProviderType, document: &CategoryDocument) -> Result<(), PersistError> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(document).map_err(|err| PersistError::Malformed {
            path: file_name(provider_type),
            message: err.to_string(),
        })?;
        writer.write(&file_name(provider_type), &json)?;
        Ok(())
    }
}

fn drop_key(document: &mut CategoryDocument, provider_id: &str, key: &str) -> bool {
    let Some(entry) = document.get_mut(provider_id) else {
        return false;
    };
    let before = entry.len();
    entry.retain(|record| record.key() != key);
    entry.len() != before
}

pub fn file_name(provider_type: ProviderType) -> String {
    format!("{}_proxies.json", provider_type.as_str())
}

fn dedupe(records: &mut Vec<ProxyRecord>) {
    let mut seen = HashSet::new();
    records.retain(|record| seen.insert(record.key()));
}
