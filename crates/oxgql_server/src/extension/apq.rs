//! Automatic persisted queries: clients send a sha256 of the query text and
//! fall back to the full text once, after which the hash alone suffices.

use oxgql_core::{Cache, GqlError, Interceptor, LruCache, RawParams};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_CACHE_SIZE: usize = 1000;

#[derive(Deserialize)]
struct PersistedQuery {
    version: u64,
    #[serde(rename = "sha256Hash")]
    sha256_hash: String,
}

pub struct AutomaticPersistedQuery {
    cache: Arc<dyn Cache<String>>,
}

impl Default for AutomaticPersistedQuery {
    fn default() -> Self {
        Self {
            cache: Arc::new(LruCache::new(DEFAULT_CACHE_SIZE)),
        }
    }
}

impl AutomaticPersistedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: Arc<dyn Cache<String>>) -> Self {
        Self { cache }
    }
}

fn sha256_hex(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hex::encode(hasher.finalize())
}

impl Interceptor for AutomaticPersistedQuery {
    fn name(&self) -> &'static str {
        "AutomaticPersistedQuery"
    }

    fn mutate_params(&self, params: &mut RawParams) -> Result<(), GqlError> {
        let Some(raw) = params.extensions.get("persistedQuery") else {
            return Ok(());
        };
        let persisted: PersistedQuery = serde_json::from_value(raw.clone())
            .map_err(|_| GqlError::extension("persistedQuery extension could not be decoded"))?;
        if persisted.version != 1 {
            return Err(GqlError::extension(
                "persisted queries with version != 1 are unsupported",
            ));
        }

        if params.query.is_empty() {
            match self.cache.get(&persisted.sha256_hash) {
                Some(query) => {
                    debug!(hash = %persisted.sha256_hash, "persisted query hit");
                    params.query = query;
                    Ok(())
                }
                None => Err(GqlError::extension("PersistedQueryNotFound")
                    .with_code("PERSISTED_QUERY_NOT_FOUND")),
            }
        } else {
            if sha256_hex(&params.query) != persisted.sha256_hash {
                return Err(GqlError::extension("provided sha does not match query"));
            }
            self.cache
                .insert(persisted.sha256_hash, params.query.clone());
            Ok(())
        }
    }
}
