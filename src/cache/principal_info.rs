use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tracing::debug;

use super::PrincipalInfoCache;
use crate::context::Context;
use crate::error::Result;
use crate::store::PrincipalStore;
use crate::types::PrincipalInfo;

/// Upper bound on cached principals.
const MAX_ENTRIES: u64 = 10_000;

/// Keeps principal info in memory for `ttl` and fetches every miss of a
/// lookup from the principal store in a single query.
pub struct ReadThroughPrincipalCache {
    store: Arc<dyn PrincipalStore>,
    entries: Cache<i64, PrincipalInfo>,
}

impl ReadThroughPrincipalCache {
    pub fn new(store: Arc<dyn PrincipalStore>, ttl: Duration) -> Self {
        Self {
            store,
            entries: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Drops one principal so the next lookup reads it again.
    pub fn invalidate(&self, id: i64) {
        self.entries.invalidate(&id);
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

impl PrincipalInfoCache for ReadThroughPrincipalCache {
    fn map(&self, ctx: &Context, ids: &[i64]) -> Result<HashMap<i64, PrincipalInfo>> {
        let mut found = HashMap::with_capacity(ids.len());
        let mut misses = Vec::new();
        let mut seen = HashSet::with_capacity(ids.len());

        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.entries.get(&id) {
                Some(info) => {
                    found.insert(id, info);
                }
                None => misses.push(id),
            }
        }

        if misses.is_empty() {
            return Ok(found);
        }

        let fetched = self.store.find_principal_infos(ctx, &misses)?;
        debug!(
            requested = misses.len(),
            fetched = fetched.len(),
            "loaded principal info"
        );

        for info in fetched {
            self.entries.insert(info.id, info.clone());
            found.insert(info.id, info);
        }

        Ok(found)
    }
}
