#![allow(dead_code)]

use std::sync::Arc;

use gitspace::cache::ReadThroughPrincipalCache;
use gitspace::context::Context;
use gitspace::store::{PrincipalStore, RepoStore, SpaceStore, SqliteMembershipStore, SqliteStore};
use gitspace::types::{NewPrincipal, NewRepository, NewSpace, PrincipalKind, Repository, Space};
use tempfile::TempDir;

/// A freshly initialized store in its own temp directory.
pub struct TestStore {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteStore>,
}

impl TestStore {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = SqliteStore::new(temp_dir.path().join("gitspace.db")).expect("open store");
        store.initialize().expect("initialize schema");
        Self {
            temp_dir,
            store: Arc::new(store),
        }
    }

    /// Opens a second, independent connection to the same database file.
    pub fn reopen(&self) -> SqliteStore {
        SqliteStore::new(self.temp_dir.path().join("gitspace.db")).expect("reopen store")
    }

    pub fn memberships(&self) -> SqliteMembershipStore {
        let cache = Arc::new(ReadThroughPrincipalCache::new(
            self.store.clone(),
            self.store.config().principal_cache_ttl(),
        ));
        SqliteMembershipStore::new(self.store.clone(), cache)
    }

    pub fn user(&self, uid: &str, display_name: &str) -> i64 {
        self.store
            .create_principal(
                &Context::background(),
                &NewPrincipal {
                    uid: uid.to_string(),
                    kind: PrincipalKind::User,
                    display_name: display_name.to_string(),
                    email: format!("{uid}@example.com"),
                },
            )
            .expect("create principal")
            .id
    }

    pub fn root_space(&self, uid: &str, owner: i64) -> Space {
        self.store
            .create_space(&Context::background(), &NewSpace::root(uid, owner))
            .expect("create space")
    }

    pub fn child_space(&self, parent: &Space, uid: &str, owner: i64) -> Space {
        self.store
            .create_space(&Context::background(), &NewSpace::child(parent.id, uid, owner))
            .expect("create child space")
    }

    pub fn repo(&self, space: &Space, uid: &str, owner: i64) -> Repository {
        self.store
            .create_repo(&Context::background(), &NewRepository::new(space.id, uid, owner))
            .expect("create repository")
    }
}
