//! # Gitspace
//!
//! Namespace and membership storage for a self-hosted source-control
//! platform. Spaces nest into a tree, repositories live in spaces, and both
//! share one global namespace of paths. Renames and moves can keep the old
//! path as a forwarding alias. Memberships grant principals a role on a space.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gitspace::cache::ReadThroughPrincipalCache;
//! use gitspace::config::StoreConfig;
//! use gitspace::context::Context;
//! use gitspace::store::{PathStore, SqliteMembershipStore, SqliteStore};
//!
//! let config = StoreConfig::default();
//! let store = Arc::new(SqliteStore::open(&config).unwrap());
//! store.initialize().unwrap();
//!
//! let cache = Arc::new(ReadThroughPrincipalCache::new(
//!     store.clone(),
//!     config.principal_cache_ttl(),
//! ));
//! let memberships = SqliteMembershipStore::new(store.clone(), cache);
//!
//! let target = store.resolve(&Context::background(), "/acme/web")?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `gitspace` admin binary. Disable with `default-features = false`.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod store;
pub mod types;
