mod principal_info;

pub use principal_info::ReadThroughPrincipalCache;

use std::collections::HashMap;

use crate::context::Context;
use crate::error::Result;
use crate::types::PrincipalInfo;

/// Batched lookup of principal display info.
pub trait PrincipalInfoCache: Send + Sync {
    /// Info for every id that names an existing principal. Ids without a
    /// principal are absent from the map; that is not an error.
    fn map(&self, ctx: &Context, ids: &[i64]) -> Result<HashMap<i64, PrincipalInfo>>;
}
