mod filter;
mod models;
mod permission;
mod role;

pub use filter::*;
pub use models::*;
pub use permission::Permission;
pub use role::MembershipRole;
