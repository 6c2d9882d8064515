use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    #[default]
    Default,
    Asc,
    Desc,
}

impl Order {
    /// SQL keyword; the default order is ascending.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Default | Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipSort {
    /// No explicit sort; rows come back in principal id order.
    #[default]
    None,
    Name,
    Created,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipFilter {
    /// Case-insensitive substring matched against the member's display name.
    pub query: String,
    pub page: u32,
    pub size: u32,
    pub sort: MembershipSort,
    pub order: Order,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceSort {
    #[default]
    Uid,
    Path,
    Created,
    Updated,
}

/// Listing options for the children of a space (child spaces or repositories).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceFilter {
    /// Case-insensitive substring matched against the uid.
    pub query: String,
    pub page: u32,
    pub size: u32,
    pub sort: ResourceSort,
    pub order: Order,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathFilter {
    pub page: u32,
    pub size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order_is_ascending() {
        assert_eq!(Order::default().as_sql(), "ASC");
        assert_eq!(Order::Desc.as_sql(), "DESC");
    }
}
