use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A newly submitted post as produced by a feed provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub channel: String,
    pub author: String,
    pub title: String,
    pub body: Option<String>,
    pub url: Option<String>,
    pub permalink: String,
    pub score: i64,
    pub created: DateTime<Utc>,
}

/// A newly written comment as produced by a feed provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub channel: String,
    pub author: String,
    pub body: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub score: i64,
    pub created: DateTime<Utc>,
}
