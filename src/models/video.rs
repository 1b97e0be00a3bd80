use serde::{Deserialize, Serialize};

/// One entry of a resolved playlist. Value-only; nothing is downloaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoDescriptor {
    pub url: String,
    pub title: String,
    pub thumbnail: String,
}
