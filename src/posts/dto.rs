use serde::{Deserialize, Serialize};

/// Body for creating a post or a comment.
#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub msg: String,
}
