use crate::core::error::PostingError;
use crate::core::intake::RawRewardRequest;
use crate::core::model::RewardId;
use crate::core::posting::{PostingEngine, PostingOutcome};
use anyhow::{Result, anyhow};
use serde::Serialize;

/// Body printed for every posting attempt, shaped like the wire response.
#[derive(Debug, Serialize, PartialEq)]
pub struct RewardResponse {
    pub status_code: u16,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_id: Option<RewardId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl From<&Result<PostingOutcome, PostingError>> for RewardResponse {
    fn from(result: &Result<PostingOutcome, PostingError>) -> Self {
        match result {
            Ok(outcome) => RewardResponse {
                status_code: outcome.status_code(),
                status: outcome.status().to_string(),
                reward_id: Some(outcome.reward_id()),
                message: None,
                messages: Vec::new(),
            },
            Err(err) => RewardResponse {
                status_code: err.status_code(),
                status: err.code().to_string(),
                reward_id: None,
                message: Some(err.to_string()),
                messages: match err {
                    PostingError::Validation(v) => v.messages.clone(),
                    _ => Vec::new(),
                },
            },
        }
    }
}

/// Posts one reward and prints the response. A rejected posting is an error.
pub async fn run(engine: &PostingEngine, request: RawRewardRequest) -> Result<()> {
    let result = engine.post_reward(request).await;
    let response = RewardResponse::from(&result);
    println!("{}", serde_json::to_string_pretty(&response)?);

    result
        .map(|_| ())
        .map_err(|e| anyhow!("Reward rejected ({}): {}", e.code(), e))
}
