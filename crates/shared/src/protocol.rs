use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    domain::{default_reactions, SessionName},
    error::ApiError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentSlide {
    pub available_reactions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Full snapshot pushed to every attached client after each mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationState {
    pub current_slide_index: u32,
    pub current_slide: CurrentSlide,
    pub reaction_counts: BTreeMap<String, u64>,
    pub show_live_reactions: bool,
}

impl Default for PresentationState {
    fn default() -> Self {
        Self {
            current_slide_index: 0,
            current_slide: CurrentSlide {
                available_reactions: default_reactions(),
                title: None,
            },
            reaction_counts: BTreeMap::new(),
            show_live_reactions: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSlideOptions {
    #[serde(default)]
    pub show_live_reactions: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Arguments of `set_slide`. Both the index and the vocabulary are decoded
/// leniently: whatever arrives is coerced later instead of failing the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetSlideRequest {
    #[serde(default, deserialize_with = "lenient_index")]
    pub index: f64,
    #[serde(default, deserialize_with = "lenient_symbols")]
    pub available_reactions: Vec<String>,
    #[serde(default)]
    pub options: SetSlideOptions,
}

impl SetSlideRequest {
    pub fn new(index: u32, available_reactions: Vec<String>, options: SetSlideOptions) -> Self {
        Self {
            index: f64::from(index),
            available_reactions,
            options,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRequest {
    pub reaction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    AdvanceSlideForward,
    AdvanceSlideBackward,
    SetSlide(SetSlideRequest),
    SubmitReaction(ReactionRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub session: SessionName,
    pub revision: u64,
    pub state: PresentationState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    StateUpdated(StateUpdate),
    Error(ApiError),
}

fn lenient_index<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    })
}

fn lenient_symbols<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let serde_json::Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    // One non-string entry makes the whole list malformed.
    items
        .into_iter()
        .map(|item| match item {
            serde_json::Value::String(s) => Some(s),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .map_or_else(|| Ok(Vec::new()), Ok)
}
