//! Gateway response bodies as they appear on the wire.
//!
//! These follow the OpenAI schema and are converted into the public result
//! types right after decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::response::{
    BalanceInfo, CompletionResult, FinishReason, GeneratedImage, ImageResult, ImageSource,
    ModelInfo, Usage,
};
use crate::streaming::StreamChunk;

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionBody {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ChatChoiceBody>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceBody {
    message: ChatMessageBody,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageBody {
    content: Option<String>,
}

impl ChatCompletionBody {
    pub(crate) fn into_result(self) -> Result<CompletionResult> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::decode("completion response contains no choices"))?;

        Ok(CompletionResult {
            id: self.id,
            model: self.model,
            text: choice.message.content.unwrap_or_default(),
            finish_reason: finish_reason(choice.finish_reason.as_deref()),
            usage: self.usage,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkBody {
    #[serde(default)]
    choices: Vec<ChunkChoiceBody>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoiceBody {
    #[serde(default)]
    delta: ChunkDeltaBody,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDeltaBody {
    content: Option<String>,
}

impl ChunkBody {
    pub(crate) fn into_chunk(self) -> StreamChunk {
        let (delta_text, finish_reason) = self
            .choices
            .into_iter()
            .next()
            .map(|choice| {
                (
                    choice.delta.content.filter(|text| !text.is_empty()),
                    finish_reason(choice.finish_reason.as_deref()),
                )
            })
            .unwrap_or_default();

        StreamChunk {
            delta_text,
            finish_reason,
            usage: self.usage,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImagesBody {
    created: Option<i64>,
    #[serde(default)]
    data: Vec<ImageDataBody>,
}

#[derive(Debug, Deserialize)]
struct ImageDataBody {
    url: Option<String>,
    b64_json: Option<String>,
    revised_prompt: Option<String>,
}

impl ImagesBody {
    pub(crate) fn into_result(self) -> Result<ImageResult> {
        let images = self
            .data
            .into_iter()
            .enumerate()
            .map(|(index, image)| {
                let source = match (image.b64_json, image.url) {
                    (Some(data), _) => ImageSource::Base64(data),
                    (None, Some(url)) => ImageSource::Url(url),
                    (None, None) => {
                        return Err(Error::decode(format!(
                            "image {index} has neither url nor b64_json"
                        )))
                    }
                };
                Ok(GeneratedImage {
                    source,
                    revised_prompt: image.revised_prompt,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ImageResult {
            created_at: self.created.and_then(timestamp),
            images,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelBody {
    id: String,
    #[serde(default)]
    owned_by: String,
    created: Option<i64>,
}

impl From<ModelBody> for ModelInfo {
    fn from(body: ModelBody) -> Self {
        Self {
            id: body.id,
            owned_by: body.owned_by,
            created_at: body.created.and_then(timestamp),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelListBody {
    #[serde(default)]
    data: Vec<ModelBody>,
}

impl ModelListBody {
    pub(crate) fn into_models(self) -> Vec<ModelInfo> {
        self.data.into_iter().map(ModelInfo::from).collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BalanceBody {
    #[serde(default, deserialize_with = "lenient_amount")]
    balance: i64,
    currency: Option<String>,
}

impl From<BalanceBody> for BalanceInfo {
    fn from(body: BalanceBody) -> Self {
        Self {
            amount: body.balance,
            currency: body
                .currency
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| Self::DEFAULT_CURRENCY.to_string()),
        }
    }
}

/// Some upstreams send `""` on every non-terminal chunk.
fn finish_reason(raw: Option<&str>) -> Option<FinishReason> {
    raw.filter(|reason| !reason.is_empty()).map(FinishReason::from)
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Accept the balance as an integer, a whole float or a numeric string.
fn lenient_amount<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    use serde::de::Error as _;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Amount::deserialize(deserializer)? {
        Amount::Int(value) => Ok(value),
        Amount::Float(value) if value.is_finite() && value.fract() == 0.0 => Ok(value as i64),
        Amount::Float(value) => Err(D::Error::custom(format!("balance {value} is not a whole number"))),
        Amount::Text(text) => text
            .trim()
            .replace(',', "")
            .parse()
            .map_err(|_| D::Error::custom(format!("balance '{text}' is not a number"))),
    }
}
