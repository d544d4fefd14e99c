//! Prompt building: turns an entity into a generation request and renders it
//! for a chat model.

use crate::change_log::ChangeRecord;
use crate::entity::{Entity, EntityId};
use crate::error::{DirectorError, DirectorResult, ModelError};
use crate::facts::Fact;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// First line of the system prompt; echoed output containing it is rejected.
pub const SYSTEM_PROMPT_HEADER: &str = "You are the Room Director for a text world.";

const SYSTEM_PROMPT_RULES: &str = "\
Rewrite the description of the entity to reflect its current facts and recent changes.

Grounding rules:
- Pinned facts are authoritative and must stay true in the description.
- The previous description is advisory: keep what still holds, edit incrementally.
- Do NOT mention anything not supported by pinned facts, recent changes, or anchors.
- If something appeared previously but is no longer grounded, remove it.

Return STRICT JSON ONLY (no markdown, no extra text).
Schema: {\"desc\": str, \"facts\": [str]}

Rules:
- desc: 1-2 short paragraphs, present tense, evocative but not purple prose.
- Do not list every fact; weave the most salient into the scene.
- facts: 3-10 short, stable anchors grounded in the facts above.";

/// Everything a model needs to regenerate one description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub entity_id: EntityId,
    pub entity_name: String,
    /// Ordered by key.
    pub pinned_facts: Vec<Fact>,
    /// Chronological.
    pub change_summary: Vec<ChangeRecord>,
    pub previous_description: String,
    pub anchors: Vec<String>,
}

impl GenerationRequest {
    /// Number of change records this request consumes when committed.
    pub fn consumed_changes(&self) -> usize {
        self.change_summary.len()
    }
}

/// A chat prompt rendered from a [`GenerationRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// A model's answer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Generation {
    pub text: String,
    pub anchors: Vec<String>,
}

impl Generation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            anchors: Vec::new(),
        }
    }

    pub fn with_anchors<I, S>(mut self, anchors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.anchors = anchors.into_iter().map(Into::into).collect();
        self
    }
}

/// Deterministic, side-effect-free request builder.
pub struct PromptBuilder;

impl PromptBuilder {
    /// Build a request from the entity's pinned facts, pending changes and
    /// previous description.
    pub fn build(entity: &Entity) -> DirectorResult<GenerationRequest> {
        if entity.fact_count() == 0 && entity.description.trim().is_empty() {
            return Err(DirectorError::InsufficientContext(entity.id));
        }

        let mut pinned_facts: Vec<Fact> = entity.pinned_facts().cloned().collect();
        pinned_facts.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(GenerationRequest {
            entity_id: entity.id,
            entity_name: entity.name.clone(),
            pinned_facts,
            change_summary: entity.change_log().records().to_vec(),
            previous_description: entity.description.clone(),
            anchors: entity.anchors.clone(),
        })
    }

    /// Render a request as a system + user chat prompt.
    pub fn render(request: &GenerationRequest) -> RenderedPrompt {
        let payload = json!({
            "entity": request.entity_name,
            "previous_desc": request.previous_description,
            "pinned_facts": request.pinned_facts.iter().map(Fact::render).collect::<Vec<_>>(),
            "changes": request.change_summary.iter().map(ChangeRecord::render).collect::<Vec<_>>(),
            "anchors": request.anchors,
        });

        RenderedPrompt {
            system: format!("{SYSTEM_PROMPT_HEADER}\n{SYSTEM_PROMPT_RULES}"),
            user: payload.to_string(),
        }
    }
}

/// Interpret raw model output.
///
/// The reply must contain a JSON object with a non-empty `desc`; `facts` is
/// optional. Truncated or malformed JSON is rejected, never committed.
pub fn parse_generation(raw: &str) -> Result<Generation, ModelError> {
    let Some(value) = llm::extract_json_object(raw) else {
        return Err(ModelError::InvalidResponse(
            "reply is not a JSON object".to_string(),
        ));
    };

    let text = value
        .get("desc")
        .and_then(|d| d.as_str())
        .map(str::trim)
        .unwrap_or_default();
    if text.is_empty() {
        return Err(ModelError::InvalidResponse(
            "reply has no desc".to_string(),
        ));
    }

    let anchors = value
        .get("facts")
        .and_then(|f| f.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                })
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(Generation {
        text: text.to_string(),
        anchors,
    })
}
