// rest/routes/chat.rs — natural-language chat endpoint.
//
// One request, one turn: the middleware has already authenticated the caller,
// so resolve the message, dispatch the intent, and hand back the reply with
// the tool call record.  Nothing is retained between requests.

use axum::{extract::State, response::Json, Extension};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::agent;
use crate::auth::AuthUser;
use crate::AppContext;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Accepted for wire compatibility with older clients; conversations are
    /// not persisted server-side.
    pub conversation_id: Option<i64>,
}

pub async fn chat(
    State(ctx): State<Arc<AppContext>>,
    Extension(AuthUser(owner)): Extension<AuthUser>,
    Json(body): Json<ChatRequest>,
) -> Json<Value> {
    debug!(
        owner = %owner,
        conversation_id = ?body.conversation_id,
        "chat message received"
    );

    let outcome = agent::run(&body.message, &owner, &ctx.storage).await;

    Json(json!({
        "response": outcome.reply,
        "tool_calls": outcome.tool_calls,
    }))
}
