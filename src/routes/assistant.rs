use anyhow::Context;
use axum::{Extension, Json, extract::State, response::IntoResponse};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use validator::{Validate, ValidationError};

use crate::{
    api::assistant::{self, CONTEXT_WINDOW, ChatSender},
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::CurrentUser,
    middleware,
    models::{ChatMessageEntity, CreateChatMessageEntity},
    schema::chat_messages,
};

/// Defines the assistant chat routes. Each user has a private transcript.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/assistant",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_messages, send_message))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authorization,
            )),
    )
}

fn not_blank(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Message cannot be empty".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Deserialize, Validate, ToSchema)]
pub(crate) struct SendMessageReq {
    #[validate(custom = "not_blank")]
    pub content: String,
}

#[derive(Serialize, ToSchema)]
pub(crate) struct ChatExchange {
    pub question: ChatMessageEntity,
    pub answer: ChatMessageEntity,
}

/// The caller's transcript, oldest first.
#[utoipa::path(
    get,
    path = "/messages",
    tags = ["Assistant"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Chat transcript", body = StdResponse<Vec<ChatMessageEntity>, String>)
    )
)]
async fn get_messages(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let messages: Vec<ChatMessageEntity> = chat_messages::table
        .filter(chat_messages::owner_uid.eq(&user.uid))
        .order_by(chat_messages::created_at.asc())
        .get_results(conn)
        .await
        .context("Failed to get chat messages")?;

    Ok(StdResponse {
        data: Some(messages),
        message: Some("Get chat messages successfully"),
    })
}

/// Ask the assistant. The question is kept even when the assistant fails.
#[utoipa::path(
    post,
    path = "/messages",
    tags = ["Assistant"],
    security(("bearerAuth" = [])),
    request_body = SendMessageReq,
    responses(
        (status = 200, description = "Assistant replied", body = StdResponse<ChatExchange, String>),
        (status = 502, description = "Assistant unavailable")
    )
)]
async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<SendMessageReq>,
) -> Result<impl IntoResponse, AppError> {
    body.validate()?;
    let pharmacy_id = user.pharmacy_id()?.to_string();

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let question: ChatMessageEntity = diesel::insert_into(chat_messages::table)
        .values(CreateChatMessageEntity {
            pharmacy_id: pharmacy_id.clone(),
            owner_uid: user.uid.clone(),
            sender: ChatSender::User.as_str().to_string(),
            content: body.content,
        })
        .returning(ChatMessageEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to save chat message")?;

    let mut transcript: Vec<ChatMessageEntity> = chat_messages::table
        .filter(chat_messages::owner_uid.eq(&user.uid))
        .order_by(chat_messages::created_at.desc())
        .limit(CONTEXT_WINDOW as i64)
        .get_results(conn)
        .await
        .context("Failed to get chat messages")?;
    transcript.reverse();

    let reply = assistant::generate_reply(state.http_client.clone(), &state.api_urls, &transcript)
        .await
        .inspect_err(|err| tracing::warn!(uid = %user.uid, "Assistant call failed: {}", err))?;

    let answer: ChatMessageEntity = diesel::insert_into(chat_messages::table)
        .values(CreateChatMessageEntity {
            pharmacy_id,
            owner_uid: user.uid.clone(),
            sender: ChatSender::Bot.as_str().to_string(),
            content: reply,
        })
        .returning(ChatMessageEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to save chat reply")?;

    Ok(StdResponse {
        data: Some(ChatExchange { question, answer }),
        message: Some("Assistant replied"),
    })
}
