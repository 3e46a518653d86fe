// Request handlers for the HTTP API.

use std::convert::Infallible;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use dotsage_core::analytics::{self, Analytics, ProfileError, UserProfile};
use dotsage_core::examples::example_questions;
use dotsage_core::explore::{self, CategoryFilter, ExploreQuery, ExploreResult, SortKey};
use dotsage_core::now_ms;
use dotsage_core::protocol::{LedgerEvent, LlmEvent};
use dotsage_core::question::{Category, Question, SharePayload};
use dotsage_llm::Answer;
use futures_util::{future, stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

pub const ASK_TEXT_MIN: usize = 5;
pub const ASK_TEXT_MAX: usize = 2000;
pub const QUESTION_TEXT_MAX: usize = 1000;
pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

const TOKEN_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub text: String,
    pub category: Category,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    pub author: String,
    pub text: String,
    pub category: Category,
    /// Unix milliseconds; the server clock is used when absent.
    pub created_at: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub is_up: bool,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct QuestionPage {
    pub questions: Vec<Question>,
    pub total: u32,
}

#[derive(Debug, Deserialize)]
pub struct ExploreParams {
    pub category: Option<String>,
    pub q: Option<String>,
    pub sort: Option<String>,
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn text_len_ok(text: &str, max: usize) -> bool {
    (ASK_TEXT_MIN..=max).contains(&text.chars().count())
}

/// Unwrap a JSON body, collapsing every rejection into `Invalid payload`.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            debug!("Rejected body: {}", rejection.body_text());
            Err(ApiError::InvalidPayload)
        }
    }
}

fn question_id(path: Result<Path<u32>, PathRejection>) -> ApiResult<u32> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::BadRequest("Invalid question id".to_string()))
}

fn find_question(state: &AppState, id: u32) -> ApiResult<Question> {
    state
        .ledger
        .get_question(id)?
        .ok_or(ApiError::QuestionNotFound)
}

fn publish(state: &AppState, event: LedgerEvent) {
    // Err only means nobody is subscribed.
    if state.events.send(event).is_err() {
        debug!("No feed subscribers for ledger event");
    }
}

fn validated_ask(payload: Result<Json<AskRequest>, JsonRejection>) -> ApiResult<AskRequest> {
    let body = json_body(payload)?;
    if !text_len_ok(&body.text, ASK_TEXT_MAX) {
        return Err(ApiError::InvalidPayload);
    }
    Ok(body)
}

// ---------------------------------------------------------------------------
// Ask
// ---------------------------------------------------------------------------

/// POST /ask
pub async fn ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> ApiResult<Json<Answer>> {
    let AskRequest { text, category } = validated_ask(payload)?;

    match state.answerer.answer(&text, category).await {
        Ok(answer) => Ok(Json(answer)),
        Err(e) => {
            error!(%category, "Answer generation failed: {e:#}");
            Err(ApiError::AnswerFailed)
        }
    }
}

/// POST /ask/stream
///
/// Emits one `token` event per generated fragment, then a single `answer`
/// event carrying `{answer, sources}` (or an `error` event).
pub async fn ask_stream(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let AskRequest { text, category } = validated_ask(payload)?;

    let (token_tx, token_rx) = mpsc::channel(TOKEN_BUFFER);
    let (done_tx, done_rx) = oneshot::channel();
    let answerer = state.answerer.clone();

    tokio::spawn(async move {
        let result = answerer.stream(&text, category, token_tx).await;
        let _ = done_tx.send(result);
    });

    let tokens = stream::unfold(token_rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
    .filter_map(|event| {
        future::ready(match event {
            LlmEvent::Token { text } => Some(Event::default().event("token").data(text)),
            _ => None,
        })
    });

    let finale = stream::once(async move {
        match done_rx.await {
            Ok(Ok(answer)) => match Event::default().event("answer").json_data(&answer) {
                Ok(event) => event,
                Err(e) => {
                    error!("Failed to encode answer event: {e}");
                    failed_event()
                }
            },
            Ok(Err(e)) => {
                error!(%category, "Answer generation failed: {e:#}");
                failed_event()
            }
            Err(_) => {
                error!("Answer task ended without a result");
                failed_event()
            }
        }
    });

    let events = tokens.chain(finale).map(Ok::<_, Infallible>);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn failed_event() -> Event {
    Event::default()
        .event("error")
        .data("Failed to generate answer")
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

/// POST /questions
pub async fn create_question(
    State(state): State<AppState>,
    payload: Result<Json<NewQuestion>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = json_body(payload)?;
    let author = body.author.trim();
    if author.is_empty() || !text_len_ok(&body.text, QUESTION_TEXT_MAX) {
        return Err(ApiError::InvalidPayload);
    }

    let created_at = body.created_at.unwrap_or_else(now_ms);
    if i64::try_from(created_at).is_err() {
        return Err(ApiError::InvalidPayload);
    }
    let id = state
        .ledger
        .ask_question(author, &body.text, body.category, created_at)?;
    let question = find_question(&state, id)?;
    info!(id, category = %question.category, "Question asked");

    publish(
        &state,
        LedgerEvent::QuestionAsked {
            id,
            author: question.author.clone(),
            category: question.category,
        },
    );

    Ok((StatusCode::CREATED, Json(question)))
}

/// GET /questions?offset&limit
pub async fn list_questions(
    State(state): State<AppState>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<Json<QuestionPage>> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let offset = params.offset.unwrap_or(0);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .min(MAX_PAGE_LIMIT);

    let questions = state.ledger.get_questions(offset, limit)?;
    let total = state.ledger.count()?;
    Ok(Json(QuestionPage { questions, total }))
}

/// GET /questions/:id
pub async fn get_question(
    State(state): State<AppState>,
    id: Result<Path<u32>, PathRejection>,
) -> ApiResult<Json<Question>> {
    let id = question_id(id)?;
    Ok(Json(find_question(&state, id)?))
}

/// GET /questions/:id/answer
pub async fn question_answer(
    State(state): State<AppState>,
    id: Result<Path<u32>, PathRejection>,
) -> ApiResult<Json<Answer>> {
    let question = find_question(&state, question_id(id)?)?;

    match state
        .answerer
        .answer(&question.text, question.category)
        .await
    {
        Ok(answer) => Ok(Json(answer)),
        Err(e) => {
            error!(id = question.id, "Answer generation failed: {e:#}");
            Err(ApiError::AnswerFailed)
        }
    }
}

/// GET /questions/:id/share
pub async fn share_question(
    State(state): State<AppState>,
    id: Result<Path<u32>, PathRejection>,
) -> ApiResult<Json<SharePayload>> {
    let question = find_question(&state, question_id(id)?)?;
    Ok(Json(question.share_text(&state.config.server.public_url)))
}

/// POST /questions/:id/vote
pub async fn vote(
    State(state): State<AppState>,
    id: Result<Path<u32>, PathRejection>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> ApiResult<Json<Question>> {
    let id = question_id(id)?;
    let VoteRequest { is_up } = json_body(payload)?;

    if !state.ledger.vote(id, is_up)? {
        return Err(ApiError::QuestionNotFound);
    }
    let question = find_question(&state, id)?;
    info!(id, is_up, "Vote recorded");

    publish(&state, LedgerEvent::QuestionVoted { id, is_up });
    Ok(Json(question))
}

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

/// GET /explore?category&q&sort
pub async fn explore_questions(
    State(state): State<AppState>,
    params: Result<Query<ExploreParams>, QueryRejection>,
) -> ApiResult<Json<ExploreResult>> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let category = match params.category.as_deref() {
        Some(raw) => raw
            .parse::<CategoryFilter>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => CategoryFilter::All,
    };
    let sort = match params.sort.as_deref() {
        Some(raw) => raw
            .parse::<SortKey>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => SortKey::default(),
    };
    let query = ExploreQuery {
        category,
        search: params.q,
        sort,
    };

    let now = now_ms();
    let stored = state
        .ledger
        .recent_questions(state.config.questions.recent_limit)?;

    let result = if stored.is_empty() {
        explore::explore(&example_questions(now), &query, now, true)
    } else {
        explore::explore(&stored, &query, now, false)
    };
    Ok(Json(result))
}

/// GET /analytics
pub async fn site_analytics(State(state): State<AppState>) -> ApiResult<Json<Analytics>> {
    let questions = state
        .ledger
        .recent_questions(state.config.questions.analytics_limit)?;
    Ok(Json(analytics::compute(&questions)))
}

/// GET /users/:address
pub async fn user_profile(
    State(state): State<AppState>,
    address: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<UserProfile>> {
    let Path(address) = address
        .map_err(|_| ApiError::BadRequest(ProfileError::InvalidAddress.to_string()))?;
    let questions = state
        .ledger
        .recent_questions(state.config.questions.analytics_limit)?;

    analytics::user_profile(&questions, &address)
        .map(Json)
        .map_err(|e| match e {
            ProfileError::InvalidAddress => ApiError::BadRequest(e.to_string()),
            ProfileError::NoQuestions => ApiError::NotFound(e.to_string()),
        })
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// Any unmatched route.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}
