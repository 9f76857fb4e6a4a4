use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::error::{Result, WordBattleError};
use crate::game::GameContext;

// Request bodies are a handful of short strings.
const MAX_BODY_BYTES: u64 = 16 * 1024;

const ALLOWED_HEADERS: [&str; 3] = ["Content-Type", "Authorization", "X-Api-Key"];
const ALLOWED_METHODS: [&str; 5] = ["GET", "POST", "PUT", "DELETE", "OPTIONS"];

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserInput {
    pub username: String,
    pub word: String,
    #[serde(default)]
    pub leaderboard: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UserIdInput {
    pub uuid: Uuid,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ListTopUsersInput {
    #[serde(default)]
    pub leaderboard: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct GetBattleInput {
    pub uuid: Uuid,
    pub timestamp: u64,
}

/// `{"funcName": "...", "data": {...}}`
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "funcName", content = "data", rename_all = "camelCase")]
pub enum Request {
    RegisterUser(RegisterUserInput),
    GetUser(UserIdInput),
    ListTopUsers(ListTopUsersInput),
    Battle(UserIdInput),
    GetBattle(GetBattleInput),
    ListBattles(UserIdInput),
}

impl Request {
    pub fn func_name(&self) -> &'static str {
        match self {
            Request::RegisterUser(_) => "registerUser",
            Request::GetUser(_) => "getUser",
            Request::ListTopUsers(_) => "listTopUsers",
            Request::Battle(_) => "battle",
            Request::GetBattle(_) => "getBattle",
            Request::ListBattles(_) => "listBattles",
        }
    }
}

/// Runs one request against the game and shapes the JSON result.
pub async fn dispatch(ctx: &GameContext, req: Request) -> Result<Value> {
    let body = match req {
        Request::RegisterUser(input) => {
            let user = ctx
            .register_user(&input.username, &input.word, input.leaderboard.as_deref())
            .await?;
            json!(user)
        }
        Request::GetUser(input) => json!({ "userRecord": ctx.get_user(input.uuid).await? }),
        Request::ListTopUsers(input) => {
            let users = ctx.list_top_users(input.leaderboard.as_deref(), input.limit).await?;
            json!({ "userRecords": users })
        }
        Request::Battle(input) => json!(ctx.battle(input.uuid).await?),
        Request::GetBattle(input) => json!(ctx.get_battle(input.uuid, input.timestamp).await?),
        Request::ListBattles(input) => json!({ "battles": ctx.list_battles(input.uuid).await? }),
    };
    Ok(body)
}

fn error_reply(status: StatusCode, kind: &str, message: String) -> warp::reply::Response {
    warp::reply::with_status(warp::reply::json(&json!({ "error": message, "kind": kind })), status).into_response()
}

async fn handle_request(req: Request, ctx: Arc<GameContext>) -> std::result::Result<warp::reply::Response, Infallible> {
    let func_name = req.func_name();
    match dispatch(&ctx, req).await {
        Ok(body) => {
            info!(func_name, "request handled");
            Ok(warp::reply::json(&body).into_response())
        }
        Err(e) => {
            let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                error!(func_name, error = %e, "request failed");
            } else {
                warn!(func_name, error = %e, "request rejected");
            }
            Ok(error_reply(status, e.kind(), e.to_string()))
        }
    }
}

async fn handle_rejection(err: Rejection) -> std::result::Result<warp::reply::Response, Infallible> {
    if err.is_not_found() {
        return Ok(error_reply(StatusCode::NOT_FOUND, "NotFound", "Unknown route".to_string()));
    }
    if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, "ValidationError", e.to_string()));
    }
    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(error_reply(StatusCode::PAYLOAD_TOO_LARGE, "ValidationError", "Request body too large".to_string()));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply(StatusCode::METHOD_NOT_ALLOWED, "ValidationError", "Method not allowed".to_string()));
    }
    error!(rejection = ?err, "unhandled rejection");
    Ok(error_reply(StatusCode::INTERNAL_SERVER_ERROR, "ServerError", "Internal server error".to_string()))
}

fn with_ctx(ctx: Arc<GameContext>) -> impl Filter<Extract = (Arc<GameContext>,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

/// `POST /` dispatch endpoint, `GET /health`, CORS for browser clients.
pub fn routes(ctx: Arc<GameContext>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let api = warp::post()
    .and(warp::path::end())
    .and(warp::body::content_length_limit(MAX_BODY_BYTES))
    .and(warp::body::json())
    .and(with_ctx(ctx))
    .and_then(handle_request);

    let health = warp::get()
    .and(warp::path("health"))
    .and(warp::path::end())
    .map(|| "ok");

    let cors = warp::cors()
    .allow_any_origin()
    .allow_headers(ALLOWED_HEADERS)
    .allow_methods(ALLOWED_METHODS);

    api.or(health)
    .recover(handle_rejection)
    .with(cors)
    .with(warp::trace::request())
}

pub struct WordBattleServer {
    ctx: Arc<GameContext>,
}

impl WordBattleServer {
    pub fn new(ctx: Arc<GameContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, addr: SocketAddr) {
        info!(%addr, "word battle API listening");
        warp::serve(routes(self.ctx.clone())).run(addr).await;
    }
}
