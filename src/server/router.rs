use crate::features::auth::auth_helpers;
use crate::features::renewals::run_renewal_pass;
use crate::features::subscriptions::{
    self, CreateSubscriptionDto, SubscriptionStatus, UpdateSubscriptionDto, UpcomingWindow,
};
use crate::features::auth::Owner;
use crate::shared::errors::{AppError, AppResult, ErrorSeverity};
use crate::AppState;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;

/// リクエストボディの上限（64 KiB）
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// ルーティング結果
#[derive(Debug)]
struct ApiResponse {
    status: StatusCode,
    body: Value,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    fn created(body: Value) -> Self {
        Self {
            status: StatusCode::CREATED,
            body,
        }
    }

    fn route_not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: json!({ "error": "Not Found" }),
        }
    }

    fn method_not_allowed() -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            body: json!({ "error": "Method Not Allowed" }),
        }
    }
}

/// HTTPリクエストを処理する
///
/// ボディを上限付きで読み込んだ後、ロック取得を含む処理はすべて同期的に行う。
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<String>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let bearer = auth_helpers::extract_bearer_token(
        req.headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok()),
    )
    .map(str::to_string);

    log::debug!("リクエストを受信: {method} {path}");

    let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            log::warn!("リクエストボディが大きすぎます: {method} {path}");
            return Ok(json_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &json!({ "error": "リクエストボディが大きすぎます" }),
            ));
        }
        Err(e) => {
            log::warn!("リクエストボディの読み込みに失敗しました: {e}");
            return Ok(json_response(
                StatusCode::BAD_REQUEST,
                &json!({ "error": "リクエストボディを読み込めません" }),
            ));
        }
    };

    let response = match route(&state, &method, &path, &query, bearer.as_deref(), &body) {
        Ok(api) => json_response(api.status, &api.body),
        Err(error) => error_response(&method, &path, &error),
    };

    log::debug!("レスポンス: {method} {path} -> {}", response.status());
    Ok(response)
}

fn route(
    state: &AppState,
    method: &Method,
    path: &str,
    query: &str,
    bearer: Option<&str>,
    body: &[u8],
) -> AppResult<ApiResponse> {
    if auth_helpers::is_public_endpoint(path) {
        return match *method {
            Method::GET => Ok(ApiResponse::ok(json!({ "status": "ok" }))),
            _ => Ok(ApiResponse::method_not_allowed()),
        };
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        ["api", "cron"] => match *method {
            Method::GET | Method::POST => handle_cron(state, bearer),
            _ => Ok(ApiResponse::method_not_allowed()),
        },
        ["api", "subscriptions", rest @ ..] => {
            let owner = state.auth.authenticate_request(bearer, path)?;
            route_subscriptions(state, &owner, method, rest, query, body)
        }
        _ => Ok(ApiResponse::route_not_found()),
    }
}

fn route_subscriptions(
    state: &AppState,
    owner: &Owner,
    method: &Method,
    rest: &[&str],
    query: &str,
    body: &[u8],
) -> AppResult<ApiResponse> {
    match (method, rest) {
        (&Method::GET, []) => {
            let status = query_param(query, "status")
                .map(|s| s.parse::<SubscriptionStatus>())
                .transpose()?;
            let list = subscriptions::get_subscriptions(state, owner, status)?;
            Ok(ApiResponse::ok(json!({ "subscriptions": list })))
        }
        (&Method::POST, []) => {
            let dto: CreateSubscriptionDto = serde_json::from_slice(body)?;
            let created = subscriptions::create_subscription(state, owner, dto)?;
            Ok(ApiResponse::created(json!({ "subscription": created })))
        }
        (&Method::GET, ["active"]) => {
            let list = subscriptions::get_active_subscriptions(state, owner)?;
            Ok(ApiResponse::ok(json!({ "subscriptions": list })))
        }
        (&Method::GET, ["monthly-total"]) => {
            let spend = subscriptions::get_monthly_subscription_total(state, owner)?;
            Ok(ApiResponse::ok(serde_json::to_value(spend)?))
        }
        (&Method::GET, ["upcoming"]) => {
            let window = parse_window(query)?;
            let renewals = subscriptions::get_upcoming_renewals(state, owner, window)?;
            Ok(ApiResponse::ok(json!({ "renewals": renewals })))
        }
        (&Method::GET, ["analytics"]) => {
            let breakdown = subscriptions::get_spending_analytics(state, owner)?;
            Ok(ApiResponse::ok(serde_json::to_value(breakdown)?))
        }
        (&Method::PATCH, [id]) => {
            let value: Value = serde_json::from_slice(body)?;
            let dto = UpdateSubscriptionDto::from_json(&value)?;
            let updated = subscriptions::update_subscription(state, owner, id, dto)?;
            Ok(ApiResponse::ok(json!({ "subscription": updated })))
        }
        (&Method::DELETE, [id]) => {
            subscriptions::delete_subscription(state, owner, id)?;
            Ok(ApiResponse::ok(json!({ "success": true })))
        }
        (_, [] | [_]) => Ok(ApiResponse::method_not_allowed()),
        _ => Ok(ApiResponse::route_not_found()),
    }
}

/// スケジューラーからの更新日繰り越し要求を処理する
fn handle_cron(state: &AppState, bearer: Option<&str>) -> AppResult<ApiResponse> {
    state.scheduler.verify(bearer)?;

    let today = state.config.today();
    let report = {
        let db = state.lock_db()?;
        run_renewal_pass(&db, today)?
    };

    Ok(ApiResponse::ok(json!({
        "message": format!("{}件のサブスクリプションの更新日を繰り越しました", report.advanced),
        "due": report.due,
        "advanced": report.advanced,
        "skipped": report.skipped,
        "conflicts": report.conflicts,
        "failed": report.failed,
    })))
}

/// クエリ文字列から値を取り出す
fn query_param(query: &str, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// 更新予定の検索範囲をクエリから取得する（未指定の値はデフォルト）
fn parse_window(query: &str) -> AppResult<UpcomingWindow> {
    let default = UpcomingWindow::default();

    let parse_days = |key: &str, fallback: i64| -> AppResult<i64> {
        match query_param(query, key) {
            Some(value) => value
                .parse::<i64>()
                .map_err(|_| AppError::validation(format!("{key} は整数で指定してください"))),
            None => Ok(fallback),
        }
    };

    UpcomingWindow::new(
        parse_days("from", default.from_days())?,
        parse_days("to", default.to_days())?,
    )
}

fn json_response(status: StatusCode, body: &Value) -> Response<String> {
    let mut response = Response::new(body.to_string());
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}

fn error_response(method: &Method, path: &str, error: &AppError) -> Response<String> {
    match error.severity() {
        ErrorSeverity::High | ErrorSeverity::Critical => {
            log::error!("リクエスト処理エラー: {method} {path}: {}", error.details());
        }
        ErrorSeverity::Medium | ErrorSeverity::Low => {
            log::warn!("リクエストを拒否しました: {method} {path}: {}", error.details());
        }
    }

    json_response(
        error.status_code(),
        &json!({ "error": error.user_message() }),
    )
}
