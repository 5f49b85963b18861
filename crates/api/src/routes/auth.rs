//! # 身份验证路由控制器
//!
//! 实现注册、登录、密码修改/重置与邮箱确认接口，以及供其他路由复用的密码哈希、
//! 一次性令牌与发信辅助函数。

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::TimeDelta;
use sha2::{Digest, Sha256};

use fintechos_core::common::{is_valid_email, normalize_email};
use fintechos_core::store::error::StoreError;
use fintechos_core::store::port::{TokenPurpose, VerificationToken};
use fintechos_core::user::entity::{AccountType, User};

use crate::error::ApiError;
use crate::middleware::auth::{CurrentUser, issue_jwt};
use crate::server::AppState;
use crate::types::{
    ApiResponse, AuthResponse, ChangePasswordRequest, ConfirmEmailRequest, ForgotPasswordRequest,
    MessageResponse, ResetPasswordRequest, SigninRequest, SignupRequest, UserEnvelope,
    UserResponse,
};

/// 密码最短长度
pub const MIN_PASSWORD_LEN: usize = 8;

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const INVALID_TOKEN: &str = "Invalid or expired token";
const FORGOT_MESSAGE: &str = "If that email is registered, a reset link has been sent.";

// ============================================================
//  复用的辅助函数
// ============================================================

pub(crate) fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub(crate) fn validate_email(raw: &str) -> Result<String, ApiError> {
    let email = normalize_email(raw);
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest(
            "Please provide a valid email address".into(),
        ));
    }
    Ok(email)
}

/// bcrypt 是 CPU 密集运算，放到阻塞线程池执行
pub(crate) async fn hash_password(password: &str, cost: u32) -> Result<String, ApiError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ApiError::Internal(format!("Hash task failed: {}", e)))?
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {}", e)))
}

pub(crate) async fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    let (password, hash) = (password.to_string(), hash.to_string());
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .map_err(|e| ApiError::Internal(format!("Verify task failed: {}", e)))
}

/// 令牌明文的 SHA-256 摘要 (hex)
pub(crate) fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// # Summary
/// 为用户签发一次性令牌并落库。
///
/// # Logic
/// 1. 以两个 UUIDv4 拼接出 64 位十六进制明文。
/// 2. 只保存明文摘要，有效期取 `auth.token_ttl_secs`。
///
/// # Returns
/// 令牌明文，只用于拼接邮件链接。
pub(crate) async fn issue_mail_token(
    state: &AppState,
    user_id: &str,
    purpose: TokenPurpose,
    payload: Option<String>,
) -> Result<String, ApiError> {
    let token = format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    );
    let ttl = i64::try_from(state.config.auth.token_ttl_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| ApiError::Internal("Invalid token TTL".into()))?;
    let now = state.clock.now();

    state
        .token_store
        .issue_token(&VerificationToken {
            token_hash: hash_token(&token),
            user_id: user_id.to_string(),
            purpose,
            payload,
            expires_at: now + ttl,
            created_at: now,
        })
        .await?;
    Ok(token)
}

/// 发送邮件，失败只记录日志不影响主流程
pub(crate) async fn deliver(state: &AppState, to: &str, subject: &str, body: &str) {
    if let Err(e) = state.notifier.send(to, subject, body).await {
        tracing::error!("邮件发送失败: to={} subject={} err={}", to, subject, e);
    }
}

/// 拼接前端链接
pub(crate) fn frontend_link(state: &AppState, path: &str, token: &str) -> String {
    format!(
        "{}/{}?token={}",
        state.config.server.frontend_url.trim_end_matches('/'),
        path,
        token
    )
}

// ============================================================
//  路由
// ============================================================

/// 用户注册
///
/// 创建投资人或 MSME 账户，返回 JWT 并发送邮箱验证邮件。
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    tag = "鉴权 (Auth)",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "注册成功", body = ApiResponse<AuthResponse>),
        (status = 400, description = "参数校验失败", body = crate::types::ApiErrorResponse),
        (status = 409, description = "邮箱已注册", body = crate::types::ApiErrorResponse),
        (status = 429, description = "请求过于频繁")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), ApiError> {
    // 1. 参数校验
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name is required".into()));
    }
    let account_type = match req.account_type.as_deref() {
        None => AccountType::Investor,
        Some(raw) => raw.parse::<AccountType>().map_err(ApiError::BadRequest)?,
    };

    if state.user_store.find_user_by_email(&email).await?.is_some() {
        tracing::warn!("重复注册: {}", email);
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    // 2. 落库 (唯一索引兜底并发注册)
    let hash = hash_password(&req.password, state.config.auth.bcrypt_cost).await?;
    let user = User::new(
        uuid::Uuid::new_v4().to_string(),
        email,
        hash,
        name,
        account_type,
        state.clock.now(),
    );
    state.user_store.insert_user(&user).await?;
    tracing::info!("新用户注册: id={} type={}", user.id, user.account_type);

    // 3. 邮箱验证
    let token = issue_mail_token(&state, &user.id, TokenPurpose::EmailVerification, None).await?;
    let link = frontend_link(&state, "verify-email", &token);
    deliver(
        &state,
        &user.email,
        "Verify your email",
        &format!("Welcome to FintechOS, {}!\n\nConfirm your email address: {}", user.name, link),
    )
    .await;

    let token = issue_jwt(&user, &state.config.auth, state.clock.now())?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(AuthResponse {
            user: UserResponse::private(&user),
            token,
        })),
    ))
}

/// 用户登录
///
/// 验证邮箱和密码，颁发 JWT Token。
#[utoipa::path(
    post,
    path = "/api/auth/signin",
    tag = "鉴权 (Auth)",
    request_body = SigninRequest,
    responses(
        (status = 200, description = "登录成功", body = ApiResponse<AuthResponse>),
        (status = 401, description = "邮箱或密码错误", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn signin(
    State(state): State<AppState>,
    Json(req): Json<SigninRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let email = normalize_email(&req.email);
    let Some(user) = state.user_store.find_user_by_email(&email).await? else {
        tracing::warn!("登录失败，邮箱不存在: {}", email);
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    };

    if !verify_password(&req.password, &user.password_hash).await? {
        tracing::warn!("登录失败，密码错误: {}", user.id);
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let token = issue_jwt(&user, &state.config.auth, state.clock.now())?;
    Ok(Json(ApiResponse::ok(AuthResponse {
        user: UserResponse::private(&user),
        token,
    })))
}

/// 当前登录用户
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "鉴权 (Auth)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "本人资料", body = ApiResponse<UserEnvelope>),
        (status = 401, description = "未认证")
    )
)]
pub async fn me(CurrentUser(user): CurrentUser) -> Json<ApiResponse<UserEnvelope>> {
    Json(ApiResponse::ok(UserEnvelope {
        user: UserResponse::private(&user),
    }))
}

/// 修改密码
///
/// 验证当前密码并设立新密码。
#[utoipa::path(
    post,
    path = "/api/auth/password/change",
    tag = "鉴权 (Auth)",
    security(("bearer_jwt" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "密码修改成功", body = ApiResponse<MessageResponse>),
        (status = 400, description = "当前密码错误或新密码不合规", body = crate::types::ApiErrorResponse),
        (status = 401, description = "未认证")
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if !verify_password(&req.current_password, &user.password_hash).await? {
        tracing::warn!("修改密码失败，当前密码错误: {}", user.id);
        return Err(ApiError::BadRequest("Current password is incorrect".into()));
    }
    validate_password(&req.new_password)?;

    let hash = hash_password(&req.new_password, state.config.auth.bcrypt_cost).await?;
    state
        .user_store
        .update_password(&user.id, &hash, state.clock.now())
        .await?;
    tracing::info!("用户修改密码: {}", user.id);

    Ok(Json(ApiResponse::ok(MessageResponse::new("Password updated"))))
}

/// 忘记密码
///
/// 无论邮箱是否存在都返回相同提示，避免枚举注册邮箱。
#[utoipa::path(
    post,
    path = "/api/auth/password/forgot",
    tag = "鉴权 (Auth)",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "已受理", body = ApiResponse<MessageResponse>)
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let email = normalize_email(&req.email);
    if let Some(user) = state.user_store.find_user_by_email(&email).await? {
        let token = issue_mail_token(&state, &user.id, TokenPurpose::PasswordReset, None).await?;
        let link = frontend_link(&state, "reset-password", &token);
        deliver(
            &state,
            &user.email,
            "Reset your password",
            &format!(
                "Hi {},\n\nReset your FintechOS password here: {}\n\nIf you did not request this, ignore this email.",
                user.name, link
            ),
        )
        .await;
        tracing::info!("已发送密码重置邮件: {}", user.id);
    }

    Ok(Json(ApiResponse::ok(MessageResponse::new(FORGOT_MESSAGE))))
}

/// 重置密码
#[utoipa::path(
    post,
    path = "/api/auth/password/reset",
    tag = "鉴权 (Auth)",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "重置成功", body = ApiResponse<MessageResponse>),
        (status = 400, description = "令牌无效或已过期", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    // 先校验新密码，避免令牌被不合规请求白白消费
    validate_password(&req.password)?;

    let record = state
        .token_store
        .consume_token(
            &hash_token(req.token.trim()),
            TokenPurpose::PasswordReset,
            state.clock.now(),
        )
        .await?
        .ok_or_else(|| ApiError::BadRequest(INVALID_TOKEN.into()))?;

    let hash = hash_password(&req.password, state.config.auth.bcrypt_cost).await?;
    state
        .user_store
        .update_password(&record.user_id, &hash, state.clock.now())
        .await
        .map_err(|e| match e {
            StoreError::NotFound => ApiError::BadRequest(INVALID_TOKEN.into()),
            other => other.into(),
        })?;
    tracing::info!("用户通过邮件重置密码: {}", record.user_id);

    Ok(Json(ApiResponse::ok(MessageResponse::new(
        "Password has been reset",
    ))))
}

/// 确认邮箱
///
/// 同一入口处理注册验证与邮箱变更确认。
#[utoipa::path(
    post,
    path = "/api/auth/email/confirm",
    tag = "鉴权 (Auth)",
    request_body = ConfirmEmailRequest,
    responses(
        (status = 200, description = "确认成功", body = ApiResponse<UserEnvelope>),
        (status = 400, description = "令牌无效或已过期", body = crate::types::ApiErrorResponse),
        (status = 409, description = "新邮箱已被占用", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn confirm_email(
    State(state): State<AppState>,
    Json(req): Json<ConfirmEmailRequest>,
) -> Result<Json<ApiResponse<UserEnvelope>>, ApiError> {
    let token_hash = hash_token(req.token.trim());
    let now = state.clock.now();

    let mut record = None;
    for purpose in [TokenPurpose::EmailVerification, TokenPurpose::EmailChange] {
        record = state
            .token_store
            .consume_token(&token_hash, purpose, now)
            .await?;
        if record.is_some() {
            break;
        }
    }
    let record = record.ok_or_else(|| ApiError::BadRequest(INVALID_TOKEN.into()))?;

    let mut user = state
        .user_store
        .get_user(&record.user_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest(INVALID_TOKEN.into()))?;

    if record.purpose == TokenPurpose::EmailChange {
        let new_email = record
            .payload
            .ok_or_else(|| ApiError::BadRequest(INVALID_TOKEN.into()))?;
        let taken = state.user_store.find_user_by_email(&new_email).await?;
        if taken.is_some_and(|other| other.id != user.id) {
            return Err(ApiError::Conflict("Email already in use".into()));
        }
        tracing::info!("用户确认邮箱变更: {} -> {}", user.id, new_email);
        user.email = new_email;
        user.pending_email = None;
    } else {
        tracing::info!("用户完成邮箱验证: {}", user.id);
    }
    user.email_verified = true;
    user.updated_at = now;
    state.user_store.update_profile(&user).await?;

    Ok(Json(ApiResponse::ok(UserEnvelope {
        user: UserResponse::private(&user),
    })))
}
