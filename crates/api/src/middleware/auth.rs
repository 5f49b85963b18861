//! # 鉴权中间件
//!
//! 提供基于 JWT 的身份验证与按账户类型的访问控制。

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use fintechos_core::config::AuthConfig;
use fintechos_core::user::entity::{AccountType, User};

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::Claims;

/// 提取并验证 Authorization: Bearer <token>
///
/// # Logic
/// 1. 解析 `Bearer` 前缀并校验签名与过期时间。
/// 2. 回库加载用户，已注销的用户即使持有未过期 Token 也会被拒绝。
/// 3. 将 `User` 与 `Claims` 注入 request extensions。
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = match req.headers().get(axum::http::header::AUTHORIZATION) {
        Some(header_val) => {
            let s = header_val
                .to_str()
                .map_err(|_| ApiError::Unauthorized("Invalid auth header".into()))?;
            match s.strip_prefix("Bearer ") {
                Some(t) => t.trim().to_string(),
                None => {
                    tracing::warn!("Invalid Bearer format");
                    return Err(ApiError::Unauthorized("Invalid Bearer format".into()));
                }
            }
        }
        None => {
            tracing::warn!("Missing Authorization header: {}", req.uri().path());
            return Err(ApiError::Unauthorized("Authentication required".into()));
        }
    };

    let claims = verify_jwt(&token, &state.config.auth.jwt_secret).inspect_err(|e| {
        tracing::warn!("JWT verification failed: {:?}", e);
    })?;

    let user = state
        .user_store
        .get_user(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;

    req.extensions_mut().insert(user);
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// # Summary
/// 为用户签发 HS256 JWT。
///
/// # Arguments
/// * `user`: 签发对象。
/// * `auth`: 提供密钥与有效期。
/// * `now`: 签发时间，测试中来自虚拟时钟。
pub fn issue_jwt(user: &User, auth: &AuthConfig, now: DateTime<Utc>) -> Result<String, ApiError> {
    let exp = now.timestamp().max(0).unsigned_abs() + auth.jwt_expires_in_secs;
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        role: user.account_type.to_string(),
        exp: usize::try_from(exp)
            .map_err(|_| ApiError::Internal("Token expiry out of range".into()))?,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(auth.jwt_secret.as_ref()),
    )
    .map_err(|e| ApiError::Internal(format!("Failed to generate token: {}", e)))
}

/// 验证 JWT 返回强类型 Claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let mut validation = Validation::default();
    validation.set_required_spec_claims(&["exp", "sub"]);

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )
    .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;

    Ok(token_data.claims)
}

/// 要求调用者为指定账户类型，否则返回 403
pub fn require_account(user: &User, account_type: AccountType) -> Result<(), ApiError> {
    if user.account_type != account_type {
        tracing::warn!(
            "账户类型不符: user={} expected={} actual={}",
            user.id,
            account_type,
            user.account_type
        );
        let msg = match account_type {
            AccountType::Investor => "Only investor accounts can perform this action",
            AccountType::Msme => "Only business accounts can perform this action",
        };
        return Err(ApiError::Forbidden(msg.into()));
    }
    Ok(())
}

// 在提取器中获取当前用户的快捷方式
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<User>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Missing User Context".into()))?;
        Ok(CurrentUser(user))
    }
}
