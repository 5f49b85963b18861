//! # 用户路由控制器
//!
//! 个人资料查询与修改、账户注销、余额充值与资金流水。

use axum::Json;
use axum::extract::{Path, State};

use fintechos_core::ledger::entity::InvestmentStatus;
use fintechos_core::store::port::TokenPurpose;
use fintechos_core::user::entity::AccountType;

use crate::error::ApiError;
use crate::middleware::auth::CurrentUser;
use crate::routes::auth::{deliver, frontend_link, issue_mail_token, validate_email};
use crate::server::AppState;
use crate::types::{
    ApiResponse, LedgerEntriesResponse, MessageResponse, TopUpRequest, TopUpResponse,
    UpdateProfileRequest, UpdateProfileResponse, UserEnvelope, UserResponse,
};

/// 头像数据上限 (2 MiB)
pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

/// 查看用户资料
///
/// 查看本人返回完整资料，查看他人只返回公开字段。
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "用户 (Users)",
    security(("bearer_jwt" = [])),
    params(("id" = String, Path, description = "用户 ID")),
    responses(
        (status = 200, description = "用户资料", body = ApiResponse<UserEnvelope>),
        (status = 404, description = "用户不存在", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserEnvelope>>, ApiError> {
    let user = if id == me.id {
        UserResponse::private(&me)
    } else {
        let other = state
            .user_store
            .get_user(&id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
        UserResponse::public(&other)
    };
    Ok(Json(ApiResponse::ok(UserEnvelope { user })))
}

/// 更新个人资料
///
/// # Logic
/// 1. 名称不能为空，简介与头像传空串表示清除。
/// 2. 新邮箱不直接生效：写入 `pendingEmail` 并向新地址发送确认邮件。
#[utoipa::path(
    patch,
    path = "/api/users/me",
    tag = "用户 (Users)",
    security(("bearer_jwt" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "更新成功", body = ApiResponse<UpdateProfileResponse>),
        (status = 400, description = "参数校验失败", body = crate::types::ApiErrorResponse),
        (status = 409, description = "邮箱已被占用", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(mut user): CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<UpdateProfileResponse>>, ApiError> {
    if let Some(name) = req.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::BadRequest("Name cannot be empty".into()));
        }
        user.name = name;
    }
    if let Some(about) = req.about {
        let about = about.trim().to_string();
        user.about = (!about.is_empty()).then_some(about);
    }
    if let Some(avatar) = req.avatar {
        if avatar.len() > MAX_AVATAR_BYTES {
            return Err(ApiError::BadRequest("Avatar must be 2MB or smaller".into()));
        }
        let avatar = avatar.trim().to_string();
        user.avatar_url = (!avatar.is_empty()).then_some(avatar);
    }

    let mut requested_email = None;
    if let Some(raw) = req.email {
        let email = validate_email(&raw)?;
        if email != user.email {
            if state.user_store.find_user_by_email(&email).await?.is_some() {
                return Err(ApiError::Conflict("Email already in use".into()));
            }
            user.pending_email = Some(email.clone());
            requested_email = Some(email);
        }
    }

    user.updated_at = state.clock.now();
    state.user_store.update_profile(&user).await?;

    let message = match &requested_email {
        Some(email) => {
            let token =
                issue_mail_token(&state, &user.id, TokenPurpose::EmailChange, Some(email.clone()))
                    .await?;
            let link = frontend_link(&state, "confirm-email", &token);
            deliver(
                &state,
                email,
                "Confirm your new email",
                &format!("Hi {},\n\nConfirm your new FintechOS email address: {}", user.name, link),
            )
            .await;
            tracing::info!("用户申请变更邮箱: {}", user.id);
            "Profile updated. Check your new email to confirm the change."
        }
        None => "Profile updated",
    };

    Ok(Json(ApiResponse::ok(UpdateProfileResponse {
        pending_email: user.pending_email.clone(),
        user: UserResponse::private(&user),
        message: message.to_string(),
    })))
}

/// 注销账户
///
/// 投资人仍持有有效投资、或 MSME 名下已有项目时拒绝注销。
#[utoipa::path(
    delete,
    path = "/api/users/me",
    tag = "用户 (Users)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "注销成功", body = ApiResponse<MessageResponse>),
        (status = 409, description = "仍有关联资产", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    match user.account_type {
        AccountType::Investor => {
            let holdings = state.allocation.investments_by_investor(&user.id).await?;
            if holdings
                .iter()
                .any(|i| i.status == InvestmentStatus::Completed)
            {
                return Err(ApiError::Conflict(
                    "Refund your active investments before deleting your account".into(),
                ));
            }
        }
        AccountType::Msme => {
            if user.deal_id.is_some() {
                return Err(ApiError::Conflict(
                    "Accounts that own a deal cannot be deleted".into(),
                ));
            }
        }
    }

    state.user_store.delete_user(&user.id).await?;
    tracing::info!("用户注销账户: {}", user.id);
    Ok(Json(ApiResponse::ok(MessageResponse::new("Account deleted"))))
}

/// 余额充值
#[utoipa::path(
    post,
    path = "/api/users/me/balance/top-up",
    tag = "用户 (Users)",
    security(("bearer_jwt" = [])),
    request_body = TopUpRequest,
    responses(
        (status = 200, description = "充值成功", body = ApiResponse<TopUpResponse>),
        (status = 400, description = "金额不合规", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn top_up(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<TopUpRequest>,
) -> Result<Json<ApiResponse<TopUpResponse>>, ApiError> {
    let receipt = state.allocation.top_up(&user.id, req.amount).await?;
    tracing::info!("用户充值: user={} amount={}", user.id, req.amount);
    Ok(Json(ApiResponse::ok(TopUpResponse {
        user: UserResponse::private(&receipt.user),
        entry: receipt.entry.into(),
    })))
}

/// 资金流水 (新的在前)
#[utoipa::path(
    get,
    path = "/api/users/me/ledger",
    tag = "用户 (Users)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "流水列表", body = ApiResponse<LedgerEntriesResponse>)
    )
)]
pub async fn ledger(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<LedgerEntriesResponse>>, ApiError> {
    let entries = state.allocation.ledger_entries(&user.id).await?;
    Ok(Json(ApiResponse::ok(LedgerEntriesResponse {
        entries: entries.into_iter().map(Into::into).collect(),
    })))
}
