use serde_json::{json, Value};
use tracing::{error, info};

use crate::api::ApiClient;
use crate::error::{ClientError, Result};
use crate::models::{AuthResponse, LoginRequest, SignupRequest, UploadFile, User, UserUpdate};
use crate::query::{Query, Relation};

fn with_profile_image() -> Query {
    Query::new().populate("profileImage", Relation::new().fields(["name", "url"]))
}

pub async fn login(api: &ApiClient, identifier: &str, password: &str) -> Result<AuthResponse> {
    let body = serde_json::to_value(LoginRequest {
        identifier: identifier.to_string(),
        password: password.to_string(),
    })?;

    let auth: AuthResponse = api.post_public("/api/auth/local", body).await?;
    info!("Logged in as user {}", auth.user.id);
    Ok(auth)
}

pub async fn signup(api: &ApiClient, request: &SignupRequest) -> Result<AuthResponse> {
    let body = serde_json::to_value(request)?;

    let auth: AuthResponse = api.post_public("/api/auth/local/register", body).await?;
    info!("Registered user {} ({})", auth.user.id, auth.user.email);
    Ok(auth)
}

pub async fn fetch_me(api: &ApiClient) -> Result<User> {
    api.get_json("/api/users/me", &with_profile_image()).await
}

pub async fn update_user(api: &ApiClient, user_id: i64, update: &UserUpdate) -> Result<User> {
    let body = serde_json::to_value(update)?;
    let user: User = api
        .put_json(&format!("/api/users/{}", user_id), &with_profile_image(), body)
        .await?;
    info!("Updated profile of user {}", user_id);
    Ok(user)
}

/// Uploads `file` and sets it as the user's profile image.
pub async fn update_avatar(api: &ApiClient, user_id: i64, file: UploadFile) -> Result<User> {
    let uploaded = api.upload(vec![file]).await?;
    let Some(image) = uploaded.first() else {
        error!("Avatar upload for user {} returned no files", user_id);
        return Err(ClientError::Decode("upload returned no files".to_string()));
    };

    let user: User = api
        .put_json(
            &format!("/api/users/{}", user_id),
            &with_profile_image(),
            json!({ "profileImage": image.id }),
        )
        .await?;
    info!("Updated avatar of user {} to file {}", user_id, image.id);
    Ok(user)
}

pub async fn forgot_password(api: &ApiClient, email: &str) -> Result<()> {
    let _: Value = api
        .post_public("/api/auth/forgot-password", json!({ "email": email }))
        .await?;
    info!("Requested password reset for {}", email);
    Ok(())
}

pub async fn reset_password(
    api: &ApiClient,
    code: &str,
    password: &str,
    password_confirmation: &str,
) -> Result<AuthResponse> {
    if password != password_confirmation {
        return Err(ClientError::Precondition(
            "passwords do not match".to_string(),
        ));
    }

    api.post_public(
        "/api/auth/reset-password",
        json!({
            "code": code,
            "password": password,
            "passwordConfirmation": password_confirmation,
        }),
    )
    .await
}
