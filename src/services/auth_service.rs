use crate::entities::{AuthProvider, Role, user_entity as users};
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::utils::*;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Clone)]
pub struct AuthService {
    pool: DatabaseConnection,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(pool: DatabaseConnection, bcrypt_cost: u32) -> Self {
        Self { pool, bcrypt_cost }
    }

    pub async fn sign_up(&self, request: SignUpRequest) -> AppResult<UserResponse> {
        let name = request.name.trim().to_string();
        if name.is_empty() || name.chars().count() > 100 {
            return Err(AppError::ValidationError(
                "Name must be between 1 and 100 characters".to_string(),
            ));
        }
        let email = normalize_email(&request.email);
        validate_email(&email)?;
        validate_password(&request.password)?;

        if self.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let password_hash = hash_password(&request.password, self.bcrypt_cost)?;
        let now = Utc::now();
        let user = users::ActiveModel {
            name: Set(name),
            email: Set(email),
            password_hash: Set(Some(password_hash)),
            provider: Set(AuthProvider::Local),
            role: Set(Role::User),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        log::info!("User {} signed up", user.id);
        Ok(UserResponse::from(user))
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<UserResponse> {
        let email = normalize_email(&request.email);
        let user = self
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::AuthError(INVALID_CREDENTIALS.to_string()))?;

        // OAuth-only accounts have no password to compare against
        let Some(hash) = user.password_hash.as_deref() else {
            return Err(AppError::AuthError(INVALID_CREDENTIALS.to_string()));
        };
        if !verify_password(&request.password, hash)? {
            log::warn!("Failed login for user {}", user.id);
            return Err(AppError::AuthError(INVALID_CREDENTIALS.to_string()));
        }

        Ok(UserResponse::from(user))
    }

    /// Sign in with an identity an OAuth provider already vouched for.
    /// Unknown emails get a fresh account; known ones get the provider id linked.
    pub async fn oauth_login(&self, profile: OAuthProfile) -> AppResult<UserResponse> {
        if profile.provider == AuthProvider::Local {
            return Err(AppError::ValidationError(
                "OAuth login requires an external provider".to_string(),
            ));
        }
        if profile.provider_user_id.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Missing provider user id".to_string(),
            ));
        }
        let email = normalize_email(&profile.email);
        validate_email(&email)?;
        let now = Utc::now();

        if let Some(existing) = self.find_by_email(&email).await? {
            let linked = match profile.provider {
                AuthProvider::Google => existing.google_id.is_some(),
                AuthProvider::Facebook => existing.facebook_id.is_some(),
                AuthProvider::Local => true,
            };
            let fill_picture = existing.picture.is_none() && profile.picture.is_some();
            if linked && !fill_picture {
                return Ok(UserResponse::from(existing));
            }

            let mut am = existing.into_active_model();
            if !linked {
                let id = Some(profile.provider_user_id.clone());
                match profile.provider {
                    AuthProvider::Google => am.google_id = Set(id),
                    AuthProvider::Facebook => am.facebook_id = Set(id),
                    AuthProvider::Local => {}
                }
            }
            if fill_picture {
                am.picture = Set(profile.picture.clone());
            }
            am.updated_at = Set(Some(now));
            let user = am.update(&self.pool).await?;
            log::info!("Linked {} identity to user {}", profile.provider, user.id);
            return Ok(UserResponse::from(user));
        }

        let (google_id, facebook_id) = match profile.provider {
            AuthProvider::Google => (Some(profile.provider_user_id.clone()), None),
            AuthProvider::Facebook => (None, Some(profile.provider_user_id.clone())),
            AuthProvider::Local => (None, None),
        };
        let name = profile
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("No Name")
            .to_string();

        let user = users::ActiveModel {
            name: Set(name),
            email: Set(email),
            password_hash: Set(None),
            picture: Set(profile.picture),
            provider: Set(profile.provider),
            google_id: Set(google_id),
            facebook_id: Set(facebook_id),
            role: Set(Role::User),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        log::info!("User {} created via {} login", user.id, user.provider);
        Ok(UserResponse::from(user))
    }

    pub async fn get_profile(&self, user_id: i64) -> AppResult<UserResponse> {
        Ok(UserResponse::from(self.get_user(user_id).await?))
    }

    /// Only a superadmin may change roles, and not their own.
    pub async fn set_role(&self, actor_id: i64, target_id: i64, role: Role) -> AppResult<UserResponse> {
        let actor = self.get_user(actor_id).await?;
        if actor.role != Role::Superadmin {
            return Err(AppError::PermissionDenied);
        }
        if actor_id == target_id {
            return Err(AppError::ValidationError(
                "Cannot change your own role".to_string(),
            ));
        }

        let mut am = self.get_user(target_id).await?.into_active_model();
        am.role = Set(role);
        am.updated_at = Set(Some(Utc::now()));
        let user = am.update(&self.pool).await?;
        log::info!("User {target_id} role set to {role} by {actor_id}");
        Ok(UserResponse::from(user))
    }

    /// Resolve `user_id` to an admin or superadmin account.
    pub async fn require_admin(&self, user_id: i64) -> AppResult<users::Model> {
        require_admin(&self.pool, user_id).await
    }

    async fn get_user(&self, user_id: i64) -> AppResult<users::Model> {
        users::Entity::find_by_id(user_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<users::Model>> {
        Ok(users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.pool)
            .await?)
    }
}

pub(crate) async fn require_admin<C>(db: &C, user_id: i64) -> AppResult<users::Model>
where
    C: sea_orm::ConnectionTrait,
{
    let user = users::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(AppError::PermissionDenied)?;
    if !user.role.is_admin() {
        log::warn!("User {user_id} attempted an admin-only action");
        return Err(AppError::PermissionDenied);
    }
    Ok(user)
}
