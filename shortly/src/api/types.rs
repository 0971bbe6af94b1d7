use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::links::model::LinkRow;
use crate::users::model::UserRow;

pub const MAX_TARGET_URL_LENGTH: usize = 2048;
pub const MIN_ALIAS_LENGTH: usize = 3;
pub const MAX_ALIAS_LENGTH: usize = 50;
pub const MAX_SHORT_CODE_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_BULK_DELETE: usize = 50;

/// Response envelope shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn ok_with_message(message: &str, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: &str) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            data: None,
        }
    }
}

/// Builds the absolute short URL advertised in API responses.
pub fn short_url(public_origin: &str, short_code: &str) -> String {
    format!("{}/{}", public_origin.trim_end_matches('/'), short_code)
}

/// A user-chosen alias shares the namespace (and the constraints) of
/// generated codes, but is restricted to a URL-safe alphabet.
pub fn validate_alias(alias: &str) -> Result<(), ApiError> {
    if alias.len() < MIN_ALIAS_LENGTH || alias.len() > MAX_ALIAS_LENGTH {
        return Err(ApiError::Validation(format!(
            "Custom alias must be {MIN_ALIAS_LENGTH}-{MAX_ALIAS_LENGTH} characters"
        )));
    }
    if !alias
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::Validation(
            "Custom alias can only contain letters, numbers, hyphens, and underscores".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_target_url(target: &str) -> Result<(), ApiError> {
    if target.len() > MAX_TARGET_URL_LENGTH {
        return Err(ApiError::Validation("URL too long".to_string()));
    }
    let parsed = Url::parse(target)
        .map_err(|_| ApiError::Validation("Please provide a valid URL".to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ApiError::Validation(
            "URL must start with http:// or https://".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_short_code_param(short_code: &str) -> Result<(), ApiError> {
    if short_code.is_empty() || short_code.len() > MAX_SHORT_CODE_LENGTH {
        return Err(ApiError::Validation("Invalid short code".to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShortenRequest {
    pub url: String,
    #[serde(default)]
    pub custom_alias: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_public: bool,
}

impl ShortenRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_target_url(&self.url)?;
        if let Some(alias) = &self.custom_alias {
            validate_alias(alias)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct LinkCreated {
    pub short_code: String,
    pub short_url: String,
    pub target_url: String,
    pub custom_alias: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl LinkCreated {
    pub fn from_row(row: &LinkRow, public_origin: &str) -> Self {
        Self {
            short_code: row.short_code.clone(),
            short_url: short_url(public_origin, &row.short_code),
            target_url: row.target_url.clone(),
            custom_alias: row.custom_alias.clone(),
            expires_at: row.expires_at,
            is_public: row.is_public,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LinkDetails {
    pub id: Uuid,
    pub short_code: String,
    pub short_url: String,
    pub target_url: String,
    pub custom_alias: Option<String>,
    pub click_count: i64,
    pub is_public: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl LinkDetails {
    pub fn from_row(row: &LinkRow, public_origin: &str) -> Self {
        Self {
            id: row.id,
            short_code: row.short_code.clone(),
            short_url: short_url(public_origin, &row.short_code),
            target_url: row.target_url.clone(),
            custom_alias: row.custom_alias.clone(),
            click_count: row.click_count,
            is_public: row.is_public,
            expires_at: row.expires_at,
            is_expired: row.is_expired(),
            last_accessed_at: row.last_accessed_at,
            created_at: row.created_at,
        }
    }
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    10
}

fn default_sort_by() -> String {
    "created_at".to_string()
}

fn default_sort_order() -> String {
    "desc".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
    #[serde(default)]
    pub search: String,
}

impl DashboardQuery {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.page == 0 {
            return Err(ApiError::Validation("page must be at least 1".to_string()));
        }
        if self.limit == 0 || self.limit > 100 {
            return Err(ApiError::Validation(
                "limit must be between 1 and 100".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: i64) -> Self {
        Self {
            page,
            limit,
            total,
            pages: (total + i64::from(limit) - 1) / i64::from(limit),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LinkPage {
    pub urls: Vec<LinkDetails>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLinkRequest {
    /// New alias; an empty string clears the current alias.
    #[serde(default)]
    pub custom_alias: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Clears the expiry; wins over `expires_at` when both are sent.
    #[serde(default)]
    pub clear_expiry: bool,
    #[serde(default)]
    pub is_public: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct LinkUpdated {
    pub short_code: String,
    pub custom_alias: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_public: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkDeleteRequest {
    pub short_codes: Vec<String>,
}

impl BulkDeleteRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.short_codes.is_empty() || self.short_codes.len() > MAX_BULK_DELETE {
            return Err(ApiError::Validation(format!(
                "short_codes must contain 1-{MAX_BULK_DELETE} items"
            )));
        }
        for code in &self.short_codes {
            validate_short_code_param(code)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteResult {
    pub deleted_count: u64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DailyClicks {
    pub date: NaiveDate,
    pub clicks: i64,
}

#[derive(Debug, Serialize)]
pub struct LinkAnalytics {
    pub short_code: String,
    pub target_url: String,
    pub total_clicks: i64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub visit_history: Vec<DateTime<Utc>>,
    pub daily_clicks: Vec<DailyClicks>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct OwnerStats {
    pub total_links: i64,
    pub total_clicks: i64,
    pub avg_clicks_per_link: f64,
    pub most_recent_link: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() || self.name.len() > 100 {
            return Err(ApiError::Validation(
                "Name must be 1-100 characters".to_string(),
            ));
        }
        validate_email(&self.email)?;
        if self.password.len() < MIN_PASSWORD_LENGTH {
            return Err(ApiError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        Ok(())
    }
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let valid = email.len() <= 254
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(ApiError::Validation(
            "Please provide a valid email address".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserBody {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserBody {
    pub fn from_row(row: &UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name.clone(),
            email: row.email.clone(),
            created_at: row.created_at,
            last_login_at: row.last_login_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthSession {
    pub user: UserBody,
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_url_strips_trailing_slash() {
        assert_eq!(
            short_url("http://localhost:3001/", "abc123"),
            "http://localhost:3001/abc123"
        );
        assert_eq!(
            short_url("https://sho.rt", "abc123"),
            "https://sho.rt/abc123"
        );
    }

    #[test]
    fn test_validate_alias() {
        assert!(validate_alias("my-alias_1").is_ok());
        assert!(validate_alias("ab").is_err()); // too short
        assert!(validate_alias(&"a".repeat(51)).is_err()); // too long
        assert!(validate_alias("has space").is_err());
        assert!(validate_alias("has/slash").is_err());
    }

    #[test]
    fn test_validate_target_url() {
        assert!(validate_target_url("https://example.com/path?q=1").is_ok());
        assert!(validate_target_url("http://example.com").is_ok());
        assert!(validate_target_url("ftp://example.com").is_err());
        assert!(validate_target_url("not a url").is_err());
        let long = format!("https://example.com/{}", "a".repeat(MAX_TARGET_URL_LENGTH));
        assert!(validate_target_url(&long).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("userexample.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@nodot").is_err());
    }

    #[test]
    fn test_register_request_validation() {
        let valid = RegisterRequest {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password: "correct-horse".to_string(),
        };
        assert!(valid.validate().is_ok());

        let short_password = RegisterRequest {
            password: "short".to_string(),
            ..valid.clone()
        };
        assert!(short_password.validate().is_err());

        let blank_name = RegisterRequest {
            name: "  ".to_string(),
            ..valid
        };
        assert!(blank_name.validate().is_err());
    }

    #[test]
    fn test_dashboard_query_validation() {
        let query = DashboardQuery {
            page: 1,
            limit: 10,
            sort_by: "created_at".to_string(),
            sort_order: "desc".to_string(),
            search: String::new(),
        };
        assert!(query.validate().is_ok());

        let zero_page = DashboardQuery { page: 0, ..query.clone() };
        assert!(zero_page.validate().is_err());

        let big_limit = DashboardQuery {
            limit: 101,
            ..query
        };
        assert!(big_limit.validate().is_err());
    }

    #[test]
    fn test_pagination_rounds_up() {
        let p = Pagination::new(1, 10, 25);
        assert_eq!(p.pages, 3);
        let p = Pagination::new(1, 10, 30);
        assert_eq!(p.pages, 3);
        let p = Pagination::new(1, 10, 0);
        assert_eq!(p.pages, 0);
    }

    #[test]
    fn test_bulk_delete_validation() {
        let empty = BulkDeleteRequest {
            short_codes: vec![],
        };
        assert!(empty.validate().is_err());

        let too_many = BulkDeleteRequest {
            short_codes: vec!["a1b2c3".to_string(); MAX_BULK_DELETE + 1],
        };
        assert!(too_many.validate().is_err());

        let fine = BulkDeleteRequest {
            short_codes: vec!["a1b2c3".to_string(), "alias-x".to_string()],
        };
        assert!(fine.validate().is_ok());
    }
}
