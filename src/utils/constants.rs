//! Shared constants and invariants

pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

// Provider endpoints
pub const DEFAULT_API_BASE_URL: &str = "https://api.fitbit.com";
pub const DEFAULT_TOKEN_URL: &str = "https://api.fitbit.com/oauth2/token";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://www.fitbit.com/oauth2/authorize";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";
pub const DEFAULT_SCOPE: &str =
    "activity heartrate location nutrition profile settings sleep social weight";

// Credential persistence
pub const DEFAULT_CREDENTIALS_PATH: &str = "credentials.json";
pub const DEFAULT_ACCESS_TOKEN_ENV: &str = "ACCESSTOKEN";
pub const DEFAULT_REFRESH_TOKEN_ENV: &str = "REFRESHTOKEN";

// Rate limit headers reported on every provider response
pub const RATE_LIMIT_LIMIT_HEADER: &str = "Fitbit-Rate-Limit-Limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "Fitbit-Rate-Limit-Remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "Fitbit-Rate-Limit-Reset";
