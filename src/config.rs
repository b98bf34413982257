//! Configuration for the account subsystem.

use serde::{Deserialize, Serialize};

/// Subsystem configuration. All durations are seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret for access credentials. Strength is
    /// enforced when the access-token service is constructed.
    pub jwt_secret: String,

    /// Access credential lifetime. Deliberately short: access tokens
    /// are stateless and cannot be revoked before expiry.
    pub access_token_ttl_secs: u64,

    /// Refresh credential lifetime.
    pub refresh_token_ttl_secs: u64,

    /// Email verification token lifetime.
    pub verification_ttl_secs: u64,

    /// Password reset token lifetime.
    pub reset_ttl_secs: u64,

    /// Email change token lifetime.
    pub email_change_ttl_secs: u64,

    /// How long an unconfirmed newsletter subscription survives.
    pub newsletter_confirm_ttl_secs: u64,

    pub password: PasswordConfig,

    /// Allow login with an unverified email. Test-mode escape hatch;
    /// must stay off in production configs.
    pub allow_unverified_login: bool,
}

/// Password policy and Argon2id cost parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub require_digit: bool,
    pub require_letter: bool,
    pub require_special: bool,

    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or_default(),
            access_token_ttl_secs: 900,               // 15 minutes
            refresh_token_ttl_secs: 86_400 * 30,      // 30 days
            verification_ttl_secs: 86_400,            // 24 hours
            reset_ttl_secs: 3_600,                    // 1 hour
            email_change_ttl_secs: 86_400,            // 24 hours
            newsletter_confirm_ttl_secs: 86_400 * 3,  // 3 days
            password: PasswordConfig::default(),
            allow_unverified_login: false,
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_digit: true,
            require_letter: true,
            require_special: false,
            // OWASP-recommended Argon2id baseline.
            argon2_memory_kib: 19_456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl AuthConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or_default(),
            access_token_ttl_secs: env_parse("ACCESS_TOKEN_TTL", defaults.access_token_ttl_secs),
            refresh_token_ttl_secs: env_parse("REFRESH_TOKEN_TTL", defaults.refresh_token_ttl_secs),
            verification_ttl_secs: env_parse("VERIFICATION_TTL", defaults.verification_ttl_secs),
            reset_ttl_secs: env_parse("PASSWORD_RESET_TTL", defaults.reset_ttl_secs),
            email_change_ttl_secs: env_parse("EMAIL_CHANGE_TTL", defaults.email_change_ttl_secs),
            newsletter_confirm_ttl_secs: env_parse(
                "NEWSLETTER_CONFIRM_TTL",
                defaults.newsletter_confirm_ttl_secs,
            ),
            password: PasswordConfig::from_env(),
            allow_unverified_login: env_parse("ALLOW_UNVERIFIED_LOGIN", false),
        }
    }
}

impl PasswordConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_length: env_parse("PASSWORD_MIN_LENGTH", defaults.min_length),
            require_digit: defaults.require_digit,
            require_letter: defaults.require_letter,
            require_special: defaults.require_special,
            argon2_memory_kib: env_parse("ARGON2_MEMORY_KIB", defaults.argon2_memory_kib),
            argon2_iterations: env_parse("ARGON2_ITERATIONS", defaults.argon2_iterations),
            argon2_parallelism: env_parse("ARGON2_PARALLELISM", defaults.argon2_parallelism),
        }
    }
}
