use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    pub bootstrap_admin_email: Option<String>,
    pub dev_mode: bool,
    /// Allowed CORS origins; empty means same-origin only (unless dev mode)
    pub cors_origins: Vec<String>,
    /// Enable/disable audit logging entirely
    pub audit_log_enabled: bool,
    /// Days to retain audit logs before purging (0 = never purge)
    pub audit_log_retention_days: i64,
    /// Validation calls allowed per account per minute (0 = unlimited)
    pub validate_rate_limit_per_minute: u32,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("LICENSEDESK_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|v| parse_list(&v))
            .unwrap_or_default();

        let audit_log_enabled = env::var("AUDIT_LOG_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let audit_log_retention_days: i64 = env::var("AUDIT_LOG_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(90);

        let validate_rate_limit_per_minute: u32 = env::var("VALIDATE_RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "licensedesk.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "licensedesk_audit.db".to_string()),
            bootstrap_admin_email: env::var("BOOTSTRAP_ADMIN_EMAIL")
                .ok()
                .filter(|e| !e.trim().is_empty()),
            dev_mode,
            cors_origins,
            audit_log_enabled,
            audit_log_retention_days,
            validate_rate_limit_per_minute,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_list_skips_blanks() {
        assert_eq!(
            parse_list(" https://a.example.com ,, https://b.example.com,"),
            vec!["https://a.example.com", "https://b.example.com"]
        );
        assert!(parse_list("").is_empty());
    }
}
