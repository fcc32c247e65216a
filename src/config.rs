use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

use crate::llm::ProviderKind;

// Import logging macros
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub app: AppConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Text-generation service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub provider: ProviderKind,
    pub model: Option<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub log_directory: String,
}

/// School-specific settings: the shared admin password and the country
/// prefix prepended to parent phone numbers in wa.me links.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub admin_password: String,
    pub whatsapp_country_code: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_env()?,
            llm: LlmConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            app: AppConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            llm_provider = ?self.llm.provider,
            llm_model = ?self.llm.model,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            log_level = %self.logging.level,
            whatsapp_country_code = %self.app.whatsapp_country_code,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.contains("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.app.admin_password.is_empty() {
            return Err(anyhow!("ADMIN_PASSWORD must not be empty"));
        }

        if !self
            .app
            .whatsapp_country_code
            .chars()
            .all(|c| c.is_ascii_digit())
        {
            return Err(anyhow!("WHATSAPP_COUNTRY_CODE must be digits only"));
        }

        // A placeholder key is allowed: the encouragement feature then
        // resolves to its fixed fallback string instead of calling out.
        if self.llm.api_key.is_empty() || self.llm.api_key == "your-api-key" {
            warn!("LLM API key appears to be placeholder or empty - encouragement messages will use the fallback text");
        }

        // The level may be a full filter string ("info,hifz_tracker=debug");
        // only the base directive is sanity-checked here.
        let base_level = self
            .logging
            .level
            .split(',')
            .next()
            .unwrap_or("")
            .to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&base_level.as_str()) {
            warn!("Invalid log level '{}', using 'info' as fallback", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:hifz_tracker.db".to_string());
        Ok(DatabaseConfig { url })
    }
}

impl LlmConfig {
    fn from_env() -> Result<Self> {
        let api_key = env::var("LLM_API_KEY").unwrap_or_else(|_| "your-api-key".to_string());
        let base_url = env::var("LLM_BASE_URL").ok();

        let provider_str = env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "gemini" | "google" => ProviderKind::Gemini,
            "openai" | "chatgpt" | "gpt" => ProviderKind::OpenAi,
            _ => {
                info!("Unknown LLM provider '{}', defaulting to OpenAI", provider_str);
                ProviderKind::OpenAi
            }
        };

        let model = env::var("LLM_MODEL").ok();

        Ok(LlmConfig {
            api_key,
            base_url,
            provider,
            model,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        let port = port_str
            .parse::<u16>()
            .map_err(|_| anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str))?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,hifz_tracker=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            log_directory,
        })
    }
}

impl AppConfig {
    fn from_env() -> Result<Self> {
        let admin_password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin2024".to_string());
        let whatsapp_country_code =
            env::var("WHATSAPP_COUNTRY_CODE").unwrap_or_else(|_| "20".to_string());

        Ok(AppConfig {
            admin_password,
            whatsapp_country_code,
        })
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    if data.len() <= 8 {
        "*".repeat(data.len())
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sqlite:hifz_tracker.db"), "sqli***r.db");
        assert_eq!(mask_sensitive_data("sk-1234567890abcdef"), "sk-1***cdef");
    }

    #[test]
    fn test_config_validation() {
        let config = Config {
            database: DatabaseConfig {
                url: "sqlite:test.db".to_string(),
            },
            llm: LlmConfig {
                api_key: "sk-valid-key".to_string(),
                base_url: None,
                provider: ProviderKind::OpenAi,
                model: None,
            },
            server: ServerConfig {
                port: 3000,
                host: "0.0.0.0".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: true,
                log_directory: "logs".to_string(),
            },
            app: AppConfig {
                admin_password: "secret".to_string(),
                whatsapp_country_code: "20".to_string(),
            },
        };

        assert!(config.validate().is_ok());

        let mut invalid_port = config.clone();
        invalid_port.server.port = 0;
        assert!(invalid_port.validate().is_err());

        let mut bad_prefix = config.clone();
        bad_prefix.app.whatsapp_country_code = "+20".to_string();
        assert!(bad_prefix.validate().is_err());

        let mut empty_password = config;
        empty_password.app.admin_password = String::new();
        assert!(empty_password.validate().is_err());
    }
}
