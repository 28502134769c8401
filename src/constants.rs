// Endpoint and model defaults, overridable from the environment.
// Secrets are not read here; see `config::Settings`.

use std::env;

lazy_static::lazy_static! {
    pub static ref CHAT_COMPLETIONS_URL: String = env::var("CHAT_COMPLETIONS_URL")
        .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
    pub static ref CHAT_MODEL: String = env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4".to_string());
    pub static ref RECAPTCHA_VERIFY_URL: String = env::var("RECAPTCHA_VERIFY_URL")
        .unwrap_or_else(|_| "https://www.google.com/recaptcha/api/siteverify".to_string());
    pub static ref TEMPLATES_DIR: String = env::var("FINADVISOR_TEMPLATES_DIR").unwrap_or_else(|_| "templates".to_string());
    pub static ref STATIC_DIR: String = env::var("FINADVISOR_STATIC_DIR").unwrap_or_else(|_| "static".to_string());
    pub static ref ARCHIVE_DIR: String = env::var("ARCHIVE_DIR").unwrap_or_else(|_| "archive".to_string());
}

/// Name of the cookie that carries the browser session id.
pub const SESSION_COOKIE: &str = "finadvisor_session";

/// Port the form is served on when `--port` is not given.
pub const DEFAULT_PORT: u16 = 8501;
