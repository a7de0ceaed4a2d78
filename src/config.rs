//! Settings read from the environment (a `.env` file is loaded by the
//! binary before this runs).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::brain::ChatBackend;
use crate::error::ConfigError;

pub const DEFAULT_LLM_API_URL: &str = "http://localhost:11434/api/chat";
pub const DEFAULT_LLM_MODEL: &str = "llama3";
pub const DEFAULT_FALLBACK_URL: &str = "https://www.google.com";
pub const DEFAULT_SEARCH_URL: &str = "https://www.google.com/search";

/// Knobs of the navigation loop itself.
#[derive(Debug, Clone)]
pub struct NavigatorSettings {
    /// Consecutive failed iterations tolerated before the task fails.
    pub max_retries: u32,
    /// Per-operation wait (element lookup, page load).
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    /// Total iteration budget per task; `None` leaves only the
    /// consecutive-failure threshold.
    pub max_steps: Option<usize>,
    pub fallback_url: String,
    pub search_url: String,
}

impl Default for NavigatorSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            wait_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
            max_steps: Some(25),
            fallback_url: DEFAULT_FALLBACK_URL.to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub sandbox: bool,
    pub chrome_path: Option<PathBuf>,
    /// Attach to an already running Chrome instead of launching one.
    pub debug_url: Option<String>,
    pub page_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: false,
            chrome_path: None,
            debug_url: None,
            page_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub api_url: String,
    pub model: String,
    pub backend: ChatBackend,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_LLM_API_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            backend: ChatBackend::Ollama,
            api_key: None,
            request_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub navigator: NavigatorSettings,
    pub browser: BrowserSettings,
    pub model: ModelSettings,
    pub log_dir: PathBuf,
    pub debug_log: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            navigator: NavigatorSettings::default(),
            browser: BrowserSettings::default(),
            model: ModelSettings::default(),
            log_dir: PathBuf::from("logs"),
            debug_log: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup. Unset or blank keys
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut settings = Settings::default();

        let nav = &mut settings.navigator;
        if let Some(v) = get("BROWSER_MAX_RETRIES") {
            nav.max_retries = number("BROWSER_MAX_RETRIES", &v)?;
            if nav.max_retries == 0 {
                return Err(invalid("BROWSER_MAX_RETRIES", &v, "must be at least 1"));
            }
        }
        if let Some(v) = get("BROWSER_TIMEOUT") {
            nav.wait_timeout = Duration::from_secs(number("BROWSER_TIMEOUT", &v)?);
        }
        if let Some(v) = get("BROWSER_POLL_MS") {
            nav.poll_interval = Duration::from_millis(number("BROWSER_POLL_MS", &v)?);
        }
        if let Some(v) = get("NAVIGATOR_MAX_STEPS") {
            let steps: usize = number("NAVIGATOR_MAX_STEPS", &v)?;
            nav.max_steps = (steps > 0).then_some(steps);
        }
        if let Some(v) = get("NAVIGATOR_FALLBACK_URL") {
            nav.fallback_url = v;
        }
        if let Some(v) = get("NAVIGATOR_SEARCH_URL") {
            nav.search_url = v;
        }

        let browser = &mut settings.browser;
        browser.page_timeout = settings.navigator.wait_timeout;
        if let Some(v) = get("BROWSER_HEADLESS") {
            browser.headless = flag("BROWSER_HEADLESS", &v)?;
        }
        if let Some(v) = get("BROWSER_SANDBOX") {
            browser.sandbox = flag("BROWSER_SANDBOX", &v)?;
        }
        browser.chrome_path = get("CHROME_PATH").map(PathBuf::from);
        browser.debug_url = get("BROWSER_DEBUG_URL");

        let model = &mut settings.model;
        if let Some(v) = get("LLM_API_URL") {
            model.api_url = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            model.model = v;
        }
        model.backend = match get("LLM_BACKEND") {
            Some(v) => v
                .parse()
                .map_err(|reason: String| invalid("LLM_BACKEND", &v, &reason))?,
            None => ChatBackend::infer(&model.api_url),
        };
        model.api_key = get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY"));
        if let Some(v) = get("LLM_TIMEOUT") {
            model.request_timeout = Duration::from_secs(number("LLM_TIMEOUT", &v)?);
        }

        if let Some(v) = get("LOG_DIR") {
            settings.log_dir = PathBuf::from(v);
        }
        settings.debug_log = get("NAVIGATOR_DEBUG_LOG").map(PathBuf::from);

        Ok(settings)
    }
}

fn number<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| invalid(key, value, &e.to_string()))
}

fn flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected true or false")),
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
