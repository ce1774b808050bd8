use std::{collections::HashMap, fs, path::Path};

pub const DEFAULT_SETTINGS_FILE: &str = "places.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: String,
    pub api_base_url: String,
    pub search_query: String,
    pub photo_max_width: u32,
    pub placeholder_image_url: String,
    pub preferences_database_url: String,
    pub request_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: "https://maps.googleapis.com/maps/api/place".into(),
            search_query: "historical places in Malaysia".into(),
            photo_max_width: 400,
            placeholder_image_url: "https://www.svgrepo.com/show/508699/landscape-placeholder.svg"
                .into(),
            preferences_database_url: "sqlite://./data/preferences.db".into(),
            request_timeout_seconds: 30,
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |name| std::env::var(name).ok())
}

/// Defaults, then the flat toml file (if readable), then environment.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            Ok(file_cfg) => apply_file_overrides(&mut settings, &file_cfg),
            Err(err) => tracing::warn!(
                path = %path.display(),
                error = %err,
                "config: ignoring unparsable settings file"
            ),
        }
    }

    apply_env_overrides(&mut settings, env);
    settings
}

fn apply_file_overrides(settings: &mut Settings, file_cfg: &HashMap<String, toml::Value>) {
    let text = |key: &str| file_cfg.get(key).and_then(|v| v.as_str()).map(str::to_string);
    let number = |key: &str| file_cfg.get(key).and_then(|v| v.as_integer());

    if let Some(v) = text("api_key") {
        settings.api_key = v;
    }
    if let Some(v) = text("api_base_url") {
        settings.api_base_url = v;
    }
    if let Some(v) = text("search_query") {
        settings.search_query = v;
    }
    if let Some(v) = number("photo_max_width").and_then(|v| u32::try_from(v).ok()) {
        settings.photo_max_width = v;
    }
    if let Some(v) = text("placeholder_image_url") {
        settings.placeholder_image_url = v;
    }
    if let Some(v) = text("preferences_database_url") {
        settings.preferences_database_url = v;
    }
    if let Some(v) = number("request_timeout_seconds").and_then(|v| u64::try_from(v).ok()) {
        settings.request_timeout_seconds = v;
    }
}

fn apply_env_overrides(settings: &mut Settings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("PLACES_API_KEY") {
        settings.api_key = v;
    }
    if let Some(v) = env("APP__API_KEY") {
        settings.api_key = v;
    }

    if let Some(v) = env("PLACES_API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = env("APP__SEARCH_QUERY") {
        settings.search_query = v;
    }

    if let Some(v) = env("APP__PHOTO_MAX_WIDTH") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.photo_max_width = parsed;
        }
    }

    if let Some(v) = env("APP__PLACEHOLDER_IMAGE_URL") {
        settings.placeholder_image_url = v;
    }

    if let Some(v) = env("PREFERENCES_DATABASE_URL") {
        settings.preferences_database_url = v;
    }
    if let Some(v) = env("APP__PREFERENCES_DATABASE_URL") {
        settings.preferences_database_url = v;
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_seconds = parsed;
        }
    }
}

/// Accepts plain file paths as well as sqlite urls.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().preferences_database_url;
    }

    if raw_database_url.starts_with("sqlite:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
