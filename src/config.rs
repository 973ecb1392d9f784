//! Environment-driven settings for a report run.

use std::time::Duration;

use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::ConnectOptions;

/// Complete configuration of a report run.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub render: RenderSettings,
}

impl Settings {
    /// Reads `DB_*` and `REPORT_*` variables from the process environment.
    ///
    /// `DB_PASSWORD` has no default; loading fails when it is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseSettings::load(Environment::with_prefix("DB"))?,
            render: RenderSettings::load(Environment::with_prefix("REPORT"))?,
        })
    }
}

/// Connection parameters for the library MySQL database.
#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub name: String,
}

impl DatabaseSettings {
    fn load(source: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("host", "localhost")?
            .set_default("port", 3306)?
            .set_default("user", "root")?
            .set_default("name", "library_system")?
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    pub fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(self.password.expose_secret())
            .database(&self.name)
            .log_statements(log::LevelFilter::Trace)
    }
}

/// Renderer selection and timeout budgets.
#[derive(Clone, Debug, Deserialize)]
pub struct RenderSettings {
    /// Also produce the LaTeX variant of the report.
    pub latex: bool,
    /// Executable used to compile the LaTeX source.
    pub latex_compiler: String,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
    pub compiler_timeout_secs: u64,
}

impl RenderSettings {
    fn load(source: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("latex", false)?
            .set_default("latex_compiler", "pdflatex")?
            .set_default("connect_timeout_secs", 10)?
            .set_default("query_timeout_secs", 60)?
            .set_default("compiler_timeout_secs", 120)?
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn compiler_timeout(&self) -> Duration {
        Duration::from_secs(self.compiler_timeout_secs)
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            latex: false,
            latex_compiler: "pdflatex".to_string(),
            connect_timeout_secs: 10,
            query_timeout_secs: 60,
            compiler_timeout_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> HashMap<String, String> {
        vars.iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn database_defaults_apply_when_only_password_is_set() {
        let source = Environment::with_prefix("DB").source(Some(env(&[("DB_PASSWORD", "s3cret")])));
        let settings = DatabaseSettings::load(source).expect("settings load");

        assert_eq!(settings.host, "localhost");
        assert_eq!(settings.port, 3306);
        assert_eq!(settings.user, "root");
        assert_eq!(settings.name, "library_system");
        assert_eq!(settings.password.expose_secret(), "s3cret");
    }

    #[test]
    fn missing_password_is_rejected() {
        let source =
            Environment::with_prefix("DB").source(Some(env(&[("DB_HOST", "db.internal")])));
        let err = DatabaseSettings::load(source).unwrap_err();
        assert!(err.to_string().contains("password"), "{err}");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let source = Environment::with_prefix("DB").source(Some(env(&[
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "3307"),
            ("DB_USER", "reporter"),
            ("DB_PASSWORD", "pw"),
            ("DB_NAME", "library"),
        ])));
        let settings = DatabaseSettings::load(source).expect("settings load");

        assert_eq!(settings.host, "db.internal");
        assert_eq!(settings.port, 3307);
        assert_eq!(settings.user, "reporter");
        assert_eq!(settings.name, "library");
    }

    #[test]
    fn render_settings_read_report_prefix() {
        let source = Environment::with_prefix("REPORT").source(Some(env(&[
            ("REPORT_LATEX", "true"),
            ("REPORT_QUERY_TIMEOUT_SECS", "5"),
        ])));
        let settings = RenderSettings::load(source).expect("settings load");

        assert!(settings.latex);
        assert_eq!(settings.latex_compiler, "pdflatex");
        assert_eq!(settings.query_timeout(), Duration::from_secs(5));
        assert_eq!(settings.connect_timeout(), Duration::from_secs(10));
    }
}
