use cadence_core::recurrence::MaterializationConfig;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub materialization: MaterializationConfig,
}

fn default_database_path() -> String {
    "cadence.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            materialization: MaterializationConfig::default(),
        }
    }
}

impl Config {
    /// Loads `config.toml` from the working directory, then `CADENCE_*`
    /// environment variables. Nested keys use `__`, as in
    /// `CADENCE_MATERIALIZATION__HORIZON_DAYS=365`.
    pub fn new() -> Result<Self, figment::Error> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file("config.toml"))
                .merge(Env::prefixed("CADENCE_").split("__")),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::recurrence::ExceptionCarryPolicy;

    #[test]
    fn test_empty_sources_give_defaults() {
        let config = Config::from_figment(Figment::new()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.materialization.default_count, 10);
        assert_eq!(config.materialization.horizon_days, 730);
    }

    #[test]
    fn test_partial_materialization_table() {
        let toml = r#"
            database_path = "/tmp/events.db"

            [materialization]
            horizon_days = 90
            exception_carry = "discard"
        "#;
        let config = Config::from_figment(Figment::new().merge(Toml::string(toml))).unwrap();

        assert_eq!(config.database_path, "/tmp/events.db");
        assert_eq!(config.materialization.horizon_days, 90);
        assert_eq!(config.materialization.default_count, 10);
        assert_eq!(config.materialization.exception_carry, ExceptionCarryPolicy::Discard);
    }

    #[test]
    fn test_unknown_carry_policy_is_rejected() {
        let toml = "[materialization]\nexception_carry = \"sometimes\"";
        assert!(Config::from_figment(Figment::new().merge(Toml::string(toml))).is_err());
    }
}
