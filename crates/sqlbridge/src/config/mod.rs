//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::EngineType;
    use crate::drivers::SslMode;
    use std::time::Duration;

    const YAML: &str = r#"
connection:
  engine: postgres
  host: db.internal
  database: app
  user: app
  password: "p@ss word"
  ssl_mode: verify-full
  command_timeout_secs: 5
transfer:
  chunk_size: 500
  separator: ";"
"#;

    #[test]
    fn test_from_yaml() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.connection.engine, EngineType::Postgres);
        assert_eq!(config.connection.port(), 5432);
        assert_eq!(config.connection.ssl_mode, Some(SslMode::VerifyFull));
        assert_eq!(config.transfer.chunk_size, 500);
        assert_eq!(config.transfer.separator, ';');
        assert_eq!(config.transfer.newline, "\n");

        let timeouts = config.connection.timeouts();
        assert_eq!(timeouts.connect, Duration::from_secs(15));
        assert_eq!(timeouts.command, Duration::from_secs(5));
    }

    #[test]
    fn test_postgres_connection_string_quotes_values() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(
            config.connection.connection_string(),
            "host=db.internal port=5432 dbname=app user=app password='p@ss word'"
        );
    }

    #[test]
    fn test_mssql_connection_string() {
        let yaml = r#"
connection:
  engine: sqlserver
  host: sql1
  database: Sales
  user: sa
  password: secret
  trust_server_cert: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(
            config.connection.connection_string(),
            "Server=tcp:sql1,1433;Database=Sales;User Id=sa;Password=secret;Encrypt=false;TrustServerCertificate=true"
        );
    }

    #[test]
    fn test_mssql_connection_string_escapes_values() {
        let yaml = r#"
connection:
  engine: sqlserver
  host: sql1
  database: "Sales Q1"
  user: sa
  password: "pa;ss=}x"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let ado = config.connection.connection_string();
        assert_eq!(
            ado,
            "Server=tcp:sql1,1433;Database={Sales Q1};User Id=sa;Password={pa;ss=}}{x};Encrypt=false;TrustServerCertificate=false"
        );
        assert!(tiberius::Config::from_ado_string(&ado).is_ok());
    }

    #[test]
    fn test_unknown_engine_rejected() {
        let yaml = "connection:\n  engine: oracle\n  connection_string: x\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, YAML).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.connection.database, "app");
    }
}
