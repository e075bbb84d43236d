use collector_core::config::AppConfig;
use config::{Config, Environment, File, FileFormat};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: config::ConfigError,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// # Summary
/// 加载应用配置。
///
/// # Logic
/// 1. 读取 YAML 文件（必须存在）。
/// 2. 叠加 `COLLECTOR__` 前缀的环境变量，例如 `COLLECTOR__DATABASE__PASSWORD`。
/// 3. 反序列化并校验取值范围。
///
/// # Arguments
/// * `path`: 配置文件路径。
///
/// # Returns
/// 成功返回 AppConfig；文件缺失、格式错误或取值非法时返回 ConfigError。
pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
    let load_err = |source| ConfigError::Load {
        path: path.display().to_string(),
        source,
    };

    let app_config: AppConfig = Config::builder()
        .add_source(File::from(path).format(FileFormat::Yaml).required(true))
        .add_source(
            Environment::with_prefix("COLLECTOR")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(load_err)?
        .try_deserialize()
        .map_err(load_err)?;

    validate(&app_config)?;
    Ok(app_config)
}

fn validate(app_config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &app_config.upstream;
    if upstream.page_size == 0 || upstream.page_size > upstream.max_page_size {
        return Err(ConfigError::Invalid(format!(
            "upstream.page_size {} outside 1..={}",
            upstream.page_size, upstream.max_page_size
        )));
    }
    if upstream.timeout_secs == 0 {
        return Err(ConfigError::Invalid("upstream.timeout_secs must be positive".into()));
    }
    if app_config.limiter.rate == 0 || app_config.limiter.burst == 0 {
        return Err(ConfigError::Invalid(format!(
            "limiter rate {} and burst {} must both be positive",
            app_config.limiter.rate, app_config.limiter.burst
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use collector_core::config::StorageBackend;
    use std::io::Write;

    fn write_yaml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_database_only_file_loads_with_defaults() {
        let file = write_yaml(
            r#"
database:
  user: postgres
  password: secret
  dbname: market
  sslmode: disable
  host: 127.0.0.1
  port: 5433
"#,
        );
        let cfg = load(file.path()).unwrap();
        assert_eq!(cfg.database.backend, StorageBackend::Postgres);
        assert_eq!(cfg.database.port, 5433);
        assert!(cfg.database.timescale);
        assert_eq!(cfg.upstream.page_size, 300);
        assert_eq!(cfg.limiter.rate, 10);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert!(cfg.logging.dir.is_none());
    }

    #[test]
    fn test_optional_sections_override_defaults() {
        let file = write_yaml(
            r#"
database:
  backend: sqlite
  data_dir: /var/lib/collector
upstream:
  base_url: http://localhost:8080/candles
  timeout_secs: 3
  page_size: 100
  max_page_size: 100
limiter:
  rate: 2
  burst: 4
"#,
        );
        let cfg = load(file.path()).unwrap();
        assert_eq!(cfg.database.backend, StorageBackend::Sqlite);
        assert_eq!(cfg.database.data_dir, "/var/lib/collector");
        assert_eq!(cfg.upstream.page_size, 100);
        assert_eq!(cfg.limiter.burst, 4);
    }

    #[test]
    fn test_missing_file_and_missing_database_section() {
        assert!(matches!(
            load(Path::new("/nonexistent/db_config.yml")),
            Err(ConfigError::Load { .. })
        ));

        let file = write_yaml("limiter:\n  rate: 1\n  burst: 1\n");
        assert!(matches!(load(file.path()), Err(ConfigError::Load { .. })));
    }

    #[test]
    fn test_page_size_above_upstream_limit_is_invalid() {
        let file = write_yaml(
            r#"
database:
  dbname: market
upstream:
  base_url: https://www.okx.com/api/v5/market/history-candles
  timeout_secs: 10
  page_size: 500
  max_page_size: 300
"#,
        );
        assert!(matches!(load(file.path()), Err(ConfigError::Invalid(_))));
    }
}
