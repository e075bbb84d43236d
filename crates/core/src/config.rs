use serde::{Deserialize, Serialize};

/// 全局应用配置
///
/// 仅 `database` 段为必填，其余各段均有默认值。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub limiter: LimiterConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 存储后端类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub dbname: String,
    #[serde(default = "default_sslmode")]
    pub sslmode: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    // 是否将分区表转换为 TimescaleDB hypertable
    #[serde(default = "default_true")]
    pub timescale: bool,
    // SQLite 后端的数据目录，每个分区一个文件
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// 生成 libpq 风格的连接串（口令以 `***` 代替，仅用于日志）。
    pub fn redacted_connection_string(&self) -> String {
        format!(
            "user={} password=*** dbname={} sslmode={} host={} port={}",
            self.user, self.dbname, self.sslmode, self.host, self.port
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub page_size: usize,
    pub max_page_size: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.okx.com/api/v5/market/history-candles".to_string(),
            timeout_secs: 10,
            page_size: 300,
            max_page_size: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    // 每秒请求数
    pub rate: u32,
    // 桶满时可立即发放的许可数
    pub burst: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self { rate: 10, burst: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    // 含首次尝试在内的最大尝试次数
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            factor: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    // 设置后额外按天滚动写入该目录
    pub dir: Option<String>,
    pub level: Option<String>,
}

fn default_sslmode() -> String {
    "disable".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_max_connections() -> u32 {
    5
}
