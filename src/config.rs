use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub aws: AwsConfig,
    pub session: SessionConfig,
    pub bedrock: BedrockConfig,
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Static credentials handed to `aws` CLI subprocesses; only ever filled from
    /// AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY (and AWS_SESSION_TOKEN).
    #[serde(skip)]
    pub credentials: Option<AwsCredentials>,
}

#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    /// Environment for a child process that should act with these credentials.
    pub fn env_vars(&self) -> Vec<(&'static str, &str)> {
        let mut vars = vec![
            ("AWS_ACCESS_KEY_ID", self.access_key_id.as_str()),
            ("AWS_SECRET_ACCESS_KEY", self.secret_access_key.as_str()),
        ];
        if let Some(token) = &self.session_token {
            vars.push(("AWS_SESSION_TOKEN", token.as_str()));
        }
        vars
    }
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn default_region() -> String {
    "us-west-2".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub database_path: String,
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,
    /// Optional cron expression for the expired-session sweep (e.g. "0 0 * * * *"). Uses local time.
    #[serde(default)]
    pub sweep_schedule: Option<String>,
    /// Sweep every N seconds when sweep_schedule is not set.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_table_name() -> String {
    "DashboardSessions".into()
}

fn default_ttl_days() -> u32 {
    7
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct BedrockConfig {
    pub model_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_alias_id: Option<String>,
    #[serde(default)]
    pub flow_id: Option<String>,
    #[serde(default)]
    pub flow_alias_id: Option<String>,
    #[serde(default)]
    pub knowledge_base_id: Option<String>,
    /// Where the latest merged agent trace is written; no artifact when unset.
    #[serde(default)]
    pub trace_artifact_path: Option<String>,
    /// Endpoint overrides (default: regional amazonaws.com hosts).
    #[serde(default)]
    pub runtime_endpoint: Option<String>,
    #[serde(default)]
    pub agent_runtime_endpoint: Option<String>,
    #[serde(default)]
    pub control_endpoint: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Bedrock API key; only ever filled from AWS_BEARER_TOKEN_BEDROCK.
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// One EKS cluster known to the dashboard (what `describe-cluster` would return).
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    pub endpoint: String,
    /// Base64-encoded PEM bundle, as in `certificateAuthority.data`.
    #[serde(default)]
    pub certificate_authority_data: Option<String>,
    #[serde(default = "default_cluster_status")]
    pub status: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub created_at: Option<String>,
    /// Static bearer token for the Kubernetes API; takes precedence over token_command.
    #[serde(default)]
    pub token: Option<String>,
    /// Command printing an ExecCredential JSON (default: `aws eks get-token`).
    #[serde(default)]
    pub token_command: Option<Vec<String>>,
    #[serde(default)]
    pub nodegroups: Vec<NodegroupConfig>,
}

fn default_cluster_status() -> String {
    "ACTIVE".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodegroupConfig {
    pub name: String,
    #[serde(default = "default_cluster_status")]
    pub status: String,
    #[serde(default)]
    pub instance_types: Vec<String>,
    #[serde(default)]
    pub desired_size: u32,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        let mut config: AppConfig = toml::from_str(&s)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests). No environment overrides.
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply process-start environment overrides. Empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(table) = get("SESSION_TABLE_NAME") {
            self.session.table_name = table;
        }
        if let Some(region) = get("AWS_REGION") {
            self.aws.region = region;
        }
        if let Some(days) = get("SESSION_TTL_DAYS") {
            match days.trim().parse() {
                Ok(d) => self.session.ttl_days = d,
                Err(_) => tracing::warn!(value = %days, "ignoring non-numeric SESSION_TTL_DAYS"),
            }
        }
        if let (Some(access_key_id), Some(secret_access_key)) =
            (get("AWS_ACCESS_KEY_ID"), get("AWS_SECRET_ACCESS_KEY"))
        {
            self.aws.credentials = Some(AwsCredentials {
                access_key_id,
                secret_access_key,
                session_token: get("AWS_SESSION_TOKEN"),
            });
        }
        if let Some(key) = get("AWS_BEARER_TOKEN_BEDROCK") {
            self.bedrock.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(!self.aws.region.is_empty(), "aws.region must be non-empty");
        anyhow::ensure!(
            !self.session.database_path.is_empty(),
            "session.database_path must be non-empty"
        );
        anyhow::ensure!(
            is_table_identifier(&self.session.table_name),
            "session.table_name must be 1-64 ASCII letters, digits or '_', got {:?}",
            self.session.table_name
        );
        anyhow::ensure!(
            self.session.ttl_days > 0,
            "session.ttl_days must be > 0, got {}",
            self.session.ttl_days
        );
        anyhow::ensure!(
            self.session.sweep_interval_secs > 0,
            "session.sweep_interval_secs must be > 0, got {}",
            self.session.sweep_interval_secs
        );
        anyhow::ensure!(
            !self.bedrock.model_id.is_empty(),
            "bedrock.model_id must be non-empty"
        );
        anyhow::ensure!(
            self.bedrock.request_timeout_secs > 0,
            "bedrock.request_timeout_secs must be > 0, got {}",
            self.bedrock.request_timeout_secs
        );
        let mut seen = std::collections::HashSet::new();
        for cluster in &self.clusters {
            anyhow::ensure!(!cluster.name.is_empty(), "clusters[].name must be non-empty");
            anyhow::ensure!(
                seen.insert(cluster.name.as_str()),
                "clusters[].name must be unique, {:?} appears twice",
                cluster.name
            );
            anyhow::ensure!(
                !cluster.endpoint.is_empty(),
                "clusters[{}].endpoint must be non-empty",
                cluster.name
            );
        }
        Ok(())
    }
}

/// The table name is spliced into SQL, so only plain identifiers are accepted.
fn is_table_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}
