use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Process-wide settings for the orchestrator.
///
/// Defaults are read from `GSYNC_*` environment variables once, when the record is
/// built. Components receive the record explicitly and never consult the
/// environment themselves, so tests can construct one with [`FleetConfig::for_workspace`].
#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,

    #[serde(default = "default_image")]
    pub image: String,

    #[serde(default = "default_build_context")]
    pub build_context: PathBuf,

    #[serde(default = "default_network")]
    pub network: String,

    #[serde(default = "default_host_mount_root")]
    pub host_mount_root: PathBuf,

    #[serde(default = "default_puid")]
    pub default_puid: u32,

    #[serde(default = "default_pgid")]
    pub default_pgid: u32,

    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    #[serde(default = "default_cron_schedule")]
    pub default_cron_schedule: String,

    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_long_command_timeout")]
    pub long_command_timeout_secs: u64,

    #[serde(default = "default_docker_executable")]
    pub docker_executable: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

/// Directory under the workspace root holding default photo output.
pub const PHOTOS_DIR: &str = "photos";

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(fallback)
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(env_or("GSYNC_WORKSPACE_ROOT", "/workspace"))
}

fn default_container_prefix() -> String {
    env_or("GSYNC_CONTAINER_PREFIX", "gphotos-sync")
}

fn default_image() -> String {
    env_or("GSYNC_IMAGE", "gphotos-sync:latest")
}

fn default_build_context() -> PathBuf {
    std::env::var("GSYNC_BUILD_CONTEXT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_workspace_root().join("gphotos-cdp"))
}

fn default_network() -> String {
    env_or("GSYNC_NETWORK", "gphotos-sync")
}

fn default_host_mount_root() -> PathBuf {
    PathBuf::from(env_or("GSYNC_HOST_MOUNT_ROOT", "/host"))
}

fn default_puid() -> u32 {
    env_parsed("PUID", 1000)
}

fn default_pgid() -> u32 {
    env_parsed("PGID", 1000)
}

fn default_timezone() -> String {
    env_or("GSYNC_DEFAULT_TZ", "Europe/Rome")
}

fn default_cron_schedule() -> String {
    env_or("GSYNC_DEFAULT_CRON", "0 2 * * *")
}

fn default_log_tail_lines() -> usize {
    env_parsed("GSYNC_LOG_TAIL_LINES", 200)
}

fn default_command_timeout() -> u64 {
    env_parsed("GSYNC_COMMAND_TIMEOUT", 30)
}

fn default_long_command_timeout() -> u64 {
    env_parsed("GSYNC_LONG_COMMAND_TIMEOUT", 120)
}

fn default_docker_executable() -> String {
    env_or("GSYNC_DOCKER", "docker")
}

fn default_bind_addr() -> String {
    env_or("GSYNC_BIND", "0.0.0.0:8080")
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            container_prefix: default_container_prefix(),
            image: default_image(),
            build_context: default_build_context(),
            network: default_network(),
            host_mount_root: default_host_mount_root(),
            default_puid: default_puid(),
            default_pgid: default_pgid(),
            default_timezone: default_timezone(),
            default_cron_schedule: default_cron_schedule(),
            log_tail_lines: default_log_tail_lines(),
            command_timeout_secs: default_command_timeout(),
            long_command_timeout_secs: default_long_command_timeout(),
            docker_executable: default_docker_executable(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl FleetConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Environment-independent configuration rooted at `workspace_root`.
    pub fn for_workspace(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            build_context: workspace_root.join("gphotos-cdp"),
            host_mount_root: workspace_root.join("host"),
            workspace_root,
            container_prefix: "gphotos-sync".to_string(),
            image: "gphotos-sync:latest".to_string(),
            network: "gphotos-sync".to_string(),
            default_puid: 1000,
            default_pgid: 1000,
            default_timezone: "Europe/Rome".to_string(),
            default_cron_schedule: "0 2 * * *".to_string(),
            log_tail_lines: 200,
            command_timeout_secs: 30,
            long_command_timeout_secs: 120,
            docker_executable: "docker".to_string(),
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn long_command_timeout(&self) -> Duration {
        Duration::from_secs(self.long_command_timeout_secs)
    }

    /// Runtime object name for a profile. Also the compose service key.
    pub fn container_name(&self, profile: &str) -> String {
        format!("{}-{}", self.container_prefix, profile)
    }

    /// Inverse of [`container_name`](Self::container_name), `None` for unmanaged names.
    pub fn profile_from_container<'a>(&self, container_name: &'a str) -> Option<&'a str> {
        container_name
            .trim_start_matches('/')
            .strip_prefix(self.container_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|rest| !rest.is_empty())
    }

    pub fn profile_dir(&self, profile: &str) -> PathBuf {
        self.workspace_root.join(profile)
    }

    pub fn manifest_path(&self, profile: &str) -> PathBuf {
        self.workspace_root
            .join(format!("docker-compose.{profile}.yml"))
    }

    /// Parent of every profile's default photo directory.
    pub fn photos_root(&self) -> PathBuf {
        self.workspace_root.join(PHOTOS_DIR)
    }

    pub fn default_photo_dir(&self, profile: &str) -> PathBuf {
        self.photos_root().join(profile)
    }

    /// Whether `profile`'s working directory would be, or contain, one of the
    /// directories shared by the whole fleet.
    pub fn overlaps_shared_dir(&self, profile: &str) -> bool {
        let dir = self.profile_dir(profile);
        let photos = self.photos_root();
        [
            photos.as_path(),
            self.build_context.as_path(),
            self.host_mount_root.as_path(),
        ]
        .iter()
        .any(|shared| shared.starts_with(&dir))
    }
}
