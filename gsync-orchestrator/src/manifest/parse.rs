use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml_ng::Value;

use gsync_core::{FleetConfig, FleetError, Result};

use super::{NO_CRON_COMMAND, PHOTO_MOUNT};
use crate::profile::{is_unfiltered_albums, ProfileConfig, CRON_DISABLED};

#[derive(Debug, Deserialize)]
struct ManifestDocument {
    #[serde(default)]
    services: IndexMap<String, ServiceDefinition>,
}

#[derive(Debug, Deserialize)]
struct ServiceDefinition {
    #[serde(default)]
    command: Option<CommandSpec>,
    #[serde(default)]
    environment: Option<EnvironmentSpec>,
    #[serde(default)]
    volumes: Vec<VolumeSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommandSpec {
    Exec(Vec<String>),
    Shell(String),
}

impl CommandSpec {
    fn parts(&self) -> Vec<String> {
        match self {
            Self::Exec(parts) => parts.clone(),
            Self::Shell(line) => line.split_whitespace().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnvironmentSpec {
    List(Vec<String>),
    Map(IndexMap<String, Option<Value>>),
}

impl EnvironmentSpec {
    fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            Self::List(entries) => entries
                .iter()
                .map(|entry| match entry.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (entry.clone(), String::new()),
                })
                .collect(),
            Self::Map(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.as_ref().map(scalar_text).unwrap_or_default()))
                .collect(),
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VolumeSpec {
    Short(String),
    Long {
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        target: Option<String>,
    },
}

impl VolumeSpec {
    fn source_for(&self, target: &str) -> Option<String> {
        match self {
            Self::Short(spec) => {
                let mut parts = spec.split(':');
                let source = parts.next()?;
                (parts.next()? == target).then(|| source.to_string())
            }
            Self::Long {
                source: Some(source),
                target: Some(t),
            } if t == target => Some(source.clone()),
            Self::Long { .. } => None,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Rebuild a config from environment variables and the command override.
/// `photo_dir` is left empty; only the manifest's volumes carry it.
pub fn config_from_env(
    fleet: &FleetConfig,
    env: &BTreeMap<String, String>,
    command: &[String],
) -> ProfileConfig {
    let defaults = ProfileConfig::defaults_for(fleet);
    let get = |key: &str| env.get(key).map(String::as_str);

    let cron_disabled = command.iter().map(String::as_str).eq(NO_CRON_COMMAND.iter().copied());
    let (cron_schedule, run_on_startup) = if cron_disabled {
        (CRON_DISABLED.to_string(), false)
    } else {
        (
            get("CRON_SCHEDULE").unwrap_or_default().trim().to_string(),
            get("RUN_ON_STARTUP")
                .and_then(parse_bool)
                .unwrap_or(defaults.run_on_startup),
        )
    };

    let albums = get("ALBUMS").unwrap_or_default();
    let healthcheck_url = match (get("HEALTHCHECK_HOST"), get("HEALTHCHECK_ID")) {
        (Some(host), Some(id)) if !host.is_empty() && !id.is_empty() => format!("{host}/{id}"),
        _ => String::new(),
    };

    ProfileConfig {
        enable_cron: !cron_disabled,
        cron_schedule,
        run_on_startup,
        loglevel: get("LOGLEVEL").map(str::to_string).unwrap_or(defaults.loglevel),
        worker_count: get("WORKER_COUNT")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.worker_count),
        albums: if is_unfiltered_albums(albums) {
            String::new()
        } else {
            albums.trim().to_string()
        },
        timezone: get("TZ").map(str::to_string).unwrap_or(defaults.timezone),
        puid: get("PUID")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.puid),
        pgid: get("PGID")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.pgid),
        photo_dir: String::new(),
        restart_schedule: get("RESTART_SCHEDULE").unwrap_or_default().to_string(),
        healthcheck_url,
    }
}

/// Parse manifest text back into the config that produced it.
///
/// Unknown keys, environment variables and extra services are ignored. The
/// profile's own service is preferred; otherwise the first one is used.
pub fn parse_manifest(fleet: &FleetConfig, profile: &str, text: &str) -> Result<ProfileConfig> {
    let document: ManifestDocument = serde_yaml_ng::from_str(text)?;
    let service_name = fleet.container_name(profile);
    let service = document
        .services
        .get(&service_name)
        .or_else(|| document.services.values().next())
        .ok_or_else(|| {
            FleetError::Validation(format!("manifest for '{profile}' defines no services"))
        })?;

    let env = service
        .environment
        .as_ref()
        .map(EnvironmentSpec::to_map)
        .unwrap_or_default();
    let command = service.command.as_ref().map(CommandSpec::parts).unwrap_or_default();

    let mut config = config_from_env(fleet, &env, &command);

    let default_photo_dir = fleet.default_photo_dir(profile);
    config.photo_dir = service
        .volumes
        .iter()
        .find_map(|volume| volume.source_for(PHOTO_MOUNT))
        .filter(|source| std::path::Path::new(source) != default_photo_dir.as_path())
        .unwrap_or_default();

    Ok(config)
}

/// Read and parse the persisted manifest; `ManifestMissing` when there is none.
pub fn read_manifest(fleet: &FleetConfig, profile: &str) -> Result<ProfileConfig> {
    let path = fleet.manifest_path(profile);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FleetError::ManifestMissing(profile.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    parse_manifest(fleet, profile, &text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fleet() -> FleetConfig {
        FleetConfig::for_workspace("/srv/gsync")
    }

    #[test]
    fn test_hand_edited_map_environment() {
        let text = r#"
version: "3.8"
services:
  gphotos-sync-alpha:
    image: gphotos-sync:latest
    labels:
      owner: ops
    environment:
      TZ: UTC
      PUID: 1001
      RUN_ON_STARTUP: false
      CRON_SCHEDULE: "30 4 * * *"
      EXTRA_FLAG: "ignored"
    volumes:
      - type: bind
        source: /mnt/photos/alpha
        target: /download
"#;
        let config = parse_manifest(&fleet(), "alpha", text).unwrap();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.puid, 1001);
        assert!(!config.run_on_startup);
        assert_eq!(config.cron_schedule, "30 4 * * *");
        assert_eq!(config.photo_dir, "/mnt/photos/alpha");
        assert_eq!(config.pgid, 1000);
    }

    #[test]
    fn test_shell_form_no_cron_command() {
        let text = r#"
services:
  gphotos-sync-alpha:
    command: /app/sync.sh --once
    environment:
      - TZ=UTC
"#;
        let config = parse_manifest(&fleet(), "alpha", text).unwrap();
        assert!(!config.enable_cron);
        assert_eq!(config.cron_schedule, "disabled");
    }

    #[test]
    fn test_never_configured_schedule_is_blank() {
        let text = "services:\n  gphotos-sync-alpha:\n    environment: []\n";
        let config = parse_manifest(&fleet(), "alpha", text).unwrap();
        assert!(config.enable_cron);
        assert_eq!(config.cron_schedule, "");
    }

    #[test]
    fn test_healthcheck_needs_both_halves() {
        let mut env = BTreeMap::new();
        env.insert("HEALTHCHECK_HOST".to_string(), "https://hc-ping.com".to_string());
        let config = config_from_env(&fleet(), &env, &[]);
        assert_eq!(config.healthcheck_url, "");

        env.insert("HEALTHCHECK_ID".to_string(), "abc".to_string());
        let config = config_from_env(&fleet(), &env, &[]);
        assert_eq!(config.healthcheck_url, "https://hc-ping.com/abc");
    }

    #[test]
    fn test_no_services_is_rejected() {
        let err = parse_manifest(&fleet(), "alpha", "services: {}\n").unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));
        assert!(parse_manifest(&fleet(), "alpha", "services: [").is_err());
    }

    #[test]
    fn test_missing_manifest() {
        let temp = tempfile::TempDir::new().unwrap();
        let fleet = FleetConfig::for_workspace(temp.path());
        let err = read_manifest(&fleet, "alpha").unwrap_err();
        assert!(matches!(err, FleetError::ManifestMissing(_)));
    }
}
