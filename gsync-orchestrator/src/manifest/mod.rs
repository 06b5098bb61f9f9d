//! Compose manifests: rendering a [`ProfileConfig`] into a file and reading it back.

use std::path::Path;
use std::sync::OnceLock;

use tera::{Context, Tera};
use tracing::info;

use gsync_core::{FleetConfig, FleetError, Result};

use crate::profile::{is_unfiltered_albums, validate_profile_name_for, ProfileConfig};
use crate::store;

mod parse;

pub use parse::{config_from_env, parse_manifest, read_manifest};

/// Command that makes the worker run one pass and exit instead of starting cron.
pub const NO_CRON_COMMAND: &[&str] = &["/app/sync.sh", "--once"];

/// Mount point of the profile working directory (browser session state).
pub const PROFILE_MOUNT: &str = "/tmp/gphotos-cdp";

/// Mount point of the photo output directory.
pub const PHOTO_MOUNT: &str = "/download";

pub const RESTART_WITH_CRON: &str = "unless-stopped";
pub const RESTART_WITHOUT_CRON: &str = "no";

static MANIFEST_TERA: OnceLock<Tera> = OnceLock::new();

fn manifest_tera() -> &'static Tera {
    MANIFEST_TERA.get_or_init(|| {
        let mut tera = Tera::default();
        tera.add_raw_template("docker-compose.yml", include_str!("template.yml"))
            .expect("Failed to add manifest template");
        tera
    })
}

/// YAML double-quoted scalar. JSON string escapes are a subset of YAML's.
fn quote(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        FleetError::Validation(format!("path is not valid UTF-8: {}", path.display()))
    })
}

/// Photo directory the manifest mounts: the override, or the derived default.
pub fn resolved_photo_dir(fleet: &FleetConfig, profile: &str, config: &ProfileConfig) -> Result<String> {
    if config.photo_dir.is_empty() {
        Ok(path_str(&fleet.default_photo_dir(profile))?.to_string())
    } else {
        Ok(config.photo_dir.clone())
    }
}

/// `KEY=value` entries in their fixed order.
pub fn environment_entries(config: &ProfileConfig) -> Result<Vec<String>> {
    let mut env = vec![
        format!("TZ={}", config.timezone),
        format!("PUID={}", config.puid),
        format!("PGID={}", config.pgid),
        format!("LOGLEVEL={}", config.loglevel),
        format!("WORKER_COUNT={}", config.worker_count),
    ];
    if config.enable_cron {
        env.push(format!("CRON_SCHEDULE={}", config.cron_schedule.trim()));
        env.push(format!("RUN_ON_STARTUP={}", config.run_on_startup));
    }
    if !is_unfiltered_albums(&config.albums) {
        env.push(format!("ALBUMS={}", config.albums.trim()));
    }
    if !config.restart_schedule.is_empty() {
        env.push(format!("RESTART_SCHEDULE={}", config.restart_schedule));
    }
    if let Some((host, id)) = config.healthcheck_parts()? {
        env.push(format!("HEALTHCHECK_HOST={host}"));
        env.push(format!("HEALTHCHECK_ID={id}"));
    }
    Ok(env)
}

/// Render the manifest text. Output depends only on the arguments.
pub fn render_manifest(fleet: &FleetConfig, profile: &str, config: &ProfileConfig) -> Result<String> {
    validate_profile_name_for(fleet, profile)?;
    config.validate()?;

    let profile_dir = fleet.profile_dir(profile);
    let photo_dir = resolved_photo_dir(fleet, profile, config)?;

    let volumes = [
        format!("{}:{PROFILE_MOUNT}", path_str(&profile_dir)?),
        format!("{photo_dir}:{PHOTO_MOUNT}"),
    ]
    .iter()
    .map(|v| quote(v))
    .collect::<Result<Vec<_>>>()?;

    let environment = environment_entries(config)?
        .iter()
        .map(|e| quote(e))
        .collect::<Result<Vec<_>>>()?;

    let command = if config.enable_cron {
        String::new()
    } else {
        let parts = NO_CRON_COMMAND
            .iter()
            .map(|part| quote(part))
            .collect::<Result<Vec<_>>>()?;
        format!("[{}]", parts.join(", "))
    };
    let restart = if config.enable_cron {
        RESTART_WITH_CRON
    } else {
        RESTART_WITHOUT_CRON
    };

    let mut context = Context::new();
    context.insert("profile", profile);
    context.insert("service", &quote(&fleet.container_name(profile))?);
    context.insert("image", &quote(&fleet.image)?);
    context.insert("build_context", &quote(path_str(&fleet.build_context)?)?);
    context.insert("restart", &quote(restart)?);
    context.insert("command", &command);
    context.insert("volumes", &volumes);
    context.insert("environment", &environment);
    context.insert("network", &quote(&fleet.network)?);

    Ok(manifest_tera().render("docker-compose.yml", &context)?)
}

/// Render, write atomically to the profile's manifest path, and record the
/// resolved photo directory in the sidecar.
pub fn generate(fleet: &FleetConfig, profile: &str, config: &ProfileConfig) -> Result<String> {
    let text = render_manifest(fleet, profile, config)?;
    let path = fleet.manifest_path(profile);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    store::write_atomic(&path, text.as_bytes())?;
    store::record_photo_dir(fleet, profile, &resolved_photo_dir(fleet, profile, config)?)?;

    info!(profile = %profile, path = %path.display(), cron = config.enable_cron, "manifest written");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fleet() -> FleetConfig {
        FleetConfig::for_workspace("/srv/gsync")
    }

    #[test]
    fn test_render_cron_profile() {
        let text = render_manifest(&fleet(), "alpha", &ProfileConfig::default()).unwrap();
        assert!(text.contains("  \"gphotos-sync-alpha\":\n"));
        assert!(text.contains("restart: \"unless-stopped\""));
        assert!(!text.contains("command:"));
        assert!(text.contains("- \"/srv/gsync/alpha:/tmp/gphotos-cdp\""));
        assert!(text.contains("- \"/srv/gsync/photos/alpha:/download\""));
        assert!(text.contains("- \"CRON_SCHEDULE=0 2 * * *\""));
        assert!(!text.contains("ALBUMS"));
    }

    #[test]
    fn test_render_without_cron() {
        let config = ProfileConfig {
            enable_cron: false,
            ..Default::default()
        };
        let text = render_manifest(&fleet(), "alpha", &config).unwrap();
        assert!(text.contains("restart: \"no\""));
        assert!(text.contains("command: [\"/app/sync.sh\", \"--once\"]"));
        assert!(!text.contains("CRON_SCHEDULE"));
        assert!(!text.contains("RUN_ON_STARTUP"));
    }

    #[test]
    fn test_environment_order_is_fixed() {
        let config = ProfileConfig {
            albums: "Holidays".into(),
            restart_schedule: "0 0 * * 0".into(),
            healthcheck_url: "https://hc.example/ping/abc".into(),
            ..Default::default()
        };
        let keys: Vec<String> = environment_entries(&config)
            .unwrap()
            .iter()
            .map(|e| e.split('=').next().unwrap().to_string())
            .collect();
        assert_eq!(
            keys,
            vec![
                "TZ",
                "PUID",
                "PGID",
                "LOGLEVEL",
                "WORKER_COUNT",
                "CRON_SCHEDULE",
                "RUN_ON_STARTUP",
                "ALBUMS",
                "RESTART_SCHEDULE",
                "HEALTHCHECK_HOST",
                "HEALTHCHECK_ID"
            ]
        );
    }

    #[test]
    fn test_all_albums_is_omitted() {
        for albums in ["", "ALL", "all", " All "] {
            let config = ProfileConfig {
                albums: albums.into(),
                ..Default::default()
            };
            let env = environment_entries(&config).unwrap();
            assert!(env.iter().all(|e| !e.starts_with("ALBUMS=")), "{albums:?}");
        }
    }

    #[test]
    fn test_values_are_quoted() {
        let config = ProfileConfig {
            albums: "Trip: \"Rome\" #1".into(),
            ..Default::default()
        };
        let text = render_manifest(&fleet(), "alpha", &config).unwrap();
        assert!(text.contains(r#"- "ALBUMS=Trip: \"Rome\" #1""#));
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        assert!(render_manifest(&fleet(), "Bad Name", &ProfileConfig::default()).is_err());
        let config = ProfileConfig {
            healthcheck_url: "nohost".into(),
            ..Default::default()
        };
        assert!(render_manifest(&fleet(), "alpha", &config).is_err());
    }
}
