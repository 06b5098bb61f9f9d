//! Profile identity and the declarative configuration of its container.

use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono_tz::Tz;
use croner::Cron;
use regex::Regex;
use serde::{Deserialize, Serialize};

use gsync_core::{FleetConfig, FleetError, Result};

/// Sentinel `cron_schedule` for a profile that runs once and exits.
pub const CRON_DISABLED: &str = "disabled";

/// Album value that, like an empty string, means "no album filter".
pub const ALL_ALBUMS: &str = "ALL";

const MAX_NAME_LEN: usize = 64;
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "warning", "error"];

static NAME_PATTERN: OnceLock<Regex> = OnceLock::new();

fn name_pattern() -> &'static Regex {
    NAME_PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9_-]+$").expect("valid profile name pattern"))
}

/// Check that `name` is a filesystem-safe profile identifier.
pub fn validate_profile_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FleetError::Validation("profile name must not be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FleetError::Validation(format!(
            "profile name is longer than {MAX_NAME_LEN} characters"
        )));
    }
    if !name_pattern().is_match(name) {
        return Err(FleetError::Validation(format!(
            "profile name '{name}' may only contain lowercase letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

/// [`validate_profile_name`], plus a name whose working directory would
/// collide with a fleet-wide directory (photo output, build context, host
/// mount) is refused.
pub fn validate_profile_name_for(fleet: &FleetConfig, name: &str) -> Result<()> {
    validate_profile_name(name)?;
    if fleet.overlaps_shared_dir(name) {
        return Err(FleetError::Validation(format!(
            "profile name '{name}' is reserved for a shared fleet directory"
        )));
    }
    Ok(())
}

/// True when `albums` selects no filter.
pub fn is_unfiltered_albums(albums: &str) -> bool {
    let trimmed = albums.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(ALL_ALBUMS)
}

/// Intent for a profile's container. Rendered into a manifest by
/// [`crate::manifest::render_manifest`] and recovered by [`crate::manifest::parse_manifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub enable_cron: bool,
    pub cron_schedule: String,
    pub run_on_startup: bool,
    pub loglevel: String,
    pub worker_count: u32,
    pub albums: String,
    pub timezone: String,
    pub puid: u32,
    pub pgid: u32,
    pub photo_dir: String,
    pub restart_schedule: String,
    pub healthcheck_url: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            enable_cron: true,
            cron_schedule: "0 2 * * *".to_string(),
            run_on_startup: true,
            loglevel: "info".to_string(),
            worker_count: 6,
            albums: String::new(),
            timezone: "Europe/Rome".to_string(),
            puid: 1000,
            pgid: 1000,
            photo_dir: String::new(),
            restart_schedule: String::new(),
            healthcheck_url: String::new(),
        }
    }
}

impl ProfileConfig {
    /// Defaults with the fleet-wide schedule, zone and ownership applied.
    pub fn defaults_for(fleet: &FleetConfig) -> Self {
        Self {
            cron_schedule: fleet.default_cron_schedule.clone(),
            timezone: fleet.default_timezone.clone(),
            puid: fleet.default_puid,
            pgid: fleet.default_pgid,
            ..Self::default()
        }
    }

    /// Canonical form: what a manifest written from this config reads back as.
    ///
    /// `ALL` albums collapse to the empty filter, and with cron disabled the
    /// schedule becomes [`CRON_DISABLED`] and `run_on_startup` false, since
    /// neither is persisted.
    pub fn normalized(&self) -> Self {
        let mut config = self.clone();
        if is_unfiltered_albums(&config.albums) {
            config.albums = String::new();
        } else {
            config.albums = config.albums.trim().to_string();
        }
        if config.enable_cron {
            config.cron_schedule = config.cron_schedule.trim().to_string();
        } else {
            config.cron_schedule = CRON_DISABLED.to_string();
            config.run_on_startup = false;
        }
        config.healthcheck_url = config.healthcheck_url.trim().to_string();
        config
    }

    /// `(host, id)` halves of the healthcheck URL, split at the last `/`.
    pub fn healthcheck_parts(&self) -> Result<Option<(String, String)>> {
        let url = self.healthcheck_url.trim();
        if url.is_empty() {
            return Ok(None);
        }
        match url.rsplit_once('/') {
            Some((host, id)) if !host.is_empty() && !id.is_empty() => {
                Ok(Some((host.to_string(), id.to_string())))
            }
            _ => Err(FleetError::Validation(format!(
                "healthcheck URL '{url}' must end in '/<check id>'"
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.enable_cron {
            let schedule = self.cron_schedule.trim();
            if schedule.is_empty() || schedule == CRON_DISABLED {
                return Err(FleetError::Validation(
                    "a cron schedule is required when cron is enabled".into(),
                ));
            }
            Cron::new(schedule).parse().map_err(|e| {
                FleetError::Validation(format!("invalid cron schedule '{schedule}': {e}"))
            })?;
        }
        if !LOG_LEVELS.contains(&self.loglevel.to_ascii_lowercase().as_str()) {
            return Err(FleetError::Validation(format!(
                "unknown log level '{}'",
                self.loglevel
            )));
        }
        if self.worker_count == 0 {
            return Err(FleetError::Validation("worker_count must be at least 1".into()));
        }
        Tz::from_str(&self.timezone).map_err(|_| {
            FleetError::Validation(format!("unknown timezone '{}'", self.timezone))
        })?;
        if !self.photo_dir.is_empty() && !Path::new(&self.photo_dir).is_absolute() {
            return Err(FleetError::Validation(format!(
                "photo_dir '{}' must be an absolute path",
                self.photo_dir
            )));
        }
        self.healthcheck_parts()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_name_validation() {
        assert!(validate_profile_name("alpha").is_ok());
        assert!(validate_profile_name("family_2-photos").is_ok());
        assert!(validate_profile_name("").is_err());
        assert!(validate_profile_name("Alpha").is_err());
        assert!(validate_profile_name("../etc").is_err());
        assert!(validate_profile_name("with space").is_err());
        assert!(validate_profile_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_shared_directory_names_are_reserved() {
        let fleet = FleetConfig::for_workspace("/srv/gsync");
        for name in ["photos", "gphotos-cdp", "host"] {
            let err = validate_profile_name_for(&fleet, name).unwrap_err();
            assert!(matches!(err, FleetError::Validation(_)), "{name}");
        }
        assert!(validate_profile_name_for(&fleet, "alpha").is_ok());
    }

    #[test]
    fn test_normalized_collapses_all_albums() {
        let config = ProfileConfig {
            albums: "all".into(),
            ..Default::default()
        };
        assert_eq!(config.normalized().albums, "");

        let config = ProfileConfig {
            albums: " Holidays ".into(),
            ..Default::default()
        };
        assert_eq!(config.normalized().albums, "Holidays");
    }

    #[test]
    fn test_normalized_disabled_cron() {
        let config = ProfileConfig {
            enable_cron: false,
            cron_schedule: "0 3 * * *".into(),
            run_on_startup: true,
            ..Default::default()
        };
        let normalized = config.normalized();
        assert_eq!(normalized.cron_schedule, CRON_DISABLED);
        assert!(!normalized.run_on_startup);
        assert!(normalized.validate().is_ok());
    }

    #[test]
    fn test_healthcheck_parts() {
        let config = ProfileConfig {
            healthcheck_url: "https://hc-ping.com/1a2b3c4d-5e6f-7081-92a3-b4c5d6e7f809".into(),
            ..Default::default()
        };
        assert_eq!(
            config.healthcheck_parts().unwrap(),
            Some((
                "https://hc-ping.com".to_string(),
                "1a2b3c4d-5e6f-7081-92a3-b4c5d6e7f809".to_string()
            ))
        );

        let trailing = ProfileConfig {
            healthcheck_url: "https://hc-ping.com/".into(),
            ..Default::default()
        };
        assert!(trailing.healthcheck_parts().is_err());
        assert_eq!(ProfileConfig::default().healthcheck_parts().unwrap(), None);
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let bad_cron = ProfileConfig {
            cron_schedule: "every day".into(),
            ..Default::default()
        };
        assert!(bad_cron.validate().is_err());

        let bad_tz = ProfileConfig {
            timezone: "Mars/Olympus".into(),
            ..Default::default()
        };
        assert!(bad_tz.validate().is_err());

        let relative_dir = ProfileConfig {
            photo_dir: "photos/alpha".into(),
            ..Default::default()
        };
        assert!(relative_dir.validate().is_err());

        let no_workers = ProfileConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(no_workers.validate().is_err());

        assert!(ProfileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_defaults_for_fleet() {
        let mut fleet = FleetConfig::for_workspace("/ws");
        fleet.default_puid = 1001;
        fleet.default_timezone = "UTC".into();
        let config = ProfileConfig::defaults_for(&fleet);
        assert_eq!(config.puid, 1001);
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.worker_count, 6);
    }
}
