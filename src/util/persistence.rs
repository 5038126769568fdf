use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde_json::Error as SerdeError;
use tracing::{debug, warn};

use crate::domain::AgentConfig;

const APP_QUALIFIER: &str = "com";
const APP_ORG: &str = "FreightOfferScanner";
const APP_NAME: &str = "FreightOfferScanner";
const AGENT_FILENAME: &str = "agent.json";

/// Where the saved agent profile lives, if the platform has a config dir.
pub fn agent_file() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .map(|dirs| dirs.config_dir().join(AGENT_FILENAME))
}

/// The saved agent profile. Missing or unreadable profiles yield `None`.
pub fn load_agent_config() -> Option<AgentConfig> {
    let path = agent_file()?;
    match load_agent_file(&path) {
        Ok(agent) => Some(agent),
        Err(PersistError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no saved agent profile");
            None
        }
        Err(err) => {
            warn!(path = %path.display(), "ignoring saved agent profile: {err}");
            None
        }
    }
}

pub fn load_agent_file(path: &Path) -> Result<AgentConfig, PersistError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

pub fn save_agent_config(agent: &AgentConfig) -> Result<PathBuf, PersistError> {
    let path = agent_file().ok_or(PersistError::StorageUnavailable)?;
    write_agent_file(&path, agent)?;
    Ok(path)
}

fn write_agent_file(path: &Path, agent: &AgentConfig) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(agent)?;
    fs::write(path, json)?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("storage directory unavailable")]
    StorageUnavailable,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serde(#[from] SerdeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Financials, VehiclePreferences};

    #[test]
    fn agent_profile_round_trips_through_file() {
        let dir = std::env::temp_dir().join(format!("agent-{}", uuid::Uuid::new_v4()));
        let path = dir.join(AGENT_FILENAME);
        let agent = AgentConfig {
            id: Some("agent-7".into()),
            name: Some("Night shift".into()),
            financials: Some(Financials {
                rate_per_km: Some(3.1),
                ..Financials::default()
            }),
            vehicle_preferences: Some(VehiclePreferences {
                fuel_consumption: Some(27.0),
                capacity: None,
            }),
        };

        write_agent_file(&path, &agent).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"ratePerKm\""));
        assert_eq!(load_agent_file(&path).unwrap(), agent);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn malformed_profile_is_a_serde_error() {
        let path = std::env::temp_dir().join(format!("agent-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(load_agent_file(&path), Err(PersistError::Serde(_))));
        fs::remove_file(path).ok();
    }
}
