//! Bridge configuration.
//!
//! Construction-time settings, immutable thereafter. Resolution chain:
//! env var > config file (`~/.config/courier/config.toml`) > default.
//! Only the target agent address has no default; everything else falls
//! back to the values the bridge shipped with.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use courier_bus::Identity;

/// Default local runtime port.
pub const DEFAULT_PORT: u16 = 8082;
/// Default local runtime identity seed.
pub const DEFAULT_SEED: &str = "courier_bridge_seed";
/// Default dispatch loop period.
pub const DEFAULT_DISPATCH_PERIOD: Duration = Duration::from_millis(100);
/// Default adapter poll cadence.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(500);
/// Default wall-clock wait budget per query.
pub const DEFAULT_WAIT_BUDGET: Duration = Duration::from_secs(30);
/// Default readiness poll interval during startup.
pub const DEFAULT_STARTUP_POLL: Duration = Duration::from_millis(500);
/// Default readiness attempt cap (40 * 500ms = 20s bounded wait).
pub const DEFAULT_STARTUP_ATTEMPTS: u32 = 40;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub bridge: BridgeSection,
    #[serde(default)]
    pub timing: TimingSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BridgeSection {
    /// Address of the remote agent all queries are dispatched to.
    pub target_address: String,
    pub port: Option<u16>,
    pub seed: Option<String>,
    /// Relay/mailbox enablement for the local endpoint.
    pub relay: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TimingSection {
    pub dispatch_period_ms: Option<u64>,
    pub poll_period_ms: Option<u64>,
    pub wait_budget_secs: Option<u64>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the courier config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/courier` or
/// `~/.config/courier`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("courier");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("courier")
}

/// Return the path to the courier config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved bridge configuration, immutable after construction.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// The one remote identity every query is dispatched to.
    pub target: Identity,
    /// Local runtime network port.
    pub port: u16,
    /// Seed the local runtime identity is derived from.
    pub seed: String,
    /// Whether relay/mailbox delivery is enabled on the transport.
    pub relay_enabled: bool,
    /// Dispatch loop tick period.
    pub dispatch_period: Duration,
    /// Adapter poll cadence while waiting for a response.
    pub poll_period: Duration,
    /// Wall-clock budget per query before the adapter gives up.
    pub wait_budget: Duration,
    /// Readiness poll interval during startup.
    pub startup_poll: Duration,
    /// Readiness attempt cap during startup.
    pub startup_attempts: u32,
}

impl BridgeConfig {
    /// Build a config with defaults for everything but the target.
    pub fn new(target: Identity) -> Self {
        Self {
            target,
            port: DEFAULT_PORT,
            seed: DEFAULT_SEED.to_string(),
            relay_enabled: true,
            dispatch_period: DEFAULT_DISPATCH_PERIOD,
            poll_period: DEFAULT_POLL_PERIOD,
            wait_budget: DEFAULT_WAIT_BUDGET,
            startup_poll: DEFAULT_STARTUP_POLL,
            startup_attempts: DEFAULT_STARTUP_ATTEMPTS,
        }
    }

    /// Resolve configuration using the chain: env var > config file >
    /// default.
    ///
    /// - Target: `COURIER_TARGET_ADDRESS` > `bridge.target_address` >
    ///   error (there is no sensible default destination).
    /// - Port: `COURIER_PORT` > `bridge.port` > 8082.
    /// - Seed: `COURIER_SEED` > `bridge.seed` > `courier_bridge_seed`.
    /// - Relay: `COURIER_RELAY` ("true"/"false") > `bridge.relay` > true.
    /// - Timing: `COURIER_DISPATCH_PERIOD_MS`, `COURIER_POLL_PERIOD_MS`,
    ///   `COURIER_WAIT_BUDGET_SECS` > `[timing]` section > defaults.
    pub fn resolve() -> Result<Self> {
        let file = load_config().ok();

        let target = if let Ok(addr) = std::env::var("COURIER_TARGET_ADDRESS") {
            Identity::new(addr)
        } else if let Some(ref cfg) = file {
            Identity::new(cfg.bridge.target_address.clone())
        } else {
            bail!(
                "target agent address not found; set COURIER_TARGET_ADDRESS or write {}",
                config_path().display()
            );
        };

        let mut config = Self::new(target);

        if let Some(port) = env_parse::<u16>("COURIER_PORT")?
            .or_else(|| file.as_ref().and_then(|c| c.bridge.port))
        {
            config.port = port;
        }
        if let Ok(seed) = std::env::var("COURIER_SEED") {
            config.seed = seed;
        } else if let Some(seed) = file.as_ref().and_then(|c| c.bridge.seed.clone()) {
            config.seed = seed;
        }
        if let Some(relay) = env_parse::<bool>("COURIER_RELAY")?
            .or_else(|| file.as_ref().and_then(|c| c.bridge.relay))
        {
            config.relay_enabled = relay;
        }

        if let Some(ms) = env_parse::<u64>("COURIER_DISPATCH_PERIOD_MS")?
            .or_else(|| file.as_ref().and_then(|c| c.timing.dispatch_period_ms))
        {
            config.dispatch_period = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("COURIER_POLL_PERIOD_MS")?
            .or_else(|| file.as_ref().and_then(|c| c.timing.poll_period_ms))
        {
            config.poll_period = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("COURIER_WAIT_BUDGET_SECS")?
            .or_else(|| file.as_ref().and_then(|c| c.timing.wait_budget_secs))
        {
            config.wait_budget = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Read and parse an env var, distinguishing "unset" from "unparsable".
fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(e) => bail!("invalid value for {name}: {e}"),
        },
        Err(_) => Ok(None),
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Serialize env-mutating tests; std::env is process-global.
    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
        LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    const ENV_VARS: [&str; 7] = [
        "COURIER_TARGET_ADDRESS",
        "COURIER_PORT",
        "COURIER_SEED",
        "COURIER_RELAY",
        "COURIER_DISPATCH_PERIOD_MS",
        "COURIER_POLL_PERIOD_MS",
        "COURIER_WAIT_BUDGET_SECS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn new_uses_documented_defaults() {
        let config = BridgeConfig::new(Identity::new("agent1target"));
        assert_eq!(config.port, 8082);
        assert_eq!(config.seed, "courier_bridge_seed");
        assert!(config.relay_enabled);
        assert_eq!(config.dispatch_period, Duration::from_millis(100));
        assert_eq!(config.poll_period, Duration::from_millis(500));
        assert_eq!(config.wait_budget, Duration::from_secs(30));
        assert_eq!(config.startup_attempts, 40);
    }

    #[test]
    fn resolve_errors_without_target() {
        let _lock = lock_env();
        clear_env();
        // Point config lookup at an empty temp dir so no real file leaks in.
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let result = BridgeConfig::resolve();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        let err = result.unwrap_err();
        assert!(
            err.to_string().contains("target agent address not found"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn resolve_env_overrides_everything() {
        let _lock = lock_env();
        clear_env();
        unsafe {
            std::env::set_var("COURIER_TARGET_ADDRESS", "agent1fromenv");
            std::env::set_var("COURIER_PORT", "9000");
            std::env::set_var("COURIER_SEED", "env_seed");
            std::env::set_var("COURIER_RELAY", "false");
            std::env::set_var("COURIER_WAIT_BUDGET_SECS", "5");
        }

        let config = BridgeConfig::resolve().unwrap();

        clear_env();

        assert_eq!(config.target, Identity::new("agent1fromenv"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.seed, "env_seed");
        assert!(!config.relay_enabled);
        assert_eq!(config.wait_budget, Duration::from_secs(5));
        // Untouched settings keep their defaults.
        assert_eq!(config.poll_period, Duration::from_millis(500));
    }

    #[test]
    fn resolve_reads_config_file() {
        let _lock = lock_env();
        clear_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("courier");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.toml"),
            r#"
[bridge]
target_address = "agent1fromfile"
port = 9100
relay = false

[timing]
wait_budget_secs = 12
"#,
        )
        .unwrap();

        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let result = BridgeConfig::resolve();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        let config = result.unwrap();
        assert_eq!(config.target, Identity::new("agent1fromfile"));
        assert_eq!(config.port, 9100);
        assert!(!config.relay_enabled);
        assert_eq!(config.wait_budget, Duration::from_secs(12));
        // File omitted the seed: default applies.
        assert_eq!(config.seed, DEFAULT_SEED);
    }

    #[test]
    fn resolve_rejects_unparsable_env_value() {
        let _lock = lock_env();
        clear_env();
        unsafe {
            std::env::set_var("COURIER_TARGET_ADDRESS", "agent1x");
            std::env::set_var("COURIER_PORT", "not-a-port");
        }

        let result = BridgeConfig::resolve();
        clear_env();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("COURIER_PORT"));
    }

    #[test]
    fn config_file_parses_minimal_form() {
        let parsed: ConfigFile = toml::from_str(
            r#"
[bridge]
target_address = "agent1minimal"
"#,
        )
        .unwrap();
        assert_eq!(parsed.bridge.target_address, "agent1minimal");
        assert!(parsed.bridge.port.is_none());
        assert!(parsed.timing.wait_budget_secs.is_none());
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let _lock = lock_env();
        let path = config_path();
        assert!(
            path.ends_with("courier/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
