//! Configuration Vault – reads/writes `~/.worldbot/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroize;

use worldbot_bridge::UdpConfig;
use worldbot_runtime::ServiceConfig;
use worldbot_types::ResponseConfig;

/// Persisted operator configuration stored in `~/.worldbot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Local address the OSC listener binds to.
    #[serde(default = "default_listen_ip")]
    pub osc_listen_ip: String,
    #[serde(default = "default_listen_port")]
    pub osc_listen_port: u16,

    /// Where outbound OSC messages are sent.
    #[serde(default = "default_remote_ip")]
    pub remote_ip: String,
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,

    /// Answer chat requests locally with a canned reply instead of using UDP.
    #[serde(default)]
    pub simulate: bool,

    /// Debug-level logging.
    #[serde(default)]
    pub verbose: bool,

    /// JSON or TOML knowledge file.
    #[serde(default = "default_knowledge_base_file")]
    pub knowledge_base_file: PathBuf,

    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
    #[serde(default = "default_response")]
    pub default_response: String,
    #[serde(default)]
    pub bot_prefix: String,
    #[serde(default)]
    pub bot_suffix: String,
    #[serde(default = "default_max_history_length")]
    pub max_history_length: usize,

    /// Seconds to wait for a reply before the link is reported degraded.
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,

    /// Outbound OSC rate limit; `0` disables it.
    #[serde(default = "default_max_sends_per_second")]
    pub max_sends_per_second: u32,

    /// Reply to greetings, help requests and thanks.
    #[serde(default)]
    pub small_talk: bool,

    /// Copy every bot message to the VRChat chatbox.
    #[serde(default)]
    pub mirror_to_chatbox: bool,

    /// Interface the status panel binds to.  Loopback by default; the panel
    /// has no authentication.
    #[serde(default = "default_panel_host")]
    pub panel_host: String,

    /// HTTP port of the status panel; `0` disables it.
    #[serde(default = "default_panel_port")]
    pub panel_port: u16,

    /// Discord webhook for item-interaction alerts.  Stored as plain text;
    /// the file is written owner-only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub discord_webhook_url: String,

    /// Mentions pinged on every alert, e.g. `<@12345>`.
    #[serde(default)]
    pub owner_discord_ids: Vec<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("osc_listen_ip", &self.osc_listen_ip)
            .field("osc_listen_port", &self.osc_listen_port)
            .field("remote_ip", &self.remote_ip)
            .field("remote_port", &self.remote_port)
            .field("simulate", &self.simulate)
            .field("verbose", &self.verbose)
            .field("knowledge_base_file", &self.knowledge_base_file)
            .field("match_threshold", &self.match_threshold)
            .field("default_response", &self.default_response)
            .field("bot_prefix", &self.bot_prefix)
            .field("bot_suffix", &self.bot_suffix)
            .field("max_history_length", &self.max_history_length)
            .field("reply_timeout_secs", &self.reply_timeout_secs)
            .field("max_sends_per_second", &self.max_sends_per_second)
            .field("small_talk", &self.small_talk)
            .field("mirror_to_chatbox", &self.mirror_to_chatbox)
            .field("panel_host", &self.panel_host)
            .field("panel_port", &self.panel_port)
            .field(
                "discord_webhook_url",
                if self.discord_webhook_url.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("owner_discord_ids", &self.owner_discord_ids)
            .finish()
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        self.discord_webhook_url.zeroize();
    }
}

fn default_listen_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    9001
}
fn default_remote_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_remote_port() -> u16 {
    9000
}
fn default_knowledge_base_file() -> PathBuf {
    PathBuf::from("knowledge_base.json")
}
fn default_match_threshold() -> f32 {
    ResponseConfig::default().match_threshold
}
fn default_response() -> String {
    ResponseConfig::default().default_response
}
fn default_max_history_length() -> usize {
    worldbot_types::DEFAULT_MAX_HISTORY_LENGTH
}
fn default_reply_timeout_secs() -> u64 {
    5
}
fn default_max_sends_per_second() -> u32 {
    10
}
fn default_panel_host() -> String {
    worldbot_panel::DEFAULT_HOST.to_string()
}
fn default_panel_port() -> u16 {
    worldbot_panel::DEFAULT_PORT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            osc_listen_ip: default_listen_ip(),
            osc_listen_port: default_listen_port(),
            remote_ip: default_remote_ip(),
            remote_port: default_remote_port(),
            simulate: false,
            verbose: false,
            knowledge_base_file: default_knowledge_base_file(),
            match_threshold: default_match_threshold(),
            default_response: default_response(),
            bot_prefix: String::new(),
            bot_suffix: String::new(),
            max_history_length: default_max_history_length(),
            reply_timeout_secs: default_reply_timeout_secs(),
            max_sends_per_second: default_max_sends_per_second(),
            small_talk: false,
            mirror_to_chatbox: false,
            panel_host: default_panel_host(),
            panel_port: default_panel_port(),
            discord_webhook_url: String::new(),
            owner_discord_ids: Vec::new(),
        }
    }
}

impl Config {
    pub fn response_config(&self) -> ResponseConfig {
        ResponseConfig {
            match_threshold: self.match_threshold,
            default_response: self.default_response.clone(),
            bot_prefix: self.bot_prefix.clone(),
            bot_suffix: self.bot_suffix.clone(),
            max_history_length: self.max_history_length,
        }
    }

    pub fn udp_config(&self) -> Result<UdpConfig, String> {
        Ok(UdpConfig {
            listen: socket_addr("osc_listen_ip", &self.osc_listen_ip, self.osc_listen_port)?,
            remote: socket_addr("remote_ip", &self.remote_ip, self.remote_port)?,
            max_sends_per_second: NonZeroU32::new(self.max_sends_per_second),
        })
    }

    pub fn panel_addr(&self) -> Result<SocketAddr, String> {
        socket_addr("panel_host", &self.panel_host, self.panel_port)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            reply_timeout: Duration::from_secs(self.reply_timeout_secs),
            mirror_to_chatbox: self.mirror_to_chatbox,
            ..ServiceConfig::default()
        }
    }

    /// Fail fast on values the bot cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        self.response_config().validate().map_err(|e| e.to_string())?;
        self.udp_config()?;
        self.panel_addr()?;
        if self.reply_timeout_secs == 0 {
            return Err("reply_timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

fn socket_addr(field: &str, ip: &str, port: u16) -> Result<SocketAddr, String> {
    ip.trim()
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .map_err(|e| format!("{field} {ip:?} is not an IP address: {e}"))
}

/// Return the path to `~/.worldbot/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".worldbot").join("config.toml")
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

fn env_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply `WORLDBOT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `WORLDBOT_SIMULATE` | `simulate` |
/// | `WORLDBOT_VERBOSE` | `verbose` |
/// | `WORLDBOT_OSC_LISTEN_PORT` | `osc_listen_port` |
/// | `WORLDBOT_REMOTE_IP` | `remote_ip` |
/// | `WORLDBOT_REMOTE_PORT` | `remote_port` |
/// | `WORLDBOT_KNOWLEDGE_BASE` | `knowledge_base_file` |
/// | `WORLDBOT_PANEL_HOST` | `panel_host` |
/// | `WORLDBOT_PANEL_PORT` | `panel_port` |
/// | `WORLDBOT_DISCORD_WEBHOOK_URL` | `discord_webhook_url` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("WORLDBOT_SIMULATE")
        && let Some(flag) = env_flag(&v)
    {
        cfg.simulate = flag;
    }
    if let Ok(v) = std::env::var("WORLDBOT_VERBOSE")
        && let Some(flag) = env_flag(&v)
    {
        cfg.verbose = flag;
    }
    if let Ok(v) = std::env::var("WORLDBOT_OSC_LISTEN_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.osc_listen_port = port;
    }
    if let Ok(v) = std::env::var("WORLDBOT_REMOTE_IP") {
        cfg.remote_ip = v;
    }
    if let Ok(v) = std::env::var("WORLDBOT_REMOTE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.remote_port = port;
    }
    if let Ok(v) = std::env::var("WORLDBOT_KNOWLEDGE_BASE") {
        cfg.knowledge_base_file = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("WORLDBOT_PANEL_HOST") {
        cfg.panel_host = v;
    }
    if let Ok(v) = std::env::var("WORLDBOT_PANEL_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.panel_port = port;
    }
    if let Ok(v) = std::env::var("WORLDBOT_DISCORD_WEBHOOK_URL") {
        cfg.discord_webhook_url.zeroize();
        cfg.discord_webhook_url = v;
    }
}

/// Save the config to `path`, creating its directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let mut raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner-only read/write on Unix.
    #[cfg(unix)]
    let written = {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
    };
    #[cfg(not(unix))]
    let written = fs::write(path, &raw);
    raw.zeroize();
    written.map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.osc_listen_ip, "0.0.0.0");
        assert_eq!(cfg.osc_listen_port, 9001);
        assert_eq!(cfg.remote_ip, "127.0.0.1");
        assert_eq!(cfg.remote_port, 9000);
        assert!(!cfg.simulate);
        assert_eq!(cfg.match_threshold, 0.5);
        assert_eq!(cfg.max_history_length, 5);
        assert_eq!(cfg.panel_port, 5000);
        assert_eq!(cfg.panel_host, "127.0.0.1");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn panel_is_loopback_unless_host_is_set() {
        let cfg = Config::default();
        assert!(cfg.panel_addr().unwrap().ip().is_loopback());

        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "panel_host = \"0.0.0.0\"\npanel_port = 5050\n").unwrap();
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.panel_addr().unwrap(), "0.0.0.0:5050".parse::<SocketAddr>().unwrap());

        let mut cfg = Config::default();
        cfg.panel_host = "localhost".to_string();
        assert!(cfg.validate().unwrap_err().contains("panel_host"));
    }

    #[test]
    fn config_debug_redacts_webhook() {
        let mut cfg = Config::default();
        cfg.discord_webhook_url = "https://discord.com/api/webhooks/1/secret".to_string();
        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("secret"), "webhook must not appear in debug output");
        assert!(debug_str.contains("<redacted>"));
        assert!(format!("{:?}", Config::default()).contains("<not set>"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_keeps_custom_values() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.remote_port = 9100;
        cfg.small_talk = true;
        cfg.owner_discord_ids = vec!["<@1>".to_string()];
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.remote_port, 9100);
        assert!(loaded.small_talk);
        assert_eq!(loaded.owner_discord_ids, vec!["<@1>".to_string()]);
        assert_eq!(loaded.knowledge_base_file, PathBuf::from("knowledge_base.json"));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "simulate = true\nmatch_threshold = 0.75\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert!(loaded.simulate);
        assert_eq!(loaded.match_threshold, 0.75);
        assert_eq!(loaded.osc_listen_port, 9001);
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn config_path_points_to_worldbot_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".worldbot"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.match_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.remote_ip = "not-an-ip".to_string();
        assert!(cfg.validate().unwrap_err().contains("remote_ip"));

        let mut cfg = Config::default();
        cfg.reply_timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn runtime_configs_are_derived() {
        let mut cfg = Config::default();
        cfg.max_sends_per_second = 0;
        cfg.reply_timeout_secs = 9;
        cfg.mirror_to_chatbox = true;

        let udp = cfg.udp_config().unwrap();
        assert_eq!(udp.listen.port(), 9001);
        assert_eq!(udp.max_sends_per_second, None);

        let service = cfg.service_config();
        assert_eq!(service.reply_timeout, Duration::from_secs(9));
        assert!(service.mirror_to_chatbox);
    }

    #[test]
    fn env_flags_parse_common_spellings() {
        assert_eq!(env_flag("TRUE"), Some(true));
        assert_eq!(env_flag(" off "), Some(false));
        assert_eq!(env_flag("maybe"), None);
    }

    #[test]
    fn apply_env_overrides_changes_remote_and_simulate() {
        // SAFETY: only this test touches these variables.
        unsafe {
            std::env::set_var("WORLDBOT_REMOTE_IP", "10.0.0.7");
            std::env::set_var("WORLDBOT_SIMULATE", "yes");
            std::env::set_var("WORLDBOT_PANEL_PORT", "not-a-port");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.remote_ip, "10.0.0.7");
        assert!(cfg.simulate);
        assert_eq!(cfg.panel_port, 5000);
        unsafe {
            std::env::remove_var("WORLDBOT_REMOTE_IP");
            std::env::remove_var("WORLDBOT_SIMULATE");
            std::env::remove_var("WORLDBOT_PANEL_PORT");
        }
    }
}
