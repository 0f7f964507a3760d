use std::io;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use dirs::home_dir;
use path_absolutize::Absolutize;
use serde::Deserialize;
use serde::Serialize;
use toml::Value as TomlValue;
use tracing::debug;
use warden_shell_command::RiskRules;

use crate::error::Result;
use crate::error::WardenErr;
use crate::exec::DEFAULT_EXEC_COMMAND_TIMEOUT_MS;
use crate::protocol::ApprovalPolicy;
use crate::protocol::SandboxKind;
use crate::protocol::SandboxPolicy;
use crate::safety::get_platform_sandbox;

pub const CONFIG_TOML_FILE: &str = "config.toml";

/// Which isolation primitive to use. `auto` picks the host's restricted
/// sandbox and falls back to none where the host has no sandbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    #[default]
    Auto,
    None,
    Seatbelt,
    Landlock,
}

impl SandboxMode {
    pub fn resolve(self) -> SandboxKind {
        match self {
            SandboxMode::Auto => get_platform_sandbox().unwrap_or(SandboxKind::None),
            SandboxMode::None => SandboxKind::None,
            SandboxMode::Seatbelt => SandboxKind::MacosSeatbelt,
            SandboxMode::Landlock => SandboxKind::LinuxLandlock,
        }
    }
}

impl FromStr for SandboxMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(SandboxMode::Auto),
            "none" => Ok(SandboxMode::None),
            "seatbelt" => Ok(SandboxMode::Seatbelt),
            "landlock" => Ok(SandboxMode::Landlock),
            other => Err(format!(
                "unknown sandbox mode `{other}` (expected auto, none, seatbelt or landlock)"
            )),
        }
    }
}

/// Base config deserialized from `$WARDEN_HOME/config.toml`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ConfigToml {
    pub approval_policy: Option<ApprovalPolicy>,
    pub sandbox_mode: Option<SandboxMode>,
    pub default_timeout_ms: Option<u64>,
    pub network_access: Option<bool>,

    /// Extra folders sandboxed commands may write to.
    #[serde(default)]
    pub writable_roots: Vec<PathBuf>,

    pub linux_sandbox_exe: Option<PathBuf>,

    #[serde(default)]
    pub risk: RiskToml,
}

/// `[risk]` table: additions to the built-in risk rules.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RiskToml {
    /// Regexes matched against the space-joined command.
    #[serde(default)]
    pub high: Vec<String>,
    #[serde(default)]
    pub medium: Vec<String>,
    /// Programs to treat as read-only.
    #[serde(default)]
    pub low_commands: Vec<String>,
}

/// Optional overrides supplied by the binary; these win over `config.toml`.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub cwd: Option<PathBuf>,
    pub approval_policy: Option<ApprovalPolicy>,
    pub sandbox_mode: Option<SandboxMode>,
    pub default_timeout_ms: Option<u64>,
    pub network_access: Option<bool>,
    pub linux_sandbox_exe: Option<PathBuf>,
}

/// Application configuration loaded from disk and merged with overrides.
#[derive(Debug, Clone)]
pub struct Config {
    /// Session root. Anchors relative paths and the sandbox's writable roots.
    pub cwd: PathBuf,
    pub warden_home: PathBuf,
    pub approval_policy: ApprovalPolicy,
    pub sandbox_mode: SandboxMode,
    pub sandbox_policy: SandboxPolicy,
    pub default_timeout_ms: u64,

    /// Path to the `warden-linux-sandbox` helper. Required for
    /// [`SandboxKind::LinuxLandlock`].
    pub linux_sandbox_exe: Option<PathBuf>,

    pub risk_rules: RiskRules,
}

impl Config {
    /// Loads `config.toml` from the Warden home, applies the `-c` overrides
    /// and then `overrides`.
    pub fn load_with_cli_overrides(
        cli_overrides: Vec<(String, TomlValue)>,
        overrides: ConfigOverrides,
    ) -> Result<Self> {
        let warden_home = find_warden_home()?;
        let cfg = load_config_as_toml_with_cli_overrides(&warden_home, cli_overrides)?;
        Self::load_from_base_config_with_overrides(cfg, overrides, warden_home)
    }

    pub fn load_from_base_config_with_overrides(
        cfg: ConfigToml,
        overrides: ConfigOverrides,
        warden_home: PathBuf,
    ) -> Result<Self> {
        let ConfigOverrides {
            cwd,
            approval_policy,
            sandbox_mode,
            default_timeout_ms,
            network_access,
            linux_sandbox_exe,
        } = overrides;

        let current_dir = std::env::current_dir()?;
        let cwd = match cwd {
            Some(cwd) => cwd.absolutize_from(&current_dir)?.into_owned(),
            None => current_dir,
        };

        let risk_rules =
            RiskRules::with_overrides(&cfg.risk.high, &cfg.risk.medium, &cfg.risk.low_commands)?;

        let sandbox_policy = SandboxPolicy {
            writable_roots: cfg.writable_roots,
            network_access: network_access.or(cfg.network_access).unwrap_or(false),
        };

        Ok(Self {
            cwd,
            warden_home,
            approval_policy: approval_policy.or(cfg.approval_policy).unwrap_or_default(),
            sandbox_mode: sandbox_mode.or(cfg.sandbox_mode).unwrap_or_default(),
            sandbox_policy,
            default_timeout_ms: default_timeout_ms
                .or(cfg.default_timeout_ms)
                .unwrap_or(DEFAULT_EXEC_COMMAND_TIMEOUT_MS),
            // An explicit path in config.toml wins over the one the binary
            // found for itself.
            linux_sandbox_exe: cfg.linux_sandbox_exe.or(linux_sandbox_exe),
            risk_rules,
        })
    }

    pub fn sandbox_kind(&self) -> SandboxKind {
        self.sandbox_mode.resolve()
    }
}

/// Reads `config.toml` under `warden_home` (a missing file means defaults)
/// and applies each `(dotted.path, value)` override on top.
pub fn load_config_as_toml_with_cli_overrides(
    warden_home: &Path,
    cli_overrides: Vec<(String, TomlValue)>,
) -> Result<ConfigToml> {
    let config_path = warden_home.join(CONFIG_TOML_FILE);
    let mut root = match std::fs::read_to_string(&config_path) {
        Ok(contents) => TomlValue::Table(toml::from_str::<toml::Table>(&contents).map_err(
            |source| WardenErr::ConfigParse {
                path: config_path.clone(),
                source,
            },
        )?),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("{} not found, using defaults", config_path.display());
            TomlValue::Table(toml::Table::new())
        }
        Err(source) => {
            return Err(WardenErr::ConfigRead {
                path: config_path,
                source,
            });
        }
    };

    for (path, value) in cli_overrides {
        apply_toml_override(&mut root, &path, value);
    }

    root.try_into()
        .map_err(|source| WardenErr::ConfigParse {
            path: config_path,
            source,
        })
}

/// Sets `path` (e.g. `risk.low_commands`) in `root` to `value`, creating
/// intermediate tables and replacing non-table values on the way.
pub fn apply_toml_override(root: &mut TomlValue, path: &str, value: TomlValue) {
    let mut current = root;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        if !current.is_table() {
            *current = TomlValue::Table(toml::Table::new());
        }
        let TomlValue::Table(table) = current else {
            return;
        };

        if segments.peek().is_none() {
            table.insert(segment.to_string(), value);
            return;
        }
        current = table
            .entry(segment.to_string())
            .or_insert_with(|| TomlValue::Table(toml::Table::new()));
    }
}

/// Returns the Warden configuration directory: `$WARDEN_HOME` when set
/// (which must exist), `~/.warden` otherwise (which need not exist).
pub fn find_warden_home() -> io::Result<PathBuf> {
    let warden_home_env = std::env::var("WARDEN_HOME")
        .ok()
        .filter(|val| !val.is_empty());
    find_warden_home_from_env(warden_home_env.as_deref())
}

fn find_warden_home_from_env(warden_home_env: Option<&str>) -> io::Result<PathBuf> {
    match warden_home_env {
        Some(val) => {
            let path = PathBuf::from(val);
            let metadata = std::fs::metadata(&path).map_err(|err| {
                io::Error::new(
                    err.kind(),
                    format!("WARDEN_HOME points to {val:?}, which is not accessible: {err}"),
                )
            })?;
            if !metadata.is_dir() {
                return Err(io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("WARDEN_HOME points to {val:?}, but that path is not a directory"),
                ));
            }
            path.canonicalize()
        }
        None => {
            let mut p = home_dir()
                .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "Could not find home directory"))?;
            p.push(".warden");
            Ok(p)
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use warden_protocol::protocol::RiskLevel;

    fn write_config(home: &TempDir, contents: &str) {
        std::fs::write(home.path().join(CONFIG_TOML_FILE), contents).unwrap();
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let home = TempDir::new().unwrap();
        let cfg = load_config_as_toml_with_cli_overrides(home.path(), Vec::new()).unwrap();
        assert_eq!(cfg, ConfigToml::default());

        let config = Config::load_from_base_config_with_overrides(
            cfg,
            ConfigOverrides::default(),
            home.path().to_path_buf(),
        )
        .unwrap();
        assert_eq!(config.approval_policy, ApprovalPolicy::AlwaysAsk);
        assert_eq!(config.sandbox_mode, SandboxMode::Auto);
        assert_eq!(config.default_timeout_ms, DEFAULT_EXEC_COMMAND_TIMEOUT_MS);
        assert_eq!(config.sandbox_policy, SandboxPolicy::default());
    }

    #[test]
    fn parses_every_key() {
        let home = TempDir::new().unwrap();
        write_config(
            &home,
            r#"
approval_policy = "full-auto"
sandbox_mode = "none"
default_timeout_ms = 5000
network_access = true
writable_roots = ["/srv/cache"]
linux_sandbox_exe = "/opt/warden-linux-sandbox"

[risk]
high = ['\bterraform\s+destroy\b']
low_commands = ["tree"]
"#,
        );

        let cfg = load_config_as_toml_with_cli_overrides(home.path(), Vec::new()).unwrap();
        let config = Config::load_from_base_config_with_overrides(
            cfg,
            ConfigOverrides {
                linux_sandbox_exe: Some(PathBuf::from("/usr/bin/warden")),
                ..Default::default()
            },
            home.path().to_path_buf(),
        )
        .unwrap();

        assert_eq!(config.approval_policy, ApprovalPolicy::FullAuto);
        assert_eq!(config.sandbox_kind(), SandboxKind::None);
        assert_eq!(config.default_timeout_ms, 5000);
        assert_eq!(
            config.sandbox_policy,
            SandboxPolicy {
                writable_roots: vec![PathBuf::from("/srv/cache")],
                network_access: true,
            }
        );
        assert_eq!(
            config.linux_sandbox_exe,
            Some(PathBuf::from("/opt/warden-linux-sandbox"))
        );

        let destroy = ["terraform", "destroy"].map(String::from);
        assert_eq!(config.risk_rules.assess(&destroy).level, RiskLevel::High);
        assert_eq!(
            config.risk_rules.assess(&["tree".to_string()]).level,
            RiskLevel::Low
        );
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let home = TempDir::new().unwrap();
        write_config(&home, "approval_policy = \"always-ask\"\n");

        let cfg = load_config_as_toml_with_cli_overrides(
            home.path(),
            vec![
                (
                    "approval_policy".to_string(),
                    TomlValue::String("auto-edit".to_string()),
                ),
                (
                    "risk.low_commands".to_string(),
                    TomlValue::Array(vec![TomlValue::String("tree".to_string())]),
                ),
            ],
        )
        .unwrap();

        assert_eq!(cfg.approval_policy, Some(ApprovalPolicy::AutoEdit));
        assert_eq!(cfg.risk.low_commands, vec!["tree".to_string()]);
    }

    #[test]
    fn harness_overrides_win_over_cli_overrides() {
        let home = TempDir::new().unwrap();
        let cfg = load_config_as_toml_with_cli_overrides(
            home.path(),
            vec![("sandbox_mode".to_string(), TomlValue::String("landlock".to_string()))],
        )
        .unwrap();

        let config = Config::load_from_base_config_with_overrides(
            cfg,
            ConfigOverrides {
                sandbox_mode: Some(SandboxMode::None),
                cwd: Some(home.path().to_path_buf()),
                ..Default::default()
            },
            home.path().to_path_buf(),
        )
        .unwrap();

        assert_eq!(config.sandbox_kind(), SandboxKind::None);
        assert_eq!(config.cwd, home.path());
    }

    #[test]
    fn invalid_toml_names_the_file() {
        let home = TempDir::new().unwrap();
        write_config(&home, "approval_policy = \n");

        let err = load_config_as_toml_with_cli_overrides(home.path(), Vec::new()).unwrap_err();

        assert_matches!(err, WardenErr::ConfigParse { ref path, .. } if path.ends_with(CONFIG_TOML_FILE));
    }

    #[test]
    fn unknown_enum_value_is_a_parse_error() {
        let home = TempDir::new().unwrap();
        write_config(&home, "approval_policy = \"yolo\"\n");

        let err = load_config_as_toml_with_cli_overrides(home.path(), Vec::new()).unwrap_err();

        assert_matches!(err, WardenErr::ConfigParse { .. });
    }

    #[test]
    fn invalid_risk_regex_is_reported() {
        let cfg = ConfigToml {
            risk: RiskToml {
                high: vec!["(unclosed".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };

        let err = Config::load_from_base_config_with_overrides(
            cfg,
            ConfigOverrides::default(),
            PathBuf::from("/nonexistent"),
        )
        .unwrap_err();

        assert_matches!(err, WardenErr::RiskRules(_));
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn override_replaces_scalar_with_table() {
        let mut root = TomlValue::Table(toml::Table::new());
        apply_toml_override(&mut root, "risk", TomlValue::Integer(1));
        apply_toml_override(&mut root, "risk.high", TomlValue::Array(Vec::new()));

        assert_eq!(
            root.get("risk").and_then(|risk| risk.get("high")),
            Some(&TomlValue::Array(Vec::new()))
        );
    }

    #[test]
    fn sandbox_mode_from_str() {
        assert_eq!("landlock".parse::<SandboxMode>(), Ok(SandboxMode::Landlock));
        assert!("bwrap".parse::<SandboxMode>().is_err());
    }

    #[test]
    fn warden_home_env_missing_path_is_fatal() {
        let temp_home = TempDir::new().unwrap();
        let missing = temp_home.path().join("missing-warden-home");

        let err = find_warden_home_from_env(missing.to_str()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("WARDEN_HOME"));
    }

    #[test]
    fn warden_home_env_file_path_is_fatal() {
        let temp_home = TempDir::new().unwrap();
        let file_path = temp_home.path().join("warden-home.txt");
        std::fs::write(&file_path, "not a directory").unwrap();

        let err = find_warden_home_from_env(file_path.to_str()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn warden_home_without_env_uses_default_home_dir() {
        let resolved = find_warden_home_from_env(None).unwrap();
        let mut expected = home_dir().unwrap();
        expected.push(".warden");
        assert_eq!(resolved, expected);
    }
}
