//! Configuration types.
//!
//! Everything is read from `MAILSWEEP_*` environment variables and validated
//! up front; a session is never opened with an incomplete configuration.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default port for IMAP over TLS.
const DEFAULT_IMAP_PORT: u16 = 993;

/// Deadline for a single IDLE wait. Stays under the 30 minute server-side
/// IDLE timeout most servers enforce.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(29 * 60);

/// IMAP account settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl ImapConfig {
    /// `host:port` form, used for logging and connection errors.
    pub fn server(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which rules run, and the identity they compare at-mentions against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulesConfig {
    /// GitHub login of the mailbox owner.
    pub identity: String,
    pub ci_robot: bool,
    pub merge_robot: bool,
    pub build_status: bool,
    pub slash_commands: bool,
}

impl RulesConfig {
    /// Rules that compare message bodies against the identity.
    fn needs_identity(&self) -> bool {
        self.ci_robot || self.merge_robot || self.slash_commands
    }
}

/// Fully validated sweep configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub imap: ImapConfig,
    /// Mailbox being watched.
    pub mailbox: String,
    /// Mailbox that discarded messages are moved to.
    pub move_to: String,
    pub rules: RulesConfig,
    pub idle_timeout: Duration,
}

impl Config {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// All problems are collected and reported together.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut problems = Vec::new();

        let server = required(&get, "MAILSWEEP_IMAP_SERVER", "Set it to host or host:port.", &mut problems);
        let username = required(&get, "MAILSWEEP_IMAP_USERNAME", "Set the IMAP login name.", &mut problems);
        let password = required(&get, "MAILSWEEP_IMAP_PASSWORD", "Set the IMAP password.", &mut problems);
        let move_to = required(
            &get,
            "MAILSWEEP_MOVE_TO",
            "Set the mailbox discarded messages are moved to.",
            &mut problems,
        );
        let mailbox = get("MAILSWEEP_MAILBOX").unwrap_or_else(|| "INBOX".to_string());

        let (host, port) = match server.as_deref().map(split_server) {
            Some(Ok(parts)) => parts,
            Some(Err(e)) => {
                problems.push(e);
                (String::new(), DEFAULT_IMAP_PORT)
            }
            None => (String::new(), DEFAULT_IMAP_PORT),
        };

        let mut flag = |key: &str| match get(key).map(|v| parse_bool(key, &v)) {
            Some(Ok(b)) => b,
            Some(Err(e)) => {
                problems.push(e);
                false
            }
            None => false,
        };
        let mut rules = RulesConfig {
            identity: String::new(),
            ci_robot: flag("MAILSWEEP_CI_ROBOT"),
            merge_robot: flag("MAILSWEEP_MERGE_ROBOT"),
            build_status: flag("MAILSWEEP_BUILD_STATUS"),
            slash_commands: flag("MAILSWEEP_SLASH_COMMANDS"),
        };

        match get("MAILSWEEP_GITHUB_USERNAME") {
            Some(identity) => rules.identity = identity,
            None if rules.needs_identity() => problems.push(ConfigError::MissingRequired {
                key: "MAILSWEEP_GITHUB_USERNAME".into(),
                hint: "Required by the CI robot, merge robot, and slash command rules.".into(),
            }),
            None => {}
        }

        let idle_timeout = match get("MAILSWEEP_IDLE_TIMEOUT_SECS").map(|v| v.parse::<u64>()) {
            Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs),
            Some(_) => {
                problems.push(ConfigError::InvalidValue {
                    key: "MAILSWEEP_IDLE_TIMEOUT_SECS".into(),
                    message: "expected a positive number of seconds".into(),
                });
                DEFAULT_IDLE_TIMEOUT
            }
            None => DEFAULT_IDLE_TIMEOUT,
        };

        if !problems.is_empty() {
            return Err(if problems.len() == 1 {
                problems.remove(0)
            } else {
                ConfigError::Invalid(problems)
            });
        }

        Ok(Self {
            imap: ImapConfig {
                host,
                port,
                username: username.unwrap_or_default(),
                password: SecretString::from(password.unwrap_or_default()),
            },
            mailbox,
            move_to: move_to.unwrap_or_default(),
            rules,
            idle_timeout,
        })
    }
}

fn required(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    hint: &str,
    problems: &mut Vec<ConfigError>,
) -> Option<String> {
    let value = get(key);
    if value.is_none() {
        problems.push(ConfigError::MissingRequired {
            key: key.into(),
            hint: hint.into(),
        });
    }
    value
}

fn split_server(server: &str) -> Result<(String, u16), ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        key: "MAILSWEEP_IMAP_SERVER".into(),
        message: message.into(),
    };
    match server.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return Err(invalid("host is empty"));
            }
            let port = port.parse().map_err(|_| invalid("port is not a number"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((server.to_string(), DEFAULT_IMAP_PORT)),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("expected a boolean, got {value:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("MAILSWEEP_IMAP_SERVER", "imap.example.com"),
            ("MAILSWEEP_IMAP_USERNAME", "bob"),
            ("MAILSWEEP_IMAP_PASSWORD", "hunter2"),
            ("MAILSWEEP_MOVE_TO", "Archive"),
        ]
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_lookup(lookup(&base())).unwrap();
        assert_eq!(config.imap.host, "imap.example.com");
        assert_eq!(config.imap.port, 993);
        assert_eq!(config.imap.password.expose_secret(), "hunter2");
        assert_eq!(config.mailbox, "INBOX");
        assert_eq!(config.move_to, "Archive");
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        assert_eq!(config.rules, RulesConfig::default());
    }

    #[test]
    fn explicit_port_and_rule_flags() {
        let mut pairs = base();
        pairs.push(("MAILSWEEP_IMAP_SERVER", "mail.example.org:1993"));
        pairs.push(("MAILSWEEP_GITHUB_USERNAME", "bob"));
        pairs.push(("MAILSWEEP_CI_ROBOT", "yes"));
        pairs.push(("MAILSWEEP_BUILD_STATUS", "1"));
        pairs.push(("MAILSWEEP_SLASH_COMMANDS", "off"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.imap.server(), "mail.example.org:1993");
        assert!(config.rules.ci_robot);
        assert!(!config.rules.merge_robot);
        assert!(config.rules.build_status);
        assert!(!config.rules.slash_commands);
        assert_eq!(config.rules.identity, "bob");
    }

    #[test]
    fn missing_fields_are_reported_together() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        match err {
            ConfigError::Invalid(problems) => assert_eq!(problems.len(), 4),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn identity_required_by_mention_rules() {
        let mut pairs = base();
        pairs.push(("MAILSWEEP_MERGE_ROBOT", "true"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingRequired { ref key, .. } if key == "MAILSWEEP_GITHUB_USERNAME"
        ));
    }

    #[test]
    fn identity_not_required_by_build_status_alone() {
        let mut pairs = base();
        pairs.push(("MAILSWEEP_BUILD_STATUS", "true"));
        assert!(Config::from_lookup(lookup(&pairs)).is_ok());
    }

    #[test]
    fn malformed_values_rejected() {
        let mut pairs = base();
        pairs.push(("MAILSWEEP_CI_ROBOT", "maybe"));
        pairs.push(("MAILSWEEP_IDLE_TIMEOUT_SECS", "0"));
        pairs.push(("MAILSWEEP_IMAP_SERVER", "imap.example.com:imaps"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("MAILSWEEP_CI_ROBOT"));
        assert!(text.contains("MAILSWEEP_IDLE_TIMEOUT_SECS"));
        assert!(text.contains("MAILSWEEP_IMAP_SERVER"));
    }
}
