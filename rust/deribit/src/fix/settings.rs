//! INI-shaped session settings with `[DEFAULT]` and `[SESSION]` blocks.

use std::collections::HashMap;

use crate::{Error, Result};

/// Setting keys the session requires, named after their INI keys.
#[allow(missing_docs)]
pub mod setting {
    pub const BEGIN_STRING: &str = "BeginString";
    pub const SOCKET_CONNECT_HOST: &str = "SocketConnectHost";
    pub const SOCKET_CONNECT_PORT: &str = "SocketConnectPort";
    pub const SENDER_COMP_ID: &str = "SenderCompID";
    pub const TARGET_COMP_ID: &str = "TargetCompID";
    pub const HEART_BT_INT: &str = "HeartBtInt";
    pub const RESET_ON_LOGON: &str = "ResetOnLogon";
}

/// Parsed session configuration; session values override defaults.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    default: HashMap<String, String>,
    session: HashMap<String, String>,
}

impl Settings {
    /// Parses the INI text.
    ///
    /// # Errors
    /// This function returns an error on a line that is neither a section
    /// header, a comment, nor a `key=value` pair.
    pub fn parse(text: &str) -> Result<Self> {
        enum Section {
            Default,
            Session,
        }

        let mut settings = Self::default();
        let mut section = None;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = match name {
                    "DEFAULT" => Some(Section::Default),
                    "SESSION" => Some(Section::Session),
                    other => {
                        return Err(Error::bad_argument(
                            "settings",
                            format!("unknown section [{other}]"),
                        ))
                    }
                };
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::bad_argument("settings", format!("line without '=': {line}"))
            })?;
            let map = match section {
                Some(Section::Default) => &mut settings.default,
                Some(Section::Session) => &mut settings.session,
                None => {
                    return Err(Error::bad_argument(
                        "settings",
                        "key outside of a [DEFAULT] or [SESSION] section",
                    ))
                }
            };
            map.insert(key.trim().to_owned(), value.trim().to_owned());
        }
        Ok(settings)
    }

    /// Looks `key` up in the session block, falling back to defaults.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.session
            .get(key)
            .or_else(|| self.default.get(key))
            .map(String::as_str)
    }

    /// Like [`Self::get`] but failing when the key is absent.
    ///
    /// # Errors
    /// This function returns
    /// [`Error::ConditionallyRequiredSettingMissing`] naming the key.
    pub fn get_required(&self, key: &'static str) -> Result<&str> {
        self.get(key)
            .ok_or(Error::ConditionallyRequiredSettingMissing(key))
    }
}
