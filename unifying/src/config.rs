//! Button bindings handed to [`crate::device::Device::set_config`].
//!
//! With the `serde` feature, a [`Config`] deserializes from a map of control
//! names to entries:
//!
//! ```json
//! {
//!     "back": {
//!         "description": "Open a terminal",
//!         "do_command": ["alacritty"],
//!         "inhibit_cursor": true
//!     }
//! }
//! ```

use std::collections::BTreeMap;

/// A set of button bindings keyed by control name (see
/// [`crate::button::ControlId`]).
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(transparent))]
pub struct Config {
    entries: BTreeMap<String, ConfigEntry>,
}

impl Config {
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ConfigEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn get(&self, name: &str) -> Option<&ConfigEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, ConfigEntry)> for Config {
    fn from_iter<T: IntoIterator<Item = (String, ConfigEntry)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// What should happen when a bound button is pressed.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct ConfigEntry {
    pub description: Option<String>,

    pub enabled: bool,

    /// Freeze the cursor while the button is held.
    pub inhibit_cursor: bool,

    /// Also perform the button's native action.
    pub do_default: bool,

    /// Commands to run, given either as one string or as a list.
    #[cfg_attr(feature = "serde", serde(deserialize_with = "one_or_many"))]
    pub do_command: Vec<String>,
}

impl Default for ConfigEntry {
    fn default() -> Self {
        Self {
            description: None,
            enabled: true,
            inhibit_cursor: false,
            do_default: false,
            do_command: Vec::new(),
        }
    }
}

#[cfg(feature = "serde")]
fn one_or_many<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(command) => vec![command],
        OneOrMany::Many(commands) => commands,
    })
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn parses_entries() {
        let config: Config = serde_json::from_str(
            r#"{
                "back": { "description": "terminal", "do_command": "alacritty" },
                "forward": { "enabled": false, "do_command": ["notify-send", "hi"], "do_default": true },
                "thumb": {}
            }"#,
        )
        .unwrap();

        assert_eq!(config.len(), 3);

        let back = config.get("back").unwrap();
        assert_eq!(back.description.as_deref(), Some("terminal"));
        assert!(back.enabled);
        assert_eq!(back.do_command, ["alacritty"]);

        let forward = config.get("forward").unwrap();
        assert!(!forward.enabled && forward.do_default);
        assert_eq!(forward.do_command, ["notify-send", "hi"]);

        assert_eq!(config.get("thumb"), Some(&ConfigEntry::default()));
    }

    #[test]
    fn rejects_non_string_commands() {
        let res = serde_json::from_str::<Config>(r#"{ "back": { "do_command": 3 } }"#);

        assert!(res.is_err());
    }
}
