use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    err::{Result, SystrayError},
    menu_item::{MenuContainer, MenuItem},
    tray::Systray,
    util::read_resource,
};

pub const CONFIG_PATH: &str = "config/tray.toml";

pub const ENV_PREFIX: &str = "SYSTRAY";

/// Declarative description of a tray and its menu.
///
/// ```toml
/// title = "runner"
/// tooltip = "CPU usage"
/// icon = "icons/tray.png"
///
/// [[menu]]
/// kind = "item"
/// key = "usage"
/// title = "CPU: --"
/// disabled = true
///
/// [[menu]]
/// kind = "separator"
///
/// [[menu]]
/// kind = "item"
/// title = "More"
/// children = [{ kind = "checkbox", key = "pause", title = "Pause", checked = false }]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrayConfig {
    pub title: Option<String>,
    pub tooltip: Option<String>,
    /// Icon file; relative paths resolve against the executable's directory.
    pub icon: Option<PathBuf>,
    pub menu: Vec<MenuEntryConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MenuEntryConfig {
    Item {
        #[serde(default)]
        key: Option<String>,
        title: String,
        #[serde(default)]
        tooltip: String,
        #[serde(default)]
        disabled: bool,
        #[serde(default)]
        children: Vec<MenuEntryConfig>,
    },
    Checkbox {
        #[serde(default)]
        key: Option<String>,
        title: String,
        #[serde(default)]
        tooltip: String,
        #[serde(default)]
        disabled: bool,
        #[serde(default)]
        checked: bool,
    },
    Separator,
}

/// Items built from a [`TrayConfig`], by key.
#[derive(Debug, Default)]
pub struct MenuLayout {
    items: HashMap<String, MenuItem>,
}

impl MenuLayout {
    pub fn get(&self, key: &str) -> Option<&MenuItem> {
        self.items.get(key)
    }

    pub fn require(&self, key: &str) -> Result<MenuItem> {
        self.get(key)
            .cloned()
            .ok_or_else(|| SystrayError::MissingItem(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl TrayConfig {
    /// Loads a TOML file, with `SYSTRAY_*` environment variables overriding
    /// top-level keys.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    /// Like [`TrayConfig::load`], reading overrides from `{env_prefix}_*`.
    pub fn load_with_env_prefix(path: &Path, env_prefix: &str) -> Result<Self> {
        let Some(path) = path.to_str() else {
            return Err(SystrayError::Path("Can't load tray config."));
        };

        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(env_prefix))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Loads [`CONFIG_PATH`] from next to the executable, if it exists.
    pub fn load_default() -> Result<Option<Self>> {
        let path = crate::util::resolve_resource(Path::new(CONFIG_PATH))?;
        if !path.exists() {
            debug!(?path, "no tray config found");
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Rejects layouts the tray cannot express.
    pub fn validate(&self) -> Result<()> {
        fn check_children(parent: &str, entries: &[MenuEntryConfig]) -> Result<()> {
            for entry in entries {
                match entry {
                    MenuEntryConfig::Separator => {
                        return Err(SystrayError::NestedSeparator(parent.to_string()))
                    }
                    MenuEntryConfig::Item {
                        title, children, ..
                    } => check_children(title, children)?,
                    MenuEntryConfig::Checkbox { .. } => {}
                }
            }
            Ok(())
        }

        for entry in &self.menu {
            if let MenuEntryConfig::Item {
                title, children, ..
            } = entry
            {
                check_children(title, children)?;
            }
        }
        Ok(())
    }

    pub(crate) fn apply(&self, tray: &Systray) -> Result<MenuLayout> {
        self.validate()?;

        let icon = self.icon.as_deref().map(read_resource).transpose()?;
        if let Some(title) = &self.title {
            tray.set_title(title);
        }
        if let Some(tooltip) = &self.tooltip {
            tray.set_tooltip(tooltip);
        }
        if let Some(icon) = icon {
            tray.set_icon(&icon);
        }

        let mut layout = MenuLayout::default();
        for entry in &self.menu {
            if let MenuEntryConfig::Separator = entry {
                tray.add_separator();
            } else {
                build_entry(tray, entry, &mut layout);
            }
        }
        debug!(items = layout.len(), "menu built from config");
        Ok(layout)
    }
}

fn build_entry(parent: &dyn MenuContainer, entry: &MenuEntryConfig, layout: &mut MenuLayout) {
    let (key, item) = match entry {
        MenuEntryConfig::Item {
            key,
            title,
            tooltip,
            disabled,
            children,
        } => {
            let item = parent.add_item(title, tooltip);
            if *disabled {
                item.disable();
            }
            for child in children {
                build_entry(&item, child, layout);
            }
            (key, item)
        }
        MenuEntryConfig::Checkbox {
            key,
            title,
            tooltip,
            disabled,
            checked,
        } => {
            let item = parent.add_checkbox(title, tooltip, *checked);
            if *disabled {
                item.disable();
            }
            (key, item)
        }
        // rejected by validate
        MenuEntryConfig::Separator => return,
    };

    if let Some(key) = key {
        layout.items.insert(key.clone(), item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::HeadlessPlatform;
    use pretty_assertions::assert_eq;

    const LAYOUT: &str = r#"
title = "runner"
tooltip = "CPU usage"

[[menu]]
kind = "item"
key = "usage"
title = "CPU: --"
disabled = true

[[menu]]
kind = "separator"

[[menu]]
kind = "item"
key = "more"
title = "More"
children = [
    { kind = "checkbox", key = "pause", title = "Pause", checked = true },
    { kind = "item", title = "About" },
]

[[menu]]
kind = "item"
key = "quit"
title = "Quit"
tooltip = "Exit the application"
"#;

    #[test]
    fn parses_menu_tree() {
        let config = TrayConfig::from_toml_str(LAYOUT).unwrap();

        assert_eq!(config.title.as_deref(), Some("runner"));
        assert_eq!(config.icon, None);
        assert_eq!(config.menu.len(), 4);
        assert_eq!(config.menu[1], MenuEntryConfig::Separator);
        match &config.menu[2] {
            MenuEntryConfig::Item { children, .. } => assert_eq!(
                children[0],
                MenuEntryConfig::Checkbox {
                    key: Some("pause".to_string()),
                    title: "Pause".to_string(),
                    tooltip: String::new(),
                    disabled: false,
                    checked: true,
                }
            ),
            other => panic!("expected item, got {other:?}"),
        }
    }

    #[test]
    fn builds_items_in_order() {
        let platform = HeadlessPlatform::new();
        let tray = Systray::new(platform.clone());
        let config = TrayConfig::from_toml_str(LAYOUT).unwrap();

        let layout = tray.apply_config(&config).unwrap();

        let usage = layout.get("usage").unwrap();
        let more = layout.get("more").unwrap();
        let pause = layout.get("pause").unwrap();
        let quit = layout.get("quit").unwrap();
        assert_eq!(layout.len(), 4);

        assert!(usage.disabled());
        assert!(matches!(
            layout.require("about"),
            Err(SystrayError::MissingItem(key)) if key == "about"
        ));
        assert_eq!(pause.parent_id(), Some(more.id()));
        assert!(pause.is_checkable() && pause.checked());
        assert_eq!(quit.tooltip(), "Exit the application");
        assert_eq!(platform.separators().len(), 1);
        assert!(usage.id() < platform.separators()[0]);
        assert_eq!(platform.title().as_deref(), Some("runner"));
        // the unkeyed "About" item is registered too
        assert_eq!(tray.registry().len(), 5);
    }

    #[test]
    fn nested_separator_is_rejected_before_building() {
        let platform = HeadlessPlatform::new();
        let tray = Systray::new(platform.clone());
        let config = TrayConfig::from_toml_str(
            r#"
[[menu]]
kind = "item"
title = "Top"
children = [{ kind = "separator" }]
"#,
        )
        .unwrap();

        assert!(matches!(
            tray.apply_config(&config),
            Err(SystrayError::NestedSeparator(parent)) if parent == "Top"
        ));
        assert!(tray.registry().is_empty());
    }

    #[test]
    fn missing_icon_fails_without_touching_the_tray() {
        let platform = HeadlessPlatform::new();
        let tray = Systray::new(platform.clone());
        let config = TrayConfig {
            title: Some("t".to_string()),
            icon: Some(std::env::temp_dir().join("systray-missing-icon.png")),
            ..TrayConfig::default()
        };

        assert!(matches!(
            tray.apply_config(&config),
            Err(SystrayError::Io { .. })
        ));
        assert_eq!(platform.title(), None);
    }

    fn write_layout(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("systray-{name}-{}.toml", std::process::id()));
        std::fs::write(&path, LAYOUT).unwrap();
        path
    }

    #[test]
    fn loads_from_file() {
        let path = write_layout("config");

        // a prefix nothing sets, so the caller's SYSTRAY_* variables can't leak in
        let config = TrayConfig::load_with_env_prefix(&path, "SYSTRAY_UNSET_PREFIX").unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config, TrayConfig::from_toml_str(LAYOUT).unwrap());
    }

    #[test]
    fn environment_overrides_file_values() {
        let path = write_layout("config-env");
        std::env::set_var("SYSTRAY_OVERRIDE_TEST_TITLE", "from env");

        let config = TrayConfig::load_with_env_prefix(&path, "SYSTRAY_OVERRIDE_TEST").unwrap();
        std::env::remove_var("SYSTRAY_OVERRIDE_TEST_TITLE");
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.title.as_deref(), Some("from env"));
        assert_eq!(config.tooltip.as_deref(), Some("CPU usage"));
        assert_eq!(config.menu.len(), 4);
    }
}
