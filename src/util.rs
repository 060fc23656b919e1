use std::path::{Path, PathBuf};

use crate::err::{Result, SystrayError};

pub fn current_exe_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()
        .map_err(|_| SystrayError::Path("Get current exe path failed."))?;

    if let Some(dir) = exe.parent() {
        Ok(dir.to_path_buf())
    } else {
        Err(SystrayError::Path("Get current exe dir failed."))
    }
}

/// Resolves a resource path; relative paths are taken from the executable's
/// directory.
pub fn resolve_resource(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(current_exe_dir()?.join(path))
    }
}

pub fn read_resource(path: &Path) -> Result<Vec<u8>> {
    let path = resolve_resource(path)?;
    std::fs::read(&path).map_err(|source| SystrayError::Io { path, source })
}

#[cfg(feature = "native")]
fn decode_rgba(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| SystrayError::Icon(format!("Failed to decode icon: {e:?}")))?
        .into_rgba8();

    let (icon_width, icon_height) = image.dimensions();
    Ok((image.into_raw(), icon_width, icon_height))
}

/// Decodes image bytes into a tray icon.
#[cfg(feature = "native")]
pub fn icon_from_bytes(bytes: &[u8]) -> Result<tray_icon::Icon> {
    let (icon_rgba, icon_width, icon_height) = decode_rgba(bytes)?;
    tray_icon::Icon::from_rgba(icon_rgba, icon_width, icon_height)
        .map_err(|e| SystrayError::Icon(e.to_string()))
}

/// Decodes image bytes into an icon for a menu entry.
#[cfg(feature = "native")]
pub fn menu_icon_from_bytes(bytes: &[u8]) -> Result<tray_icon::menu::Icon> {
    let (icon_rgba, icon_width, icon_height) = decode_rgba(bytes)?;
    tray_icon::menu::Icon::from_rgba(icon_rgba, icon_width, icon_height)
        .map_err(|e| SystrayError::Icon(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_are_kept() {
        let abs = std::env::temp_dir().join("tray.png");
        assert_eq!(resolve_resource(&abs).unwrap(), abs);
    }

    #[test]
    fn relative_paths_resolve_next_to_the_executable() {
        let resolved = resolve_resource(Path::new("config/tray.toml")).unwrap();
        assert_eq!(resolved, current_exe_dir().unwrap().join("config/tray.toml"));
    }

    #[test]
    fn missing_resource_reports_its_path() {
        let missing = std::env::temp_dir().join("systray-no-such-icon.png");
        match read_resource(&missing) {
            Err(SystrayError::Io { path, .. }) => assert_eq!(path, missing),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(feature = "native")]
    #[test]
    fn decodes_png_into_menu_and_tray_icons() {
        let mut png = Vec::new();
        image::RgbaImage::new(2, 2)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        assert!(icon_from_bytes(&png).is_ok());
        assert!(menu_icon_from_bytes(&png).is_ok());
        assert!(matches!(
            menu_icon_from_bytes(b"not an image"),
            Err(SystrayError::Icon(_))
        ));
    }
}
