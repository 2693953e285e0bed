use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::site::Site;

/// Load a site from a JSON file.
///
/// Residual caches are recomputed after loading.
pub fn load_site(path: impl AsRef<Path>) -> Result<Site> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read site file {}", path.display()))?;
    let site = Site::from_json(&json)
        .with_context(|| format!("Failed to parse site file {}", path.display()))?;
    info!(
        "Loaded site '{}' from {}: {} points, objective {:.6e}",
        site.name,
        path.display(),
        site.points().len(),
        site.objective()
    );
    Ok(site)
}

/// Write a site as pretty-printed JSON.
///
/// The file is written to a sibling temporary file first and renamed into
/// place, so a failed write never truncates an existing site file.
pub fn save_site(path: impl AsRef<Path>, site: &Site) -> Result<()> {
    let path = path.as_ref();
    let json = site.to_json().context("Failed to serialize site")?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, json).with_context(|| format!("Failed to write {}", Path::new(&tmp).display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;

    info!("Saved site '{}' to {}", site.name, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Position;
    use crate::site::{Rangefinder, RangefinderMeasurement};
    use std::path::PathBuf;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("d3survey-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_save_and_load() {
        let mut site = Site::new("yard");
        let a = site.add_point("a", Position::fixed(0.0, 0.0, 0.0));
        let b = site.add_point("b", Position::new(2.0, 0.0, 0.0));
        let rf = site.add_rangefinder(Rangefinder::new("laser"));
        site.add_rangefinder_measurement(rf, RangefinderMeasurement::new(a, b, 2.5))
            .unwrap();
        site.evaluate_objective();

        let path = scratch_path("roundtrip");
        save_site(&path, &site).unwrap();
        let loaded = load_site(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(loaded, site);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let path = scratch_path("missing");
        let err = load_site(&path).unwrap_err();
        assert!(format!("{err:#}").contains(&path.display().to_string()));
    }

    #[test]
    fn test_invalid_json() {
        let path = scratch_path("invalid");
        fs::write(&path, "{ not json").unwrap();
        let err = load_site(&path).unwrap_err();
        fs::remove_file(&path).unwrap();
        assert!(format!("{err:#}").contains("Failed to parse"));
    }
}
