use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::ZipArchive;

use crate::app::error::AppError;
use crate::app::models::InstallPlan;

const BUNDLE_EXTENSIONS: [&str; 3] = ["xapk", "apkm", "apks"];

pub fn is_bundle(path: &Path) -> bool {
    matches_extension(path, &BUNDLE_EXTENSIONS)
}

pub fn is_apk(path: &Path) -> bool {
    matches_extension(path, &["apk"])
}

fn matches_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lower = ext.to_lowercase();
            extensions.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Expands a leading `~/` against $HOME; adb is handed absolute paths so the
/// shell's expansion is not available to us.
pub fn normalize_package_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Unpacks the bundle archive into `dest`, preserving nested directory
/// structure, then collects every `.apk` (case-insensitive, any depth) in
/// lexicographic full-path order. The order is contractual: install-multiple
/// sends files in argument order and some install backends are
/// order-sensitive for split packages.
///
/// Structural corruption fails with ERR_BUNDLE_CORRUPT. Zero apks fails with
/// ERR_BUNDLE_EMPTY; in that case whatever was extracted is deliberately left
/// under `dest` for inspection, and the caller's workspace bookkeeping
/// reclaims it later.
pub fn extract_bundle(
    archive_path: &Path,
    dest: &Path,
    trace_id: &str,
) -> Result<InstallPlan, AppError> {
    let file = File::open(archive_path).map_err(|err| {
        AppError::bundle_corrupt(format!("Failed to open bundle: {err}"), trace_id)
    })?;
    let mut archive = ZipArchive::new(file)
        .map_err(|err| AppError::bundle_corrupt(format!("Invalid bundle: {err}"), trace_id))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|err| {
            AppError::bundle_corrupt(format!("Failed to read bundle entry: {err}"), trace_id)
        })?;
        // enclosed_name rejects entries that would escape the workspace root.
        let Some(relative) = entry.enclosed_name() else {
            return Err(AppError::bundle_corrupt(
                format!("Bundle entry escapes extraction root: {}", entry.name()),
                trace_id,
            ));
        };
        let target = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|err| {
                AppError::system(format!("Failed to create bundle dir: {err}"), trace_id)
            })?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::system(format!("Failed to create bundle dir: {err}"), trace_id)
            })?;
        }
        let mut output = File::create(&target).map_err(|err| {
            AppError::system(format!("Failed to create extracted file: {err}"), trace_id)
        })?;
        io::copy(&mut entry, &mut output).map_err(|err| {
            AppError::bundle_corrupt(format!("Failed to extract bundle entry: {err}"), trace_id)
        })?;
    }

    let mut apk_paths = Vec::new();
    collect_apks(dest, &mut apk_paths)
        .map_err(|err| AppError::system(format!("Failed to scan workspace: {err}"), trace_id))?;
    apk_paths.sort_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()));

    if apk_paths.is_empty() {
        return Err(AppError::bundle_empty(
            "No APK files found in bundle",
            trace_id,
        ));
    }

    debug!(
        trace_id = %trace_id,
        count = apk_paths.len(),
        "extracted bundle install plan"
    );
    Ok(InstallPlan { apk_paths })
}

fn collect_apks(dir: &Path, found: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_apks(&path, found)?;
        } else if is_apk(&path) {
            found.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn write_zip(path: &Path, entries: &[&str]) {
        let file = File::create(path).expect("zip file");
        let mut zip = zip::ZipWriter::new(file);
        for name in entries {
            zip.start_file(*name, FileOptions::<()>::default())
                .expect("start entry");
            zip.write_all(b"payload").expect("entry body");
        }
        zip.finish().expect("finish zip");
    }

    #[test]
    fn recognizes_bundle_and_apk_extensions_case_insensitively() {
        assert!(is_bundle(Path::new("/x/app.XAPK")));
        assert!(is_bundle(Path::new("app.apkm")));
        assert!(is_bundle(Path::new("app.apks")));
        assert!(!is_bundle(Path::new("app.apk")));
        assert!(is_apk(Path::new("Base.APK")));
        assert!(!is_apk(Path::new("archive.zip")));
    }

    #[test]
    fn returns_apks_at_all_depths_sorted_by_full_path() {
        let tmp = TempDir::new().expect("tmp");
        let bundle = tmp.path().join("app.xapk");
        write_zip(&bundle, &["b/x.apk", "a/y.apk", "a.apk", "manifest.json"]);

        let dest = tmp.path().join("ws");
        fs::create_dir_all(&dest).expect("dest");
        let plan = extract_bundle(&bundle, &dest, "t").expect("extract");

        let relative: Vec<String> = plan
            .apk_paths
            .iter()
            .map(|path| {
                path.strip_prefix(&dest)
                    .expect("under dest")
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        assert_eq!(relative, vec!["a.apk", "a/y.apk", "b/x.apk"]);
        assert!(dest.join("manifest.json").is_file());
    }

    #[test]
    fn zero_apks_fails_with_empty_and_leaves_extraction_in_place() {
        let tmp = TempDir::new().expect("tmp");
        let bundle = tmp.path().join("app.apkm");
        write_zip(&bundle, &["manifest.json", "icon.png"]);

        let dest = tmp.path().join("ws");
        fs::create_dir_all(&dest).expect("dest");
        let err = extract_bundle(&bundle, &dest, "t").unwrap_err();
        assert_eq!(err.code, crate::app::error::ERR_BUNDLE_EMPTY);
        // Extracted content stays around for inspection.
        assert!(dest.join("manifest.json").is_file());
    }

    #[test]
    fn structural_corruption_fails_with_corrupt() {
        let tmp = TempDir::new().expect("tmp");
        let bundle = tmp.path().join("broken.xapk");
        fs::write(&bundle, b"this is not a zip archive").expect("write");

        let dest = tmp.path().join("ws");
        fs::create_dir_all(&dest).expect("dest");
        let err = extract_bundle(&bundle, &dest, "t").unwrap_err();
        assert_eq!(err.code, crate::app::error::ERR_BUNDLE_CORRUPT);
    }

    #[test]
    fn missing_archive_file_is_corrupt_not_a_panic() {
        let tmp = TempDir::new().expect("tmp");
        let err = extract_bundle(
            &tmp.path().join("nope.xapk"),
            &tmp.path().join("ws"),
            "t",
        )
        .unwrap_err();
        assert_eq!(err.code, crate::app::error::ERR_BUNDLE_CORRUPT);
    }

    #[test]
    fn expands_home_prefix() {
        let expanded = normalize_package_path("~/apks/app.apk");
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expanded, PathBuf::from(home).join("apks/app.apk"));
        }
        assert_eq!(
            normalize_package_path("/abs/app.apk"),
            PathBuf::from("/abs/app.apk")
        );
    }
}
