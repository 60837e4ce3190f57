//! Read-only passthrough of pre-exported DICOM studies
//!
//! The DICOM root holds two flat directories: `images/<name>.jpg` with a
//! rendered frame per study, and `json/<name>` with its exported metadata.
//! File names are stored lowercase.

use std::path::{Path, PathBuf};

use super::catalog;
use super::types::{CaseList, SlideError, validate_path_component};

const IMAGES_DIR: &str = "images";
const JSON_DIR: &str = "json";

/// Rendered JPEG frame for a study: `<root>/images/<name>.jpg`
pub fn image_path(root: &Path, name: &str) -> Result<PathBuf, SlideError> {
    validate_path_component("name", name)?;
    Ok(root
        .join(IMAGES_DIR)
        .join(format!("{}.jpg", name).to_lowercase()))
}

/// Exported metadata document for a study: `<root>/json/<name>`
pub fn details_path(root: &Path, name: &str) -> Result<PathBuf, SlideError> {
    validate_path_component("name", name)?;
    Ok(root.join(JSON_DIR).join(name.to_lowercase()))
}

/// Sorted names of the metadata documents, reported as cases
pub fn list_studies(root: &Path) -> Result<CaseList, SlideError> {
    let cases = catalog::list_images(root, JSON_DIR)?.images;
    Ok(CaseList { cases })
}

/// File contents, with a missing file reported as not found
pub fn load(path: &Path) -> Result<Vec<u8>, SlideError> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SlideError::NotFound(format!("{:?}", path)),
        _ => SlideError::IoError(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_lowercased_below_the_root() {
        let root = Path::new("/Data/Dicom");
        assert_eq!(
            image_path(root, "Study-01").unwrap(),
            PathBuf::from("/Data/Dicom/images/study-01.jpg")
        );
        assert_eq!(
            details_path(root, "Study-01.JSON").unwrap(),
            PathBuf::from("/Data/Dicom/json/study-01.json")
        );
        assert!(matches!(
            image_path(root, "../secret"),
            Err(SlideError::InvalidParameter(_))
        ));
        assert!(details_path(root, "").is_err());
    }

    #[test]
    fn test_list_and_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("json")).unwrap();
        std::fs::write(dir.path().join("json").join("b.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("json").join("a.json"), b"{\"k\":1}").unwrap();

        assert_eq!(list_studies(dir.path()).unwrap().cases, vec!["a.json", "b.json"]);

        let path = details_path(dir.path(), "A.json").unwrap();
        assert_eq!(load(&path).unwrap(), b"{\"k\":1}");

        let missing = image_path(dir.path(), "a").unwrap();
        assert!(matches!(load(&missing), Err(SlideError::NotFound(_))));
    }

    #[test]
    fn test_missing_json_dir_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            list_studies(dir.path()),
            Err(SlideError::NotFound(_))
        ));
    }
}
