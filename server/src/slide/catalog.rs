//! Case and image listings for a slide or macro root

use std::path::Path;

use super::types::{CaseList, ImageList, SlideError, validate_path_component};

/// Sorted names of the case directories under `root`
pub fn list_cases(root: &Path) -> Result<CaseList, SlideError> {
    let cases = list_entries(root, |file_type| file_type.is_dir())?;
    Ok(CaseList { cases })
}

/// Sorted names of the files directly inside `<root>/<case_id>`
pub fn list_images(root: &Path, case_id: &str) -> Result<ImageList, SlideError> {
    validate_path_component("caseID", case_id)?;
    let images = list_entries(&root.join(case_id), |file_type| file_type.is_file())?;
    Ok(ImageList { images })
}

fn list_entries(
    dir: &Path,
    keep: impl Fn(&std::fs::FileType) -> bool,
) -> Result<Vec<String>, SlideError> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SlideError::NotFound(format!("{:?}", dir)),
        _ => SlideError::IoError(e),
    })?;

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| keep(&t)).unwrap_or(false))
        .filter_map(|entry| entry.file_name().to_str().map(|s| s.to_string()))
        .collect();
    names.sort();
    Ok(names)
}
