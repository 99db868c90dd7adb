//! Resolution of include targets to unit paths

use std::path::{Component, Path, PathBuf};

/// Resolve a target string against the directory of the including unit
pub fn resolve_include(target: &str, including_file: Option<&Path>) -> PathBuf {
    let target = Path::new(target);
    if target.is_absolute() {
        return normalize_path(target);
    }
    let base = including_file
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."));
    normalize_path(&base.join(target))
}

/// Normalize a path lexically, folding `.` and `..`
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            Component::CurDir => {}
            c => components.push(c),
        }
    }
    if components.is_empty() {
        return PathBuf::from(".");
    }
    components.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/app/src/../lib/./a.php")),
            PathBuf::from("/app/lib/a.php")
        );
        assert_eq!(normalize_path(Path::new("/../a.php")), PathBuf::from("/a.php"));
        assert_eq!(normalize_path(Path::new("../a.php")), PathBuf::from("../a.php"));
        assert_eq!(normalize_path(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn test_relative_targets_use_including_directory() {
        let from = Path::new("/app/pages/index.php");
        assert_eq!(
            resolve_include("../inc/header.php", Some(from)),
            PathBuf::from("/app/inc/header.php")
        );
        assert_eq!(
            resolve_include("/etc/app/config.php", Some(from)),
            PathBuf::from("/etc/app/config.php")
        );
        assert_eq!(resolve_include("a.php", None), PathBuf::from("a.php"));
    }
}
