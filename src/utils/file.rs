use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use crate::config::defs::{BAM_EXT, FASTQ_EXTS};


/// Rewrites a user-supplied path so that paths inside the working directory
/// are expressed relative to it. Paths already written relative with `./` or
/// `../`, and absolute paths outside the working directory, are returned as
/// given (with backslashes turned into forward slashes).
///
/// # Arguments
///
/// * `path` - Path as typed by the operator.
/// * `cwd` - Working directory of the run.
///
/// # Returns
/// Sanitized path string.
pub fn sanitize_path(path: &str, cwd: &Path) -> String {
    if path.is_empty() {
        return path.to_string();
    }

    let path = path.replace('\\', "/");
    if path.starts_with("./") || path.starts_with("../") {
        return path;
    }

    let cwd_str = cwd.to_string_lossy().replace('\\', "/");
    if path.starts_with('/') && !path.contains(cwd_str.as_str()) {
        return path;
    }

    let target = normalize(&cwd.join(&path));
    match pathdiff::diff_paths(&target, normalize(cwd)) {
        Some(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Some(rel) => rel.to_string_lossy().into_owned(),
        None => path,
    }
}


/// Folds `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}


/// True when the filename carries a FASTQ extension.
pub fn is_fastq_path(path: &str) -> bool {
    Path::new(path)
        .extension()
        .map(|ext| FASTQ_EXTS.iter().any(|f| ext.eq_ignore_ascii_case(f)))
        .unwrap_or(false)
}


/// The filename with a trailing `.bam` removed, used as the base for the
/// names of every file derived from it.
pub fn output_stem(path: &str) -> &str {
    let bam_suffix = format!(".{}", BAM_EXT);
    path.strip_suffix(bam_suffix.as_str()).unwrap_or(path)
}


/// Appends `_<tag>` to the stem of `path`, optionally followed by an extension.
///
/// # Arguments
///
/// * `path` - Current output file.
/// * `tag` - Suffix tag, e.g. `map0`.
/// * `ext` - Extension for the derived name, without the dot.
///
/// # Returns
/// Derived filename.
pub fn derived_output(path: &str, tag: &str, ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("{}_{}.{}", output_stem(path), tag, ext),
        None => format!("{}_{}", output_stem(path), tag),
    }
}


/// Locates `tool` the way a shell started in `cwd` with `path_var` as its
/// PATH would. Relative and empty PATH entries are taken relative to `cwd`.
pub fn find_tool(tool: &str, path_var: Option<&str>, cwd: &Path) -> Option<PathBuf> {
    let search = path_var.and_then(|p| {
        let dirs = std::env::split_paths(p).map(|dir| {
            if dir.as_os_str().is_empty() {
                cwd.to_path_buf()
            } else {
                cwd.join(dir)
            }
        });
        std::env::join_paths(dirs).ok()
    });
    which::which_in(tool, search, cwd).ok()
}


/// Creates the parent directory of `path` if it has one and it is missing.
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            fs::create_dir_all(parent)
        }
        _ => Ok(()),
    }
}
