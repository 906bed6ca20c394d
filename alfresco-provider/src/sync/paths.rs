use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("cache path component is empty")]
    Empty,
    #[error("cache path component is unsafe: {0}")]
    UnsupportedComponent(String),
}

/// Maps a node's content under `<cache_root>/<account>/<node>/<filename>`.
///
/// Keeping the node id in the path lets two nodes share a filename.
pub fn cache_path_for(
    cache_root: &Path,
    account_id: &str,
    node_id: &str,
    filename: &str,
) -> Result<PathBuf, PathError> {
    let mut out = cache_root.to_path_buf();
    for part in [account_id, node_id, filename] {
        out.push(single_component(part)?);
    }
    Ok(out)
}

fn single_component(part: &str) -> Result<&str, PathError> {
    if part.is_empty() {
        return Err(PathError::Empty);
    }
    let mut components = Path::new(part).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == part => Ok(part),
        _ => Err(PathError::UnsupportedComponent(part.to_string())),
    }
}
