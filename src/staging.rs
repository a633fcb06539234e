//! On-disk staging area for generated sources and compiled artifacts.
//!
//! Every handler owns one store rooted in a persisted temp directory; staged
//! files mirror the declaration's namespace as nested directories, so the
//! artifact for `demo.util.Greeter` lands under `<root>/demo/util/`.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{DynError, DynResult};

#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store over a fresh temp directory. The directory persists for
    /// the life of the process so loaded libraries keep a valid backing file.
    pub fn new() -> DynResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("dynclass-")
            .tempdir()
            .map_err(|e| DynError::io(std::env::temp_dir(), e))?;
        let root = dir.keep();
        debug!("artifact store rooted at {}", root.display());
        Ok(Self { root })
    }

    /// Create a store over a caller-supplied directory.
    pub fn with_root(root: impl Into<PathBuf>) -> DynResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| DynError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a namespace, created on demand. An empty namespace maps
    /// to the store root.
    pub fn namespace_dir(&self, namespace: &str) -> DynResult<PathBuf> {
        let mut dir = self.root.clone();
        for part in namespace.split('.').filter(|p| !p.is_empty()) {
            dir.push(part);
        }
        fs::create_dir_all(&dir).map_err(|e| DynError::io(&dir, e))?;
        Ok(dir)
    }

    /// Write `content` to `<namespace dirs>/<name><suffix>` and return the path.
    pub fn stage(
        &self,
        namespace: &str,
        name: &str,
        suffix: &str,
        content: &str,
    ) -> DynResult<PathBuf> {
        let path = self.namespace_dir(namespace)?.join(format!("{name}{suffix}"));
        fs::write(&path, content).map_err(|e| DynError::io(&path, e))?;
        debug!("staged {}", path.display());
        Ok(path)
    }

    /// Path a compiled artifact for `namespace`/`name` will occupy, using the
    /// platform dynamic-library naming convention.
    pub fn artifact_path(&self, namespace: &str, name: &str) -> DynResult<PathBuf> {
        Ok(self.namespace_dir(namespace)?.join(library_file_name(name)))
    }
}

/// Platform file name for a dynamic library called `name`.
pub fn library_file_name(name: &str) -> String {
    format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        name,
        std::env::consts::DLL_SUFFIX
    )
}

/// Unpack every `lib/` entry of a zip archive into `dest`, flattening the
/// prefix. Returns the extracted file paths.
pub fn extract_libraries(archive: &Path, dest: &Path) -> DynResult<Vec<PathBuf>> {
    let file = fs::File::open(archive).map_err(|e| DynError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| DynError::io(archive, io::Error::new(io::ErrorKind::InvalidData, e)))?;
    fs::create_dir_all(dest).map_err(|e| DynError::io(dest, e))?;

    let mut extracted = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| DynError::io(archive, io::Error::new(io::ErrorKind::InvalidData, e)))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let Some(rel) = name.strip_prefix("lib/") else {
            continue;
        };
        let Some(file_name) = Path::new(rel).file_name() else {
            continue;
        };
        let out_path = dest.join(file_name);
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut buf)
            .map_err(|e| DynError::io(&out_path, e))?;
        fs::write(&out_path, buf).map_err(|e| DynError::io(&out_path, e))?;
        debug!("extracted {}", out_path.display());
        extracted.push(out_path);
    }
    Ok(extracted)
}
