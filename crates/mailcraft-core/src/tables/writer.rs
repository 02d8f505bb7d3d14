//! Writes a compilation to disk
//!
//! Every file, `manifest.json` included, is first written to a hidden
//! sibling. Only when all of them are on disk are they renamed into place,
//! manifest last, so a failed build leaves the previous output untouched.
//! A rename failing part way through leaves a mix of old and new files
//! under a stale manifest; running the build again repairs it.

use crate::artifact::Artifact;
use crate::compiler::{Collaborators, Compilation};
use mailcraft_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Manifest file name
pub const MANIFEST_FILE: &str = "manifest.json";

/// Record of one written file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub artifact: Artifact,
    pub file: String,
    pub bytes: usize,
    pub sha256: String,
}

/// Summary of a written compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub domain: String,
    pub users: usize,
    pub aliases: usize,
    pub pipeline_enabled: bool,
    pub files: Vec<ManifestEntry>,
    pub collaborators: Collaborators,
}

impl Manifest {
    /// Entry for an artifact
    pub fn entry(&self, artifact: Artifact) -> Option<&ManifestEntry> {
        self.files.iter().find(|e| e.artifact == artifact)
    }

    /// Read a manifest back from an output directory
    pub fn read(directory: &Path) -> Result<Self> {
        let path = directory.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Render(format!("Invalid manifest {}: {}", path.display(), e)))
    }
}

/// Writes artifacts into an output directory
pub struct ArtifactWriter {
    directory: PathBuf,
}

impl ArtifactWriter {
    /// Create a writer, creating the directory if needed
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| Error::io(&directory, e))?;

        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write every artifact of a compilation and its manifest.
    ///
    /// Pipeline configs left over from an earlier build are removed when
    /// this compilation has the pipeline disabled.
    pub fn write(&self, compilation: &Compilation) -> Result<Manifest> {
        let mut staged = Vec::new();
        let manifest = match self.stage_all(compilation, &mut staged) {
            Ok(manifest) => manifest,
            Err(e) => {
                discard(&staged);
                return Err(e);
            }
        };

        for (i, file) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(&file.staging, &file.target) {
                discard(&staged[i..]);
                return Err(Error::io(&file.target, e));
            }
        }

        for artifact in Artifact::ALL {
            if compilation.render(artifact).is_none() {
                self.remove_stale(artifact)?;
            }
        }

        info!(
            directory = %self.directory.display(),
            files = manifest.files.len(),
            "Wrote compiled artifacts"
        );

        Ok(manifest)
    }

    /// Stage every artifact, then the manifest describing them
    fn stage_all(&self, compilation: &Compilation, staged: &mut Vec<Staged>) -> Result<Manifest> {
        let mut files = Vec::new();
        for (artifact, contents) in compilation.rendered() {
            staged.push(self.stage(artifact.file_name(), contents.as_bytes(), artifact.mode())?);
            debug!(file = artifact.file_name(), bytes = contents.len(), "Staged artifact");

            files.push(ManifestEntry {
                artifact,
                file: artifact.file_name().to_string(),
                bytes: contents.len(),
                sha256: digest(contents.as_bytes()),
            });
        }

        let manifest = Manifest {
            domain: compilation.domain.clone(),
            users: compilation.users,
            aliases: compilation.aliases.len(),
            pipeline_enabled: compilation.pipeline.is_some(),
            files,
            collaborators: compilation.collaborators.clone(),
        };
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| Error::Render(format!("Failed to serialize manifest: {}", e)))?;
        staged.push(self.stage(MANIFEST_FILE, json.as_bytes(), 0o644)?);

        Ok(manifest)
    }

    /// Write `data` to the hidden sibling of `name`. A partly written
    /// sibling is removed before the error is returned.
    fn stage(&self, name: &str, data: &[u8], mode: u32) -> Result<Staged> {
        let staged = Staged {
            staging: self.directory.join(format!(".{}.tmp", name)),
            target: self.directory.join(name),
        };

        let mut file = fs::File::create(&staged.staging).map_err(|e| Error::io(&staged.staging, e))?;
        let written = file
            .write_all(data)
            .and_then(|()| file.sync_all())
            .map_err(|e| Error::io(&staged.staging, e))
            .and_then(|()| set_mode(&staged.staging, mode));
        drop(file);

        if let Err(e) = written {
            discard(std::slice::from_ref(&staged));
            return Err(e);
        }
        Ok(staged)
    }

    fn remove_stale(&self, artifact: Artifact) -> Result<()> {
        let path = self.directory.join(artifact.file_name());
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(file = artifact.file_name(), "Removed stale artifact");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&path, e)),
        }
    }
}

/// A file written next to its target, waiting to be renamed over it
struct Staged {
    staging: PathBuf,
    target: PathBuf,
}

/// Remove staged files that will not be renamed into place
fn discard(staged: &[Staged]) {
    for file in staged {
        if let Err(e) = fs::remove_file(&file.staging) {
            warn!(file = %file.staging.display(), error = %e, "Failed to remove staged file");
        }
    }
}

/// Hex-encoded SHA-256 of file contents
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| Error::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
