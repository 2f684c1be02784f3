//! Atomic delivery of rendered bytes to a destination path.
//!
//! A render goes scratch buffer → temp file → rename, so readers of the
//! destination never observe a partial write. When the destination already
//! holds different content, the previous artifact is preserved at
//! `<destination>.bak` before the swap; when the new bytes are identical the
//! sink reports `ContentsIdentical` and touches nothing.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::template::ActionableTemplate;

const FILE_MODE: u32 = 0o766;

#[derive(Error, Debug)]
pub enum SinkError {
    /// Sentinel: the rendered bytes equal the destination's current bytes.
    /// Callers treat this as a successful no-op that suppresses the
    /// post-render command.
    #[error("contents are identical")]
    ContentsIdentical,

    #[error("template execution failed: {0}")]
    Render(#[source] minijinja::Error),

    #[error("could not create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error writing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SinkError {
    pub fn is_identical(&self) -> bool {
        matches!(self, SinkError::ContentsIdentical)
    }
}

/// Runtime state of one render target. The scratch and copy buffers are
/// reused across renders and cleared on every exit path.
pub struct Sink {
    destination: PathBuf,
    scratch: Vec<u8>,
    copy: Vec<u8>,
}

impl Sink {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Sink {
            destination: destination.into(),
            scratch: Vec::with_capacity(4096),
            copy: Vec::with_capacity(4096),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn render(
        &mut self,
        template: &ActionableTemplate,
        data: &minijinja::Value,
    ) -> Result<(), SinkError> {
        let result = self.render_inner(template, data);
        self.scratch.clear();
        self.copy.clear();
        result
    }

    fn render_inner(
        &mut self,
        template: &ActionableTemplate,
        data: &minijinja::Value,
    ) -> Result<(), SinkError> {
        if let Some(parent) = self.destination.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all_with_mode(parent).map_err(|e| SinkError::CreateDir {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        self.scratch.clear();
        template
            .execute(&mut self.scratch, data)
            .map_err(SinkError::Render)?;

        match fs::File::open(&self.destination) {
            Ok(mut current) => {
                self.copy.clear();
                current.read_to_end(&mut self.copy).map_err(|e| SinkError::Io {
                    path: self.destination.clone(),
                    source: e,
                })?;
                if self.copy == self.scratch {
                    return Err(SinkError::ContentsIdentical);
                }
                let backup = path_with_suffix(&self.destination, ".bak");
                fs::write(&backup, &self.copy).map_err(|e| SinkError::Io {
                    path: backup.clone(),
                    source: e,
                })?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SinkError::Io {
                    path: self.destination.clone(),
                    source: e,
                })
            }
        }

        let temp = path_with_suffix(&self.destination, ".temp");
        write_with_mode(&temp, &self.scratch).map_err(|e| SinkError::Io {
            path: temp.clone(),
            source: e,
        })?;

        if let Err(e) = fs::rename(&temp, &self.destination) {
            let _ = fs::remove_file(&temp);
            return Err(SinkError::Io {
                path: self.destination.clone(),
                source: e,
            });
        }
        Ok(())
    }
}

fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    os.into()
}

#[cfg(unix)]
fn create_dir_all_with_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(FILE_MODE).create(path)
}

#[cfg(not(unix))]
fn create_dir_all_with_mode(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path)
}

#[cfg(unix)]
fn write_with_mode(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_with_mode(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(path, bytes)
}
