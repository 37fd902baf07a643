//! Directory of named `.schematic` files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SchematicError;
use crate::schematic::Schematic;

/// File extension of stored schematics.
pub const EXTENSION: &str = "schematic";

/// A directory holding `<name>.schematic` documents.
#[derive(Debug, Clone)]
pub struct SchematicStore {
    directory: PathBuf,
}

impl SchematicStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Stored schematic names, sorted. A missing directory holds none.
    pub fn list(&self) -> Result<Vec<String>, SchematicError> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.io_error(&self.directory, err)),
        };
        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| self.io_error(&self.directory, err))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_ok_and(|path| path.is_file())
    }

    /// Write `schematic` as pretty JSON, creating the directory if needed.
    pub fn save(&self, name: &str, schematic: &Schematic) -> Result<PathBuf, SchematicError> {
        let path = self.path_for(name)?;
        let json = schematic.to_json_pretty()?;
        fs::create_dir_all(&self.directory).map_err(|err| self.io_error(&self.directory, err))?;
        fs::write(&path, json).map_err(|err| self.io_error(&path, err))?;
        debug!(path = %path.display(), entities = schematic.entities.len(), "wrote schematic");
        Ok(path)
    }

    /// The raw document stored under `name`.
    pub fn read_text(&self, name: &str) -> Result<String, SchematicError> {
        let path = self.path_for(name)?;
        fs::read_to_string(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => SchematicError::NotFound {
                name: name.to_owned(),
            },
            _ => self.io_error(&path, err),
        })
    }

    /// Read and decode the schematic stored under `name`.
    pub fn read(&self, name: &str) -> Result<Schematic, SchematicError> {
        Schematic::from_json_str(&self.read_text(name)?)
    }

    /// The file backing `name`. Names must be a single non-empty path
    /// component.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, SchematicError> {
        let valid = !name.trim().is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(SchematicError::InvalidName {
                name: name.to_owned(),
            });
        }
        Ok(self.directory.join(format!("{name}.{EXTENSION}")))
    }

    fn io_error(&self, path: &Path, source: io::Error) -> SchematicError {
        SchematicError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
