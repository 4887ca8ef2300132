//! Migration files on disk.
//!
//! A migration file is plain SQL with a short comment header:
//!
//! ```text
//! -- schemata migration: 20261018120000_add_album
//! -- generated: 2026-10-18T12:00:00+00:00
//! -- checksum: 4f1c...
//!
//! CREATE TABLE "album" (...);
//! ```
//!
//! The checksum is the hex SHA-256 of everything after the blank line that
//! ends the header. Files are applied in file name order, which is creation
//! order because names start with a UTC timestamp.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use schemata_core::script::{checksum, MigrationScript};
use tracing::{debug, info};

use crate::error::{MigrateError, Result};

const NAME_HEADER: &str = "-- schemata migration: ";
const GENERATED_HEADER: &str = "-- generated: ";
const CHECKSUM_HEADER: &str = "-- checksum: ";

/// One migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// `<timestamp>_<slug>`, also the file stem and the history key.
    pub name: String,
    /// When the file was generated.
    pub generated_at: DateTime<Utc>,
    /// Checksum recorded in the header.
    pub checksum: String,
    /// SQL body.
    pub body: String,
}

impl MigrationFile {
    /// Creates a migration from a rendered script.
    #[must_use]
    pub fn new(description: &str, script: &MigrationScript, generated_at: DateTime<Utc>) -> Self {
        let name = format!(
            "{}_{}",
            generated_at.format("%Y%m%d%H%M%S"),
            slug(description)
        );
        let body = script.to_sql();
        Self {
            name,
            generated_at,
            checksum: checksum(&body),
            body,
        }
    }

    /// File name, `<name>.sql`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.sql", self.name)
    }

    /// Full file contents: header, blank line, body.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "{NAME_HEADER}{}\n{GENERATED_HEADER}{}\n{CHECKSUM_HEADER}{}\n\n{}",
            self.name,
            self.generated_at.to_rfc3339(),
            self.checksum,
            self.body
        )
    }

    /// Checksum of the current body.
    #[must_use]
    pub fn actual_checksum(&self) -> String {
        checksum(&self.body)
    }

    /// Checks that the body still matches the header checksum.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::ChecksumMismatch`] if the body was edited.
    pub fn verify(&self) -> Result<()> {
        let actual = self.actual_checksum();
        if actual == self.checksum {
            Ok(())
        } else {
            Err(MigrateError::ChecksumMismatch {
                name: self.name.clone(),
                expected: self.checksum.clone(),
                actual,
            })
        }
    }

    /// Parses file contents.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::ParseError`] if a header line is missing or
    /// malformed.
    pub fn parse(path: &Path, contents: &str) -> Result<Self> {
        let parse_error = |message: &str| MigrateError::ParseError {
            path: path.to_path_buf(),
            message: message.to_string(),
        };

        let (header, body) = contents
            .split_once("\n\n")
            .ok_or_else(|| parse_error("missing blank line after header"))?;

        let mut name = None;
        let mut generated_at = None;
        let mut checksum = None;
        for line in header.lines() {
            if let Some(value) = line.strip_prefix(NAME_HEADER) {
                name = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix(GENERATED_HEADER) {
                let parsed = DateTime::parse_from_rfc3339(value.trim())
                    .map_err(|err| parse_error(&format!("invalid timestamp: {err}")))?;
                generated_at = Some(parsed.with_timezone(&Utc));
            } else if let Some(value) = line.strip_prefix(CHECKSUM_HEADER) {
                checksum = Some(value.trim().to_string());
            }
        }

        Ok(Self {
            name: name.ok_or_else(|| parse_error("missing migration name"))?,
            generated_at: generated_at.ok_or_else(|| parse_error("missing generation time"))?,
            checksum: checksum.ok_or_else(|| parse_error("missing checksum"))?,
            body: body.to_string(),
        })
    }

    /// Reads and parses a file.
    ///
    /// # Errors
    ///
    /// Fails on IO errors or a malformed header.
    pub fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(path, &contents)
    }

    /// Writes the file into `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MigrationExists`] rather than overwriting.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        if path.exists() {
            return Err(MigrateError::MigrationExists(path));
        }
        fs::write(&path, self.render())?;
        info!(path = %path.display(), checksum = %self.checksum, "wrote migration");
        Ok(path)
    }
}

/// Reads every `.sql` migration in `dir`, ordered by file name.
///
/// # Errors
///
/// Returns [`MigrateError::MigrationsDirNotFound`] if `dir` does not exist,
/// or the first read/parse error.
pub fn discover(dir: &Path) -> Result<Vec<MigrationFile>> {
    if !dir.is_dir() {
        return Err(MigrateError::MigrationsDirNotFound(dir.to_path_buf()));
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    paths.retain(|p| p.extension().is_some_and(|ext| ext == "sql"));
    paths.sort();

    let files = paths
        .iter()
        .map(|p| MigrationFile::read(p))
        .collect::<Result<Vec<_>>>()?;
    debug!(dir = %dir.display(), migrations = files.len(), "discovered migrations");
    Ok(files)
}

/// Lower-case ASCII slug: runs of other characters become one `_`.
fn slug(description: &str) -> String {
    let mut slug = String::with_capacity(description.len());
    for c in description.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        String::from("migration")
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn script() -> MigrationScript {
        MigrationScript::new(vec![
            "CREATE TABLE \"album\" (\n    \"id\" UUID NOT NULL\n)".into(),
            "DROP TABLE \"legacy\"".into(),
        ])
    }

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_name_starts_with_timestamp() {
        let file = MigrationFile::new("Add album!", &script(), generated_at());
        assert_eq!(file.name, "20261018120000_add_album");
        assert_eq!(file.file_name(), "20261018120000_add_album.sql");
        assert_eq!(slug("  "), "migration");
    }

    #[test]
    fn test_render_then_parse() {
        let file = MigrationFile::new("add album", &script(), generated_at());
        let rendered = file.render();
        assert!(rendered.starts_with(
            "-- schemata migration: 20261018120000_add_album\n-- generated: 2026-10-18T12:00:00+00:00\n-- checksum: "
        ));
        // The body itself contains blank lines.
        let parsed = MigrationFile::parse(Path::new("x.sql"), &rendered).unwrap();
        assert_eq!(parsed, file);
        parsed.verify().unwrap();
    }

    #[test]
    fn test_edited_body_fails_verification() {
        let mut file = MigrationFile::new("add album", &script(), generated_at());
        file.body.push_str("DROP TABLE \"user\";\n");
        let err = file.verify().unwrap_err();
        assert_eq!(err.kind(), "ChecksumMismatchError");
    }

    #[test]
    fn test_missing_header_is_parse_error() {
        let err = MigrationFile::parse(Path::new("x.sql"), "-- checksum: abc\n\nSELECT 1;\n")
            .unwrap_err();
        assert!(matches!(err, MigrateError::ParseError { .. }));
        assert!(err.to_string().contains("missing migration name"));
    }

    #[test]
    fn test_write_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let file = MigrationFile::new("add album", &script(), generated_at());
        let path = file.write(dir.path()).unwrap();
        assert_eq!(MigrationFile::read(&path).unwrap(), file);

        let err = file.write(dir.path()).unwrap_err();
        assert!(matches!(err, MigrateError::MigrationExists(_)));
    }

    #[test]
    fn test_discover_orders_by_name_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let later = MigrationFile::new(
            "second",
            &script(),
            Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap(),
        );
        let earlier = MigrationFile::new("first", &script(), generated_at());
        later.write(dir.path()).unwrap();
        earlier.write(dir.path()).unwrap();
        fs::write(dir.path().join("README.md"), "notes").unwrap();

        let names: Vec<String> = discover(dir.path())
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, ["20261018120000_first", "20261019080000_second"]);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, MigrateError::MigrationsDirNotFound(_)));
    }
}
