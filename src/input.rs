// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Job input: a single `package[@version]` argument or a CSV file.

use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::PackageJob;

/// Problems that stop the invocation before any job starts.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("app ID is empty")]
    EmptyAppId,

    #[error("field number must be 1 or greater")]
    InvalidField,

    #[error("app ID and version fields must be different")]
    SameFields,

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Parse `package` or `package@version`, splitting on the first `@`.
///
/// An empty version (`package@`) means latest.
pub fn parse_app_id(app_id: &str) -> Result<PackageJob, InputError> {
    let (package, version) = match app_id.split_once('@') {
        Some((package, version)) => (package, Some(version)),
        None => (app_id, None),
    };

    if package.is_empty() {
        return Err(InputError::EmptyAppId);
    }

    Ok(PackageJob {
        package_id: package.to_string(),
        requested_version: version.filter(|v| !v.is_empty()).map(str::to_string),
    })
}

/// Which CSV columns hold the package ID and, optionally, the version.
///
/// Both are 1-based; `version_field == 0` means there is no version column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvColumns {
    pub field: usize,
    pub version_field: usize,
}

impl Default for CsvColumns {
    fn default() -> Self {
        Self {
            field: 1,
            version_field: 0,
        }
    }
}

impl CsvColumns {
    pub fn new(field: usize, version_field: usize) -> Self {
        Self { field, version_field }
    }

    pub fn validate(&self) -> Result<(), InputError> {
        if self.field < 1 {
            return Err(InputError::InvalidField);
        }
        if self.version_field != 0 && self.field == self.version_field {
            return Err(InputError::SameFields);
        }
        Ok(())
    }
}

/// Read jobs from a CSV file. See [`parse_csv_reader`].
pub fn parse_csv_file(path: &Path, columns: CsvColumns) -> Result<Vec<PackageJob>, InputError> {
    columns.validate()?;
    let file = std::fs::File::open(path).map_err(|e| InputError::Read {
        path: path.to_path_buf(),
        source: csv::Error::from(e),
    })?;
    parse_csv_reader(file, columns).map_err(|err| match err {
        InputError::Read { source, .. } => InputError::Read {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Read jobs from headerless CSV.
///
/// Cells are trimmed. Rows too short for the ID column, or with an empty
/// ID, are skipped. A missing or empty version cell means latest.
pub fn parse_csv_reader<R: Read>(reader: R, columns: CsvColumns) -> Result<Vec<PackageJob>, InputError> {
    columns.validate()?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut jobs = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|source| InputError::Read {
            path: PathBuf::from("<input>"),
            source,
        })?;

        let Some(package_id) = record.get(columns.field - 1).map(str::trim) else {
            continue;
        };
        if package_id.is_empty() {
            continue;
        }

        let requested_version = match columns.version_field {
            0 => None,
            n => record
                .get(n - 1)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        };

        jobs.push(PackageJob {
            package_id: package_id.to_string(),
            requested_version,
        });
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_app_id() {
        assert_eq!(
            parse_app_id("com.instagram.android").unwrap(),
            PackageJob::latest("com.instagram.android")
        );
        assert_eq!(
            parse_app_id("com.instagram.android@1.2.3").unwrap(),
            PackageJob::pinned("com.instagram.android", "1.2.3")
        );
        // Only the first '@' splits
        assert_eq!(
            parse_app_id("com.example@1.0@beta").unwrap(),
            PackageJob::pinned("com.example", "1.0@beta")
        );
        assert_eq!(parse_app_id("com.example@").unwrap(), PackageJob::latest("com.example"));
        assert!(matches!(parse_app_id("@1.0"), Err(InputError::EmptyAppId)));
    }

    #[test]
    fn test_columns_validation() {
        assert!(CsvColumns::default().validate().is_ok());
        assert!(matches!(CsvColumns::new(0, 0).validate(), Err(InputError::InvalidField)));
        assert!(matches!(CsvColumns::new(2, 2).validate(), Err(InputError::SameFields)));
        assert!(CsvColumns::new(2, 1).validate().is_ok());
    }

    #[test]
    fn test_parse_csv_with_versions() {
        let data = "name,com.a,1.0\n\
                    other, com.b ,\n\
                    short\n\
                    blank,  ,3.0\n\
                    last,com.c, 2.5 \n";

        let jobs = parse_csv_reader(data.as_bytes(), CsvColumns::new(2, 3)).unwrap();
        assert_eq!(
            jobs,
            vec![
                PackageJob::pinned("com.a", "1.0"),
                PackageJob::latest("com.b"),
                PackageJob::pinned("com.c", "2.5"),
            ]
        );
    }

    #[test]
    fn test_parse_csv_first_column() {
        let data = "com.a\ncom.b,ignored\n\"com.c\"\n";
        let jobs = parse_csv_reader(data.as_bytes(), CsvColumns::default()).unwrap();
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[2].package_id, "com.c");
        assert!(jobs.iter().all(|j| j.requested_version.is_none()));
    }

    #[test]
    fn test_parse_csv_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "com.example.app,1.0").unwrap();
        writeln!(file, "com.example.other").unwrap();

        let jobs = parse_csv_file(file.path(), CsvColumns::new(1, 2)).unwrap();
        assert_eq!(jobs[0], PackageJob::pinned("com.example.app", "1.0"));
        assert_eq!(jobs[1], PackageJob::latest("com.example.other"));
    }

    #[test]
    fn test_parse_csv_missing_file() {
        let err = parse_csv_file(Path::new("/nonexistent/apps.csv"), CsvColumns::default()).unwrap_err();
        assert!(matches!(err, InputError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/apps.csv"));
    }
}
