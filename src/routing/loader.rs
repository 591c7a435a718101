//! Route table loading
//!
//! Two source formats are understood:
//!
//! - **Lines**: one route per line, `key destination`, separated by a single
//!   space. Any other line, blank ones included, is a malformed record.
//! - **Mapping**: a YAML or JSON document holding a single mapping of route
//!   key to destination string.
//!
//! Bad records are skipped and reported; only an unreadable source fails the
//! whole load.

use crate::error::{ConfigLoadError, DestinationParseError, RecordParseError};
use crate::routing::table::RouteTable;
use std::io::Read;
use std::path::Path;
use url::Url;

/// Format of a route table source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTableFormat {
    Lines,
    Mapping,
}

impl RouteTableFormat {
    /// Pick the format from a file extension: `.yaml`, `.yml` and `.json`
    /// are mappings, everything else is line-oriented.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext)
                if ext.eq_ignore_ascii_case("yaml")
                    || ext.eq_ignore_ascii_case("yml")
                    || ext.eq_ignore_ascii_case("json") =>
            {
                RouteTableFormat::Mapping
            }
            _ => RouteTableFormat::Lines,
        }
    }
}

/// Result of a successful load.
#[derive(Debug)]
pub struct LoadedTable {
    pub table: RouteTable,
    /// Records that were skipped.
    pub warnings: Vec<RecordParseError>,
    /// Keys that appeared more than once; the last destination won.
    pub duplicates: Vec<String>,
}

/// Load a route table file, choosing the format from its extension.
pub fn load_file(path: impl AsRef<Path>) -> Result<LoadedTable, ConfigLoadError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let loaded = load(file, RouteTableFormat::from_path(path))?;

    tracing::info!(
        path = %path.display(),
        entries = loaded.table.len(),
        skipped = loaded.warnings.len(),
        "Loaded route table"
    );

    Ok(loaded)
}

/// Load a route table from any byte source.
pub fn load(mut source: impl Read, format: RouteTableFormat) -> Result<LoadedTable, ConfigLoadError> {
    let mut content = String::new();
    source.read_to_string(&mut content)?;

    match format {
        RouteTableFormat::Lines => Ok(parse_lines(&content)),
        RouteTableFormat::Mapping => parse_mapping(&content),
    }
}

/// Parse the line-oriented format.
pub fn parse_lines(content: &str) -> LoadedTable {
    let mut builder = TableBuilder::default();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;

        let fields: Vec<&str> = line.split(' ').collect();
        let [key, destination] = fields.as_slice() else {
            builder.skip(RecordParseError::Malformed {
                line: line_no,
                text: line.to_string(),
            });
            continue;
        };

        if !is_valid_key(key) {
            builder.skip(RecordParseError::InvalidKey {
                key: key.to_string(),
            });
            continue;
        }

        builder.add(key, destination);
    }

    builder.finish()
}

/// Parse the structured (YAML/JSON mapping) format.
pub fn parse_mapping(content: &str) -> Result<LoadedTable, ConfigLoadError> {
    let document: serde_yaml::Value = serde_yaml::from_str(content)?;

    let mapping = match document {
        serde_yaml::Value::Mapping(mapping) => mapping,
        // an empty document is an empty table
        serde_yaml::Value::Null => serde_yaml::Mapping::new(),
        _ => return Err(ConfigLoadError::NotAMapping),
    };

    let mut builder = TableBuilder::default();

    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            builder.skip(RecordParseError::NonStringKey {
                key: describe(&key),
            });
            continue;
        };

        if !is_valid_key(key) {
            builder.skip(RecordParseError::InvalidKey {
                key: key.to_string(),
            });
            continue;
        }

        let Some(destination) = value.as_str() else {
            builder.skip(RecordParseError::NonStringDestination {
                key: key.to_string(),
            });
            continue;
        };

        builder.add(key, destination);
    }

    Ok(builder.finish())
}

/// Validate a destination string as an absolute `http`/`https` URL with a host.
pub fn parse_destination(destination: &str) -> Result<Url, DestinationParseError> {
    let url = Url::parse(destination).map_err(|source| DestinationParseError::Invalid {
        destination: destination.to_string(),
        source,
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(DestinationParseError::UnsupportedScheme {
            destination: destination.to_string(),
            scheme: url.scheme().to_string(),
        });
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(DestinationParseError::MissingHost {
            destination: destination.to_string(),
        }),
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && !key.contains('/')
}

fn describe(value: &serde_yaml::Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|_| format!("{value:?}"))
}

#[derive(Default)]
struct TableBuilder {
    table: RouteTable,
    warnings: Vec<RecordParseError>,
    duplicates: Vec<String>,
}

impl TableBuilder {
    fn add(&mut self, key: &str, destination: &str) {
        let url = match parse_destination(destination) {
            Ok(url) => url,
            Err(source) => {
                self.skip(RecordParseError::Destination {
                    key: key.to_string(),
                    source,
                });
                return;
            }
        };

        if let Some(previous) = self.table.insert(key.to_string(), url) {
            tracing::warn!(
                key,
                replaced = %previous,
                destination,
                "Duplicate route key, last entry wins"
            );
            self.duplicates.push(key.to_string());
        }
    }

    fn skip(&mut self, warning: RecordParseError) {
        tracing::warn!(error = %warning, "Skipping route table record");
        self.warnings.push(warning);
    }

    fn finish(self) -> LoadedTable {
        LoadedTable {
            table: self.table,
            warnings: self.warnings,
            duplicates: self.duplicates,
        }
    }
}
