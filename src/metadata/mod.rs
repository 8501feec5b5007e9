//! `metadata.json`: the package description record.
//!
//! The archive engine only cares whether the file exists. Loading and
//! validation happen in the builder, where a bad record is a warning rather
//! than a reason to refuse packing.

use std::io::{BufRead, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ApgError, Result};
use crate::fsx as fs;

/// The APGv2 package metadata record.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "type", default)]
    pub package_type: String,
    /// `None` means architecture independent.
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub maintainer: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub replaces: Vec<String>,
    /// Configuration files the package owns, as absolute install paths.
    #[serde(default)]
    pub conf: Vec<String>,
}

impl PackageMetadata {
    /// Reads and parses a metadata file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(ApgError::at(path))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Writes the record as pretty JSON with four-space indentation.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut data = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut data, formatter);
        self.serialize(&mut ser)?;
        data.push(b'\n');
        fs::write(path, data).map_err(ApgError::at(path))
    }

    /// Checks that the required fields are present.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ApgError::InvalidInput("name is required".into()));
        }
        if self.version.trim().is_empty() {
            return Err(ApgError::InvalidInput("version is required".into()));
        }
        Ok(())
    }
}

/// Interactive prompt-driven construction of a [`PackageMetadata`].
pub struct Wizard<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Wizard<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn prompt(&mut self, text: &str) -> Result<String> {
        write!(self.output, "{text}")?;
        self.output.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    fn prompt_optional(&mut self, text: &str) -> Result<Option<String>> {
        let answer = self.prompt(text)?;
        Ok((!answer.is_empty()).then_some(answer))
    }

    fn prompt_list(&mut self, text: &str) -> Result<Vec<String>> {
        let answer = self.prompt(text)?;
        Ok(answer
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect())
    }

    /// Asks for every field in turn. Name and version are mandatory.
    pub fn run(mut self) -> Result<PackageMetadata> {
        writeln!(self.output, "Package Metadata Creation Wizard")?;
        writeln!(self.output, "================================")?;

        let name = self.prompt("Package name: ")?;
        if name.is_empty() {
            return Err(ApgError::InvalidInput("package name is required".into()));
        }
        let version = self.prompt("Version: ")?;
        if version.is_empty() {
            return Err(ApgError::InvalidInput("version is required".into()));
        }
        let mut package_type = self.prompt("Type (misc/binary/source) [misc]: ")?;
        if package_type.is_empty() {
            package_type = "misc".into();
        }

        Ok(PackageMetadata {
            name,
            version,
            package_type,
            architecture: self.prompt_optional("Architecture (x86_64/aarch64/all/null) [null]: ")?,
            description: self.prompt("Description: ")?,
            maintainer: self.prompt("Maintainer: ")?,
            license: self.prompt_optional("License (MIT/GPL-3.0/etc): ")?,
            homepage: self.prompt("Homepage URL: ")?,
            tags: self.prompt_list("Tags (comma-separated): ")?,
            dependencies: self.prompt_list(
                "Dependencies (comma-separated, e.g., 'lib-example >= 2.0.0'): ",
            )?,
            conflicts: self.prompt_list("Conflicts (comma-separated): ")?,
            provides: self.prompt_list("Provides (comma-separated): ")?,
            replaces: self.prompt_list("Replaces (comma-separated): ")?,
            conf: self.prompt_list("Config files (comma-separated, e.g., '/etc/app.conf'): ")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn validate_requires_name_and_version() {
        let mut meta = PackageMetadata::default();
        assert!(meta.validate().is_err());
        meta.name = "hello".into();
        assert!(meta.validate().is_err());
        meta.version = "1.0.0".into();
        assert!(meta.validate().is_ok());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let meta = PackageMetadata {
            name: "hello".into(),
            version: "2.1".into(),
            package_type: "binary".into(),
            architecture: Some("x86_64".into()),
            dependencies: vec!["libc >= 2.0".into()],
            ..PackageMetadata::default()
        };
        meta.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n    \"name\": \"hello\""));
        assert!(text.contains("\"type\": \"binary\""));
        assert!(text.contains("\"license\": null"));
        assert_eq!(PackageMetadata::load(&path).unwrap(), meta);
    }

    #[test]
    fn missing_lists_default_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        fs::write(&path, br#"{"name":"x","version":"1"}"#).unwrap();
        let meta = PackageMetadata::load(&path).unwrap();
        assert!(meta.tags.is_empty());
        assert_eq!(meta.architecture, None);
    }

    #[test]
    fn invalid_json_is_metadata_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(PackageMetadata::load(&path), Err(ApgError::Metadata(_))));
    }

    #[test]
    fn wizard_collects_answers() {
        let answers = "hello\n1.0\n\n\nGreets people\nJane\nMIT\nhttps://example.org\ncli, tools ,\nlibc\n\n\n\n/etc/hello.conf\n";
        let mut shown = Vec::new();
        let meta = Wizard::new(Cursor::new(answers), &mut shown).run().unwrap();

        assert_eq!(meta.name, "hello");
        assert_eq!(meta.package_type, "misc");
        assert_eq!(meta.architecture, None);
        assert_eq!(meta.license.as_deref(), Some("MIT"));
        assert_eq!(meta.tags, vec!["cli", "tools"]);
        assert_eq!(meta.conf, vec!["/etc/hello.conf"]);
        assert!(String::from_utf8(shown).unwrap().contains("Package name: "));
    }

    #[test]
    fn wizard_refuses_empty_name() {
        let mut sink = Vec::new();
        let result = Wizard::new(Cursor::new("\n"), &mut sink).run();
        assert!(matches!(result, Err(ApgError::InvalidInput(_))));
    }
}
