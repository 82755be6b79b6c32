//! Managed CSV outputs for plugins
//!
//! A plugin declares its CSV files up front: a path relative to the
//! extracted-files root and the header columns. A file is created (with its
//! header) on the first row written to it, so a plugin that never writes
//! leaves nothing behind. Created files are returned as attachments, ready to
//! be put on the plugin's result.
//!
//! [`LifecycleCsvOutput`] keeps one set of files per lifecycle under
//! `Lifecycles/NN/`.

use crate::error::{EngineError, Result};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Set of CSV files written below the extracted-files root
pub struct CsvOutput {
    root: PathBuf,
    /// Declared files and their headers, first one is the default file
    files: Vec<(String, Vec<String>)>,
    writers: BTreeMap<String, csv::Writer<File>>,
    created: Vec<String>,
}

impl CsvOutput {
    /// Create an output without files; declare them with [`CsvOutput::with_file`]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Vec::new(),
            writers: BTreeMap::new(),
            created: Vec::new(),
        }
    }

    /// Builder method: declare a file (relative to the root) and its header
    ///
    /// An empty header means no header line is written.
    pub fn with_file<I, S>(mut self, filename: impl Into<String>, header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files
            .push((filename.into(), header.into_iter().map(Into::into).collect()));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Declared file names, in declaration order
    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|(name, _)| name.as_str())
    }

    /// Write one row to the first declared file
    pub fn write_row<I, T>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let filename = self
            .files
            .first()
            .map(|(name, _)| name.clone())
            .ok_or_else(|| EngineError::UndeclaredCsvFile(String::new()))?;
        self.write_row_to(&filename, row)
    }

    /// Write one row to a declared file
    pub fn write_row_to<I, T>(&mut self, filename: &str, row: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer(filename)?.write_record(row)?;
        Ok(())
    }

    /// Flush every open file
    pub fn flush(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Flush and close every open file
    ///
    /// Writing to a closed file appends to it again.
    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.writers.clear();
        Ok(())
    }

    /// Files created so far, relative to the root, in creation order
    pub fn attachments(&self) -> Vec<PathBuf> {
        self.created.iter().map(PathBuf::from).collect()
    }

    fn writer(&mut self, filename: &str) -> Result<&mut csv::Writer<File>> {
        if !self.writers.contains_key(filename) {
            let header = self
                .files
                .iter()
                .find(|(name, _)| name == filename)
                .map(|(_, header)| header.clone())
                .ok_or_else(|| EngineError::UndeclaredCsvFile(filename.to_string()))?;
            let writer = self.open(filename, &header)?;
            self.writers.insert(filename.to_string(), writer);
        }
        self.writers
            .get_mut(filename)
            .ok_or_else(|| EngineError::UndeclaredCsvFile(filename.to_string()))
    }

    fn open(&mut self, filename: &str, header: &[String]) -> Result<csv::Writer<File>> {
        let path = self.root.join(filename);
        if self.created.iter().any(|name| name == filename) {
            let file = OpenOptions::new().append(true).open(&path)?;
            return Ok(csv::Writer::from_writer(file));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&path)?;
        if header.is_empty() {
            log::debug!("No header line written to file {}", filename);
        } else {
            writer.write_record(header)?;
        }
        log::debug!("Created CSV file {:?}", path);
        self.created.push(filename.to_string());
        Ok(writer)
    }
}

/// Directory of one lifecycle's files, relative to the root
pub fn lifecycle_dir(lifecycle_id: u32) -> String {
    format!("Lifecycles/{:02}", lifecycle_id)
}

/// One set of CSV files per lifecycle
///
/// Call [`LifecycleCsvOutput::start`] from `on_lifecycle_start` and
/// [`LifecycleCsvOutput::end`] from `on_lifecycle_end`; rows go to the files
/// of the lifecycle currently open.
pub struct LifecycleCsvOutput {
    root: PathBuf,
    templates: Vec<(String, Vec<String>)>,
    current: Option<CsvOutput>,
    attachments: Vec<PathBuf>,
}

impl LifecycleCsvOutput {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            templates: Vec::new(),
            current: None,
            attachments: Vec::new(),
        }
    }

    /// Builder method: declare a file created in every lifecycle directory
    pub fn with_file<I, S>(mut self, filename: impl Into<String>, header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.templates
            .push((filename.into(), header.into_iter().map(Into::into).collect()));
        self
    }

    /// Switch to the files of a new lifecycle, ending the previous one
    pub fn start(&mut self, lifecycle_id: u32) -> Result<()> {
        self.end()?;
        let base = lifecycle_dir(lifecycle_id);
        let output = self
            .templates
            .iter()
            .fold(CsvOutput::new(&self.root), |output, (name, header)| {
                output.with_file(format!("{}/{}", base, name), header.clone())
            });
        self.current = Some(output);
        Ok(())
    }

    /// Close the files of the open lifecycle and keep them as attachments
    pub fn end(&mut self) -> Result<()> {
        if let Some(mut output) = self.current.take() {
            output.close()?;
            self.attachments.extend(output.attachments());
        }
        Ok(())
    }

    /// Write one row to the first declared file of the open lifecycle
    pub fn write_row<I, T>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let default = self.templates.first().map(|(name, _)| name.clone()).unwrap_or_default();
        self.current_output(&default)?.write_row(row)
    }

    /// Write one row to a declared file (template name) of the open lifecycle
    pub fn write_row_to<I, T>(&mut self, filename: &str, row: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let output = self.current_output(filename)?;
        let path = output
            .filenames()
            .find(|name| Path::new(name).ends_with(filename))
            .map(str::to_string)
            .ok_or_else(|| EngineError::UndeclaredCsvFile(filename.to_string()))?;
        output.write_row_to(&path, row)
    }

    /// Path of the open lifecycle's file whose name contains `pattern`
    pub fn find_file(&self, pattern: &str) -> Option<String> {
        self.current
            .as_ref()?
            .filenames()
            .find(|name| name.contains(pattern))
            .map(str::to_string)
    }

    /// Files of all ended lifecycles, relative to the root
    pub fn attachments(&self) -> &[PathBuf] {
        &self.attachments
    }

    fn current_output(&mut self, filename: &str) -> Result<&mut CsvOutput> {
        self.current
            .as_mut()
            .ok_or_else(|| EngineError::CsvOutsideLifecycle(filename.to_string()))
    }
}
