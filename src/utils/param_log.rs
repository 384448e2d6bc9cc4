/// Append-only CSV logging of invocation parameters

use std::fs::{self, OpenOptions};
use std::path::Path;
use log::info;
use crate::config::defs::{PipelineError, RunConfig, TIMESTAMP_FORMAT};


/// One row of a parameter log: job id and timestamp followed by the
/// tool-specific fields, in header order.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRecord {
    pub job_id: String,
    pub timestamp: String,
    pub fields: Vec<String>,
}

impl InvocationRecord {
    pub fn new(config: &RunConfig, fields: Vec<String>) -> Self {
        InvocationRecord {
            job_id: config.job_id.clone(),
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            fields,
        }
    }

    pub fn column_count(&self) -> usize {
        self.fields.len() + 2
    }

    fn to_row(&self) -> Vec<&str> {
        let mut row = Vec::with_capacity(self.column_count());
        row.push(self.job_id.as_str());
        row.push(self.timestamp.as_str());
        row.extend(self.fields.iter().map(String::as_str));
        row
    }
}


/// Appends `record` to the CSV at `path`, writing `header` first when the file
/// is absent or empty. Missing parent directories are created.
///
/// # Arguments
///
/// * `path` - Log file location.
/// * `header` - Column names, including the job id and timestamp columns.
/// * `record` - The row to append.
///
/// # Returns
/// Ok once the row is flushed; `InvalidConfig` if the column counts disagree.
pub fn append_record(path: &Path, header: &[&str], record: &InvocationRecord) -> Result<(), PipelineError> {
    if header.len() != record.column_count() {
        return Err(PipelineError::InvalidConfig(format!(
            "Parameter log {} has {} columns but the record has {}",
            path.display(),
            header.len(),
            record.column_count()
        )));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::default()
        .has_headers(false)
        .from_writer(file);

    if needs_header {
        writer.write_record(header)?;
    }
    writer.write_record(record.to_row())?;
    writer.flush()?;

    info!("Parameters logged to {}", path.display());
    Ok(())
}


/// Renders a flag the way the parameter logs expect: `on` when set, `off`
/// otherwise.
pub fn flag_field(set: bool, on: &str, off: &str) -> String {
    if set { on.to_string() } else { off.to_string() }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn config() -> RunConfig {
        RunConfig::new(PathBuf::from("/work"), HashMap::new(), false)
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_header_written_once() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("logs/params.csv");
        let header = ["Job ID", "Timestamp", "Input", "Flag"];

        let first = InvocationRecord::new(&config(), vec!["a.bam".into(), "x".into()]);
        let second = InvocationRecord::new(&config(), vec!["b.bam".into(), "".into()]);
        append_record(&path, &header, &first)?;
        append_record(&path, &header, &second)?;

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], header.to_vec());
        assert!(rows.iter().all(|r| r.len() == header.len()));
        assert_eq!(rows[1][0], "local");
        assert_eq!(rows[1][2], "a.bam");
        assert_eq!(rows[2][2], "b.bam");
        assert_eq!(rows.iter().filter(|r| r[0] == "Job ID").count(), 1);
        Ok(())
    }

    #[test]
    fn test_header_written_into_empty_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("params.csv");
        fs::write(&path, "")?;
        let header = ["Job ID", "Timestamp", "Input"];
        append_record(&path, &header, &InvocationRecord::new(&config(), vec!["a".into()]))?;
        let rows = read_rows(&path);
        assert_eq!(rows[0], header.to_vec());
        assert_eq!(rows.len(), 2);
        Ok(())
    }

    #[test]
    fn test_column_mismatch_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("params.csv");
        let header = ["Job ID", "Timestamp", "Input"];
        let record = InvocationRecord::new(&config(), vec!["a".into(), "b".into()]);
        assert!(matches!(
            append_record(&path, &header, &record),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_timestamp_format() {
        let record = InvocationRecord::new(&config(), vec![]);
        assert_eq!(record.timestamp.len(), 15);
        assert_eq!(&record.timestamp[8..9], "_");
    }
}
