use crate::models::{GroupId, StudentRecord};
use anyhow::{Context, Result};
use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use tracing::warn;

/// Minimum number of fields a student row must carry.
const REQUIRED_FIELDS: usize = 6;

/// A loaded student table: the untouched header row and the parsed students.
#[derive(Debug, Clone)]
pub struct StudentTable {
    pub header: StringRecord,
    pub records: Vec<StudentRecord>,
    /// Rows dropped because they could not be parsed.
    pub skipped: usize,
}

pub fn read_data_source(file_path: &str) -> Result<StudentTable> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(file_path)
        .with_context(|| format!("Failed to open student table: {}", file_path))?;

    let mut rows = reader.records();
    let header = rows
        .next()
        .transpose()
        .with_context(|| format!("Failed to read header of: {}", file_path))?
        .ok_or_else(|| anyhow::anyhow!("Student table is empty: {}", file_path))?;

    let mut records = Vec::new();
    let mut skipped = 0;

    for row in rows {
        let row = row.with_context(|| format!("Failed to read row from: {}", file_path))?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);

        match parse_record(&row) {
            Some(record) => records.push(record),
            None => {
                warn!(line, fields = row.len(), "skipping malformed row");
                skipped += 1;
            }
        }
    }

    Ok(StudentTable {
        header,
        records,
        skipped,
    })
}

fn parse_record(row: &StringRecord) -> Option<StudentRecord> {
    if row.len() < REQUIRED_FIELDS {
        return None;
    }

    let (destination, stale_destination) = match row.get(6).map(str::trim) {
        None | Some("") => (None, None),
        Some(value) => match value.parse::<GroupId>() {
            Ok(group) => (Some(group), None),
            Err(_) => (None, Some(value.to_string())),
        },
    };

    Some(StudentRecord {
        line_number: row[0].to_string(),
        profession: row[1].to_string(),
        program_choice: row[2].to_string(),
        source_group: row[3].to_string(),
        internal_placement: row[4].to_string(),
        period: row[5].to_string(),
        destination,
        stale_destination,
    })
}

pub fn write_data_source(file_path: &str, table: &StudentTable) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_path(file_path)
        .with_context(|| format!("Failed to create student table: {}", file_path))?;

    writer.write_record(&table.header)?;

    for record in &table.records {
        let destination = match (&record.destination, &record.stale_destination) {
            (Some(group), _) => group.to_string(),
            (None, Some(stale)) => stale.clone(),
            (None, None) => String::new(),
        };

        writer.write_record(&[
            &record.line_number,
            &record.profession,
            &record.program_choice,
            &record.source_group,
            &record.internal_placement,
            &record.period,
            &destination,
        ])?;
    }

    writer.flush()?;
    Ok(())
}
