//! Duplicate export as a spreadsheet-friendly CSV.

use accesslog_core::header::Column;
use accesslog_core::outcome::{DuplicateRecord, RawPayload};
use accesslog_core::reader::UTF8_BOM;
use accesslog_core::types::DbId;
use accesslog_db::models::import_run_row::ImportRunRow;
use accesslog_db::repositories::{ImportRunRepo, ImportRunRowRepo};
use accesslog_db::DbPool;

/// Header of the duplicate export.
pub const DUPLICATE_EXPORT_HEADER: [&str; 7] = [
    "Numéro de badge",
    "Date",
    "Heure",
    "Type d'événement",
    "Centrale",
    "Groupe",
    "Raison du rejet",
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Import run {0} not found")]
    RunNotFound(DbId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One line of the duplicate export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateExportRow {
    pub badge_number: String,
    pub date: String,
    pub time: String,
    pub event_type: String,
    pub controller: String,
    pub group_name: String,
    pub reason: String,
}

impl DuplicateExportRow {
    fn fields(&self) -> [&str; 7] {
        [
            self.badge_number.as_str(),
            self.date.as_str(),
            self.time.as_str(),
            self.event_type.as_str(),
            self.controller.as_str(),
            self.group_name.as_str(),
            self.reason.as_str(),
        ]
    }
}

fn payload_field(raw: &RawPayload, column: Column) -> String {
    raw.value_for(column).unwrap_or_default().to_string()
}

impl From<&DuplicateRecord> for DuplicateExportRow {
    fn from(dup: &DuplicateRecord) -> Self {
        Self {
            badge_number: dup.key.badge_number.clone(),
            date: dup.key.event_date.format("%d/%m/%Y").to_string(),
            time: dup.key.event_time.format("%H:%M:%S").to_string(),
            event_type: dup.key.event_type.clone(),
            controller: payload_field(&dup.raw, Column::Controller),
            group_name: payload_field(&dup.raw, Column::GroupName),
            reason: dup.reason.clone(),
        }
    }
}

impl From<&ImportRunRow> for DuplicateExportRow {
    fn from(row: &ImportRunRow) -> Self {
        let raw = RawPayload::from_json(&row.raw_payload);
        Self {
            badge_number: row.badge_number.clone().unwrap_or_default(),
            date: row
                .event_date
                .map(|d| d.format("%d/%m/%Y").to_string())
                .unwrap_or_default(),
            time: row
                .event_time
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_default(),
            event_type: row.event_type.clone().unwrap_or_default(),
            controller: payload_field(&raw, Column::Controller),
            group_name: payload_field(&raw, Column::GroupName),
            reason: row.reason.clone(),
        }
    }
}

/// Render rows as a BOM-prefixed, `;`-separated CSV document with CRLF
/// line endings.
pub fn duplicates_csv<'a, I>(rows: I) -> Result<Vec<u8>, csv::Error>
where
    I: IntoIterator<Item = &'a DuplicateExportRow>,
{
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .terminator(csv::Terminator::CRLF)
        .from_writer(UTF8_BOM.to_vec());

    writer.write_record(DUPLICATE_EXPORT_HEADER)?;
    for row in rows {
        writer.write_record(row.fields())?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Export the persisted duplicates of run `run_id`.
pub async fn export_duplicates(pool: &DbPool, run_id: DbId) -> Result<Vec<u8>, ExportError> {
    if ImportRunRepo::find_by_id(pool, run_id).await?.is_none() {
        return Err(ExportError::RunNotFound(run_id));
    }
    let rows: Vec<DuplicateExportRow> = ImportRunRowRepo::list_duplicates(pool, run_id)
        .await?
        .iter()
        .map(DuplicateExportRow::from)
        .collect();

    tracing::info!(run_id, rows = rows.len(), "Exporting duplicates");
    Ok(duplicates_csv(&rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use accesslog_core::dedup::DedupKey;
    use accesslog_core::outcome::DuplicateSource;
    use chrono::{NaiveDate, NaiveTime};

    fn duplicate() -> DuplicateRecord {
        DuplicateRecord::new(
            3,
            DedupKey {
                badge_number: "1001".into(),
                event_date: NaiveDate::from_ymd_opt(2025, 4, 7).unwrap(),
                event_time: NaiveTime::from_hms_opt(8, 15, 0).unwrap(),
                event_type: "Entrée".into(),
            },
            DuplicateSource::Store,
            RawPayload::new(vec![
                ("Numéro de badge".into(), "1001".into()),
                ("Centrale".into(), "Centrale; Nord".into()),
                ("Groupe".into(), "Staff".into()),
            ]),
        )
    }

    #[test]
    fn export_starts_with_bom_and_header() {
        let rows: Vec<DuplicateExportRow> = Vec::new();
        let bytes = duplicates_csv(&rows).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert_eq!(
            text,
            "Numéro de badge;Date;Heure;Type d'événement;Centrale;Groupe;Raison du rejet\r\n"
        );
    }

    #[test]
    fn export_formats_duplicate_rows() {
        let row = DuplicateExportRow::from(&duplicate());
        let bytes = duplicates_csv([&row]).unwrap();
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let line = text.lines().nth(1).unwrap();
        assert_eq!(
            line,
            "1001;07/04/2025;08:15:00;Entrée;\"Centrale; Nord\";Staff;event already imported"
        );
    }
}
