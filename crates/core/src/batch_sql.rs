//! Multi-row `INSERT` statement builder.
//!
//! Produces the SQL text for inserting `n` rows in one statement; binding
//! the values is left to the storage crate. The placeholder style is a
//! parameter so the same builder serves Postgres (`$1`) and `?`-style
//! engines.

use crate::error::CoreError;

/// Upper bound on bind parameters in a single statement (Postgres wire limit).
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Bind placeholder syntax of the target engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placeholder {
    /// `$1, $2, ...`
    #[default]
    Dollar,
    /// `?, ?, ...`
    Question,
}

/// Description of a batch insert into one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInsert {
    table: &'static str,
    columns: &'static [&'static str],
    conflict_target: Option<&'static [&'static str]>,
    returning: &'static [&'static str],
    placeholder: Placeholder,
}

impl BatchInsert {
    pub fn new(table: &'static str, columns: &'static [&'static str]) -> Self {
        Self {
            table,
            columns,
            conflict_target: None,
            returning: &[],
            placeholder: Placeholder::default(),
        }
    }

    /// Skip rows that violate the unique constraint on `target`.
    pub fn on_conflict_do_nothing(mut self, target: &'static [&'static str]) -> Self {
        self.conflict_target = Some(target);
        self
    }

    pub fn returning(mut self, columns: &'static [&'static str]) -> Self {
        self.returning = columns;
        self
    }

    pub fn placeholder(mut self, placeholder: Placeholder) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn columns(&self) -> &'static [&'static str] {
        self.columns
    }

    /// Largest row count one statement can carry.
    pub fn max_rows(&self) -> usize {
        MAX_BIND_PARAMS / self.columns.len().max(1)
    }

    /// SQL text for inserting `rows` rows.
    pub fn sql(&self, rows: usize) -> Result<String, CoreError> {
        if self.columns.is_empty() {
            return Err(CoreError::Internal(format!(
                "Batch insert into {} has no columns",
                self.table
            )));
        }
        if rows == 0 {
            return Err(CoreError::Validation(
                "Batch insert needs at least one row".to_string(),
            ));
        }
        if rows > self.max_rows() {
            return Err(CoreError::Validation(format!(
                "Batch of {rows} rows exceeds the limit of {} for {}",
                self.max_rows(),
                self.table
            )));
        }

        let width = self.columns.len();
        let tuples: Vec<String> = (0..rows)
            .map(|row| {
                let params: Vec<String> = (0..width)
                    .map(|col| match self.placeholder {
                        Placeholder::Dollar => format!("${}", row * width + col + 1),
                        Placeholder::Question => "?".to_string(),
                    })
                    .collect();
                format!("({})", params.join(", "))
            })
            .collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            self.columns.join(", "),
            tuples.join(", ")
        );
        if let Some(target) = self.conflict_target {
            sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", target.join(", ")));
        }
        if !self.returning.is_empty() {
            sql.push_str(&format!(" RETURNING {}", self.returning.join(", ")));
        }
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const COLUMNS: &[&str] = &["badge_number", "event_date"];

    #[test]
    fn dollar_placeholders_number_across_rows() {
        let sql = BatchInsert::new("access_events", COLUMNS).sql(2).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO access_events (badge_number, event_date) VALUES ($1, $2), ($3, $4)"
        );
    }

    #[test]
    fn question_placeholders() {
        let sql = BatchInsert::new("access_events", COLUMNS)
            .placeholder(Placeholder::Question)
            .sql(2)
            .unwrap();
        assert!(sql.ends_with("VALUES (?, ?), (?, ?)"));
    }

    #[test]
    fn conflict_and_returning_clauses() {
        let sql = BatchInsert::new("access_events", COLUMNS)
            .on_conflict_do_nothing(COLUMNS)
            .returning(&["badge_number"])
            .sql(1)
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO access_events (badge_number, event_date) VALUES ($1, $2) \
             ON CONFLICT (badge_number, event_date) DO NOTHING RETURNING badge_number"
        );
    }

    #[test]
    fn rejects_empty_and_oversized_batches() {
        let insert = BatchInsert::new("access_events", COLUMNS);
        assert_matches!(insert.sql(0), Err(CoreError::Validation(_)));
        assert_eq!(insert.max_rows(), 32_767);
        assert_matches!(insert.sql(32_768), Err(CoreError::Validation(_)));
        assert!(insert.sql(32_767).is_ok());
    }
}
