//! Declarative header alias table for badge-reader exports.
//!
//! The export header is French and arrives in several spellings (with and
//! without accents, varying case and spacing). Each canonical [`Column`]
//! lists the spellings it accepts; a header row is resolved once per run
//! into a [`ColumnMap`] and every record is then read by index.

use deunicode::deunicode;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Canonical columns
// ---------------------------------------------------------------------------

/// A column the pipeline knows how to interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    BadgeNumber,
    EventDate,
    EventTime,
    Controller,
    Reader,
    EventType,
    LastName,
    FirstName,
    Status,
    GroupName,
    ValidityStartDate,
    CreationDate,
}

/// Column order of the reader export, used when a file has no header row.
pub const CANONICAL_ORDER: [Column; 12] = [
    Column::BadgeNumber,
    Column::EventDate,
    Column::EventTime,
    Column::Controller,
    Column::Reader,
    Column::EventType,
    Column::LastName,
    Column::FirstName,
    Column::Status,
    Column::GroupName,
    Column::ValidityStartDate,
    Column::CreationDate,
];

/// Columns without which no record can be imported.
pub const REQUIRED_COLUMNS: &[Column] = &[Column::BadgeNumber, Column::EventDate];

impl Column {
    /// Header name as written by the reader export.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Self::BadgeNumber => "Numéro de badge",
            Self::EventDate => "Date évènements",
            Self::EventTime => "Heure évènements",
            Self::Controller => "Centrale",
            Self::Reader => "Lecteur",
            Self::EventType => "Nature Evenement",
            Self::LastName => "Nom",
            Self::FirstName => "Prénom",
            Self::Status => "Statut",
            Self::GroupName => "Groupe",
            Self::ValidityStartDate => "Date de début de validité",
            Self::CreationDate => "Date de création",
        }
    }

    /// Accepted header spellings. Matching goes through [`fold_header`], so
    /// accents, case and whitespace variants of these collapse together.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::BadgeNumber => &["Numéro de badge", "Numero badge", "Badge", "N° de badge"],
            Self::EventDate => &["Date évènements", "Date événements", "Date evenement", "Date"],
            Self::EventTime => &["Heure évènements", "Heure événements", "Heure evenement", "Heure"],
            Self::Controller => &["Centrale", "Contrôleur", "Controleur"],
            Self::Reader => &["Lecteur"],
            Self::EventType => &[
                "Nature Evenement",
                "Nature événement",
                "Nature évènement",
                "Type d'événement",
                "Type evenement",
            ],
            Self::LastName => &["Nom", "Nom de famille"],
            Self::FirstName => &["Prénom"],
            Self::Status => &["Statut", "Status"],
            Self::GroupName => &["Groupe", "Group"],
            Self::ValidityStartDate => &["Date de début de validité", "Début de validité"],
            Self::CreationDate => &["Date de création", "Création"],
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Fold a header cell to its comparison key: ASCII transliteration,
/// lowercase, alphanumerics only. `"Numéro de badge"` -> `"numerodebadge"`.
pub fn fold_header(name: &str) -> String {
    deunicode(name.trim())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ---------------------------------------------------------------------------
// Column map
// ---------------------------------------------------------------------------

/// Header names plus the resolved position of every known column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    names: Vec<String>,
    positions: Vec<(Column, usize)>,
}

impl ColumnMap {
    /// Resolve a header row against the alias table.
    ///
    /// The first header cell matching a column wins; later cells with the
    /// same meaning stay addressable by name but are not mapped.
    pub fn resolve(header: &[String]) -> Self {
        let folded: Vec<String> = header.iter().map(|h| fold_header(h)).collect();
        let mut positions = Vec::with_capacity(CANONICAL_ORDER.len());

        for column in CANONICAL_ORDER {
            let keys: Vec<String> = column.aliases().iter().map(|a| fold_header(a)).collect();
            let taken = |idx: usize| positions.iter().any(|(_, p)| *p == idx);
            if let Some(idx) = folded
                .iter()
                .enumerate()
                .position(|(i, f)| !f.is_empty() && !taken(i) && keys.contains(f))
            {
                positions.push((column, idx));
            }
        }

        Self {
            names: header.to_vec(),
            positions,
        }
    }

    /// Map for header-less files: the canonical export order.
    pub fn positional() -> Self {
        Self {
            names: CANONICAL_ORDER
                .iter()
                .map(|c| c.canonical_name().to_string())
                .collect(),
            positions: CANONICAL_ORDER.iter().copied().zip(0..).collect(),
        }
    }

    /// Position of `column` in a record, if the header carries it.
    pub fn index_of(&self, column: Column) -> Option<usize> {
        self.positions
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, idx)| *idx)
    }

    /// Number of columns a complete record has.
    pub fn width(&self) -> usize {
        self.names.len()
    }

    /// Header names in file order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Required columns the header failed to provide.
    pub fn missing_required(&self) -> Vec<Column> {
        REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| self.index_of(*c).is_none())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn fold_strips_accents_case_and_spaces() {
        assert_eq!(fold_header("Numéro de badge"), "numerodebadge");
        assert_eq!(fold_header("  DATE  évènements "), "dateevenements");
        assert_eq!(fold_header("Prénom"), "prenom");
    }

    #[test]
    fn resolves_canonical_export_header() {
        let names: Vec<&str> = CANONICAL_ORDER.iter().map(|c| c.canonical_name()).collect();
        let map = ColumnMap::resolve(&header(&names));

        for (i, column) in CANONICAL_ORDER.iter().enumerate() {
            assert_eq!(map.index_of(*column), Some(i), "column: {column}");
        }
        assert!(map.missing_required().is_empty());
    }

    #[test]
    fn resolves_unaccented_variants() {
        let map = ColumnMap::resolve(&header(&[
            "Numero de badge",
            "Date evenements",
            "Heure evenements",
            "Prenom",
        ]));
        assert_eq!(map.index_of(Column::BadgeNumber), Some(0));
        assert_eq!(map.index_of(Column::EventDate), Some(1));
        assert_eq!(map.index_of(Column::EventTime), Some(2));
        assert_eq!(map.index_of(Column::FirstName), Some(3));
        assert_eq!(map.index_of(Column::LastName), None);
    }

    #[test]
    fn reports_missing_required_columns() {
        let map = ColumnMap::resolve(&header(&["Centrale", "Lecteur"]));
        assert_eq!(
            map.missing_required(),
            vec![Column::BadgeNumber, Column::EventDate]
        );
    }

    #[test]
    fn first_matching_cell_wins() {
        let map = ColumnMap::resolve(&header(&["Nom", "Nom", "Numéro de badge"]));
        assert_eq!(map.index_of(Column::LastName), Some(0));
        assert_eq!(map.index_of(Column::BadgeNumber), Some(2));
        assert_eq!(map.width(), 3);
    }

    #[test]
    fn positional_map_follows_export_order() {
        let map = ColumnMap::positional();
        assert_eq!(map.width(), 12);
        assert_eq!(map.index_of(Column::EventType), Some(5));
        assert_eq!(map.names()[0], "Numéro de badge");
    }
}
