//! CSV ingestion into an in-memory record set
//!
//! Parsing goes through polars with every column read as text, so cells keep
//! their exact spelling until typed here. The result is converted into plain
//! column vectors so that downstream stages own their data and never share
//! buffers across requests.

use polars::prelude::*;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Cell tokens read as missing in text columns
const MISSING_TOKENS: [&str; 6] = ["", "NA", "N/A", "NaN", "null", "None"];

/// Column values, typed per column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build from raw text cells, promoting to numeric when every present cell parses
    fn from_text(values: Vec<Option<String>>) -> Self {
        let normalized: Vec<Option<String>> = values
            .into_iter()
            .map(|v| v.filter(|s| !MISSING_TOKENS.contains(&s.trim())))
            .collect();

        let parsed: Option<Vec<Option<f64>>> = normalized
            .iter()
            .map(|cell| match cell {
                None => Some(None),
                Some(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .map(|x| Some(x).filter(|v| v.is_finite())),
            })
            .collect();

        match parsed {
            Some(numbers) => ColumnData::Numeric(numbers),
            None => ColumnData::Text(normalized),
        }
    }
}

/// Named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
    /// Cells as read, kept for numeric columns whose text a parsed number
    /// cannot reproduce (leading zeros, trailing zeros, long digit strings)
    source: Option<Vec<Option<String>>>,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
            source: None,
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Text(values),
            source: None,
        }
    }

    /// Column from raw text cells, typed like `ColumnData::from_text`
    fn from_cells(name: String, cells: Vec<Option<String>>) -> Self {
        let cells: Vec<Option<String>> = cells
            .into_iter()
            .map(|v| v.filter(|s| !MISSING_TOKENS.contains(&s.trim())))
            .collect();
        let data = ColumnData::from_text(cells.clone());

        let source = match &data {
            ColumnData::Numeric(values) => {
                let lossy = cells
                    .iter()
                    .zip(values)
                    .any(|(cell, value)| cell.as_deref() != value.map(format_number).as_deref());
                lossy.then_some(cells)
            }
            ColumnData::Text(_) => None,
        };

        Self { name, data, source }
    }

    /// Mutable values; edited cells no longer match the input text, so it is dropped
    pub fn data_mut(&mut self) -> &mut ColumnData {
        self.source = None;
        &mut self.data
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.data, ColumnData::Numeric(_))
    }

    pub fn missing_count(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Text(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Cell rendered for output
    ///
    /// Input text is returned verbatim when it was kept; otherwise whole
    /// numbers print without a fraction.
    pub fn display_value(&self, row: usize) -> Option<String> {
        if let Some(source) = &self.source {
            return source.get(row).cloned().flatten();
        }
        match &self.data {
            ColumnData::Numeric(v) => v.get(row).copied().flatten().map(format_number),
            ColumnData::Text(v) => v.get(row).cloned().flatten(),
        }
    }
}

fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        x.to_string()
    }
}

/// Ordered, uniquely named columns of equal height
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    columns: Vec<Column>,
    height: usize,
}

impl RecordSet {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let height = columns.first().map(|c| c.data.len()).unwrap_or(0);

        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(PipelineError::unparseable(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
            if column.data.len() != height {
                return Err(PipelineError::unparseable(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.data.len(),
                    height
                )));
            }
        }

        Ok(Self { columns, height })
    }

    /// Parse an optional upload, as handed over by a serving layer
    pub fn from_upload(upload: Option<&[u8]>) -> Result<Self> {
        match upload {
            Some(bytes) => Self::from_csv_bytes(bytes),
            None => Err(PipelineError::NoInputProvided),
        }
    }

    /// Parse CSV bytes with a header row
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(PipelineError::EmptyInput);
        }

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
            .finish()
            .map_err(|e| PipelineError::unparseable(e.to_string()))?;

        Self::from_dataframe(&df)
    }

    /// Load a CSV file with a header row
    pub fn from_csv_path<P: AsRef<Path>>(csv_path: P) -> Result<Self> {
        let path = csv_path.as_ref();
        if std::fs::metadata(path)?.len() == 0 {
            return Err(PipelineError::EmptyInput);
        }

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .and_then(|reader| reader.finish())
            .map_err(|e| PipelineError::unparseable(format!("{}: {}", path.display(), e)))?;

        Self::from_dataframe(&df)
    }

    /// Convert a polars DataFrame
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        if df.height() == 0 {
            return Err(PipelineError::EmptyInput);
        }

        let names: HashSet<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();

        let mut columns = Vec::with_capacity(df.width());
        for series in df.get_columns() {
            let name = series.name().to_string();

            // polars renames repeated headers instead of rejecting them
            if let Some((base, _)) = name.rsplit_once("_duplicated_") {
                if names.contains(base) {
                    return Err(PipelineError::unparseable(format!(
                        "duplicate column name '{}'",
                        base
                    )));
                }
            }

            let column = match series.dtype() {
                DataType::Int32
                | DataType::Int64
                | DataType::UInt32
                | DataType::UInt64
                | DataType::Float32
                | DataType::Float64
                | DataType::Boolean => {
                    let cast = series
                        .cast(&DataType::Float64)
                        .map_err(|e| PipelineError::unparseable(e.to_string()))?;
                    let values = cast
                        .f64()
                        .map_err(|e| PipelineError::unparseable(e.to_string()))?;
                    Column::numeric(
                        name,
                        values
                            .into_iter()
                            .map(|v| v.filter(|x| x.is_finite()))
                            .collect(),
                    )
                }
                _ => {
                    let cast = series
                        .cast(&DataType::String)
                        .map_err(|e| PipelineError::unparseable(e.to_string()))?;
                    let values = cast
                        .str()
                        .map_err(|e| PipelineError::unparseable(e.to_string()))?;
                    Column::from_cells(name, values.into_iter().map(|v| v.map(String::from)).collect())
                }
            };

            columns.push(column);
        }

        Self::new(columns)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Numeric values of a column, None if absent or textual
    pub fn numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Numeric(v)) => Some(v),
            _ => None,
        }
    }

    /// Numeric values of a column that must exist and be numeric
    pub fn require_numeric(&self, name: &str) -> Result<&[Option<f64>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Numeric(v)) => Ok(v),
            Some(ColumnData::Text(_)) => Err(PipelineError::unparseable(format!(
                "column '{}' contains non-numeric values",
                name
            ))),
            None => Err(PipelineError::MissingRequiredColumn {
                name: name.to_string(),
            }),
        }
    }

    /// Copy without the named column; absent names are ignored
    pub fn without_column(&self, name: &str) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .filter(|c| c.name != name)
                .cloned()
                .collect(),
            height: self.height,
        }
    }

    /// Copy restricted to `names`, in that order; every name must exist
    pub fn select(&self, names: &[String]) -> Result<Self> {
        let missing: Vec<String> = names
            .iter()
            .filter(|n| !self.has_column(n))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::MissingFeatureColumns { names: missing });
        }

        let columns = names
            .iter()
            .filter_map(|n| self.column(n).cloned())
            .collect();
        Ok(Self {
            columns,
            height: self.height,
        })
    }

    /// Write as CSV with a header row
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let columns: Vec<polars::prelude::Column> = self
            .columns
            .iter()
            .map(|c| match (&c.source, &c.data) {
                (Some(cells), _) => {
                    polars::prelude::Column::new(c.name.as_str().into(), cells.as_slice())
                }
                (None, ColumnData::Numeric(v)) => {
                    polars::prelude::Column::new(c.name.as_str().into(), v.as_slice())
                }
                (None, ColumnData::Text(v)) => {
                    polars::prelude::Column::new(c.name.as_str().into(), v.as_slice())
                }
            })
            .collect();

        let mut df = DataFrame::new(columns).map_err(|e| PipelineError::internal("export", e))?;
        let mut file = std::fs::File::create(path.as_ref())?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .map_err(|e| PipelineError::internal("export", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = "encounterId,feed_vol,resp_rate,bmi,note,referral
101,250.5,18,22.1,stable,0
102,,0,NA,review,1
103,300,22,25.4,,0
";

    #[test]
    fn test_parse_sample_columns() {
        let table = RecordSet::from_csv_bytes(SAMPLE.as_bytes()).unwrap();

        assert_eq!(table.height(), 3);
        assert_eq!(
            table.column_names(),
            vec!["encounterId", "feed_vol", "resp_rate", "bmi", "note", "referral"]
        );
        assert_eq!(
            table.numeric("feed_vol").unwrap(),
            &[Some(250.5), None, Some(300.0)]
        );
        // "NA" is read as missing and the column stays numeric
        assert_eq!(table.numeric("bmi").unwrap(), &[Some(22.1), None, Some(25.4)]);
        assert!(!table.column("note").unwrap().is_numeric());
    }

    #[test]
    fn test_display_value_integers() {
        let table = RecordSet::from_csv_bytes(SAMPLE.as_bytes()).unwrap();
        let ids = table.column("encounterId").unwrap();
        assert_eq!(ids.display_value(0).as_deref(), Some("101"));
        let feed = table.column("feed_vol").unwrap();
        assert_eq!(feed.display_value(0).as_deref(), Some("250.5"));
        assert_eq!(feed.display_value(1), None);
    }

    #[test]
    fn test_no_input() {
        assert!(matches!(
            RecordSet::from_upload(None),
            Err(PipelineError::NoInputProvided)
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            RecordSet::from_csv_bytes(b""),
            Err(PipelineError::EmptyInput)
        ));
        assert!(matches!(
            RecordSet::from_csv_bytes(b"  \n"),
            Err(PipelineError::EmptyInput)
        ));
        assert!(matches!(
            RecordSet::from_csv_bytes(b"a,b,c\n"),
            Err(PipelineError::EmptyInput)
        ));
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let result = RecordSet::new(vec![
            Column::numeric("bmi", vec![Some(1.0)]),
            Column::numeric("bmi", vec![Some(2.0)]),
        ]);
        assert!(matches!(
            result,
            Err(PipelineError::UnparseableInput { .. })
        ));
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let result = RecordSet::new(vec![
            Column::numeric("a", vec![Some(1.0), Some(2.0)]),
            Column::numeric("b", vec![Some(2.0)]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_select_reports_all_missing() {
        let table = RecordSet::from_csv_bytes(SAMPLE.as_bytes()).unwrap();
        let err = table
            .select(&[
                "bmi".to_string(),
                "fio2".to_string(),
                "peep".to_string(),
            ])
            .unwrap_err();
        match err {
            PipelineError::MissingFeatureColumns { names } => {
                assert_eq!(names, vec!["fio2".to_string(), "peep".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_select_orders_columns() {
        let table = RecordSet::from_csv_bytes(SAMPLE.as_bytes()).unwrap();
        let subset = table
            .select(&["bmi".to_string(), "feed_vol".to_string()])
            .unwrap();
        assert_eq!(subset.column_names(), vec!["bmi", "feed_vol"]);
        assert_eq!(subset.height(), 3);
    }

    #[test]
    fn test_require_numeric_on_text_column() {
        let table = RecordSet::from_csv_bytes(SAMPLE.as_bytes()).unwrap();
        assert!(matches!(
            table.require_numeric("note"),
            Err(PipelineError::UnparseableInput { .. })
        ));
        assert!(matches!(
            table.require_numeric("absent"),
            Err(PipelineError::MissingRequiredColumn { .. })
        ));
    }

    #[test]
    fn test_all_missing_text_becomes_numeric() {
        let data = ColumnData::from_text(vec![None, Some("NA".to_string()), Some(" ".to_string())]);
        assert_eq!(data, ColumnData::Numeric(vec![None, None, None]));
    }

    #[test]
    fn test_csv_export_round_trip() {
        let table = RecordSet::from_csv_bytes(SAMPLE.as_bytes()).unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.csv");

        table.to_csv(&path).unwrap();
        let reloaded = RecordSet::from_csv_path(&path).unwrap();

        assert_eq!(reloaded.height(), 3);
        assert_eq!(reloaded.numeric("resp_rate").unwrap(), table.numeric("resp_rate").unwrap());
    }

    #[test]
    fn test_repeated_header_rejected() {
        assert!(matches!(
            RecordSet::from_csv_bytes(b"bmi,bmi,referral\n1,2,0\n"),
            Err(PipelineError::UnparseableInput { ref detail }) if detail.contains("'bmi'")
        ));
    }

    #[test]
    fn test_identifier_text_kept_verbatim() {
        let table = RecordSet::from_csv_bytes(
            b"encounterId,bmi\n00123,20\n12345678901234567,21\n1.50,22\n",
        )
        .unwrap();
        let ids = table.column("encounterId").unwrap();

        // still numeric, but rendered exactly as uploaded
        assert!(ids.is_numeric());
        let rendered: Vec<Option<String>> = (0..3).map(|i| ids.display_value(i)).collect();
        assert_eq!(
            rendered,
            vec![
                Some("00123".to_string()),
                Some("12345678901234567".to_string()),
                Some("1.50".to_string()),
            ]
        );
    }

    #[test]
    fn test_verbatim_text_survives_export() {
        let table = RecordSet::from_csv_bytes(b"encounterId,bmi\n00123,20\n00456,21\n").unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("ids.csv");

        table.to_csv(&path).unwrap();
        let reloaded = RecordSet::from_csv_path(&path).unwrap();
        let ids = reloaded.column("encounterId").unwrap();
        assert_eq!(ids.display_value(0).as_deref(), Some("00123"));
        assert_eq!(ids.display_value(1).as_deref(), Some("00456"));
    }

    #[test]
    fn test_edited_cells_drop_input_text() {
        let mut table = RecordSet::from_csv_bytes(b"resp_rate\n007\n0\n").unwrap();
        let column = table.column_mut("resp_rate").unwrap();
        if let ColumnData::Numeric(values) = column.data_mut() {
            values[1] = None;
        }
        assert_eq!(column.display_value(0).as_deref(), Some("7"));
        assert_eq!(column.display_value(1), None);
    }
}
