//! Raw dataset sources.
//!
//! A [`RawSource`] holds the bytes of one dataset (a single file, or every
//! table of an MRDS bundle) so the same payload feeds both the fingerprint
//! and record extraction. Records are produced lazily and each call to a
//! record method starts from the top again.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use serde_json::Value;

use crate::{Error, Result};

/// One flat source record: column name → trimmed cell text.
pub type RawRecord = BTreeMap<String, String>;

/// Table stems of an MRDS bundle, main table first.
pub const MRDS_TABLES: &[&str] = &[
  "MRDS",
  "Location",
  "Commodity",
  "Materials",
  "Ownership",
  "Physiography",
  "Ages",
  "Rocks",
];

// ─── Files ───────────────────────────────────────────────────────────────────

/// One raw file held in memory.
#[derive(Debug, Clone)]
pub struct SourceFile {
  /// File name without directories; part of the bundle fingerprint.
  pub name:  String,
  pub bytes: Vec<u8>,
}

impl SourceFile {
  pub fn read(path: &Path) -> Result<Self> {
    if !path.is_file() {
      return Err(Error::SourceMissing(path.to_path_buf()));
    }
    let name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    Ok(Self { name, bytes: std::fs::read(path)? })
  }

  /// Tab for `.txt` / `.tsv`, comma otherwise.
  pub fn delimiter(&self) -> u8 {
    let lower = self.name.to_ascii_lowercase();
    if lower.ends_with(".txt") || lower.ends_with(".tsv") { b'\t' } else { b',' }
  }

  fn reader(&self, has_headers: bool) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
      .delimiter(self.delimiter())
      .has_headers(has_headers)
      .flexible(true)
      .trim(csv::Trim::All)
      .from_reader(self.bytes.as_slice())
  }

  /// The header row, trimmed.
  pub fn headers(&self) -> Result<Vec<String>> {
    header_names(&mut self.reader(true))
  }

  /// Records keyed by the header row. Invalid UTF-8 is replaced rather than
  /// rejected; older MRDS exports are Latin-1.
  pub fn records(&self) -> Result<impl Iterator<Item = Result<RawRecord>> + '_> {
    let mut reader = self.reader(true);
    let headers = header_names(&mut reader)?;
    Ok(reader.into_byte_records().map(move |row| {
      let row = row?;
      Ok(
        headers
          .iter()
          .zip(row.iter())
          .map(|(h, v)| (h.clone(), cell_text(v)))
          .collect(),
      )
    }))
  }

  /// Every row as plain cells, header included. For sources whose header is
  /// not on the first line.
  pub fn rows(&self) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    for row in self.reader(false).into_byte_records() {
      rows.push(row?.iter().map(cell_text).collect());
    }
    Ok(rows)
  }

  /// Flatten a World Bank API response (`[meta, [rows]]`, or a bare row
  /// array) into records with `country`, `countryiso3code`, `indicator`,
  /// `date` and `value` fields. A JSON `null` value becomes an empty cell.
  pub fn world_bank_records(&self) -> Result<Vec<RawRecord>> {
    let payload: Value = serde_json::from_slice(&self.bytes)?;
    let rows = match &payload {
      // `[meta, rows]`; past the last page `rows` is null.
      Value::Array(parts) if parts.first().is_some_and(|m| m.get("page").is_some()) => {
        match parts.get(1) {
          Some(Value::Array(rows)) => rows,
          _ => return Ok(Vec::new()),
        }
      }
      Value::Array(rows) => rows,
      _ => return Ok(Vec::new()),
    };

    Ok(
      rows
        .iter()
        .filter(|row| row.is_object())
        .map(|row| {
          let mut record = RawRecord::new();
          let fields = [
            ("country", &row["country"]["value"]),
            ("countryiso3code", &row["countryiso3code"]),
            ("indicator", &row["indicator"]["id"]),
            ("date", &row["date"]),
            ("value", &row["value"]),
          ];
          for (key, value) in fields {
            record.insert(key.to_owned(), json_text(value));
          }
          record
        })
        .collect(),
    )
  }
}

fn header_names(reader: &mut csv::Reader<&[u8]>) -> Result<Vec<String>> {
  Ok(
    reader
      .byte_headers()?
      .iter()
      .map(|h| cell_text(h).trim_start_matches('\u{feff}').to_owned())
      .collect(),
  )
}

fn cell_text(bytes: &[u8]) -> String {
  String::from_utf8_lossy(bytes).trim().to_owned()
}

fn json_text(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.trim().to_owned(),
    other => other.to_string(),
  }
}

// ─── Sources ─────────────────────────────────────────────────────────────────

/// The raw payload of one dataset.
#[derive(Debug, Clone)]
pub struct RawSource {
  pub origin: PathBuf,
  /// Sorted by name.
  files:      Vec<SourceFile>,
}

impl RawSource {
  /// A single-file dataset.
  pub fn file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    Ok(Self { origin: path.to_path_buf(), files: vec![SourceFile::read(path)?] })
  }

  /// An MRDS bundle directory. Each table may be `.csv` or `.txt`; the main
  /// `MRDS` table is required, the rest are optional.
  pub fn mrds_bundle(dir: impl AsRef<Path>) -> Result<Self> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
      return Err(Error::SourceMissing(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for stem in MRDS_TABLES {
      match find_table(dir, stem) {
        Some(path) => files.push(SourceFile::read(&path)?),
        None if *stem == "MRDS" => {
          return Err(Error::SourceMissing(dir.join("MRDS.txt")));
        }
        None => {}
      }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Self { origin: dir.to_path_buf(), files })
  }

  pub fn files(&self) -> &[SourceFile] { &self.files }

  /// The only file of a single-file source, or the first of a bundle.
  pub fn primary(&self) -> Option<&SourceFile> { self.files.first() }

  /// The bundle table with the given stem, whatever its extension.
  pub fn table(&self, stem: &str) -> Option<&SourceFile> {
    self.files.iter().find(|f| {
      Path::new(&f.name)
        .file_stem()
        .is_some_and(|s| s.to_string_lossy().eq_ignore_ascii_case(stem))
    })
  }
}

fn find_table(dir: &Path, stem: &str) -> Option<PathBuf> {
  ["csv", "txt"]
    .iter()
    .map(|ext| dir.join(format!("{stem}.{ext}")))
    .find(|p| p.is_file())
}
