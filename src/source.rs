//! Wine source catalog: CSV ingestion and the sorted binary pre-pass
//!
//! The engine never scans the CSV at query time. A build pre-pass parses
//! and validates the rows, sorts them by harvest year, and writes a
//! fixed-width binary file; `lookup_by_harvest_year` then binary-searches
//! that file by seeking, without holding the dataset in memory.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use csv::ReaderBuilder;
use log::info;
use thiserror::Error;

use crate::heap::{HeapError, WineKind, WineRecord};

/// Longest label storable in a fixed-width catalog row
pub const MAX_LABEL_BYTES: usize = 120;

/// wine_id (4) + harvest_year (4) + kind (1) + label length (2) + label
const ROW_WIDTH: usize = 11 + MAX_LABEL_BYTES;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("source row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },

    #[error("invalid record: {0}")]
    Record(#[from] HeapError),

    #[error("catalog row {0} is corrupt")]
    CorruptRow(u64),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Sorted fixed-width view of the wine source data
pub struct SourceCatalog {
    file: File,
    record_count: u64,
}

impl SourceCatalog {
    /// Parse `csv_path`, sort the wines by harvest year, and write the
    /// binary catalog at `bin_path`
    pub fn build(csv_path: &Path, bin_path: &Path) -> SourceResult<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(csv_path)?;

        let mut wines = Vec::new();
        for (i, result) in reader.records().enumerate() {
            let row = result?;
            // header is row 0 in the file, data rows start at 2 for diagnostics
            let row_number = i + 2;

            if row.len() < 4 {
                return Err(SourceError::InvalidRow {
                    row: row_number,
                    reason: format!("expected 4 fields, got {}", row.len()),
                });
            }

            let wine_id = row[0].trim().parse::<i32>().map_err(|e| {
                SourceError::InvalidRow {
                    row: row_number,
                    reason: format!("vinho_id {:?} invalid: {}", &row[0], e),
                }
            })?;
            let label = row[1].trim().to_string();
            let harvest_year = row[2].trim().parse::<i32>().map_err(|e| {
                SourceError::InvalidRow {
                    row: row_number,
                    reason: format!("ano_colheita {:?} invalid: {}", &row[2], e),
                }
            })?;
            let kind = WineKind::from_tipo(&row[3]).ok_or_else(|| SourceError::InvalidRow {
                row: row_number,
                reason: format!("tipo {:?} is not tinto/branco/rose", &row[3]),
            })?;

            if label.len() > MAX_LABEL_BYTES {
                return Err(SourceError::InvalidRow {
                    row: row_number,
                    reason: format!(
                        "rotulo is {} bytes, catalog rows hold at most {}",
                        label.len(),
                        MAX_LABEL_BYTES
                    ),
                });
            }

            let wine = WineRecord::new(wine_id, label, harvest_year, kind).map_err(|e| {
                SourceError::InvalidRow {
                    row: row_number,
                    reason: e.to_string(),
                }
            })?;
            wines.push(wine);
        }

        // stable sort keeps CSV order within a year
        wines.sort_by_key(|w| w.harvest_year);

        if let Some(parent) = bin_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(bin_path)?;

        let mut row = [0u8; ROW_WIDTH];
        for wine in &wines {
            encode_row(wine, &mut row);
            file.write_all(&row)?;
        }
        file.sync_data()?;

        info!(
            "built source catalog {} ({} wines)",
            bin_path.display(),
            wines.len()
        );
        Ok(Self {
            file,
            record_count: wines.len() as u64,
        })
    }

    /// Number of wines in the catalog
    pub fn len(&self) -> u64 {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// All wines whose harvest year equals `year`, in catalog order
    pub fn lookup_by_harvest_year(&mut self, year: i32) -> SourceResult<Vec<WineRecord>> {
        // lower bound over the year-sorted rows
        let mut lo = 0u64;
        let mut hi = self.record_count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.year_at(mid)? < year {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        let mut out = Vec::new();
        let mut idx = lo;
        while idx < self.record_count {
            let wine = self.row_at(idx)?;
            if wine.harvest_year != year {
                break;
            }
            out.push(wine);
            idx += 1;
        }
        Ok(out)
    }

    fn year_at(&mut self, idx: u64) -> SourceResult<i32> {
        self.file
            .seek(SeekFrom::Start(idx * ROW_WIDTH as u64 + 4))?;
        let mut buf = [0u8; 4];
        self.file.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn row_at(&mut self, idx: u64) -> SourceResult<WineRecord> {
        self.file.seek(SeekFrom::Start(idx * ROW_WIDTH as u64))?;
        let mut buf = [0u8; ROW_WIDTH];
        self.file.read_exact(&mut buf)?;
        decode_row(&buf).ok_or(SourceError::CorruptRow(idx))
    }
}

fn encode_row(wine: &WineRecord, row: &mut [u8; ROW_WIDTH]) {
    row.fill(0);
    row[0..4].copy_from_slice(&wine.wine_id.to_le_bytes());
    row[4..8].copy_from_slice(&wine.harvest_year.to_le_bytes());
    row[8] = wine.kind.as_u8();
    row[9..11].copy_from_slice(&(wine.label.len() as u16).to_le_bytes());
    row[11..11 + wine.label.len()].copy_from_slice(wine.label.as_bytes());
}

fn decode_row(row: &[u8; ROW_WIDTH]) -> Option<WineRecord> {
    let wine_id = i32::from_le_bytes([row[0], row[1], row[2], row[3]]);
    let harvest_year = i32::from_le_bytes([row[4], row[5], row[6], row[7]]);
    let kind = WineKind::from_u8(row[8])?;
    let label_len = u16::from_le_bytes([row[9], row[10]]) as usize;
    if label_len > MAX_LABEL_BYTES {
        return None;
    }
    let label = std::str::from_utf8(&row[11..11 + label_len]).ok()?.to_string();
    WineRecord::new(wine_id, label, harvest_year, kind).ok()
}
