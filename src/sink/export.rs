use crate::error::SinkError;
use crate::sink::Sink;
use crate::types::Row;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes tables to JSON Lines files, one file per table
pub struct TableExporter {
    dir: PathBuf,
}

impl TableExporter {
    /// Create the output directory if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| SinkError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(TableExporter { dir })
    }

    pub fn path_for(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", table))
    }

    /// Write `rows` to `<dir>/<table>.jsonl`, replacing any previous file.
    pub fn write_table(&self, table: &str, rows: &[Row]) -> Result<usize, SinkError> {
        let path = self.path_for(table);
        let io_err = |source| SinkError::Io {
            path: path.clone(),
            source,
        };

        let mut writer = BufWriter::new(File::create(&path).map_err(io_err)?);
        for row in rows {
            let json = serde_json::to_string(&row.values).map_err(|source| SinkError::Serialize {
                table: table.to_string(),
                source,
            })?;
            writeln!(writer, "{}", json).map_err(io_err)?;
        }
        writer.flush().map_err(io_err)?;
        Ok(rows.len())
    }

    /// Dump every table of `sink`. Returns rows written per table.
    pub fn export<S: Sink + ?Sized>(&self, sink: &S) -> Result<BTreeMap<String, usize>, SinkError> {
        let mut written = BTreeMap::new();
        for table in sink.table_names() {
            let rows = sink.select_all(&table, None, None)?;
            let count = self.write_table(&table, &rows)?;
            written.insert(table, count);
        }
        Ok(written)
    }
}
