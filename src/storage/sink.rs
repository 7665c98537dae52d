use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, warn};

use crate::error::SinkError;
use crate::models::ListingRecord;

/// Append-only JSON Lines output, one [`ListingRecord`] per line.
pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<File>,
    pending: usize,
}

impl JsonlSink {
    /// Opens `path` for appending, creating it and its parent directory.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| SinkError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            pending: 0,
        })
    }

    /// Buffers one record. Nothing is durable until [`JsonlSink::commit`].
    pub async fn append_record(&mut self, record: &ListingRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record).map_err(|source| SinkError::Serialize {
            listing_id: record.listing_id.clone(),
            source,
        })?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .map_err(|source| SinkError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.pending += 1;
        Ok(())
    }

    /// Flushes buffered records and syncs them to disk.
    pub async fn commit(&mut self) -> Result<usize, SinkError> {
        let io_err = |source| SinkError::Io {
            path: self.path.clone(),
            source,
        };
        self.writer.flush().await.map_err(io_err)?;
        self.writer.get_ref().sync_data().await.map_err(io_err)?;

        let committed = std::mem::take(&mut self.pending);
        debug!(path = %self.path.display(), committed, "output committed");
        Ok(committed)
    }
}

#[derive(Deserialize)]
struct IdOnly {
    listing_id: String,
}

/// Reads the listing ids already present in an output file.
///
/// A missing file yields an empty set. A torn last line (crash mid-write) is
/// skipped with a warning rather than failing the resume.
pub async fn load_emitted_ids(path: impl AsRef<Path>) -> Result<HashSet<String>, SinkError> {
    let path = path.as_ref();
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(source) => {
            return Err(SinkError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut ids = HashSet::new();
    let mut lines = BufReader::new(file).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.map_err(|source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    })? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<IdOnly>(&line) {
            Ok(row) => {
                ids.insert(row.listing_id);
            }
            Err(e) => warn!(path = %path.display(), line = line_no, error = %e, "skipping unreadable output line"),
        }
    }
    Ok(ids)
}
