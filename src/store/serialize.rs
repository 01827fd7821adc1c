//! Persisting the record store.
//!
//! One document per session, written exactly once at session end. The write
//! goes through a temp file in the destination directory and is renamed into
//! place, so a crash mid-write never leaves a truncated record file behind.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::Result;
use crate::store::RecordStore;

pub fn save_store(store: &RecordStore, path: &Path) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer(&mut writer, store)?;
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn load_store(path: &Path) -> Result<RecordStore> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let store = serde_json::from_reader(reader)?;
    Ok(store)
}
