//! Disk spill for output histories under a memory budget.
//!
//! When an output's in-memory history exceeds its byte budget, the oldest
//! still-required entries are spooled to a scratch file and read back on
//! pull. Only the payload goes to disk — grid, units, and timestamp stay
//! in the in-memory handle. The format is private: little-endian f64s
//! behind a u32 length word, one record per spilled entry. The scratch
//! file is a `NamedTempFile`, so teardown removes it automatically.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use confluence_core::{DataError, Envelope, GridSpec, Time, Units};

/// In-memory handle to one spilled history entry.
#[derive(Debug)]
pub(crate) struct SpillHandle {
    pub(crate) time: Time,
    grid: GridSpec,
    units: Units,
    offset: u64,
    len: u32,
}

/// Append-only scratch file for one output slot.
pub(crate) struct SpillStore {
    file: NamedTempFile,
    cursor: u64,
}

impl SpillStore {
    /// Create the scratch file in the configured spill directory.
    pub(crate) fn create(dir: &Path) -> Result<Self, DataError> {
        let file = NamedTempFile::new_in(dir).map_err(|e| DataError::Spill {
            reason: format!("cannot create scratch file in {}: {e}", dir.display()),
        })?;
        Ok(Self { file, cursor: 0 })
    }

    /// Spill an envelope's payload, returning the handle to restore it.
    pub(crate) fn append(&mut self, env: &Envelope) -> Result<SpillHandle, DataError> {
        let values = env.values();
        let len = u32::try_from(values.len()).map_err(|_| DataError::Spill {
            reason: format!("payload of {} values exceeds spill record size", values.len()),
        })?;

        let offset = self.cursor;
        let file = self.file.as_file_mut();
        file.seek(SeekFrom::Start(offset)).map_err(spill_io)?;
        file.write_all(&len.to_le_bytes()).map_err(spill_io)?;
        for v in values {
            file.write_all(&v.to_le_bytes()).map_err(spill_io)?;
        }
        self.cursor = offset + 4 + values.len() as u64 * 8;

        Ok(SpillHandle {
            time: env.time(),
            grid: env.grid().clone(),
            units: env.units().clone(),
            offset,
            len,
        })
    }

    /// Read a spilled entry back into an envelope.
    pub(crate) fn restore(&mut self, handle: &SpillHandle) -> Result<Envelope, DataError> {
        let file = self.file.as_file_mut();
        file.seek(SeekFrom::Start(handle.offset)).map_err(spill_io)?;

        let mut word = [0u8; 4];
        file.read_exact(&mut word).map_err(spill_io)?;
        let len = u32::from_le_bytes(word);
        if len != handle.len {
            return Err(DataError::Spill {
                reason: format!(
                    "scratch record length {len} does not match handle length {}",
                    handle.len
                ),
            });
        }

        let mut values = Vec::with_capacity(len as usize);
        let mut buf = [0u8; 8];
        for _ in 0..len {
            file.read_exact(&mut buf).map_err(spill_io)?;
            values.push(f64::from_le_bytes(buf));
        }

        Ok(Envelope::from_parts(
            values.into(),
            handle.grid.clone(),
            handle.units.clone(),
            handle.time,
        ))
    }
}

fn spill_io(e: std::io::Error) -> DataError {
    DataError::Spill {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use confluence_core::Info;

    fn t0() -> Time {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn envelope(values: Vec<f64>) -> Envelope {
        let info = Info::new()
            .with_grid(GridSpec::NoGrid { ndims: 1 })
            .with_units(Units::dimensionless());
        Envelope::prepare(values, &info, t0()).unwrap()
    }

    #[test]
    fn spill_and_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SpillStore::create(dir.path()).unwrap();

        let a = envelope(vec![1.0, 2.0, 3.0]);
        let b = envelope(vec![4.0, 5.0]);
        let ha = store.append(&a).unwrap();
        let hb = store.append(&b).unwrap();

        // Out-of-order restore is fine; records carry offsets.
        let rb = store.restore(&hb).unwrap();
        let ra = store.restore(&ha).unwrap();
        assert_eq!(ra.values(), a.values());
        assert_eq!(rb.values(), b.values());
        assert_eq!(ra.time(), a.time());
        assert_eq!(ra.units(), a.units());
    }

    #[test]
    fn scratch_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpillStore::create(dir.path()).unwrap();
        let path = store.file.path().to_path_buf();
        assert!(path.exists());
        drop(store);
        assert!(!path.exists());
    }
}
