//! [`RestartLog`]: an append-only, checksum-framed persistent log of
//! completed evaluations, replayed into the cache at startup.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crc32fast::Hasher as Crc32;
use parking_lot::Mutex;

use crate::error::{DakotaError, DakotaResult};
use crate::pair::ParameterResponsePair;

/// Current restart file format version. A file whose header does not
/// match is rejected outright rather than silently reinterpreted.
const RESTART_VERSION: u16 = 1;

/// When buffered writes are flushed to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
  /// Flush after every appended record.
  PerRecord,
  /// Flush once per caller-defined iteration (see [`RestartLog::end_iteration`]).
  PerIteration,
  /// Flush only when the log is explicitly closed.
  OnExit,
}

/// Append-only persisted log of completed [`ParameterResponsePair`]s.
pub struct RestartLog {
  writer: Mutex<BufWriter<File>>,
  policy: FlushPolicy,
}

impl RestartLog {
  /// Creates a new restart file at `path`, truncating any existing
  /// content, and writes the version header.
  pub fn create(path: impl AsRef<Path>, policy: FlushPolicy) -> DakotaResult<Self> {
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    file.write_all(&RESTART_VERSION.to_le_bytes())?;
    file.flush()?;
    Ok(RestartLog { writer: Mutex::new(BufWriter::new(file)), policy })
  }

  /// Opens `path` for appending, reading back every valid record into the
  /// returned vector (restart replay) before handing back a log ready to
  /// accept new records. A truncated final record is discarded silently;
  /// any earlier record that fails to parse is a fatal [`DakotaError::CacheCorrupt`].
  pub fn open_and_replay(
    path: impl AsRef<Path>,
    policy: FlushPolicy,
  ) -> DakotaResult<(Self, Vec<ParameterResponsePair>)> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let mut version_bytes = [0u8; 2];
    reader.read_exact(&mut version_bytes).map_err(|_| {
      DakotaError::CacheCorrupt("restart file missing version header".to_string())
    })?;
    let version = u16::from_le_bytes(version_bytes);
    if version != RESTART_VERSION {
      return Err(DakotaError::CacheCorrupt(format!(
        "restart file version {version} does not match supported version {RESTART_VERSION}"
      )));
    }

    let mut pairs = Vec::new();
    let mut consumed: u64 = 2;
    loop {
      let mut len_buf = [0u8; 4];
      match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
        Err(e) => return Err(e.into()),
      }
      let mut crc_buf = [0u8; 4];
      if reader.read_exact(&mut crc_buf).is_err() {
        break; // truncated tail: discard
      }
      let len = u32::from_le_bytes(len_buf) as usize;
      let expected_crc = u32::from_le_bytes(crc_buf);

      let mut payload = vec![0u8; len];
      if reader.read_exact(&mut payload).is_err() {
        break; // truncated tail: discard
      }

      let mut hasher = Crc32::new();
      hasher.update(&payload);
      let actual_crc = hasher.finalize();
      if actual_crc != expected_crc {
        return Err(DakotaError::CacheCorrupt(format!(
          "checksum mismatch at offset {consumed}"
        )));
      }

      let pair: ParameterResponsePair = bincode::deserialize(&payload)?;
      pairs.push(pair);
      consumed += 8 + len as u64;
    }

    // Reopen for append, positioned after the last fully-parsed record so
    // a truncated tail is overwritten rather than left dangling.
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(consumed))?;
    file.set_len(consumed)?;

    Ok((RestartLog { writer: Mutex::new(BufWriter::new(file)), policy }, pairs))
  }

  /// Appends one completed pair to the log, flushing immediately if the
  /// policy is [`FlushPolicy::PerRecord`].
  pub fn append(&self, pair: &ParameterResponsePair) -> DakotaResult<()> {
    let payload = bincode::serialize(pair)?;
    let mut hasher = Crc32::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let mut writer = self.writer.lock();
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&crc.to_le_bytes())?;
    writer.write_all(&payload)?;
    if self.policy == FlushPolicy::PerRecord {
      writer.flush()?;
    }
    Ok(())
  }

  /// Signals the end of one iteration; flushes if the policy is
  /// [`FlushPolicy::PerIteration`].
  pub fn end_iteration(&self) -> DakotaResult<()> {
    if self.policy == FlushPolicy::PerIteration {
      self.writer.lock().flush()?;
    }
    Ok(())
  }

  /// Flushes unconditionally, for use on process exit.
  pub fn close(&self) -> DakotaResult<()> {
    self.writer.lock().flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pair::{PairOrigin, VariablesSnapshot};
  use crate::response::{ActiveSet, AsvRequest, ComponentKind, Response};
  use crate::variables::Value;

  fn sample_pair(x: f64) -> ParameterResponsePair {
    let vars = VariablesSnapshot::from_values(&[Value::Real(x)]);
    let asv = ActiveSet::new(vec![AsvRequest::value_only()]);
    let mut resp = Response::empty(vec![ComponentKind::Objective], 1);
    resp.set_value(0, x);
    ParameterResponsePair::new("sim", vars, &asv, &resp, PairOrigin::Live)
  }

  #[test]
  fn test_duplicate_detection_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("restart.bin");

    {
      let log = RestartLog::create(&path, FlushPolicy::PerRecord).unwrap();
      log.append(&sample_pair(0.5)).unwrap();
      log.close().unwrap();
    }

    let (_log, pairs) = RestartLog::open_and_replay(&path, FlushPolicy::PerRecord).unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].response().value(0), Some(0.5));
  }

  #[test]
  fn test_truncated_final_record_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("restart.bin");

    {
      let log = RestartLog::create(&path, FlushPolicy::PerRecord).unwrap();
      log.append(&sample_pair(1.0)).unwrap();
      log.append(&sample_pair(2.0)).unwrap();
      log.close().unwrap();
    }

    // truncate the file mid-way through the last record
    let len = std::fs::metadata(&path).unwrap().len();
    let f = OpenOptions::new().write(true).open(&path).unwrap();
    f.set_len(len - 3).unwrap();

    let (_log, pairs) = RestartLog::open_and_replay(&path, FlushPolicy::PerRecord).unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].response().value(0), Some(1.0));
  }

  #[test]
  fn test_mismatched_version_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("restart.bin");
    std::fs::write(&path, (RESTART_VERSION + 1).to_le_bytes()).unwrap();
    assert!(RestartLog::open_and_replay(&path, FlushPolicy::PerRecord).is_err());
  }
}
