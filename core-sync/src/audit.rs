//! # Audit Buffer
//!
//! Collects one record per transferred chunk and writes them out as JSON
//! batch files under `{json_root}/{job_id}/{unix_nanos}.json`.
//!
//! The buffer flushes on its own once the serialized records exceed the
//! configured size; the orchestrator forces a final flush at the end of
//! every run, which writes `[]` when nothing was transferred.

use crate::job::JobId;
use crate::work_item::WorkItem;
use crate::Result;
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// One transferred chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub job_id: String,
    pub object_key: String,
    pub size: u64,
    /// Checkpoint after this chunk
    pub last_position: u64,
    /// Chunk contents as an escaped byte string (`b"ok\xff"`); every byte
    /// is recoverable, printable ASCII stays readable
    pub fetch_data: String,
}

impl AuditRecord {
    pub fn for_chunk(item: &WorkItem, data: &[u8]) -> Self {
        Self {
            job_id: item.job_id.to_string(),
            object_key: item.object_key.clone(),
            size: item.object_size,
            last_position: item.last_position,
            fetch_data: format!("{:?}", Bytes::copy_from_slice(data)),
        }
    }
}

pub struct AuditBuffer {
    job_id: JobId,
    json_root: PathBuf,
    max_json_size: usize,
    fs: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    records: Vec<AuditRecord>,
    /// Length of `records` serialized as a compact JSON array
    json_len: usize,
    last_file_nanos: Option<i64>,
}

impl AuditBuffer {
    pub fn new(
        job_id: JobId,
        json_root: impl Into<PathBuf>,
        max_json_size: usize,
        fs: Arc<dyn FileSystemAccess>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            job_id,
            json_root: json_root.into(),
            max_json_size,
            fs,
            clock,
            records: Vec::new(),
            json_len: 2,
            last_file_nanos: None,
        }
    }

    pub fn push(&mut self, record: AuditRecord) -> Result<()> {
        let record_len = serde_json::to_vec(&record)?.len();
        let separator = usize::from(!self.records.is_empty());
        self.json_len += record_len + separator;
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialized size of the buffered records as a compact JSON array.
    pub fn json_len(&self) -> usize {
        self.json_len
    }

    /// Write the buffer if it grew past the size threshold.
    pub async fn flush_if_needed(&mut self) -> Result<Option<PathBuf>> {
        if self.json_len > self.max_json_size {
            self.write_batch().await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Write the buffer unconditionally, even when empty.
    pub async fn flush_all(&mut self) -> Result<PathBuf> {
        self.write_batch().await
    }

    fn next_file_nanos(&mut self) -> i64 {
        let now = self.clock.unix_timestamp_nanos();
        let nanos = match self.last_file_nanos {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last_file_nanos = Some(nanos);
        nanos
    }

    async fn write_batch(&mut self) -> Result<PathBuf> {
        let nanos = self.next_file_nanos();
        let path = self
            .json_root
            .join(self.job_id.to_string())
            .join(format!("{}.json", nanos));

        let payload = serde_json::to_vec_pretty(&self.records)?;
        self.fs.write_file(&path, Bytes::from(payload)).await?;

        info!(
            job_id = %self.job_id,
            records = self.records.len(),
            path = %path.display(),
            "Flushed audit batch"
        );

        self.records.clear();
        self.json_len = 2;
        debug!(job_id = %self.job_id, "Audit buffer reset");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::TokioFileSystem;
    use bridge_traits::time::FixedClock;

    fn buffer(root: &std::path::Path, max_json_size: usize) -> (AuditBuffer, JobId) {
        let job_id = JobId::new();
        let buffer = AuditBuffer::new(
            job_id,
            root,
            max_json_size,
            Arc::new(TokioFileSystem::new().with_durable_appends(false)),
            Arc::new(FixedClock::at_unix(1_700_000_000)),
        );
        (buffer, job_id)
    }

    fn record(job_id: JobId, data: &[u8]) -> AuditRecord {
        let mut item = WorkItem::discovered(job_id, "photos/a.jpg", 100, 0);
        item.advance(data.len() as u64, 0);
        AuditRecord::for_chunk(&item, data)
    }

    /// Inverse of the `Bytes` debug rendering stored in `fetch_data`.
    fn unescape(rendered: &str) -> Vec<u8> {
        let body = rendered
            .strip_prefix("b\"")
            .and_then(|s| s.strip_suffix('"'))
            .unwrap();
        let mut out = Vec::new();
        let mut chars = body.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c as u8);
                continue;
            }
            match chars.next().unwrap() {
                'n' => out.push(b'\n'),
                'r' => out.push(b'\r'),
                't' => out.push(b'\t'),
                '0' => out.push(0),
                'x' => {
                    let hex: String = chars.by_ref().take(2).collect();
                    out.push(u8::from_str_radix(&hex, 16).unwrap());
                }
                other => out.push(other as u8),
            }
        }
        out
    }

    #[test]
    fn test_record_escapes_non_utf8_bytes() {
        let item = WorkItem::discovered(JobId::new(), "a.bin", 3, 0);
        let record = AuditRecord::for_chunk(&item, &[b'o', 0xff, b'k']);
        assert_eq!(record.fetch_data, "b\"o\\xffk\"");
        assert_eq!(record.size, 3);
    }

    #[test]
    fn test_binary_chunk_survives_audit_encoding() {
        let item = WorkItem::discovered(JobId::new(), "blob.bin", 4, 0);
        let chunk = [0xff, 0xfe, 0x00, 0x89];
        let record = AuditRecord::for_chunk(&item, &chunk);
        assert_eq!(unescape(&record.fetch_data), chunk);

        let all_bytes: Vec<u8> = (0..=255u8).collect();
        let record = AuditRecord::for_chunk(&item, &all_bytes);
        let json = serde_json::to_string(&record).unwrap();
        let parsed: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(unescape(&parsed.fetch_data), all_bytes);
    }

    #[tokio::test]
    async fn test_json_len_matches_compact_serialization() {
        let dir = tempfile::tempdir().unwrap();
        let (mut buffer, job_id) = buffer(dir.path(), usize::MAX);

        buffer.push(record(job_id, b"hello")).unwrap();
        buffer.push(record(job_id, b"world")).unwrap();

        let expected = serde_json::to_vec(&buffer.records).unwrap().len();
        assert_eq!(buffer.json_len(), expected);
    }

    #[tokio::test]
    async fn test_flush_if_needed_respects_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let (mut buffer, job_id) = buffer(dir.path(), 200);

        buffer.push(record(job_id, b"small")).unwrap();
        assert!(buffer.flush_if_needed().await.unwrap().is_none());
        assert_eq!(buffer.len(), 1);

        buffer.push(record(job_id, &[b'x'; 200])).unwrap();
        let path = buffer.flush_if_needed().await.unwrap().unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.json_len(), 2);

        let written: Vec<AuditRecord> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].fetch_data, "b\"small\"");
        assert!(path.starts_with(dir.path().join(job_id.to_string())));
    }

    #[tokio::test]
    async fn test_consecutive_forced_flushes_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let (mut buffer, job_id) = buffer(dir.path(), usize::MAX);

        buffer.push(record(job_id, b"chunk")).unwrap();
        let first = buffer.flush_all().await.unwrap();
        let second = buffer.flush_all().await.unwrap();

        assert_ne!(first, second);
        assert!(first.file_stem() < second.file_stem());

        let first: Vec<AuditRecord> =
            serde_json::from_slice(&std::fs::read(&first).unwrap()).unwrap();
        let second: Vec<AuditRecord> =
            serde_json::from_slice(&std::fs::read(&second).unwrap()).unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_empty_flush_writes_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let (mut buffer, _) = buffer(dir.path(), 10);

        let path = buffer.flush_all().await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), "[]");
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("{}.json", 1_700_000_000i64 * 1_000_000_000)
        );
    }
}
