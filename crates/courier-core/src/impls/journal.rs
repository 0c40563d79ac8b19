//! Append-only JSON-lines journal.
//!
//! 1 行 = 1 エントリ（`{"op":"put","record":{..}}` / `{"op":"remove","key":..}`）。
//! - append は write → flush → sync_data まで済ませてから返る
//! - open 時に全行を replay する。末尾の改行なし行（append 途中のクラッシュ）は捨てる
//! - 途中の行が壊れている場合はエラー（黙って読み飛ばさない）
//! - rewrite は一時ファイルに書いてから rename で差し替える（compaction 用）

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::domain::CourierError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalEntry<K, V> {
    Put { record: V },
    Remove { key: K },
}

pub struct FileJournal<K, V> {
    path: PathBuf,
    file: File,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> FileJournal<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    /// Open (or create) the journal and return every entry in it, oldest first.
    pub async fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<JournalEntry<K, V>>), CourierError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let contents = read_if_exists(&path).await?;
        let (entries, valid_len) = Self::replay(&path, &contents)?;
        if valid_len < contents.len() {
            warn!(
                path = %path.display(),
                dropped_bytes = contents.len() - valid_len,
                "journal ends with a torn line, truncating"
            );
            let file = OpenOptions::new().write(true).open(&path).await?;
            file.set_len(valid_len as u64).await?;
            file.sync_data().await?;
        }

        let file = Self::open_append(&path).await?;
        debug!(path = %path.display(), entries = entries.len(), "journal opened");

        Ok((
            Self {
                path,
                file,
                _marker: PhantomData,
            },
            entries,
        ))
    }

    /// Read every complete entry without creating, truncating or locking anything.
    ///
    /// A torn tail is skipped; a missing file reads as empty.
    pub async fn read_entries(path: impl AsRef<Path>) -> Result<Vec<JournalEntry<K, V>>, CourierError> {
        let path = path.as_ref();
        let contents = read_if_exists(path).await?;
        let (entries, _) = Self::replay(path, &contents)?;
        Ok(entries)
    }

    fn replay(path: &Path, contents: &[u8]) -> Result<(Vec<JournalEntry<K, V>>, usize), CourierError> {
        let mut entries = Vec::new();
        let mut offset = 0;
        let mut line_no = 0;

        while offset < contents.len() {
            let Some(end) = contents[offset..].iter().position(|b| *b == b'\n') else {
                // 改行で終わっていない = sync 前に落ちた書き込み
                break;
            };
            line_no += 1;
            let line = &contents[offset..offset + end];
            if !line.iter().all(u8::is_ascii_whitespace) {
                let entry = serde_json::from_slice(line).map_err(|e| {
                    CourierError::Storage(format!(
                        "corrupt journal {} at line {line_no}: {e}",
                        path.display()
                    ))
                })?;
                entries.push(entry);
            }
            offset += end + 1;
        }

        Ok((entries, offset))
    }

    async fn open_append(path: &Path) -> Result<File, CourierError> {
        Ok(OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably append one `put` line per record.
    pub async fn append_puts<'a, I>(&mut self, records: I) -> Result<(), CourierError>
    where
        I: IntoIterator<Item = &'a V>,
        V: 'a,
    {
        let mut buf = Vec::new();
        for record in records {
            encode_line(&mut buf, &JournalEntry::<&K, &V>::Put { record })?;
        }
        self.write_synced(&buf).await
    }

    pub async fn append_remove(&mut self, key: &K) -> Result<(), CourierError> {
        let mut buf = Vec::new();
        encode_line(&mut buf, &JournalEntry::<&K, &V>::Remove { key })?;
        self.write_synced(&buf).await
    }

    /// Replace the whole journal with one `put` line per live record.
    pub async fn rewrite<'a, I>(&mut self, records: I) -> Result<(), CourierError>
    where
        I: IntoIterator<Item = &'a V>,
        V: 'a,
    {
        self.rewrite_with_tombstones(records, &[]).await
    }

    /// Like [`rewrite`](Self::rewrite), followed by a `remove` line per tombstone.
    pub async fn rewrite_with_tombstones<'a, I>(
        &mut self,
        records: I,
        tombstones: &[K],
    ) -> Result<(), CourierError>
    where
        I: IntoIterator<Item = &'a V>,
        V: 'a,
    {
        let mut buf = Vec::new();
        let mut count = 0usize;
        for record in records {
            encode_line(&mut buf, &JournalEntry::<&K, &V>::Put { record })?;
            count += 1;
        }
        for key in tombstones {
            encode_line(&mut buf, &JournalEntry::<&K, &V>::Remove { key })?;
        }

        let tmp_path = self.path.with_extension("compact");
        let mut tmp = File::create(&tmp_path).await?;
        tmp.write_all(&buf).await?;
        tmp.flush().await?;
        tmp.sync_all().await?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path).await?;
        self.file = Self::open_append(&self.path).await?;
        debug!(path = %self.path.display(), records = count, "journal compacted");
        Ok(())
    }

    async fn write_synced(&mut self, buf: &[u8]) -> Result<(), CourierError> {
        if buf.is_empty() {
            return Ok(());
        }
        self.file.write_all(buf).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }
}

async fn read_if_exists(path: &Path) -> Result<Vec<u8>, CourierError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn encode_line<T: Serialize>(buf: &mut Vec<u8>, entry: &T) -> Result<(), CourierError> {
    serde_json::to_writer(&mut *buf, entry)?;
    buf.push(b'\n');
    Ok(())
}
