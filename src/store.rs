use std::{
    io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

const AUDIO_EXTENSION: &str = "mp3";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Audio file not found")]
    NotFound,
    #[error("audio store I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Directory holding generated audio between creation and cleanup.
///
/// Files are named `<uuid>.mp3`; names are never reused.
#[derive(Clone, Debug)]
pub struct AudioStore {
    dir: PathBuf,
}

impl AudioStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Opens the store, creating the directory when missing.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(dir);
        tokio::fs::create_dir_all(&store.dir).await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `audio` under a fresh name and returns that name.
    pub async fn save(&self, audio: &[u8]) -> Result<String, StoreError> {
        let filename = format!("{}.{AUDIO_EXTENSION}", uuid::Uuid::new_v4());
        tokio::fs::write(self.dir.join(&filename), audio).await?;
        log::info!("Audio file saved: {filename}");
        Ok(filename)
    }

    /// Resolves a name handed out by [`AudioStore::save`] to an existing file.
    pub async fn locate(&self, filename: &str) -> Result<PathBuf, StoreError> {
        if !is_audio_name(filename) {
            return Err(StoreError::NotFound);
        }
        let path = self.dir.join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(StoreError::NotFound),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes every audio file in the store.
    ///
    /// Best-effort: failures are logged and skipped. Returns how many files
    /// were removed.
    pub async fn clear(&self) -> usize {
        self.remove_matching(|_| true).await
    }

    /// Deletes audio files last modified more than `ttl` ago.
    pub async fn evict_older_than(&self, ttl: Duration) -> usize {
        let now = SystemTime::now();
        self.remove_matching(|modified| {
            modified
                .and_then(|m| now.duration_since(m).ok())
                .is_some_and(|age| age > ttl)
        })
        .await
    }

    async fn remove_matching(&self, expired: impl Fn(Option<SystemTime>) -> bool) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Cannot list audio store {}: {e}", self.dir.display());
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Cannot list audio store {}: {e}", self.dir.display());
                    break;
                }
            };

            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(AUDIO_EXTENSION) {
                continue;
            }
            let modified = entry.metadata().await.and_then(|m| m.modified()).ok();
            if !expired(modified) {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    log::info!("Cleaned up old file: {}", path.display());
                    removed += 1;
                }
                Err(e) => log::warn!("Failed to remove {}: {e}", path.display()),
            }
        }
        removed
    }
}

/// Only bare `*.mp3` names are served; anything that could leave the store
/// directory is treated as absent.
fn is_audio_name(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains(['/', '\\'])
        && !filename.contains("..")
        && Path::new(filename).extension().and_then(|e| e.to_str()) == Some(AUDIO_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_names() {
        assert!(is_audio_name("0b9c6f2e-8f4e-4d7c-9a51-1d2f3e4a5b6c.mp3"));
        assert!(!is_audio_name("../secret.mp3"));
        assert!(!is_audio_name("nested/file.mp3"));
        assert!(!is_audio_name("notes.txt"));
        assert!(!is_audio_name(""));
    }

    #[tokio::test]
    async fn saved_files_have_distinct_names_and_can_be_located() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).await.unwrap();

        let a = store.save(b"first").await.unwrap();
        let b = store.save(b"second").await.unwrap();
        assert_ne!(a, b);
        assert!(a.ends_with(".mp3"));

        let path = store.locate(&a).await.unwrap();
        assert_eq!(tokio::fs::read(path).await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn unknown_names_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).await.unwrap();
        assert!(matches!(
            store.locate("missing.mp3").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.locate("../Cargo.toml").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn clear_only_touches_audio_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).await.unwrap();
        let saved = store.save(b"audio").await.unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"text").unwrap();

        assert_eq!(store.clear().await, 1);
        assert!(matches!(store.locate(&saved).await, Err(StoreError::NotFound)));
        assert!(dir.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn eviction_spares_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::open(dir.path()).await.unwrap();
        let saved = store.save(b"audio").await.unwrap();

        assert_eq!(store.evict_older_than(Duration::from_secs(3600)).await, 0);
        assert!(store.locate(&saved).await.is_ok());

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.evict_older_than(Duration::from_millis(1)).await, 1);
        assert!(store.locate(&saved).await.is_err());
    }

    #[tokio::test]
    async fn clear_on_missing_directory_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::new(dir.path().join("gone"));
        assert_eq!(store.clear().await, 0);
    }
}
