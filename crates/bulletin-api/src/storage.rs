use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

/// On-disk storage for announcement attachments.
///
/// Files land at `{dir}/announcements/{uuid-hex}{ext}`; only the URL path is
/// recorded on the announcement row, never the bytes.
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Upload directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Write attachment bytes under a random name, keeping the extension of
    /// the uploaded filename. Returns the URL path to store on the row.
    pub async fn save_attachment(&self, original_name: Option<&str>, bytes: &[u8]) -> Result<String> {
        let ext = original_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let filename = format!("{}{}", Uuid::new_v4().simple(), ext);
        let folder = self.dir.join("announcements");
        fs::create_dir_all(&folder).await?;

        let mut file = fs::File::create(folder.join(&filename)).await?;
        file.write_all(bytes).await?;

        Ok(format!("/uploads/announcements/{filename}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attachment_keeps_extension_and_hides_original_name() {
        let dir = std::env::temp_dir().join(format!("bulletin-test-{}", Uuid::new_v4()));
        let storage = Storage::new(dir.clone()).await.unwrap();

        let url = storage.save_attachment(Some("timetable.pdf"), b"%PDF-").await.unwrap();
        assert!(url.starts_with("/uploads/announcements/"));
        assert!(url.ends_with(".pdf"));
        assert!(!url.contains("timetable"));

        let on_disk = dir.join("announcements").join(url.rsplit('/').next().unwrap());
        assert_eq!(fs::read(on_disk).await.unwrap(), b"%PDF-");

        fs::remove_dir_all(dir).await.unwrap();
    }

    #[tokio::test]
    async fn attachment_without_extension() {
        let dir = std::env::temp_dir().join(format!("bulletin-test-{}", Uuid::new_v4()));
        let storage = Storage::new(dir.clone()).await.unwrap();

        let url = storage.save_attachment(None, b"data").await.unwrap();
        assert!(!url.contains('.'));

        fs::remove_dir_all(dir).await.unwrap();
    }
}
