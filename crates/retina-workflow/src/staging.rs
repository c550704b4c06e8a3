//! 影像暂存
//!
//! 推理前把影像字节写入本地临时文件。`StagedImage` 被丢弃时文件即被删除，
//! 成功、推理失败和意外错误三种退出路径都不会留下残留文件。

use std::path::{Path, PathBuf};

use retina_core::Result;
use tempfile::NamedTempFile;
use tracing::debug;

/// 暂存目录配置
#[derive(Debug, Clone, Default)]
pub struct ImageStaging {
    dir: Option<PathBuf>,
}

impl ImageStaging {
    /// 使用系统临时目录
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Some(dir.into()) }
    }

    /// 写入影像并返回作用域内有效的临时文件
    pub async fn stage(&self, bytes: &[u8]) -> Result<StagedImage> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("exam_").suffix(".png");

        let file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        tokio::fs::write(file.path(), bytes).await?;
        debug!("Staged {} image bytes at {}", bytes.len(), file.path().display());

        Ok(StagedImage { file })
    }
}

/// 暂存中的影像文件
#[derive(Debug)]
pub struct StagedImage {
    file: NamedTempFile,
}

impl StagedImage {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// 立即删除文件，删除失败时返回错误
    pub fn release(self) -> Result<()> {
        let path = self.file.path().to_path_buf();
        self.file.close()?;
        debug!("Released staged image {}", path.display());
        Ok(())
    }
}
