/// 基于文件系统的默认读写实现
use log::{debug, info};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

use super::traits::{DocumentReader, DocumentWriter};
use crate::codec::{self, LoadOptions};
use crate::model::Document;
use crate::utils::{create_backup, CodecError};

/// 默认读取器（内存映射）
#[derive(Debug, Clone, Default)]
pub struct DefaultDocumentReader {
    pub options: LoadOptions,
}

impl DefaultDocumentReader {
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }
}

impl DocumentReader for DefaultDocumentReader {
    fn read(&self, path: &Path) -> Result<Document, CodecError> {
        let file = File::open(path)?;
        // 空文件不能映射
        if file.metadata()?.len() == 0 {
            let kind = codec::detect(path, &[])?;
            return codec::load_with(&[], kind, &self.options);
        }

        let mmap = unsafe { Mmap::map(&file)? };
        let kind = codec::detect(path, &mmap)?;
        debug!("读取 {} ({}, {} 字节)", path.display(), kind, mmap.len());
        codec::load_with(&mmap, kind, &self.options)
    }
}

/// 默认写入器
#[derive(Debug, Clone, Default)]
pub struct DefaultDocumentWriter {
    /// 覆盖已有文件前先复制一份带时间戳的 `.bak`
    pub backup: bool,
}

impl DefaultDocumentWriter {
    pub fn with_backup() -> Self {
        Self { backup: true }
    }
}

impl DocumentWriter for DefaultDocumentWriter {
    fn write(&self, doc: &Document, path: &Path) -> Result<(), CodecError> {
        // 先序列化，失败时不动原文件
        let bytes = codec::save(doc)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if self.backup && path.exists() {
            let backup = create_backup(path)?;
            info!("已备份到 {}", backup.display());
        }

        std::fs::write(path, &bytes)?;
        Ok(())
    }
}
