#[cfg(test)]
#[path = "history_test.rs"]
mod tests;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use eyre::{Context, Result, bail};

use crate::app::controller::Controller;
use crate::models::{ConversationSummary, Event, Model, UploadResult};
use crate::{notice_error, notice_info, notice_warning};

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "py", "js", "json", "yaml", "yml", "xml", "html", "css",
];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "docx"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

const BUSY_NOTICE: &str = "Wait for the current response to finish";

/// Asks the user before something destructive happens.
#[async_trait]
pub trait Confirm {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Whether the backend accepts uploads of this file type.
pub fn is_supported_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    [TEXT_EXTENSIONS, DOCUMENT_EXTENSIONS, IMAGE_EXTENSIONS]
        .iter()
        .any(|set| set.contains(&ext.as_str()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn export_file_name(conversation_id: &str) -> String {
    format!("nexus_chat_{}.pdf", conversation_id)
}

impl Controller {
    pub async fn refresh_history(&self) -> Vec<ConversationSummary> {
        self.store
            .list_conversations(self.options.history_limit)
            .await
    }

    /// Full-text search; a blank query lists the history instead.
    pub async fn search_history(&self, query: &str) -> Vec<ConversationSummary> {
        let query = query.trim();
        if query.is_empty() {
            return self.refresh_history().await;
        }
        self.store
            .search(query.to_string(), self.options.search_limit).await
    }

    pub async fn delete_conversation(&self, id: &str, confirm: &(dyn Confirm + Sync)) -> bool {
        if self.is_busy() {
            self.emit(notice_warning!(BUSY_NOTICE)).await;
            return false;
        }
        if !confirm.confirm("Delete this conversation?").await {
            return false;
        }

        if !self.store.delete_conversation(id.to_string()).await {
            self.emit(notice_error!("Failed to delete conversation")).await;
            return false;
        }

        log::debug!("Deleted conversation {}", id);
        if self.forget_conversation(Some(id)) {
            self.new_session().await;
        }
        self.emit(Event::ConversationDeleted(id.to_string())).await;
        true
    }

    pub async fn clear_history(&self, confirm: &(dyn Confirm + Sync)) -> bool {
        if self.is_busy() {
            self.emit(notice_warning!(BUSY_NOTICE)).await;
            return false;
        }
        if !confirm
            .confirm("Delete ALL conversations? This cannot be undone.")
            .await
        {
            return false;
        }

        if !self.store.clear_history().await {
            self.emit(notice_error!("Failed to clear history")).await;
            return false;
        }

        log::debug!("Cleared all history");
        self.forget_conversation(None);
        self.new_session().await;
        self.emit(Event::HistoryCleared).await;
        true
    }

    /// Saves conversation `id` (the active one when `None`) as
    /// `nexus_chat_{id}.pdf` under `dir`.
    pub async fn export_pdf(&self, id: Option<&str>, dir: &Path) -> Option<PathBuf> {
        let Some(id) = id.map(str::to_string).or_else(|| self.active_conversation()) else {
            self.emit(notice_warning!("No conversation to export")).await;
            return None;
        };

        match self.download_pdf(&id, dir).await {
            Ok(path) => {
                self.emit(notice_info!(format!("Exported to {}", path.display())))
                    .await;
                Some(path)
            }
            Err(err) => {
                log::error!("Failed to export conversation {}: {:#}", id, err);
                self.emit(notice_error!(format!("Export failed: {}", err)))
                    .await;
                None
            }
        }
    }

    pub async fn upload(&self, path: &Path) -> Option<UploadResult> {
        match self.upload_file(path).await {
            Ok(result) if result.success => {
                let name = result.filename.clone().unwrap_or_else(|| file_name(path));
                let kind = result.file_type.as_deref().unwrap_or("file");
                self.emit(notice_info!(format!("Uploaded {} ({})", name, kind)))
                    .await;
                Some(result)
            }
            Ok(result) => {
                let reason = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "upload rejected".to_string());
                self.emit(notice_error!(format!("Upload failed: {}", reason)))
                    .await;
                Some(result)
            }
            Err(err) => {
                log::error!("Failed to upload {}: {:#}", path.display(), err);
                self.emit(notice_error!(format!("Upload failed: {}", err)))
                    .await;
                None
            }
        }
    }

    pub async fn list_models(&self) -> Vec<Model> {
        match self.backend.list_models().await {
            Ok(models) => models,
            Err(err) => {
                log::error!("Failed to list models: {:#}", err);
                vec![]
            }
        }
    }

    pub async fn check_health(&self) -> bool {
        match self.backend.health().await {
            Ok(status) => status.is_healthy(),
            Err(err) => {
                log::warn!("Health check failed: {:#}", err);
                false
            }
        }
    }

    async fn download_pdf(&self, id: &str, dir: &Path) -> Result<PathBuf> {
        let bytes = self.backend.export_pdf(id.to_string()).await?;
        tokio::fs::create_dir_all(dir)
            .await
            .wrap_err(format!("creating {}", dir.display()))?;
        let path = dir.join(export_file_name(id));
        tokio::fs::write(&path, bytes)
            .await
            .wrap_err(format!("writing {}", path.display()))?;
        Ok(path)
    }

    async fn upload_file(&self, path: &Path) -> Result<UploadResult> {
        if !is_supported_file(path) {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e))
                .unwrap_or_else(|| "(none)".to_string());
            bail!("unsupported file type {}", ext);
        }

        let content = tokio::fs::read(path)
            .await
            .wrap_err(format!("reading {}", path.display()))?;
        self.backend.upload(file_name(path), content).await
    }
}
