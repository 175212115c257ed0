use crate::download::DownloadReport;

/// Requests posted by background threads. The owning thread drains them and
/// applies them through [`crate::core::PlayerCore::handle_event`].
#[derive(Debug)]
pub enum AppEvent {
    /// The engine went idle while playing track number `generation`.
    AutoAdvance { generation: u64 },
    DownloadProgress(String),
    DownloadFinished(DownloadReport),
}
