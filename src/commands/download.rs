//! `download` command: fetch one book with a progress bar.

use std::io::IsTerminal;
use std::path::Path;

use anyhow::{Result, anyhow};
use bookfetch_core::download::{
    DownloadConfig, DownloadError, DownloadProgress, Downloader, ProgressSink,
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::context::AppContext;

/// Renders download progress as a byte bar.
struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{bar:40.cyan/blue} {bytes}/{total_bytes} ({percent}%) {bytes_per_sec} eta {eta}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }
}

impl ProgressSink for BarSink {
    fn on_progress(&self, progress: DownloadProgress) {
        if self.bar.length() != Some(progress.total_bytes) {
            self.bar.set_length(progress.total_bytes);
        }
        self.bar.set_position(progress.bytes_written);
    }
}

pub async fn run_download_command(
    ctx: &AppContext,
    cancel: &CancellationToken,
    id: &str,
    out: &Path,
    show_progress: bool,
) -> Result<()> {
    let session = ctx.require_session()?;
    let descriptor = ctx.catalog().resource_descriptor(id, out);
    let downloader = Downloader::new(
        std::sync::Arc::clone(&ctx.transport),
        DownloadConfig {
            session_cookie_name: ctx.service.session_cookie_name.clone(),
            ..DownloadConfig::default()
        },
    );

    let sink = (show_progress && std::io::stderr().is_terminal()).then(BarSink::new);
    let result = downloader
        .fetch(
            cancel,
            &session,
            &descriptor,
            sink.as_ref().map(|s| s as &dyn ProgressSink),
        )
        .await;
    if let Some(sink) = &sink {
        sink.bar.finish_and_clear();
    }

    match result {
        Ok(outcome) => {
            info!(
                path = %outcome.path.display(),
                format = %outcome.kind,
                bytes = outcome.bytes_written,
                "Downloaded"
            );
            println!("{}", outcome.path.display());
            Ok(())
        }
        Err(error @ DownloadError::AuthRequired { .. }) => Err(anyhow!("{error}")),
        Err(error) => Err(anyhow!("Download of '{id}' failed: {error}")),
    }
}
