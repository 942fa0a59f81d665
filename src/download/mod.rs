//! Atomic, progress-reporting resource downloads.
//!
//! A [`Downloader`] takes a [`Session`](crate::auth::Session) and a
//! [`ResourceDescriptor`] listing candidate formats in preference order, and
//! commits the first candidate that is available.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bookfetch_core::auth::Session;
//! use bookfetch_core::download::{DownloadConfig, Downloader, ResourceDescriptor};
//! use bookfetch_core::transport::{Transport, TransportConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(session: Session) -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(Transport::new(TransportConfig::default())?);
//! let downloader = Downloader::new(transport, DownloadConfig::default());
//! let descriptor = ResourceDescriptor::epub_with_pdf_fallback(
//!     "https://learning.oreilly.com/api/v2/epubs/9781098.epub",
//!     "https://learning.oreilly.com/api/v2/pdfs/9781098.pdf",
//!     "./books/9781098.epub",
//! );
//! let outcome = downloader
//!     .fetch(&CancellationToken::new(), &session, &descriptor, None)
//!     .await?;
//! println!("saved {} ({})", outcome.path.display(), outcome.kind);
//! # Ok(())
//! # }
//! ```

pub mod constants;
mod descriptor;
mod downloader;
mod error;
mod progress;

pub use descriptor::{ResourceCandidate, ResourceDescriptor, ResourceKind, derived_destination};
pub use downloader::{DownloadConfig, Downloader, FetchOutcome};
pub use error::{CandidateFailure, DownloadError};
pub use progress::{ChannelProgressSink, DownloadProgress, ProgressSink, ProgressThrottle};
