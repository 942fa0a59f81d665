//! What to download and where to put it.

use std::fmt;
use std::path::{Path, PathBuf};

/// Format of a downloadable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// EPUB e-book, the primary format.
    Epub,
    /// PDF, the usual fallback.
    Pdf,
}

impl ResourceKind {
    /// File extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::Pdf => "pdf",
        }
    }

    /// Content-type prefix a valid response must declare.
    #[must_use]
    pub fn content_type_prefix(self) -> &'static str {
        match self {
            Self::Epub => "application/epub",
            Self::Pdf => "application/pdf",
        }
    }

    /// `Accept` header value sent when requesting this kind.
    #[must_use]
    pub fn accept(self) -> &'static str {
        match self {
            Self::Epub => "application/epub+zip",
            Self::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One representation of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCandidate {
    /// Where to fetch it.
    pub url: String,
    /// Its format.
    pub kind: ResourceKind,
    /// Content-type prefix the response must declare.
    pub expected_content_type: String,
    /// Final path of the committed file.
    pub destination: PathBuf,
}

impl ResourceCandidate {
    /// Candidate expecting the kind's standard content type.
    #[must_use]
    pub fn new(url: impl Into<String>, kind: ResourceKind, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            kind,
            expected_content_type: kind.content_type_prefix().to_string(),
            destination: destination.into(),
        }
    }

    /// Overrides the expected content-type prefix.
    #[must_use]
    pub fn with_content_type(mut self, prefix: impl Into<String>) -> Self {
        self.expected_content_type = prefix.into();
        self
    }
}

/// Ordered candidates for the same logical content, tried in preference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    candidates: Vec<ResourceCandidate>,
}

impl ResourceDescriptor {
    /// Descriptor over `candidates`, primary first.
    #[must_use]
    pub fn new(candidates: Vec<ResourceCandidate>) -> Self {
        Self { candidates }
    }

    /// Descriptor with a single candidate.
    #[must_use]
    pub fn single(candidate: ResourceCandidate) -> Self {
        Self::new(vec![candidate])
    }

    /// EPUB at `epub_destination`, falling back to the PDF at the same path
    /// with its extension replaced.
    #[must_use]
    pub fn epub_with_pdf_fallback(
        epub_url: impl Into<String>,
        pdf_url: impl Into<String>,
        epub_destination: impl Into<PathBuf>,
    ) -> Self {
        let epub_destination = epub_destination.into();
        let pdf_destination = derived_destination(&epub_destination, ResourceKind::Pdf);
        Self::new(vec![
            ResourceCandidate::new(epub_url, ResourceKind::Epub, epub_destination),
            ResourceCandidate::new(pdf_url, ResourceKind::Pdf, pdf_destination),
        ])
    }

    /// Appends a fallback candidate.
    #[must_use]
    pub fn with_fallback(mut self, candidate: ResourceCandidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    /// Candidates in preference order.
    #[must_use]
    pub fn candidates(&self) -> &[ResourceCandidate] {
        &self.candidates
    }

    /// Returns true if there is nothing to try.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// `path` with its extension replaced by the one for `kind`.
#[must_use]
pub fn derived_destination(path: &Path, kind: ResourceKind) -> PathBuf {
    path.with_extension(kind.extension())
}
