//! Where the flush exports come from: an HTTP base URL or a local directory.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::flush::{build_flush_report, FlushReport, FlushTargets, TransactionKind};
use crate::http::{retry, HttpTransport, RetryPolicy, TransportError};

#[derive(Debug, Error)]
pub enum FlushLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub trait TransactionCsvSource: Send + Sync {
    fn load(&self, resource: &str) -> Result<String, FlushLoadError>;
    fn describe(&self) -> String;
}

pub struct HttpCsvSource {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
}

impl HttpCsvSource {
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            retry,
        }
    }

    pub fn url_for(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource.trim_start_matches('/'))
    }
}

impl TransactionCsvSource for HttpCsvSource {
    fn load(&self, resource: &str) -> Result<String, FlushLoadError> {
        let url = self.url_for(resource);
        let bytes = retry(self.retry, || self.transport.get_bytes(&url))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

pub struct DirCsvSource {
    root: PathBuf,
}

impl DirCsvSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TransactionCsvSource for DirCsvSource {
    fn load(&self, resource: &str) -> Result<String, FlushLoadError> {
        let path = self.root.join(resource.trim_start_matches('/'));
        let bytes = fs::read(&path).map_err(|source| FlushLoadError::Io { path, source })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// `http(s)://` locations go through the transport; anything else is a directory.
pub fn csv_source_from_location(
    location: &str,
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
) -> Arc<dyn TransactionCsvSource> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Arc::new(HttpCsvSource::new(location, transport, retry))
    } else {
        Arc::new(DirCsvSource::new(location))
    }
}

pub fn load_flush_report(
    source: &dyn TransactionCsvSource,
    kind: TransactionKind,
    targets: &FlushTargets,
) -> Result<FlushReport, FlushLoadError> {
    let resource = kind.resource();
    info!(
        component = "flush",
        event = "flush.load.start",
        kind = kind.as_str(),
        resource,
        source = %source.describe()
    );

    let text = source.load(resource)?;
    Ok(build_flush_report(kind, &text, targets))
}
