//! Loading of applications, manifests and auxiliary files from disk or over HTTP

use anyhow::{Context, Result};
use expgen_lib::api::PATH_ANNOTATION;
use expgen_lib::{Application, FileLoader, FsLoader, GenerationError, Node};
use reqwest::Client;
use std::path::PathBuf;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch {url}: {source}")]
    Http {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to fetch {url}: server returned {status}")]
    Status { url: Url, status: reqwest::StatusCode },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid location {location:?}: {source}")]
    Location {
        location: String,
        #[source]
        source: url::ParseError,
    },
}

/// A file on disk or an HTTP(S) URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Url(Url),
    Path(PathBuf),
}

impl Location {
    pub fn parse(location: &str) -> Location {
        if let Some(path) = location.strip_prefix("file://") {
            return Location::Path(PathBuf::from(path));
        }
        match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Location::Url(url),
            _ => Location::Path(PathBuf::from(location)),
        }
    }

    /// Resolve `reference` relative to this location
    pub fn join(&self, reference: &str) -> Result<Location, LoadError> {
        match Location::parse(reference) {
            Location::Url(url) => Ok(Location::Url(url)),
            Location::Path(path) if path.is_absolute() => Ok(Location::Path(path)),
            Location::Path(path) => match self {
                Location::Url(base) => base
                    .join(reference)
                    .map(Location::Url)
                    .map_err(|source| LoadError::Location {
                        location: reference.to_string(),
                        source,
                    }),
                Location::Path(base) => Ok(Location::Path(
                    base.parent().map(|dir| dir.join(&path)).unwrap_or(path),
                )),
            },
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Url(url) => write!(f, "{url}"),
            Location::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Reads documents from local files and HTTP(S) URLs
#[derive(Clone)]
pub struct Loader {
    client: Client,
}

impl Loader {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Read the raw contents of a location
    pub async fn read(&self, location: &Location) -> Result<Vec<u8>, LoadError> {
        debug!(%location, "Reading");
        match location {
            Location::Path(path) => tokio::fs::read(path).await.map_err(|source| LoadError::Io {
                path: path.clone(),
                source,
            }),
            Location::Url(url) => {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|source| LoadError::Http {
                        url: url.clone(),
                        source,
                    })?;

                if !response.status().is_success() {
                    return Err(LoadError::Status {
                        url: url.clone(),
                        status: response.status(),
                    });
                }

                let body = response.bytes().await.map_err(|source| LoadError::Http {
                    url: url.clone(),
                    source,
                })?;
                Ok(body.to_vec())
            }
        }
    }

    /// Read an application and record where it came from
    pub async fn load_application(&self, location: &str) -> Result<Application> {
        let location = absolute(Location::parse(location))?;
        let data = self.read(&location).await?;
        let mut application: Application = serde_yaml::from_slice(&data)
            .with_context(|| format!("Failed to parse application {location}"))?;

        application
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(PATH_ANNOTATION.to_string(), location.to_string());
        Ok(application)
    }

    /// Read every document from `locations`, in order
    pub async fn load_documents(&self, locations: &[Location]) -> Result<Vec<Node>> {
        let mut documents = Vec::new();
        for location in locations {
            let data = self.read(location).await?;
            let parsed = parse_documents(&data).with_context(|| format!("Failed to parse manifests {location}"))?;
            debug!(%location, documents = parsed.len(), "Loaded manifests");
            documents.extend(parsed);
        }
        Ok(documents)
    }
}

/// Locations of the application's `resources`, relative to the application itself
pub fn application_resources(application: &Application) -> Result<Vec<Location>> {
    let base = application_location(application);
    application
        .resources
        .iter()
        .map(|resource| match &base {
            Some(base) => base.join(resource).map_err(anyhow::Error::from),
            None => Ok(Location::parse(resource)),
        })
        .collect()
}

fn application_location(application: &Application) -> Option<Location> {
    let path = application.metadata.annotations.as_ref()?.get(PATH_ANNOTATION)?;
    Some(Location::parse(path))
}

fn absolute(location: Location) -> Result<Location> {
    match location {
        Location::Path(path) if path.is_relative() => {
            let cwd = std::env::current_dir().context("Could not determine the working directory")?;
            Ok(Location::Path(cwd.join(path)))
        }
        location => Ok(location),
    }
}

/// Split a YAML stream into documents, dropping empty ones and flattening `List` objects
pub fn parse_documents(data: &[u8]) -> Result<Vec<Node>, serde_yaml::Error> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_slice(data) {
        let node: Node = serde::Deserialize::deserialize(document)?;
        if node.is_null() {
            continue;
        }

        if node.get("kind").and_then(Node::as_str) == Some("List") {
            if let Some(items) = node.get("items").and_then(Node::as_sequence) {
                documents.extend(items.iter().cloned());
                continue;
            }
        }
        documents.push(node);
    }
    Ok(documents)
}

/// Auxiliary file loading for the generator.
///
/// Runs on a blocking thread: HTTP reads are driven to completion on the runtime `handle`.
pub struct RemoteFileLoader {
    loader: Loader,
    handle: Handle,
}

impl RemoteFileLoader {
    pub fn new(loader: Loader, handle: Handle) -> Self {
        Self { loader, handle }
    }
}

impl FileLoader for RemoteFileLoader {
    fn load_file(&self, app: &Application, path: &str) -> expgen_lib::Result<Vec<u8>> {
        let location = match application_location(app) {
            Some(base) => base.join(path).map_err(|e| GenerationError::file_load(path, e))?,
            None => Location::parse(path),
        };

        match location {
            Location::Url(_) => self
                .handle
                .block_on(self.loader.read(&location))
                .map_err(|e| GenerationError::file_load(location.to_string(), e)),
            Location::Path(_) => FsLoader.load_file(app, path),
        }
    }
}
