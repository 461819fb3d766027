//! Where documents come from. The pipeline only ever sees text; fetching it
//! (drill-down targets, repository files) sits behind [`DocumentFetcher`].

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("request to {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("no fetcher can handle `{0}`")]
    Unsupported(String),
    #[error("`{0}` is not a CALM document")]
    NotCalm(String),
}

pub trait DocumentFetcher {
    fn fetch(&self, location: &str) -> Result<String, FetchError>;
}

impl<F> DocumentFetcher for F
where
    F: Fn(&str) -> Result<String, FetchError>,
{
    fn fetch(&self, location: &str) -> Result<String, FetchError> {
        self(location)
    }
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Resolve a `detailed-architecture` reference written inside the document
/// loaded from `base`. Absolute references are returned as is; relative ones
/// are joined onto the directory of `base`. Without a base the reference is
/// left for the fetcher to resolve.
pub fn resolve_location(base: Option<&str>, reference: &str) -> String {
    let Some(base) = base else {
        return reference.to_string();
    };
    let stripped = reference.strip_prefix("file://").unwrap_or(reference);
    if is_remote(reference) || reference.starts_with("file://") || Path::new(stripped).is_absolute() {
        return reference.to_string();
    }
    if is_remote(base) {
        let base = base.split(['?', '#']).next().unwrap_or(base);
        let path_start = base.find("://").map_or(0, |at| at + 3);
        return match base[path_start..].rfind('/') {
            Some(slash) => format!("{}{reference}", &base[..path_start + slash + 1]),
            None => format!("{base}/{reference}"),
        };
    }
    let base_path = Path::new(base.strip_prefix("file://").unwrap_or(base));
    match base_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            parent.join(reference).to_string_lossy().into_owned()
        }
        _ => reference.to_string(),
    }
}

/// Reads local files, resolving relative locations against `base_dir`.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    pub base_dir: PathBuf,
}

impl FileFetcher {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn resolve(&self, location: &str) -> PathBuf {
        let trimmed = location.strip_prefix("file://").unwrap_or(location);
        let path = Path::new(trimmed);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl DocumentFetcher for FileFetcher {
    fn fetch(&self, location: &str) -> Result<String, FetchError> {
        if is_remote(location) {
            return Err(FetchError::Unsupported(location.to_string()));
        }
        let path = self.resolve(location);
        std::fs::read_to_string(&path).map_err(|source| FetchError::Io { path, source })
    }
}

/// Tries each fetcher in turn; the first one that does not answer
/// `Unsupported` decides the outcome.
pub struct FetcherChain {
    fetchers: Vec<Box<dyn DocumentFetcher>>,
}

impl FetcherChain {
    pub fn new() -> Self {
        Self {
            fetchers: Vec::new(),
        }
    }

    pub fn with(mut self, fetcher: impl DocumentFetcher + 'static) -> Self {
        self.fetchers.push(Box::new(fetcher));
        self
    }
}

impl Default for FetcherChain {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentFetcher for FetcherChain {
    fn fetch(&self, location: &str) -> Result<String, FetchError> {
        for fetcher in &self.fetchers {
            match fetcher.fetch(location) {
                Err(FetchError::Unsupported(_)) => continue,
                other => return other,
            }
        }
        Err(FetchError::Unsupported(location.to_string()))
    }
}

/// Pass `text` through when it looks like a CALM document.
pub fn ensure_calm(location: &str, text: String) -> Result<String, FetchError> {
    if looks_like_calm(&text) {
        Ok(text)
    } else {
        Err(FetchError::NotCalm(location.to_string()))
    }
}

/// Heuristic used for remote documents and repository browsing: does this
/// text look like a CALM document?
pub fn looks_like_calm(text: &str) -> bool {
    let Ok(Value::Object(document)) = serde_json::from_str::<Value>(text) else {
        return false;
    };
    let truthy = |value: Option<&Value>| match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(_) => true,
    };
    truthy(document.get("nodes"))
        || truthy(document.get("relationships"))
        || document
            .get("$schema")
            .and_then(Value::as_str)
            .is_some_and(|schema| schema.contains("calm"))
        || truthy(document.get("metadata").and_then(|meta| meta.get("name")))
}

#[cfg(feature = "remote")]
pub use remote::{GitHubClient, HttpFetcher, RepoFile};

#[cfg(feature = "remote")]
mod remote {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use reqwest::blocking::{Client, RequestBuilder};
    use serde::Deserialize;
    use tracing::{debug, warn};

    use super::{DocumentFetcher, FetchError, ensure_calm, is_remote};

    const GITHUB_API: &str = "https://api.github.com";
    const USER_AGENT: &str = concat!("calmv/", env!("CARGO_PKG_VERSION"));

    fn transport(url: &str, err: reqwest::Error) -> FetchError {
        FetchError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    fn send(url: &str, request: RequestBuilder) -> Result<reqwest::blocking::Response, FetchError> {
        let response = request.send().map_err(|err| transport(url, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// Plain HTTP(S) GET for drill-down links.
    #[derive(Debug, Clone, Default)]
    pub struct HttpFetcher {
        client: Client,
    }

    impl HttpFetcher {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DocumentFetcher for HttpFetcher {
        fn fetch(&self, location: &str) -> Result<String, FetchError> {
            if !is_remote(location) {
                return Err(FetchError::Unsupported(location.to_string()));
            }
            debug!(url = location, "fetching document");
            let response = send(location, self.client.get(location).header("User-Agent", USER_AGENT))?;
            let text = response.text().map_err(|err| transport(location, err))?;
            ensure_calm(location, text)
        }
    }

    /// A JSON blob in a repository tree.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RepoFile {
        pub path: String,
        pub sha: String,
        pub size: Option<u64>,
        pub url: String,
    }

    #[derive(Deserialize)]
    struct RepoInfo {
        default_branch: String,
    }

    #[derive(Deserialize)]
    struct TreeResponse {
        tree: Vec<TreeEntry>,
    }

    #[derive(Deserialize)]
    struct TreeEntry {
        path: String,
        #[serde(rename = "type")]
        kind: String,
        sha: String,
        size: Option<u64>,
        url: String,
    }

    #[derive(Deserialize)]
    struct ContentResponse {
        content: Option<String>,
    }

    #[derive(Debug, Clone)]
    pub struct GitHubClient {
        client: Client,
        token: Option<String>,
        api_base: String,
    }

    impl GitHubClient {
        pub fn new(token: Option<String>) -> Self {
            Self {
                client: Client::new(),
                token: token.filter(|token| !token.trim().is_empty()),
                api_base: GITHUB_API.to_string(),
            }
        }

        pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
            self.api_base = api_base.into().trim_end_matches('/').to_string();
            self
        }

        fn get(&self, url: &str) -> RequestBuilder {
            let request = self
                .client
                .get(url)
                .header("Accept", "application/vnd.github.v3+json")
                .header("User-Agent", USER_AGENT);
            match &self.token {
                Some(token) => request.bearer_auth(token),
                None => request,
            }
        }

        fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
            let response = send(url, self.get(url))?;
            response
                .json::<T>()
                .map_err(|err| FetchError::Decode(err.to_string()))
        }

        /// JSON blobs on the default branch. When the repository record
        /// cannot be read, `main` and then `master` are tried directly.
        pub fn repo_tree(&self, owner: &str, repo: &str) -> Result<Vec<RepoFile>, FetchError> {
            let repo_url = format!("{}/repos/{owner}/{repo}", self.api_base);
            let branches = match self.get_json::<RepoInfo>(&repo_url) {
                Ok(info) => vec![info.default_branch],
                Err(err) => {
                    warn!(error = %err, "repository lookup failed, guessing branch");
                    vec!["main".to_string(), "master".to_string()]
                }
            };

            let mut last_error = None;
            for branch in branches {
                let url = format!(
                    "{}/repos/{owner}/{repo}/git/trees/{branch}?recursive=1",
                    self.api_base
                );
                match self.get_json::<TreeResponse>(&url) {
                    Ok(tree) => return Ok(json_blobs(tree)),
                    Err(err) => last_error = Some(err),
                }
            }
            Err(last_error.unwrap_or_else(|| FetchError::Unsupported(repo_url)))
        }

        pub fn file_content(&self, owner: &str, repo: &str, path: &str) -> Result<String, FetchError> {
            let url = format!("{}/repos/{owner}/{repo}/contents/{path}", self.api_base);
            let response: ContentResponse = self.get_json(&url)?;
            let encoded = response
                .content
                .ok_or_else(|| FetchError::Decode("response carries no content".to_string()))?;
            decode_content(&encoded)
        }
    }

    fn json_blobs(tree: TreeResponse) -> Vec<RepoFile> {
        tree.tree
            .into_iter()
            .filter(|entry| entry.kind == "blob" && entry.path.ends_with(".json"))
            .map(|entry| RepoFile {
                path: entry.path,
                sha: entry.sha,
                size: entry.size,
                url: entry.url,
            })
            .collect()
    }

    pub(super) fn decode_content(encoded: &str) -> Result<String, FetchError> {
        let compact: String = encoded.chars().filter(|ch| !ch.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(compact.as_bytes())
            .map_err(|err| FetchError::Decode(err.to_string()))?;
        String::from_utf8(bytes).map_err(|err| FetchError::Decode(err.to_string()))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn wrapped_base64_decodes() {
            let encoded = "eyJub2Rlcy\nI6IFtdfQ==\n";
            assert_eq!(decode_content(encoded).expect("decode"), r#"{"nodes": []}"#);
            assert!(decode_content("!!!").is_err());
        }

        #[test]
        fn tree_keeps_only_json_blobs() {
            let tree: TreeResponse = serde_json::from_value(serde_json::json!({
                "tree": [
                    {"path": "arch.json", "type": "blob", "sha": "1", "url": "u1", "size": 10},
                    {"path": "docs", "type": "tree", "sha": "2", "url": "u2"},
                    {"path": "README.md", "type": "blob", "sha": "3", "url": "u3"}
                ]
            }))
            .expect("tree");
            let files = json_blobs(tree);
            assert_eq!(files.len(), 1);
            assert_eq!(files[0].path, "arch.json");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calm_detection_follows_known_markers() {
        assert!(looks_like_calm(r#"{"nodes": []}"#));
        assert!(looks_like_calm(r#"{"relationships": [{}]}"#));
        assert!(looks_like_calm(r#"{"$schema": "https://calm.finos.org/draft/2025-03/meta/calm.json"}"#));
        assert!(looks_like_calm(r#"{"metadata": {"name": "Payments"}}"#));
        assert!(!looks_like_calm(r#"{"name": "package.json"}"#));
        assert!(!looks_like_calm("not json"));
        assert!(!looks_like_calm("[1, 2]"));
    }

    #[test]
    fn non_calm_text_is_rejected() {
        assert!(ensure_calm("a.json", r#"{"nodes": []}"#.to_string()).is_ok());
        assert!(matches!(
            ensure_calm("https://example.com/index.html", "<html></html>".to_string()),
            Err(FetchError::NotCalm(location)) if location == "https://example.com/index.html"
        ));
    }

    #[test]
    fn nested_references_resolve_against_their_document() {
        assert_eq!(resolve_location(None, "sub/child.json"), "sub/child.json");
        assert_eq!(
            resolve_location(Some("sub/child.json"), "grand.json"),
            Path::new("sub").join("grand.json").to_string_lossy()
        );
        assert_eq!(resolve_location(Some("child.json"), "grand.json"), "grand.json");
        assert_eq!(
            resolve_location(Some("https://host/arch/root.json?raw=1"), "detail/api.json"),
            "https://host/arch/detail/api.json"
        );
        assert_eq!(
            resolve_location(Some("https://host"), "api.json"),
            "https://host/api.json"
        );
        assert_eq!(
            resolve_location(Some("sub/child.json"), "https://host/x.json"),
            "https://host/x.json"
        );
        assert_eq!(
            resolve_location(Some("https://host/a.json"), "file:///tmp/x.json"),
            "file:///tmp/x.json"
        );
    }

    #[test]
    fn file_fetcher_resolves_relative_locations() {
        let dir = std::env::temp_dir().join(format!("calmv-fetch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        std::fs::write(dir.join("child.json"), r#"{"nodes": []}"#).expect("write");

        let fetcher = FileFetcher::new(&dir);
        assert_eq!(fetcher.fetch("child.json").expect("fetch"), r#"{"nodes": []}"#);
        let absolute = format!("file://{}", dir.join("child.json").display());
        assert!(fetcher.fetch(&absolute).is_ok());
        assert!(matches!(fetcher.fetch("missing.json"), Err(FetchError::Io { .. })));
        assert!(matches!(
            fetcher.fetch("https://example.com/a.json"),
            Err(FetchError::Unsupported(_))
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn chain_skips_unsupported_fetchers() {
        let chain = FetcherChain::new()
            .with(|location: &str| -> Result<String, FetchError> {
                Err(FetchError::Unsupported(location.to_string()))
            })
            .with(|_: &str| -> Result<String, FetchError> { Ok("{}".to_string()) });
        assert_eq!(chain.fetch("anything").expect("fetch"), "{}");
        assert!(FetcherChain::new().fetch("x").is_err());
    }
}
