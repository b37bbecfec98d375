//! GitHub REST API client.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use super::types::{
    DeleteFileRequest, FileContents, GitCommit, GitReference, NewCommit, NewPullRequest,
    PullRequest, RawContents, RawGitCommit, RepositoryInfo, ShaOnly,
};
use super::RemoteApi;
use crate::errors::GitHubError;
use crate::models::{MergeMethod, TreeEntry};

/// Default public API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Asynchronous GitHub REST API client.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Result<Self, GitHubError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let token = token.into();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("codeowners-sync/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        info!(api_url = %api_url, "created GitHubClient");
        Ok(Self {
            http,
            api_url,
            token,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, GitHubError> {
        let resp = req.bearer_auth(&self.token).send().await?;
        let resp = check_response(resp).await?;
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| GitHubError::ParseError(e.to_string()))
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> Result<(), GitHubError> {
        let resp = req.bearer_auth(&self.token).send().await?;
        check_response(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for GitHubClient {
    #[instrument(skip(self))]
    async fn get_default_branch(&self, repo: &str) -> Result<String, GitHubError> {
        let url = self.url(&format!("repos/{}", repo));
        let info: RepositoryInfo = self.send_json(self.http.get(&url)).await?;
        debug!(repo = %info.full_name, branch = %info.default_branch, "resolved default branch");
        Ok(info.default_branch)
    }

    #[instrument(skip(self))]
    async fn get_branch_sha(&self, repo: &str, branch: &str) -> Result<String, GitHubError> {
        let url = self.url(&format!("repos/{}/git/ref/heads/{}", repo, branch));
        let reference: GitReference = self.send_json(self.http.get(&url)).await?;
        debug!(
            ref_name = %reference.ref_name,
            kind = %reference.object.kind,
            sha = %reference.object.sha,
            "fetched branch ref"
        );
        Ok(reference.object.sha)
    }

    #[instrument(skip(self))]
    async fn get_commit(&self, repo: &str, sha: &str) -> Result<GitCommit, GitHubError> {
        let url = self.url(&format!("repos/{}/git/commits/{}", repo, sha));
        let raw: RawGitCommit = self.send_json(self.http.get(&url)).await?;
        debug!(sha, parents = raw.parents.len(), "fetched commit");
        Ok(raw.into())
    }

    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    async fn create_tree(
        &self,
        repo: &str,
        base_tree: Option<&str>,
        entries: &[TreeEntry],
    ) -> Result<String, GitHubError> {
        let url = self.url(&format!("repos/{}/git/trees", repo));
        let payload = tree_payload(base_tree, entries);
        let tree: ShaOnly = self.send_json(self.http.post(&url).json(&payload)).await?;
        debug!(sha = %tree.sha, "created tree");
        Ok(tree.sha)
    }

    #[instrument(skip(self, commit), fields(tree = %commit.tree, signed = commit.signature.is_some()))]
    async fn create_commit(&self, repo: &str, commit: &NewCommit) -> Result<String, GitHubError> {
        let url = self.url(&format!("repos/{}/git/commits", repo));
        let payload = commit_payload(commit);
        let created: ShaOnly = self.send_json(self.http.post(&url).json(&payload)).await?;
        info!(sha = %created.sha, "created commit");
        Ok(created.sha)
    }

    #[instrument(skip(self))]
    async fn create_ref(&self, repo: &str, ref_name: &str, sha: &str) -> Result<(), GitHubError> {
        let url = self.url(&format!("repos/{}/git/refs", repo));
        let payload = serde_json::json!({ "ref": ref_name, "sha": sha });
        let created: GitReference = self.send_json(self.http.post(&url).json(&payload)).await?;
        info!(ref_name = %created.ref_name, "created ref");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_ref(&self, repo: &str, ref_name: &str) -> Result<(), GitHubError> {
        let url = self.url(&format!("repos/{}/git/{}", repo, ref_name));
        self.send_empty(self.http.delete(&url)).await?;
        info!(ref_name, "deleted ref");
        Ok(())
    }

    #[instrument(skip(self, pr), fields(head = %pr.head, base = %pr.base))]
    async fn create_pull_request(
        &self,
        repo: &str,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError> {
        let url = self.url(&format!("repos/{}/pulls", repo));
        let created: PullRequest = self.send_json(self.http.post(&url).json(pr)).await?;
        info!(number = created.number, "created pull request");
        Ok(created)
    }

    #[instrument(skip(self, commit_message))]
    async fn merge_pull_request(
        &self,
        repo: &str,
        number: u64,
        commit_message: &str,
        method: MergeMethod,
    ) -> Result<(), GitHubError> {
        let url = self.url(&format!("repos/{}/pulls/{}/merge", repo, number));
        let payload = serde_json::json!({
            "commit_message": commit_message,
            "merge_method": method.as_str(),
        });
        self.send_empty(self.http.put(&url).json(&payload)).await?;
        info!(number, method = %method, "merged pull request");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn close_pull_request(&self, repo: &str, number: u64) -> Result<(), GitHubError> {
        let url = self.url(&format!("repos/{}/pulls/{}", repo, number));
        let payload = serde_json::json!({ "state": "closed" });
        let pr: PullRequest = self.send_json(self.http.patch(&url).json(&payload)).await?;
        info!(number, state = %pr.state, "closed pull request");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_file_contents(
        &self,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<FileContents, GitHubError> {
        let url = self.url(&format!("repos/{}/contents/{}", repo, path));
        let mut req = self.http.get(&url);
        if let Some(r) = git_ref {
            req = req.query(&[("ref", r)]);
        }
        let raw: RawContents = self.send_json(req).await?;
        let contents = decode_contents(raw)?;
        debug!(path, sha = %contents.sha, bytes = contents.content.len(), "fetched file");
        Ok(contents)
    }

    #[instrument(skip(self, request), fields(path = %request.path))]
    async fn delete_file(
        &self,
        repo: &str,
        request: &DeleteFileRequest,
    ) -> Result<(), GitHubError> {
        let url = self.url(&format!("repos/{}/contents/{}", repo, request.path));
        let mut payload = serde_json::json!({
            "message": request.message,
            "sha": request.sha,
            "committer": {
                "name": request.committer.name,
                "email": request.committer.email,
            },
        });
        if !request.branch.is_empty() {
            payload["branch"] = serde_json::Value::String(request.branch.clone());
        }
        self.send_empty(self.http.delete(&url).json(&payload)).await?;
        info!(path = %request.path, "deleted file");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, GitHubError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let path = resp.url().path().to_string();
    let header = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let reset_at = header("x-ratelimit-reset").unwrap_or_else(|| "unknown".to_string());
    let exhausted = header("x-ratelimit-remaining").as_deref() == Some("0");

    let body = resp.text().await.unwrap_or_default();
    let message = api_message(&body);
    debug!(status = status.as_u16(), path = %path, message = %message, "GitHub request failed");

    Err(classify(status.as_u16(), exhausted, path, reset_at, message))
}

fn classify(
    status: u16,
    rate_limit_exhausted: bool,
    path: String,
    reset_at: String,
    message: String,
) -> GitHubError {
    match status {
        404 => GitHubError::NotFound(path),
        429 => GitHubError::RateLimited { reset_at },
        403 if rate_limit_exhausted => GitHubError::RateLimited { reset_at },
        401 | 403 => GitHubError::AuthenticationFailed(format!("HTTP {}: {}", status, message)),
        _ => GitHubError::ApiError {
            status,
            body: message,
        },
    }
}

/// Prefer the `message` field of a GitHub error document over the raw body.
fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn tree_payload(base_tree: Option<&str>, entries: &[TreeEntry]) -> serde_json::Value {
    let tree: Vec<serde_json::Value> = entries
        .iter()
        .map(|entry| match &entry.content {
            Some(content) => serde_json::json!({
                "path": entry.path,
                "mode": entry.mode,
                "type": entry.kind,
                "content": content,
            }),
            None => serde_json::json!({
                "path": entry.path,
                "mode": entry.mode,
                "type": entry.kind,
                "sha": serde_json::Value::Null,
            }),
        })
        .collect();

    let mut payload = serde_json::json!({ "tree": tree });
    if let Some(base) = base_tree.filter(|b| !b.is_empty()) {
        payload["base_tree"] = serde_json::Value::String(base.to_string());
    }
    payload
}

fn commit_payload(commit: &NewCommit) -> serde_json::Value {
    let actor = serde_json::json!({
        "name": commit.author.name,
        "email": commit.author.email,
        "date": commit.date,
    });
    let mut payload = serde_json::json!({
        "message": commit.message,
        "tree": commit.tree,
        "parents": commit.parents,
        "author": actor,
        "committer": actor,
    });
    if let Some(signature) = &commit.signature {
        payload["signature"] = serde_json::Value::String(signature.clone());
    }
    payload
}

fn decode_contents(raw: RawContents) -> Result<FileContents, GitHubError> {
    if raw.kind != "file" {
        return Err(GitHubError::ContentDecode {
            path: raw.path,
            detail: format!("expected a file, found '{}'", raw.kind),
        });
    }
    let encoded = raw.content.unwrap_or_default();
    let content = match raw.encoding.as_deref() {
        Some("base64") | None => {
            let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = BASE64
                .decode(compact.as_bytes())
                .map_err(|e| GitHubError::ContentDecode {
                    path: raw.path.clone(),
                    detail: e.to_string(),
                })?;
            String::from_utf8(bytes).map_err(|e| GitHubError::ContentDecode {
                path: raw.path.clone(),
                detail: e.to_string(),
            })?
        }
        Some(other) => {
            return Err(GitHubError::ContentDecode {
                path: raw.path,
                detail: format!("unsupported encoding '{}'", other),
            })
        }
    };
    Ok(FileContents {
        path: raw.path,
        sha: raw.sha,
        content,
    })
}
