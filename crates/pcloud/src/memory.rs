//! In-memory emulation of the pCloud API
//!
//! [`MemoryCloud`] implements [`Transport`] by answering requests from a
//! process-local file table instead of the network. Descriptors keep their
//! own server-side cursor and honor `O_APPEND`, the way the real service
//! does for the flags [`crate::descriptor::OPEN_FLAGS`] sends. Every call is
//! recorded, and failures can be queued per endpoint to exercise the error
//! paths.

use crate::Result;
use crate::client::PCloud;
use crate::config::PCloudConfig;
use crate::descriptor::{O_APPEND, O_CREAT};
use crate::error::TransportError;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Method;
use reqwest::header::AUTHORIZATION;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Injected failure for the next call to an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Answer with this HTTP status and a non-JSON body
    Status(u16),
    /// Answer 200 with a `result != 0` envelope
    Remote(i64, &'static str),
    /// Fail before any response exists
    Transport,
}

/// A request as the emulator saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub method: Method,
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
    pub body_len: usize,
}

#[derive(Debug)]
struct StoredFile {
    id: u64,
    data: Vec<u8>,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

#[derive(Debug)]
struct OpenFile {
    path: String,
    flags: u32,
    cursor: usize,
}

#[derive(Debug, Default)]
struct CloudState {
    files: BTreeMap<String, StoredFile>,
    folders: BTreeSet<String>,
    descriptors: HashMap<u64, OpenFile>,
    next_fd: u64,
    next_id: u64,
    failures: HashMap<String, VecDeque<Failure>>,
    calls: Vec<Call>,
    omit_descriptor: bool,
    write_limit: Option<usize>,
}

/// In-process pCloud account
#[derive(Clone)]
pub struct MemoryCloud {
    token: String,
    state: Arc<Mutex<CloudState>>,
}

impl std::fmt::Debug for MemoryCloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCloud").finish_non_exhaustive()
    }
}

const FILE_NOT_FOUND: (i64, &str) = (2009, "File not found.");
const FOLDER_NOT_FOUND: (i64, &str) = (2005, "Directory does not exist.");
const BAD_DESCRIPTOR: (i64, &str) = (1007, "Invalid or closed file descriptor.");
const LOGIN_REQUIRED: (i64, &str) = (1000, "Log in required.");
const MISSING_PARAM: (i64, &str) = (1001, "No full path or name/folderid provided.");

impl MemoryCloud {
    /// An empty account that accepts `token`
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        let mut state = CloudState {
            next_fd: 1,
            next_id: 1,
            ..CloudState::default()
        };
        state.folders.insert("/".to_string());
        Self {
            token: token.into(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Default configuration carrying this account's token
    #[must_use]
    pub fn config(&self) -> PCloudConfig {
        PCloudConfig::new(self.token.clone())
    }

    /// A client wired to this account with default configuration
    pub fn client(&self) -> Result<PCloud> {
        self.client_for(&self.config())
    }

    /// A client wired to this account with the given configuration
    pub fn client_for(&self, config: &PCloudConfig) -> Result<PCloud> {
        PCloud::with_transport(config, Arc::new(self.clone()))
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a file directly, bypassing the API
    pub fn insert(&self, path: &str, data: &[u8]) {
        let mut state = self.lock();
        state.store(path, data.to_vec());
    }

    #[must_use]
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).map(|file| file.data.clone())
    }

    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.lock().files.contains_key(path)
    }

    /// Number of descriptors currently open on the server
    #[must_use]
    pub fn open_descriptors(&self) -> usize {
        self.lock().descriptors.len()
    }

    /// Queue a failure for the next call to `endpoint`
    pub fn fail_next(&self, endpoint: &str, failure: Failure) {
        self.lock()
            .failures
            .entry(endpoint.to_string())
            .or_default()
            .push_back(failure);
    }

    /// Answer `file_open` without an `fd` field
    pub fn omit_descriptor(&self, omit: bool) {
        self.lock().omit_descriptor = omit;
    }

    /// Accept at most `limit` bytes per `file_write`
    pub fn limit_writes(&self, limit: Option<usize>) {
        self.lock().write_limit = limit;
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn count_calls(&self, endpoint: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.endpoint == endpoint)
            .count()
    }
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn join(folder: &str, name: &str) -> String {
    if folder.ends_with('/') {
        format!("{folder}{name}")
    } else {
        format!("{folder}/{name}")
    }
}

fn param<'a>(params: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    params.get(key).map(String::as_str)
}

fn rfc1123(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

fn envelope(value: Value) -> HttpResponse {
    HttpResponse {
        status: 200,
        body: Bytes::from(value.to_string()),
    }
}

fn remote_error((code, message): (i64, &str)) -> HttpResponse {
    envelope(json!({ "result": code, "error": message }))
}

impl CloudState {
    fn store(&mut self, path: &str, data: Vec<u8>) -> u64 {
        let now = Utc::now();
        self.add_folders(&parent_of(path));
        if let Some(file) = self.files.get_mut(path) {
            file.data = data;
            file.modified = now;
            return file.id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.files.insert(
            path.to_string(),
            StoredFile {
                id,
                data,
                created: now,
                modified: now,
            },
        );
        id
    }

    fn add_folders(&mut self, folder: &str) {
        let mut current = folder.to_string();
        while self.folders.insert(current.clone()) {
            current = parent_of(&current);
        }
    }

    fn file_metadata(&self, path: &str) -> Option<Value> {
        let file = self.files.get(path)?;
        Some(json!({
            "id": format!("f{}", file.id),
            "fileid": file.id,
            "name": name_of(path),
            "path": path,
            "created": rfc1123(&file.created),
            "modified": rfc1123(&file.modified),
            "ismine": true,
            "isfolder": false,
            "isshared": false,
            "size": file.data.len(),
            "contenttype": "application/octet-stream",
        }))
    }

    fn folder_metadata(&self, path: &str) -> Option<Value> {
        if !self.folders.contains(path) {
            return None;
        }
        Some(json!({
            "id": "d0",
            "name": if path == "/" { "/" } else { name_of(path) },
            "path": path,
            "ismine": true,
            "isfolder": true,
            "isshared": false,
        }))
    }

    fn dispatch(&mut self, endpoint: &str, params: &BTreeMap<String, String>, body: &[u8]) -> HttpResponse {
        let get = |key| param(params, key);
        let descriptor = || get("fd").and_then(|fd| fd.parse::<u64>().ok());

        match endpoint {
            "/userinfo" => envelope(json!({
                "result": 0,
                "email": "user@example.com",
                "userid": 1,
                "quota": 10_737_418_240_u64,
                "usedquota": self.files.values().map(|f| f.data.len()).sum::<usize>(),
            })),
            "/listfolder" => {
                let Some(folder) = get("path") else {
                    return remote_error(MISSING_PARAM);
                };
                let Some(mut metadata) = self.folder_metadata(folder) else {
                    return remote_error(FOLDER_NOT_FOUND);
                };
                let mut contents: Vec<Value> = self
                    .folders
                    .iter()
                    .filter(|sub| sub.as_str() != folder && parent_of(sub) == folder)
                    .filter_map(|sub| self.folder_metadata(sub))
                    .collect();
                contents.extend(
                    self.files
                        .keys()
                        .filter(|path| parent_of(path) == folder)
                        .filter_map(|path| self.file_metadata(path)),
                );
                metadata["contents"] = Value::Array(contents);
                envelope(json!({ "result": 0, "metadata": metadata }))
            }
            "/uploadfile" => {
                let (Some(folder), Some(filename)) = (get("path"), get("filename")) else {
                    return remote_error(MISSING_PARAM);
                };
                let path = join(folder, filename);
                let id = self.store(&path, body.to_vec());
                envelope(json!({
                    "result": 0,
                    "fileids": [id],
                    "metadata": [self.file_metadata(&path)],
                }))
            }
            "/deletefile" => {
                let Some(path) = get("path") else {
                    return remote_error(MISSING_PARAM);
                };
                let Some(metadata) = self.file_metadata(path) else {
                    return remote_error(FILE_NOT_FOUND);
                };
                self.files.remove(path);
                envelope(json!({ "result": 0, "metadata": metadata }))
            }
            "/stat" => {
                let Some(path) = get("path") else {
                    return remote_error(MISSING_PARAM);
                };
                match self.file_metadata(path).or_else(|| self.folder_metadata(path)) {
                    Some(metadata) => envelope(json!({ "result": 0, "metadata": metadata })),
                    None => remote_error(FILE_NOT_FOUND),
                }
            }
            "/file_open" => {
                let Some(path) = get("path") else {
                    return remote_error(MISSING_PARAM);
                };
                let flags = get("flags")
                    .and_then(|flags| flags.parse::<u32>().ok())
                    .unwrap_or(0);
                let existing = self.files.get(path).map(|file| file.id);
                let id = match existing {
                    Some(id) => id,
                    None if flags & O_CREAT != 0 => self.store(path, Vec::new()),
                    None => return remote_error(FILE_NOT_FOUND),
                };
                let fd = self.next_fd;
                self.next_fd += 1;
                self.descriptors.insert(
                    fd,
                    OpenFile {
                        path: path.to_string(),
                        flags,
                        cursor: 0,
                    },
                );
                if self.omit_descriptor {
                    envelope(json!({ "result": 0, "fileid": id }))
                } else {
                    envelope(json!({ "result": 0, "fd": fd, "fileid": id }))
                }
            }
            "/file_read" => {
                let Some(open) = descriptor().and_then(|fd| self.descriptors.get_mut(&fd)) else {
                    return remote_error(BAD_DESCRIPTOR);
                };
                let count = get("count")
                    .and_then(|count| count.parse::<usize>().ok())
                    .unwrap_or(0);
                let data = self
                    .files
                    .get(&open.path)
                    .map(|file| file.data.as_slice())
                    .unwrap_or_default();
                let start = open.cursor.min(data.len());
                let end = start.saturating_add(count).min(data.len());
                open.cursor = end;
                HttpResponse {
                    status: 200,
                    body: Bytes::copy_from_slice(&data[start..end]),
                }
            }
            "/file_write" => {
                let Some(open) = descriptor().and_then(|fd| self.descriptors.get_mut(&fd)) else {
                    return remote_error(BAD_DESCRIPTOR);
                };
                let Some(file) = self.files.get_mut(&open.path) else {
                    return remote_error(FILE_NOT_FOUND);
                };
                let accepted = self.write_limit.map_or(body.len(), |limit| limit.min(body.len()));
                let chunk = &body[..accepted];
                let start = if open.flags & O_APPEND != 0 {
                    file.data.len()
                } else {
                    open.cursor.min(file.data.len())
                };
                let end = start + chunk.len();
                if file.data.len() < end {
                    file.data.resize(end, 0);
                }
                file.data[start..end].copy_from_slice(chunk);
                file.modified = Utc::now();
                open.cursor = end;
                envelope(json!({ "result": 0, "bytes": accepted }))
            }
            "/file_close" => match descriptor().and_then(|fd| self.descriptors.remove(&fd)) {
                Some(_) => envelope(json!({ "result": 0 })),
                None => remote_error(BAD_DESCRIPTOR),
            },
            _ => HttpResponse {
                status: 404,
                body: Bytes::from_static(b"Not Found"),
            },
        }
    }
}

#[async_trait]
impl Transport for MemoryCloud {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let endpoint = request.url.path().to_string();
        let params: BTreeMap<String, String> = request
            .url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        let body = request.body.unwrap_or_default();

        let mut state = self.lock();
        state.calls.push(Call {
            method: request.method.clone(),
            endpoint: endpoint.clone(),
            params: params.clone(),
            body_len: body.len(),
        });

        let failure = state
            .failures
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(Failure::Transport) => {
                return Err(format!("connection reset during {endpoint}").into());
            }
            Some(Failure::Status(status)) => {
                return Ok(HttpResponse {
                    status,
                    body: Bytes::from_static(b"<html>Service Unavailable</html>"),
                });
            }
            Some(Failure::Remote(code, message)) => return Ok(remote_error((code, message))),
            None => {}
        }

        let expected = format!("Bearer {}", self.token);
        let authorized = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            == Some(expected.as_str());
        if !authorized {
            return Ok(remote_error(LOGIN_REQUIRED));
        }

        Ok(state.dispatch(&endpoint, &params, &body))
    }
}
