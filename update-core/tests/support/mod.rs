//! In-memory collaborators for driving the update pipeline on the host.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use update_core::{
    ByteSource, Clock, DeviceControl, FirmwareStorage, HttpResponse, HttpTransport, ReadOutcome,
    RequestOptions, StorageError, TransportError,
};

/// Clock that only moves when told to, or when the code under test yields.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn at(ms: u64) -> Self {
        let clock = Self::default();
        clock.set(ms);
        clock
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn delay_ms(&self, ms: u32) {
        self.advance(ms.max(1) as u64);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Bytes(Vec<u8>),
    Pending,
    Drop,
}

/// Body that replays a script, then closes (or hangs when `hang` is set).
pub struct ScriptedBody {
    steps: VecDeque<Step>,
    hang: bool,
}

impl ScriptedBody {
    pub fn new(steps: Vec<Step>, hang: bool) -> Self {
        Self { steps: steps.into(), hang }
    }
}

impl ByteSource for ScriptedBody {
    fn poll_read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        match self.steps.pop_front() {
            Some(Step::Bytes(mut bytes)) => {
                let n = buf.len().min(bytes.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.steps.push_front(Step::Bytes(bytes.split_off(n)));
                }
                Ok(ReadOutcome::Data(n))
            }
            Some(Step::Pending) => Ok(ReadOutcome::Pending),
            Some(Step::Drop) => Err(TransportError::Dropped("connection reset".to_string())),
            None if self.hang => Ok(ReadOutcome::Pending),
            None => Ok(ReadOutcome::Closed),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Route {
    Ok {
        status: u16,
        content_length: Option<String>,
        steps: Vec<Step>,
        hang: bool,
    },
    Redirect(String),
    Refused,
}

impl Route {
    pub fn json(body: &str) -> Self {
        Route::Ok {
            status: 200,
            content_length: Some(body.len().to_string()),
            steps: vec![Step::Bytes(body.as_bytes().to_vec())],
            hang: false,
        }
    }

    pub fn status(status: u16) -> Self {
        Route::Ok {
            status,
            content_length: Some("0".to_string()),
            steps: Vec::new(),
            hang: false,
        }
    }

    /// Binary body of `declared` length delivered in `chunks`.
    pub fn image(declared: Option<u64>, chunks: Vec<Vec<u8>>) -> Self {
        Route::Ok {
            status: 200,
            content_length: declared.map(|n| n.to_string()),
            steps: chunks.into_iter().map(Step::Bytes).collect(),
            hang: false,
        }
    }

    pub fn steps(declared: Option<u64>, steps: Vec<Step>) -> Self {
        Route::Ok {
            status: 200,
            content_length: declared.map(|n| n.to_string()),
            steps,
            hang: false,
        }
    }

    pub fn hanging(declared: Option<u64>, chunks: Vec<Vec<u8>>) -> Self {
        Route::Ok {
            status: 200,
            content_length: declared.map(|n| n.to_string()),
            steps: chunks.into_iter().map(Step::Bytes).collect(),
            hang: true,
        }
    }
}

/// Fake HTTP stack keyed by URL. Clones share the route table and the
/// request log so a test can keep one copy for inspection.
#[derive(Clone, Default)]
pub struct FakeServer {
    routes: Rc<RefCell<HashMap<String, Route>>>,
    log: Rc<RefCell<Vec<String>>>,
}

impl FakeServer {
    pub fn route(&self, url: &str, route: Route) -> &Self {
        self.routes.borrow_mut().insert(url.to_string(), route);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.log.borrow().len()
    }
}

impl HttpTransport for FakeServer {
    type Body = ScriptedBody;

    fn get(
        &mut self,
        url: &str,
        options: &RequestOptions<'_>,
    ) -> Result<HttpResponse<ScriptedBody>, TransportError> {
        let mut current = url.to_string();
        for _ in 0..5 {
            self.log.borrow_mut().push(current.clone());
            let route = self
                .routes
                .borrow()
                .get(&current)
                .cloned()
                .ok_or_else(|| TransportError::Connect(format!("no route to {}", current)))?;

            match route {
                Route::Redirect(to) if options.follow_redirects => current = to,
                Route::Redirect(_) => {
                    return Ok(HttpResponse {
                        status: 302,
                        content_length: None,
                        body: ScriptedBody { steps: VecDeque::new(), hang: false },
                    })
                }
                Route::Refused => return Err(TransportError::Connect("connection refused".to_string())),
                Route::Ok { status, content_length, steps, hang } => {
                    return Ok(HttpResponse {
                        status,
                        content_length,
                        body: ScriptedBody { steps: steps.into(), hang },
                    })
                }
            }
        }
        Err(TransportError::Connect("too many redirects".to_string()))
    }
}

/// Storage that records every call.
#[derive(Debug, Default)]
pub struct RecordingStorage {
    pub begins: Vec<Option<u64>>,
    pub writes: Vec<usize>,
    pub data: Vec<u8>,
    pub commits: u32,
    pub aborts: u32,
    pub fail_write_after: Option<usize>,
    pub reject_commit: bool,
}

impl FirmwareStorage for RecordingStorage {
    fn begin(&mut self, size_hint: Option<u64>) -> Result<(), StorageError> {
        self.begins.push(size_hint);
        self.data.clear();
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        if let Some(limit) = self.fail_write_after {
            if self.data.len() + data.len() > limit {
                return Err(StorageError::WriteFailed);
            }
        }
        self.writes.push(data.len());
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn commit_and_activate(&mut self) -> Result<(), StorageError> {
        if self.reject_commit {
            return Err(StorageError::ValidationFailed);
        }
        self.commits += 1;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborts += 1;
    }
}

#[derive(Debug, Default)]
pub struct RestartCounter {
    pub restarts: u32,
}

impl DeviceControl for RestartCounter {
    fn restart(&mut self) {
        self.restarts += 1;
    }
}

pub fn release_json(tag: &str, url: &str) -> String {
    format!(
        r#"{{"tag_name":"{}","name":"Release {}","assets":[{{"name":"firmware.bin","browser_download_url":"{}"}}]}}"#,
        tag, tag, url
    )
}

fn github_user(login: &str, id: u64) -> String {
    format!(
        r#"{{"login":"{login}","id":{id},"node_id":"MDQ6VXNlcjE{id}","avatar_url":"https://avatars.githubusercontent.com/u/{id}?v=4","gravatar_id":"","url":"https://api.github.com/users/{login}","html_url":"https://github.com/{login}","followers_url":"https://api.github.com/users/{login}/followers","following_url":"https://api.github.com/users/{login}/following{{/other_user}}","gists_url":"https://api.github.com/users/{login}/gists{{/gist_id}}","starred_url":"https://api.github.com/users/{login}/starred{{/owner}}{{/repo}}","subscriptions_url":"https://api.github.com/users/{login}/subscriptions","organizations_url":"https://api.github.com/users/{login}/orgs","repos_url":"https://api.github.com/users/{login}/repos","events_url":"https://api.github.com/users/{login}/events{{/privacy}}","received_events_url":"https://api.github.com/users/{login}/received_events","type":"User","site_admin":false}}"#
    )
}

/// A release document as the GitHub releases API returns it: author and
/// uploader objects, one asset and a long changelog.
pub fn github_release_json(tag: &str, url: &str, size: u64) -> String {
    let notes: Vec<String> = (1..=40)
        .map(|i| format!("- Fix #{} in the sensor sampling path and tidy up the related configuration handling", 100 + i))
        .collect();
    format!(
        r###"{{"url":"https://api.github.com/repos/acme/sensor/releases/1001","assets_url":"https://api.github.com/repos/acme/sensor/releases/1001/assets","upload_url":"https://uploads.github.com/repos/acme/sensor/releases/1001/assets{{?name,label}}","html_url":"https://github.com/acme/sensor/releases/tag/{tag}","id":1001,"author":{author},"node_id":"RE_kwDOAbCdEf4AAAAB","tag_name":"{tag}","target_commitish":"main","name":"Sensor firmware {tag}","draft":false,"prerelease":false,"created_at":"2026-10-01T12:00:00Z","published_at":"2026-10-01T12:05:00Z","assets":[{{"url":"https://api.github.com/repos/acme/sensor/releases/assets/2002","id":2002,"node_id":"RA_kwDOAbCdEf4AAAAC","name":"firmware.bin","label":"","uploader":{uploader},"content_type":"application/octet-stream","state":"uploaded","size":{size},"download_count":17,"created_at":"2026-10-01T12:04:00Z","updated_at":"2026-10-01T12:04:30Z","browser_download_url":"{url}"}}],"tarball_url":"https://api.github.com/repos/acme/sensor/tarball/{tag}","zipball_url":"https://api.github.com/repos/acme/sensor/zipball/{tag}","body":"## What's changed\r\n{notes}"}}"###,
        author = github_user("release-bot", 41898282),
        uploader = github_user("acme-ci", 5550123),
        notes = notes.join("\\r\\n"),
    )
}

/// Deterministic image bytes so ordering mistakes show up in comparisons.
pub fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub fn split(data: &[u8], size: usize) -> Vec<Vec<u8>> {
    data.chunks(size).map(|c| c.to_vec()).collect()
}
