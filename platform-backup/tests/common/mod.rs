//! Fakes shared by the integration tests.

#![allow(dead_code)]

use platform_backup::persistence::{AdapterFactory, ComponentDump, PersistenceBackup};
use platform_backup::transport::{HttpGateway, HttpResponse, RequestEntity};
use platform_backup::{BackupError, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::rc::Rc;

pub type EventLog = Rc<RefCell<Vec<String>>>;

pub fn event_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

pub const DIRECTOR: &str = "https://10.0.0.1:25555";

/// Answers from a fixed route table and records every request into the event log.
/// Unrouted GETs get a 404; PUTs and uploads succeed unless routed otherwise.
pub struct MockGateway {
    routes: RefCell<HashMap<String, (u16, String)>>,
    pub uploads: RefCell<Vec<(String, String, Vec<u8>)>>,
    events: EventLog,
}

impl MockGateway {
    pub fn new(events: EventLog) -> Self {
        Self {
            routes: RefCell::new(HashMap::new()),
            uploads: RefCell::new(Vec::new()),
            events,
        }
    }

    /// A healthy director with two cloud-controller VMs and a router.
    pub fn healthy_director(events: EventLog) -> Self {
        let gateway = Self::new(events);
        gateway.route(&format!("{DIRECTOR}/info"), 200, r#"{"name": "bosh"}"#);
        gateway.route(
            &format!("{DIRECTOR}/deployments/cf-1"),
            200,
            r#"{"manifest": "name: cf-1\n"}"#,
        );
        gateway.route(
            &format!("{DIRECTOR}/deployments/cf-1/vms"),
            200,
            r#"[
                {"job": "cloud_controller-partition", "index": 0},
                {"job": "router-partition", "index": 0},
                {"job": "cloud_controller_worker-partition", "index": 0}
            ]"#,
        );
        gateway
    }

    pub fn route(&self, url: &str, status: u16, body: &str) {
        self.routes
            .borrow_mut()
            .insert(url.to_string(), (status, body.to_string()));
    }

    fn answer(&self, method: &str, url: &str, default_status: u16) -> HttpResponse {
        self.events.borrow_mut().push(format!("{method} {url}"));
        match self.routes.borrow().get(url) {
            Some((status, body)) => HttpResponse::from_bytes(*status, body.clone()),
            None => HttpResponse::from_bytes(default_status, ""),
        }
    }
}

impl HttpGateway for MockGateway {
    fn get(&self, request: &RequestEntity) -> Result<HttpResponse> {
        Ok(self.answer("GET", &request.url, 404))
    }

    fn put(&self, request: &RequestEntity, _body: Vec<u8>) -> Result<HttpResponse> {
        Ok(self.answer("PUT", &request.url, 200))
    }

    fn upload(&self, request: &RequestEntity, field_name: &str, file: &Path) -> Result<HttpResponse> {
        self.uploads.borrow_mut().push((
            request.url.clone(),
            field_name.to_string(),
            std::fs::read(file)?,
        ));
        Ok(self.answer("POST", &request.url, 200))
    }
}

/// What the fake adapters did, shared with the test body.
#[derive(Default)]
pub struct AdapterStats {
    pub built: Vec<String>,
    pub imported: HashMap<String, Vec<u8>>,
}

/// Builds in-memory adapters; `fail_dump`/`fail_import` name a component to fail.
pub struct FaultyFactory {
    pub fail_dump: Option<&'static str>,
    pub fail_import: Option<&'static str>,
    pub stats: Rc<RefCell<AdapterStats>>,
    events: EventLog,
}

impl FaultyFactory {
    pub fn new(events: EventLog) -> Self {
        Self {
            fail_dump: None,
            fail_import: None,
            stats: Rc::new(RefCell::new(AdapterStats::default())),
            events,
        }
    }
}

impl AdapterFactory for FaultyFactory {
    fn adapter_for(&self, component: &ComponentDump) -> Result<Box<dyn PersistenceBackup>> {
        self.stats.borrow_mut().built.push(component.component.clone());
        Ok(Box::new(FakeAdapter {
            component: component.component.clone(),
            fail_dump: self.fail_dump == Some(component.component.as_str()),
            fail_import: self.fail_import == Some(component.component.as_str()),
            stats: self.stats.clone(),
            events: self.events.clone(),
        }))
    }
}

struct FakeAdapter {
    component: String,
    fail_dump: bool,
    fail_import: bool,
    stats: Rc<RefCell<AdapterStats>>,
    events: EventLog,
}

fn engine_failure(command: &str) -> BackupError {
    BackupError::Remote {
        command: command.to_string(),
        reason: "exit status 1".to_string(),
    }
}

impl PersistenceBackup for FakeAdapter {
    fn dump(&mut self, dest: &mut dyn Write) -> Result<()> {
        self.events.borrow_mut().push(format!("dump {}", self.component));
        dest.write_all(b"partial")?;
        if self.fail_dump {
            return Err(engine_failure("pg_dump"));
        }
        dest.write_all(format!(" dump of {}", self.component).as_bytes())?;
        Ok(())
    }

    fn import(&mut self, source: &mut dyn Read) -> Result<()> {
        self.events.borrow_mut().push(format!("import {}", self.component));
        if self.fail_import {
            return Err(engine_failure("pg_restore"));
        }
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        self.stats
            .borrow_mut()
            .imported
            .insert(self.component.clone(), data);
        Ok(())
    }
}

fn credentials(identity: &str, password: &str) -> serde_json::Value {
    serde_json::json!({
        "identifier": format!("{identity}_credentials"),
        "value": {"identity": identity, "password": password}
    })
}

pub fn job(identifier: &str, ip: &str, creds: &[(&str, &str)]) -> serde_json::Value {
    let properties: Vec<serde_json::Value> = creds
        .iter()
        .map(|(identity, password)| credentials(identity, password))
        .collect();
    serde_json::json!({
        "identifier": identifier,
        "guid": format!("{identifier}-guid"),
        "instances": [{"identifier": "instances", "value": 1}],
        "ips": [ip],
        "properties": properties
    })
}

/// Legacy-schema installation settings with a director and the given runtime jobs.
pub fn installation(bosh_product: &str, runtime_jobs: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "products": [
            {
                "identifier": bosh_product,
                "guid": "bosh-guid",
                "jobs": [job("director", "10.0.0.1", &[("director", "dpass"), ("vcap", "dvpass")])]
            },
            {
                "identifier": "cf",
                "guid": "cf-guid",
                "installation_name": "cf-1",
                "jobs": runtime_jobs
            }
        ]
    })
}

pub fn default_runtime_jobs() -> Vec<serde_json::Value> {
    vec![
        job("ccdb", "10.0.0.5", &[("admin", "ccpass"), ("vcap", "ccvpass")]),
        job("router", "10.0.0.9", &[("vcap", "rpass")]),
        job("mysql", "10.0.0.6", &[("root", "mypass"), ("vcap", "myvpass")]),
    ]
}

pub fn write_installation(dir: &Path, settings: &serde_json::Value) -> std::path::PathBuf {
    let path = dir.join("installation.json");
    std::fs::write(&path, serde_json::to_vec_pretty(settings).unwrap()).unwrap();
    path
}
