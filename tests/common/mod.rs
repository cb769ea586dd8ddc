#![allow(dead_code)]

//! Shared helpers for integration tests: a CLI runner that logs every
//! invocation, and an in-memory controller world standing in for the juju
//! client, the ssh channel and HTTP so full scenarios run without a cloud.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::{Value, json};

use model_migration_assessor::core::config::Config;
use model_migration_assessor::core::errors::{MmaError, Result};
use model_migration_assessor::juju::registry::REGISTRY_FILE;
use model_migration_assessor::juju::remote::RemoteShell;
use model_migration_assessor::juju::runner::{CommandRunner, Invocation};
use model_migration_assessor::logger::recorder::Recorder;
use model_migration_assessor::migration::oracle::HttpProbe;
use model_migration_assessor::scenarios::{Harness, HarnessParts};
use model_migration_assessor::wait::clock::Clock;

// ──────────────────── CLI runner ────────────────────

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_mma") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "mma.exe" } else { "mma" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve mma binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with_env(case_name, args, &[])
}

pub fn run_cli_case_with_env(case_name: &str, args: &[&str], env: &[(&str, &str)]) -> CmdResult {
    let root = std::env::temp_dir().join("mma-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command.args(args).env("RUST_BACKTRACE", "1");
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command.output().expect("execute mma command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

// ──────────────────── clock ────────────────────

/// Virtual clock: sleeping advances time instantly.
#[derive(Debug, Default)]
pub struct FakeClock {
    now: Mutex<Duration>,
    sleeps: Mutex<u64>,
}

impl FakeClock {
    pub fn sleeps(&self) -> u64 {
        *self.sleeps.lock()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        *self.now.lock() += duration;
        *self.sleeps.lock() += 1;
    }
}

// ──────────────────── controller world ────────────────────

pub const CLIENT_VERSION: &str = "2.3.1-xenial-amd64";
pub const SOURCE: &str = "mma-source";
pub const DESTINATION: &str = "mma-destination";
pub const DEFAULT_PAYLOAD: &str = "simple-server.";

const TRANSIENT_STDERR: &str = "ERROR cannot get model details: model is being removed";
const DENIED_STDERR: &str = "ERROR permission denied (unauthorized access)";
const UNREACHABLE_STDERR: &str = "ERROR cannot connect to API: connection refused";

/// Behaviour switches for failure-path tests.
#[derive(Debug, Clone)]
pub struct Knobs {
    /// Destination listings observed before an in-flight migration lands.
    pub complete_after_polls: u32,
    /// Source listings that fail with the mid-removal error after a migration lands.
    pub transient_listing_errors: u32,
    pub drop_logs_on_migration: bool,
    pub lose_payload_on_migration: bool,
    /// New units are placed on the model's first machine.
    pub colocate_new_units: bool,
    /// models.yaml keeps listing models under the controller they were created on.
    pub stale_registry: bool,
    pub fail_service_start: bool,
    pub migration_never_completes: bool,
}

impl Default for Knobs {
    fn default() -> Self {
        Self {
            complete_after_polls: 2,
            transient_listing_errors: 0,
            drop_logs_on_migration: false,
            lose_payload_on_migration: false,
            colocate_new_units: false,
            stale_registry: false,
            fail_service_start: false,
            migration_never_completes: false,
        }
    }
}

#[derive(Debug)]
struct Controller {
    uuid: String,
    host: String,
    api_up: bool,
    /// user -> controller permission
    users: BTreeMap<String, String>,
    pending_transients: u32,
}

#[derive(Debug)]
struct Home {
    user: String,
    /// local controller name -> controller
    aliases: BTreeMap<String, String>,
}

#[derive(Debug)]
struct Machine {
    address: String,
    started: bool,
}

#[derive(Debug)]
struct Unit {
    name: String,
    machine: String,
    started: bool,
}

#[derive(Debug, Default)]
struct App {
    payload: Option<String>,
    blocked: bool,
    subordinate: bool,
    related: Vec<String>,
    units: Vec<Unit>,
    next_unit: u32,
}

#[derive(Debug)]
struct Migration {
    target: String,
    polls: u32,
}

#[derive(Debug)]
struct Model {
    name: String,
    owner: String,
    controller: String,
    created_on: String,
    uuid: String,
    apps: BTreeMap<String, App>,
    machines: BTreeMap<String, Machine>,
    next_machine: u32,
    log: Vec<String>,
    migration: Option<Migration>,
}

impl Model {
    fn log(&mut self, text: impl AsRef<str>) {
        let seq = self.log.len();
        self.log
            .push(format!("{seq:04} {}/{}: {}", self.owner, self.name, text.as_ref()));
    }
}

#[derive(Debug)]
struct World {
    version: String,
    knobs: Knobs,
    controllers: BTreeMap<String, Controller>,
    homes: BTreeMap<PathBuf, Home>,
    tokens: BTreeMap<String, (String, String)>,
    models: Vec<Model>,
    next_address: u32,
    next_uuid: u32,
    calls: Vec<Vec<String>>,
    service_actions: Vec<String>,
}

/// Parsed command line: valued flags, switches and positionals.
struct Parsed<'a> {
    flags: BTreeMap<&'a str, &'a str>,
    switches: Vec<&'a str>,
    positional: Vec<&'a str>,
}

const VALUED_FLAGS: [&str; 5] = ["-m", "-c", "--format", "-l", "--resource"];

impl<'a> Parsed<'a> {
    fn new(args: &'a [String]) -> Self {
        let mut flags = BTreeMap::new();
        let mut switches = Vec::new();
        let mut positional = Vec::new();
        let mut iter = args.iter().skip(1).map(String::as_str);
        while let Some(arg) = iter.next() {
            if VALUED_FLAGS.contains(&arg) {
                flags.insert(arg, iter.next().unwrap_or(""));
            } else if arg.starts_with("--") {
                switches.push(arg);
            } else {
                positional.push(arg);
            }
        }
        Self {
            flags,
            switches,
            positional,
        }
    }

    fn flag(&self, name: &str) -> std::result::Result<&'a str, String> {
        self.flags
            .get(name)
            .copied()
            .ok_or_else(|| format!("ERROR option {name} is required"))
    }

    fn switch(&self, name: &str) -> bool {
        self.switches.contains(&name)
    }

    fn arg(&self, index: usize) -> std::result::Result<&'a str, String> {
        self.positional
            .get(index)
            .copied()
            .ok_or_else(|| "ERROR missing argument".to_string())
    }

    fn json(&self) -> bool {
        self.flags.get("--format") == Some(&"json")
    }
}

type Reply = std::result::Result<String, String>;

impl World {
    fn new(admin_home: &Path) -> Self {
        let mut world = Self {
            version: CLIENT_VERSION.to_string(),
            knobs: Knobs::default(),
            controllers: BTreeMap::new(),
            homes: BTreeMap::new(),
            tokens: BTreeMap::new(),
            models: Vec::new(),
            next_address: 0,
            next_uuid: 0,
            calls: Vec::new(),
            service_actions: Vec::new(),
        };
        for (index, name) in [SOURCE, DESTINATION].into_iter().enumerate() {
            world.controllers.insert(
                name.to_string(),
                Controller {
                    uuid: format!("{:08x}-ctrl-{index}", 0xc0de_0000_u32 + index as u32),
                    host: format!("10.99.{index}.1"),
                    api_up: true,
                    users: BTreeMap::from([("admin".to_string(), "superuser".to_string())]),
                    pending_transients: 0,
                },
            );
        }
        world.homes.insert(
            admin_home.to_path_buf(),
            Home {
                user: "admin".to_string(),
                aliases: BTreeMap::from([
                    (SOURCE.to_string(), SOURCE.to_string()),
                    (DESTINATION.to_string(), DESTINATION.to_string()),
                ]),
            },
        );
        world.write_registries();
        world
    }

    fn handle(&mut self, inv: &Invocation) -> Reply {
        self.calls.push(inv.args.clone());
        let p = Parsed::new(&inv.args);
        match inv.command() {
            "version" => Ok(format!("{}\n", self.version)),
            "models" => self.models_cmd(inv, &p),
            "show-model" => self.show_model(inv, &p),
            "status" => self.status(inv, &p),
            "show-controller" => self.show_controller(inv, &p),
            "debug-log" => self.debug_log(inv, &p),
            "add-model" => self.add_model(inv, &p),
            "deploy" => self.deploy(inv, &p),
            "config" => self.config(inv, &p),
            "expose" => self.with_model(inv, &p, |m, p| {
                let app = p.arg(0)?;
                m.log(format!("application {app} exposed"));
                Ok(String::new())
            }),
            "add-relation" => self.with_model(inv, &p, |m, p| {
                let (a, b) = (p.arg(0)?, p.arg(1)?);
                for (sub, principal) in [(a, b), (b, a)] {
                    let app = m
                        .apps
                        .get_mut(sub)
                        .ok_or_else(|| format!("ERROR application {sub:?} not found"))?;
                    if app.subordinate {
                        app.related.push(principal.to_string());
                    }
                }
                m.log(format!("relation {a} {b} established"));
                Ok(String::new())
            }),
            "add-unit" => {
                let app = p.arg(0)?.to_string();
                let idx = self.resolve_model(inv, p.flag("-m")?)?;
                self.add_unit(idx, &app)
            }
            "remove-application" => self.with_model(inv, &p, |m, p| {
                let name = p.arg(0)?;
                let app = m
                    .apps
                    .remove(name)
                    .ok_or_else(|| format!("ERROR application {name:?} not found"))?;
                for unit in app.units {
                    m.machines.remove(&unit.machine);
                }
                m.log(format!("application {name} removed"));
                Ok(String::new())
            }),
            "add-user" => self.add_user(inv, &p),
            "register" => self.register(inv, &p),
            "grant" => self.grant(inv, &p),
            "migrate" => self.migrate(inv, &p),
            other => Err(format!("ERROR unrecognized command: juju {other}")),
        }
    }

    // ── identity and addressing ──

    fn home(&self, inv: &Invocation) -> std::result::Result<&Home, String> {
        self.homes
            .get(&inv.juju_home)
            .ok_or_else(|| format!("ERROR no controllers registered in {}", inv.juju_home.display()))
    }

    fn user(&self, inv: &Invocation) -> std::result::Result<String, String> {
        Ok(self.home(inv)?.user.clone())
    }

    fn resolve_controller(&self, inv: &Invocation, local: &str) -> std::result::Result<String, String> {
        self.home(inv)?
            .aliases
            .get(local)
            .cloned()
            .ok_or_else(|| format!("ERROR controller {local} not found"))
    }

    fn check_up(&self, controller: &str) -> std::result::Result<(), String> {
        match self.controllers.get(controller) {
            Some(c) if c.api_up => Ok(()),
            Some(_) => Err(UNREACHABLE_STDERR.to_string()),
            None => Err(format!("ERROR controller {controller} not found")),
        }
    }

    fn is_super(&self, controller: &str, user: &str) -> bool {
        self.controllers
            .get(controller)
            .and_then(|c| c.users.get(user))
            .is_some_and(|perm| perm == "superuser")
    }

    fn split_ref<'r>(
        &self,
        inv: &Invocation,
        reference: &'r str,
    ) -> std::result::Result<(String, String, &'r str), String> {
        let (local, rest) = reference
            .split_once(':')
            .ok_or_else(|| format!("ERROR model reference {reference:?} lacks a controller"))?;
        let controller = self.resolve_controller(inv, local)?;
        let (owner, name) = match rest.split_once('/') {
            Some((owner, name)) => (owner.to_string(), name),
            None => (self.user(inv)?, rest),
        };
        Ok((controller, owner, name))
    }

    fn find_model(&self, controller: &str, owner: &str, name: &str) -> Option<usize> {
        self.models
            .iter()
            .position(|m| m.controller == controller && m.owner == owner && m.name == name)
    }

    fn resolve_model(&self, inv: &Invocation, reference: &str) -> std::result::Result<usize, String> {
        let (controller, owner, name) = self.split_ref(inv, reference)?;
        self.check_up(&controller)?;
        let idx = self
            .find_model(&controller, &owner, name)
            .ok_or_else(|| format!("ERROR model {reference} not found"))?;
        let user = self.user(inv)?;
        if user != owner && !self.is_super(&controller, &user) {
            return Err(DENIED_STDERR.to_string());
        }
        Ok(idx)
    }

    fn with_model<F>(&mut self, inv: &Invocation, p: &Parsed<'_>, body: F) -> Reply
    where
        F: FnOnce(&mut Model, &Parsed<'_>) -> Reply,
    {
        let idx = self.resolve_model(inv, p.flag("-m")?)?;
        body(&mut self.models[idx], p)
    }

    fn allocate_address(&mut self) -> String {
        self.next_address += 1;
        format!("10.1.{}.{}", self.next_address / 200, self.next_address % 200 + 10)
    }

    // ── queries ──

    fn models_cmd(&mut self, inv: &Invocation, p: &Parsed<'_>) -> Reply {
        let controller = self.resolve_controller(inv, p.flag("-c")?)?;
        self.check_up(&controller)?;
        self.advance_migrations_to(&controller);

        if let Some(c) = self.controllers.get_mut(&controller)
            && c.pending_transients > 0
        {
            c.pending_transients -= 1;
            return Err(TRANSIENT_STDERR.to_string());
        }

        let user = self.user(inv)?;
        let all = p.switch("--all") && self.is_super(&controller, &user);
        let uuid = self.controllers[&controller].uuid.clone();
        let mut listed: Vec<(String, String)> = self
            .models
            .iter()
            .filter(|m| m.controller == controller && (m.owner == user || all))
            .map(|m| (m.owner.clone(), m.name.clone()))
            .collect();
        if user == "admin" {
            listed.push(("admin".to_string(), "controller".to_string()));
        }

        if p.json() {
            let models: Vec<Value> = listed
                .iter()
                .map(|(owner, name)| {
                    json!({"name": format!("{owner}/{name}"), "short-name": name, "controller-uuid": uuid})
                })
                .collect();
            Ok(json!({ "models": models }).to_string())
        } else {
            let mut out = format!("Controller: {controller}\n\nModel  Owner\n");
            for (owner, name) in listed {
                out.push_str(&format!("{owner}/{name}  {owner}\n"));
            }
            Ok(out)
        }
    }

    fn show_model(&self, inv: &Invocation, p: &Parsed<'_>) -> Reply {
        let idx = self.resolve_model(inv, p.arg(0)?)?;
        let m = &self.models[idx];
        let migration = m
            .migration
            .as_ref()
            .map(|mig| format!("migrating to {}: exporting model", mig.target));
        Ok(json!({
            m.name.clone(): {
                "name": format!("{}/{}", m.owner, m.name),
                "short-name": m.name,
                "model-uuid": m.uuid,
                "controller-uuid": self.controllers[&m.controller].uuid,
                "controller-name": m.controller,
                "owner": m.owner,
                "status": {"current": "available", "migration": migration},
            }
        })
        .to_string())
    }

    fn status(&mut self, inv: &Invocation, p: &Parsed<'_>) -> Reply {
        let reference = p.flag("-m")?;
        let (controller, owner, name) = self.split_ref(inv, reference)?;
        if owner == "admin" && name == "controller" {
            self.check_up(&controller)?;
            let host = &self.controllers[&controller].host;
            return Ok(json!({
                "machines": {"0": {"dns-name": host, "juju-status": {"current": "started"}}},
                "applications": {},
            })
            .to_string());
        }

        let idx = self.resolve_model(inv, reference)?;
        let out = status_json(&self.models[idx]).to_string();
        let model = &mut self.models[idx];
        for machine in model.machines.values_mut() {
            machine.started = true;
        }
        for app in model.apps.values_mut() {
            for unit in &mut app.units {
                unit.started = true;
            }
        }
        Ok(out)
    }

    fn show_controller(&self, inv: &Invocation, p: &Parsed<'_>) -> Reply {
        let local = p.arg(0)?;
        let controller = self.resolve_controller(inv, local)?;
        Ok(json!({ local: {"details": {"uuid": self.controllers[&controller].uuid}} }).to_string())
    }

    fn debug_log(&self, inv: &Invocation, p: &Parsed<'_>) -> Reply {
        let idx = self.resolve_model(inv, p.flag("-m")?)?;
        let log = &self.models[idx].log;
        let lines = if p.switch("--replay") {
            &log[..]
        } else {
            &log[log.len().saturating_sub(10)..]
        };
        Ok(lines.iter().map(|l| format!("{l}\n")).collect())
    }

    // ── mutations ──

    fn add_model(&mut self, inv: &Invocation, p: &Parsed<'_>) -> Reply {
        let name = p.arg(0)?;
        let controller = self.resolve_controller(inv, p.flag("-c")?)?;
        self.check_up(&controller)?;
        let user = self.user(inv)?;
        let permission = self.controllers[&controller].users.get(&user).cloned();
        if !matches!(permission.as_deref(), Some("addmodel" | "superuser")) {
            return Err(DENIED_STDERR.to_string());
        }
        if self.find_model(&controller, &user, name).is_some() {
            return Err(format!("ERROR model {user}/{name} already exists"));
        }
        self.next_uuid += 1;
        let mut model = Model {
            name: name.to_string(),
            owner: user,
            controller: controller.clone(),
            created_on: controller,
            uuid: format!("{:08x}-model", self.next_uuid),
            apps: BTreeMap::new(),
            machines: BTreeMap::new(),
            next_machine: 0,
            log: Vec::new(),
            migration: None,
        };
        model.log("model created");
        self.models.push(model);
        self.write_registries();
        Ok(format!("Added '{name}' model\n"))
    }

    fn deploy(&mut self, inv: &Invocation, p: &Parsed<'_>) -> Reply {
        let idx = self.resolve_model(inv, p.flag("-m")?)?;
        let charm = p.arg(0)?;
        let name = charm
            .trim_start_matches("cs:")
            .rsplit('/')
            .next()
            .unwrap_or(charm)
            .to_string();
        let payload = match p.flags.get("--resource") {
            Some(spec) => {
                let (_, path) = spec
                    .split_once('=')
                    .ok_or_else(|| format!("ERROR invalid resource {spec:?}"))?;
                Some(fs::read_to_string(path).map_err(|e| format!("ERROR reading {path}: {e}"))?)
            }
            None => None,
        };

        let model = &mut self.models[idx];
        if model.apps.contains_key(&name) {
            return Err(format!("ERROR application {name:?} already exists"));
        }
        let subordinate = name == "ntp";
        model.apps.insert(
            name.clone(),
            App {
                payload,
                blocked: name == "dummy-source",
                subordinate,
                ..App::default()
            },
        );
        model.log(format!("deployed {charm} as {name}"));
        if subordinate {
            Ok(String::new())
        } else {
            self.add_unit(idx, &name)
        }
    }

    fn add_unit(&mut self, idx: usize, app: &str) -> Reply {
        let colocate = self.knobs.colocate_new_units;
        let existing = self.models[idx].machines.keys().next().cloned();
        let machine = match existing {
            Some(first) if colocate => first,
            _ => {
                let address = self.allocate_address();
                let model = &mut self.models[idx];
                let id = model.next_machine.to_string();
                model.next_machine += 1;
                model.machines.insert(
                    id.clone(),
                    Machine {
                        address,
                        started: false,
                    },
                );
                id
            }
        };
        let model = &mut self.models[idx];
        let entry = model
            .apps
            .get_mut(app)
            .ok_or_else(|| format!("ERROR application {app:?} not found"))?;
        let unit = format!("{app}/{}", entry.next_unit);
        entry.next_unit += 1;
        entry.units.push(Unit {
            name: unit.clone(),
            machine: machine.clone(),
            started: false,
        });
        model.log(format!("unit {unit} assigned to machine {machine}"));
        Ok(String::new())
    }

    fn config(&mut self, inv: &Invocation, p: &Parsed<'_>) -> Reply {
        self.with_model(inv, p, |m, p| {
            let name = p.arg(0)?;
            let pairs: Vec<String> = p.positional[1..].iter().map(ToString::to_string).collect();
            let app = m
                .apps
                .get_mut(name)
                .ok_or_else(|| format!("ERROR application {name:?} not found"))?;
            if pairs.iter().any(|kv| kv.starts_with("token=")) {
                app.blocked = false;
            }
            m.log(format!("{name} config {}", pairs.join(" ")));
            Ok(String::new())
        })
    }

    fn add_user(&mut self, inv: &Invocation, p: &Parsed<'_>) -> Reply {
        let controller = self.resolve_controller(inv, p.flag("-c")?)?;
        self.check_up(&controller)?;
        if !self.is_super(&controller, &self.user(inv)?) {
            return Err(DENIED_STDERR.to_string());
        }
        let user = p.arg(0)?;
        let token = format!("TOKEN-{controller}-{user}");
        self.tokens
            .insert(token.clone(), (controller.clone(), user.to_string()));
        if let Some(c) = self.controllers.get_mut(&controller) {
            c.users.insert(user.to_string(), "login".to_string());
        }
        Ok(format!(
            "User \"{user}\" added\nPlease send this command to {user}:\n    juju register {token}\n"
        ))
    }

    fn register(&mut self, inv: &Invocation, p: &Parsed<'_>) -> Reply {
        let token = p.arg(0)?;
        let (controller, user) = self
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| "ERROR invalid registration token".to_string())?;
        let local = inv
            .stdin
            .as_deref()
            .and_then(|input| input.lines().nth(2))
            .ok_or_else(|| "ERROR controller name prompt unanswered".to_string())?
            .to_string();
        let home = self.homes.entry(inv.juju_home.clone()).or_insert_with(|| Home {
            user: user.clone(),
            aliases: BTreeMap::new(),
        });
        if home.user != user {
            return Err(format!("ERROR {} already belongs to {}", inv.juju_home.display(), home.user));
        }
        home.aliases.insert(local.clone(), controller);
        self.write_registries();
        Ok(format!("Welcome, {user}. You are now logged into \"{local}\".\n"))
    }

    fn grant(&mut self, inv: &Invocation, p: &Parsed<'_>) -> Reply {
        let controller = self.resolve_controller(inv, p.flag("-c")?)?;
        self.check_up(&controller)?;
        if !self.is_super(&controller, &self.user(inv)?) {
            return Err(DENIED_STDERR.to_string());
        }
        let (user, permission) = (p.arg(0)?, p.arg(1)?);
        let c = self
            .controllers
            .get_mut(&controller)
            .ok_or_else(|| format!("ERROR controller {controller} not found"))?;
        if !c.users.contains_key(user) {
            return Err(format!("ERROR user {user:?} not found"));
        }
        c.users.insert(user.to_string(), permission.to_string());
        Ok(String::new())
    }

    fn migrate(&mut self, inv: &Invocation, p: &Parsed<'_>) -> Reply {
        let (reference, destination) = match p.flags.get("-c") {
            Some(local) => (format!("{local}:{}", p.arg(0)?), p.arg(1)?),
            None => (p.arg(0)?.to_string(), p.arg(1)?),
        };
        let (source, _, _) = self.split_ref(inv, &reference)?;
        let user = self.user(inv)?;
        if !self.is_super(&source, &user) {
            return Err(DENIED_STDERR.to_string());
        }
        let idx = self.resolve_model(inv, &reference)?;
        let target = self.resolve_controller(inv, destination)?;
        self.check_up(&target)?;
        if target == source {
            return Err("ERROR source and target controllers are the same".to_string());
        }

        let model = &mut self.models[idx];
        if model.migration.is_some() {
            return Err(format!("ERROR model {reference} is already migrating"));
        }
        model.migration = Some(Migration {
            target: target.clone(),
            polls: 0,
        });
        model.log(format!("migration to {target} started"));
        Ok(format!("Migration started with ID \"{}:0\"\n", model.uuid))
    }

    // ── background progress ──

    fn advance_migrations_to(&mut self, target: &str) {
        if self.knobs.migration_never_completes {
            return;
        }
        let needed = self.knobs.complete_after_polls.max(1);
        let mut landed = Vec::new();
        for (idx, model) in self.models.iter_mut().enumerate() {
            if let Some(mig) = model.migration.as_mut()
                && mig.target == target
            {
                mig.polls += 1;
                if mig.polls >= needed {
                    landed.push(idx);
                }
            }
        }
        for idx in landed {
            self.complete_migration(idx);
        }
    }

    fn complete_migration(&mut self, idx: usize) {
        let knobs = self.knobs.clone();
        let model = &mut self.models[idx];
        let Some(mig) = model.migration.take() else {
            return;
        };
        let source = std::mem::replace(&mut model.controller, mig.target.clone());
        if knobs.drop_logs_on_migration {
            model.log.clear();
        }
        if knobs.lose_payload_on_migration {
            for app in model.apps.values_mut() {
                app.payload = None;
            }
        }
        model.log(format!("migration from {source} to {} completed", mig.target));
        if let Some(c) = self.controllers.get_mut(&source) {
            c.pending_transients = knobs.transient_listing_errors;
        }
        self.write_registries();
    }

    fn abort_migrations_to(&mut self, target: &str) {
        for model in &mut self.models {
            if model.migration.as_ref().is_some_and(|m| m.target == target) {
                model.migration = None;
                model.log(format!("migration to {target} aborted: target unavailable"));
            }
        }
    }

    fn write_registries(&self) {
        for (path, home) in &self.homes {
            let mut controllers = serde_json::Map::new();
            for (local, real) in &home.aliases {
                let models: serde_json::Map<String, Value> = self
                    .models
                    .iter()
                    .filter(|m| {
                        let listed_on = if self.knobs.stale_registry {
                            &m.created_on
                        } else {
                            &m.controller
                        };
                        listed_on == real && (m.owner == home.user || self.is_super(real, &home.user))
                    })
                    .map(|m| {
                        (
                            format!("{}/{}", m.owner, m.name),
                            json!({"uuid": m.uuid, "type": "iaas"}),
                        )
                    })
                    .collect();
                controllers.insert(local.clone(), json!({ "models": models }));
            }
            let doc = json!({ "controllers": controllers });
            let yaml = serde_yaml::to_string(&doc).expect("registry yaml");
            fs::create_dir_all(path).expect("juju home");
            fs::write(path.join(REGISTRY_FILE), yaml).expect("write registry");
        }
    }

    // ── remote and HTTP ──

    fn service(&mut self, host: &str, command: &str) -> std::result::Result<String, String> {
        self.service_actions.push(format!("{host}: {command}"));
        let words: Vec<&str> = command.split_whitespace().collect();
        let ["sudo", "service", _name, action] = words.as_slice() else {
            return Err(format!("unexpected command {command:?}"));
        };
        let controller = self
            .controllers
            .iter()
            .find(|(_, c)| c.host == host)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| format!("ssh: connect to host {host}: No route to host"))?;
        match *action {
            "stop" => {
                if let Some(c) = self.controllers.get_mut(&controller) {
                    c.api_up = false;
                }
                self.abort_migrations_to(&controller);
            }
            "start" if self.knobs.fail_service_start => {
                return Err("Job for service failed".to_string());
            }
            "start" => {
                if let Some(c) = self.controllers.get_mut(&controller) {
                    c.api_up = true;
                }
            }
            other => return Err(format!("unknown action {other}")),
        }
        Ok(String::new())
    }

    fn serve(&self, url: &str) -> Option<String> {
        let address = url.trim_start_matches("http://").trim_end_matches('/');
        self.models.iter().find_map(|m| {
            m.apps.values().find_map(|app| {
                let on_address = app.units.iter().any(|u| {
                    m.machines
                        .get(&u.machine)
                        .is_some_and(|machine| machine.address == address)
                });
                (on_address && !app.subordinate && app.next_unit > 0).then(|| {
                    format!("{}\n", app.payload.as_deref().unwrap_or(DEFAULT_PAYLOAD))
                })
            })
        })
    }
}

fn status_json(m: &Model) -> Value {
    let machines: serde_json::Map<String, Value> = m
        .machines
        .iter()
        .map(|(id, machine)| {
            let state = if machine.started { "started" } else { "pending" };
            (
                id.clone(),
                json!({"dns-name": machine.address, "juju-status": {"current": state}}),
            )
        })
        .collect();

    let mut sub_counters: BTreeMap<&str, u32> = BTreeMap::new();
    let mut applications = serde_json::Map::new();
    for (name, app) in &m.apps {
        if app.subordinate {
            let state = if app.related.is_empty() { "waiting" } else { "active" };
            applications.insert(
                name.clone(),
                json!({"application-status": {"current": state}, "subordinate-to": app.related}),
            );
            continue;
        }

        let subs: Vec<&str> = m
            .apps
            .iter()
            .filter(|(_, other)| other.subordinate && other.related.iter().any(|r| r == name))
            .map(|(sub, _)| sub.as_str())
            .collect();
        let mut units = serde_json::Map::new();
        let mut all_active = true;
        for unit in &app.units {
            let workload = match (unit.started, app.blocked) {
                (false, _) => "waiting",
                (true, true) => "blocked",
                (true, false) => "active",
            };
            all_active &= workload == "active";
            let agent = if unit.started { "idle" } else { "allocating" };
            let mut subordinates = serde_json::Map::new();
            for sub in &subs {
                let n = sub_counters.entry(*sub).or_insert(0);
                subordinates.insert(
                    format!("{sub}/{n}"),
                    json!({"workload-status": {"current": "active"}, "juju-status": {"current": agent}}),
                );
                *n += 1;
            }
            let address = m.machines.get(&unit.machine).map(|x| x.address.clone());
            units.insert(
                unit.name.clone(),
                json!({
                    "machine": unit.machine,
                    "public-address": address,
                    "workload-status": {"current": workload},
                    "juju-status": {"current": agent},
                    "subordinates": subordinates,
                }),
            );
        }
        let state = if all_active {
            "active"
        } else if app.blocked {
            "blocked"
        } else {
            "waiting"
        };
        applications.insert(
            name.clone(),
            json!({"application-status": {"current": state}, "units": units}),
        );
    }
    json!({ "machines": machines, "applications": applications })
}

/// Handle onto the shared world.
#[derive(Debug, Clone)]
pub struct FakeWorld(Arc<Mutex<World>>);

impl FakeWorld {
    pub fn new(admin_home: &Path) -> Self {
        Self(Arc::new(Mutex::new(World::new(admin_home))))
    }

    pub fn set_version(&self, version: &str) {
        self.0.lock().version = version.to_string();
    }

    pub fn knobs(&self, edit: impl FnOnce(&mut Knobs)) {
        edit(&mut self.0.lock().knobs);
    }

    /// Controller currently hosting `owner/name`.
    pub fn controller_of(&self, owner: &str, name: &str) -> Option<String> {
        self.0
            .lock()
            .models
            .iter()
            .find(|m| m.owner == owner && m.name == name)
            .map(|m| m.controller.clone())
    }

    pub fn is_migrating(&self, owner: &str, name: &str) -> bool {
        self.0
            .lock()
            .models
            .iter()
            .any(|m| m.owner == owner && m.name == name && m.migration.is_some())
    }

    pub fn api_up(&self, controller: &str) -> bool {
        self.0.lock().controllers.get(controller).is_some_and(|c| c.api_up)
    }

    pub fn log_of(&self, owner: &str, name: &str) -> Vec<String> {
        self.0
            .lock()
            .models
            .iter()
            .find(|m| m.owner == owner && m.name == name)
            .map(|m| m.log.clone())
            .unwrap_or_default()
    }

    pub fn machines_of(&self, owner: &str, name: &str) -> usize {
        self.0
            .lock()
            .models
            .iter()
            .find(|m| m.owner == owner && m.name == name)
            .map_or(0, |m| m.machines.len())
    }

    pub fn has_application(&self, owner: &str, name: &str, app: &str) -> bool {
        self.0
            .lock()
            .models
            .iter()
            .any(|m| m.owner == owner && m.name == name && m.apps.contains_key(app))
    }

    /// Every invocation's argument vector, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.0.lock().calls.clone()
    }

    pub fn calls_of(&self, command: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|args| args.first().is_some_and(|c| c == command))
            .collect()
    }

    pub fn service_actions(&self) -> Vec<String> {
        self.0.lock().service_actions.clone()
    }
}

/// [`CommandRunner`] answering from the world.
#[derive(Debug, Clone)]
pub struct FakeJuju(pub FakeWorld);

impl CommandRunner for FakeJuju {
    fn run(&self, invocation: &Invocation) -> Result<String> {
        let reply = self.0.0.lock().handle(invocation);
        reply.map_err(|stderr| MmaError::CommandFailed {
            command: invocation.display(),
            exit_code: 1,
            stdout: String::new(),
            stderr,
        })
    }
}

/// [`RemoteShell`] that stops and starts the world's controllers.
#[derive(Debug, Clone)]
pub struct FakeRemote(pub FakeWorld);

impl RemoteShell for FakeRemote {
    fn run(&self, host: &str, command: &str) -> Result<String> {
        let reply = self.0.0.lock().service(host, command);
        reply.map_err(|details| MmaError::Remote {
            host: host.to_string(),
            details,
        })
    }
}

/// [`HttpProbe`] serving each unit's resource payload.
#[derive(Debug, Clone)]
pub struct FakeProbe(pub FakeWorld);

impl HttpProbe for FakeProbe {
    fn get(&self, url: &str) -> Result<String> {
        self.0.0.lock().serve(url).ok_or_else(|| MmaError::Probe {
            url: url.to_string(),
            details: "connection refused".to_string(),
        })
    }
}

// ──────────────────── rig ────────────────────

/// A fake world plus a config and harness pointing at it.
pub struct Rig {
    pub world: FakeWorld,
    pub clock: Arc<FakeClock>,
    pub recorder: Recorder,
    pub config: Config,
    dir: tempfile::TempDir,
}

impl Rig {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::default();
        config.controllers.source = SOURCE.to_string();
        config.controllers.destination = DESTINATION.to_string();
        config.controllers.juju_home = dir.path().join("admin");
        config.fixtures.charm_repository = dir.path().join("charms");
        config.paths.config_file = dir.path().join("config.toml");
        config.paths.jsonl_log = dir.path().join("activity.jsonl");
        config.paths.scratch_dir = dir.path().join("scratch");

        Self {
            world: FakeWorld::new(&config.controllers.juju_home),
            clock: Arc::new(FakeClock::default()),
            recorder: Recorder::capturing(),
            config,
            dir,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn harness(&self) -> Harness {
        Harness::assemble(
            &self.config,
            HarnessParts {
                runner: Arc::new(FakeJuju(self.world.clone())),
                remote: Arc::new(FakeRemote(self.world.clone())),
                probe: Arc::new(FakeProbe(self.world.clone())),
                clock: self.clock.clone(),
                recorder: self.recorder.clone(),
            },
        )
        .expect("assemble harness")
    }
}
