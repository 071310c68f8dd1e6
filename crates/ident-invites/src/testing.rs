//! In-process fakes for the collaborator traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ident_common::config::{DnsOverrideEntry, InvitationConfig};
use ident_common::models::{MatrixId, ThreePidInvite, ThreePidInviteReply, ThreePidMapping};
use ident_federation::discovery::SrvRecord;
use ident_federation::{
    CallbackResponse, CallbackTransport, ConfigDnsOverride, FederationError, HomeserverResolver,
    ServerKeyPair, ServerSigner, SrvResolver,
};
use serde_json::Value;

use crate::collaborators::{InviteStorage, MappingLookup, NotificationDispatcher};
use crate::manager::{Collaborators, InvitationManager};

pub fn invite(sender: &str, medium: &str, address: &str, room: &str) -> ThreePidInvite {
    ThreePidInvite {
        sender: MatrixId::parse(sender).unwrap(),
        medium: medium.into(),
        address: address.into(),
        room_id: room.into(),
        properties: Default::default(),
    }
}

// ─── Storage ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStorage {
    pub rows: Mutex<HashMap<String, ThreePidInviteReply>>,
    pub inserts: AtomicUsize,
    pub deletes: AtomicUsize,
    pub unreachable: AtomicBool,
}

impl MemoryStorage {
    pub fn with_rows(rows: Vec<ThreePidInviteReply>) -> Arc<Self> {
        let storage = Self::default();
        {
            let mut map = storage.rows.lock().unwrap();
            for (i, row) in rows.into_iter().enumerate() {
                // Keyed by position so rows with colliding ids survive like in a real table.
                map.insert(format!("{i}:{}", row.id), row);
            }
        }
        Arc::new(storage)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.lock().unwrap().values().any(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl InviteStorage for MemoryStorage {
    async fn list_invites(&self) -> anyhow::Result<Vec<ThreePidInviteReply>> {
        if self.unreachable.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    async fn insert_invite(&self, reply: &ThreePidInviteReply) -> anyhow::Result<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().unwrap().insert(reply.id.clone(), reply.clone());
        Ok(())
    }

    async fn delete_invite(&self, id: &str) -> anyhow::Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().unwrap().retain(|_, r| r.id != id);
        Ok(())
    }
}

// ─── Lookup ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeLookup {
    pub bindings: Mutex<HashMap<(String, String), String>>,
    pub calls: AtomicUsize,
    pub failing: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
}

impl FakeLookup {
    pub fn bind(&self, medium: &str, address: &str, mxid: &str) {
        self.bindings
            .lock()
            .unwrap()
            .insert((medium.to_lowercase(), address.to_lowercase()), mxid.to_owned());
    }
}

#[async_trait]
impl MappingLookup for FakeLookup {
    async fn find(
        &self,
        medium: &str,
        address: &str,
        _recursive: bool,
    ) -> anyhow::Result<Option<ThreePidMapping>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("lookup backend down");
        }
        let found = self
            .bindings
            .lock()
            .unwrap()
            .get(&(medium.to_lowercase(), address.to_lowercase()))
            .cloned();
        Ok(found.map(|mxid| ThreePidMapping::new(medium, address, mxid)))
    }
}

// ─── Notification ────────────────────────────────────────────────────────────

pub struct RecordingNotifier {
    pub media: Vec<String>,
    pub sent: Mutex<Vec<ThreePidInviteReply>>,
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self { media: vec!["email".into(), "msisdn".into()], sent: Mutex::new(Vec::new()) }
    }
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    fn is_medium_supported(&self, medium: &str) -> bool {
        self.media.iter().any(|m| m.eq_ignore_ascii_case(medium))
    }

    async fn send_for_invite(&self, reply: &ThreePidInviteReply) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(reply.clone());
        Ok(())
    }
}

// ─── Federation ──────────────────────────────────────────────────────────────

/// What the fake homeserver answers.
#[derive(Clone, Copy)]
pub enum Answer {
    Status(u16),
    ConnectionError,
}

pub struct FakeTransport {
    pub answer: Mutex<Answer>,
    pub requests: Mutex<Vec<(String, Value)>>,
}

impl FakeTransport {
    pub fn answering(answer: Answer) -> Arc<Self> {
        Arc::new(Self { answer: Mutex::new(answer), requests: Mutex::new(Vec::new()) })
    }

    pub fn set_answer(&self, answer: Answer) {
        *self.answer.lock().unwrap() = answer;
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CallbackTransport for FakeTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<CallbackResponse, FederationError> {
        self.requests.lock().unwrap().push((url.to_owned(), body.clone()));
        let answer = *self.answer.lock().unwrap();
        match answer {
            Answer::Status(status) => Ok(CallbackResponse { status, body: String::new() }),
            Answer::ConnectionError => {
                Err(FederationError::RemoteHttp("hs".into(), "connection refused".into()))
            }
        }
    }
}

/// SRV resolver with no records: every domain falls back to `:8448`.
pub struct NoSrv;

#[async_trait]
impl SrvResolver for NoSrv {
    async fn lookup_srv(&self, _name: &str) -> Result<Vec<SrvRecord>, FederationError> {
        Ok(Vec::new())
    }
}

pub fn resolver(overrides: &[(&str, &str)]) -> HomeserverResolver {
    let entries: Vec<_> = overrides
        .iter()
        .map(|(n, v)| DnsOverrideEntry { name: (*n).to_owned(), value: (*v).to_owned() })
        .collect();
    HomeserverResolver::new(Arc::new(ConfigDnsOverride::new(&entries)), Arc::new(NoSrv))
}

pub fn signer() -> Arc<ServerSigner> {
    Arc::new(ServerSigner::new("id.example.com", Arc::new(ServerKeyPair::generate())))
}

// ─── Harness ─────────────────────────────────────────────────────────────────

pub struct Harness {
    pub manager: Arc<InvitationManager>,
    pub storage: Arc<MemoryStorage>,
    pub lookup: Arc<FakeLookup>,
    pub notifier: Arc<RecordingNotifier>,
    pub transport: Arc<FakeTransport>,
}

impl Harness {
    pub fn new(config: InvitationConfig, storage: Arc<MemoryStorage>, answer: Answer) -> Self {
        let lookup = Arc::new(FakeLookup::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let transport = FakeTransport::answering(answer);
        let manager = Arc::new(InvitationManager::new(
            config,
            Collaborators {
                storage: storage.clone(),
                lookup: lookup.clone(),
                notifier: notifier.clone(),
                signer: signer(),
                transport: transport.clone(),
                resolver: resolver(&[]),
            },
        ));
        Self { manager, storage, lookup, notifier, transport }
    }

    pub fn default_ok() -> Self {
        Self::new(InvitationConfig::default(), Arc::new(MemoryStorage::default()), Answer::Status(200))
    }
}
