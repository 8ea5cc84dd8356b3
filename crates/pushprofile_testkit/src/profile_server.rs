//! In-memory stand-in for the remote profile service.
//!
//! Keeps users and installations in maps and answers every [`RequestKind`]
//! the way the real service does for the flows the sync engine exercises.
//! Failures can be scripted per endpoint label.

use parking_lot::Mutex;
use pushprofile_protocol::{Installation, RemoteRequest, RemoteResponse, RequestKind, ServiceException, User};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Result of handling one request.
pub type ServerReply = Result<RemoteResponse, ServiceException>;

#[derive(Default)]
struct State {
    installations: BTreeMap<String, Installation>,
    /// Installation id to user key.
    owners: HashMap<String, String>,
    /// Users without their installation list, which is derived from `owners`.
    users: HashMap<String, User>,
    failures: HashMap<&'static str, VecDeque<ServiceException>>,
    handled: Vec<&'static str>,
}

/// In-memory profile service.
#[derive(Default)]
pub struct ProfileServer {
    state: Mutex<State>,
}

impl ProfileServer {
    /// Creates an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `user` with `installations` attached to it.
    pub fn seed_user(&self, key: &str, user: User, installations: Vec<Installation>) {
        let mut state = self.state.lock();
        let user = User {
            installations: None,
            ..user
        };
        state.users.insert(key.to_string(), user);
        for installation in installations {
            if let Some(id) = installation.push_registration_id.clone() {
                state.owners.insert(id.clone(), key.to_string());
                state.installations.insert(id, installation);
            }
        }
    }

    /// Makes the next request to `endpoint` fail with `exception`.
    pub fn fail_next(&self, endpoint: &'static str, exception: ServiceException) {
        self.state
            .lock()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(exception);
    }

    /// Returns an installation as the server knows it.
    pub fn installation(&self, push_registration_id: &str) -> Option<Installation> {
        self.state.lock().installations.get(push_registration_id).cloned()
    }

    /// Returns the user owning `push_registration_id`, installations included.
    pub fn user_of(&self, push_registration_id: &str) -> Option<User> {
        let state = self.state.lock();
        let key = state.owners.get(push_registration_id)?;
        Some(state.full_user(key))
    }

    /// Endpoint labels of every handled request, in order.
    pub fn handled(&self) -> Vec<&'static str> {
        self.state.lock().handled.clone()
    }

    /// Number of handled requests to `endpoint`.
    pub fn handled_count(&self, endpoint: &str) -> usize {
        self.state.lock().handled.iter().filter(|e| **e == endpoint).count()
    }

    /// Handles one request.
    pub fn handle(&self, request: &RemoteRequest) -> ServerReply {
        let mut state = self.state.lock();
        let endpoint = request.kind.label();
        state.handled.push(endpoint);
        if let Some(exception) = state.failures.get_mut(endpoint).and_then(VecDeque::pop_front) {
            return Err(exception);
        }

        let body = request.body.clone().unwrap_or(Value::Null);
        match &request.kind {
            RequestKind::PostInstance => state.post_instance(body),
            RequestKind::GetInstance { push_registration_id } => {
                let installation = state.require_installation(push_registration_id)?;
                Ok(RemoteResponse::with_body(to_json(installation)?))
            }
            RequestKind::PatchInstance { push_registration_id } => {
                state.patch_instance(push_registration_id, push_registration_id, body)
            }
            RequestKind::PatchOtherInstance {
                auth_push_registration_id,
                push_registration_id,
            } => state.patch_instance(auth_push_registration_id, push_registration_id, body),
            RequestKind::GetUser { push_registration_id } => {
                let key = state.owner(push_registration_id)?;
                Ok(RemoteResponse::with_body(to_json(&state.full_user(&key))?))
            }
            RequestKind::PatchUser { push_registration_id } => state.patch_user(push_registration_id, body),
            RequestKind::Personalize {
                push_registration_id,
                force_depersonalize,
            } => state.personalize(push_registration_id, *force_depersonalize, body),
            RequestKind::Depersonalize {
                push_registration_id,
                target_push_registration_id,
            } => {
                let target = target_push_registration_id.as_deref().unwrap_or(push_registration_id);
                state.depersonalize(push_registration_id, target)
            }
        }
    }
}

impl State {
    fn require_installation(&self, id: &str) -> Result<&Installation, ServiceException> {
        self.installations
            .get(id)
            .ok_or_else(|| ServiceException::new("NO_REGISTRATION", format!("unknown installation {id}")))
    }

    /// Returns the owning user key, creating an anonymous user on first use.
    fn owner(&mut self, id: &str) -> Result<String, ServiceException> {
        self.require_installation(id)?;
        if let Some(key) = self.owners.get(id) {
            return Ok(key.clone());
        }
        let key = anonymous_key(id);
        self.users.entry(key.clone()).or_default();
        self.owners.insert(id.to_string(), key.clone());
        Ok(key)
    }

    fn full_user(&self, key: &str) -> User {
        let mut user = self.users.get(key).cloned().unwrap_or_default();
        let installations: Vec<Installation> = self
            .installations
            .iter()
            .filter(|(id, _)| self.owners.get(*id).map(String::as_str) == Some(key))
            .map(|(_, installation)| installation.clone())
            .collect();
        user.installations = Some(installations);
        user
    }

    fn post_instance(&mut self, body: Value) -> ServerReply {
        let mut installation: Installation = from_json(body)?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        installation.push_registration_id = Some(id.clone());
        self.installations.insert(id, installation.clone());
        Ok(RemoteResponse::with_body(to_json(&installation)?))
    }

    fn patch_instance(&mut self, auth_id: &str, id: &str, body: Value) -> ServerReply {
        let auth_owner = self.owner(auth_id)?;
        if auth_id != id && self.owner(id)? != auth_owner {
            return Err(forbidden(id));
        }

        let patched: Installation = merge(self.require_installation(id)?, body)?;
        if patched.is_primary_device {
            for (other, installation) in self.installations.iter_mut() {
                if other != id && self.owners.get(other) == Some(&auth_owner) {
                    installation.is_primary_device = false;
                }
            }
        }
        self.installations.insert(id.to_string(), patched);
        Ok(RemoteResponse::empty())
    }

    fn patch_user(&mut self, id: &str, body: Value) -> ServerReply {
        let key = self.owner(id)?;
        let user = self.users.get(&key).cloned().unwrap_or_default();
        let patched: User = merge(&user, body)?;
        self.users.insert(key, User {
            installations: None,
            ..patched
        });
        Ok(RemoteResponse::empty())
    }

    fn personalize(&mut self, id: &str, force: bool, body: Value) -> ServerReply {
        let current = self.owner(id)?;
        let identity = body.get("userIdentity").cloned().unwrap_or(Value::Null);
        let key = identity_key(&identity)
            .ok_or_else(|| ServiceException::new("USER_IDENTITY_MISSING", "userIdentity has no components"))?;

        if current != key && !current.starts_with(ANONYMOUS_PREFIX) {
            if !force {
                return Err(ServiceException::new(
                    "USER_MERGE_INTERRUPTED",
                    "installation is personalized with another user",
                ));
            }
            if let Some(installation) = self.installations.get_mut(id) {
                installation.is_primary_device = false;
            }
        }

        let mut fields = Map::new();
        for part in ["userIdentity", "userAttributes"] {
            if let Some(Value::Object(map)) = body.get(part) {
                fields.extend(map.clone());
            }
        }
        let user = self.users.get(&key).cloned().unwrap_or_default();
        let personalized: User = merge(&user, Value::Object(fields))?;
        self.users.insert(key.clone(), personalized);
        self.owners.insert(id.to_string(), key.clone());
        Ok(RemoteResponse::with_body(to_json(&self.full_user(&key))?))
    }

    fn depersonalize(&mut self, auth_id: &str, target: &str) -> ServerReply {
        let auth_owner = self.owner(auth_id)?;
        if auth_id != target && self.owner(target)? != auth_owner {
            return Err(forbidden(target));
        }

        let key = anonymous_key(target);
        self.users.insert(key.clone(), User::default());
        self.owners.insert(target.to_string(), key);
        if let Some(installation) = self.installations.get_mut(target) {
            installation.is_primary_device = false;
            installation.application_user_id = None;
        }
        Ok(RemoteResponse::empty())
    }
}

const ANONYMOUS_PREFIX: &str = "anonymous:";

fn anonymous_key(id: &str) -> String {
    format!("{ANONYMOUS_PREFIX}{id}")
}

fn identity_key(identity: &Value) -> Option<String> {
    if let Some(external) = identity.get("externalUserId").and_then(Value::as_str) {
        return Some(format!("external:{external}"));
    }
    let first = |list: &str, field: &str| {
        identity
            .get(list)
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get(field))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    first("phones", "number")
        .map(|number| format!("phone:{number}"))
        .or_else(|| first("emails", "address").map(|address| format!("email:{address}")))
}

fn forbidden(id: &str) -> ServiceException {
    ServiceException::new("FORBIDDEN", format!("installation {id} belongs to another user"))
}

fn invalid(err: serde_json::Error) -> ServiceException {
    ServiceException::new("INVALID_BODY", err.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, ServiceException> {
    serde_json::to_value(value).map_err(invalid)
}

fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ServiceException> {
    serde_json::from_value(value).map_err(invalid)
}

/// Shallow JSON merge: every top-level field of `patch` replaces the base's.
fn merge<T>(base: &T, patch: Value) -> Result<T, ServiceException>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut merged = to_json(base)?;
    if let (Value::Object(target), Value::Object(fields)) = (&mut merged, patch) {
        target.extend(fields);
    }
    from_json(merged)
}
