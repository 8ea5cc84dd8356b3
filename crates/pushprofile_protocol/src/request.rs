//! Structured requests handed to a transport.

use crate::delta::Delta;
use crate::error::{ProtocolError, ProtocolResult};
use crate::identity::{UserAttributes, UserIdentity};
use serde_json::{Map, Value};

/// HTTP method of a remote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PATCH.
    Patch,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
        }
    }
}

/// The remote call a request performs, with the ids it is scoped by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Registers a new installation.
    PostInstance,
    /// Reads an installation.
    GetInstance {
        /// Installation to read (also authorizes the call).
        push_registration_id: String,
    },
    /// Partially updates the current installation.
    PatchInstance {
        /// Installation to update (also authorizes the call).
        push_registration_id: String,
    },
    /// Partially updates another installation of the same user.
    PatchOtherInstance {
        /// Current installation, authorizing the call.
        auth_push_registration_id: String,
        /// Installation being updated.
        push_registration_id: String,
    },
    /// Reads the user.
    GetUser {
        /// Authorizing installation.
        push_registration_id: String,
    },
    /// Partially updates the user.
    PatchUser {
        /// Authorizing installation.
        push_registration_id: String,
    },
    /// Associates an identity with the current installation.
    Personalize {
        /// Authorizing installation.
        push_registration_id: String,
        /// Depersonalize from a previous identity first.
        force_depersonalize: bool,
    },
    /// Dissociates an installation from its user.
    Depersonalize {
        /// Authorizing installation.
        push_registration_id: String,
        /// Installation to depersonalize; `None` means the authorizing one.
        target_push_registration_id: Option<String>,
    },
}

impl RequestKind {
    /// Short endpoint label used in logs and fixtures.
    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::PostInstance => "post_instance",
            RequestKind::GetInstance { .. } => "get_instance",
            RequestKind::PatchInstance { .. } => "patch_instance",
            RequestKind::PatchOtherInstance { .. } => "patch_other_instance",
            RequestKind::GetUser { .. } => "get_user",
            RequestKind::PatchUser { .. } => "patch_user",
            RequestKind::Personalize { .. } => "personalize",
            RequestKind::Depersonalize { .. } => "depersonalize",
        }
    }
}

/// A structured request; the transport owns base URL, headers and encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    /// Application code identifying the tenant application.
    pub application_code: String,
    /// What the request does.
    pub kind: RequestKind,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl RemoteRequest {
    /// Registers an installation from its full snapshot.
    pub fn post_instance(application_code: &str, body: Value) -> ProtocolResult<Self> {
        Self::build(application_code, RequestKind::PostInstance, Some(require_object(body)?))
    }

    /// Reads an installation.
    pub fn get_instance(application_code: &str, push_registration_id: &str) -> ProtocolResult<Self> {
        let kind = RequestKind::GetInstance {
            push_registration_id: require_id("push registration id", push_registration_id)?,
        };
        Self::build(application_code, kind, None)
    }

    /// Sends a delta of the current installation.
    pub fn patch_instance(
        application_code: &str,
        push_registration_id: &str,
        delta: Delta,
    ) -> ProtocolResult<Self> {
        let kind = RequestKind::PatchInstance {
            push_registration_id: require_id("push registration id", push_registration_id)?,
        };
        Self::build(application_code, kind, Some(require_patch(delta)?))
    }

    /// Updates another installation on behalf of the current one.
    pub fn patch_other_instance(
        application_code: &str,
        auth_push_registration_id: &str,
        push_registration_id: &str,
        body: Map<String, Value>,
    ) -> ProtocolResult<Self> {
        if body.is_empty() {
            return Err(ProtocolError::invalid("patch body must not be empty"));
        }
        let kind = RequestKind::PatchOtherInstance {
            auth_push_registration_id: require_id("authorizing push registration id", auth_push_registration_id)?,
            push_registration_id: require_id("push registration id", push_registration_id)?,
        };
        Self::build(application_code, kind, Some(Value::Object(body)))
    }

    /// Reads the user.
    pub fn get_user(application_code: &str, push_registration_id: &str) -> ProtocolResult<Self> {
        let kind = RequestKind::GetUser {
            push_registration_id: require_id("push registration id", push_registration_id)?,
        };
        Self::build(application_code, kind, None)
    }

    /// Sends a delta of the user.
    pub fn patch_user(application_code: &str, push_registration_id: &str, delta: Delta) -> ProtocolResult<Self> {
        let kind = RequestKind::PatchUser {
            push_registration_id: require_id("push registration id", push_registration_id)?,
        };
        Self::build(application_code, kind, Some(require_patch(delta)?))
    }

    /// Personalizes the current installation.
    pub fn personalize(
        application_code: &str,
        push_registration_id: &str,
        force_depersonalize: bool,
        identity: &UserIdentity,
        attributes: Option<&UserAttributes>,
    ) -> ProtocolResult<Self> {
        let mut body = Map::new();
        body.insert("userIdentity".into(), identity.to_body());
        if let Some(attributes) = attributes {
            body.insert("userAttributes".into(), attributes.to_body());
        }
        let kind = RequestKind::Personalize {
            push_registration_id: require_id("push registration id", push_registration_id)?,
            force_depersonalize,
        };
        Self::build(application_code, kind, Some(Value::Object(body)))
    }

    /// Depersonalizes the current installation.
    pub fn depersonalize(application_code: &str, push_registration_id: &str) -> ProtocolResult<Self> {
        let kind = RequestKind::Depersonalize {
            push_registration_id: require_id("push registration id", push_registration_id)?,
            target_push_registration_id: None,
        };
        Self::build(application_code, kind, None)
    }

    /// Depersonalizes another installation on behalf of the current one.
    pub fn depersonalize_other(
        application_code: &str,
        auth_push_registration_id: &str,
        target_push_registration_id: &str,
    ) -> ProtocolResult<Self> {
        let kind = RequestKind::Depersonalize {
            push_registration_id: require_id("authorizing push registration id", auth_push_registration_id)?,
            target_push_registration_id: Some(require_id(
                "target push registration id",
                target_push_registration_id,
            )?),
        };
        Self::build(application_code, kind, None)
    }

    fn build(application_code: &str, kind: RequestKind, body: Option<Value>) -> ProtocolResult<Self> {
        if application_code.trim().is_empty() {
            return Err(ProtocolError::invalid("application code must not be empty"));
        }
        Ok(Self {
            application_code: application_code.to_string(),
            kind,
            body,
        })
    }

    /// Returns the installation id authorizing this request, if any.
    pub fn auth_push_registration_id(&self) -> Option<&str> {
        match &self.kind {
            RequestKind::PostInstance => None,
            RequestKind::PatchOtherInstance {
                auth_push_registration_id,
                ..
            } => Some(auth_push_registration_id),
            RequestKind::GetInstance { push_registration_id }
            | RequestKind::PatchInstance { push_registration_id }
            | RequestKind::GetUser { push_registration_id }
            | RequestKind::PatchUser { push_registration_id }
            | RequestKind::Personalize {
                push_registration_id,
                ..
            }
            | RequestKind::Depersonalize {
                push_registration_id,
                ..
            } => Some(push_registration_id),
        }
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> Method {
        match self.kind {
            RequestKind::GetInstance { .. } | RequestKind::GetUser { .. } => Method::Get,
            RequestKind::PatchInstance { .. }
            | RequestKind::PatchOtherInstance { .. }
            | RequestKind::PatchUser { .. } => Method::Patch,
            RequestKind::PostInstance
            | RequestKind::Personalize { .. }
            | RequestKind::Depersonalize { .. } => Method::Post,
        }
    }

    /// Returns the path and query relative to the base URL.
    pub fn path(&self) -> String {
        match &self.kind {
            RequestKind::PostInstance => "/mobile/5/appinstance".to_string(),
            RequestKind::GetInstance { push_registration_id }
            | RequestKind::PatchInstance { push_registration_id } => {
                format!("/mobile/5/appinstance/{push_registration_id}")
            }
            RequestKind::PatchOtherInstance {
                auth_push_registration_id,
                push_registration_id,
            } => format!(
                "/mobile/5/appinstance/{auth_push_registration_id}/user/appinstance/{push_registration_id}"
            ),
            RequestKind::GetUser { push_registration_id }
            | RequestKind::PatchUser { push_registration_id } => {
                format!("/mobile/6/appinstance/{push_registration_id}/user")
            }
            RequestKind::Personalize {
                push_registration_id,
                force_depersonalize,
            } => format!(
                "/mobile/1/appinstance/{push_registration_id}/personalize?forceDepersonalize={force_depersonalize}"
            ),
            RequestKind::Depersonalize {
                push_registration_id,
                target_push_registration_id: None,
            } => format!("/mobile/1/appinstance/{push_registration_id}/depersonalize"),
            RequestKind::Depersonalize {
                push_registration_id,
                target_push_registration_id: Some(target),
            } => format!(
                "/mobile/1/appinstance/{push_registration_id}/depersonalize?pushRegistrationId={target}"
            ),
        }
    }
}

fn require_id(what: &str, id: &str) -> ProtocolResult<String> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(id.to_string())
    } else {
        Err(ProtocolError::invalid(format!("{what} {id:?} is not a valid id")))
    }
}

fn require_patch(delta: Delta) -> ProtocolResult<Value> {
    if delta.is_empty() {
        return Err(ProtocolError::invalid("patch body must not be empty"));
    }
    Ok(delta.into_body())
}

fn require_object(body: Value) -> ProtocolResult<Value> {
    match body {
        Value::Object(map) if !map.is_empty() => Ok(Value::Object(map)),
        _ => Err(ProtocolError::invalid("request body must be a non-empty object")),
    }
}

fn primary_flag_body(make_primary: bool) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("isPrimary".into(), Value::Bool(make_primary));
    body
}

impl RemoteRequest {
    /// Flags another installation as primary (or clears the flag).
    pub fn set_other_primary(
        application_code: &str,
        auth_push_registration_id: &str,
        push_registration_id: &str,
        make_primary: bool,
    ) -> ProtocolResult<Self> {
        Self::patch_other_instance(
            application_code,
            auth_push_registration_id,
            push_registration_id,
            primary_flag_body(make_primary),
        )
    }
}
