//! Opaque object references.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A transport-capable handle to some remote object.
///
/// The naming service never looks inside references it did not create; it
/// only stores their codec string. References to local naming contexts carry
/// the context identifier as `object_key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Repository id of the target interface, e.g. `IDL:omg.org/CosNaming/NamingContextExt:1.0`.
    pub type_id: String,
    /// `host:port` the object is reachable at.
    pub endpoint: String,
    pub object_key: String,
}

impl ObjectRef {
    pub fn new(
        type_id: impl Into<String>,
        endpoint: impl Into<String>,
        object_key: impl Into<String>,
    ) -> Self {
        Self {
            type_id: type_id.into(),
            endpoint: endpoint.into(),
            object_key: object_key.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.type_id, self.endpoint, self.object_key)
    }
}
