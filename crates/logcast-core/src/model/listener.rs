//! Identidad de listener (job) en sus dos generaciones.
//!
//! Un listener se identifica por un UUID (generación legacy) o por un entero
//! (generación v2). Ambos espacios son disjuntos: un `Legacy` y un `Modern`
//! nunca colisionan aunque sus valores "se parezcan". Persistido, el par se
//! guarda como dos columnas de las que exactamente una es no nula.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identificador estructurado de jobs legacy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LegacyJobId(pub Uuid);

impl LegacyJobId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for LegacyJobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for LegacyJobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for LegacyJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identidad de un listener. Se transporta por todas las operaciones del
/// tracker; mezclar ambas identidades en una misma llamada no es
/// representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ListenerId {
    Legacy(LegacyJobId),
    Modern(i32),
}

impl ListenerId {
    pub fn legacy(id: Uuid) -> Self {
        Self::Legacy(LegacyJobId(id))
    }

    pub fn modern(id: i32) -> Self {
        Self::Modern(id)
    }

    pub fn legacy_id(&self) -> Option<&LegacyJobId> {
        match self {
            Self::Legacy(id) => Some(id),
            Self::Modern(_) => None,
        }
    }

    pub fn modern_id(&self) -> Option<i32> {
        match self {
            Self::Legacy(_) => None,
            Self::Modern(id) => Some(*id),
        }
    }

    /// Reconstruye la identidad desde el par de columnas persistido
    /// (`job_id`, `job_id_v2`). Devuelve `None` si ambas o ninguna están
    /// presentes.
    pub fn from_columns(job_id: Option<Uuid>, job_id_v2: Option<i32>) -> Option<Self> {
        match (job_id, job_id_v2) {
            (Some(id), None) => Some(Self::legacy(id)),
            (None, Some(id)) => Some(Self::Modern(id)),
            _ => None,
        }
    }

    /// Par de columnas (`job_id`, `job_id_v2`) para persistir esta identidad.
    pub fn to_columns(&self) -> (Option<Uuid>, Option<i32>) {
        match self {
            Self::Legacy(id) => (Some(id.0), None),
            Self::Modern(id) => (None, Some(*id)),
        }
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy(id) => write!(f, "job:{id}"),
            Self::Modern(id) => write!(f, "job_v2:{id}"),
        }
    }
}
