use serde::{Deserialize, Serialize};

/// A pickup origin (address) owned by a user.
///
/// At most one origin per `user_id` may be flagged `is_default`, in the source schema and in the
/// downstream `mp_origen` mirror alike.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub user_id: Option<i64>,
    pub status: Option<i64>,
    pub references: Option<String>,
    pub is_default: bool,
    pub sync_id: Option<u64>,
}

impl Origin {
    pub fn mirrored(&self) -> Self {
        Self {
            sync_id: None,
            ..self.clone()
        }
    }
}
