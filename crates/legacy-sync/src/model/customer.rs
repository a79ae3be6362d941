use serde::{Deserialize, Serialize};

/// A customer row as read from the source schema.
///
/// The same shape is used for the downstream `mp_clientes` mirror, which stores every field
/// except the mapping column.
///
/// Synced by [`customer_actor`](crate::customer_actor).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub user_id: Option<i64>,
    pub status: Option<i64>,
    pub references: Option<String>,
    /// Downstream id of the mirror row; `None` or `0` until first synced.
    pub sync_id: Option<u64>,
}

impl Customer {
    /// The mirror projection: every domain field, no mapping.
    pub fn mirrored(&self) -> Self {
        Self {
            sync_id: None,
            ..self.clone()
        }
    }
}
