//! MySQL store on a bounded sqlx pool.
//!
//! Both schemas live on the same server, so one transaction covers the source and downstream
//! writes of a sync. Every statement is rendered once, at construction, from the two validated
//! schema names; all values are bound parameters.
//!
//! Reads cast numeric columns explicitly (`SIGNED`, `DOUBLE`) so decoding does not depend on the
//! exact legacy column types. Mirror writes never go through those decoded values: inserts and
//! updates both copy the raw source columns server-side, from one shared column list.
//!
//! MySQL reports *changed* rather than *matched* rows for `UPDATE`, so an update that affects
//! nothing is followed by an existence probe before it is reported as a miss.

use super::{OrderLookup, StoreError, StoreResult, SyncTx};
use crate::config::{DatabaseConfig, SyncOptions};
use crate::model::order::{ORDER_COMPANY_SHIPMENT, ORDER_MEDIUM, ORDER_PAYMENT_STATUS};
use crate::model::{Customer, OrderView, Origin};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlQueryResult};
use sqlx::{FromRow, MySql, MySqlConnection, MySqlPool};
use std::sync::Arc;
use std::time::Duration;
use sync_framework::{MirrorId, SourceId, SyncError, Transaction, TxSource};
use tracing::{debug, info};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Quotes a schema name after checking it is a plain identifier.
fn quote_schema(name: &str) -> StoreResult<String> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(format!("`{name}`"))
    } else {
        Err(StoreError::InvalidSchema(name.to_string()))
    }
}

/// Downstream customer column and the source column it is copied from.
const CUSTOMER_COLUMNS: &[(&str, &str)] = &[
    ("nombre", "full_name"),
    ("telefono", "phone"),
    ("direccion", "address"),
    ("correo", "email"),
    ("latitud", "latitude"),
    ("longitud", "longitude"),
    ("id_users", "user_id"),
    ("estado", "status"),
    ("referencia", "references"),
];

const ORIGIN_COLUMNS: &[(&str, &str)] = &[
    ("nombre", "name"),
    ("telefono", "phone"),
    ("direccion", "address"),
    ("correo", "email"),
    ("latitud", "latitude"),
    ("longitud", "longitude"),
    ("id_users", "user_id"),
    ("estado", "status"),
    ("referencia", "references"),
    ("predeterminado", "default"),
];

/// `INSERT ... SELECT` of one source row into `mirror`. Binds the source id.
fn insert_projection(mirror: &str, source: &str, columns: &[(&str, &str)]) -> String {
    let targets: Vec<String> = columns.iter().map(|(dst, _)| format!("`{dst}`")).collect();
    let values: Vec<String> = columns.iter().map(|(_, src)| format!("s.`{src}`")).collect();
    format!(
        "INSERT INTO {mirror} ({}) SELECT {} FROM {source} s WHERE s.id = ?",
        targets.join(", "),
        values.join(", ")
    )
}

/// `UPDATE ... JOIN` copying one source row onto an existing mirror row. Binds the source id,
/// then the mirror id.
fn update_projection(mirror: &str, source: &str, columns: &[(&str, &str)]) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .map(|(dst, src)| format!("m.`{dst}` = s.`{src}`"))
        .collect();
    format!(
        "UPDATE {mirror} m JOIN {source} s ON s.id = ? SET {} WHERE m.id = ?",
        assignments.join(", ")
    )
}

/// Statements rendered for one pair of schemas.
#[derive(Debug)]
struct Queries {
    select_customer: String,
    update_customer_mirror: String,
    insert_customer_mirror: String,
    set_customer_mapping: String,
    probe_customer_mirror: String,
    probe_customer: String,

    select_origin: String,
    update_origin_mirror: String,
    insert_origin_mirror: String,
    set_origin_mapping: String,
    probe_origin_mirror: String,
    probe_origin: String,
    clear_mirror_origin_defaults: String,
    clear_source_origin_defaults: String,

    insert_order_mirror: String,
    copy_order_references: String,
    select_order_view: String,
}

impl Queries {
    fn render(source: &str, downstream: &str) -> StoreResult<Self> {
        let src = quote_schema(source)?;
        let dst = quote_schema(downstream)?;

        Ok(Self {
            select_customer: format!(
                "SELECT c.full_name AS name, c.phone, c.address, c.email, \
                 CAST(c.latitude AS DOUBLE) AS latitude, CAST(c.longitude AS DOUBLE) AS longitude, \
                 CAST(c.user_id AS SIGNED) AS user_id, CAST(c.status AS SIGNED) AS status, \
                 c.`references` AS refs, CAST(0 AS SIGNED) AS is_default, \
                 CAST(c.sync_id AS SIGNED) AS sync_id \
                 FROM {src}.`customer` c WHERE c.id = ?"
            ),
            update_customer_mirror: update_projection(
                &format!("{dst}.`mp_clientes`"),
                &format!("{src}.`customer`"),
                CUSTOMER_COLUMNS,
            ),
            insert_customer_mirror: insert_projection(
                &format!("{dst}.`mp_clientes`"),
                &format!("{src}.`customer`"),
                CUSTOMER_COLUMNS,
            ),
            set_customer_mapping: format!("UPDATE {src}.`customer` SET sync_id = ? WHERE id = ?"),
            probe_customer_mirror: format!("SELECT COUNT(*) FROM {dst}.`mp_clientes` WHERE id = ?"),
            probe_customer: format!("SELECT COUNT(*) FROM {src}.`customer` WHERE id = ?"),

            select_origin: format!(
                "SELECT o.name, o.phone, o.address, o.email, \
                 CAST(o.latitude AS DOUBLE) AS latitude, CAST(o.longitude AS DOUBLE) AS longitude, \
                 CAST(o.user_id AS SIGNED) AS user_id, CAST(o.status AS SIGNED) AS status, \
                 o.`references` AS refs, CAST(o.`default` AS SIGNED) AS is_default, \
                 CAST(o.sync_id AS SIGNED) AS sync_id \
                 FROM {src}.`origin` o WHERE o.id = ?"
            ),
            update_origin_mirror: update_projection(
                &format!("{dst}.`mp_origen`"),
                &format!("{src}.`origin`"),
                ORIGIN_COLUMNS,
            ),
            insert_origin_mirror: insert_projection(
                &format!("{dst}.`mp_origen`"),
                &format!("{src}.`origin`"),
                ORIGIN_COLUMNS,
            ),
            set_origin_mapping: format!("UPDATE {src}.`origin` SET sync_id = ? WHERE id = ?"),
            probe_origin_mirror: format!("SELECT COUNT(*) FROM {dst}.`mp_origen` WHERE id = ?"),
            probe_origin: format!("SELECT COUNT(*) FROM {src}.`origin` WHERE id = ?"),
            clear_mirror_origin_defaults: format!(
                "UPDATE {dst}.`mp_origen` SET predeterminado = 0 \
                 WHERE id_users = ? AND id <> ? AND predeterminado <> 0"
            ),
            clear_source_origin_defaults: format!(
                "UPDATE {src}.`origin` SET `default` = 0 \
                 WHERE user_id = ? AND id <> ? AND `default` <> 0"
            ),

            insert_order_mirror: format!(
                "INSERT INTO {dst}.`pedidos` (\
                 nombreReceptor, telefonoReceptor, descripcionEnvio, formaPago, emisorTelefono, \
                 idUser, distancia, monto, latitudDesde, longitudDesde, latitudHasta, \
                 longitudHasta, tiempo, idaYvuelta, factura, exenta, factura_ruc, \
                 factura_razonsocial, medio, tipoServicio, fechaProgramada, tipo_pedido, \
                 depositoBilletera, depositoBancario, envio_empresa, categoria_vehiculo, \
                 estado_pago) \
                 SELECT receiver_name, receiver_phone, description, payment_method, sender_phone, \
                 user_id, distance, amount, latitude_from, longitude_from, latitude_to, \
                 longitude_to, delivery_time, with_return, invoice, invoice_exempt, invoice_doc, \
                 invoice_name, ?, service_type, scheduled_date, order_type, wallet, bank, ?, \
                 delivery_type, ? \
                 FROM {src}.`orders` WHERE id = ?"
            ),
            copy_order_references: format!(
                "INSERT INTO {dst}.`pedidos_referencias` (id_pedidos, nro_doc, estado) \
                 SELECT ?, document_number, status \
                 FROM {src}.`orders_references` WHERE order_id = ?"
            ),
            select_order_view: format!(
                "SELECT CAST(p.nombreReceptor AS CHAR) AS receptor, \
                 CAST(p.telefonoReceptor AS CHAR) AS phone, \
                 CAST(p.descripcionEnvio AS CHAR) AS observation, \
                 CAST(p.formaPago AS CHAR) AS payment_method, \
                 CAST(p.estadoPedido AS SIGNED) AS status, \
                 CAST(u.name AS CHAR) AS driver, \
                 CAST(u.telefono AS CHAR) AS driver_phone \
                 FROM {dst}.`pedidos` p \
                 LEFT JOIN {dst}.`pedidos_movimiento` pm ON p.id = pm.id_pedidos \
                 LEFT JOIN {dst}.`users` u ON u.id = pm.id_users \
                 WHERE p.id = ? LIMIT 1"
            ),
        })
    }
}

/// Shape shared by customer and origin reads.
#[derive(Debug, FromRow)]
struct ContactRow {
    name: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    email: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    user_id: Option<i64>,
    status: Option<i64>,
    refs: Option<String>,
    is_default: Option<i64>,
    sync_id: Option<i64>,
}

impl ContactRow {
    fn sync_id(&self) -> Option<u64> {
        self.sync_id.and_then(|v| u64::try_from(v).ok())
    }

    fn into_customer(self) -> Customer {
        let sync_id = self.sync_id();
        Customer {
            full_name: self.name,
            phone: self.phone,
            address: self.address,
            email: self.email,
            latitude: self.latitude,
            longitude: self.longitude,
            user_id: self.user_id,
            status: self.status,
            references: self.refs,
            sync_id,
        }
    }

    fn into_origin(self) -> Origin {
        let sync_id = self.sync_id();
        Origin {
            name: self.name,
            phone: self.phone,
            address: self.address,
            email: self.email,
            latitude: self.latitude,
            longitude: self.longitude,
            user_id: self.user_id,
            status: self.status,
            references: self.refs,
            is_default: self.is_default.unwrap_or(0) != 0,
            sync_id,
        }
    }
}

#[derive(Debug, FromRow)]
struct OrderViewRow {
    receptor: Option<String>,
    phone: Option<String>,
    observation: Option<String>,
    payment_method: Option<String>,
    status: Option<i64>,
    driver: Option<String>,
    driver_phone: Option<String>,
}

impl From<OrderViewRow> for OrderView {
    fn from(row: OrderViewRow) -> Self {
        Self {
            receptor: row.receptor,
            phone: row.phone,
            observation: row.observation,
            payment_method: row.payment_method,
            status: row.status,
            driver: row.driver,
            driver_phone: row.driver_phone,
        }
    }
}

#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
    queries: Arc<Queries>,
    strict_default_clearing: bool,
}

impl MySqlStore {
    /// Opens the pool. Fails on an invalid schema name or an unreachable server.
    pub async fn connect(config: &DatabaseConfig, options: &SyncOptions) -> StoreResult<Self> {
        let queries = Queries::render(&config.source_schema, &config.downstream_schema)?;
        // Credentials stay out of the logs.
        let connect_options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.pass)
            .database(&config.downstream_schema);
        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(connect_options)
            .await?;
        info!(
            host = %config.host,
            port = config.port,
            pool_size = config.pool_size,
            "MySQL pool ready"
        );

        Ok(Self {
            pool,
            queries: Arc::new(queries),
            strict_default_clearing: options.strict_default_clearing,
        })
    }

    /// Round-trips `SELECT 1`.
    pub async fn verify(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        debug!("MySQL connection verified");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TxSource for MySqlStore {
    type Tx = MySqlTx;

    async fn begin(&self) -> Result<MySqlTx, SyncError> {
        let tx = self.pool.begin().await.map_err(StoreError::from)?;
        Ok(MySqlTx {
            tx,
            queries: self.queries.clone(),
            strict_default_clearing: self.strict_default_clearing,
        })
    }
}

#[async_trait]
impl OrderLookup for MySqlStore {
    async fn order_view(&self, order_id: u64) -> StoreResult<Option<OrderView>> {
        let row = sqlx::query_as::<_, OrderViewRow>(&self.queries.select_order_view)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(OrderView::from))
    }
}

/// One pooled connection inside `BEGIN`. Dropping it without commit rolls back and returns
/// the connection to the pool.
pub struct MySqlTx {
    tx: sqlx::Transaction<'static, MySql>,
    queries: Arc<Queries>,
    strict_default_clearing: bool,
}

/// Rows matched by an update: the changed count, or 1 when nothing changed but the row exists.
async fn matched(
    conn: &mut MySqlConnection,
    result: MySqlQueryResult,
    probe: &str,
    id: u64,
) -> StoreResult<u64> {
    let affected = result.rows_affected();
    if affected > 0 {
        return Ok(affected);
    }
    let count: i64 = sqlx::query_scalar(probe).bind(id).fetch_one(conn).await?;
    Ok(u64::try_from(count).unwrap_or(0))
}

fn inserted_id(result: &MySqlQueryResult) -> Option<MirrorId> {
    (result.rows_affected() > 0).then(|| MirrorId(result.last_insert_id()))
}

#[async_trait]
impl Transaction for MySqlTx {
    async fn commit(self) -> Result<(), SyncError> {
        self.tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), SyncError> {
        self.tx.rollback().await.map_err(StoreError::from)?;
        Ok(())
    }
}

#[async_trait]
impl SyncTx for MySqlTx {
    fn strict_default_clearing(&self) -> bool {
        self.strict_default_clearing
    }

    async fn load_customer(&mut self, id: SourceId) -> StoreResult<Option<Customer>> {
        let row = sqlx::query_as::<_, ContactRow>(&self.queries.select_customer)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(ContactRow::into_customer))
    }

    async fn update_customer_mirror(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64> {
        let result = sqlx::query(&self.queries.update_customer_mirror)
            .bind(id.0)
            .bind(mirror.0)
            .execute(&mut *self.tx)
            .await?;
        matched(&mut self.tx, result, &self.queries.probe_customer_mirror, mirror.0).await
    }

    async fn insert_customer_mirror(&mut self, id: SourceId) -> StoreResult<Option<MirrorId>> {
        let result = sqlx::query(&self.queries.insert_customer_mirror)
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(inserted_id(&result))
    }

    async fn set_customer_mapping(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64> {
        let result = sqlx::query(&self.queries.set_customer_mapping)
            .bind(mirror.0)
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        matched(&mut self.tx, result, &self.queries.probe_customer, id.0).await
    }

    async fn load_origin(&mut self, id: SourceId) -> StoreResult<Option<Origin>> {
        let row = sqlx::query_as::<_, ContactRow>(&self.queries.select_origin)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(ContactRow::into_origin))
    }

    async fn update_origin_mirror(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64> {
        let result = sqlx::query(&self.queries.update_origin_mirror)
            .bind(id.0)
            .bind(mirror.0)
            .execute(&mut *self.tx)
            .await?;
        matched(&mut self.tx, result, &self.queries.probe_origin_mirror, mirror.0).await
    }

    async fn insert_origin_mirror(&mut self, id: SourceId) -> StoreResult<Option<MirrorId>> {
        let result = sqlx::query(&self.queries.insert_origin_mirror)
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(inserted_id(&result))
    }

    async fn set_origin_mapping(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64> {
        let result = sqlx::query(&self.queries.set_origin_mapping)
            .bind(mirror.0)
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        matched(&mut self.tx, result, &self.queries.probe_origin, id.0).await
    }

    async fn clear_mirror_origin_defaults(
        &mut self,
        user_id: i64,
        keep: Option<MirrorId>,
    ) -> StoreResult<u64> {
        // Mirror ids start at 1, so 0 excludes nothing.
        let keep = keep.map_or(0, |m| m.0);
        let result = sqlx::query(&self.queries.clear_mirror_origin_defaults)
            .bind(user_id)
            .bind(keep)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn clear_source_origin_defaults(
        &mut self,
        user_id: i64,
        keep: SourceId,
    ) -> StoreResult<u64> {
        let result = sqlx::query(&self.queries.clear_source_origin_defaults)
            .bind(user_id)
            .bind(keep.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_order_mirror(&mut self, id: SourceId) -> StoreResult<Option<MirrorId>> {
        let result = sqlx::query(&self.queries.insert_order_mirror)
            .bind(ORDER_MEDIUM)
            .bind(ORDER_COMPANY_SHIPMENT)
            .bind(ORDER_PAYMENT_STATUS)
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(inserted_id(&result))
    }

    async fn copy_order_references(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64> {
        let result = sqlx::query(&self.queries.copy_order_references)
            .bind(mirror.0)
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_names_are_validated() {
        assert_eq!(quote_schema("ahoraite_api").unwrap(), "`ahoraite_api`");
        for bad in ["", "api`; DROP TABLE x", "my-db", "a.b", "sch ema"] {
            assert!(matches!(quote_schema(bad), Err(StoreError::InvalidSchema(_))), "{bad}");
        }
        assert!(Queries::render("ok", "not ok").is_err());
    }

    #[test]
    fn statements_target_both_schemas() {
        let q = Queries::render("api", "legacy").unwrap();
        assert!(q.select_customer.contains("FROM `api`.`customer`"));
        assert!(q.insert_customer_mirror.starts_with("INSERT INTO `legacy`.`mp_clientes`"));
        assert!(q.set_origin_mapping.starts_with("UPDATE `api`.`origin`"));
        assert!(q.copy_order_references.contains("`api`.`orders_references`"));
        assert!(q.select_order_view.contains("`legacy`.`pedidos_movimiento`"));
    }

    #[test]
    fn reserved_columns_are_quoted() {
        let q = Queries::render("api", "legacy").unwrap();
        assert!(q.select_origin.contains("o.`default`"));
        assert!(q.select_origin.contains("o.`references`"));
        assert!(q.clear_source_origin_defaults.contains("SET `default` = 0"));
        assert!(!q.select_customer.contains(" references,"));
    }

    #[test]
    fn mirror_updates_copy_the_same_raw_columns_as_inserts() {
        let q = Queries::render("api", "legacy").unwrap();
        for (update, insert, columns) in [
            (&q.update_customer_mirror, &q.insert_customer_mirror, CUSTOMER_COLUMNS),
            (&q.update_origin_mirror, &q.insert_origin_mirror, ORIGIN_COLUMNS),
        ] {
            assert!(!update.contains("CAST"), "{update}");
            assert_eq!(update.matches('?').count(), 2, "{update}");
            for (dst, src) in columns {
                assert!(update.contains(&format!("m.`{dst}` = s.`{src}`")), "{update}");
                assert!(insert.contains(&format!("`{dst}`")), "{insert}");
                assert!(insert.contains(&format!("s.`{src}`")), "{insert}");
            }
        }
        assert!(q
            .update_origin_mirror
            .starts_with("UPDATE `legacy`.`mp_origen` m JOIN `api`.`origin` s ON s.id = ?"));
    }

    #[test]
    fn order_insert_binds_constants_and_id() {
        let q = Queries::render("api", "legacy").unwrap();
        assert_eq!(q.insert_order_mirror.matches('?').count(), 4);
    }
}
