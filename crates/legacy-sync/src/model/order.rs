use serde::{Deserialize, Serialize};

/// `medio` written on every mirrored order.
pub const ORDER_MEDIUM: &str = "WEB";
/// `envio_empresa` written on every mirrored order.
pub const ORDER_COMPANY_SHIPMENT: i64 = 1;
/// `estado_pago` written on every mirrored order.
pub const ORDER_PAYMENT_STATUS: i64 = 1;

/// A delivery order as stored in the source `orders` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub receiver_name: Option<String>,
    pub receiver_phone: Option<String>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub sender_phone: Option<String>,
    pub user_id: Option<i64>,
    pub distance: Option<f64>,
    pub amount: Option<f64>,
    pub latitude_from: Option<f64>,
    pub longitude_from: Option<f64>,
    pub latitude_to: Option<f64>,
    pub longitude_to: Option<f64>,
    pub delivery_time: Option<String>,
    pub with_return: Option<i64>,
    pub invoice: Option<i64>,
    pub invoice_exempt: Option<i64>,
    pub invoice_doc: Option<String>,
    pub invoice_name: Option<String>,
    pub service_type: Option<String>,
    pub scheduled_date: Option<String>,
    pub order_type: Option<String>,
    pub wallet: Option<f64>,
    pub bank: Option<f64>,
    pub delivery_type: Option<String>,
}

/// A document reference attached to an order (`orders_references`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderReference {
    pub order_id: u64,
    pub document_number: Option<String>,
    pub status: Option<i64>,
}

/// The `pedidos` row an [`Order`] is projected into.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyOrder {
    pub nombre_receptor: Option<String>,
    pub telefono_receptor: Option<String>,
    pub descripcion_envio: Option<String>,
    pub forma_pago: Option<String>,
    pub emisor_telefono: Option<String>,
    pub id_user: Option<i64>,
    pub distancia: Option<f64>,
    pub monto: Option<f64>,
    pub latitud_desde: Option<f64>,
    pub longitud_desde: Option<f64>,
    pub latitud_hasta: Option<f64>,
    pub longitud_hasta: Option<f64>,
    pub tiempo: Option<String>,
    pub ida_y_vuelta: Option<i64>,
    pub factura: Option<i64>,
    pub exenta: Option<i64>,
    pub factura_ruc: Option<String>,
    pub factura_razonsocial: Option<String>,
    pub medio: &'static str,
    pub tipo_servicio: Option<String>,
    pub fecha_programada: Option<String>,
    pub tipo_pedido: Option<String>,
    pub deposito_billetera: Option<f64>,
    pub deposito_bancario: Option<f64>,
    pub envio_empresa: i64,
    pub categoria_vehiculo: Option<String>,
    pub estado_pago: i64,
}

impl From<&Order> for LegacyOrder {
    fn from(order: &Order) -> Self {
        Self {
            nombre_receptor: order.receiver_name.clone(),
            telefono_receptor: order.receiver_phone.clone(),
            descripcion_envio: order.description.clone(),
            forma_pago: order.payment_method.clone(),
            emisor_telefono: order.sender_phone.clone(),
            id_user: order.user_id,
            distancia: order.distance,
            monto: order.amount,
            latitud_desde: order.latitude_from,
            longitud_desde: order.longitude_from,
            latitud_hasta: order.latitude_to,
            longitud_hasta: order.longitude_to,
            tiempo: order.delivery_time.clone(),
            ida_y_vuelta: order.with_return,
            factura: order.invoice,
            exenta: order.invoice_exempt,
            factura_ruc: order.invoice_doc.clone(),
            factura_razonsocial: order.invoice_name.clone(),
            medio: ORDER_MEDIUM,
            tipo_servicio: order.service_type.clone(),
            fecha_programada: order.scheduled_date.clone(),
            tipo_pedido: order.order_type.clone(),
            deposito_billetera: order.wallet,
            deposito_bancario: order.bank,
            envio_empresa: ORDER_COMPANY_SHIPMENT,
            categoria_vehiculo: order.delivery_type.clone(),
            estado_pago: ORDER_PAYMENT_STATUS,
        }
    }
}

/// Projection returned by `GET /order/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub receptor: Option<String>,
    pub phone: Option<String>,
    pub observation: Option<String>,
    pub payment_method: Option<String>,
    pub status: Option<i64>,
    pub driver: Option<String>,
    pub driver_phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_fills_legacy_constants() {
        let order = Order {
            receiver_name: Some("Ana".into()),
            delivery_type: Some("moto".into()),
            ..Default::default()
        };
        let legacy = LegacyOrder::from(&order);
        assert_eq!(legacy.nombre_receptor.as_deref(), Some("Ana"));
        assert_eq!(legacy.categoria_vehiculo.as_deref(), Some("moto"));
        assert_eq!(legacy.medio, "WEB");
        assert_eq!(legacy.envio_empresa, 1);
        assert_eq!(legacy.estado_pago, 1);
    }

    #[test]
    fn view_uses_camel_case_keys() {
        let view = OrderView {
            payment_method: Some("cash".into()),
            driver_phone: Some("0981".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["paymentMethod"], "cash");
        assert_eq!(json["driverPhone"], "0981");
        assert!(json.get("payment_method").is_none());
    }
}
