//! Catalog operations built on [`EcoMarketClient::execute`].
//!
//! Each wrapper decides its own error policy: listings degrade a non-array
//! body to an empty list, `get_product` maps 404 to `None`, and the
//! deletes turn a 409 into [`DeleteOutcome::Blocked`].

use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};

use crate::{
    ApiError, ConflictDetails, DeleteOutcome, EcoMarketClient, NewProduct, Product, RequestSpec,
    Result,
};

impl EcoMarketClient {
    /// `GET productos`
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        self.execute_with(&RequestSpec::get("productos"), decode_listing).await
    }

    /// `GET productos?categoria=...`. An empty category lists everything.
    pub async fn list_products_by_category(&self, categoria: &str) -> Result<Vec<Product>> {
        let mut spec = RequestSpec::get("productos");
        if !categoria.trim().is_empty() {
            spec = spec.with_query("categoria", categoria);
        }
        self.execute_with(&spec, decode_listing).await
    }

    /// `GET productos/{id}`. Returns `None` when the product does not exist.
    pub async fn get_product(&self, id: u64) -> Result<Option<Product>> {
        match self
            .execute_as::<Product>(RequestSpec::get(format!("productos/{id}")))
            .await
        {
            Ok(product) => Ok(Some(product)),
            Err(ApiError::Http { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// `GET productos?nombre=...`. An empty name lists everything.
    pub async fn search_products(&self, nombre: &str) -> Result<Vec<Product>> {
        let mut spec = RequestSpec::get("productos");
        if !nombre.trim().is_empty() {
            spec = spec.with_query("nombre", nombre);
        }
        self.execute_with(&spec, decode_listing).await
    }

    /// `POST productos`
    pub async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        let body = serde_json::to_value(product)
            .map_err(|err| ApiError::InvalidRequest(format!("cannot encode product: {err}")))?;
        self.execute_as(RequestSpec::post("productos", body)).await
    }

    /// `PATCH productos/{id}` sending only `fields`, which must be a JSON object.
    pub async fn patch_product(&self, id: u64, fields: JsonValue) -> Result<Product> {
        if !fields.as_object().is_some_and(|map| !map.is_empty()) {
            return Err(ApiError::InvalidRequest(
                "partial update needs a non-empty object of fields".to_owned(),
            ));
        }
        self.execute_as(RequestSpec::patch(format!("productos/{id}"), fields)).await
    }

    /// `PATCH productos/{id}` with only the price.
    pub async fn update_product_price(&self, id: u64, precio: f64) -> Result<Product> {
        if !precio.is_finite() {
            return Err(ApiError::InvalidRequest(format!(
                "non-finite price '{precio}' is unsupported"
            )));
        }
        self.patch_product(id, json!({ "precio": precio })).await
    }

    /// `DELETE productos/{id}`
    ///
    /// A product still referenced by orders answers 409 and comes back as
    /// [`DeleteOutcome::Blocked`]. A missing product stays an
    /// [`ApiError::Http`] with status 404.
    pub async fn delete_product(&self, id: u64) -> Result<DeleteOutcome> {
        self.delete_resource(format!("productos/{id}")).await
    }

    /// `GET productores/{id}/productos`
    pub async fn list_producer_products(&self, producer_id: u64) -> Result<Vec<Product>> {
        let spec = RequestSpec::get(format!("productores/{producer_id}/productos"));
        self.execute_with(&spec, decode_listing).await
    }

    /// `DELETE productores/{id}`
    ///
    /// A producer with active orders answers 409; that is reported as
    /// [`DeleteOutcome::Blocked`] with the server's reason and suggested action.
    pub async fn delete_producer(&self, id: u64) -> Result<DeleteOutcome> {
        self.delete_resource(format!("productores/{id}")).await
    }

    /// `POST pedidos`. The order shape is passed through untouched.
    pub async fn create_order(&self, order: JsonValue) -> Result<JsonValue> {
        self.execute(RequestSpec::post("pedidos", order)).await
    }

    async fn delete_resource(&self, endpoint: String) -> Result<DeleteOutcome> {
        match self.execute(RequestSpec::delete(endpoint)).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(ApiError::Conflict { message, payload }) => Ok(DeleteOutcome::Blocked(
                ConflictDetails::from_payload(&message, payload.as_ref()),
            )),
            Err(err) => Err(err),
        }
    }
}

fn decode_listing(status: StatusCode, body: JsonValue) -> Result<Vec<Product>> {
    if !body.is_array() {
        return Ok(Vec::new());
    }
    serde_json::from_value(body).map_err(|err| ApiError::MalformedResponse {
        status: status.as_u16(),
        message: format!("unexpected product listing shape: {err}"),
    })
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;

    use super::decode_listing;
    use crate::{ApiError, EcoMarketClient, ErrorKind};

    #[test]
    fn non_array_listing_is_empty() {
        assert!(decode_listing(StatusCode::OK, json!(null))
            .expect("must decode")
            .is_empty());
        assert!(decode_listing(StatusCode::OK, json!({"items": []}))
            .expect("must decode")
            .is_empty());
    }

    #[test]
    fn listing_with_bad_items_is_malformed_with_real_status() {
        let err = decode_listing(StatusCode::PARTIAL_CONTENT, json!([{"id": "x"}]))
            .expect_err("must fail");
        assert!(
            matches!(err, ApiError::MalformedResponse { status: 206, .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn patch_product_rejects_non_object_fields() {
        let client = EcoMarketClient::new("http://127.0.0.1:9/api");
        for fields in [json!(null), json!([1]), json!({})] {
            let err = client.patch_product(1, fields).await.expect_err("must fail");
            assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        }
    }
}
