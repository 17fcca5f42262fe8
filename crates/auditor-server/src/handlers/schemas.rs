use axum::Json;
use common::{SchemaBundle, schema_bundle};

pub async fn schemas_handler() -> Json<SchemaBundle> {
    Json(schema_bundle())
}
