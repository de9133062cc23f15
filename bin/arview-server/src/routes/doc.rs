use crate::routes::{health, models, qr};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(info(
    title = "arview-server",
    description = "Model registry with access control and viewer QR codes",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(models::ModelsApi::openapi());
    root.merge(qr::QrApi::openapi());
    root
}
