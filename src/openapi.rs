use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::ErrorResponse;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Atelier API",
        version = "0.1.0",
        description = r#"
Commerce backend for an art print storefront.

Storefront surface: product catalog, carts, shipping quotes, coupon
validation and checkout. Back-office surface (admin bearer token): order
lifecycle, fulfillment, refunds, coupons and analytics.

Obtain an admin token via `POST /api/v1/auth/token` and send it as
`Authorization: Bearer <token>`.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    components(schemas(ErrorResponse)),
    tags(
        (name = "storefront", description = "Anonymous catalog, cart and checkout endpoints"),
        (name = "admin", description = "Back-office order, coupon and analytics endpoints")
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at `/docs`, serving the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
