//! Cart route handlers.
//!
//! Every handler answers with the same JSON envelope: the current cart and
//! its summary, plus an optional message for the UI. The cart belongs to the
//! signed-in user when there is one, otherwise to the guest session.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use yedek_core::{Cart, CartSummary, LineItemId, ProductId};

use crate::db::PgCartStore;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::CurrentUser;
use crate::services::CartView;
use crate::state::AppState;
use crate::store::RequestCartStore;

use super::extract::{JsonBody, PathParam};

/// Cart envelope returned by every mutating endpoint.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub cart: Cart,
    pub summary: CartSummary,
}

impl CartResponse {
    fn ok(view: CartView) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            cart: view.cart,
            summary: view.summary,
        })
    }

    fn with_message(view: CartView, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.into()),
            cart: view.cart,
            summary: view.summary,
        })
    }
}

/// Summary-only envelope.
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub success: bool,
    pub summary: CartSummary,
}

/// Item count envelope, for the header badge.
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub success: bool,
    pub count: u64,
}

/// Add to cart request body.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: Option<i64>,
}

/// Update quantity request body.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i64,
}

/// Apply discount request body.
#[derive(Debug, Deserialize)]
pub struct DiscountRequest {
    pub code: String,
}

// =============================================================================
// Owner Resolution
// =============================================================================

/// Pick the account cart for signed-in users, the session cart otherwise.
async fn request_store(
    state: &AppState,
    user: Option<CurrentUser>,
    session: Session,
) -> Result<RequestCartStore> {
    match user {
        Some(user) => Ok(RequestCartStore::Account(PgCartStore::new(
            state.pool().clone(),
            user.id,
        ))),
        None => state
            .guest_carts()
            .open(&session)
            .await
            .map(RequestCartStore::Guest)
            .map_err(|e| AppError::Internal(format!("session unavailable: {e}"))),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Show the cart with its totals.
#[instrument(skip_all)]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
) -> Result<Json<CartResponse>> {
    let store = request_store(&state, user, session).await?;
    let view = state.cart().get_cart(&store).await?;
    Ok(CartResponse::ok(view))
}

/// Show only the totals.
#[instrument(skip_all)]
pub async fn summary(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
) -> Result<Json<SummaryResponse>> {
    let store = request_store(&state, user, session).await?;
    let summary = state.cart().get_summary(&store).await?;
    Ok(Json(SummaryResponse {
        success: true,
        summary,
    }))
}

/// Units in the cart.
#[instrument(skip_all)]
pub async fn count(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
) -> Result<Json<CountResponse>> {
    let store = request_store(&state, user, session).await?;
    let count = state.cart().item_count(&store).await?;
    Ok(Json(CountResponse {
        success: true,
        count,
    }))
}

/// Add a product. Quantity defaults to one.
#[instrument(skip(state, user, session))]
pub async fn add(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
    JsonBody(body): JsonBody<AddItemRequest>,
) -> Result<Json<CartResponse>> {
    let store = request_store(&state, user, session).await?;
    let quantity = body.quantity.unwrap_or(1);

    let view = state
        .cart()
        .add_item(&store, body.product_id, quantity)
        .await?;

    let product_id = body.product_id.to_string();
    add_breadcrumb("cart", "Added item", Some(&[("product_id", product_id.as_str())]));
    Ok(CartResponse::with_message(view, "Added to your cart."))
}

/// Set a line's quantity. Zero or less removes the line.
#[instrument(skip(state, user, session))]
pub async fn update(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
    PathParam(line_id): PathParam<LineItemId>,
    JsonBody(body): JsonBody<UpdateItemRequest>,
) -> Result<Json<CartResponse>> {
    let store = request_store(&state, user, session).await?;
    let view = state
        .cart()
        .update_quantity(&store, line_id, body.quantity)
        .await?;
    Ok(CartResponse::ok(view))
}

/// Remove a line.
#[instrument(skip(state, user, session))]
pub async fn remove(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
    PathParam(line_id): PathParam<LineItemId>,
) -> Result<Json<CartResponse>> {
    let store = request_store(&state, user, session).await?;
    let view = state.cart().remove_item(&store, line_id).await?;
    Ok(CartResponse::with_message(view, "Removed from your cart."))
}

/// Empty the cart.
#[instrument(skip_all)]
pub async fn clear(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
) -> Result<Json<CartResponse>> {
    let store = request_store(&state, user, session).await?;
    let view = state.cart().clear_cart(&store).await?;
    add_breadcrumb("cart", "Cleared cart", None);
    Ok(CartResponse::with_message(view, "Your cart is empty."))
}

/// Apply a discount code.
#[instrument(skip(state, user, session))]
pub async fn apply_discount(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
    JsonBody(body): JsonBody<DiscountRequest>,
) -> Result<Json<CartResponse>> {
    let store = request_store(&state, user, session).await?;
    let view = state.cart().apply_discount(&store, &body.code).await?;
    Ok(CartResponse::with_message(view, "Discount applied."))
}

/// Remove the discount code.
#[instrument(skip_all)]
pub async fn remove_discount(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
) -> Result<Json<CartResponse>> {
    let store = request_store(&state, user, session).await?;
    let view = state.cart().remove_discount(&store).await?;
    Ok(CartResponse::ok(view))
}

/// Fold the session's guest cart into the signed-in user's cart.
#[instrument(skip_all)]
pub async fn merge(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
) -> Result<Json<CartResponse>> {
    let guest = state
        .guest_carts()
        .open(&session)
        .await
        .map_err(|e| AppError::Internal(format!("session unavailable: {e}")))?;
    let account = PgCartStore::new(state.pool().clone(), user.id);

    let view = state.cart().merge_guest_cart(&account, &guest).await?;
    add_breadcrumb("cart", "Merged guest cart", None);
    Ok(CartResponse::ok(view))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;
    use tower_sessions::MemoryStore;

    use crate::test_support::test_state;

    fn app() -> Router {
        let backend = MemoryStore::default();
        crate::app(test_state(&backend), backend)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, _, body) = send_with_cookie(app, request).await;
        (status, body)
    }

    async fn send_with_cookie(
        app: Router,
        request: Request<Body>,
    ) -> (StatusCode, Option<String>, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_owned);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, cookie, serde_json::from_slice(&bytes).unwrap())
    }

    fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_guest_gets_empty_cart() {
        let request = Request::get("/cart").body(Body::empty()).unwrap();
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["cart"]["owner"]["kind"], "guest");
        assert!(body["cart"]["items"].as_array().unwrap().is_empty());
        assert_eq!(body["summary"]["shipping"]["amount"], "0.00");
        assert_eq!(body["summary"]["total"]["amount"], "0.00");
    }

    #[tokio::test]
    async fn test_guest_count_is_zero() {
        let request = Request::get("/cart/count").body(Body::empty()).unwrap();
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn test_add_with_zero_quantity_is_rejected() {
        let request = json_request(
            "POST",
            "/cart/items",
            &serde_json::json!({ "product_id": uuid::Uuid::new_v4(), "quantity": 0 }),
        );
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Quantity must be at least 1.");
    }

    #[tokio::test]
    async fn test_unknown_discount_code_is_rejected() {
        let request = json_request(
            "POST",
            "/cart/discount",
            &serde_json::json!({ "code": "bedava100" }),
        );
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "The discount code BEDAVA100 is not valid.");
    }

    #[tokio::test]
    async fn test_known_discount_code_on_guest_cart() {
        let request = json_request(
            "POST",
            "/cart/discount",
            &serde_json::json!({ "code": " welcome10 " }),
        );
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cart"]["discount_code"], "WELCOME10");
        // Nothing to discount yet.
        assert_eq!(body["summary"]["discount"]["amount"], "0.00");
    }

    #[tokio::test]
    async fn test_clear_empty_guest_cart() {
        let request = Request::delete("/cart").body(Body::empty()).unwrap();
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Your cart is empty.");
    }

    #[tokio::test]
    async fn test_blank_discount_code_has_its_own_message() {
        let request = json_request("POST", "/cart/discount", &serde_json::json!({ "code": "  " }));
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Enter a discount code.");
    }

    #[tokio::test]
    async fn test_malformed_line_id_gets_json_error() {
        let request = json_request(
            "PATCH",
            "/cart/items/not-a-uuid",
            &serde_json::json!({ "quantity": 2 }),
        );
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid URL"));
    }

    #[tokio::test]
    async fn test_malformed_body_gets_json_error() {
        let request = Request::post("/cart/items")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"product_id\": 12"))
            .unwrap();
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_guest_cart_follows_the_session_cookie() {
        let app = app();

        let request = json_request(
            "POST",
            "/cart/discount",
            &serde_json::json!({ "code": "FORD20" }),
        );
        let (status, cookie, _) = send_with_cookie(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        let cookie = cookie.unwrap();

        let request = Request::get("/cart")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cart"]["discount_code"], "FORD20");

        // A new visitor starts empty.
        let request = Request::get("/cart").body(Body::empty()).unwrap();
        let (_, body) = send(app, request).await;
        assert!(body["cart"].get("discount_code").is_none());
    }

    #[tokio::test]
    async fn test_merge_requires_sign_in() {
        let request = Request::post("/cart/merge").body(Body::empty()).unwrap();
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }
}
