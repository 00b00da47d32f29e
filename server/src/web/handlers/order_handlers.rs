// storefront/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use storekeep::model::format_cents;
use storekeep::{OrderLine, OrderStatus, OrderWithItems, PaymentStatus, PlaceOrderRequest};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::auth::AuthenticatedUser;
use crate::errors::AppError;
use crate::state::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

// --- Request DTOs ---

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderPayload {
  #[serde(default)]
  pub items: Vec<OrderLine>,
  pub idempotency_key: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct StatusPayload {
  pub status: OrderStatus,
}

#[derive(Deserialize, Debug)]
pub struct PaymentPayload {
  pub status: PaymentStatus,
}

/// The header wins over the body field; blank keys count as absent.
fn idempotency_key(req: &HttpRequest, body_key: Option<String>) -> Option<String> {
  let header_key = req
    .headers()
    .get(IDEMPOTENCY_KEY_HEADER)
    .and_then(|value| value.to_str().ok())
    .map(str::to_string);

  header_key
    .or(body_key)
    .map(|key| key.trim().to_string())
    .filter(|key| !key.is_empty())
}

/// Orders are visible to their buyer and to any seller with an item on them. Everyone else
/// gets the same answer as for an order that does not exist.
async fn visible_order(app_state: &AppState, order_id: Uuid, user_id: Uuid) -> Result<OrderWithItems, AppError> {
  let not_found = || AppError::NotFound(format!("Order with ID {} not found.", order_id));
  let found = app_state.store.order(order_id).await?.ok_or_else(not_found)?;

  let is_buyer = found.order.buyer_id.as_uuid() == user_id;
  let is_seller = found.items.iter().any(|item| item.seller_id == user_id);
  if is_buyer || is_seller {
    Ok(found)
  } else {
    Err(not_found())
  }
}

// --- Handler Implementations ---

#[instrument(
  name = "handler::place_order",
  skip(app_state, req, payload, auth_user),
  fields(user_id = %auth_user.user_id, lines = payload.items.len())
)]
pub async fn place_order_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  payload: web::Json<PlaceOrderPayload>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let PlaceOrderPayload {
    items,
    idempotency_key: body_key,
  } = payload.into_inner();

  let mut request = PlaceOrderRequest::new(auth_user.buyer_id(), items);
  if let Some(key) = idempotency_key(&req, body_key) {
    request = request.with_idempotency_key(key);
  }

  let placed = app_state.engine.place_order(request).await?;
  let receipt = placed.receipt();
  info!(order_number = %receipt.order_number, replayed = placed.replayed, "Order accepted.");

  let body = json!({
    "orderId": receipt.order_id,
    "orderNumber": receipt.order_number,
    "total": format_cents(receipt.total_cents),
    "totalCents": receipt.total_cents,
    "status": receipt.status,
    "replayed": placed.replayed,
    "items": placed.items,
  });

  if placed.replayed {
    Ok(HttpResponse::Ok().json(body))
  } else {
    Ok(HttpResponse::Created().json(body))
  }
}

#[instrument(name = "handler::list_orders", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn list_orders_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let orders = app_state.store.orders_for_buyer(auth_user.buyer_id()).await?;
  info!("Fetched {} orders.", orders.len());
  Ok(HttpResponse::Ok().json(json!({ "orders": orders })))
}

#[instrument(
  name = "handler::get_order",
  skip(app_state, path, auth_user),
  fields(user_id = %auth_user.user_id, order_id = %path.as_ref())
)]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let found = visible_order(&app_state, path.into_inner(), auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(found))
}

#[instrument(
  name = "handler::cancel_order",
  skip(app_state, path, auth_user),
  fields(user_id = %auth_user.user_id, order_id = %path.as_ref())
)]
pub async fn cancel_order_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order = app_state
    .lifecycle
    .cancel_order(path.into_inner(), Some(auth_user.buyer_id()))
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "order": order })))
}

/// Fulfilment updates come from a seller with at least one item on the order.
#[instrument(
  name = "handler::update_order_status",
  skip(app_state, path, payload, auth_user),
  fields(user_id = %auth_user.user_id, order_id = %path.as_ref(), to = %payload.status)
)]
pub async fn update_status_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  payload: web::Json<StatusPayload>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order_id = path.into_inner();
  let found = visible_order(&app_state, order_id, auth_user.user_id).await?;
  if !found.items.iter().any(|item| item.seller_id == auth_user.user_id) {
    return Err(AppError::NotFound(format!("Order with ID {} not found.", order_id)));
  }

  let order = app_state.lifecycle.advance_status(order_id, payload.status).await?;
  Ok(HttpResponse::Ok().json(json!({ "order": order })))
}

/// Callback for the payment integration. Only the configured payment service identity is
/// accepted; buyers and sellers are refused.
#[instrument(
  name = "handler::record_payment",
  skip(app_state, path, payload, auth_user),
  fields(caller = %auth_user.user_id, order_id = %path.as_ref(), outcome = %payload.status)
)]
pub async fn record_payment_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  payload: web::Json<PaymentPayload>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  if app_state.payment_service_id != Some(auth_user.user_id) {
    warn!("Payment callback from an identity other than the payment service.");
    return Err(AppError::Forbidden(
      "Only the payment service may report payment outcomes.".to_string(),
    ));
  }

  let order = app_state
    .lifecycle
    .record_payment(path.into_inner(), payload.status)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "order": order })))
}

#[cfg(test)]
mod tests {
  use crate::web::handlers::auth::USER_ID_HEADER;
  use crate::web::test_support::TestApp;
  use actix_web::{http::StatusCode, test};
  use serde_json::{json, Value};
  use uuid::Uuid;

  #[actix_web::test]
  async fn place_order_returns_receipt_and_decrements_stock() {
    let fixture = TestApp::new();
    let seller = Uuid::new_v4();
    let mug = fixture.add_product(seller, "Mug", 1250, 10);
    let app = test::init_service(fixture.app()).await;
    let buyer = Uuid::new_v4();

    let req = test::TestRequest::post()
      .uri("/api/v1/orders")
      .insert_header((USER_ID_HEADER, buyer.to_string()))
      .set_json(json!({ "items": [{ "productId": mug, "quantity": 2 }] }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["totalCents"], 2500);
    assert_eq!(body["total"], "$25.00");
    assert_eq!(body["status"], "pending");
    assert!(body["orderNumber"].as_str().unwrap().starts_with("ORD-"));
    assert_eq!(fixture.store.stock_of(mug), Some(8));
  }

  #[actix_web::test]
  async fn place_order_requires_authentication() {
    let fixture = TestApp::new();
    let mug = fixture.add_product(Uuid::new_v4(), "Mug", 1250, 10);
    let app = test::init_service(fixture.app()).await;

    let req = test::TestRequest::post()
      .uri("/api/v1/orders")
      .set_json(json!({ "items": [{ "productId": mug, "quantity": 1 }] }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(fixture.store.stock_of(mug), Some(10));
  }

  #[actix_web::test]
  async fn insufficient_stock_maps_to_conflict_with_details() {
    let fixture = TestApp::new();
    let lamp = fixture.add_product(Uuid::new_v4(), "Lamp", 4000, 1);
    let app = test::init_service(fixture.app()).await;

    let req = test::TestRequest::post()
      .uri("/api/v1/orders")
      .insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
      .set_json(json!({ "items": [{ "productId": lamp, "quantity": 3 }] }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["kind"], "insufficient_stock");
    assert_eq!(body["details"]["available"], 1);
    assert_eq!(body["details"]["requested"], 3);
  }

  #[actix_web::test]
  async fn empty_cart_is_a_bad_request() {
    let fixture = TestApp::new();
    let app = test::init_service(fixture.app()).await;

    let req = test::TestRequest::post()
      .uri("/api/v1/orders")
      .insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
      .set_json(json!({ "items": [] }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(fixture.store.order_count(), 0);
  }

  #[actix_web::test]
  async fn idempotency_header_replays_the_first_order() {
    let fixture = TestApp::new();
    let pen = fixture.add_product(Uuid::new_v4(), "Pen", 300, 10);
    let app = test::init_service(fixture.app()).await;
    let buyer = Uuid::new_v4().to_string();

    let send = || {
      test::TestRequest::post()
        .uri("/api/v1/orders")
        .insert_header((USER_ID_HEADER, buyer.clone()))
        .insert_header(("Idempotency-Key", "checkout-42"))
        .set_json(json!({ "items": [{ "productId": pen, "quantity": 4 }] }))
        .to_request()
    };

    let first = test::call_service(&app, send()).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: Value = test::read_body_json(first).await;

    let second = test::call_service(&app, send()).await;
    assert_eq!(second.status(), StatusCode::OK);
    let second: Value = test::read_body_json(second).await;

    assert_eq!(first["orderId"], second["orderId"]);
    assert_eq!(second["replayed"], true);
    assert_eq!(fixture.store.stock_of(pen), Some(6));
    assert_eq!(fixture.store.order_count(), 1);
  }

  #[actix_web::test]
  async fn orders_are_hidden_from_other_buyers() {
    let fixture = TestApp::new();
    let seller = Uuid::new_v4();
    let mug = fixture.add_product(seller, "Mug", 1250, 10);
    let app = test::init_service(fixture.app()).await;
    let buyer = Uuid::new_v4();

    let req = test::TestRequest::post()
      .uri("/api/v1/orders")
      .insert_header((USER_ID_HEADER, buyer.to_string()))
      .set_json(json!({ "items": [{ "productId": mug, "quantity": 1 }] }))
      .to_request();
    let placed: Value = test::call_and_read_body_json(&app, req).await;
    let order_id = placed["orderId"].as_str().unwrap().to_string();

    for (viewer, expected) in [
      (buyer, StatusCode::OK),
      (seller, StatusCode::OK),
      (Uuid::new_v4(), StatusCode::NOT_FOUND),
    ] {
      let req = test::TestRequest::get()
        .uri(&format!("/api/v1/orders/{}", order_id))
        .insert_header((USER_ID_HEADER, viewer.to_string()))
        .to_request();
      assert_eq!(test::call_service(&app, req).await.status(), expected);
    }

    let req = test::TestRequest::get()
      .uri("/api/v1/orders")
      .insert_header((USER_ID_HEADER, buyer.to_string()))
      .to_request();
    let listed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed["orders"].as_array().map(Vec::len), Some(1));
  }

  #[actix_web::test]
  async fn cancel_then_advance_follow_the_lifecycle() {
    let fixture = TestApp::new();
    let seller = Uuid::new_v4();
    let mug = fixture.add_product(seller, "Mug", 1250, 10);
    let app = test::init_service(fixture.app()).await;
    let buyer = Uuid::new_v4();

    let place = |qty: i32| {
      test::TestRequest::post()
        .uri("/api/v1/orders")
        .insert_header((USER_ID_HEADER, buyer.to_string()))
        .set_json(json!({ "items": [{ "productId": mug, "quantity": qty }] }))
        .to_request()
    };

    // Cancelled by its buyer: stock comes back.
    let first: Value = test::call_and_read_body_json(&app, place(3)).await;
    let first_id = first["orderId"].as_str().unwrap().to_string();
    let req = test::TestRequest::post()
      .uri(&format!("/api/v1/orders/{}/cancel", first_id))
      .insert_header((USER_ID_HEADER, buyer.to_string()))
      .to_request();
    let cancelled: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(cancelled["order"]["status"], "cancelled");
    assert_eq!(fixture.store.stock_of(mug), Some(10));

    // Advanced by the seller, refused for the buyer.
    let second: Value = test::call_and_read_body_json(&app, place(1)).await;
    let second_id = second["orderId"].as_str().unwrap().to_string();
    let advance = |who: Uuid, status: &str| {
      test::TestRequest::patch()
        .uri(&format!("/api/v1/orders/{}/status", second_id))
        .insert_header((USER_ID_HEADER, who.to_string()))
        .set_json(json!({ "status": status }))
        .to_request()
    };
    assert_eq!(
      test::call_service(&app, advance(buyer, "processing")).await.status(),
      StatusCode::NOT_FOUND
    );
    assert_eq!(
      test::call_service(&app, advance(seller, "processing")).await.status(),
      StatusCode::OK
    );
    assert_eq!(
      test::call_service(&app, advance(seller, "pending")).await.status(),
      StatusCode::UNPROCESSABLE_ENTITY
    );
  }

  #[actix_web::test]
  async fn payment_callback_moves_pending_payment_once() {
    let fixture = TestApp::new();
    let mug = fixture.add_product(Uuid::new_v4(), "Mug", 1250, 10);
    let app = test::init_service(fixture.app()).await;

    let req = test::TestRequest::post()
      .uri("/api/v1/orders")
      .insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
      .set_json(json!({ "items": [{ "productId": mug, "quantity": 1 }] }))
      .to_request();
    let placed: Value = test::call_and_read_body_json(&app, req).await;
    let order_id = placed["orderId"].as_str().unwrap().to_string();

    let pay = || {
      test::TestRequest::post()
        .uri(&format!("/api/v1/orders/{}/payment", order_id))
        .insert_header((USER_ID_HEADER, fixture.payment_service_id.to_string()))
        .set_json(json!({ "status": "paid" }))
        .to_request()
    };
    let resp = test::call_service(&app, pay()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["order"]["paymentStatus"], "paid");

    assert_eq!(test::call_service(&app, pay()).await.status(), StatusCode::UNPROCESSABLE_ENTITY);
  }

  #[actix_web::test]
  async fn buyer_cannot_mark_their_own_order_paid() {
    let fixture = TestApp::new();
    let mug = fixture.add_product(Uuid::new_v4(), "Mug", 1250, 10);
    let app = test::init_service(fixture.app()).await;
    let buyer = Uuid::new_v4();

    let req = test::TestRequest::post()
      .uri("/api/v1/orders")
      .insert_header((USER_ID_HEADER, buyer.to_string()))
      .set_json(json!({ "items": [{ "productId": mug, "quantity": 1 }] }))
      .to_request();
    let placed: Value = test::call_and_read_body_json(&app, req).await;
    let order_id = placed["orderId"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
      .uri(&format!("/api/v1/orders/{}/payment", order_id))
      .insert_header((USER_ID_HEADER, buyer.to_string()))
      .set_json(json!({ "status": "paid" }))
      .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    // Cancelling afterwards must not claim a refund for money never charged.
    let req = test::TestRequest::post()
      .uri(&format!("/api/v1/orders/{}/cancel", order_id))
      .insert_header((USER_ID_HEADER, buyer.to_string()))
      .to_request();
    let cancelled: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(cancelled["order"]["status"], "cancelled");
    assert_eq!(cancelled["order"]["paymentStatus"], "pending");
    assert!(fixture
      .inbox
      .all()
      .iter()
      .filter(|n| n.recipient_id == buyer)
      .all(|n| !n.message.contains("refunded")));
  }

  #[actix_web::test]
  async fn payment_callback_is_refused_when_no_service_is_configured() {
    let fixture = TestApp::without_payment_service();
    let mug = fixture.add_product(Uuid::new_v4(), "Mug", 1250, 10);
    let app = test::init_service(fixture.app()).await;

    let req = test::TestRequest::post()
      .uri("/api/v1/orders")
      .insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
      .set_json(json!({ "items": [{ "productId": mug, "quantity": 1 }] }))
      .to_request();
    let placed: Value = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::post()
      .uri(&format!("/api/v1/orders/{}/payment", placed["orderId"].as_str().unwrap()))
      .insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
      .set_json(json!({ "status": "paid" }))
      .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
  }
}
