use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use configs::ApiConfig;
use models::{BookingId, BookingStatus, NewBooking, Role};
use service::api::HttpMarketplaceApi;
use service::auth::{AccessDecision, RouteGuard, RouteTable, SessionManager, SessionStatus};
use service::booking::{BookingError, BookingListController};
use service::errors::ErrorKind;
use service::storage::{MemoryTokenStore, TokenStore};

type Manager = SessionManager<HttpMarketplaceApi, MemoryTokenStore>;

fn booking_json(id: i64, client_id: i64, status: &str) -> Value {
    json!({
        "id": id,
        "service_id": 5,
        "client_id": client_id,
        "service": {"id": 5, "title": "Gardening", "provider_id": 20},
        "date": "2030-01-01T10:00",
        "location": "1 Main St",
        "contact_phone": "0712345678",
        "status": status
    })
}

async fn signed_in(server: &MockServer, id: i64, role: &str) -> anyhow::Result<(Arc<HttpMarketplaceApi>, Manager)> {
    signed_in_with(server, id, role, Arc::new(MemoryTokenStore::default())).await
}

/// Mount a login endpoint for a user of `role` and sign in against it.
async fn signed_in_with(
    server: &MockServer,
    id: i64,
    role: &str,
    store: Arc<MemoryTokenStore>,
) -> anyhow::Result<(Arc<HttpMarketplaceApi>, Manager)> {
    let email = format!("{role}@example.com");
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_partial_json(json!({"email": email})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": format!("tok-{role}"),
            "user": {"id": id, "username": role, "email": email, "role": role}
        })))
        .mount(server)
        .await;
    let cfg = ApiConfig { base_url: server.uri(), ..Default::default() };
    let api = Arc::new(HttpMarketplaceApi::new(&cfg)?);
    let mgr = SessionManager::new(api.clone(), store);
    mgr.login(&email, "secret1").await?;
    Ok((api, mgr))
}

async fn mount_listing(server: &MockServer, list_path: &str, bookings: Value) {
    Mock::given(method("GET"))
        .and(path(list_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(bookings))
        .mount(server)
        .await;
}

#[tokio::test]
async fn provider_cannot_complete_a_pending_booking() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (api, mgr) = signed_in(&server, 20, "provider").await?;
    mount_listing(&server, "/provider/bookings", json!([booking_json(1, 10, "pending")])).await;
    Mock::given(method("PATCH"))
        .and(path("/provider/bookings/1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let controller = BookingListController::new(api, mgr.handle(), Role::Provider);
    controller.fetch().await;
    let err = controller
        .apply_transition(BookingId(1), BookingStatus::Completed, Role::Provider)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));
    assert_eq!(controller.booking(BookingId(1)).await.map(|b| b.status), Some(BookingStatus::Pending));
    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn provider_completes_a_confirmed_booking() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (api, mgr) = signed_in(&server, 20, "provider").await?;
    mount_listing(&server, "/provider/bookings", json!([booking_json(2, 10, "confirmed")])).await;
    Mock::given(method("PATCH"))
        .and(path("/provider/bookings/2"))
        .and(body_partial_json(json!({"status": "completed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"booking": booking_json(2, 10, "completed")})))
        .expect(1)
        .mount(&server)
        .await;

    let controller = BookingListController::new(api, mgr.handle(), Role::Provider);
    controller.fetch().await;
    let updated = controller
        .apply_transition(BookingId(2), BookingStatus::Completed, Role::Provider)
        .await?;
    assert_eq!(updated.status, BookingStatus::Completed);
    assert_eq!(controller.booking(BookingId(2)).await.map(|b| b.status), Some(BookingStatus::Completed));
    Ok(())
}

#[tokio::test]
async fn last_response_wins_for_racing_transitions() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (api, mgr) = signed_in(&server, 20, "provider").await?;
    mount_listing(&server, "/provider/bookings", json!([booking_json(1, 10, "pending")])).await;
    Mock::given(method("PATCH"))
        .and(path("/provider/bookings/1"))
        .and(body_partial_json(json!({"status": "confirmed"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"booking": booking_json(1, 10, "confirmed")}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/provider/bookings/1"))
        .and(body_partial_json(json!({"status": "cancelled"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"booking": booking_json(1, 10, "cancelled")})))
        .expect(1)
        .mount(&server)
        .await;

    let controller = BookingListController::new(api, mgr.handle(), Role::Provider);
    controller.fetch().await;

    // confirm is sent first, cancel second; the cancel response lands first
    let (confirm, cancel) = tokio::join!(
        controller.apply_transition(BookingId(1), BookingStatus::Confirmed, Role::Provider),
        controller.apply_transition(BookingId(1), BookingStatus::Cancelled, Role::Provider),
    );
    assert_eq!(confirm?.status, BookingStatus::Confirmed);
    assert_eq!(cancel?.status, BookingStatus::Cancelled);
    assert_eq!(controller.booking(BookingId(1)).await.map(|b| b.status), Some(BookingStatus::Confirmed));
    Ok(())
}

#[tokio::test]
async fn response_after_unmount_is_discarded() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (api, mgr) = signed_in(&server, 10, "client").await?;
    mount_listing(&server, "/auth/my-bookings", json!([booking_json(1, 10, "pending")])).await;
    Mock::given(method("PATCH"))
        .and(path("/auth/my-bookings/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"booking": booking_json(1, 10, "cancelled")}))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let controller = BookingListController::new(api, mgr.handle(), Role::Client);
    controller.fetch().await;
    let (result, ()) = tokio::join!(
        controller.apply_transition(BookingId(1), BookingStatus::Cancelled, Role::Client),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            controller.unmount();
        },
    );
    assert_eq!(result?.status, BookingStatus::Cancelled);
    assert_eq!(controller.booking(BookingId(1)).await.map(|b| b.status), Some(BookingStatus::Pending));
    Ok(())
}

#[tokio::test]
async fn rejected_mutation_keeps_cache_and_reports_message() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (api, mgr) = signed_in(&server, 10, "client").await?;
    mount_listing(&server, "/auth/my-bookings", json!([booking_json(1, 10, "pending")])).await;
    Mock::given(method("PATCH"))
        .and(path("/auth/my-bookings/1"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"error": "Booking already cancelled"})))
        .mount(&server)
        .await;

    let controller = BookingListController::new(api, mgr.handle(), Role::Client);
    controller.fetch().await;
    let err = controller
        .apply_transition(BookingId(1), BookingStatus::Cancelled, Role::Client)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Booking already cancelled");
    assert_eq!(controller.booking(BookingId(1)).await.map(|b| b.status), Some(BookingStatus::Pending));
    Ok(())
}

#[tokio::test]
async fn failed_listing_renders_empty() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (api, mgr) = signed_in(&server, 10, "client").await?;
    Mock::given(method("GET"))
        .and(path("/auth/my-bookings"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let controller = BookingListController::new(api, mgr.handle(), Role::Client);
    assert!(controller.fetch().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn admin_deletes_after_server_confirms() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (api, mgr) = signed_in(&server, 1, "admin").await?;
    mount_listing(
        &server,
        "/bookings",
        json!([booking_json(1, 10, "pending"), booking_json(3, 11, "completed")]),
    )
    .await;
    Mock::given(method("DELETE"))
        .and(path("/admin/bookings/3"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let controller = BookingListController::new(api, mgr.handle(), Role::Admin);
    assert_eq!(controller.fetch().await.len(), 2);
    controller.delete(BookingId(3)).await?;
    assert_eq!(controller.bookings().await.iter().map(|b| b.id.0).collect::<Vec<_>>(), vec![1]);
    Ok(())
}

#[tokio::test]
async fn client_creates_a_booking_for_itself() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (api, mgr) = signed_in(&server, 10, "client").await?;
    mount_listing(&server, "/auth/my-bookings", json!([])).await;
    Mock::given(method("POST"))
        .and(path("/bookings"))
        .and(body_partial_json(json!({"client_id": 10, "service_id": 5, "location": "2 Oak Road"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(booking_json(7, 10, "pending")))
        .expect(1)
        .mount(&server)
        .await;

    let controller = BookingListController::new(api, mgr.handle(), Role::Client);
    controller.fetch().await;
    let draft = NewBooking {
        service_id: 5,
        date: "2099-06-01T09:00".into(),
        location: "2 Oak Road".into(),
        contact_phone: "0799999999".into(),
        notes: Some("Gate code 1234".into()),
    };
    let created = controller.create_booking(draft).await?;
    assert_eq!(created.id, BookingId(7));
    assert_eq!(controller.bookings().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn expired_token_on_status_change_signs_out() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTokenStore::default());
    let (api, mgr) = signed_in_with(&server, 20, "provider", store.clone()).await?;
    mount_listing(&server, "/provider/bookings", json!([booking_json(1, 10, "pending")])).await;
    Mock::given(method("PATCH"))
        .and(path("/provider/bookings/1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Token has expired"})))
        .expect(1)
        .mount(&server)
        .await;

    let controller = BookingListController::new(api, mgr.handle(), Role::Provider);
    controller.fetch().await;
    let err = controller
        .apply_transition(BookingId(1), BookingStatus::Confirmed, Role::Provider)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Token has expired");
    assert_eq!(err.kind(), ErrorKind::Authentication);

    assert_eq!(mgr.session().status(), SessionStatus::Anonymous);
    assert!(store.load().is_none());
    let guard = RouteGuard::new(mgr.handle(), RouteTable::marketplace());
    assert_eq!(
        guard.check("/provider"),
        AccessDecision::DeniedUnauthenticated { redirect_to: "/login?redirect=%2Fprovider".into() }
    );
    Ok(())
}

#[tokio::test]
async fn expired_token_on_listing_signs_out() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTokenStore::default());
    let (api, mgr) = signed_in_with(&server, 1, "admin", store.clone()).await?;
    Mock::given(method("GET"))
        .and(path("/bookings"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Token has expired"})))
        .mount(&server)
        .await;

    let controller = BookingListController::new(api, mgr.handle(), Role::Admin);
    assert!(controller.fetch().await.is_empty());
    assert_eq!(mgr.session().status(), SessionStatus::Anonymous);
    assert!(store.load().is_none());
    Ok(())
}

#[tokio::test]
async fn listing_keeps_rows_without_contact_details() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (api, mgr) = signed_in(&server, 20, "provider").await?;
    let mut no_location = booking_json(1, 10, "pending");
    no_location["location"] = Value::Null;
    no_location["service"] = json!({"id": 5, "title": "Gardening"});
    let mut no_phone = booking_json(2, 11, "confirmed");
    if let Some(row) = no_phone.as_object_mut() {
        row.remove("contact_phone");
    }
    mount_listing(&server, "/provider/bookings", json!([no_location, no_phone, booking_json(3, 12, "completed")])).await;

    let controller = BookingListController::new(api, mgr.handle(), Role::Provider);
    let listed = controller.fetch().await;
    assert_eq!(listed.iter().map(|b| b.id.0).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(listed[0].location, None);
    assert_eq!(listed[1].contact_phone, None);
    assert_eq!(controller.bookings().await.len(), 3);
    Ok(())
}

async fn mount_slow_listing(server: &MockServer, list_path: &str, bookings: Value) {
    Mock::given(method("GET"))
        .and(path(list_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(bookings)
                .set_delay(Duration::from_millis(200)),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn listing_after_unmount_is_discarded() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (api, mgr) = signed_in(&server, 10, "client").await?;
    mount_slow_listing(&server, "/auth/my-bookings", json!([booking_json(1, 10, "pending")])).await;

    let controller = BookingListController::new(api, mgr.handle(), Role::Client);
    let (listed, ()) = tokio::join!(controller.fetch(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.unmount();
    });
    assert_eq!(listed.len(), 1);
    assert!(controller.bookings().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn listing_after_logout_is_discarded() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let (api, mgr) = signed_in(&server, 10, "client").await?;
    mount_slow_listing(&server, "/auth/my-bookings", json!([booking_json(1, 10, "pending")])).await;

    let controller = BookingListController::new(api, mgr.handle(), Role::Client);
    let (listed, ()) = tokio::join!(controller.fetch(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        mgr.logout();
    });
    assert_eq!(listed.len(), 1);
    assert!(controller.bookings().await.is_empty());
    Ok(())
}
