use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};

use shareit::clock::FixedClock;
use shareit::engine::{Engine, InMemoryStore};
use shareit::wire;

const DAY: i64 = 86_400_000;
/// 2024-01-01T00:00:00Z
const T0: i64 = 1_704_067_200_000;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server(name: &str) -> (SocketAddr, Arc<FixedClock>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join("shareit_int_test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{name}.wal"));
    let _ = std::fs::remove_file(&path);

    let clock = Arc::new(FixedClock::new(T0));
    let engine = Arc::new(Engine::open(path, Arc::new(InMemoryStore::new()), clock.clone()).unwrap());

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = engine.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine).await;
            });
        }
    });

    (addr, clock)
}

struct Client {
    framed: Framed<TcpStream, LinesCodec>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let socket = TcpStream::connect(addr).await.unwrap();
        Self {
            framed: Framed::new(socket, LinesCodec::new()),
        }
    }

    async fn send_raw(&mut self, line: &str) -> Value {
        self.framed.send(line.to_string()).await.unwrap();
        let reply = self.framed.next().await.unwrap().unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    async fn call(&mut self, request: Value) -> Value {
        self.send_raw(&request.to_string()).await
    }

    /// Call and unwrap `data`, failing the test on an error response.
    async fn ok(&mut self, request: Value) -> Value {
        let reply = self.call(request).await;
        assert_eq!(reply["ok"], true, "unexpected error: {reply}");
        reply["data"].clone()
    }

    /// Call and return the error kind, failing the test on success.
    async fn err(&mut self, request: Value) -> String {
        let reply = self.call(request).await;
        assert_eq!(reply["ok"], false, "unexpected success: {reply}");
        reply["error"]["kind"].as_str().unwrap().to_string()
    }
}

async fn create_user(client: &mut Client, name: &str) -> u64 {
    let data = client
        .ok(json!({"op": "create_user", "name": name, "email": format!("{name}@example.com")}))
        .await;
    data["id"].as_u64().unwrap()
}

async fn create_item(client: &mut Client, owner: u64, name: &str) -> u64 {
    let data = client
        .ok(json!({
            "user_id": owner,
            "op": "create_item",
            "name": name,
            "description": format!("A {name}"),
            "available": true
        }))
        .await;
    data["id"].as_u64().unwrap()
}

// ── Scenarios ────────────────────────────────────────────────

#[tokio::test]
async fn booking_lifecycle_over_the_wire() {
    let (addr, _) = start_test_server("lifecycle").await;
    let mut c = Client::connect(addr).await;
    let owner = create_user(&mut c, "olga").await;
    let booker = create_user(&mut c, "kirill").await;
    let item = create_item(&mut c, owner, "drill").await;

    let booking = c
        .ok(json!({
            "user_id": booker,
            "op": "create_booking",
            "item_id": item,
            "start": T0 + DAY,
            "end": T0 + 2 * DAY
        }))
        .await;
    assert_eq!(booking["status"], "WAITING");
    assert_eq!(booking["item"]["id"], item);
    assert_eq!(booking["booker"]["id"], booker);
    let booking_id = booking["id"].as_u64().unwrap();

    let future = c
        .ok(json!({"user_id": owner, "op": "list_owner_bookings", "state": "FUTURE"}))
        .await;
    assert_eq!(future.as_array().unwrap().len(), 1);
    let waiting = c
        .ok(json!({"user_id": owner, "op": "list_owner_bookings", "state": "WAITING"}))
        .await;
    assert_eq!(waiting[0]["id"], booking_id);

    let approved = c
        .ok(json!({"user_id": owner, "op": "set_booking_approval", "booking_id": booking_id, "approved": true}))
        .await;
    assert_eq!(approved["status"], "APPROVED");

    let reply = c
        .call(json!({"user_id": owner, "op": "set_booking_approval", "booking_id": booking_id, "approved": true}))
        .await;
    assert_eq!(reply["error"]["kind"], "BOOKING_ALREADY_DECIDED");
    assert_eq!(reply["error"]["status"], 400);
}

#[tokio::test]
async fn denials_and_access_rules() {
    let (addr, _) = start_test_server("denials").await;
    let mut c = Client::connect(addr).await;
    let owner = create_user(&mut c, "olga").await;
    let booker = create_user(&mut c, "kirill").await;
    let stranger = create_user(&mut c, "stas").await;
    let item = create_item(&mut c, owner, "drill").await;

    let own = json!({"user_id": owner, "op": "create_booking", "item_id": item, "start": T0 + DAY, "end": T0 + 2 * DAY});
    assert_eq!(c.err(own).await, "BOOKING_DENIED");

    let booking = c
        .ok(json!({"user_id": booker, "op": "create_booking", "item_id": item, "start": T0 + DAY, "end": T0 + 2 * DAY}))
        .await;
    let booking_id = booking["id"].as_u64().unwrap();

    let peek = json!({"user_id": stranger, "op": "get_booking", "booking_id": booking_id});
    let reply = c.call(peek).await;
    assert_eq!(reply["error"]["kind"], "ACCESS_DENIED");
    assert_eq!(reply["error"]["status"], 403);

    let decide = json!({"user_id": booker, "op": "set_booking_approval", "booking_id": booking_id, "approved": true});
    assert_eq!(c.err(decide).await, "ACCESS_DENIED");

    let ghost = json!({"user_id": 999, "op": "list_bookings"});
    let reply = c.call(ghost).await;
    assert_eq!(reply["error"]["kind"], "NOT_FOUND");
    assert_eq!(reply["error"]["status"], 404);

    c.ok(json!({"user_id": owner, "op": "update_item", "item_id": item, "available": false}))
        .await;
    let unavailable = json!({"user_id": stranger, "op": "create_booking", "item_id": item, "start": T0 + DAY, "end": T0 + 2 * DAY});
    assert_eq!(c.err(unavailable).await, "BOOKING_DENIED");
}

#[tokio::test]
async fn item_view_and_comments() {
    let (addr, clock) = start_test_server("item_view").await;
    let mut c = Client::connect(addr).await;
    let owner = create_user(&mut c, "olga").await;
    let booker = create_user(&mut c, "kirill").await;
    let item = create_item(&mut c, owner, "tent").await;

    let booking = c
        .ok(json!({"user_id": booker, "op": "create_booking", "item_id": item, "start": T0 + DAY, "end": T0 + 2 * DAY}))
        .await;
    c.ok(json!({"user_id": owner, "op": "set_booking_approval", "booking_id": booking["id"], "approved": true}))
        .await;

    let early = json!({"user_id": booker, "op": "add_comment", "item_id": item, "text": "great"});
    assert_eq!(c.err(early).await, "COMMENT_NOT_ALLOWED");

    clock.set(T0 + 3 * DAY);
    let comment = c
        .ok(json!({"user_id": booker, "op": "add_comment", "item_id": item, "text": "great"}))
        .await;
    assert_eq!(comment["author_name"], "kirill");
    assert_eq!(comment["created"], T0 + 3 * DAY);

    let owner_view = c
        .ok(json!({"user_id": owner, "op": "get_item", "item_id": item}))
        .await;
    assert_eq!(owner_view["last_booking"]["id"], booking["id"]);
    assert_eq!(owner_view["next_booking"], Value::Null);
    assert_eq!(owner_view["comments"][0]["text"], "great");

    let booker_view = c
        .ok(json!({"user_id": booker, "op": "get_item", "item_id": item}))
        .await;
    assert_eq!(booker_view["last_booking"], Value::Null);
    assert_eq!(booker_view["comments"].as_array().unwrap().len(), 1);

    let listed = c.ok(json!({"user_id": owner, "op": "list_items"})).await;
    assert_eq!(listed[0]["last_booking"]["id"], booking["id"]);
}

#[tokio::test]
async fn users_search_and_requests() {
    let (addr, _) = start_test_server("catalog").await;
    let mut c = Client::connect(addr).await;
    let owner = create_user(&mut c, "olga").await;
    let asker = create_user(&mut c, "rita").await;

    let dup = json!({"op": "create_user", "name": "other", "email": "olga@example.com"});
    let reply = c.call(dup).await;
    assert_eq!(reply["error"]["kind"], "UNIQUE_CONSTRAINT_VIOLATION");
    assert_eq!(reply["error"]["status"], 409);

    let request = c
        .ok(json!({"user_id": asker, "op": "create_request", "description": "Need a ladder"}))
        .await;
    let request_id = request["id"].as_u64().unwrap();
    c.ok(json!({
        "user_id": owner,
        "op": "create_item",
        "name": "Ladder",
        "description": "Three metres",
        "available": true,
        "request_id": request_id
    }))
    .await;

    let mine = c.ok(json!({"user_id": asker, "op": "list_own_requests"})).await;
    assert_eq!(mine[0]["items"][0]["name"], "Ladder");
    let theirs = c.ok(json!({"user_id": owner, "op": "list_other_requests"})).await;
    assert_eq!(theirs[0]["id"], request_id);

    let found = c.ok(json!({"op": "search_items", "text": "LADDER"})).await;
    assert_eq!(found.as_array().unwrap().len(), 1);
    let blank = c.ok(json!({"op": "search_items", "text": ""})).await;
    assert!(blank.as_array().unwrap().is_empty());

    let renamed = c
        .ok(json!({"op": "update_user", "id": asker, "name": "Margarita"}))
        .await;
    assert_eq!(renamed["email"], "rita@example.com");
    let users = c.ok(json!({"op": "list_users"})).await;
    assert_eq!(users.as_array().unwrap().len(), 2);

    let busy = json!({"op": "delete_user", "id": owner});
    assert_eq!(c.err(busy).await, "REFERENCED");
}

#[tokio::test]
async fn malformed_lines_keep_connection_open() {
    let (addr, _) = start_test_server("malformed").await;
    let mut c = Client::connect(addr).await;

    let reply = c.send_raw("this is not json").await;
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["error"]["kind"], "BAD_REQUEST");

    let reply = c.call(json!({"op": "teleport"})).await;
    assert_eq!(reply["error"]["kind"], "BAD_REQUEST");

    let reply = c.call(json!({"op": "list_bookings"})).await;
    assert_eq!(reply["error"]["kind"], "BAD_REQUEST");

    let inverted = json!({"user_id": 1, "op": "create_booking", "item_id": 1, "start": T0 + DAY, "end": T0});
    assert_eq!(c.err(inverted).await, "BAD_REQUEST");

    // Still usable afterwards
    let id = create_user(&mut c, "after").await;
    assert_eq!(id, 1);
}
