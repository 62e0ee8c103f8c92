//! JSON-lines request/response shapes. One JSON object per line each way.

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::model::{Id, Ms};

/// A single request line. `user_id` names the acting user; operations that
/// need one refuse the request when it is missing.
#[derive(Debug, Deserialize, PartialEq)]
pub struct Request {
    #[serde(default)]
    pub user_id: Option<Id>,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CreateUser {
        name: String,
        email: String,
    },
    GetUser {
        id: Id,
    },
    ListUsers,
    UpdateUser {
        id: Id,
        name: Option<String>,
        email: Option<String>,
    },
    DeleteUser {
        id: Id,
    },
    CreateItem {
        name: String,
        description: String,
        available: bool,
        request_id: Option<Id>,
    },
    UpdateItem {
        item_id: Id,
        name: Option<String>,
        description: Option<String>,
        available: Option<bool>,
    },
    DeleteItem {
        item_id: Id,
    },
    GetItem {
        item_id: Id,
    },
    ListItems,
    SearchItems {
        text: String,
    },
    CreateBooking {
        item_id: Id,
        start: Ms,
        end: Ms,
    },
    GetBooking {
        booking_id: Id,
    },
    SetBookingApproval {
        booking_id: Id,
        approved: bool,
    },
    /// Bookings made by the acting user. `state` is parsed leniently.
    ListBookings {
        state: Option<String>,
    },
    /// Bookings of the acting user's items.
    ListOwnerBookings {
        state: Option<String>,
    },
    AddComment {
        item_id: Id,
        text: String,
    },
    CreateRequest {
        description: String,
    },
    GetRequest {
        request_id: Id,
    },
    ListOwnRequests,
    ListOtherRequests,
}

/// Why a request produced no data.
#[derive(Debug)]
pub enum Failure {
    /// The line could not be understood as a request.
    BadRequest(String),
    Engine(EngineError),
    /// The result could not be encoded.
    Internal(String),
}

impl From<EngineError> for Failure {
    fn from(e: EngineError) -> Self {
        Failure::Engine(e)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub kind: String,
    pub status: u16,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(failure: Failure) -> Self {
        let (kind, status, message) = match failure {
            Failure::BadRequest(msg) => ("BAD_REQUEST".to_string(), 400, msg),
            Failure::Engine(e) => (e.kind().to_string(), e.status(), e.to_string()),
            Failure::Internal(msg) => ("INTERNAL".to_string(), 500, msg),
        };
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody {
                kind,
                status,
                message,
            }),
        }
    }
}

/// Parse one request line.
pub fn parse_request(line: &str) -> Result<Request, Failure> {
    serde_json::from_str(line).map_err(|e| Failure::BadRequest(format!("malformed request: {e}")))
}
