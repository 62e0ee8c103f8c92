use std::io;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use crate::engine::Engine;
use crate::limits::MAX_LINE_LEN;
use crate::model::{BookingState, Id, Span};
use crate::observability::{self, command_label};
use crate::protocol::{Command, Failure, Request, Response, parse_request};

/// Serve one client: read request lines, answer each with one response line.
/// Request-level failures are answered in-band; only I/O errors end the connection.
pub async fn process_connection(socket: TcpStream, engine: Arc<Engine>) -> io::Result<()> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));

    while let Some(line) = framed.next().await {
        let response = match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(&engine, &line).await,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                metrics::counter!(observability::BAD_REQUESTS_TOTAL).increment(1);
                Response::failure(Failure::BadRequest(format!(
                    "request line exceeds {MAX_LINE_LEN} bytes"
                )))
            }
            Err(LinesCodecError::Io(e)) => return Err(e),
        };
        let encoded = serde_json::to_string(&response).map_err(io::Error::other)?;
        framed.send(encoded).await.map_err(|e| match e {
            LinesCodecError::Io(e) => e,
            other => io::Error::other(other),
        })?;
    }
    Ok(())
}

/// Parse, execute and time one request line.
pub async fn handle_line(engine: &Engine, line: &str) -> Response {
    let request = match parse_request(line) {
        Ok(request) => request,
        Err(failure) => {
            metrics::counter!(observability::BAD_REQUESTS_TOTAL).increment(1);
            return Response::failure(failure);
        }
    };

    let label = command_label(&request.command);
    let start = Instant::now();
    let result = execute(engine, request).await;
    metrics::histogram!(observability::COMMAND_DURATION_SECONDS, "command" => label)
        .record(start.elapsed().as_secs_f64());

    match result {
        Ok(data) => {
            metrics::counter!(observability::COMMANDS_TOTAL, "command" => label, "status" => "ok")
                .increment(1);
            Response::success(data)
        }
        Err(failure) => {
            metrics::counter!(observability::COMMANDS_TOTAL, "command" => label, "status" => "error")
                .increment(1);
            if let Failure::Engine(e) = &failure {
                tracing::debug!("{label} failed: {e}");
            }
            Response::failure(failure)
        }
    }
}

fn to_data<T: Serialize>(value: T) -> Result<serde_json::Value, Failure> {
    serde_json::to_value(value).map_err(|e| Failure::Internal(format!("encode failed: {e}")))
}

async fn execute(engine: &Engine, request: Request) -> Result<serde_json::Value, Failure> {
    let Request { user_id, command } = request;
    let actor = || -> Result<Id, Failure> {
        user_id.ok_or_else(|| Failure::BadRequest("user_id is required for this operation".into()))
    };

    match command {
        // ── Users ────────────────────────────────────────
        Command::CreateUser { name, email } => to_data(engine.create_user(name, email).await?),
        Command::GetUser { id } => to_data(engine.get_user(id)?),
        Command::ListUsers => to_data(engine.list_users()),
        Command::UpdateUser { id, name, email } => {
            to_data(engine.update_user(id, name, email).await?)
        }
        Command::DeleteUser { id } => {
            engine.delete_user(id).await?;
            to_data(serde_json::json!({ "deleted": id }))
        }

        // ── Items ────────────────────────────────────────
        Command::CreateItem {
            name,
            description,
            available,
            request_id,
        } => to_data(
            engine
                .create_item(actor()?, name, description, available, request_id)
                .await?,
        ),
        Command::UpdateItem {
            item_id,
            name,
            description,
            available,
        } => to_data(
            engine
                .update_item(actor()?, item_id, name, description, available)
                .await?,
        ),
        Command::DeleteItem { item_id } => {
            engine.delete_item(actor()?, item_id).await?;
            to_data(serde_json::json!({ "deleted": item_id }))
        }
        Command::GetItem { item_id } => to_data(engine.get_item_view(actor()?, item_id).await?),
        Command::ListItems => to_data(engine.list_items_for_owner(actor()?).await?),
        Command::SearchItems { text } => to_data(engine.search_items(&text).await?),

        // ── Bookings ─────────────────────────────────────
        Command::CreateBooking {
            item_id,
            start,
            end,
        } => {
            let actor = actor()?;
            if start >= end {
                return Err(Failure::BadRequest(
                    "booking end must be after its start".into(),
                ));
            }
            to_data(
                engine
                    .create_booking(actor, item_id, Span::new(start, end))
                    .await?,
            )
        }
        Command::GetBooking { booking_id } => {
            to_data(engine.get_booking(actor()?, booking_id).await?)
        }
        Command::SetBookingApproval {
            booking_id,
            approved,
        } => to_data(
            engine
                .set_booking_approval(actor()?, booking_id, approved)
                .await?,
        ),
        Command::ListBookings { state } => {
            let state = BookingState::parse(state.as_deref());
            to_data(engine.list_bookings_as_booker(actor()?, state).await?)
        }
        Command::ListOwnerBookings { state } => {
            let state = BookingState::parse(state.as_deref());
            to_data(engine.list_bookings_as_owner(actor()?, state).await?)
        }

        // ── Comments ─────────────────────────────────────
        Command::AddComment { item_id, text } => {
            to_data(engine.add_comment(actor()?, item_id, text).await?)
        }

        // ── Item requests ────────────────────────────────
        Command::CreateRequest { description } => {
            to_data(engine.create_request(actor()?, description).await?)
        }
        Command::GetRequest { request_id } => {
            to_data(engine.get_request(actor()?, request_id).await?)
        }
        Command::ListOwnRequests => to_data(engine.list_own_requests(actor()?).await?),
        Command::ListOtherRequests => to_data(engine.list_other_requests(actor()?).await?),
    }
}
