use std::net::SocketAddr;

use crate::protocol::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "shareit_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "shareit_command_duration_seconds";

/// Counter: lines that did not parse as a request.
pub const BAD_REQUESTS_TOTAL: &str = "shareit_bad_requests_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "shareit_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "shareit_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "shareit_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "shareit_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "shareit_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "shareit_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
/// A failed install is logged and the server carries on without metrics.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus metrics exporter: {e}"),
    }
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::CreateUser { .. } => "create_user",
        Command::GetUser { .. } => "get_user",
        Command::ListUsers => "list_users",
        Command::UpdateUser { .. } => "update_user",
        Command::DeleteUser { .. } => "delete_user",
        Command::CreateItem { .. } => "create_item",
        Command::UpdateItem { .. } => "update_item",
        Command::DeleteItem { .. } => "delete_item",
        Command::GetItem { .. } => "get_item",
        Command::ListItems => "list_items",
        Command::SearchItems { .. } => "search_items",
        Command::CreateBooking { .. } => "create_booking",
        Command::GetBooking { .. } => "get_booking",
        Command::SetBookingApproval { .. } => "set_booking_approval",
        Command::ListBookings { .. } => "list_bookings",
        Command::ListOwnerBookings { .. } => "list_owner_bookings",
        Command::AddComment { .. } => "add_comment",
        Command::CreateRequest { .. } => "create_request",
        Command::GetRequest { .. } => "get_request",
        Command::ListOwnRequests => "list_own_requests",
        Command::ListOtherRequests => "list_other_requests",
    }
}
