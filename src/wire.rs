use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::command::{self, Command};
use crate::engine::{parse_reservation_id, Engine, ReservationError};
use crate::limits::MAX_LINE_LEN;
use crate::model::{ReservationPatch, ReservationRequest};
use crate::observability::*;

/// One reply line: `{"status":..,"body":..}` or `{"status":..,"error":..,"code":..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl Reply {
    fn ok<T: Serialize + ?Sized>(status: u16, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self {
                status,
                body: Some(body),
                error: None,
                code: None,
            },
            Err(e) => Self::failure(500, "internal", e.to_string()),
        }
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
            error: None,
            code: None,
        }
    }

    fn failure(status: u16, code: &'static str, message: String) -> Self {
        Self {
            status,
            body: None,
            error: Some(message),
            code: Some(code),
        }
    }

    fn rejected(err: ReservationError, cmd_label: &'static str) -> Self {
        metrics::counter!(REJECTIONS_TOTAL, "code" => err.code()).increment(1);
        Self::failure(status_for(&err, cmd_label), err.code(), err.to_string())
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":500,"error":"reply encoding failed: {e}","code":"internal"}}"#)
        })
    }
}

/// Protocol status for an engine refusal. An unknown resource is "bad input"
/// on create/update but "no such thing" when it is the listing's subject.
pub fn status_for(err: &ReservationError, cmd_label: &str) -> u16 {
    match err {
        ReservationError::NotFound(_) => 404,
        ReservationError::Forbidden(_) => 403,
        ReservationError::ResourceNotFound(_) if cmd_label == "list_resource_reservations" => 404,
        _ => 400,
    }
}

/// Run one parsed command against the engine.
pub fn execute_command(engine: &Engine, cmd: Command) -> Reply {
    let label = cmd.label();
    if cmd.requires_identity() && cmd.caller().is_none() {
        return Reply::failure(401, "unauthenticated", "missing caller identity".into());
    }
    let caller = cmd.caller().unwrap_or_default().to_string();

    match cmd {
        Command::ListResources => Reply::ok(200, engine.list_resources()),
        Command::ListReservations => Reply::ok(200, &engine.list_reservations()),
        Command::GetReservation { id } => {
            match parse_reservation_id(&id).and_then(|id| engine.get_reservation(&id)) {
                Ok(r) => Reply::ok(200, &r),
                Err(e) => Reply::rejected(e, label),
            }
        }
        Command::CreateReservation {
            resource_id,
            start_time,
            end_time,
            ..
        } => {
            let request = ReservationRequest {
                resource_id,
                start_time,
                end_time,
            };
            match engine.create_reservation(&caller, &request) {
                Ok(r) => Reply::ok(201, &r),
                Err(e) => Reply::rejected(e, label),
            }
        }
        Command::UpdateReservation {
            id,
            resource_id,
            start_time,
            end_time,
            ..
        } => {
            let patch = ReservationPatch {
                resource_id,
                start_time,
                end_time,
            };
            let result = parse_reservation_id(&id)
                .and_then(|id| engine.update_reservation(&caller, &id, &patch));
            match result {
                Ok(r) => Reply::ok(200, &r),
                Err(e) => Reply::rejected(e, label),
            }
        }
        Command::DeleteReservation { id, .. } => {
            let result = parse_reservation_id(&id)
                .and_then(|id| engine.delete_reservation(&caller, &id));
            match result {
                Ok(()) => Reply::no_content(),
                Err(e) => Reply::rejected(e, label),
            }
        }
        Command::ListResourceReservations { resource_id } => {
            match engine.list_resource_reservations(&resource_id) {
                Ok(rs) => Reply::ok(200, &rs),
                Err(e) => Reply::rejected(e, label),
            }
        }
        Command::ListUserReservations { user_id } => {
            Reply::ok(200, &engine.list_owner_reservations(&user_id))
        }
    }
}

/// Parse, execute and meter one request line.
pub fn handle_line(engine: &Engine, line: &str) -> Reply {
    let start = Instant::now();
    let (label, reply) = match command::parse_command(line) {
        Ok(cmd) => {
            let label = cmd.label();
            let mutating = cmd.requires_identity();
            let reply = execute_command(engine, cmd);
            if mutating && reply.status < 300 {
                metrics::gauge!(RESERVATIONS_STORED).set(engine.store().len() as f64);
            }
            (label, reply)
        }
        Err(e) => ("invalid", Reply::failure(400, "bad_request", e.to_string())),
    };
    metrics::counter!(REQUESTS_TOTAL, "command" => label, "status" => reply.status.to_string())
        .increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "command" => label)
        .record(start.elapsed().as_secs_f64());
    debug!(command = label, status = reply.status, "request handled");
    reply
}

#[derive(Debug)]
pub enum WireError {
    Io(std::io::Error),
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for WireError {}

impl From<LinesCodecError> for WireError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::Io(e) => WireError::Io(e),
            LinesCodecError::MaxLineLengthExceeded => WireError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "line too long",
            )),
        }
    }
}

/// Serve one client: read request lines, answer each with exactly one reply line.
/// Returns when the peer closes the connection.
pub async fn process_connection<S>(socket: S, engine: Arc<Engine>) -> Result<(), WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));

    while let Some(frame) = framed.next().await {
        let line = match frame {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!("request line exceeds {MAX_LINE_LEN} bytes, closing connection");
                let reply = Reply::failure(
                    413,
                    "line_too_long",
                    format!("request line exceeds {MAX_LINE_LEN} bytes"),
                );
                framed.send(reply.to_line()).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle_line(&engine, &line);
        framed.send(reply.to_line()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::auth::AccessPolicy;
    use crate::catalog::Catalog;
    use crate::clock::ManualClock;

    fn test_engine() -> Arc<Engine> {
        Arc::new(Engine::new(
            Arc::new(Catalog::default()),
            AccessPolicy::default(),
            Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2029, 1, 1, 0, 0, 0).unwrap())),
        ))
    }

    fn create_line(user: &str, room: &str, start: &str, end: &str) -> String {
        format!(
            r#"{{"op":"create_reservation","user":"{user}","resourceId":"{room}","startTime":"{start}","endTime":"{end}"}}"#
        )
    }

    #[test]
    fn create_replies_201_with_record() {
        let engine = test_engine();
        let reply = handle_line(
            &engine,
            &create_line("user1", "room1", "2030-01-01T10:00:00.000Z", "2030-01-01T12:00:00.000Z"),
        );
        assert_eq!(reply.status, 201);
        let body = reply.body.unwrap();
        assert_eq!(body["resourceId"], "room1");
        assert_eq!(body["ownerId"], "user1");
        assert_eq!(body["startTime"], "2030-01-01T10:00:00.000Z");
        assert_eq!(body["createdAt"], "2029-01-01T00:00:00.000Z");
    }

    #[test]
    fn reply_keeps_record_field_order() {
        let engine = test_engine();
        let line = handle_line(
            &engine,
            &create_line("user1", "room1", "2030-01-01T10:00:00Z", "2030-01-01T12:00:00Z"),
        )
        .to_line();
        let id = engine.list_reservations()[0].id;
        assert_eq!(
            line,
            format!(
                r#"{{"status":201,"body":{{"id":"{id}","resourceId":"room1","ownerId":"user1","startTime":"2030-01-01T10:00:00.000Z","endTime":"2030-01-01T12:00:00.000Z","createdAt":"2029-01-01T00:00:00.000Z"}}}}"#
            )
        );

        let rooms = handle_line(&engine, r#"{"op":"list_resources"}"#).to_line();
        assert!(rooms.starts_with(r#"{"status":200,"body":[{"id":"room1","name":"Conference Room A","capacity":10}"#));
    }

    #[test]
    fn missing_identity_is_401() {
        let engine = test_engine();
        let reply = handle_line(
            &engine,
            r#"{"op":"create_reservation","resourceId":"room1","startTime":"2030-01-01T10:00:00Z","endTime":"2030-01-01T12:00:00Z"}"#,
        );
        assert_eq!(reply.status, 401);
        assert_eq!(reply.code, Some("unauthenticated"));
        assert!(engine.list_reservations().is_empty());
    }

    #[test]
    fn validation_failures_are_400() {
        let engine = test_engine();
        handle_line(&engine, &create_line("user1", "room1", "2030-01-01T10:00:00Z", "2030-01-01T12:00:00Z"));

        let cases = [
            (create_line("user2", "room1", "2030-01-01T11:00:00Z", "2030-01-01T13:00:00Z"), "overlap"),
            (create_line("user2", "room1", "2020-01-01T11:00:00Z", "2020-01-01T13:00:00Z"), "not_in_future"),
            (create_line("user2", "room1", "2030-01-01T13:00:00Z", "2030-01-01T11:00:00Z"), "invalid_range"),
            (create_line("user2", "room9", "2030-01-01T13:00:00Z", "2030-01-01T14:00:00Z"), "resource_not_found"),
            (create_line("user2", "room1", "soon", "2030-01-01T14:00:00Z"), "invalid_time_format"),
            (create_line("user2", "", "2030-01-01T13:00:00Z", "2030-01-01T14:00:00Z"), "missing_field"),
        ];
        for (line, code) in cases {
            let reply = handle_line(&engine, &line);
            assert_eq!(reply.status, 400, "{code}");
            assert_eq!(reply.code, Some(code));
            assert!(reply.error.is_some());
        }
    }

    #[test]
    fn ownership_statuses() {
        let engine = test_engine();
        let created = handle_line(&engine, &create_line("user1", "room1", "2030-01-01T10:00:00Z", "2030-01-01T12:00:00Z"));
        let id = created.body.unwrap()["id"].as_str().unwrap().to_string();

        let forbidden = handle_line(
            &engine,
            &format!(r#"{{"op":"update_reservation","user":"user2","id":"{id}","startTime":"2030-01-01T09:00:00Z"}}"#),
        );
        assert_eq!(forbidden.status, 403);
        assert_eq!(forbidden.code, Some("forbidden"));

        let empty = handle_line(&engine, &format!(r#"{{"op":"update_reservation","user":"user1","id":"{id}"}}"#));
        assert_eq!(empty.status, 400);
        assert_eq!(empty.code, Some("no_fields_provided"));

        let unknown = handle_line(&engine, r#"{"op":"delete_reservation","user":"user1","id":"nope"}"#);
        assert_eq!(unknown.status, 404);

        let deleted = handle_line(&engine, &format!(r#"{{"op":"delete_reservation","user":"superuser","id":"{id}"}}"#));
        assert_eq!(deleted, Reply::no_content());
    }

    #[test]
    fn unknown_room_listing_is_404() {
        let engine = test_engine();
        let reply = handle_line(&engine, r#"{"op":"list_resource_reservations","resourceId":"room9"}"#);
        assert_eq!(reply.status, 404);
        assert_eq!(reply.code, Some("resource_not_found"));
    }

    #[test]
    fn malformed_is_bad_request() {
        let engine = test_engine();
        let reply = handle_line(&engine, "{nope");
        assert_eq!(reply.status, 400);
        assert_eq!(reply.code, Some("bad_request"));
    }

    #[test]
    fn no_content_line_has_only_status() {
        assert_eq!(Reply::no_content().to_line(), r#"{"status":204}"#);
    }

    #[tokio::test]
    async fn connection_answers_each_line() {
        let engine = test_engine();
        let rooms = r#"{"status":200,"body":[{"id":"room1","name":"Conference Room A","capacity":10},{"id":"room2","name":"Conference Room B","capacity":8},{"id":"room3","name":"Meeting Room 1","capacity":6},{"id":"room4","name":"Meeting Room 2","capacity":4},{"id":"room5","name":"Board Room","capacity":12}]}"#;
        let mock = tokio_test::io::Builder::new()
            .read(b"{\"op\":\"list_resources\"}\n")
            .write(format!("{rooms}\n").as_bytes())
            .read(b"\n")
            .read(b"{\"op\":\"delete_reservation\",\"id\":\"nope\"}\n")
            .write(b"{\"status\":401,\"error\":\"missing caller identity\",\"code\":\"unauthenticated\"}\n")
            .read(b"{\"op\":\"get_reservation\",\"id\":\"nope\"}\n")
            .write(b"{\"status\":404,\"error\":\"reservation not found: nope\",\"code\":\"not_found\"}\n")
            .read(b"{\"op\":\"list_reservations\"}\n")
            .write(b"{\"status\":200,\"body\":[]}\n")
            .build();
        process_connection(mock, engine).await.unwrap();
    }
}
