use serde::Deserialize;

/// One parsed request line.
///
/// `user` is the caller identity handed over by whatever authenticated the
/// connection; it is trusted as-is.
#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Command {
    ListResources,
    ListReservations,
    GetReservation {
        id: String,
    },
    CreateReservation {
        user: Option<String>,
        resource_id: Option<String>,
        start_time: Option<String>,
        end_time: Option<String>,
    },
    UpdateReservation {
        user: Option<String>,
        id: String,
        resource_id: Option<String>,
        start_time: Option<String>,
        end_time: Option<String>,
    },
    DeleteReservation {
        user: Option<String>,
        id: String,
    },
    ListResourceReservations {
        resource_id: String,
    },
    ListUserReservations {
        user_id: String,
    },
}

impl Command {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Command::ListResources => "list_resources",
            Command::ListReservations => "list_reservations",
            Command::GetReservation { .. } => "get_reservation",
            Command::CreateReservation { .. } => "create_reservation",
            Command::UpdateReservation { .. } => "update_reservation",
            Command::DeleteReservation { .. } => "delete_reservation",
            Command::ListResourceReservations { .. } => "list_resource_reservations",
            Command::ListUserReservations { .. } => "list_user_reservations",
        }
    }

    /// Caller identity of a mutating command, if one was supplied and non-empty.
    pub fn caller(&self) -> Option<&str> {
        match self {
            Command::CreateReservation { user, .. }
            | Command::UpdateReservation { user, .. }
            | Command::DeleteReservation { user, .. } => {
                user.as_deref().filter(|u| !u.is_empty())
            }
            _ => None,
        }
    }

    pub fn requires_identity(&self) -> bool {
        matches!(
            self,
            Command::CreateReservation { .. }
                | Command::UpdateReservation { .. }
                | Command::DeleteReservation { .. }
        )
    }
}

#[derive(Debug)]
pub enum CommandError {
    Empty,
    Parse(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Empty => write!(f, "empty request"),
            CommandError::Parse(e) => write!(f, "malformed request: {e}"),
        }
    }
}

impl std::error::Error for CommandError {}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(CommandError::Empty);
    }
    serde_json::from_str(trimmed).map_err(|e| CommandError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_resources() {
        assert_eq!(parse_command(r#"{"op":"list_resources"}"#).unwrap(), Command::ListResources);
    }

    #[test]
    fn parse_create_camel_case_fields() {
        let cmd = parse_command(
            r#"{"op":"create_reservation","user":"user1","resourceId":"room1","startTime":"2030-01-01T10:00:00.000Z","endTime":"2030-01-01T12:00:00.000Z"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::CreateReservation {
                user: Some("user1".into()),
                resource_id: Some("room1".into()),
                start_time: Some("2030-01-01T10:00:00.000Z".into()),
                end_time: Some("2030-01-01T12:00:00.000Z".into()),
            }
        );
        assert_eq!(cmd.caller(), Some("user1"));
        assert_eq!(cmd.label(), "create_reservation");
    }

    #[test]
    fn parse_create_with_missing_fields() {
        let cmd = parse_command(r#"{"op":"create_reservation","resourceId":"room1"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::CreateReservation {
                user: None,
                resource_id: Some("room1".into()),
                start_time: None,
                end_time: None,
            }
        );
        assert!(cmd.requires_identity());
        assert_eq!(cmd.caller(), None);
    }

    #[test]
    fn parse_partial_update() {
        let cmd = parse_command(
            r#"{"op":"update_reservation","user":"u","id":"01ARZ3NDEKTSV4RRFFQ69G5FAV","endTime":"2030-01-01T13:00:00Z"}"#,
        )
        .unwrap();
        match cmd {
            Command::UpdateReservation { resource_id, start_time, end_time, .. } => {
                assert!(resource_id.is_none());
                assert!(start_time.is_none());
                assert_eq!(end_time.as_deref(), Some("2030-01-01T13:00:00Z"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_listings() {
        assert_eq!(
            parse_command(r#"{"op":"list_resource_reservations","resourceId":"room2"}"#).unwrap(),
            Command::ListResourceReservations { resource_id: "room2".into() }
        );
        assert_eq!(
            parse_command(r#"{"op":"list_user_reservations","userId":"user1"}"#).unwrap(),
            Command::ListUserReservations { user_id: "user1".into() }
        );
    }

    #[test]
    fn empty_user_is_no_caller() {
        let cmd = parse_command(r#"{"op":"delete_reservation","user":"","id":"x"}"#).unwrap();
        assert_eq!(cmd.caller(), None);
    }

    #[test]
    fn reads_need_no_identity() {
        let cmd = parse_command(r#"{"op":"get_reservation","id":"x"}"#).unwrap();
        assert!(!cmd.requires_identity());
    }

    #[test]
    fn reject_unknown_op_and_garbage() {
        assert!(matches!(parse_command(r#"{"op":"drop_tables"}"#), Err(CommandError::Parse(_))));
        assert!(matches!(parse_command("not json"), Err(CommandError::Parse(_))));
        assert!(matches!(parse_command(r#"{"op":"get_reservation"}"#), Err(CommandError::Parse(_))));
        assert!(matches!(parse_command("   "), Err(CommandError::Empty)));
    }
}
