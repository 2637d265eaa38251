//! Mapping HTTP outcomes onto gateway errors

use safeguard_gateway::GatewayError;

use crate::dto::error_message;

const NO_CONTACTS_MARKER: &str = "no emergency contacts";

/// Classify a non-success response
pub fn classify_status(status: u16, body: &str) -> GatewayError {
    let message = error_message(body);

    if message.to_ascii_lowercase().contains(NO_CONTACTS_MARKER) {
        return GatewayError::NoContacts;
    }

    match status {
        401 | 403 => GatewayError::AuthExpired,
        404 => GatewayError::NotFound,
        500..=599 => GatewayError::Server { status, message },
        _ => GatewayError::Rejected { status, message },
    }
}

/// Classify a transport failure (no response received)
pub fn classify_transport(err: &reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        return GatewayError::Timeout;
    }
    if err.is_decode() {
        return GatewayError::Decode(err.to_string());
    }
    GatewayError::Network(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses() {
        assert_eq!(classify_status(401, ""), GatewayError::AuthExpired);
        assert_eq!(classify_status(403, "{}"), GatewayError::AuthExpired);
    }

    #[test]
    fn no_contacts_wins_over_status() {
        let body = r#"{"message": "No emergency contacts found. Please add contacts."}"#;
        assert_eq!(classify_status(400, body), GatewayError::NoContacts);
        assert_eq!(classify_status(500, body), GatewayError::NoContacts);
    }

    #[test]
    fn server_and_client_errors() {
        assert!(matches!(
            classify_status(503, "maintenance"),
            GatewayError::Server { status: 503, .. }
        ));
        assert_eq!(classify_status(404, ""), GatewayError::NotFound);
        assert!(matches!(
            classify_status(422, r#"{"message":"startTime in past"}"#),
            GatewayError::Rejected { status: 422, message } if message == "startTime in past"
        ));
    }
}
