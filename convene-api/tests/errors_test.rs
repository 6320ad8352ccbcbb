use anyhow::anyhow;
use convene_api::errors::SpaceError;
use convene_api::{MessageKind, NodeAddress, RequirementSet};
use std::error::Error;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convention_unreachable_error() {
        let error = SpaceError::ConventionUnreachable {
            leader: NodeAddress::from_parts("10.0.0.1", 1900),
            attempts: 5,
        };

        assert_eq!(
            error.to_string(),
            "Convention leader 10.0.0.1:1900 unreachable after 5 attempts"
        );
        assert!(error.source().is_none());
    }

    #[test]
    fn test_no_capable_host_error() {
        let error = SpaceError::NoCapableHost {
            requirements: RequirementSet::new().require("Server", true),
        };

        assert_eq!(
            error.to_string(),
            "No capable host for requirements {Server: true}"
        );
    }

    #[test]
    fn test_timeout_error() {
        let error = SpaceError::Timeout(Duration::from_secs(10));

        assert_eq!(error.to_string(), "Timeout after 10s");
        assert!(error.is_timeout());
        assert!(!SpaceError::Stopped.is_timeout());
    }

    #[test]
    fn test_unhandled_message_type_error() {
        let error = SpaceError::UnhandledMessageType {
            kind: MessageKind::Text,
            actor: "echo.EchoResponder".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Actor echo.EchoResponder has no handler for message type Text"
        );
    }

    #[test]
    fn test_spawn_rejected_error() {
        let error = SpaceError::SpawnRejected {
            host: NodeAddress::from_parts("server", 1900),
            reason: "requirements no longer satisfied".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Spawn rejected by server:1900: requirements no longer satisfied"
        );
    }

    #[test]
    fn test_simple_variants() {
        assert_eq!(SpaceError::Stopped.to_string(), "Actor space stopped");
        assert_eq!(
            SpaceError::NotJoined.to_string(),
            "Node has not joined the convention"
        );
        assert_eq!(
            SpaceError::UnknownActorType("Nope".to_string()).to_string(),
            "Unknown actor type: Nope"
        );
        assert_eq!(
            SpaceError::InvalidAddress("x:y".to_string()).to_string(),
            "Invalid node address: \"x:y\""
        );
    }

    #[test]
    fn test_from_anyhow() {
        fn fails() -> Result<(), SpaceError> {
            Err(anyhow!("Underlying IO error"))?;
            Ok(())
        }

        let error = fails().unwrap_err();
        assert!(matches!(error, SpaceError::Other(_)));
        assert_eq!(error.to_string(), "Underlying IO error");
    }
}
