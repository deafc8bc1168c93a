use std::sync::Arc;

use log::debug;

use crate::{
    GameType, IdentityId, connection::ArcConnectionService, identity::Identity,
    transport::ServerMessage,
};

pub type ArcInviteService = Arc<Box<dyn InviteService + Send + Sync + 'static>>;

pub trait InviteService {
    /// Relays an invitation to a connected identity. Returns whether it was
    /// delivered; offline targets are skipped.
    fn invite(
        &self,
        from: &Identity,
        target: &IdentityId,
        game_type: GameType,
        room_code: &str,
    ) -> bool;
}

pub struct InviteServiceImpl {
    connection_service: ArcConnectionService,
}

impl InviteServiceImpl {
    pub fn new(connection_service: ArcConnectionService) -> Self {
        Self { connection_service }
    }
}

impl InviteService for InviteServiceImpl {
    fn invite(
        &self,
        from: &Identity,
        target: &IdentityId,
        game_type: GameType,
        room_code: &str,
    ) -> bool {
        if self.connection_service.get_connection(target).is_none() {
            debug!("Dropping invite from {} to offline {}", from.id, target);
            return false;
        }
        let msg = ServerMessage::GameInvite {
            from: from.display_name.clone(),
            from_id: from.id.clone(),
            game_type,
            room_code: room_code.to_string(),
            message: format!(
                "{} invited you to play {}!",
                from.display_name,
                game_type.title()
            ),
        };
        self.connection_service.send_to(target, &msg);
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::{app::test_support::test_app, config::GameConfig};

    use super::*;

    #[test]
    fn test_invite_reaches_online_target() {
        let test = test_app(GameConfig::default());
        let (alice, alice_listener) = test.connect("alice");
        let (bob, bob_listener) = test.connect("bob");

        assert!(
            test.app
                .invite_service
                .invite(&alice, &bob.id, GameType::Color, "table-7")
        );
        assert!(test.messages_for(bob_listener).contains(&ServerMessage::GameInvite {
            from: "ALICE".to_string(),
            from_id: alice.id.clone(),
            game_type: GameType::Color,
            room_code: "table-7".to_string(),
            message: "ALICE invited you to play Color Prediction!".to_string(),
        }));
        assert!(
            !test
                .messages_for(alice_listener)
                .iter()
                .any(|m| matches!(m, ServerMessage::GameInvite { .. }))
        );
    }

    #[test]
    fn test_invite_to_offline_target_is_dropped() {
        let test = test_app(GameConfig::default());
        let (alice, _) = test.connect("alice");
        test.transport.clear();
        assert!(
            !test
                .app
                .invite_service
                .invite(&alice, &"nobody".to_string(), GameType::Chess, "x")
        );
        assert!(test.transport.get_messages().is_empty());
    }
}
