use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::info;

use crate::{
    GameType, IdentityId,
    app::LazyAppState,
    identity::Identity,
    transport::{DisconnectReason, ListenerId, PresenceEntry, ServerMessage},
};

#[derive(Clone, Debug)]
pub struct Presence {
    pub identity: Identity,
    pub listener: ListenerId,
    pub current_game: Option<GameType>,
    pub connected_at: DateTime<Utc>,
}

pub type ArcConnectionService = Arc<Box<dyn ConnectionService + Send + Sync + 'static>>;

pub trait ConnectionService {
    fn register(&self, identity: Identity, listener: ListenerId);
    /// Only removes the presence when `listener` is still the identity's
    /// current connection.
    fn unregister(&self, identity_id: &IdentityId, listener: ListenerId);
    fn set_current_game(&self, identity_id: &IdentityId, game: Option<GameType>);
    fn clear_current_game(&self, identity_ids: &[IdentityId]);
    fn get_identity(&self, identity_id: &IdentityId) -> Option<Identity>;
    fn get_connection(&self, identity_id: &IdentityId) -> Option<ListenerId>;
    fn get_presence(&self) -> Vec<PresenceEntry>;
    fn send_to(&self, identity_id: &IdentityId, msg: &ServerMessage);
    fn send_to_many(&self, identity_ids: &[IdentityId], msg: &ServerMessage);
}

pub struct ConnectionServiceImpl {
    online: Arc<DashMap<IdentityId, Presence>>,
    app_state: LazyAppState,
}

impl ConnectionServiceImpl {
    pub fn new(app_state: LazyAppState) -> Self {
        Self {
            online: Arc::new(DashMap::new()),
            app_state,
        }
    }

    fn sorted_presences(&self) -> Vec<Presence> {
        let mut presences: Vec<Presence> = self
            .online
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        presences.sort_by(|a, b| {
            a.connected_at
                .cmp(&b.connected_at)
                .then_with(|| a.identity.id.cmp(&b.identity.id))
        });
        presences
    }

    fn update_online_users(&self) {
        let presences = self.sorted_presences();
        let listeners: Vec<ListenerId> = presences.iter().map(|p| p.listener).collect();
        let users = presences.into_iter().map(to_entry).collect();
        let msg = ServerMessage::OnlineUsers { users };
        self.app_state
            .transport_service()
            .try_listener_multicast(&listeners, &msg);
    }

    fn on_identity_gone(&self, identity_id: &IdentityId) {
        self.app_state
            .matchmaking_service()
            .remove_on_disconnect(identity_id);
        for room in self
            .app_state
            .room_service()
            .remove_waiting_rooms_of(identity_id)
        {
            info!(
                "Dropped waiting room {} ({}) of {}",
                room.id, room.game_type, identity_id
            );
        }
        self.app_state
            .chess_service()
            .on_player_disconnected(identity_id);
        self.app_state
            .color_service()
            .on_player_disconnected(identity_id);
    }
}

fn to_entry(presence: Presence) -> PresenceEntry {
    PresenceEntry {
        id: presence.identity.id,
        display_name: presence.identity.display_name,
        current_game: presence.current_game,
    }
}

impl ConnectionService for ConnectionServiceImpl {
    fn register(&self, identity: Identity, listener: ListenerId) {
        let id = identity.id.clone();
        let chess_service = self.app_state.chess_service();
        let current_game = chess_service
            .get_session_of_player(&id)
            .map(|_| GameType::Chess);
        let previous = self.online.insert(
            id.clone(),
            Presence {
                identity,
                listener,
                current_game,
                connected_at: Utc::now(),
            },
        );
        if let Some(previous) = previous
            && previous.listener != listener
        {
            info!(
                "Closing previous connection {} of {} (new connection {})",
                previous.listener, id, listener
            );
            self.app_state
                .transport_service()
                .disconnect_listener(previous.listener, DisconnectReason::NewSession);
        }
        info!("{} is online on {}", id, listener);
        self.update_online_users();
        if current_game.is_some() {
            chess_service.on_player_reconnected(&id);
        }
    }

    fn unregister(&self, identity_id: &IdentityId, listener: ListenerId) {
        let removed = self
            .online
            .remove_if(identity_id, |_, presence| presence.listener == listener);
        if removed.is_none() {
            return;
        }
        info!("{} went offline ({})", identity_id, listener);
        self.on_identity_gone(identity_id);
        self.update_online_users();
    }

    fn set_current_game(&self, identity_id: &IdentityId, game: Option<GameType>) {
        let Some(mut presence) = self.online.get_mut(identity_id) else {
            return;
        };
        presence.current_game = game;
        drop(presence);
        self.update_online_users();
    }

    fn clear_current_game(&self, identity_ids: &[IdentityId]) {
        let mut changed = false;
        for id in identity_ids {
            if let Some(mut presence) = self.online.get_mut(id) {
                presence.current_game = None;
                changed = true;
            }
        }
        if changed {
            self.update_online_users();
        }
    }

    fn get_identity(&self, identity_id: &IdentityId) -> Option<Identity> {
        self.online
            .get(identity_id)
            .map(|entry| entry.identity.clone())
    }

    fn get_connection(&self, identity_id: &IdentityId) -> Option<ListenerId> {
        self.online.get(identity_id).map(|entry| entry.listener)
    }

    fn get_presence(&self) -> Vec<PresenceEntry> {
        self.sorted_presences().into_iter().map(to_entry).collect()
    }

    fn send_to(&self, identity_id: &IdentityId, msg: &ServerMessage) {
        if let Some(listener) = self.get_connection(identity_id) {
            self.app_state
                .transport_service()
                .try_listener_send(listener, msg);
        }
    }

    fn send_to_many(&self, identity_ids: &[IdentityId], msg: &ServerMessage) {
        let listeners: Vec<ListenerId> = identity_ids
            .iter()
            .filter_map(|id| self.get_connection(id))
            .collect();
        self.app_state
            .transport_service()
            .try_listener_multicast(&listeners, msg);
    }
}

#[cfg(test)]
mod tests {
    use wager_core::PieceColor;

    use crate::{
        app::test_support::test_app, config::GameConfig, identity::Identity,
        matchmaking::QueueOutcome,
    };

    use super::*;

    fn last_presence(messages: &[ServerMessage]) -> Vec<PresenceEntry> {
        messages
            .iter()
            .rev()
            .find_map(|msg| match msg {
                ServerMessage::OnlineUsers { users } => Some(users.clone()),
                _ => None,
            })
            .expect("Expected an online users snapshot")
    }

    #[test]
    fn test_register_broadcasts_snapshot() {
        let test = test_app(GameConfig::default());
        let (alice, alice_listener) = test.connect("alice");
        let (_, bob_listener) = test.connect("bob");

        let users = last_presence(&test.messages_for(alice_listener));
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, alice.id);
        assert_eq!(users[0].display_name, "ALICE");
        assert!(users.iter().all(|u| u.current_game.is_none()));
        assert_eq!(last_presence(&test.messages_for(bob_listener)), users);
    }

    #[test]
    fn test_set_current_game_rebroadcasts() {
        let test = test_app(GameConfig::default());
        let (alice, _) = test.connect("alice");
        let (_, bob_listener) = test.connect("bob");

        let connections = &test.app.connection_service;
        connections.set_current_game(&alice.id, Some(GameType::Color));
        let users = last_presence(&test.messages_for(bob_listener));
        let alice_entry = users.iter().find(|u| u.id == alice.id).expect("alice online");
        assert_eq!(alice_entry.current_game, Some(GameType::Color));

        connections.clear_current_game(&[alice.id.clone()]);
        let users = last_presence(&test.messages_for(bob_listener));
        assert!(users.iter().all(|u| u.current_game.is_none()));
    }

    #[test]
    fn test_new_session_replaces_old_one() {
        let test = test_app(GameConfig::default());
        let (alice, first) = test.connect("alice");
        let second = ListenerId::new();
        test.app.connection_service.register(alice.clone(), second);

        assert_eq!(
            test.transport.get_disconnects(),
            vec![(first, DisconnectReason::NewSession)]
        );
        // A late disconnect of the old connection must not drop the new one.
        test.app.connection_service.unregister(&alice.id, first);
        assert_eq!(
            test.app.connection_service.get_connection(&alice.id),
            Some(second)
        );
        test.app.connection_service.unregister(&alice.id, second);
        assert!(test.app.connection_service.get_connection(&alice.id).is_none());
    }

    #[tokio::test]
    async fn test_unregister_leaves_queue() {
        let test = test_app(GameConfig::default());
        let (alice, alice_listener) = test.connect("alice");
        let (bob, _) = test.connect("bob");

        let matchmaking = &test.app.matchmaking_service;
        let outcome = matchmaking
            .join_queue(GameType::Chess, &alice, 100)
            .expect("Failed to join queue");
        assert!(matches!(outcome, QueueOutcome::Waiting));

        test.app.connection_service.unregister(&alice.id, alice_listener);
        assert!(matchmaking.queued_entries(GameType::Chess).is_empty());

        let outcome = matchmaking
            .join_queue(GameType::Chess, &bob, 100)
            .expect("Failed to join queue");
        assert!(matches!(outcome, QueueOutcome::Waiting));
        let users = test.app.connection_service.get_presence();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].current_game, Some(GameType::Chess));
    }

    #[tokio::test]
    async fn test_unregister_drops_waiting_room() {
        let test = test_app(GameConfig::default());
        let (alice, alice_listener) = test.connect("alice");
        test.app
            .matchmaking_service
            .create_room(GameType::Chess, "private1", 10, &alice)
            .expect("Failed to create room");
        assert!(test.messages_for(alice_listener).iter().any(|m| matches!(
            m,
            ServerMessage::PlayerAssigned {
                color: PieceColor::White,
                opponent: None,
                ..
            }
        )));

        test.app.connection_service.unregister(&alice.id, alice_listener);
        assert!(
            test.app
                .room_service
                .get_room(GameType::Chess, "private1")
                .is_none()
        );
    }

    #[test]
    fn test_send_to_offline_identity_is_noop() {
        let test = test_app(GameConfig::default());
        let ghost = Identity::guest();
        test.app.connection_service.send_to(
            &ghost.id,
            &ServerMessage::Error {
                message: "hello".to_string(),
            },
        );
        assert!(test.transport.get_messages().is_empty());
    }
}
