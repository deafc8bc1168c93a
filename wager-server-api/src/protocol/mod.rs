pub mod json;

use log::{debug, error, warn};
use wager_server_domain::{
    GameType, ServiceError,
    app::AppState,
    identity::Identity,
    matchmaking::QueueError,
    transport::{ListenerId, ServerMessage},
};

use crate::protocol::json::{ClientEvent, RoomPayload, ServerEvent};

pub fn encode_server_message(msg: &ServerMessage) -> Option<String> {
    match serde_json::to_string(&ServerEvent::from(msg)) {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Failed to serialize server message {:?}: {}", msg, e);
            None
        }
    }
}

/// Parses and dispatches one inbound frame. Failures go back to the sending
/// connection only.
pub fn handle_client_message(app: &AppState, identity: &Identity, listener: ListenerId, text: &str) {
    let reply = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => {
            debug!("{} ({}) sent {:?}", identity.id, listener, event);
            handle_event(app, identity, event)
        }
        Err(e) => {
            warn!("Invalid message from {} ({}): {}", identity.id, listener, e);
            Some(ServerMessage::Error {
                message: "Invalid message format".to_string(),
            })
        }
    };
    if let Some(reply) = reply {
        app.transport_service.try_listener_send(listener, &reply);
    }
}

fn handle_event(app: &AppState, identity: &Identity, event: ClientEvent) -> Option<ServerMessage> {
    match event {
        ClientEvent::JoinChessQueue(payload) => {
            handle_join_queue(app, identity, GameType::Chess, payload.stake())
        }
        ClientEvent::JoinColorQueue(payload) => {
            handle_join_queue(app, identity, GameType::Color, payload.stake())
        }
        ClientEvent::CreateChessRoom(payload) => {
            handle_create_room(app, identity, GameType::Chess, payload)
        }
        ClientEvent::CreateColorRoom(payload) => {
            handle_create_room(app, identity, GameType::Color, payload)
        }
        ClientEvent::JoinChessRoom(payload) => {
            handle_join_room(app, identity, GameType::Chess, payload)
        }
        ClientEvent::JoinColorRoom(payload) => {
            handle_join_room(app, identity, GameType::Color, payload)
        }
        ClientEvent::ChessMove { room_id, from, to } => {
            match app
                .chess_service
                .apply_move(&identity.id, &room_id, from.into(), to.into())
            {
                Ok(_) => None,
                Err(ServiceError::NotPossible(reason)) => {
                    Some(ServerMessage::MoveRejected { room_id, reason })
                }
                Err(e) => Some(error_reply(&e)),
            }
        }
        ClientEvent::ChessResign { room_id } => app
            .chess_service
            .resign(&identity.id, &room_id)
            .err()
            .map(|e| error_reply(&e)),
        ClientEvent::PlaceColorBet {
            room_id,
            color,
            amount,
        } => match app
            .color_service
            .place_bet(&identity.id, &room_id, &color, amount)
        {
            Ok(_) => None,
            Err(ServiceError::NotPossible(reason)) => {
                Some(ServerMessage::BetRejected { room_id, reason })
            }
            Err(e) => Some(error_reply(&e)),
        },
        ClientEvent::CancelQueue(game_type) => {
            app.matchmaking_service
                .cancel_queue(game_type.into(), &identity.id);
            None
        }
        ClientEvent::InviteUser {
            target_user_id,
            game_type,
            room_code,
        } => {
            app.invite_service
                .invite(identity, &target_user_id, game_type.into(), &room_code);
            None
        }
    }
}

fn error_reply(e: &ServiceError) -> ServerMessage {
    ServerMessage::Error {
        message: e.message().to_string(),
    }
}

fn handle_join_queue(
    app: &AppState,
    identity: &Identity,
    game_type: GameType,
    stake: u64,
) -> Option<ServerMessage> {
    match app.matchmaking_service.join_queue(game_type, identity, stake) {
        Ok(_) => None,
        Err(QueueError::AlreadyQueued) => Some(ServerMessage::AlreadyInQueue { game_type }),
        Err(e) => Some(ServerMessage::Error {
            message: e.to_string(),
        }),
    }
}

fn handle_create_room(
    app: &AppState,
    identity: &Identity,
    game_type: GameType,
    payload: RoomPayload,
) -> Option<ServerMessage> {
    let result = match payload.rejection() {
        Some(reason) => Err(reason),
        None => app
            .matchmaking_service
            .create_room(game_type, &payload.room_code, payload.stake, identity)
            .map_err(|e| e.to_string()),
    };
    result
        .err()
        .map(|reason| ServerMessage::RoomCreationFailed { game_type, reason })
}

fn handle_join_room(
    app: &AppState,
    identity: &Identity,
    game_type: GameType,
    payload: RoomPayload,
) -> Option<ServerMessage> {
    let result = match payload.rejection() {
        Some(reason) => Err(reason),
        None => app
            .matchmaking_service
            .join_room(game_type, &payload.room_code, payload.stake, identity)
            .map_err(|e| e.to_string()),
    };
    result
        .err()
        .map(|reason| ServerMessage::RoomJoinFailed { game_type, reason })
}
