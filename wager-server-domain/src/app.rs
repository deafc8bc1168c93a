use std::sync::{Arc, OnceLock};

use log::warn;

use crate::{
    chess::{ArcChessService, ChessServiceImpl},
    color::{ArcColorService, ColorServiceImpl},
    config::GameConfig,
    connection::{ArcConnectionService, ConnectionServiceImpl},
    invite::{ArcInviteService, InviteServiceImpl},
    matchmaking::{ArcMatchmakingService, MatchmakingServiceImpl},
    room::{ArcRoomService, RoomServiceImpl},
    settlement::ArcSettlementSink,
    transport::ArcTransportService,
};

#[derive(Clone, Default)]
pub struct LazyAppState(Arc<OnceLock<AppState>>);

impl LazyAppState {
    pub fn new() -> Self {
        Self(Arc::new(OnceLock::new()))
    }
    pub fn unwrap(&self) -> &AppState {
        self.0.get().expect("AppState not initialized")
    }
    pub fn transport_service(&self) -> ArcTransportService {
        self.unwrap().transport_service.clone()
    }
    pub fn connection_service(&self) -> ArcConnectionService {
        self.unwrap().connection_service.clone()
    }
    pub fn matchmaking_service(&self) -> ArcMatchmakingService {
        self.unwrap().matchmaking_service.clone()
    }
    pub fn room_service(&self) -> ArcRoomService {
        self.unwrap().room_service.clone()
    }
    pub fn chess_service(&self) -> ArcChessService {
        self.unwrap().chess_service.clone()
    }
    pub fn color_service(&self) -> ArcColorService {
        self.unwrap().color_service.clone()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub transport_service: ArcTransportService,
    pub connection_service: ArcConnectionService,
    pub room_service: ArcRoomService,
    pub matchmaking_service: ArcMatchmakingService,
    pub chess_service: ArcChessService,
    pub color_service: ArcColorService,
    pub invite_service: ArcInviteService,
    pub settlement_sink: ArcSettlementSink,
    pub config: Arc<GameConfig>,
}

pub fn construct_app(
    lazy_app_state: LazyAppState,
    transport_service: ArcTransportService,
    settlement_sink: ArcSettlementSink,
    config: GameConfig,
) -> AppState {
    let config = Arc::new(config);

    let connection_service: ArcConnectionService =
        Arc::new(Box::new(ConnectionServiceImpl::new(lazy_app_state.clone())));

    let room_service: ArcRoomService = Arc::new(Box::new(RoomServiceImpl::new()));

    let chess_service: ArcChessService = Arc::new(Box::new(ChessServiceImpl::new(
        connection_service.clone(),
        room_service.clone(),
        settlement_sink.clone(),
        config.clone(),
    )));

    let color_service: ArcColorService = Arc::new(Box::new(ColorServiceImpl::new(
        connection_service.clone(),
        room_service.clone(),
        settlement_sink.clone(),
        config.clone(),
    )));

    let matchmaking_service: ArcMatchmakingService =
        Arc::new(Box::new(MatchmakingServiceImpl::new(
            connection_service.clone(),
            room_service.clone(),
            chess_service.clone(),
            color_service.clone(),
            config.clone(),
        )));

    let invite_service: ArcInviteService =
        Arc::new(Box::new(InviteServiceImpl::new(connection_service.clone())));

    let app = AppState {
        transport_service,
        connection_service,
        room_service,
        matchmaking_service,
        chess_service,
        color_service,
        invite_service,
        settlement_sink,
        config,
    };

    if lazy_app_state.0.set(app.clone()).is_err() {
        warn!("AppState was already initialized");
    }
    app
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::{
        config::GameConfig,
        identity::Identity,
        settlement::MockSettlementSink,
        transport::{ListenerId, MockTransportService, ServerMessage},
    };

    use super::{AppState, LazyAppState, construct_app};

    pub struct TestApp {
        pub app: AppState,
        pub transport: MockTransportService,
        pub settlement: MockSettlementSink,
    }

    pub fn test_app(config: GameConfig) -> TestApp {
        let transport = MockTransportService::default();
        let settlement = MockSettlementSink::default();
        let app = construct_app(
            LazyAppState::new(),
            Arc::new(Box::new(transport.clone())),
            Arc::new(Box::new(settlement.clone())),
            config,
        );
        TestApp {
            app,
            transport,
            settlement,
        }
    }

    impl TestApp {
        pub fn connect(&self, id: &str) -> (Identity, ListenerId) {
            let identity = Identity {
                id: id.to_string(),
                display_name: id.to_uppercase(),
                is_guest: false,
            };
            let listener = ListenerId::new();
            self.app
                .connection_service
                .register(identity.clone(), listener);
            (identity, listener)
        }

        pub fn messages_for(&self, listener: ListenerId) -> Vec<ServerMessage> {
            self.transport.messages_for(listener)
        }
    }
}
