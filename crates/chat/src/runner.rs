use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::components::InteractionResponse;
use crate::events::{ChatEnvelope, EventContext, EventDispatcher, HandlerResult};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport response failed: {0}")]
    Respond(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// Inbound side of the chat platform: the event stream plus interaction replies.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError>;
    async fn respond(
        &self,
        envelope_id: &str,
        response: &InteractionResponse,
    ) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopGatewayTransport;

#[async_trait]
impl GatewayTransport for NoopGatewayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
        Ok(None)
    }

    async fn respond(
        &self,
        _envelope_id: &str,
        _response: &InteractionResponse,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Pumps envelopes from the transport into the dispatcher. Each envelope is
/// handled on its own task so a slow handler never stalls the stream.
pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    dispatcher: Arc<EventDispatcher>,
}

impl GatewayRunner {
    pub fn new(transport: Arc<dyn GatewayTransport>, dispatcher: EventDispatcher) -> Self {
        Self { transport, dispatcher: Arc::new(dispatcher) }
    }

    /// Runs until the stream closes. Transport failures are logged and end the
    /// run without an error; there is no reconnect.
    pub async fn start(&self) -> Result<()> {
        if let Err(error) = self.pump().await {
            warn!(
                event_name = "gateway.transport.failed",
                error = %error,
                "gateway transport failed; continuing process without crash"
            );
        }
        Ok(())
    }

    async fn pump(&self) -> Result<(), TransportError> {
        info!(event_name = "gateway.connecting", "opening gateway transport connection");
        self.transport.connect().await?;
        info!(event_name = "gateway.connected", "gateway transport connected");

        let mut in_flight = JoinSet::new();
        let outcome = loop {
            let envelope = match self.transport.next_envelope().await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => break Ok(()),
                Err(error) => break Err(error),
            };

            info!(
                event_name = "ingress.chat.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                "received chat envelope"
            );

            let transport = Arc::clone(&self.transport);
            let dispatcher = Arc::clone(&self.dispatcher);
            in_flight.spawn(async move {
                process_envelope(transport.as_ref(), &dispatcher, envelope).await;
            });

            while let Some(joined) = in_flight.try_join_next() {
                log_join_failure(joined);
            }
        };

        while let Some(joined) = in_flight.join_next().await {
            log_join_failure(joined);
        }

        info!(event_name = "gateway.stream_closed", "gateway transport stream closed");
        self.transport.disconnect().await?;
        outcome
    }
}

fn log_join_failure(joined: Result<(), JoinError>) {
    if let Err(error) = joined {
        warn!(
            event_name = "ingress.chat.handler_panicked",
            error = %error,
            "envelope task ended abnormally; no interaction response was sent"
        );
    }
}

async fn process_envelope(
    transport: &dyn GatewayTransport,
    dispatcher: &EventDispatcher,
    envelope: ChatEnvelope,
) {
    let context = EventContext { correlation_id: envelope.envelope_id.clone() };
    let response = match dispatcher.dispatch(&envelope, &context).await {
        Ok(HandlerResult::Responded(response)) => Some(response),
        Ok(HandlerResult::Processed | HandlerResult::Ignored) => {
            envelope.event.is_interaction().then_some(InteractionResponse::Acknowledge)
        }
        Err(error) => {
            warn!(
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                error = %error,
                "event dispatch failed; continuing gateway loop"
            );
            envelope.event.is_interaction().then_some(InteractionResponse::Acknowledge)
        }
    };

    let Some(response) = response else {
        return;
    };
    match transport.respond(&envelope.envelope_id, &response).await {
        Ok(()) => debug!(
            event_name = "ingress.chat.responded",
            envelope_id = %envelope.envelope_id,
            correlation_id = %envelope.envelope_id,
            "responded to chat interaction"
        ),
        Err(error) => warn!(
            event_name = "ingress.chat.responded",
            envelope_id = %envelope.envelope_id,
            correlation_id = %envelope.envelope_id,
            error = %error,
            "failed to respond to chat interaction"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{GatewayRunner, GatewayTransport, TransportError};
    use crate::components::{self, InteractionResponse};
    use crate::events::{
        Actor, ButtonPress, ChatEnvelope, ChatEvent, ChatEventType, EventContext,
        EventDispatcher, EventHandler, EventHandlerError, HandlerResult,
    };

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<ChatEnvelope>, TransportError>>,
        connect_attempts: usize,
        responses: Vec<(String, InteractionResponse)>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<ChatEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
            }
        }
    }

    #[async_trait]
    impl GatewayTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
            self.state.lock().await.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn respond(
            &self,
            envelope_id: &str,
            response: &InteractionResponse,
        ) -> Result<(), TransportError> {
            self.state.lock().await.responses.push((envelope_id.to_owned(), response.clone()));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            self.state.lock().await.disconnect_calls += 1;
            Ok(())
        }
    }

    struct EchoButtons;

    #[async_trait]
    impl EventHandler for EchoButtons {
        fn event_type(&self) -> ChatEventType {
            ChatEventType::ButtonPressed
        }

        async fn handle(
            &self,
            envelope: &ChatEnvelope,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            match &envelope.event {
                ChatEvent::ButtonPressed(press) if press.custom_id == "fail" => {
                    Err(EventHandlerError::Reply("boom".to_owned()))
                }
                ChatEvent::ButtonPressed(press) if press.custom_id == "panic" => {
                    panic!("handler bug")
                }
                ChatEvent::ButtonPressed(_) => {
                    Ok(HandlerResult::Responded(InteractionResponse::ephemeral(components::pong())))
                }
                _ => Ok(HandlerResult::Ignored),
            }
        }
    }

    fn press(envelope_id: &str, custom_id: &str) -> ChatEnvelope {
        ChatEnvelope {
            envelope_id: envelope_id.to_owned(),
            event: ChatEvent::ButtonPressed(ButtonPress {
                channel_id: "C1".to_owned(),
                message_id: "M1".to_owned(),
                actor: Actor {
                    user_id: "U1".to_owned(),
                    username: "alice".to_owned(),
                    is_bot: false,
                    role_ids: Vec::new(),
                    platform: None,
                },
                custom_id: custom_id.to_owned(),
            }),
        }
    }

    #[tokio::test]
    async fn responds_to_each_interaction_and_disconnects_when_stream_ends() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(press("env-1", "ok"))),
                Ok(Some(press("env-2", "fail"))),
                Ok(Some(ChatEnvelope {
                    envelope_id: "env-3".to_owned(),
                    event: ChatEvent::Unsupported { event_type: "typing".to_owned() },
                })),
                Ok(None),
            ],
        ));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(EchoButtons);

        GatewayRunner::new(transport.clone(), dispatcher).start().await.expect("runner");

        let state = transport.state.lock().await;
        let mut responses = state.responses.clone();
        responses.sort_by(|left, right| left.0.cmp(&right.0));
        assert_eq!(
            responses,
            vec![
                ("env-1".to_owned(), InteractionResponse::ephemeral(components::pong())),
                ("env-2".to_owned(), InteractionResponse::Acknowledge),
            ]
        );
        assert_eq!(state.disconnect_calls, 1);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_the_stream() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![Ok(Some(press("env-1", "panic"))), Ok(Some(press("env-2", "ok"))), Ok(None)],
        ));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(EchoButtons);

        GatewayRunner::new(transport.clone(), dispatcher).start().await.expect("runner");

        let state = transport.state.lock().await;
        assert_eq!(
            state.responses,
            vec![("env-2".to_owned(), InteractionResponse::ephemeral(components::pong()))]
        );
        assert_eq!(state.disconnect_calls, 1);
    }

    #[tokio::test]
    async fn connect_failure_is_not_retried_and_does_not_crash() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned()))],
            vec![Ok(Some(press("env-1", "ok")))],
        ));

        GatewayRunner::new(transport.clone(), EventDispatcher::new())
            .start()
            .await
            .expect("runner should not fail");

        let state = transport.state.lock().await;
        assert_eq!(state.connect_attempts, 1);
        assert!(state.responses.is_empty());
        assert_eq!(state.disconnect_calls, 0);
    }

    #[tokio::test]
    async fn receive_failure_drains_in_flight_work_and_disconnects() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(press("env-1", "ok"))),
                Err(TransportError::Receive("socket reset".to_owned())),
            ],
        ));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(EchoButtons);

        GatewayRunner::new(transport.clone(), dispatcher).start().await.expect("runner");

        let state = transport.state.lock().await;
        assert_eq!(state.responses.len(), 1);
        assert_eq!(state.disconnect_calls, 1);
    }
}
