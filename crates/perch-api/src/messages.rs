use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, info};
use uuid::Uuid;

use perch_db::Database;
use perch_db::models::NewMessage;
use perch_gateway::Dispatcher;
use perch_types::api::{Claims, MessageResponse, SendMessageRequest};
use perch_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::blocking;
use crate::convert::message_response;
use crate::enrich::Enricher;
use crate::error::{ApiError, ApiResult};
use crate::posts::validate_body;
use crate::run_blocking;

/// Direct messages between mutual followers, pushed live over the gateway.
#[derive(Clone)]
pub struct MessageService {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    enricher: Enricher,
}

impl MessageService {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, enricher: Enricher) -> Self {
        Self { db, dispatcher, enricher }
    }

    /// Persist a message and push it to the receiver if they're connected.
    pub async fn send_message(
        &self,
        sender: &Claims,
        receiver: Uuid,
        req: SendMessageRequest,
    ) -> ApiResult<MessageResponse> {
        let this = self.clone();
        let sender_id = sender.sub;
        let message = blocking(move || this.store_message(sender_id, receiver, req)).await?;

        let delivered = self
            .dispatcher
            .send_to_user(
                receiver,
                GatewayEvent::MessageCreate {
                    id: message.id,
                    sender_id: message.sender_id,
                    sender_username: sender.username.clone(),
                    receiver_id: message.receiver_id,
                    content: message.content.clone(),
                    images: message.images.clone(),
                    timestamp: message.created_at,
                },
            )
            .await;
        debug!("message {} pushed live: {}", message.id, delivered);

        Ok(message)
    }

    /// The synchronous half of `send_message`: checks and persistence.
    pub fn store_message(
        &self,
        sender: Uuid,
        receiver: Uuid,
        req: SendMessageRequest,
    ) -> ApiResult<MessageResponse> {
        if sender == receiver {
            return Err(ApiError::Conflict("CANNOT_MESSAGE_YOURSELF"));
        }
        let content = validate_body(&req.content, &req.images)?;

        let (sender_id, receiver_id) = (sender.to_string(), receiver.to_string());
        if self.db.get_user_by_id(&receiver_id)?.is_none() {
            return Err(ApiError::NotFound);
        }
        if !(self.db.is_following(&sender_id, &receiver_id)? && self.db.is_following(&receiver_id, &sender_id)?) {
            return Err(ApiError::Forbidden("MUTUAL_FOLLOW_REQUIRED"));
        }

        let id = Uuid::new_v4().to_string();
        let row = self.db.insert_message(&NewMessage {
            id: &id,
            sender_id: &sender_id,
            receiver_id: &receiver_id,
            content: &content,
            images: &req.images,
        })?;

        info!("{} messaged {}", sender, receiver);
        let images = self.enricher.images(&row.images);
        Ok(message_response(row, images))
    }

    /// Both directions between `viewer` and `other`, oldest first.
    pub fn conversation(&self, viewer: Uuid, other: Uuid) -> ApiResult<Vec<MessageResponse>> {
        let rows = self.db.get_conversation(&viewer.to_string(), &other.to_string())?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let images = self.enricher.images(&row.images);
                message_response(row, images)
            })
            .collect())
    }
}

// -- Handlers --

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state.messages.send_message(&claims, user_id, req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = run_blocking(state, move |s| s.messages.conversation(claims.sub, user_id)).await?;
    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaSigner;
    use perch_db::models::NewUser;

    fn fixture() -> (Arc<Database>, Dispatcher, MessageService) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let media = MediaSigner::new("http://media.test", b"secret").unwrap();
        let messages = MessageService::new(db.clone(), dispatcher.clone(), Enricher::new(db.clone(), media));
        (db, dispatcher, messages)
    }

    fn user(db: &Database, username: &str) -> Claims {
        let id = Uuid::new_v4();
        db.create_user(&NewUser {
            id: &id.to_string(),
            name: username,
            username,
            email: &format!("{}@example.com", username),
            password_hash: "x",
        })
        .unwrap();
        Claims {
            sub: id,
            username: username.into(),
            exp: usize::MAX,
        }
    }

    fn text(content: &str) -> SendMessageRequest {
        SendMessageRequest {
            content: content.into(),
            images: vec![],
        }
    }

    #[tokio::test]
    async fn mutual_followers_can_message_and_receiver_gets_a_push() {
        let (db, dispatcher, messages) = fixture();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        db.insert_follow(&alice.sub.to_string(), &bob.sub.to_string()).unwrap();
        db.insert_follow(&bob.sub.to_string(), &alice.sub.to_string()).unwrap();

        let (_, mut bob_rx) = dispatcher.register_user_channel(bob.sub).await;

        let sent = messages.send_message(&alice, bob.sub, text("hey bob")).await.unwrap();
        assert_eq!(sent.receiver_id, bob.sub);

        match bob_rx.recv().await {
            Some(GatewayEvent::MessageCreate { id, sender_username, .. }) => {
                assert_eq!(id, sent.id);
                assert_eq!(sender_username, "alice");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        messages.send_message(&bob, alice.sub, text("hi alice")).await.unwrap();
        let convo = messages.conversation(alice.sub, bob.sub).unwrap();
        assert_eq!(convo.len(), 2);
    }

    #[tokio::test]
    async fn one_way_follow_is_not_enough() {
        let (db, _, messages) = fixture();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        db.insert_follow(&alice.sub.to_string(), &bob.sub.to_string()).unwrap();

        assert!(matches!(
            messages.send_message(&alice, bob.sub, text("hello?")).await,
            Err(ApiError::Forbidden("MUTUAL_FOLLOW_REQUIRED"))
        ));
    }

    #[tokio::test]
    async fn self_and_missing_receivers_are_rejected() {
        let (db, _, messages) = fixture();
        let alice = user(&db, "alice");

        assert!(matches!(
            messages.send_message(&alice, alice.sub, text("me")).await,
            Err(ApiError::Conflict("CANNOT_MESSAGE_YOURSELF"))
        ));
        assert!(matches!(
            messages.send_message(&alice, Uuid::new_v4(), text("anyone?")).await,
            Err(ApiError::NotFound)
        ));
    }
}
