use crate::database::HelpDeskRepository;
use crate::error::app_error::AppError;
use crate::models::message::{Cursor, Message, NewMessage};
use crate::polling::{PollHandle, Poller, spawn_poller};
use crate::service::session::SessionService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;
use uuid::Uuid;

/// Local copy of one session's conversation plus the fetch watermark.
pub struct ChatFeed<R> {
    service: SessionService<R>,
    session_id: Uuid,
    cursor: Cursor,
    messages: Vec<Message>,
}

impl<R: HelpDeskRepository> ChatFeed<R> {
    pub fn new(service: SessionService<R>, session_id: Uuid) -> Self {
        Self {
            service,
            session_id,
            cursor: Cursor::start(),
            messages: Vec::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Full fetch, replacing whatever was held. Used when (re)entering the view.
    pub async fn load(&mut self) -> Result<&[Message], AppError> {
        let messages = self.service.messages(&self.session_id, Cursor::start()).await?;
        self.cursor = Cursor::start();
        self.cursor.advance(&messages);
        self.messages = messages;
        Ok(&self.messages)
    }

    /// Fetches only what is newer than the cursor and returns that batch.
    pub async fn refresh(&mut self) -> Result<Vec<Message>, AppError> {
        let batch = self.service.messages(&self.session_id, self.cursor).await?;
        self.cursor.advance(&batch);
        self.messages.extend(batch.iter().cloned());
        Ok(batch)
    }

    /// Sends, then fetches so the local view holds the stored message
    /// rather than an optimistic echo.
    pub async fn send(&mut self, message: NewMessage) -> Result<Vec<Message>, AppError> {
        let stored = self.service.send(message).await?;
        debug!(session_id = %self.session_id, message_id = %stored.id, "message sent");
        self.refresh().await
    }
}

struct ChatPoll<R> {
    feed: Arc<Mutex<ChatFeed<R>>>,
    batches: mpsc::UnboundedSender<Vec<Message>>,
}

#[async_trait::async_trait]
impl<R: HelpDeskRepository> Poller for ChatPoll<R> {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn poll(&mut self) -> Result<(), AppError> {
        let batch = self.feed.lock().await.refresh().await?;
        if !batch.is_empty() {
            // The view may already be gone; the handle stops us shortly after.
            let _ = self.batches.send(batch);
        }
        Ok(())
    }
}

/// A mounted chat view: the feed plus its background poll. Dropping the
/// room stops polling.
pub struct ChatRoom<R> {
    feed: Arc<Mutex<ChatFeed<R>>>,
    batches: mpsc::UnboundedReceiver<Vec<Message>>,
    _poll: PollHandle,
}

impl<R: HelpDeskRepository> ChatRoom<R> {
    /// Loads the full history, then polls for new messages every `period`.
    pub async fn open(service: SessionService<R>, session_id: Uuid, period: Duration) -> Result<Self, AppError> {
        let mut feed = ChatFeed::new(service, session_id);
        feed.load().await?;

        let feed = Arc::new(Mutex::new(feed));
        let (tx, rx) = mpsc::unbounded_channel();
        let poll = spawn_poller(
            ChatPoll {
                feed: Arc::clone(&feed),
                batches: tx,
            },
            period,
        );

        Ok(Self {
            feed,
            batches: rx,
            _poll: poll,
        })
    }

    /// Messages arriving from the background poll. Batches triggered by our
    /// own sends are returned by [`ChatRoom::send`] instead.
    pub async fn next_batch(&mut self) -> Option<Vec<Message>> {
        self.batches.recv().await
    }

    pub async fn send(&self, message: NewMessage) -> Result<Vec<Message>, AppError> {
        self.feed.lock().await.send(message).await
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.feed.lock().await.messages().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Sender;
    use crate::test_utils::{MockRepository, sample_session_request};

    async fn attended_session() -> (SessionService<MockRepository>, Uuid, Uuid) {
        let service = SessionService::new(MockRepository::new());
        let session = service.submit(&sample_session_request()).await.unwrap().session;
        let volunteer = Uuid::new_v4();
        service.claim(&session.id, &volunteer).await.unwrap();
        (service, session.id, volunteer)
    }

    #[tokio::test]
    async fn incremental_fetch_exchanges_messages_between_sides() {
        let (service, id, volunteer) = attended_session().await;
        let mut requester = ChatFeed::new(service.clone(), id);
        let mut helper = ChatFeed::new(service.clone(), id);

        helper.send(NewMessage::volunteer(id, volunteer, "hola")).await.unwrap();
        let received = requester.refresh().await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].text, "hola");

        requester.send(NewMessage::user(id, "gracias")).await.unwrap();
        let received = helper.refresh().await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].text, "gracias");
        assert_eq!(received[0].sender, Sender::User);

        assert!(helper.refresh().await.unwrap().is_empty());
        assert!(requester.refresh().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_returns_the_stored_message() {
        let (service, id, _) = attended_session().await;
        let mut feed = ChatFeed::new(service, id);

        let batch = feed.send(NewMessage::user(id, "¿hay alguien?")).await.unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(feed.messages(), batch.as_slice());
        assert_eq!(feed.cursor().position(), Some(batch[0].created_at));
    }

    #[tokio::test]
    async fn load_replaces_local_state() {
        let (service, id, volunteer) = attended_session().await;
        service.send(NewMessage::user(id, "uno")).await.unwrap();
        service.send(NewMessage::volunteer(id, volunteer, "dos")).await.unwrap();

        let mut feed = ChatFeed::new(service, id);
        let texts: Vec<_> = feed.load().await.unwrap().iter().map(|m| m.text.clone()).collect();

        assert_eq!(texts, vec!["uno", "dos"]);
    }

    #[tokio::test(start_paused = true)]
    async fn room_delivers_new_batches_from_the_other_side() {
        let (service, id, volunteer) = attended_session().await;
        let mut room = ChatRoom::open(service.clone(), id, Duration::from_secs(2)).await.unwrap();

        service.send(NewMessage::volunteer(id, volunteer, "bienvenido")).await.unwrap();
        let batch = room.next_batch().await.unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].text, "bienvenido");
        assert_eq!(room.messages().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn room_survives_a_failed_tick() {
        let (service, id, volunteer) = attended_session().await;
        let mut room = ChatRoom::open(service.clone(), id, Duration::from_secs(2)).await.unwrap();

        service.repository().fail_next(1);
        tokio::time::sleep(Duration::from_secs(3)).await;
        service.send(NewMessage::volunteer(id, volunteer, "sigo aquí")).await.unwrap();

        let batch = room.next_batch().await.unwrap();
        assert_eq!(batch[0].text, "sigo aquí");
    }

    #[tokio::test]
    async fn sending_to_a_finished_session_is_rejected() {
        let (service, id, _) = attended_session().await;
        let mut feed = ChatFeed::new(service.clone(), id);
        service
            .close(&id, &crate::service::session::Participant::Requester)
            .await
            .unwrap();

        let result = feed.send(NewMessage::user(id, "tarde")).await;
        assert!(matches!(result, Err(AppError::SessionConflict { .. })));
    }
}
