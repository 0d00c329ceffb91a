//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use super::DialogRuntime;
use crate::db::{StudentRecord, UserId};
use crate::messages::OutgoingMessage;
use crate::state_machine::{DialogState, MessageRef};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock Transport
// ============================================================================

/// Mock transport that serves queued batches and records everything sent
#[allow(dead_code)]
pub struct MockTransport {
    batches: Mutex<VecDeque<Result<Vec<Incoming>, TransportError>>>,
    fail_sends: AtomicBool,
    /// Record of all messages sent, with their chat id
    pub sent: Mutex<Vec<(i64, OutgoingMessage)>>,
    /// Callback ids acknowledged, in order
    pub acknowledged: Mutex<Vec<String>>,
    /// Messages whose inline keyboard was removed
    pub cleared: Mutex<Vec<MessageRef>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(VecDeque::new()),
            fail_sends: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            acknowledged: Mutex::new(Vec::new()),
            cleared: Mutex::new(Vec::new()),
        }
    }

    /// Queue a batch for `next_events`
    pub fn queue_batch(&self, batch: Vec<Incoming>) {
        self.batches.lock().unwrap().push_back(Ok(batch));
    }

    /// Queue a polling failure
    pub fn queue_error(&self, error: TransportError) {
        self.batches.lock().unwrap().push_back(Err(error));
    }

    /// Make every `send` fail (after recording the attempt)
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.text.clone())
            .collect()
    }

    pub fn last_sent(&self) -> Option<OutgoingMessage> {
        self.sent.lock().unwrap().last().map(|(_, m)| m.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn next_events(&self) -> Result<Vec<Incoming>, TransportError> {
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(batch) => batch,
            None => {
                // Idle long poll
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(vec![])
            }
        }
    }

    async fn send(&self, chat_id: i64, message: &OutgoingMessage) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((chat_id, message.clone()));
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::new("mock send failure"));
        }
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), TransportError> {
        self.acknowledged
            .lock()
            .unwrap()
            .push(callback_id.to_string());
        Ok(())
    }

    async fn clear_choices(&self, message: &MessageRef) -> Result<(), TransportError> {
        self.cleared.lock().unwrap().push(*message);
        Ok(())
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// In-memory record store for testing, with switchable failures
#[allow(dead_code)]
pub struct InMemoryStore {
    records: Mutex<HashMap<UserId, StudentRecord>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    /// Number of upsert attempts, failed ones included
    pub upserts: AtomicUsize,
}

#[allow(dead_code)]
impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            upserts: AtomicUsize::new(0),
        }
    }

    /// Seed a record directly
    pub fn with_record(self, record: StudentRecord) -> Self {
        self.records.lock().unwrap().insert(record.user_id, record);
        self
    }

    /// Make upserts and deletes fail without touching the data
    pub fn failing_writes(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    /// Make fetches fail
    pub fn failing_reads(self) -> Self {
        self.fail_reads.store(true, Ordering::SeqCst);
        self
    }

    pub fn get(&self, user_id: UserId) -> Option<StudentRecord> {
        self.records.lock().unwrap().get(&user_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn upsert(&self, record: &StudentRecord) -> Result<(), String> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err("database is locked".to_string());
        }
        self.records
            .lock()
            .unwrap()
            .insert(record.user_id, record.clone());
        Ok(())
    }

    async fn fetch(&self, user_id: UserId) -> Result<Option<StudentRecord>, String> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err("disk I/O error".to_string());
        }
        Ok(self.get(user_id))
    }

    async fn delete(&self, user_id: UserId) -> Result<(), String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err("database is locked".to_string());
        }
        self.records.lock().unwrap().remove(&user_id);
        Ok(())
    }
}

// ============================================================================
// Test Bot Builder
// ============================================================================

/// A runtime wired to mocks, driven event by event
pub struct TestBot<S: RecordStore = Arc<InMemoryStore>> {
    pub runtime: DialogRuntime<S, Arc<MockTransport>>,
    pub transport: Arc<MockTransport>,
    next_callback: AtomicUsize,
}

impl TestBot {
    pub fn new() -> (Self, Arc<InMemoryStore>) {
        Self::with_store(InMemoryStore::new())
    }

    pub fn with_store(store: InMemoryStore) -> (Self, Arc<InMemoryStore>) {
        let store = Arc::new(store);
        (TestBot::with_record_store(store.clone()), store)
    }
}

impl<S: RecordStore> TestBot<S> {
    pub fn with_record_store(store: S) -> Self {
        let transport = Arc::new(MockTransport::new());
        let runtime = DialogRuntime::new(store, transport.clone(), CancellationToken::new());
        Self {
            runtime,
            transport,
            next_callback: AtomicUsize::new(1),
        }
    }

    /// User types `text` in their private chat
    pub async fn say(&self, user_id: UserId, text: &str) {
        self.runtime
            .handle_incoming(Incoming {
                user_id,
                chat_id: user_id,
                kind: IncomingKind::Text(text.to_string()),
            })
            .await;
    }

    /// User presses the inline button carrying `token`; returns the callback id
    pub async fn press(&self, user_id: UserId, token: &str) -> String {
        let n = self.next_callback.fetch_add(1, Ordering::SeqCst);
        let callback_id = format!("cb-{n}");
        self.runtime
            .handle_incoming(Incoming {
                user_id,
                chat_id: user_id,
                kind: IncomingKind::Choice {
                    token: token.to_string(),
                    callback_id: callback_id.clone(),
                    message: Some(summary_ref(user_id)),
                },
            })
            .await;
        callback_id
    }

    pub async fn state(&self, user_id: UserId) -> DialogState {
        self.runtime.sessions().get(user_id).await
    }

    pub fn last_sent(&self) -> OutgoingMessage {
        self.transport.last_sent().expect("nothing was sent")
    }
}

/// Where the tests pretend the summary keyboard lives
pub fn summary_ref(user_id: UserId) -> MessageRef {
    MessageRef {
        chat_id: user_id,
        message_id: 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::messages::{self, Markup, CANCEL_TOKEN, CONFIRM_TOKEN};
    use crate::state_machine::Draft;
    use proptest::prelude::*;

    const ALICE: UserId = 101;
    const BOB: UserId = 202;

    async fn fill_form<S: RecordStore>(
        bot: &TestBot<S>,
        user_id: UserId,
        name: &str,
        age: &str,
        grade: &str,
    ) {
        bot.say(user_id, "/start").await;
        bot.say(user_id, name).await;
        bot.say(user_id, age).await;
        bot.say(user_id, grade).await;
    }

    #[tokio::test]
    async fn test_mock_transport_records_sends() {
        let transport = MockTransport::new();
        transport
            .send(7, &OutgoingMessage::new("hello"))
            .await
            .unwrap();
        assert_eq!(transport.sent_texts(), vec!["hello"]);

        // Empty queue behaves like an idle long poll
        assert!(transport.next_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryStore::new();
        store
            .upsert(&StudentRecord::new(1, "Alice", 12, "7"))
            .await
            .unwrap();
        assert_eq!(store.fetch(1).await.unwrap().unwrap().name, "Alice");

        let failing = InMemoryStore::new().failing_writes();
        assert!(failing
            .upsert(&StudentRecord::new(1, "Alice", 12, "7"))
            .await
            .is_err());
        assert_eq!(failing.len(), 0);
    }

    /// `/start` → "Alice" → "12" → "7" → confirm
    #[tokio::test]
    async fn test_full_dialog_saves_record() {
        let (bot, store) = TestBot::new();

        bot.say(ALICE, "/start").await;
        assert_eq!(bot.state(ALICE).await, DialogState::AwaitingName);
        assert_eq!(bot.last_sent(), messages::ask_name());

        bot.say(ALICE, "Alice").await;
        bot.say(ALICE, "12").await;
        bot.say(ALICE, "7").await;

        let draft = Draft {
            name: "Alice".to_string(),
            age: 12,
            grade: "7".to_string(),
        };
        assert_eq!(
            bot.state(ALICE).await,
            DialogState::AwaitingConfirmation {
                draft: draft.clone()
            }
        );
        assert_eq!(bot.last_sent(), messages::confirm_summary(&draft));

        let callback_id = bot.press(ALICE, CONFIRM_TOKEN).await;

        assert_eq!(
            store.get(ALICE),
            Some(StudentRecord::new(ALICE, "Alice", 12, "7"))
        );
        assert_eq!(store.upsert_count(), 1);
        assert_eq!(bot.state(ALICE).await, DialogState::Idle);
        assert_eq!(bot.last_sent(), messages::saved());
        assert_eq!(
            *bot.transport.acknowledged.lock().unwrap(),
            vec![callback_id]
        );
        assert_eq!(
            *bot.transport.cleared.lock().unwrap(),
            vec![summary_ref(ALICE)]
        );
        assert_eq!(bot.runtime.sessions().active().await, 0);

        bot.say(ALICE, "/profile").await;
        assert!(bot.last_sent().text.contains("Имя: Alice"));
    }

    /// `/start` → "Bob" → "abc"
    #[tokio::test]
    async fn test_non_numeric_age_reprompts() {
        let (bot, store) = TestBot::new();

        bot.say(BOB, "/start").await;
        bot.say(BOB, "Bob").await;
        let before = bot.transport.sent_count();
        bot.say(BOB, "abc").await;

        assert_eq!(
            bot.state(BOB).await,
            DialogState::AwaitingAge {
                name: "Bob".to_string()
            }
        );
        assert_eq!(bot.transport.sent_count(), before + 1);
        assert_eq!(bot.last_sent(), messages::age_not_a_number());

        bot.say(BOB, "3").await;
        assert_eq!(bot.last_sent(), messages::age_out_of_range());
        assert_eq!(
            bot.state(BOB).await,
            DialogState::AwaitingAge {
                name: "Bob".to_string()
            }
        );
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_update_overwrites_record() {
        let (bot, store) = TestBot::new();

        fill_form(&bot, ALICE, "A", "10", "5").await;
        bot.press(ALICE, CONFIRM_TOKEN).await;

        bot.say(ALICE, "/update").await;
        assert_eq!(bot.last_sent(), messages::ask_name_for_update());
        bot.say(ALICE, "B").await;
        bot.say(ALICE, "20").await;
        bot.say(ALICE, "9").await;
        bot.press(ALICE, CONFIRM_TOKEN).await;

        assert_eq!(
            store.get(ALICE),
            Some(StudentRecord::new(ALICE, "B", 20, "9"))
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_save_failure_keeps_previous_record() {
        let previous = StudentRecord::new(ALICE, "A", 10, "5");
        let (bot, store) = TestBot::with_store(
            InMemoryStore::new()
                .with_record(previous.clone())
                .failing_writes(),
        );

        fill_form(&bot, ALICE, "B", "20", "9").await;
        bot.press(ALICE, CONFIRM_TOKEN).await;

        assert_eq!(bot.state(ALICE).await, DialogState::Idle);
        assert_eq!(bot.last_sent(), messages::save_failed());
        assert_eq!(store.get(ALICE), Some(previous));
        // Attempted exactly once, never retried
        assert_eq!(store.upsert_count(), 1);
        assert_eq!(bot.transport.acknowledged.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_failure_without_previous_record() {
        let (bot, store) = TestBot::with_store(InMemoryStore::new().failing_writes());

        fill_form(&bot, ALICE, "Alice", "12", "7").await;
        bot.press(ALICE, CONFIRM_TOKEN).await;

        assert_eq!(bot.state(ALICE).await, DialogState::Idle);
        assert_eq!(store.get(ALICE), None);
    }

    #[tokio::test]
    async fn test_cancel_from_every_phase_leaves_store_unchanged() {
        let previous = StudentRecord::new(ALICE, "Old", 30, "11");
        let (bot, store) = TestBot::with_store(InMemoryStore::new().with_record(previous.clone()));

        let answers = ["Alice", "12", "7"];
        for steps in 0..=answers.len() {
            for cancel in ["/cancel", "отменить"] {
                bot.say(ALICE, "/start").await;
                for answer in &answers[..steps] {
                    bot.say(ALICE, answer).await;
                }
                assert!(!bot.state(ALICE).await.is_idle());

                bot.say(ALICE, cancel).await;
                assert_eq!(bot.state(ALICE).await, DialogState::Idle);
                assert_eq!(bot.last_sent(), messages::cancelled());
                assert_eq!(store.get(ALICE), Some(previous.clone()));
            }
        }
        assert_eq!(store.upsert_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_button_discards_draft() {
        let (bot, store) = TestBot::new();

        fill_form(&bot, ALICE, "Alice", "12", "7").await;
        bot.press(ALICE, CANCEL_TOKEN).await;

        assert_eq!(bot.state(ALICE).await, DialogState::Idle);
        assert_eq!(bot.last_sent(), messages::cancelled());
        assert_eq!(bot.last_sent().markup, Markup::RemoveKeyboard);
        assert_eq!(
            *bot.transport.cleared.lock().unwrap(),
            vec![summary_ref(ALICE)]
        );
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_stale_button_is_acknowledged_silently() {
        let (bot, store) = TestBot::new();

        fill_form(&bot, ALICE, "Alice", "12", "7").await;
        bot.press(ALICE, CONFIRM_TOKEN).await;
        let sent = bot.transport.sent_count();

        // Pressing the old summary again must not save twice
        bot.press(ALICE, CONFIRM_TOKEN).await;
        assert_eq!(bot.transport.sent_count(), sent);
        assert_eq!(bot.transport.acknowledged.lock().unwrap().len(), 2);
        assert_eq!(store.upsert_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (bot, store) = TestBot::with_store(
            InMemoryStore::new().with_record(StudentRecord::new(ALICE, "Alice", 12, "7")),
        );

        bot.say(ALICE, "/delete").await;
        let first = bot.last_sent();
        bot.say(ALICE, "/delete").await;
        let second = bot.last_sent();

        assert_eq!(first, messages::deleted());
        assert_eq!(first, second);
        assert_eq!(store.get(ALICE), None);
    }

    #[tokio::test]
    async fn test_profile_without_record() {
        let (bot, _store) = TestBot::new();
        bot.say(ALICE, "/profile").await;
        assert_eq!(bot.last_sent(), messages::no_profile());
    }

    #[tokio::test]
    async fn test_store_read_failure_is_reported() {
        let (bot, _store) = TestBot::with_store(InMemoryStore::new().failing_reads());
        bot.say(ALICE, "/profile").await;
        assert_eq!(bot.last_sent(), messages::storage_failed());
        assert_eq!(bot.state(ALICE).await, DialogState::Idle);
    }

    #[tokio::test]
    async fn test_delete_failure_is_reported_and_keeps_draft() {
        let previous = StudentRecord::new(BOB, "Bob", 15, "9");
        let (bot, store) = TestBot::with_store(
            InMemoryStore::new()
                .with_record(previous.clone())
                .failing_writes(),
        );

        bot.say(BOB, "/start").await;
        bot.say(BOB, "Bob").await;
        bot.say(BOB, "/delete").await;

        assert_eq!(bot.last_sent(), messages::storage_failed());
        assert_eq!(
            bot.state(BOB).await,
            DialogState::AwaitingAge {
                name: "Bob".to_string()
            }
        );
        assert_eq!(store.get(BOB), Some(previous));
    }

    #[tokio::test]
    async fn test_commands_mid_dialog_keep_draft() {
        let (bot, _store) = TestBot::new();

        bot.say(ALICE, "/start").await;
        bot.say(ALICE, "Alice").await;
        bot.say(ALICE, "/help").await;
        assert_eq!(bot.last_sent(), messages::help());
        bot.say(ALICE, "/profile").await;
        assert_eq!(bot.last_sent(), messages::no_profile());

        assert_eq!(
            bot.state(ALICE).await,
            DialogState::AwaitingAge {
                name: "Alice".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_input_while_idle() {
        let (bot, _store) = TestBot::new();

        bot.say(ALICE, "hello").await;
        assert_eq!(bot.last_sent(), messages::not_understood());
        bot.say(ALICE, "/weather").await;
        assert_eq!(bot.last_sent(), messages::not_understood());
        assert_eq!(bot.runtime.sessions().active().await, 0);
    }

    #[tokio::test]
    async fn test_conversations_are_isolated() {
        let (bot, store) = TestBot::new();

        bot.say(ALICE, "/start").await;
        bot.say(BOB, "/start").await;
        bot.say(ALICE, "Alice").await;
        bot.say(BOB, "Bob").await;
        bot.say(BOB, "/cancel").await;
        bot.say(ALICE, "12").await;

        assert_eq!(bot.state(BOB).await, DialogState::Idle);
        assert_eq!(
            bot.state(ALICE).await,
            DialogState::AwaitingGrade {
                name: "Alice".to_string(),
                age: 12
            }
        );

        bot.say(ALICE, "7").await;
        bot.press(ALICE, CONFIRM_TOKEN).await;
        assert!(store.get(ALICE).is_some());
        assert!(store.get(BOB).is_none());

        // Replies went to the right chats
        let sent = bot.transport.sent.lock().unwrap();
        let bob_replies = sent.iter().filter(|(chat, _)| *chat == BOB).count();
        assert_eq!(bob_replies, 3);
    }

    #[tokio::test]
    async fn test_send_failures_do_not_stall_dialog() {
        let (bot, store) = TestBot::new();
        bot.transport.fail_sends();

        fill_form(&bot, ALICE, "Alice", "12", "7").await;
        bot.press(ALICE, CONFIRM_TOKEN).await;

        assert_eq!(
            store.get(ALICE),
            Some(StudentRecord::new(ALICE, "Alice", 12, "7"))
        );
        assert_eq!(bot.state(ALICE).await, DialogState::Idle);
    }

    #[tokio::test]
    async fn test_dialog_against_sqlite() {
        let db = Database::open_in_memory().unwrap();
        let bot = TestBot::with_record_store(DatabaseStore::new(db.clone()));

        fill_form(&bot, ALICE, "Alice", "12", "7").await;
        bot.press(ALICE, CONFIRM_TOKEN).await;

        let stored = db.get_student(ALICE).unwrap().unwrap();
        assert_eq!(stored.record, StudentRecord::new(ALICE, "Alice", 12, "7"));

        bot.say(ALICE, "/delete").await;
        bot.say(ALICE, "/delete").await;
        assert_eq!(bot.last_sent(), messages::deleted());
        assert!(db.get_student(ALICE).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_loop_processes_batches_and_stops() {
        let store = Arc::new(InMemoryStore::new());
        let transport = Arc::new(MockTransport::new());
        let shutdown = CancellationToken::new();

        transport.queue_error(TransportError {
            message: "Too Many Requests".to_string(),
            retry_after: Some(Duration::from_millis(10)),
            retryable: true,
        });
        let text = |t: &str| Incoming {
            user_id: ALICE,
            chat_id: ALICE,
            kind: IncomingKind::Text(t.to_string()),
        };
        transport.queue_batch(vec![text("/start"), text("Alice"), text("12"), text("7")]);
        transport.queue_batch(vec![Incoming {
            user_id: ALICE,
            chat_id: ALICE,
            kind: IncomingKind::Choice {
                token: CONFIRM_TOKEN.to_string(),
                callback_id: "cb-run".to_string(),
                message: None,
            },
        }]);

        let runtime = DialogRuntime::new(store.clone(), transport.clone(), shutdown.clone());
        let handle = tokio::spawn(runtime.run());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while store.get(ALICE).is_none() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("runtime should stop after shutdown")
            .unwrap();

        assert_eq!(
            store.get(ALICE),
            Some(StudentRecord::new(ALICE, "Alice", 12, "7"))
        );
        assert_eq!(transport.last_sent(), Some(messages::saved()));
        assert_eq!(*transport.acknowledged.lock().unwrap(), vec!["cb-run"]);
        assert!(transport.cleared.lock().unwrap().is_empty());
    }

    fn arb_answers() -> impl Strategy<Value = (String, u8, String)> {
        (
            "[A-Za-zА-Яа-я][A-Za-zА-Яа-я ]{0,20}",
            5u8..=100,
            prop_oneof!["(1[01]|[1-9])", "[0-9]{1,2}[АБВ]"],
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // A confirmed dialog is read back exactly by /profile, through SQLite
        #[test]
        fn prop_profile_returns_confirmed_triple((name, age, grade) in arb_answers()) {
            prop_assume!(!messages::is_cancel_keyword(&name));

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let (stored, reply) = rt.block_on(async {
                let store = DatabaseStore::new(Database::open_in_memory().unwrap());
                let bot = TestBot::with_record_store(store.clone());

                fill_form(&bot, ALICE, &name, &age.to_string(), &grade).await;
                bot.press(ALICE, CONFIRM_TOKEN).await;
                bot.say(ALICE, "/profile").await;

                (store.fetch(ALICE).await.unwrap(), bot.last_sent())
            });

            let expected = StudentRecord::new(ALICE, name, age, grade);
            prop_assert_eq!(reply, messages::profile(&expected));
            prop_assert_eq!(stored, Some(expected));
        }
    }
}
