use super::*;
use async_trait::async_trait;
use shared::protocol::{ReactionRequest, SetSlideOptions};
use storage::{ReactionRecord, Storage, IN_MEMORY_DATABASE_URL};
use tokio::sync::broadcast::error::TryRecvError;

const HEART: &str = "🧡";
const COOL: &str = "😎";
const SHRUG: &str = "🤷";

async fn session() -> (SessionHandle, Storage) {
    let storage = Storage::new(IN_MEMORY_DATABASE_URL).await.expect("db");
    let handle = spawn_session(
        SessionName::default(),
        Arc::new(storage.clone()),
        None,
        16,
    );
    (handle, storage)
}

fn vocabulary() -> Vec<String> {
    [HEART, COOL, SHRUG].iter().map(|s| s.to_string()).collect()
}

fn live_slide(index: u32) -> SetSlideRequest {
    SetSlideRequest::new(
        index,
        vocabulary(),
        SetSlideOptions {
            show_live_reactions: true,
            title: None,
        },
    )
}

fn expect_state(event: ServerEvent) -> StateUpdate {
    match event {
        ServerEvent::StateUpdated(update) => update,
        ServerEvent::Error(error) => panic!("unexpected error event: {error:?}"),
    }
}

struct FailingLog;

#[async_trait]
impl ReactionLog for FailingLog {
    async fn append_reaction(&self, _slide_index: u32, _reaction: &str) -> Result<ReactionRecord> {
        Err(anyhow!("disk full"))
    }

    async fn reaction_counts(&self, _slide_index: u32) -> Result<HashMap<String, u64>> {
        Err(anyhow!("disk unreadable"))
    }

    async fn reaction_totals(&self) -> Result<HashMap<String, u64>> {
        Err(anyhow!("disk unreadable"))
    }
}

#[tokio::test]
async fn live_tallies_follow_submitted_reactions() {
    let (handle, _storage) = session().await;
    handle.set_slide(live_slide(0)).await.expect("set slide");

    for symbol in [HEART, HEART, COOL] {
        let outcome = handle.submit_reaction(symbol).await.expect("submit");
        assert_eq!(outcome, ReactionOutcome::Recorded);
    }

    let state = handle.snapshot().await.expect("snapshot").state;
    assert_eq!(state.reaction_counts.get(HEART), Some(&2));
    assert_eq!(state.reaction_counts.get(COOL), Some(&1));
    assert_eq!(state.reaction_counts.get(SHRUG), Some(&0));
    assert_eq!(state.reaction_counts.len(), 3);
}

#[tokio::test]
async fn accepted_reaction_appends_one_record_and_bumps_count_by_one() {
    let (handle, storage) = session().await;
    handle.set_slide(live_slide(2)).await.expect("set slide");
    let mut attachment = handle.attach().await.expect("attach");
    let before = attachment.snapshot.state.reaction_counts.get(COOL).copied();

    handle.submit_reaction(COOL).await.expect("submit");

    let update = expect_state(attachment.events.try_recv().expect("broadcast"));
    assert_eq!(update.state.reaction_counts.get(COOL).copied(), before.map(|c| c + 1));
    let records = storage.list_reactions(2).await.expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reaction, COOL);
}

// Rejection is intentionally silent: the submitter gets no error and no
// snapshot, and nothing reaches the log.
#[tokio::test]
async fn reaction_outside_vocabulary_is_silently_ignored() {
    let (handle, storage) = session().await;
    handle.set_slide(live_slide(0)).await.expect("set slide");
    let mut attachment = handle.attach().await.expect("attach");

    let outcome = handle.submit_reaction("🍅").await.expect("submit");

    assert_eq!(outcome, ReactionOutcome::Ignored);
    assert!(matches!(attachment.events.try_recv(), Err(TryRecvError::Empty)));
    assert!(storage.list_reactions(0).await.expect("records").is_empty());
    let state = handle.snapshot().await.expect("snapshot").state;
    assert_eq!(state, attachment.snapshot.state);
}

#[tokio::test]
async fn reactions_without_live_display_are_recorded_but_not_broadcast() {
    let (handle, storage) = session().await;
    let mut attachment = handle.attach().await.expect("attach");

    let outcome = handle.submit_reaction(HEART).await.expect("submit");

    assert_eq!(outcome, ReactionOutcome::Recorded);
    assert!(matches!(attachment.events.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(storage.list_reactions(0).await.expect("records").len(), 1);
    assert!(handle
        .snapshot()
        .await
        .expect("snapshot")
        .state
        .reaction_counts
        .is_empty());
}

#[tokio::test]
async fn set_slide_with_live_display_counts_prior_reactions_for_that_index() {
    let (handle, storage) = session().await;
    storage.append_reaction(5, HEART).await.expect("seed");
    storage.append_reaction(5, HEART).await.expect("seed");
    storage.append_reaction(5, "🍅").await.expect("seed");
    storage.append_reaction(4, COOL).await.expect("seed");

    let update = handle.set_slide(live_slide(5)).await.expect("set slide");

    let keys: Vec<_> = update.state.reaction_counts.keys().cloned().collect();
    let mut expected = vocabulary();
    expected.sort();
    assert_eq!(keys, expected);
    assert_eq!(update.state.reaction_counts.get(HEART), Some(&2));
    assert_eq!(update.state.reaction_counts.get(COOL), Some(&0));
    assert_eq!(update.state.reaction_counts.get(SHRUG), Some(&0));
}

#[tokio::test]
async fn set_slide_without_live_display_clears_counts() {
    let (handle, _storage) = session().await;
    handle.set_slide(live_slide(0)).await.expect("set slide");
    handle.submit_reaction(HEART).await.expect("submit");

    let update = handle
        .set_slide(SetSlideRequest::new(
            0,
            vocabulary(),
            SetSlideOptions::default(),
        ))
        .await
        .expect("set slide");

    assert!(update.state.reaction_counts.is_empty());
}

#[tokio::test]
async fn identical_set_slide_calls_produce_identical_state() {
    let (handle, storage) = session().await;
    storage.append_reaction(1, SHRUG).await.expect("seed");

    let first = handle.set_slide(live_slide(1)).await.expect("first");
    let second = handle.set_slide(live_slide(1)).await.expect("second");

    assert_eq!(first.state, second.state);
    assert!(second.revision > first.revision);
}

#[tokio::test]
async fn advancing_with_live_display_recounts_for_new_slide() {
    let (handle, storage) = session().await;
    storage.append_reaction(1, COOL).await.expect("seed");
    handle.set_slide(live_slide(0)).await.expect("set slide");
    handle.submit_reaction(HEART).await.expect("submit");

    let update = handle
        .advance_slide(Direction::Forward)
        .await
        .expect("advance");

    assert_eq!(update.state.current_slide_index, 1);
    assert_eq!(update.state.reaction_counts.get(HEART), Some(&0));
    assert_eq!(update.state.reaction_counts.get(COOL), Some(&1));
}

#[tokio::test]
async fn every_mutation_reaches_every_attached_client() {
    let (handle, _storage) = session().await;
    let mut presenter = handle.attach().await.expect("presenter");
    let mut audience = handle.attach().await.expect("audience");

    handle
        .advance_slide(Direction::Forward)
        .await
        .expect("forward");
    handle
        .advance_slide(Direction::Backward)
        .await
        .expect("backward");

    for events in [&mut presenter.events, &mut audience.events] {
        let first = expect_state(events.try_recv().expect("first"));
        let second = expect_state(events.try_recv().expect("second"));
        assert_eq!(first.state.current_slide_index, 1);
        assert_eq!(second.state.current_slide_index, 0);
        assert!(second.revision > first.revision);
    }
}

#[tokio::test]
async fn late_attachment_receives_current_snapshot() {
    let (handle, _storage) = session().await;
    handle
        .set_slide(SetSlideRequest::new(
            3,
            vec![HEART.to_string()],
            SetSlideOptions {
                show_live_reactions: false,
                title: Some("Thanks".into()),
            },
        ))
        .await
        .expect("set slide");

    let attachment = handle.attach().await.expect("attach");

    assert_eq!(attachment.snapshot.state.current_slide_index, 3);
    assert_eq!(
        attachment.snapshot.state.current_slide.title.as_deref(),
        Some("Thanks")
    );
    assert_eq!(attachment.snapshot.revision, 1);
}

#[tokio::test]
async fn dispatch_applies_remote_requests() {
    let (handle, storage) = session().await;

    handle
        .dispatch(ClientRequest::AdvanceSlideForward)
        .await
        .expect("forward");
    handle
        .dispatch(ClientRequest::SubmitReaction(ReactionRequest {
            reaction: HEART.into(),
        }))
        .await
        .expect("reaction");
    handle
        .dispatch(ClientRequest::SubmitReaction(ReactionRequest {
            reaction: "not-a-reaction".into(),
        }))
        .await
        .expect("ignored reaction still succeeds");

    assert_eq!(storage.list_reactions(1).await.expect("records").len(), 1);
    let totals = handle.reaction_totals().await.expect("totals");
    assert_eq!(totals.get(HEART), Some(&1));
}

#[tokio::test]
async fn append_failure_leaves_state_untouched() {
    let handle = spawn_session(SessionName::default(), Arc::new(FailingLog), None, 4);
    let update = handle.set_slide(live_slide(0)).await.expect("set slide");
    assert_eq!(update.state.reaction_counts.get(HEART), Some(&0));
    let mut attachment = handle.attach().await.expect("attach");

    let result = handle.submit_reaction(HEART).await;

    assert!(result.is_err());
    assert!(matches!(attachment.events.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(handle.snapshot().await.expect("snapshot").state, update.state);
}

#[tokio::test]
async fn sessions_share_nothing() {
    let (first, _) = session().await;
    let (second, _) = session().await;

    first
        .advance_slide(Direction::Forward)
        .await
        .expect("advance");
    first.submit_reaction(HEART).await.expect("submit");

    let other = second.snapshot().await.expect("snapshot");
    assert_eq!(other.state.current_slide_index, 0);
    assert_eq!(other.revision, 0);
    assert!(second.reaction_totals().await.expect("totals").is_empty());
}
