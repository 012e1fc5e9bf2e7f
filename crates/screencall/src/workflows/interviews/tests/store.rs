use super::common::*;

use crate::workflows::interviews::domain::{
    AgentId, AnalysisSource, CallAnalysis, CallId, CompletionTrigger, Interview, InterviewResult,
    InterviewStatus,
};
use crate::workflows::interviews::lifecycle::{InterviewEvent, StatusChange};
use crate::workflows::interviews::store::{
    ChangeOutcome, InMemoryInterviewStore, InterviewStore, StoreError,
};

fn scheduled(at_minute: i64) -> Interview {
    Interview::schedule(accepted(), t0() + minutes(at_minute), chrono::Duration::days(7))
}

fn start(call_id: &str) -> StatusChange {
    StatusChange::Start {
        call_id: CallId(call_id.to_string()),
        started_at: t0() + minutes(1),
    }
}

fn complete(trigger: CompletionTrigger) -> StatusChange {
    StatusChange::Complete {
        result: Box::new(InterviewResult {
            duration_secs: 120,
            transcript: String::new(),
            questions: Vec::new(),
            analysis: CallAnalysis::neutral_fallback(),
            analysis_source: AnalysisSource::Placeholder,
            trigger,
        }),
        completed_at: t0() + minutes(20),
    }
}

#[test]
fn duplicate_insert_is_a_conflict() {
    let store = InMemoryInterviewStore::new();
    let interview = scheduled(0);
    store.insert(interview.clone()).expect("first insert");

    let err = store.insert(interview).expect_err("duplicate insert");
    assert!(matches!(err, StoreError::Conflict));
    assert_eq!(store.len(), 1);
}

#[test]
fn start_indexes_the_call() {
    let store = InMemoryInterviewStore::new();
    let interview = store.insert(scheduled(0)).expect("insert");

    let outcome = store.apply(&interview.id, start("abc")).expect("apply");
    let ChangeOutcome::Applied(updated) = outcome else {
        panic!("start should apply");
    };
    assert_eq!(updated.status, InterviewStatus::InProgress);

    let found = store
        .find_by_call(&CallId("abc".to_string()))
        .expect("lookup")
        .expect("call indexed");
    assert_eq!(found.id, interview.id);
    assert!(store
        .find_by_call(&CallId("other".to_string()))
        .expect("lookup")
        .is_none());
}

#[test]
fn second_completion_is_rejected_with_current_record() {
    let store = InMemoryInterviewStore::new();
    let interview = store.insert(scheduled(0)).expect("insert");
    store.apply(&interview.id, start("abc")).expect("start");

    let first = store
        .apply(&interview.id, complete(CompletionTrigger::Webhook))
        .expect("apply");
    assert!(matches!(first, ChangeOutcome::Applied(_)));

    let second = store
        .apply(&interview.id, complete(CompletionTrigger::Poll))
        .expect("apply");
    let ChangeOutcome::Rejected { current, reason } = second else {
        panic!("second completion must be rejected");
    };
    assert_eq!(current.status, InterviewStatus::Completed);
    assert_eq!(reason.from, InterviewStatus::Completed);
    assert_eq!(reason.event, InterviewEvent::CallFinished);
    assert_eq!(
        current.result.map(|result| result.trigger),
        Some(CompletionTrigger::Webhook)
    );
}

#[test]
fn expiry_requires_the_observed_status() {
    let store = InMemoryInterviewStore::new();
    let interview = store.insert(scheduled(0)).expect("insert");
    store.apply(&interview.id, start("abc")).expect("start");

    // The caller saw `scheduled`, but the interview has started since.
    let outcome = store
        .apply(
            &interview.id,
            StatusChange::Expire {
                at: t0() + minutes(2),
                from: InterviewStatus::Scheduled,
            },
        )
        .expect("apply");

    assert!(matches!(outcome, ChangeOutcome::Rejected { .. }));
    assert_eq!(
        store
            .fetch(&interview.id)
            .expect("fetch")
            .map(|stored| stored.status),
        Some(InterviewStatus::InProgress)
    );
}

#[test]
fn attach_agent_keeps_the_first_agent() {
    let store = InMemoryInterviewStore::new();
    let interview = store.insert(scheduled(0)).expect("insert");

    let first = store
        .attach_agent(&interview.id, AgentId("agent-1".to_string()))
        .expect("attach");
    let second = store
        .attach_agent(&interview.id, AgentId("agent-2".to_string()))
        .expect("attach");

    assert_eq!(first, AgentId("agent-1".to_string()));
    assert_eq!(second, first);
}

#[test]
fn unknown_ids_report_not_found() {
    let store = InMemoryInterviewStore::new();
    let missing = scheduled(0).id;

    assert!(store.fetch(&missing).expect("fetch").is_none());
    assert!(matches!(
        store.apply(&missing, start("abc")),
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        store.attach_agent(&missing, AgentId("agent-1".to_string())),
        Err(StoreError::NotFound)
    ));
}

#[test]
fn list_by_status_orders_by_schedule_time() {
    let store = InMemoryInterviewStore::new();
    let late = store.insert(scheduled(30)).expect("insert");
    let early = store.insert(scheduled(5)).expect("insert");
    let started = store.insert(scheduled(10)).expect("insert");
    store.apply(&started.id, start("abc")).expect("start");

    let waiting: Vec<_> = store
        .list_by_status(InterviewStatus::Scheduled)
        .expect("list")
        .into_iter()
        .map(|interview| interview.id)
        .collect();
    assert_eq!(waiting, vec![early.id, late.id]);

    let running = store
        .list_by_status(InterviewStatus::InProgress)
        .expect("list");
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id, started.id);
}
