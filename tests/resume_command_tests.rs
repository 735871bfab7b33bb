//! Tests for saving interrupted operations and picking them up with `resume`

use std::time::Duration;

use soda_workflow::cli::commands::copy::CopyCommand;
use soda_workflow::cli::commands::publish::PublishCommand;
use soda_workflow::cli::commands::resume::ResumeCommand;
use soda_workflow::cli::commands::visibility::VisibilityCommand;
use soda_workflow::cli::commands::CommandContext;
use soda_workflow::soda::testing::ScriptedTransport;
use soda_workflow::{OutstandingStore, SodaWorkflow, Visibility};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn context(transport: ScriptedTransport, dir: &TempDir) -> CommandContext<ScriptedTransport> {
    let cancel = CancellationToken::new();
    CommandContext::new(
        SodaWorkflow::new(transport).with_cancellation(cancel),
        OutstandingStore::new(dir.path().join("outstanding.json")),
        10,
    )
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_copy_is_saved_and_resumed() {
    let dir = TempDir::new().unwrap();

    let transport = ScriptedTransport::new();
    transport.respond(
        "publication.json",
        ScriptedTransport::accepted(Some("/t/42"), Some(Duration::from_secs(30))),
    );
    let ctx = context(transport, &dir);

    let token = ctx.workflow.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    });

    let result = CopyCommand::new("abcd-1234").execute(&ctx).await;
    assert!(result.is_err());

    let saved = ctx.store.load().await.unwrap().expect("operation saved");
    assert_eq!(saved.pending.poll_location.as_deref(), Some("/t/42"));
    assert_eq!(saved.label.as_deref(), Some("copy abcd-1234"));

    // a fresh process picks it up
    let transport = ScriptedTransport::new();
    transport.respond("/t/42", ScriptedTransport::ok_body(r#"{"id":"wxyz-9876"}"#));
    let resumed = context(transport, &dir);

    ResumeCommand::new().execute(&resumed).await.unwrap();

    assert!(resumed.store.load().await.unwrap().is_none());
    assert_eq!(resumed.workflow.transport().count_matching("method=copy"), 0);
    assert_eq!(resumed.workflow.transport().count_matching("/t/42"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deferred_visibility_change_is_saved() {
    let dir = TempDir::new().unwrap();

    let transport = ScriptedTransport::new();
    transport.respond(
        "method=setPermission",
        ScriptedTransport::accepted(Some("/t/perm"), Some(Duration::from_secs(2))),
    );
    let ctx = context(transport, &dir);

    VisibilityCommand::new("abcd-1234", Visibility::Public)
        .execute(&ctx)
        .await
        .unwrap();

    // not polled inline
    assert_eq!(ctx.workflow.transport().count_matching("/t/perm"), 0);
    let saved = ctx.store.load().await.unwrap().expect("operation saved");
    assert_eq!(saved.pending.poll_location.as_deref(), Some("/t/perm"));
}

#[tokio::test(start_paused = true)]
async fn test_resume_drops_operation_that_failed_for_good() {
    let dir = TempDir::new().unwrap();

    let transport = ScriptedTransport::new();
    transport.respond(
        "method=setPermission",
        ScriptedTransport::accepted(Some("/t/perm"), Some(Duration::from_secs(2))),
    );
    let ctx = context(transport, &dir);
    VisibilityCommand::new("abcd-1234", Visibility::Private)
        .execute(&ctx)
        .await
        .unwrap();

    let transport = ScriptedTransport::new();
    transport.respond("/t/perm", ScriptedTransport::server_error(500, "permission service down"));
    let resumed = context(transport, &dir);

    assert!(ResumeCommand::new().execute(&resumed).await.is_err());
    assert!(resumed.store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_resume_with_nothing_saved() {
    let dir = TempDir::new().unwrap();
    let ctx = context(ScriptedTransport::new(), &dir);

    ResumeCommand::new().execute(&ctx).await.unwrap();
    ResumeCommand::new().with_discard(true).execute(&ctx).await.unwrap();
    assert!(ctx.workflow.transport().requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_publish_cancelled_during_geocoding_saves_nothing() {
    let dir = TempDir::new().unwrap();

    let transport = ScriptedTransport::new();
    transport.respond(
        "/api/geocoding/",
        ScriptedTransport::accepted(Some("/t/geo"), Some(Duration::from_secs(30))),
    );
    let ctx = context(transport, &dir);

    let token = ctx.workflow.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    });

    assert!(PublishCommand::new("abc").execute(&ctx).await.is_err());
    assert!(ctx.store.load().await.unwrap().is_none());

    // nothing to resume, and resume must not claim the publish happened
    let resumed = context(ScriptedTransport::new(), &dir);
    ResumeCommand::new().execute(&resumed).await.unwrap();
    assert!(resumed.workflow.transport().requests().is_empty());
    assert_eq!(ctx.workflow.transport().count_matching("/publication"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_publish_does_not_relabel_earlier_deferred_change() {
    let dir = TempDir::new().unwrap();

    let transport = ScriptedTransport::new();
    transport.respond(
        "method=setPermission",
        ScriptedTransport::accepted(Some("/t/perm"), Some(Duration::from_secs(2))),
    );
    transport.respond(
        "/api/geocoding/",
        ScriptedTransport::accepted(Some("/t/geo"), Some(Duration::from_secs(30))),
    );
    let ctx = context(transport, &dir);

    VisibilityCommand::new("abc", Visibility::Public)
        .execute(&ctx)
        .await
        .unwrap();

    let token = ctx.workflow.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    });
    assert!(PublishCommand::new("abc").execute(&ctx).await.is_err());

    let saved = ctx.store.load().await.unwrap().expect("visibility change still saved");
    assert_eq!(saved.label.as_deref(), Some("visibility abc --public"));
    assert_eq!(saved.pending.poll_location.as_deref(), Some("/t/perm"));
}

#[tokio::test(start_paused = true)]
async fn test_connection_failure_during_copy_is_saved() {
    let dir = TempDir::new().unwrap();

    let transport = ScriptedTransport::new();
    transport.respond(
        "publication.json",
        ScriptedTransport::accepted(Some("/t/7"), Some(Duration::from_secs(5))),
    );
    transport.fail("/t/7", "connection reset by peer");
    let ctx = context(transport, &dir);

    assert!(CopyCommand::new("abcd-1234").execute(&ctx).await.is_err());

    let saved = ctx.store.load().await.unwrap().expect("operation saved");
    assert_eq!(saved.pending.poll_location.as_deref(), Some("/t/7"));
    assert_eq!(saved.pending.attempts_made, 1);
    assert!(!saved.pending.original_request.replayable);
}
