/*!
 * Integration tests for the file lifecycle manager.
 *
 * Runs against the in-memory document store with fake cloud storage, refresher
 * and classifier, so no database or network is needed.
 */

use pingnotes::{
    db::DocumentStore,
    error::FileError,
    models::{NewSubject, Owner, PrincipalKind},
    storage::CloudFileStore,
    test_helpers::{FakeClassifier, FakeRefresher, TestContext},
};
use uuid::Uuid;

const NOTES: &[u8] = b"Mitochondria are the powerhouse of the cell";

async fn subject_with_topic(ctx: &TestContext, owner: Owner, subject: &str, code: &str, topic: &str) -> (Uuid, Uuid) {
    let subject = ctx
        .store
        .create_subject(NewSubject {
            name: subject.to_string(),
            code: code.to_string(),
            owner,
        })
        .await
        .unwrap();
    let topic = ctx
        .store
        .create_topic(subject.id, topic, Some("unit 1"))
        .await
        .unwrap();
    (subject.id, topic.id)
}

#[tokio::test]
async fn test_upload_creates_record_owned_by_uploader() {
    let ctx = TestContext::new();
    let user = ctx
        .add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), Some("refresh-1"))
        .unwrap();
    let (subject_id, topic_id) = subject_with_topic(&ctx, user.owner(), "Biology", "BIO101", "Cells").await;

    let upload = ctx.spool("cells.txt", "text/plain", NOTES).unwrap();
    let temp_path = upload.temp_path.clone();

    let outcome = ctx
        .manager
        .upload(vec![upload], user.owner(), Some(&subject_id.to_string()), Some(&topic_id.to_string()))
        .await
        .unwrap();

    assert_eq!(outcome.files.len(), 1);
    let record = &outcome.files[0];
    assert_eq!(record.owner(), user.owner());
    assert!(ctx.cloud.has_object(&record.remote_id));
    assert_eq!(record.linked_subject, Some(subject_id));
    assert_eq!(record.linked_topic, Some(topic_id));
    assert!(!record.is_deleted);
    assert!(!record.is_shared);
    assert_eq!(record.size, NOTES.len() as i64);

    // suggestion comes from the first file
    assert_eq!(outcome.suggested_subject.as_deref(), Some("Biology"));
    assert_eq!(outcome.suggested_topic.as_deref(), Some("Cells"));
    assert_eq!(ctx.classifier.suggest_calls(), 1);

    // topic membership written with the record
    let subject = ctx.store.get_subject(subject_id).await.unwrap().unwrap();
    assert_eq!(subject.topic(topic_id).unwrap().files, vec![record.id]);

    assert!(!temp_path.exists());
}

#[tokio::test]
async fn test_upload_suggests_only_for_first_file() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();

    let files = vec![
        ctx.spool("a.txt", "text/plain", b"first").unwrap(),
        ctx.spool("b.txt", "text/plain", b"second").unwrap(),
        ctx.spool("c.txt", "text/plain", b"third").unwrap(),
    ];

    let outcome = ctx.manager.upload(files, user.owner(), None, None).await.unwrap();

    assert_eq!(outcome.files.len(), 3);
    assert_eq!(ctx.classifier.suggest_calls(), 1);
    assert_eq!(ctx.cloud.object_count(), 3);
}

#[tokio::test]
async fn test_upload_suggestion_failure_is_not_fatal() {
    let ctx = TestContext::with_fakes(FakeRefresher::failing(), FakeClassifier::failing());
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();

    let outcome = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], user.owner(), None, None)
        .await
        .unwrap();

    assert_eq!(outcome.files.len(), 1);
    assert!(outcome.suggested_subject.is_none());
    assert!(outcome.suggested_topic.is_none());
}

#[tokio::test]
async fn test_upload_with_expired_credential_refreshes_and_retries() {
    let ctx = TestContext::with_fakes(
        FakeRefresher::succeeding("access-2", Some("refresh-2")),
        FakeClassifier::new(),
    );
    let user = ctx
        .add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), Some("refresh-1"))
        .unwrap();
    ctx.cloud.expire_token("access-1");

    let outcome = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], user.owner(), None, None)
        .await
        .unwrap();

    assert_eq!(outcome.files.len(), 1);
    assert_eq!(ctx.refresher.calls(), 1);
    assert_eq!(ctx.cloud.upload_tokens(), vec!["access-1".to_string(), "access-2".to_string()]);

    let stored = ctx.store.get_principal(user.owner()).await.unwrap().unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("access-2"));
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn test_refreshed_credential_reused_for_remaining_files() {
    let ctx = TestContext::with_fakes(FakeRefresher::succeeding("access-2", None), FakeClassifier::new());
    let user = ctx
        .add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), Some("refresh-1"))
        .unwrap();
    ctx.cloud.expire_token("access-1");

    let files = vec![
        ctx.spool("a.txt", "text/plain", b"a").unwrap(),
        ctx.spool("b.txt", "text/plain", b"b").unwrap(),
    ];
    ctx.manager.upload(files, user.owner(), None, None).await.unwrap();

    assert_eq!(ctx.refresher.calls(), 1);
    assert_eq!(
        ctx.cloud.upload_tokens(),
        vec!["access-1".to_string(), "access-2".to_string(), "access-2".to_string()]
    );

    // provider did not rotate the refresh token, so the stored one is kept
    let stored = ctx.store.get_principal(user.owner()).await.unwrap().unwrap();
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn test_upload_with_failed_refresh_is_auth_expired() {
    let ctx = TestContext::with_fakes(FakeRefresher::failing(), FakeClassifier::new());
    let user = ctx
        .add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), Some("revoked"))
        .unwrap();
    ctx.cloud.expire_token("access-1");

    let upload = ctx.spool("a.txt", "text/plain", NOTES).unwrap();
    let temp_path = upload.temp_path.clone();

    let err = ctx.manager.upload(vec![upload], user.owner(), None, None).await.unwrap_err();

    assert!(matches!(err, FileError::AuthExpired));
    assert_eq!(ctx.store.file_count(), 0);
    assert!(!temp_path.exists());

    let stored = ctx.store.get_principal(user.owner()).await.unwrap().unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("access-1"));
}

#[tokio::test]
async fn test_upload_without_refresh_token_is_auth_expired() {
    let ctx = TestContext::with_fakes(FakeRefresher::succeeding("access-2", None), FakeClassifier::new());
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    ctx.cloud.expire_token("access-1");

    let err = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], user.owner(), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, FileError::AuthExpired));
    assert_eq!(ctx.refresher.calls(), 0);
}

#[tokio::test]
async fn test_upload_rejected_when_refreshed_credential_also_expired() {
    let ctx = TestContext::with_fakes(FakeRefresher::succeeding("access-2", None), FakeClassifier::new());
    let user = ctx
        .add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), Some("refresh-1"))
        .unwrap();
    ctx.cloud.expire_token("access-1");
    ctx.cloud.expire_token("access-2");

    let err = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], user.owner(), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, FileError::AuthExpired));
    assert_eq!(ctx.cloud.upload_tokens().len(), 2);
    assert_eq!(ctx.store.file_count(), 0);
}

#[tokio::test]
async fn test_upload_validation_happens_before_remote_calls() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let owner = user.owner();

    let err = ctx.manager.upload(vec![], owner, None, None).await.unwrap_err();
    assert!(matches!(err, FileError::InvalidInput(ref m) if m == "No files uploaded"));

    let topic_only = ctx.spool("a.txt", "text/plain", NOTES).unwrap();
    let topic_only_path = topic_only.temp_path.clone();
    let err = ctx
        .manager
        .upload(vec![topic_only], owner, None, Some(&Uuid::new_v4().to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::InvalidInput(_)));
    assert!(!topic_only_path.exists());

    let err = ctx
        .manager
        .upload(
            vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()],
            owner,
            Some(&Uuid::new_v4().to_string()),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::NotFound("Subject")));

    let (subject_id, _) = subject_with_topic(&ctx, owner, "Biology", "BIO101", "Cells").await;
    let err = ctx
        .manager
        .upload(
            vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()],
            owner,
            Some(&subject_id.to_string()),
            Some(&Uuid::new_v4().to_string()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::NotFound("Topic")));

    assert!(ctx.cloud.upload_tokens().is_empty());
    assert_eq!(ctx.store.file_count(), 0);
}

#[tokio::test]
async fn test_upload_into_someone_elses_subject_is_not_found() {
    let ctx = TestContext::new();
    let ada = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let bob = ctx.add_principal(PrincipalKind::User, "bob@school.edu", Some("access-b"), None).unwrap();
    let (subject_id, _) = subject_with_topic(&ctx, bob.owner(), "Maths", "MATH1", "Algebra").await;

    let err = ctx
        .manager
        .upload(
            vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()],
            ada.owner(),
            Some(&subject_id.to_string()),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::NotFound("Subject")));
}

#[tokio::test]
async fn test_upload_without_credential_is_unauthorized() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", None, None).unwrap();

    let err = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], user.owner(), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, FileError::Unauthorized(ref m) if m == "missing provider credential"));
    assert!(ctx.cloud.upload_tokens().is_empty());
}

#[tokio::test]
async fn test_failed_upload_removes_remaining_temp_files() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();

    let first = ctx.spool("a.txt", "text/plain", b"a").unwrap();
    let missing = ctx.spool("b.txt", "text/plain", b"b").unwrap();
    let third = ctx.spool("c.txt", "text/plain", b"c").unwrap();
    let paths = [first.temp_path.clone(), third.temp_path.clone()];
    // the second file vanishes before it can be read
    std::fs::remove_file(&missing.temp_path).unwrap();

    let err = ctx
        .manager
        .upload(vec![first, missing, third], user.owner(), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, FileError::UploadFailed(_)));
    assert_eq!(ctx.store.file_count(), 1);
    for path in paths {
        assert!(!path.exists(), "{} was left behind", path.display());
    }
}

#[tokio::test]
async fn test_teacher_uploads_are_owned_by_teacher() {
    let ctx = TestContext::new();
    let teacher = ctx
        .add_principal(PrincipalKind::Teacher, "grace@school.edu", Some("access-t"), None)
        .unwrap();

    let outcome = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], teacher.owner(), None, None)
        .await
        .unwrap();

    assert_eq!(outcome.files[0].owner(), Owner::Teacher(teacher.id));
    assert_eq!(ctx.manager.list(teacher.owner()).await.unwrap().len(), 1);
    assert!(ctx.manager.list(Owner::User(teacher.id)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_trash_then_restore_round_trips() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let original = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], user.owner(), None, None)
        .await
        .unwrap()
        .files
        .remove(0);
    let id = original.id.to_string();

    let trashed = ctx.manager.trash(&id, user.owner()).await.unwrap();
    assert!(trashed.is_deleted);
    assert!(ctx.manager.list(user.owner()).await.unwrap().is_empty());
    assert_eq!(ctx.manager.list_trash(user.owner()).await.unwrap().len(), 1);

    let mut restored = ctx.manager.restore(&id, user.owner()).await.unwrap();
    restored.updated_at = original.updated_at;
    assert_eq!(restored, original);
    assert!(ctx.manager.list_trash(user.owner()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_undefined_id_is_rejected_before_lookup() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let owner = user.owner();

    assert!(matches!(ctx.manager.get("undefined", owner).await, Err(FileError::InvalidId)));
    assert!(matches!(ctx.manager.trash("undefined", owner).await, Err(FileError::InvalidId)));
    assert!(matches!(ctx.manager.restore("undefined", owner).await, Err(FileError::InvalidId)));
    assert!(matches!(ctx.manager.permanent_delete("undefined", owner).await, Err(FileError::InvalidId)));
    assert!(matches!(ctx.manager.get_summary("undefined", owner).await, Err(FileError::InvalidId)));
    assert!(matches!(
        ctx.manager.share("undefined", &["bob@school.edu".to_string()], owner).await,
        Err(FileError::InvalidId)
    ));

    assert!(matches!(ctx.manager.get("12345", owner).await, Err(FileError::InvalidInput(_))));
}

#[tokio::test]
async fn test_other_principals_files_are_not_found() {
    let ctx = TestContext::new();
    let ada = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let bob = ctx.add_principal(PrincipalKind::User, "bob@school.edu", Some("access-b"), None).unwrap();
    let record = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], ada.owner(), None, None)
        .await
        .unwrap()
        .files
        .remove(0);
    let id = record.id.to_string();

    assert!(matches!(ctx.manager.get(&id, bob.owner()).await, Err(FileError::NotFound(_))));
    assert!(matches!(ctx.manager.trash(&id, bob.owner()).await, Err(FileError::NotFound(_))));
    assert!(matches!(ctx.manager.permanent_delete(&id, bob.owner()).await, Err(FileError::NotFound(_))));

    let still_there = ctx.manager.get(&id, ada.owner()).await.unwrap();
    assert!(!still_there.is_deleted);
}

#[tokio::test]
async fn test_trash_all_counts_active_files() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let files = vec![
        ctx.spool("a.txt", "text/plain", b"a").unwrap(),
        ctx.spool("b.txt", "text/plain", b"b").unwrap(),
        ctx.spool("c.txt", "text/plain", b"c").unwrap(),
    ];
    let uploaded = ctx.manager.upload(files, user.owner(), None, None).await.unwrap().files;
    ctx.manager.trash(&uploaded[0].id.to_string(), user.owner()).await.unwrap();

    assert_eq!(ctx.manager.trash_all(user.owner()).await.unwrap(), 2);
    assert!(ctx.manager.list(user.owner()).await.unwrap().is_empty());
    assert_eq!(ctx.manager.list_trash(user.owner()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_permanent_delete_missing_record_has_no_side_effects() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    ctx.manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], user.owner(), None, None)
        .await
        .unwrap();

    let err = ctx
        .manager
        .permanent_delete(&Uuid::new_v4().to_string(), user.owner())
        .await
        .unwrap_err();

    assert!(matches!(err, FileError::NotFound(_)));
    assert!(ctx.cloud.delete_calls().is_empty());
    assert_eq!(ctx.store.file_count(), 1);
    assert_eq!(ctx.cloud.object_count(), 1);
}

#[tokio::test]
async fn test_permanent_delete_removes_remote_object_and_topic_link() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let (subject_id, topic_id) = subject_with_topic(&ctx, user.owner(), "Biology", "BIO101", "Cells").await;
    let record = ctx
        .manager
        .upload(
            vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()],
            user.owner(),
            Some(&subject_id.to_string()),
            Some(&topic_id.to_string()),
        )
        .await
        .unwrap()
        .files
        .remove(0);

    ctx.manager.permanent_delete(&record.id.to_string(), user.owner()).await.unwrap();

    assert_eq!(ctx.store.file_count(), 0);
    assert!(!ctx.cloud.has_object(&record.remote_id));
    let subject = ctx.store.get_subject(subject_id).await.unwrap().unwrap();
    assert!(subject.topic(topic_id).unwrap().files.is_empty());
}

#[tokio::test]
async fn test_permanent_delete_without_credential_is_unauthorized() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let record = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], user.owner(), None, None)
        .await
        .unwrap()
        .files
        .remove(0);
    ctx.store.update_credentials(user.owner(), "", None).await.unwrap();

    let err = ctx
        .manager
        .permanent_delete(&record.id.to_string(), user.owner())
        .await
        .unwrap_err();

    assert!(matches!(err, FileError::Unauthorized(_)));
    assert_eq!(ctx.store.file_count(), 1);
}

#[tokio::test]
async fn test_permanent_delete_succeeds_when_remote_delete_fails() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let record = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], user.owner(), None, None)
        .await
        .unwrap()
        .files
        .remove(0);
    ctx.cloud.fail_delete(&record.remote_id);

    ctx.manager.permanent_delete(&record.id.to_string(), user.owner()).await.unwrap();

    assert_eq!(ctx.store.file_count(), 0);
    assert_eq!(ctx.cloud.delete_calls(), vec![record.remote_id.clone()]);
}

#[tokio::test]
async fn test_empty_trash_continues_past_remote_failures() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let files = vec![
        ctx.spool("a.txt", "text/plain", b"a").unwrap(),
        ctx.spool("b.txt", "text/plain", b"b").unwrap(),
        ctx.spool("c.txt", "text/plain", b"c").unwrap(),
    ];
    let uploaded = ctx.manager.upload(files, user.owner(), None, None).await.unwrap().files;
    ctx.manager.trash_all(user.owner()).await.unwrap();
    ctx.cloud.fail_delete(&uploaded[1].remote_id);

    let removed = ctx.manager.empty_trash(user.owner()).await.unwrap();

    assert_eq!(removed, 3);
    assert_eq!(ctx.store.file_count(), 0);
    assert_eq!(ctx.cloud.delete_calls().len(), 3);
    assert!(ctx.cloud.has_object(&uploaded[1].remote_id));
    assert!(!ctx.cloud.has_object(&uploaded[0].remote_id));
}

#[tokio::test]
async fn test_empty_trash_leaves_active_files() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let files = vec![
        ctx.spool("a.txt", "text/plain", b"a").unwrap(),
        ctx.spool("b.txt", "text/plain", b"b").unwrap(),
    ];
    let uploaded = ctx.manager.upload(files, user.owner(), None, None).await.unwrap().files;
    ctx.manager.trash(&uploaded[0].id.to_string(), user.owner()).await.unwrap();

    assert_eq!(ctx.manager.empty_trash(user.owner()).await.unwrap(), 1);
    let active = ctx.manager.list(user.owner()).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, uploaded[1].id);
}

#[tokio::test]
async fn test_empty_trash_without_credential_skips_remote_deletes() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    ctx.manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], user.owner(), None, None)
        .await
        .unwrap();
    ctx.manager.trash_all(user.owner()).await.unwrap();
    ctx.store.update_credentials(user.owner(), "", None).await.unwrap();

    assert_eq!(ctx.manager.empty_trash(user.owner()).await.unwrap(), 1);
    assert!(ctx.cloud.delete_calls().is_empty());
    assert_eq!(ctx.store.file_count(), 0);
}

#[tokio::test]
async fn test_share_copies_into_recipient_subject_and_topic() {
    let ctx = TestContext::new();
    let ada = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let bob = ctx.add_principal(PrincipalKind::User, "bob@school.edu", Some("access-b"), None).unwrap();
    let (subject_id, topic_id) = subject_with_topic(&ctx, ada.owner(), "Biology", "BIO101", "Cells").await;
    let source = ctx
        .manager
        .upload(
            vec![ctx.spool("cells.txt", "text/plain", NOTES).unwrap()],
            ada.owner(),
            Some(&subject_id.to_string()),
            Some(&topic_id.to_string()),
        )
        .await
        .unwrap()
        .files
        .remove(0);

    let outcome = ctx
        .manager
        .share(&source.id.to_string(), &["bob@school.edu".to_string()], ada.owner())
        .await
        .unwrap();
    assert_eq!(outcome.shared, 1);
    assert_eq!(outcome.skipped, 0);

    let bob_files = ctx.manager.list(bob.owner()).await.unwrap();
    assert_eq!(bob_files.len(), 1);
    let copy = &bob_files[0];
    assert!(copy.is_shared);
    assert_eq!(copy.original_file, Some(source.id));
    assert_eq!(copy.remote_id, source.remote_id);
    assert_eq!(copy.view_url, source.view_url);
    assert_eq!(copy.name, source.name);

    let bob_subjects = ctx.store.list_subjects(bob.owner()).await.unwrap();
    assert_eq!(bob_subjects.len(), 1);
    let subject = &bob_subjects[0];
    assert_eq!(subject.name, "Biology");
    assert_eq!(subject.code, format!("BIO101-{}", &ada.id.to_string()[..8]));
    let topic = subject.topic_by_name("Cells").unwrap();
    assert_eq!(copy.linked_subject, Some(subject.id));
    assert_eq!(copy.linked_topic, Some(topic.id));
    assert_eq!(topic.files, vec![copy.id]);

    let bob_now = ctx.store.get_principal(bob.owner()).await.unwrap().unwrap();
    assert_eq!(bob_now.friends, vec![ada.id]);
    // friendship is one-directional
    let ada_now = ctx.store.get_principal(ada.owner()).await.unwrap().unwrap();
    assert!(ada_now.friends.is_empty());
}

#[tokio::test]
async fn test_repeated_share_reuses_recipient_folder() {
    let ctx = TestContext::new();
    let ada = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let bob = ctx.add_principal(PrincipalKind::User, "bob@school.edu", Some("access-b"), None).unwrap();
    let (subject_id, topic_id) = subject_with_topic(&ctx, ada.owner(), "Biology", "BIO101", "Cells").await;
    let files = vec![
        ctx.spool("a.txt", "text/plain", b"a").unwrap(),
        ctx.spool("b.txt", "text/plain", b"b").unwrap(),
    ];
    let uploaded = ctx
        .manager
        .upload(files, ada.owner(), Some(&subject_id.to_string()), Some(&topic_id.to_string()))
        .await
        .unwrap()
        .files;

    for record in &uploaded {
        ctx.manager
            .share(&record.id.to_string(), &[bob.id.to_string()], ada.owner())
            .await
            .unwrap();
    }

    let bob_subjects = ctx.store.list_subjects(bob.owner()).await.unwrap();
    assert_eq!(bob_subjects.len(), 1);
    assert_eq!(bob_subjects[0].topics.len(), 1);
    assert_eq!(bob_subjects[0].topics[0].files.len(), 2);

    let bob_now = ctx.store.get_principal(bob.owner()).await.unwrap().unwrap();
    assert_eq!(bob_now.friends, vec![ada.id]);
}

#[tokio::test]
async fn test_share_skips_unknown_targets_only() {
    let ctx = TestContext::new();
    let ada = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let bob = ctx.add_principal(PrincipalKind::User, "bob@school.edu", Some("access-b"), None).unwrap();
    let cy = ctx.add_principal(PrincipalKind::User, "cy@school.edu", Some("access-c"), None).unwrap();
    let source = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], ada.owner(), None, None)
        .await
        .unwrap()
        .files
        .remove(0);

    let targets = vec![
        "bob@school.edu".to_string(),
        "nobody@school.edu".to_string(),
        "not an email".to_string(),
        Uuid::new_v4().to_string(),
        cy.id.to_string(),
    ];
    let outcome = ctx.manager.share(&source.id.to_string(), &targets, ada.owner()).await.unwrap();

    assert_eq!(outcome.shared, 2);
    assert_eq!(outcome.skipped, 3);
    assert_eq!(ctx.manager.list(bob.owner()).await.unwrap().len(), 1);
    assert_eq!(ctx.manager.list(cy.owner()).await.unwrap().len(), 1);

    // source had no topic, so copies are not filed anywhere
    let copy = ctx.manager.list(bob.owner()).await.unwrap().remove(0);
    assert!(copy.linked_subject.is_none());
    assert!(copy.linked_topic.is_none());
    assert!(ctx.store.list_subjects(bob.owner()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_share_with_self_is_skipped() {
    let ctx = TestContext::new();
    let ada = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let source = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], ada.owner(), None, None)
        .await
        .unwrap()
        .files
        .remove(0);

    let outcome = ctx
        .manager
        .share(&source.id.to_string(), &["ada@school.edu".to_string()], ada.owner())
        .await
        .unwrap();

    assert_eq!(outcome.shared, 0);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(ctx.store.file_count(), 1);
}

#[tokio::test]
async fn test_deleting_shared_source_then_copy_releases_owner_drive_object() {
    let ctx = TestContext::new();
    let ada = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let bob = ctx.add_principal(PrincipalKind::User, "bob@school.edu", Some("access-b"), None).unwrap();
    let source = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], ada.owner(), None, None)
        .await
        .unwrap()
        .files
        .remove(0);
    ctx.manager
        .share(&source.id.to_string(), &["bob@school.edu".to_string()], ada.owner())
        .await
        .unwrap();

    ctx.manager.permanent_delete(&source.id.to_string(), ada.owner()).await.unwrap();
    assert!(!ctx.cloud.has_object(&source.remote_id));

    let copy = ctx.manager.list(bob.owner()).await.unwrap().remove(0);
    ctx.manager.permanent_delete(&copy.id.to_string(), bob.owner()).await.unwrap();

    assert_eq!(ctx.store.file_count(), 0);
    assert_eq!(ctx.cloud.object_count(), 0);
    assert_eq!(
        ctx.cloud.delete_requests(),
        vec![(source.remote_id.clone(), "access-1".to_string())]
    );
}

#[tokio::test]
async fn test_deleting_share_copy_leaves_sharer_object() {
    let ctx = TestContext::new();
    let ada = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let bob = ctx.add_principal(PrincipalKind::User, "bob@school.edu", Some("access-b"), None).unwrap();
    let source = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], ada.owner(), None, None)
        .await
        .unwrap()
        .files
        .remove(0);
    ctx.manager
        .share(&source.id.to_string(), &["bob@school.edu".to_string()], ada.owner())
        .await
        .unwrap();

    ctx.manager.trash_all(bob.owner()).await.unwrap();
    assert_eq!(ctx.manager.empty_trash(bob.owner()).await.unwrap(), 1);

    assert!(ctx.cloud.delete_calls().is_empty());
    assert!(ctx.cloud.has_object(&source.remote_id));
    assert_eq!(ctx.manager.list(ada.owner()).await.unwrap().len(), 1);

    ctx.manager.permanent_delete(&source.id.to_string(), ada.owner()).await.unwrap();
    assert_eq!(ctx.cloud.object_count(), 0);
}

#[tokio::test]
async fn test_group_sharing() {
    let ctx = TestContext::new();
    let teacher = ctx
        .add_principal(PrincipalKind::Teacher, "grace@school.edu", Some("access-t"), None)
        .unwrap();
    let record = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], teacher.owner(), None, None)
        .await
        .unwrap()
        .files
        .remove(0);
    let id = record.id.to_string();

    ctx.manager.share_with_group(&id, "class-7b", teacher.owner()).await.unwrap();
    let again = ctx.manager.share_with_group(&id, "class-7b", teacher.owner()).await.unwrap();
    assert_eq!(again.shared_with_groups, vec!["class-7b".to_string()]);

    assert_eq!(ctx.manager.list_shared_with_group("class-7b").await.unwrap().len(), 1);
    assert!(ctx.manager.list_shared_with_group("class-8a").await.unwrap().is_empty());

    // trashed files drop out of the group listing
    ctx.manager.trash(&id, teacher.owner()).await.unwrap();
    assert!(ctx.manager.list_shared_with_group("class-7b").await.unwrap().is_empty());

    let err = ctx.manager.share_with_group(&id, "  ", teacher.owner()).await.unwrap_err();
    assert!(matches!(err, FileError::InvalidInput(_)));
}

#[tokio::test]
async fn test_summary_is_cached_after_first_request() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let record = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], user.owner(), None, None)
        .await
        .unwrap()
        .files
        .remove(0);
    let id = record.id.to_string();

    let first = ctx.manager.get_summary(&id, user.owner()).await.unwrap();
    let second = ctx.manager.get_summary(&id, user.owner()).await.unwrap();

    assert_eq!(first, "A short summary");
    assert_eq!(second, first);
    assert_eq!(ctx.classifier.summarize_calls(), 1);

    let stored = ctx.store.get_file(record.id).await.unwrap().unwrap();
    assert_eq!(stored.summary.as_deref(), Some("A short summary"));

    // scratch download removed
    let leftovers = std::fs::read_dir(ctx.manager.temp_dir())
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_summary_errors() {
    let ctx = TestContext::with_fakes(FakeRefresher::failing(), FakeClassifier::failing());
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let files = vec![
        ctx.spool("a.txt", "text/plain", b"a").unwrap(),
        ctx.spool("b.txt", "text/plain", b"b").unwrap(),
    ];
    let uploaded = ctx.manager.upload(files, user.owner(), None, None).await.unwrap().files;

    let err = ctx
        .manager
        .get_summary(&uploaded[0].id.to_string(), user.owner())
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::SummarizationFailed(_)));

    // record gone
    ctx.manager.permanent_delete(&uploaded[1].id.to_string(), user.owner()).await.unwrap();
    let err = ctx
        .manager
        .get_summary(&uploaded[1].id.to_string(), user.owner())
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::NotFound(_)));

    let stored = ctx.store.get_file(uploaded[0].id).await.unwrap().unwrap();
    assert!(stored.summary.is_none());
}

#[tokio::test]
async fn test_summary_download_failure() {
    let ctx = TestContext::new();
    let user = ctx.add_principal(PrincipalKind::User, "ada@school.edu", Some("access-1"), None).unwrap();
    let source = ctx
        .manager
        .upload(vec![ctx.spool("a.txt", "text/plain", NOTES).unwrap()], user.owner(), None, None)
        .await
        .unwrap()
        .files
        .remove(0);

    // object removed behind our back
    ctx.cloud.delete(&source.remote_id, "access-1").await.unwrap();

    let err = ctx
        .manager
        .get_summary(&source.id.to_string(), user.owner())
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::DownloadFailed(_)));
    assert_eq!(ctx.classifier.summarize_calls(), 0);
}
