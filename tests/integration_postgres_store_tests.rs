//! Postgres document store tests. These start a throwaway container and are
//! ignored by default; run with `cargo test -- --ignored` when Docker is available.

use uuid::Uuid;

use pingnotes::{
    db::DocumentStore,
    models::{NewFileRecord, NewSubject, Owner, PrincipalKind, PrincipalProfile},
    test_helpers::start_test_database,
};

fn profile(email: &str, refresh_token: Option<&str>) -> PrincipalProfile {
    PrincipalProfile {
        name: email.split('@').next().unwrap_or(email).to_string(),
        email: email.to_string(),
        google_id: format!("google-{}", email),
        access_token: format!("access-{}", email),
        refresh_token: refresh_token.map(str::to_string),
    }
}

fn new_file(owner: Owner, remote_id: &str, subject: Option<Uuid>, topic: Option<Uuid>) -> NewFileRecord {
    NewFileRecord {
        name: "cells.txt".to_string(),
        mime_type: "text/plain".to_string(),
        size: 12,
        remote_id: remote_id.to_string(),
        view_url: format!("https://drive.google.com/file/d/{}/view", remote_id),
        owner,
        linked_subject: subject,
        linked_topic: topic,
        is_shared: false,
        original_file: None,
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_principal_upsert_keeps_refresh_token() {
    let (_container, db) = start_test_database().await.unwrap();

    let first = db
        .upsert_principal(PrincipalKind::User, &profile("ada@school.edu", Some("refresh-1")))
        .await
        .unwrap();
    let second = db
        .upsert_principal(PrincipalKind::User, &profile("ada@school.edu", None))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.refresh_token(), Some("refresh-1"));

    db.update_credentials(second.owner(), "access-2", None).await.unwrap();
    let loaded = db.get_principal(second.owner()).await.unwrap().unwrap();
    assert_eq!(loaded.access_token(), Some("access-2"));
    assert_eq!(loaded.refresh_token(), Some("refresh-1"));

    let found = db.find_user_by_email("ada@school.edu").await.unwrap();
    assert_eq!(found.map(|p| p.id), Some(first.id));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_teachers_live_in_their_own_collection() {
    let (_container, db) = start_test_database().await.unwrap();

    let teacher = db
        .upsert_principal(PrincipalKind::Teacher, &profile("grace@school.edu", None))
        .await
        .unwrap();

    assert_eq!(teacher.kind, PrincipalKind::Teacher);
    assert!(db.find_user_by_email("grace@school.edu").await.unwrap().is_none());
    assert!(db.get_principal(Owner::User(teacher.id)).await.unwrap().is_none());
    assert!(db.get_principal(teacher.owner()).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_friendship_is_added_once() {
    let (_container, db) = start_test_database().await.unwrap();
    let ada = db
        .upsert_principal(PrincipalKind::User, &profile("ada@school.edu", None))
        .await
        .unwrap();
    let bob = db
        .upsert_principal(PrincipalKind::User, &profile("bob@school.edu", None))
        .await
        .unwrap();

    assert!(db.add_friend(bob.id, ada.id).await.unwrap());
    assert!(!db.add_friend(bob.id, ada.id).await.unwrap());

    let bob = db.get_principal(bob.owner()).await.unwrap().unwrap();
    let ada = db.get_principal(ada.owner()).await.unwrap().unwrap();
    assert_eq!(bob.friends, vec![ada.id]);
    assert!(ada.friends.is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_file_lifecycle_queries() {
    let (_container, db) = start_test_database().await.unwrap();
    let ada = db
        .upsert_principal(PrincipalKind::User, &profile("ada@school.edu", None))
        .await
        .unwrap();
    let owner = ada.owner();

    let subject = db
        .create_subject(NewSubject {
            name: "Biology".to_string(),
            code: "BIO".to_string(),
            owner,
        })
        .await
        .unwrap();
    let topic = db.create_topic(subject.id, "Cells", None).await.unwrap();

    let file = db
        .create_file(new_file(owner, "remote-1", Some(subject.id), Some(topic.id)))
        .await
        .unwrap();
    let other = db.create_file(new_file(owner, "remote-2", None, None)).await.unwrap();

    let subject = db.get_subject(subject.id).await.unwrap().unwrap();
    assert_eq!(subject.topic(topic.id).unwrap().files, vec![file.id]);

    let trashed = db.set_file_deleted(file.id, true).await.unwrap().unwrap();
    assert!(trashed.is_deleted);
    assert_eq!(db.list_files(owner, true).await.unwrap().len(), 1);
    assert_eq!(db.list_files(owner, false).await.unwrap().len(), 1);

    assert_eq!(db.trash_all_files(owner).await.unwrap(), 1);
    assert_eq!(db.list_files(owner, true).await.unwrap().len(), 2);

    db.set_file_summary(other.id, "Short").await.unwrap();
    let other = db.get_file(other.id).await.unwrap().unwrap();
    assert_eq!(other.summary.as_deref(), Some("Short"));

    assert!(db.delete_file(file.id).await.unwrap());
    assert!(!db.delete_file(file.id).await.unwrap());
    let subject = db.get_subject(subject.id).await.unwrap().unwrap();
    assert!(subject.topic(topic.id).unwrap().files.is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_group_sharing_and_share_copies() {
    let (_container, db) = start_test_database().await.unwrap();
    let grace = db
        .upsert_principal(PrincipalKind::Teacher, &profile("grace@school.edu", None))
        .await
        .unwrap();
    let ada = db
        .upsert_principal(PrincipalKind::User, &profile("ada@school.edu", None))
        .await
        .unwrap();

    let source = db.create_file(new_file(grace.owner(), "remote-1", None, None)).await.unwrap();
    let copy = db
        .create_file(NewFileRecord::share_copy(&source, ada.owner(), None, None))
        .await
        .unwrap();

    assert!(copy.is_shared);
    assert_eq!(copy.original_file, Some(source.id));
    assert_eq!(copy.remote_id, source.remote_id);
    assert_eq!(db.list_files(ada.owner(), false).await.unwrap().len(), 1);

    db.add_file_to_group(source.id, "class-7b").await.unwrap();
    let updated = db.add_file_to_group(source.id, "class-7b").await.unwrap().unwrap();
    assert_eq!(updated.shared_with_groups, vec!["class-7b".to_string()]);

    let listed = db.list_files_shared_with_group("class-7b").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, source.id);
}
