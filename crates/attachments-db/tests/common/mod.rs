// Backend-agnostic integration tests for the Database trait.
//
// Each public async function accepts `&dyn Database` so that the same logic
// can be re-used by any backend.

use attachments_core::attachment::{NewAttachment, UpdateAttachment};
use attachments_core::{Capability, TargetRef};
use attachments_db::Database;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_attachment(target: &TargetRef, filename: &str, tag: Option<&str>) -> NewAttachment {
    NewAttachment {
        target: target.clone(),
        creator: "alice".into(),
        file_key: format!("attachments/{}/{}/{}", target.kind, target.id, filename),
        size_bytes: 10,
        tag: tag.map(str::to_string),
    }
}

// ---------------------------------------------------------------------------
// Attachment tests
// ---------------------------------------------------------------------------

/// Create, get, update, delete a single attachment.
pub async fn test_attachment_crud(db: &dyn Database) {
    let target = TargetRef::new("project", "42");
    let att = db
        .create_attachment(&new_attachment(&target, "report.pdf", Some("draft")))
        .await
        .unwrap();
    assert_eq!(att.target, target);
    assert_eq!(att.creator, "alice");
    assert_eq!(att.file_key, "attachments/project/42/report.pdf");
    assert_eq!(att.tag.as_deref(), Some("draft"));
    assert!(att.modified_at >= att.created_at);

    // get
    let fetched = db.get_attachment(&att.id).await.unwrap();
    assert_eq!(fetched.id, att.id);
    assert_eq!(fetched.created_at, att.created_at);

    // update tag only
    let updated = db
        .update_attachment(
            &att.id,
            &UpdateAttachment {
                tag: Some(Some("final".into())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.tag.as_deref(), Some("final"));
    assert_eq!(updated.file_key, att.file_key);
    assert_eq!(updated.created_at, att.created_at);
    assert!(updated.modified_at >= updated.created_at);
    assert_eq!(updated.creator, "alice");

    // clearing the tag stores NULL
    let cleared = db
        .update_attachment(
            &att.id,
            &UpdateAttachment {
                tag: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(cleared.tag.is_none());

    // delete returns the deleted attachment
    let deleted = db.delete_attachment(&att.id).await.unwrap();
    assert_eq!(deleted.id, att.id);

    // get / delete / update non-existent should error
    assert!(db.get_attachment(&att.id).await.is_err());
    assert!(db.delete_attachment(&att.id).await.is_err());
    assert!(db
        .update_attachment(&att.id, &UpdateAttachment::default())
        .await
        .is_err());
}

/// Listing filters on the (type, id) pair and orders newest first.
pub async fn test_list_for_target(db: &dyn Database) {
    let project = TargetRef::new("project", "42");
    let other_kind_same_id = TargetRef::new("invoice", "42");
    let other_id = TargetRef::new("project", "43");

    assert!(db.list_attachments_for(&project).await.unwrap().is_empty());

    let first = db
        .create_attachment(&new_attachment(&project, "a.txt", None))
        .await
        .unwrap();
    let second = db
        .create_attachment(&new_attachment(&project, "b.txt", None))
        .await
        .unwrap();
    let third = db
        .create_attachment(&new_attachment(&project, "c.txt", Some("x")))
        .await
        .unwrap();
    db.create_attachment(&new_attachment(&other_kind_same_id, "d.txt", None))
        .await
        .unwrap();
    db.create_attachment(&new_attachment(&other_id, "e.txt", None))
        .await
        .unwrap();

    let list = db.list_attachments_for(&project).await.unwrap();
    let ids: Vec<&str> = list.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec![third.id.as_str(), second.id.as_str(), first.id.as_str()]);
    for pair in list.windows(2) {
        assert!(pair[0].created_at >= pair[1].created_at);
    }

    assert_eq!(db.list_attachments_for(&other_kind_same_id).await.unwrap().len(), 1);
    assert_eq!(db.list_attachments_for(&other_id).await.unwrap().len(), 1);
}

/// Tag lookup matches the exact (target, tag) triple and tolerates duplicates.
pub async fn test_find_with_tag(db: &dyn Database) {
    let target = TargetRef::new("project", "7");
    db.create_attachment(&new_attachment(&target, "logo.png", Some("logo")))
        .await
        .unwrap();
    db.create_attachment(&new_attachment(&target, "untagged.png", None))
        .await
        .unwrap();

    let found = db.find_attachments_with_tag(&target, "logo").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].tag.as_deref(), Some("logo"));

    assert!(db
        .find_attachments_with_tag(&target, "missing")
        .await
        .unwrap()
        .is_empty());
    assert!(db
        .find_attachments_with_tag(&TargetRef::new("project", "8"), "logo")
        .await
        .unwrap()
        .is_empty());

    // Duplicate tags are allowed by the schema.
    db.create_attachment(&new_attachment(&target, "logo2.png", Some("logo")))
        .await
        .unwrap();
    assert_eq!(
        db.find_attachments_with_tag(&target, "logo").await.unwrap().len(),
        2
    );
}

// ---------------------------------------------------------------------------
// API key tests
// ---------------------------------------------------------------------------

/// Test API key CRUD: insert, find_by_hash, has, touch, list, delete.
pub async fn test_api_keys(db: &dyn Database) {
    assert!(!db.has_api_keys().await.unwrap());
    assert!(db.list_api_keys().await.unwrap().is_empty());

    let key = db
        .insert_api_key(
            "alice",
            "hash_abc",
            &[Capability::AddAttachment, Capability::DeleteAttachment],
        )
        .await
        .unwrap();
    assert_eq!(key.name, "alice");
    assert_eq!(key.key_hash, "hash_abc");
    assert_eq!(
        key.capabilities,
        vec![Capability::AddAttachment, Capability::DeleteAttachment]
    );
    assert!(key.last_used_at.is_none());

    assert!(db.has_api_keys().await.unwrap());

    let found = db.find_api_key_by_hash("hash_abc").await.unwrap();
    assert_eq!(found.unwrap().id, key.id);
    assert!(db.find_api_key_by_hash("nonexistent").await.unwrap().is_none());

    db.touch_api_key(&key.id).await.unwrap();
    let touched = db.find_api_key_by_hash("hash_abc").await.unwrap().unwrap();
    assert!(touched.last_used_at.is_some());

    assert_eq!(db.list_api_keys().await.unwrap().len(), 1);

    db.delete_api_key(&key.id).await.unwrap();
    assert!(!db.has_api_keys().await.unwrap());
    assert!(db.delete_api_key(&key.id).await.is_err());
}
