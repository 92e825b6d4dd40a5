//! Runs the document store against a real PostgreSQL database.
//!
//! These tests only run when `TEST_DATABASE_URL` points at a database they
//! may freely create tables in; otherwise they pass without doing anything.

use std::sync::{Mutex, PoisonError};

use serde_json::{json, Value};
use uuid::Uuid;

use research_fusion::consistency::{create_study, enroll_participants, insert_deduplicated};
use research_fusion::db::{Collection, Db, Doc, DocumentStore, Filter, PgStore, StoreError, Update};
use research_fusion::models::participant::{NewParticipant, Participant};
use research_fusion::models::researcher::{NewResearcher, Researcher};
use research_fusion::models::study::{NewStudy, Study};
use research_fusion::models::study_participant::StudyParticipant;
use research_fusion::models::RecordId;

const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

fn database_url() -> Option<String> {
    std::env::var(TEST_DATABASE_URL).ok()
}

/// A freshly migrated collection no other test run shares.
async fn scratch(unique_fields: &'static [&'static str]) -> Option<(PgStore, Collection)> {
    let url = database_url()?;
    let store = PgStore::connect(&url).await.unwrap();

    let name: &'static str = Box::leak(format!("t_{}", Uuid::new_v4().simple()).into_boxed_str());
    let collection = Collection {
        name,
        unique_fields,
    };
    store.migrate(&[collection]).await.unwrap();

    Some((store, collection))
}

fn doc(value: Value) -> Doc {
    value.as_object().cloned().unwrap()
}

fn new_id() -> String {
    RecordId::new().to_string()
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

#[tokio::test]
async fn unique_index_violations_become_duplicates() {
    let Some((store, tags)) = scratch(&["tagName"]).await else {
        return;
    };
    let first = new_id();
    store
        .insert(tags, doc(json!({ "_id": first, "tagName": "adult" })))
        .await
        .unwrap();

    let result = store
        .insert(tags, doc(json!({ "_id": new_id(), "tagName": "adult" })))
        .await;
    assert!(matches!(
        result,
        Err(StoreError::Duplicate { ref field, ref value, .. }) if field == "tagName" && value == "adult"
    ));

    let second = new_id();
    store
        .insert(tags, doc(json!({ "_id": second, "tagName": "child" })))
        .await
        .unwrap();
    let stolen = store
        .update(tags, &Filter::eq("_id", second), &Update::set("tagName", "adult"))
        .await;
    assert!(matches!(stolen, Err(StoreError::Duplicate { .. })));
    assert_eq!(store.count(tags, &Filter::All).await.unwrap(), 2);
}

#[tokio::test]
async fn filters_match_like_the_memory_store() {
    let Some((store, people)) = scratch(&["email"]).await else {
        return;
    };
    for (email, last_name, tags) in [
        ("a@x.com", "O'N.eill", json!(["t1", "t2"])),
        ("b@x.com", "O'Neill", json!(["t2"])),
        ("c@x.com", "Smith", json!([])),
    ] {
        store
            .insert(
                people,
                doc(json!({ "_id": new_id(), "email": email, "lastName": last_name, "tag": tags })),
            )
            .await
            .unwrap();
    }

    let emails = |docs: Vec<Doc>| -> Vec<String> {
        let mut emails: Vec<String> = docs
            .iter()
            .map(|doc| doc["email"].as_str().unwrap().to_owned())
            .collect();
        emails.sort();
        emails
    };

    let by_email = Filter::In("email", vec![json!("a@x.com"), json!("c@x.com"), json!("z@x.com")]);
    assert_eq!(
        emails(store.find(people, &by_email).await.unwrap()),
        ["a@x.com", "c@x.com"]
    );

    let tagged = Filter::Contains("tag", json!("t2"));
    assert_eq!(
        emails(store.find(people, &tagged).await.unwrap()),
        ["a@x.com", "b@x.com"]
    );

    let searched = Filter::containing_text("lastName", "o'n.").unwrap();
    assert_eq!(emails(store.find(people, &searched).await.unwrap()), ["a@x.com"]);

    let both = Filter::Contains("tag", json!("t2")).and(Filter::eq("email", "b@x.com"));
    assert_eq!(store.count(people, &both).await.unwrap(), 1);
}

#[tokio::test]
async fn add_to_set_and_pull_keep_set_semantics() {
    let Some((store, researchers)) = scratch(&[]).await else {
        return;
    };
    let id = new_id();
    store
        .insert(researchers, doc(json!({ "_id": id })))
        .await
        .unwrap();
    let this = Filter::eq("_id", id);

    for study in ["s1", "s1", "s2"] {
        let matched = store
            .update(researchers, &this, &Update::AddToSet("studyList", json!(study)))
            .await
            .unwrap();
        assert_eq!(matched, 1);
    }
    let stored = store.find(researchers, &this).await.unwrap();
    assert_eq!(stored[0]["studyList"], json!(["s1", "s2"]));

    store
        .update(researchers, &this, &Update::Pull("studyList", json!("s1")))
        .await
        .unwrap();
    store
        .update(researchers, &this, &Update::Pull("studyList", json!("s2")))
        .await
        .unwrap();
    let stored = store.find(researchers, &this).await.unwrap();
    assert_eq!(stored[0]["studyList"], json!([]));
}

/// Serializes migrations of the shared tables, which race when run at once.
static MIGRATION: Mutex<()> = Mutex::new(());

async fn connected() -> Option<Db> {
    let url = database_url()?;
    let _migrating = MIGRATION.lock().unwrap_or_else(PoisonError::into_inner);

    Some(Db::connect(&url).await.unwrap())
}

async fn study(db: &Db) -> Study {
    let username = unique("creator");
    let creator = Researcher::register(
        NewResearcher {
            first_name: String::from("Test"),
            last_name: String::from("Creator"),
            email: format!("{}@uni.edu", username),
            username,
            password: String::from("hunter22"),
        },
        db,
    )
    .await
    .unwrap();
    let new_study = NewStudy {
        study_code: unique("S"),
        study_name: String::from("Sleep and memory"),
        description: String::new(),
        study_type: String::new(),
        participant_num: 2,
        recruitment_start_date: None,
        recruitment_close_date: None,
        location: Vec::new(),
        survey_link: String::new(),
        drive_link: String::new(),
    };

    create_study(creator.id, new_study, db)
        .await
        .unwrap()
        .study
}

fn participant(email: &str) -> Participant {
    Participant::from(NewParticipant {
        first_name: String::from("Test"),
        last_name: String::from("Participant"),
        email: email.to_owned(),
        phone_num: String::new(),
        tag: Default::default(),
        is_will_contact: false,
    })
}

async fn participants(count: usize, db: &Db) -> Vec<RecordId> {
    let candidates = (0..count)
        .map(|_| participant(&format!("{}@x.com", unique("p"))))
        .collect();
    let inserted = insert_deduplicated(candidates, db).await.unwrap();
    assert!(inserted.fully_succeeded());

    inserted.success.iter().map(|participant| participant.id).collect()
}

#[tokio::test]
async fn serial_numbers_survive_deletes() {
    let Some(db) = connected().await else {
        return;
    };
    let study = study(&db).await;
    let ids = participants(3, &db).await;

    let first = enroll_participants(study.id, &ids[..2], &db).await.unwrap();
    let serials: Vec<u64> = first.created.iter().map(|row| row.serial_num).collect();
    assert_eq!(serials, [1, 2]);

    StudyParticipant::delete(first.created[1].id, &db).await.unwrap();
    let second = enroll_participants(study.id, &ids[2..], &db).await.unwrap();

    assert_eq!(second.created[0].serial_num, 3);
}

#[tokio::test]
async fn blank_and_repeated_emails_fail_individually() {
    let Some(db) = connected().await else {
        return;
    };
    let email = format!("{}@x.com", unique("p"));
    let candidates = [email.as_str(), "", email.as_str()]
        .into_iter()
        .map(participant)
        .collect();

    let result = insert_deduplicated(candidates, &db).await.unwrap();

    assert_eq!(result.success.len(), 1);
    let failed: Vec<(usize, Option<&str>)> = result
        .failed
        .iter()
        .map(|failure| (failure.index, failure.field.as_deref()))
        .collect();
    assert_eq!(failed, [(1, Some("email")), (2, Some("email"))]);
}
