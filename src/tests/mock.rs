use time::macros::datetime;

use crate::consistency::create_study;
use crate::db::Db;
use crate::models::participant::{NewParticipant, Participant};
use crate::models::researcher::{NewResearcher, Researcher};
use crate::models::session::NewSession;
use crate::models::study::{NewStudy, Study};
use crate::models::tag::{NewTag, Tag};
use crate::models::IdSet;

pub const MOCK_PASSWORD: &str = "correct horse battery staple";

/// A researcher whose first name is their username.
pub fn mock_new_researcher(username: &str) -> NewResearcher {
    NewResearcher {
        first_name: username.to_owned(),
        last_name: String::from("Researcher"),
        email: format!("{}@uni.edu", username),
        username: username.to_owned(),
        password: MOCK_PASSWORD.to_owned(),
    }
}

pub async fn mock_researcher(username: &str, db: &Db) -> Researcher {
    Researcher::register(mock_new_researcher(username), db)
        .await
        .unwrap()
}

pub fn mock_new_study(code: &str) -> NewStudy {
    NewStudy {
        study_code: code.to_owned(),
        study_name: format!("Mock Study {}", code),
        description: String::from("A study about studies."),
        study_type: String::from("Interview"),
        participant_num: 10,
        recruitment_start_date: Some(datetime!(2024-03-01 09:00 UTC)),
        recruitment_close_date: Some(datetime!(2024-06-30 17:00 UTC)),
        location: vec![String::from("Level 2, Building 301")],
        survey_link: String::from("https://survey.example.com/mock"),
        drive_link: String::from("https://drive.example.com/mock"),
    }
}

/// A study created by a fresh researcher named after the study code.
pub async fn mock_study(code: &str, db: &Db) -> Study {
    let creator = mock_researcher(&format!("creator-{}", code.to_lowercase()), db).await;

    create_study(creator.id, mock_new_study(code), db)
        .await
        .unwrap()
        .study
}

pub fn mock_new_participant(email: &str) -> NewParticipant {
    NewParticipant {
        first_name: String::from("Mock"),
        last_name: String::from("Participant"),
        email: email.to_owned(),
        phone_num: String::from("021 555 0100"),
        tag: IdSet::new(),
        is_will_contact: false,
    }
}

pub async fn mock_participant(email: &str, db: &Db) -> Participant {
    db.collection::<Participant>()
        .create(&Participant::from(mock_new_participant(email)))
        .await
        .unwrap()
}

pub async fn mock_tag(name: &str, db: &Db) -> Tag {
    let tag = Tag::from(NewTag {
        tag_name: name.to_owned(),
    });

    db.collection::<Tag>().create(&tag).await.unwrap()
}

pub fn mock_new_session(code: &str) -> NewSession {
    NewSession {
        session_code: code.to_owned(),
        date: datetime!(2024-04-15 00:00 UTC),
        time: String::from("10:00-11:00"),
        location: String::from("Room 101"),
        participant_num: 4,
        participant_list: IdSet::new(),
        is_archive: false,
    }
}
