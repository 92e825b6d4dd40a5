use std::fmt;
use std::str::FromStr;

use crate::db::{Db, Document, Filter, Update};
use crate::error::{ApiError, ApiResult};
use crate::models::participant::Participant;
use crate::models::study_participant::StudyParticipant;
use crate::models::RecordId;

/// A boolean field of `Record` that can be flipped in bulk.
pub trait Flag: Copy + fmt::Debug + 'static {
    type Record: Document;

    /// Every flag of this kind, used to parse wire names.
    const ALL: &'static [Self];

    /// The field's name on the wire and in the store.
    fn field_name(self) -> &'static str;

    fn get(self, record: &Self::Record) -> bool;

    /// Records outside this filter are never toggled.
    fn scope() -> Filter {
        Filter::All
    }
}

fn parse_flag<F: Flag>(name: &str) -> ApiResult<F> {
    F::ALL
        .iter()
        .copied()
        .find(|flag| flag.field_name() == name)
        .ok_or_else(|| {
            let known: Vec<&str> = F::ALL.iter().map(|flag| flag.field_name()).collect();
            ApiError::BadRequest(format!(
                "`{}` is not a property that can be toggled (expected one of: {})",
                name,
                known.join(", ")
            ))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantFlag {
    IsWillContact,
}

impl Flag for ParticipantFlag {
    type Record = Participant;

    const ALL: &'static [Self] = &[ParticipantFlag::IsWillContact];

    fn field_name(self) -> &'static str {
        match self {
            ParticipantFlag::IsWillContact => "isWillContact",
        }
    }

    fn get(self, participant: &Participant) -> bool {
        match self {
            ParticipantFlag::IsWillContact => participant.is_will_contact,
        }
    }
}

impl FromStr for ParticipantFlag {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_flag(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyParticipantFlag {
    IsActive,
    IsComplete,
    IsGift,
    IsSentGift,
    IsWillReceiveReport,
    IsSentReport,
}

impl Flag for StudyParticipantFlag {
    type Record = StudyParticipant;

    const ALL: &'static [Self] = &[
        StudyParticipantFlag::IsActive,
        StudyParticipantFlag::IsComplete,
        StudyParticipantFlag::IsGift,
        StudyParticipantFlag::IsSentGift,
        StudyParticipantFlag::IsWillReceiveReport,
        StudyParticipantFlag::IsSentReport,
    ];

    fn field_name(self) -> &'static str {
        match self {
            StudyParticipantFlag::IsActive => "isActive",
            StudyParticipantFlag::IsComplete => "isComplete",
            StudyParticipantFlag::IsGift => "isGift",
            StudyParticipantFlag::IsSentGift => "isSentGift",
            StudyParticipantFlag::IsWillReceiveReport => "isWillReceiveReport",
            StudyParticipantFlag::IsSentReport => "isSentReport",
        }
    }

    fn get(self, row: &StudyParticipant) -> bool {
        match self {
            StudyParticipantFlag::IsActive => row.is_active,
            StudyParticipantFlag::IsComplete => row.is_complete,
            StudyParticipantFlag::IsGift => row.is_gift,
            StudyParticipantFlag::IsSentGift => row.is_sent_gift,
            StudyParticipantFlag::IsWillReceiveReport => row.is_will_receive_report,
            StudyParticipantFlag::IsSentReport => row.is_sent_report,
        }
    }

    /// Only active enrolments can be toggled.
    fn scope() -> Filter {
        Filter::eq("isActive", true)
    }
}

impl FromStr for StudyParticipantFlag {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_flag(s)
    }
}

/// Flips `flag` on every record with one of the given ids.
///
/// Records are split by their current value and written with at most two
/// bulk updates. Returns how many records were toggled.
pub async fn toggle_flag<F: Flag>(ids: &[RecordId], flag: F, db: &Db) -> ApiResult<u64> {
    let repository = db.collection::<F::Record>();
    let records = if ids.is_empty() {
        Vec::new()
    } else {
        repository.find(&Filter::ids(ids).and(F::scope())).await?
    };

    if records.is_empty() {
        return Err(ApiError::NotFound(
            "No matching documents found for the provided IDs".to_owned(),
        ));
    }

    let (currently_set, currently_unset): (Vec<&F::Record>, Vec<&F::Record>) =
        records.iter().partition(|record| flag.get(record));

    for (group, new_value) in [(currently_unset, true), (currently_set, false)] {
        if group.is_empty() {
            continue;
        }

        let group_ids: Vec<RecordId> = group.iter().map(|record| record.id()).collect();
        repository
            .update_many(
                &Filter::ids(&group_ids),
                &Update::set(flag.field_name(), new_value),
            )
            .await?;
    }

    tracing::info!(?flag, toggled = records.len(), "toggled flag");

    Ok(records.len() as u64)
}
