//! Committee vote operations using Diesel
//!
//! One live row per (stage_id, voter_id). Casting again overwrites in place;
//! rows are never deleted. Tallies are always recomputed from these rows.

use diesel::prelude::*;

use super::diesel_schema::committee_votes;
use super::models::{current_timestamp, CommitteeVote, NewCommitteeVote};
use crate::error::CompetencyError;

/// Get a voter's live vote on a proposal
pub fn get_vote(
    conn: &mut SqliteConnection,
    stage_id: &str,
    voter_id: &str,
) -> Result<Option<CommitteeVote>, CompetencyError> {
    Ok(committee_votes::table
        .filter(committee_votes::stage_id.eq(stage_id))
        .filter(committee_votes::voter_id.eq(voter_id))
        .select(CommitteeVote::as_select())
        .first(conn)
        .optional()?)
}

/// All live votes cast by a voter
pub fn list_for_voter(
    conn: &mut SqliteConnection,
    voter_id: &str,
) -> Result<Vec<CommitteeVote>, CompetencyError> {
    Ok(committee_votes::table
        .filter(committee_votes::voter_id.eq(voter_id))
        .order(committee_votes::stage_id.asc())
        .select(CommitteeVote::as_select())
        .load(conn)?)
}

/// Insert or overwrite a vote
pub fn upsert_vote(
    conn: &mut SqliteConnection,
    stage_id: &str,
    voter_id: &str,
    approve: bool,
) -> Result<CommitteeVote, CompetencyError> {
    let now = current_timestamp();
    let vote = if approve { 1 } else { 0 };

    diesel::insert_into(committee_votes::table)
        .values(&NewCommitteeVote {
            stage_id,
            voter_id,
            vote,
            updated_at: &now,
        })
        .on_conflict((committee_votes::stage_id, committee_votes::voter_id))
        .do_update()
        .set((
            committee_votes::vote.eq(vote),
            committee_votes::updated_at.eq(&now),
        ))
        .execute(conn)?;

    get_vote(conn, stage_id, voter_id)?
        .ok_or_else(|| CompetencyError::Internal("Failed to retrieve upserted vote".into()))
}

/// Recompute (approve, reject) counts for a proposal from the vote rows
pub fn tally(conn: &mut SqliteConnection, stage_id: &str) -> Result<(i64, i64), CompetencyError> {
    let rows: Vec<(i32, i64)> = committee_votes::table
        .filter(committee_votes::stage_id.eq(stage_id))
        .group_by(committee_votes::vote)
        .select((committee_votes::vote, diesel::dsl::count_star()))
        .load(conn)?;

    let mut approve = 0;
    let mut reject = 0;
    for (vote, count) in rows {
        if vote != 0 {
            approve += count;
        } else {
            reject += count;
        }
    }
    Ok((approve, reject))
}
