use oak_types::{CreatedBy, RelationshipType, SessionRelationship, Timestamp};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{Error, Result};

/// Inserts the relationship, or leaves the existing row untouched if the
/// canonical pair is already linked.
pub fn add(conn: &Connection, relationship: &SessionRelationship) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO session_relationships (
            id, session_a_id, session_b_id, relationship_type, similarity_score,
            created_at, created_at_epoch, created_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            relationship.id,
            relationship.session_a_id,
            relationship.session_b_id,
            relationship.relationship_type.as_str(),
            relationship.similarity_score,
            relationship.created_at.to_iso(),
            relationship.created_at.epoch(),
            relationship.created_by.as_str(),
        ],
    )?;
    Ok(())
}

pub fn get_for_session(conn: &Connection, session_id: &str) -> Result<Vec<SessionRelationship>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM session_relationships WHERE session_a_id = ?1 OR session_b_id = ?1 ORDER BY created_at_epoch DESC",
    )?;
    let rows = stmt.query_map([session_id], row_to_relationship)?;
    rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

pub fn exists(conn: &Connection, session_a_id: &str, session_b_id: &str) -> Result<bool> {
    let (a, b) = if session_a_id < session_b_id {
        (session_a_id, session_b_id)
    } else {
        (session_b_id, session_a_id)
    };
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM session_relationships WHERE session_a_id = ?1 AND session_b_id = ?2",
        params![a, b],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn remove(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM session_relationships WHERE id = ?1", [id])?;
    Ok(())
}

fn row_to_relationship(row: &Row) -> rusqlite::Result<SessionRelationship> {
    let created_epoch: i64 = row.get("created_at_epoch")?;
    let relationship_type: String = row.get("relationship_type")?;
    let created_by: String = row.get("created_by")?;
    Ok(SessionRelationship {
        id: row.get("id")?,
        session_a_id: row.get("session_a_id")?,
        session_b_id: row.get("session_b_id")?,
        relationship_type: RelationshipType::parse(&relationship_type).unwrap_or(RelationshipType::Related),
        similarity_score: row.get("similarity_score")?,
        created_at: Timestamp::from_epoch(created_epoch),
        created_by: CreatedBy::parse(&created_by).unwrap_or(CreatedBy::Suggestion),
    })
}
