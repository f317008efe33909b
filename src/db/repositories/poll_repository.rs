use crate::db::connection::DbPool;
use crate::db::models::{OptionSnapshot, Poll, PollSnapshot};
use sqlx::Error;
use sqlx::QueryBuilder;
use sqlx::Row;
use uuid::Uuid;

const POLL_COLUMNS: &str = "id, owner_id, question, likes, created_at, updated_at";

/// Optional filters applied to poll listings and counts.
#[derive(Debug, Default, Clone)]
pub struct PollFilter {
    pub search: Option<String>,
    pub owner_id: Option<Uuid>,
}

pub async fn create_poll(
    pool: &DbPool,
    owner_id: Uuid,
    question: &str,
    options: &[String],
) -> Result<Uuid, Error> {
    let mut tx = pool.begin().await?;

    let poll_id = Uuid::new_v4();
    sqlx::query("INSERT INTO polls (id, owner_id, question) VALUES ($1, $2, $3)")
        .bind(poll_id)
        .bind(owner_id)
        .bind(question)
        .execute(&mut *tx)
        .await?;

    for (position, option_text) in options.iter().enumerate() {
        sqlx::query(
            "INSERT INTO poll_options (id, poll_id, option_text, position) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(poll_id)
        .bind(option_text)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(poll_id)
}

pub async fn get_poll(pool: &DbPool, poll_id: Uuid) -> Result<Option<Poll>, Error> {
    let row = sqlx::query_as::<_, Poll>(&format!(
        "SELECT {POLL_COLUMNS} FROM polls WHERE id = $1"
    ))
    .bind(poll_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn get_poll_options(
    pool: &DbPool,
    poll_id: Uuid,
) -> Result<Vec<OptionSnapshot>, Error> {
    let rows = sqlx::query(
        "SELECT id, option_text, count FROM poll_options WHERE poll_id = $1 ORDER BY position",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| OptionSnapshot {
            id: r.get("id"),
            text: r.get("option_text"),
            count: r.get("count"),
        })
        .collect())
}

/// Fetch the full poll document, options in creation order.
pub async fn get_poll_snapshot(
    pool: &DbPool,
    poll_id: Uuid,
) -> Result<Option<PollSnapshot>, Error> {
    let Some(poll) = get_poll(pool, poll_id).await? else {
        return Ok(None);
    };
    let options = get_poll_options(pool, poll_id).await?;

    Ok(Some(PollSnapshot::assemble(poll, options)))
}

pub async fn count_polls(pool: &DbPool, filter: &PollFilter) -> Result<i64, Error> {
    let mut query = QueryBuilder::new("SELECT COUNT(*) FROM polls WHERE 1=1");
    push_filters(&mut query, filter);

    query.build_query_scalar::<i64>().fetch_one(pool).await
}

pub async fn list_polls(
    pool: &DbPool,
    filter: &PollFilter,
    sort_by: &str,
    descending: bool,
    offset: i64,
    limit: i64,
) -> Result<Vec<PollSnapshot>, Error> {
    // `sort_by` must come from the handler's whitelist, never user input.
    let mut query = QueryBuilder::new(format!("SELECT {POLL_COLUMNS} FROM polls WHERE 1=1"));
    push_filters(&mut query, filter);
    query.push(format!(
        " ORDER BY {sort_by} {}",
        if descending { "DESC" } else { "ASC" }
    ));
    query.push(" OFFSET ");
    query.push_bind(offset);
    query.push(" LIMIT ");
    query.push_bind(limit);

    let polls = query.build_query_as::<Poll>().fetch_all(pool).await?;

    let mut snapshots = Vec::with_capacity(polls.len());
    for poll in polls {
        let options = get_poll_options(pool, poll.id).await?;
        snapshots.push(PollSnapshot::assemble(poll, options));
    }

    Ok(snapshots)
}

fn push_filters(query: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &PollFilter) {
    if let Some(search) = &filter.search {
        query.push(" AND question ILIKE ");
        query.push_bind(format!("%{search}%"));
    }
    if let Some(owner_id) = filter.owner_id {
        query.push(" AND owner_id = ");
        query.push_bind(owner_id);
    }
}

pub async fn update_poll_question(
    pool: &DbPool,
    poll_id: Uuid,
    question: &str,
) -> Result<(), Error> {
    sqlx::query("UPDATE polls SET question = $2, updated_at = NOW() WHERE id = $1")
        .bind(poll_id)
        .bind(question)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn delete_poll(pool: &DbPool, poll_id: Uuid) -> Result<(), Error> {
    sqlx::query("DELETE FROM polls WHERE id = $1")
        .bind(poll_id)
        .execute(pool)
        .await?;

    Ok(())
}
